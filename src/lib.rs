//! Supply-chain custody ledger.
//!
//! A [`ledger::CustodyLedger`] tracks shipments as they move along a fixed
//! route of custody roles. Only the participant holding custody may hand it
//! on, hand-offs never skip or revisit a role, and every committed change is
//! appended to the shipment's history and to an audit event stream.

pub mod auth;
pub mod config;
pub mod error;
pub mod event;
pub mod ledger;
pub mod participant;
pub mod role;
pub mod shipment;
pub mod transition;
pub mod utils;

pub use error::LedgerError;
pub use ledger::{CustodyLedger, ShipmentFilter};
pub use participant::Participant;
pub use role::{Role, RoleSequence};
pub use shipment::{Shipment, ShipmentDraft, ShipmentId, Status};
