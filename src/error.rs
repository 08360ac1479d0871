use super::participant::Participant;
use super::role::Role;
use super::shipment::{ShipmentId, Status};
use std::convert::Infallible;

#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    #[error("Shipment {0} does not exist")]
    NotFound(ShipmentId),
    #[error("{actor} is not authorized to {action}")]
    UnauthorizedActor {
        actor: Participant,
        action: &'static str,
    },
    #[error("Shipment {id} is {status} and accepts no further transitions")]
    InvalidState { id: ShipmentId, status: Status },
    #[error("Custody cannot move from {from} to {to}")]
    IllegalTransition { from: Role, to: Role },
    #[error("storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("failed to encode ledger record: {0}")]
    Encode(#[from] minicbor::encode::Error<Infallible>),
    #[error("failed to decode ledger record: {0}")]
    Decode(#[from] minicbor::decode::Error),
}

impl LedgerError {
    /// True for the four kinds caused by the caller's input, false for
    /// storage and codec failures.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            LedgerError::NotFound(_)
                | LedgerError::UnauthorizedActor { .. }
                | LedgerError::InvalidState { .. }
                | LedgerError::IllegalTransition { .. }
        )
    }
}

impl From<sled::transaction::TransactionError<LedgerError>> for LedgerError {
    fn from(value: sled::transaction::TransactionError<LedgerError>) -> Self {
        match value {
            sled::transaction::TransactionError::Abort(err) => err,
            sled::transaction::TransactionError::Storage(err) => LedgerError::Storage(err),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Role sequence needs at least two roles, got {0}")]
    RouteTooShort(usize),
    #[error("Role sequence must start with Supplier, got {0}")]
    RouteStart(Role),
    #[error("Role sequence must strictly follow role order: {0} cannot follow {1}")]
    RouteOrder(Role, Role),
    #[error("Invalid address prefix {0:?}")]
    AddressPrefix(String),
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
