//! The custody ledger: registry, transactional mutations and queries
use super::auth;
use super::config::{LedgerConfig, Storage};
use super::error::LedgerError;
use super::event::{CustodyEvent, EventFeed};
use super::participant::{Participant, ParticipantDirectory};
use super::role::Role;
use super::shipment::{Shipment, ShipmentDraft, ShipmentId, Status};
use anyhow::Context;
use sled::Transactional;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionResult,
    TransactionalTree,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

const SHIPMENTS: &str = "shipments";
const EVENTS: &str = "events";
const COUNTERS: &str = "counters";
const PARTICIPANTS: &str = "participants";

const SHIPMENT_COUNTER: &[u8] = b"shipment";

type TxResult<T> = ConflictableTransactionResult<T, LedgerError>;

/// Restricts [`CustodyLedger::list_shipments`]. Unset fields match anything.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ShipmentFilter {
    pub status: Option<Status>,
    pub role: Option<Role>,
}

impl ShipmentFilter {
    pub fn any() -> Self {
        Self::default()
    }
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }
    pub fn matches(&self, shipment: &Shipment) -> bool {
        self.status.is_none_or(|s| s == shipment.status())
            && self.role.is_none_or(|r| r == shipment.current_role())
    }
}

/// Owns every shipment and the audit stream.
///
/// Each mutation runs as one sled transaction over the shipment record and
/// its event, so either both are written or neither is. Transactions touching
/// the same shipment are serialized by sled; a caller that loses the race is
/// re-evaluated against the winner's committed state and gets whatever error
/// that state produces. Reads go straight to the trees and only ever see
/// committed records.
#[derive(Clone)]
pub struct CustodyLedger {
    instance: Arc<sled::Db>,
    shipments: sled::Tree,
    events: sled::Tree,
    counters: sled::Tree,
    directory: ParticipantDirectory,
    config: Arc<LedgerConfig>,
}

impl CustodyLedger {
    pub fn new(instance: Arc<sled::Db>, config: LedgerConfig) -> Result<Self, LedgerError> {
        let shipments = instance.open_tree(SHIPMENTS)?;
        let events = instance.open_tree(EVENTS)?;
        let counters = instance.open_tree(COUNTERS)?;
        let directory = ParticipantDirectory::new(
            instance.open_tree(PARTICIPANTS)?,
            config.address_prefix.clone(),
        );

        Ok(Self {
            instance,
            shipments,
            events,
            counters,
            directory,
            config: Arc::new(config),
        })
    }

    /// Open the database named by `config.storage`.
    pub fn open(config: LedgerConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let db = match &config.storage {
            Storage::Temporary => sled::Config::new()
                .temporary(true)
                .open()
                .context("failed to open temporary ledger")?,
            Storage::Path(path) => sled::open(path)
                .with_context(|| format!("failed to open ledger at {}", path.display()))?,
        };
        info!(route = %config.route, storage = ?config.storage, "custody ledger opened");

        Ok(Self::new(Arc::new(db), config)?)
    }

    /// In-memory ledger with the default route.
    pub fn temporary() -> anyhow::Result<Self> {
        Self::open(LedgerConfig::default())
    }

    pub fn directory(&self) -> &ParticipantDirectory {
        &self.directory
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Register a new shipment with `creator` holding custody.
    ///
    /// `creator` must hold the first role of the configured route in the
    /// directory, and every custodian in `draft` must hold the role it is
    /// bound to.
    pub fn create_shipment(
        &self,
        creator: &Participant,
        draft: ShipmentDraft,
    ) -> Result<ShipmentId, LedgerError> {
        let route = &self.config.route;

        if let Err(err) = self.check_grants(creator, &draft) {
            debug!(creator = %creator, error = %err, "shipment creation rejected");
            return Err(err);
        }

        let res: TransactionResult<Shipment, LedgerError> =
            (&self.shipments, &self.events, &self.counters).transaction(
                |(shipments, events, counters)| {
                    let id = next_id(counters)?;
                    let shipment = Shipment::create(id, creator, route, &draft).map_err(abort)?;
                    commit(shipments, events, &shipment)?;
                    Ok(shipment)
                },
            );
        let shipment = self.settle("create", None, res)?;

        info!(
            shipment = %shipment.id(),
            supplier = %creator,
            route = %shipment.route(),
            "shipment created"
        );
        Ok(shipment.id())
    }

    /// Hand custody of `id` from `actor` to the custodian of `next_role`.
    pub fn advance_custody(
        &self,
        id: ShipmentId,
        actor: &Participant,
        next_role: Role,
        note: &str,
    ) -> Result<CustodyEvent, LedgerError> {
        let res: TransactionResult<CustodyEvent, LedgerError> = (&self.shipments, &self.events)
            .transaction(|(shipments, events)| {
                let mut shipment = load(shipments, id)?;
                shipment.advance(actor, next_role, note).map_err(abort)?;
                commit(shipments, events, &shipment)
            });
        let event = self.settle("advance", Some(id), res)?;

        info!(
            shipment = %id,
            from = %event.from_role,
            to = %event.to_role,
            actor = %actor,
            holder = %event.holder,
            "custody advanced"
        );
        Ok(event)
    }

    /// Close `id` as Cancelled. Allowed for the original supplier and the
    /// current custodian.
    pub fn cancel(
        &self,
        id: ShipmentId,
        actor: &Participant,
        reason: &str,
    ) -> Result<CustodyEvent, LedgerError> {
        let res: TransactionResult<CustodyEvent, LedgerError> = (&self.shipments, &self.events)
            .transaction(|(shipments, events)| {
                let mut shipment = load(shipments, id)?;
                shipment.cancel(actor, reason).map_err(abort)?;
                commit(shipments, events, &shipment)
            });
        let event = self.settle("cancel", Some(id), res)?;

        info!(shipment = %id, actor = %actor, role = %event.to_role, reason, "shipment cancelled");
        Ok(event)
    }

    /// Snapshot of the last committed state of `id`.
    pub fn get_shipment(&self, id: ShipmentId) -> Result<Shipment, LedgerError> {
        let bytes = self
            .shipments
            .get(id.key())?
            .ok_or(LedgerError::NotFound(id))?;

        Shipment::from_cbor(&bytes)
    }

    /// Ids of shipments matching `filter`, in creation order.
    ///
    /// The iterator walks the registry lazily; calling again starts over
    /// against whatever is committed at that point.
    pub fn list_shipments(
        &self,
        filter: ShipmentFilter,
    ) -> impl Iterator<Item = Result<ShipmentId, LedgerError>> + use<> {
        self.shipments
            .iter()
            .filter_map(move |entry| -> Option<Result<ShipmentId, LedgerError>> {
                let (_, value) = match entry {
                    Ok(kv) => kv,
                    Err(err) => return Some(Err(err.into())),
                };
                match Shipment::from_cbor(&value) {
                    Ok(shipment) => filter.matches(&shipment).then(|| Ok(shipment.id())),
                    Err(err) => Some(Err(err)),
                }
            })
    }

    /// Every event recorded for `id`, in history order.
    pub fn events(&self, id: ShipmentId) -> Result<Vec<CustodyEvent>, LedgerError> {
        if !self.shipments.contains_key(id.key())? {
            return Err(LedgerError::NotFound(id));
        }

        self.events
            .scan_prefix(id.key())
            .map(|entry| -> Result<CustodyEvent, LedgerError> {
                let (_, value) = entry?;
                Ok(minicbor::decode(&value)?)
            })
            .collect()
    }

    /// All events, grouped by shipment and ordered within each.
    pub fn audit_log(&self) -> impl Iterator<Item = Result<CustodyEvent, LedgerError>> + use<> {
        self.events.iter().map(|entry| -> Result<CustodyEvent, LedgerError> {
            let (_, value) = entry?;
            Ok(minicbor::decode(&value)?)
        })
    }

    /// Feed of every event committed from now on.
    pub fn subscribe(&self) -> EventFeed {
        EventFeed::new(self.events.watch_prefix(b""))
    }

    /// Feed of events committed for `id` from now on.
    pub fn subscribe_to(&self, id: ShipmentId) -> EventFeed {
        EventFeed::new(self.events.watch_prefix(id.key()))
    }

    /// Re-check the digest chain of `id` and that its event stream matches
    /// its history entry for entry.
    pub fn verify(&self, id: ShipmentId) -> Result<bool, LedgerError> {
        let shipment = self.get_shipment(id)?;
        let events = self.events(id)?;

        let replay_matches = events.len() == shipment.history().len()
            && events
                .iter()
                .zip(shipment.history())
                .all(|(e, t)| e.seq == t.seq() && e.digest == t.digest());
        let ok = replay_matches && shipment.verify_history();

        if !ok {
            warn!(shipment = %id, "custody history failed verification");
        }
        Ok(ok)
    }

    pub fn len(&self) -> usize {
        self.shipments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shipments.is_empty()
    }

    pub fn flush(&self) -> Result<(), LedgerError> {
        self.instance.flush()?;
        Ok(())
    }

    fn check_grants(&self, creator: &Participant, draft: &ShipmentDraft) -> Result<(), LedgerError> {
        let first = self.config.route.first();
        auth::may_hold(creator, first, &self.directory.roles_of(creator)?)?;

        for (role, participant) in draft.custodians() {
            if *role != first {
                auth::may_hold(participant, *role, &self.directory.roles_of(participant)?)?;
            }
        }
        Ok(())
    }

    // log the outcome of a transaction and flush if configured
    fn settle<T>(
        &self,
        op: &'static str,
        id: Option<ShipmentId>,
        res: TransactionResult<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        match res {
            Ok(value) => {
                if self.config.sync_on_commit {
                    self.instance.flush()?;
                }
                Ok(value)
            }
            Err(err) => {
                let err = LedgerError::from(err);
                if err.is_rejection() {
                    debug!(op, shipment = ?id, error = %err, "operation rejected");
                } else {
                    warn!(op, shipment = ?id, error = %err, "operation failed");
                }
                Err(err)
            }
        }
    }
}

fn abort<E: Into<LedgerError>>(err: E) -> ConflictableTransactionError<LedgerError> {
    ConflictableTransactionError::Abort(err.into())
}

fn next_id(counters: &TransactionalTree) -> TxResult<ShipmentId> {
    // a counter that cannot be read must never restart at zero
    let last = match counters.get(SHIPMENT_COUNTER)? {
        Some(bytes) if bytes.len() == 8 => ShipmentId::from_key(&bytes).map_or(0, |id| id.get()),
        Some(_) => {
            return Err(abort(minicbor::decode::Error::message(
                "shipment id counter is corrupt",
            )));
        }
        None => 0,
    };
    let id = ShipmentId::new(last + 1);
    counters.insert(SHIPMENT_COUNTER, &id.key()[..])?;
    Ok(id)
}

fn load(shipments: &TransactionalTree, id: ShipmentId) -> TxResult<Shipment> {
    let bytes = shipments
        .get(id.key())?
        .ok_or_else(|| abort(LedgerError::NotFound(id)))?;

    Shipment::from_cbor(&bytes).map_err(abort)
}

// write the shipment and the event for its newest history entry
fn commit(
    shipments: &TransactionalTree,
    events: &TransactionalTree,
    shipment: &Shipment,
) -> TxResult<CustodyEvent> {
    let event = CustodyEvent::from_transition(shipment.id(), shipment.last_transition());

    shipments.insert(&shipment.id().key()[..], minicbor::to_vec(shipment).map_err(abort)?)?;
    events.insert(event.key(), minicbor::to_vec(&event).map_err(abort)?)?;
    Ok(event)
}
