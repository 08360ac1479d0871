//! Shipment records and the custody state machine
use super::auth;
use super::error::LedgerError;
use super::participant::Participant;
use super::role::{Role, RoleSequence};
use super::transition::{Transition, TransitionKind};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct ShipmentId(u64);

impl ShipmentId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
    pub fn get(&self) -> u64 {
        self.0
    }
    /// Big-endian so the registry iterates in allocation order.
    pub fn key(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
    pub fn from_key(key: &[u8]) -> Option<Self> {
        let bytes: [u8; 8] = key.get(..8)?.try_into().ok()?;
        Some(Self(u64::from_be_bytes(bytes)))
    }
}

impl fmt::Display for ShipmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<C> minicbor::Encode<C> for ShipmentId {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.u64(self.0)?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for ShipmentId {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        Ok(ShipmentId(d.u64()?))
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    #[n(0)]
    Created,
    #[n(1)]
    InTransit,
    #[n(2)]
    Delivered,
    #[n(3)]
    Cancelled,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Delivered | Status::Cancelled)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Created => "Created",
            Status::InTransit => "InTransit",
            Status::Delivered => "Delivered",
            Status::Cancelled => "Cancelled",
        };
        write!(f, "{s}")
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Default, Clone, PartialEq, Eq)]
pub struct Metadata {
    #[n(0)]
    pub description: String,
    #[n(1)]
    pub attributes: BTreeMap<String, String>, // sku, lot number, ...
}

// Used to describe a shipment before the ledger assigns it an id
#[derive(Debug, Default, Clone)]
pub struct ShipmentDraft {
    metadata: Metadata,
    custodians: BTreeMap<Role, Participant>,
}

impl ShipmentDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_description(mut self, description: &str) -> Self {
        self.metadata.description = description.to_owned();
        self
    }
    pub fn set_attribute(mut self, key: &str, value: &str) -> Self {
        self.metadata
            .attributes
            .insert(key.to_owned(), value.to_owned());
        self
    }
    /// Bind `participant` to `role` for this shipment. The Supplier slot is
    /// always the creator and need not be assigned.
    pub fn assign(mut self, role: Role, participant: Participant) -> Self {
        self.custodians.insert(role, participant);
        self
    }
    pub fn custodians(&self) -> &BTreeMap<Role, Participant> {
        &self.custodians
    }
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

/// A batch of goods and its full custody history.
///
/// The state machine lives here so it can be driven without storage; the
/// ledger wraps each call in a transaction. Every mutating method checks all
/// of its guards before touching `self`, so a rejected call leaves the
/// shipment exactly as it was.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Shipment {
    #[n(0)]
    id: ShipmentId,
    #[n(1)]
    supplier: Participant,
    #[n(2)]
    route: RoleSequence,
    #[n(3)]
    custodians: BTreeMap<Role, Participant>,
    #[n(4)]
    metadata: Metadata,
    #[n(5)]
    current_holder: Participant,
    #[n(6)]
    current_role: Role,
    #[n(7)]
    status: Status,
    #[n(8)]
    history: Vec<Transition>,
    #[n(9)]
    created_at: TimeStamp<Utc>,
}

impl Shipment {
    /// Decode a stored record. A shipment without its Created entry is
    /// rejected here so the state machine never sees one.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, LedgerError> {
        let shipment: Shipment = minicbor::decode(bytes)?;
        if shipment.history.is_empty() {
            return Err(minicbor::decode::Error::message("stored shipment has no history").into());
        }
        Ok(shipment)
    }

    /// Validates the draft's custodian bindings against `route` and records
    /// the Created entry. Directory checks happen before this is called.
    pub fn create(
        id: ShipmentId,
        creator: &Participant,
        route: &RoleSequence,
        draft: &ShipmentDraft,
    ) -> Result<Self, LedgerError> {
        let first = route.first();

        if let Some(named) = draft.custodians.get(&first) {
            if named != creator {
                return Err(LedgerError::UnauthorizedActor {
                    actor: creator.clone(),
                    action: "create a shipment on behalf of another supplier",
                });
            }
        }

        let mut custodians = draft.custodians.clone();
        custodians.insert(first, creator.clone());

        if let Some(stray) = custodians.keys().find(|r| !route.contains(**r)) {
            return Err(LedgerError::IllegalTransition {
                from: route.last(),
                to: *stray,
            });
        }
        for role in route.roles() {
            if !custodians.contains_key(role) {
                return Err(LedgerError::IllegalTransition {
                    from: route.predecessor(*role).unwrap_or(first),
                    to: *role,
                });
            }
        }
        let mut seen = BTreeSet::new();
        for participant in custodians.values() {
            if !seen.insert(participant) {
                return Err(LedgerError::UnauthorizedActor {
                    actor: participant.clone(),
                    action: "hold more than one role on the same shipment",
                });
            }
        }

        let created = Transition::created(creator, first, &draft.metadata.description)?;

        Ok(Self {
            id,
            supplier: creator.clone(),
            route: route.clone(),
            custodians,
            metadata: draft.metadata.clone(),
            current_holder: creator.clone(),
            current_role: first,
            status: Status::Created,
            created_at: created.timestamp().clone(),
            history: vec![created],
        })
    }

    /// Hand custody to the participant bound to `next_role`.
    pub fn advance(
        &mut self,
        actor: &Participant,
        next_role: Role,
        note: &str,
    ) -> Result<&Transition, LedgerError> {
        auth::ensure_open(self)?;
        auth::may_advance(actor, self)?;

        let illegal = LedgerError::IllegalTransition {
            from: self.current_role,
            to: next_role,
        };
        if self.route.successor(self.current_role) != Some(next_role) {
            return Err(illegal);
        }
        let Some(holder) = self.custodians.get(&next_role) else {
            return Err(illegal);
        };

        let transition = Transition::handoff(self.latest(), actor, next_role, holder, note)?;

        self.current_holder = holder.clone();
        self.current_role = next_role;
        self.status = if self.route.is_last(next_role) {
            Status::Delivered
        } else {
            Status::InTransit
        };
        self.history.push(transition);

        Ok(self.latest())
    }

    pub fn cancel(&mut self, actor: &Participant, reason: &str) -> Result<&Transition, LedgerError> {
        auth::ensure_open(self)?;
        auth::may_cancel(actor, self)?;

        let transition = Transition::cancelled(self.latest(), actor, reason)?;

        self.status = Status::Cancelled;
        self.history.push(transition);

        Ok(self.latest())
    }

    /// Re-derives every invariant from the stored history.
    pub fn verify_history(&self) -> bool {
        let Some(first) = self.history.first() else {
            return false;
        };
        if first.kind() != TransitionKind::Created || first.actor() != &self.supplier {
            return false;
        }

        let mut prev: Option<&Transition> = None;
        for (i, t) in self.history.iter().enumerate() {
            if !t.verify(prev) {
                return false;
            }
            // Created only opens, Cancelled only closes
            let kind_ok = match t.kind() {
                TransitionKind::Created => i == 0,
                TransitionKind::Handoff => {
                    i > 0
                        && self.route.successor(t.from_role()) == Some(t.to_role())
                        && self.custodians.get(&t.to_role()) == Some(t.holder())
                }
                TransitionKind::Cancelled => i > 0 && i == self.history.len() - 1,
            };
            if !kind_ok {
                return false;
            }
            prev = Some(t);
        }

        let last = self.latest();
        let expected = match last.kind() {
            TransitionKind::Created => Status::Created,
            TransitionKind::Cancelled => Status::Cancelled,
            TransitionKind::Handoff if self.route.is_last(last.to_role()) => Status::Delivered,
            TransitionKind::Handoff => Status::InTransit,
        };

        self.status == expected
            && self.current_role == last.to_role()
            && &self.current_holder == last.holder()
    }

    fn latest(&self) -> &Transition {
        // history always holds the Created entry
        &self.history[self.history.len() - 1]
    }

    pub fn id(&self) -> ShipmentId {
        self.id
    }
    pub fn supplier(&self) -> &Participant {
        &self.supplier
    }
    pub fn route(&self) -> &RoleSequence {
        &self.route
    }
    pub fn custodians(&self) -> &BTreeMap<Role, Participant> {
        &self.custodians
    }
    pub fn custodian(&self, role: Role) -> Option<&Participant> {
        self.custodians.get(&role)
    }
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
    pub fn current_holder(&self) -> &Participant {
        &self.current_holder
    }
    pub fn current_role(&self) -> Role {
        self.current_role
    }
    pub fn status(&self) -> Status {
        self.status
    }
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
    pub fn history(&self) -> &[Transition] {
        &self.history
    }
    pub fn last_transition(&self) -> &Transition {
        self.latest()
    }
    pub fn created_at(&self) -> &TimeStamp<Utc> {
        &self.created_at
    }
}
