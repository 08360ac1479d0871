//! Immutable custody history records
use super::error::LedgerError;
use super::participant::Participant;
use super::role::Role;
use super::shipment::TimeStamp;
use chrono::Utc;
use std::fmt;

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone, Copy)]
pub enum TransitionKind {
    #[n(0)]
    Created,
    #[n(1)]
    Handoff,
    #[n(2)]
    Cancelled,
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransitionKind::Created => "created",
            TransitionKind::Handoff => "handoff",
            TransitionKind::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// One entry of a shipment's history. Never mutated once appended.
///
/// `digest` is the sha256 of this record encoded with an empty digest, and
/// `prev_digest` is the digest of the entry before it, so the history forms
/// a hash chain rooted at the Created entry.
#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct Transition {
    #[n(0)]
    seq: u32,
    #[n(1)]
    kind: TransitionKind,
    #[n(2)]
    from_role: Role,
    #[n(3)]
    to_role: Role,
    #[n(4)]
    actor: Participant, // who called
    #[n(5)]
    holder: Participant, // who has custody afterwards
    #[n(6)]
    timestamp: TimeStamp<Utc>,
    #[n(7)]
    note: String,
    #[n(8)]
    prev_digest: Option<String>,
    #[n(9)]
    digest: String,
}

impl Transition {
    pub(crate) fn created(supplier: &Participant, role: Role, note: &str) -> Result<Self, LedgerError> {
        Self {
            seq: 0,
            kind: TransitionKind::Created,
            from_role: role,
            to_role: role,
            actor: supplier.clone(),
            holder: supplier.clone(),
            timestamp: TimeStamp::new(),
            note: note.to_owned(),
            prev_digest: None,
            digest: String::new(),
        }
        .seal()
    }

    pub(crate) fn handoff(
        prev: &Transition,
        actor: &Participant,
        to_role: Role,
        holder: &Participant,
        note: &str,
    ) -> Result<Self, LedgerError> {
        Self::following(prev, TransitionKind::Handoff, actor, to_role, holder, note)
    }

    // role and holder stay where they are
    pub(crate) fn cancelled(
        prev: &Transition,
        actor: &Participant,
        reason: &str,
    ) -> Result<Self, LedgerError> {
        let holder = prev.holder.clone();
        Self::following(prev, TransitionKind::Cancelled, actor, prev.to_role, &holder, reason)
    }

    fn following(
        prev: &Transition,
        kind: TransitionKind,
        actor: &Participant,
        to_role: Role,
        holder: &Participant,
        note: &str,
    ) -> Result<Self, LedgerError> {
        Self {
            seq: prev.seq + 1,
            kind,
            from_role: prev.to_role,
            to_role,
            actor: actor.clone(),
            holder: holder.clone(),
            timestamp: TimeStamp::new(),
            note: note.to_owned(),
            prev_digest: Some(prev.digest.clone()),
            digest: String::new(),
        }
        .seal()
    }

    fn seal(mut self) -> Result<Self, LedgerError> {
        self.digest = self.compute_digest()?;
        Ok(self)
    }

    fn compute_digest(&self) -> Result<String, LedgerError> {
        let unsealed = Transition {
            digest: String::new(),
            ..self.clone()
        };
        let cbor = minicbor::to_vec(&unsealed)?;

        Ok(sha256::digest(&cbor))
    }

    /// Checks this record's own digest and its link to `prev`.
    pub fn verify(&self, prev: Option<&Transition>) -> bool {
        let linked = match prev {
            Some(p) => {
                self.seq == p.seq + 1
                    && self.from_role == p.to_role
                    && self.prev_digest.as_deref() == Some(p.digest.as_str())
            }
            None => self.seq == 0 && self.prev_digest.is_none(),
        };

        linked && matches!(self.compute_digest(), Ok(d) if d == self.digest)
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }
    pub fn kind(&self) -> TransitionKind {
        self.kind
    }
    pub fn from_role(&self) -> Role {
        self.from_role
    }
    pub fn to_role(&self) -> Role {
        self.to_role
    }
    pub fn actor(&self) -> &Participant {
        &self.actor
    }
    pub fn holder(&self) -> &Participant {
        &self.holder
    }
    pub fn timestamp(&self) -> &TimeStamp<Utc> {
        &self.timestamp
    }
    pub fn note(&self) -> &str {
        &self.note
    }
    pub fn prev_digest(&self) -> Option<&str> {
        self.prev_digest.as_deref()
    }
    pub fn digest(&self) -> &str {
        &self.digest
    }
}
