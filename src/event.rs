//! Audit events emitted by every committed mutation
use super::error::LedgerError;
use super::participant::Participant;
use super::role::Role;
use super::shipment::{ShipmentId, TimeStamp};
use super::transition::{Transition, TransitionKind};
use chrono::Utc;
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

/// What auditors see for one history entry.
#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct CustodyEvent {
    #[n(0)]
    pub shipment: ShipmentId,
    #[n(1)]
    pub seq: u32,
    #[n(2)]
    pub kind: TransitionKind,
    #[n(3)]
    pub from_role: Role,
    #[n(4)]
    pub to_role: Role,
    #[n(5)]
    pub actor: Participant,
    #[n(6)]
    pub holder: Participant,
    #[n(7)]
    pub timestamp: TimeStamp<Utc>,
    #[n(8)]
    pub note: String,
    #[n(9)]
    pub digest: String, // digest of the matching history entry
}

impl CustodyEvent {
    pub fn from_transition(shipment: ShipmentId, t: &Transition) -> Self {
        Self {
            shipment,
            seq: t.seq(),
            kind: t.kind(),
            from_role: t.from_role(),
            to_role: t.to_role(),
            actor: t.actor().clone(),
            holder: t.holder().clone(),
            timestamp: t.timestamp().clone(),
            note: t.note().to_owned(),
            digest: t.digest().to_owned(),
        }
    }

    /// Events sort by shipment, then by position in that shipment's history.
    pub(crate) fn key(&self) -> Vec<u8> {
        event_key(self.shipment, self.seq)
    }
}

pub(crate) fn event_key(shipment: ShipmentId, seq: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(12);
    key.extend_from_slice(&shipment.key());
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

/// Live view of events committed after the feed was opened.
///
/// Blocking iteration waits for the next commit; use
/// [`EventFeed::next_timeout`] when the caller must not wait forever.
pub struct EventFeed {
    subscriber: sled::Subscriber,
}

impl EventFeed {
    pub(crate) fn new(subscriber: sled::Subscriber) -> Self {
        Self { subscriber }
    }

    pub fn next_timeout(&mut self, timeout: Duration) -> Option<Result<CustodyEvent, LedgerError>> {
        loop {
            match self.subscriber.next_timeout(timeout) {
                Ok(event) => {
                    if let Some(decoded) = decode_event(event) {
                        return Some(decoded);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }
}

impl Iterator for EventFeed {
    type Item = Result<CustodyEvent, LedgerError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let event = self.subscriber.next()?;
            if let Some(decoded) = decode_event(event) {
                return Some(decoded);
            }
        }
    }
}

// the events tree is append-only, removals never happen
fn decode_event(event: sled::Event) -> Option<Result<CustodyEvent, LedgerError>> {
    match event {
        sled::Event::Insert { value, .. } => Some(minicbor::decode(&value).map_err(Into::into)),
        sled::Event::Remove { .. } => None,
    }
}
