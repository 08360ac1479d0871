//! Property-based tests for the custody state machine
//!
//! These drive random sequences of hand-offs and cancellations, by random
//! actors towards random roles, through a shipment and check that the
//! invariants hold no matter what the callers try. Most properties run
//! against the pure `Shipment` so thousands of sequences stay cheap; the last
//! block replays sequences through a real ledger to check the event stream.
//!
//! Covered:
//!
//! 1. History grows by exactly one entry per accepted call, never otherwise
//! 2. Terminal shipments reject every call with InvalidState
//! 3. Only the current holder can advance
//! 4. Role order is strict, no skipping and no going back
//! 5. Rejected calls leave the shipment untouched
//! 6. The digest chain verifies after any sequence
//! 7. The ledger's event stream replays the history exactly

use custody_ledger::{
    LedgerError,
    ledger::CustodyLedger,
    participant::Participant,
    role::{Role, RoleSequence},
    shipment::{Shipment, ShipmentDraft, ShipmentId, Status},
};
use proptest::prelude::*;

// index 0..3 are the route custodians, 3 is never bound to anything
fn actors() -> [Participant; 4] {
    [
        Participant::new("party_supplier"),
        Participant::new("party_distributor"),
        Participant::new("party_retailer"),
        Participant::new("party_outsider"),
    ]
}

fn fresh() -> Shipment {
    let [s, d, r, _] = actors();
    let draft = ShipmentDraft::new()
        .set_description("property batch")
        .assign(Role::Distributor, d)
        .assign(Role::Retailer, r);
    Shipment::create(ShipmentId::new(1), &s, &RoleSequence::default(), &draft)
        .expect("fixture draft is valid")
}

#[derive(Debug, Clone)]
enum Op {
    Advance { actor: usize, role: Role },
    Cancel { actor: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..4usize, prop::sample::select(Role::ALL.to_vec()))
            .prop_map(|(actor, role)| Op::Advance { actor, role }),
        1 => (0..4usize).prop_map(|actor| Op::Cancel { actor }),
    ]
}

fn apply(shipment: &mut Shipment, op: &Op) -> Result<(), LedgerError> {
    let actors = actors();
    match op {
        Op::Advance { actor, role } => shipment.advance(&actors[*actor], *role, "prop").map(|_| ()),
        Op::Cancel { actor } => shipment.cancel(&actors[*actor], "prop").map(|_| ()),
    }
}

// PROPERTY TESTS
proptest! {
    /// history length is always accepted calls + 1, and entries never change
    /// once written
    #[test]
    fn prop_history_is_append_only(ops in prop::collection::vec(op_strategy(), 0..20)) {
        let mut shipment = fresh();
        let mut accepted = 0;

        for op in &ops {
            let before = shipment.history().to_vec();
            if apply(&mut shipment, op).is_ok() {
                accepted += 1;
            }
            prop_assert!(shipment.history().starts_with(&before));
            prop_assert_eq!(shipment.history().len(), accepted + 1);
        }
        prop_assert!(shipment.verify_history());
    }

    /// Once Delivered or Cancelled every call fails with InvalidState, for
    /// every actor and every role.
    #[test]
    fn prop_terminal_states_are_final(
        ops in prop::collection::vec(op_strategy(), 0..20),
        after in prop::collection::vec(op_strategy(), 1..10),
    ) {
        let mut shipment = fresh();
        for op in &ops {
            let _ = apply(&mut shipment, op);
        }
        prop_assume!(shipment.is_terminal());

        let frozen = shipment.clone();
        for op in &after {
            let err = apply(&mut shipment, op).unwrap_err();
            prop_assert!(matches!(err, LedgerError::InvalidState { .. }), "got {:?}", err);
        }
        prop_assert_eq!(shipment, frozen);
    }

    /// A successful advance always came from the holder, and anyone else is
    /// turned away with UnauthorizedActor while the shipment is open.
    #[test]
    fn prop_only_holder_advances(
        ops in prop::collection::vec(op_strategy(), 0..20),
        actor in 0..4usize,
        role in prop::sample::select(Role::ALL.to_vec()),
    ) {
        let mut shipment = fresh();
        for op in &ops {
            let _ = apply(&mut shipment, op);
        }
        prop_assume!(!shipment.is_terminal());

        let actors = actors();
        let holder = shipment.current_holder().clone();
        let res = shipment.advance(&actors[actor], role, "probe").map(|t| t.clone());

        if actors[actor] != holder {
            let unauthorized = matches!(res, Err(LedgerError::UnauthorizedActor { .. }));
            prop_assert!(unauthorized);
        } else if let Ok(t) = res {
            prop_assert_eq!(t.actor(), &holder);
        }
    }

    /// The holder may only move custody one step forward along the route.
    #[test]
    fn prop_role_order_is_strict(
        ops in prop::collection::vec(op_strategy(), 0..20),
        role in prop::sample::select(Role::ALL.to_vec()),
    ) {
        let mut shipment = fresh();
        for op in &ops {
            let _ = apply(&mut shipment, op);
        }
        prop_assume!(!shipment.is_terminal());

        let from = shipment.current_role();
        let holder = shipment.current_holder().clone();
        let legal = RoleSequence::default().successor(from) == Some(role);
        let res = shipment.advance(&holder, role, "probe").map(|_| ());

        if legal {
            prop_assert!(res.is_ok());
            prop_assert_eq!(shipment.current_role(), role);
        } else {
            let is_illegal = matches!(res, Err(LedgerError::IllegalTransition { .. }));
            prop_assert!(is_illegal);
            prop_assert_eq!(shipment.current_role(), from);
        }
    }

    /// A rejected call has no observable effect.
    #[test]
    fn prop_rejections_change_nothing(ops in prop::collection::vec(op_strategy(), 0..25)) {
        let mut shipment = fresh();

        for op in &ops {
            let before = shipment.clone();
            if apply(&mut shipment, op).is_err() {
                prop_assert_eq!(&shipment, &before);
            }
        }
    }

    /// status and current role always agree with the newest history entry
    #[test]
    fn prop_state_matches_latest_entry(ops in prop::collection::vec(op_strategy(), 0..20)) {
        let mut shipment = fresh();
        for op in &ops {
            let _ = apply(&mut shipment, op);

            let last = shipment.last_transition();
            prop_assert_eq!(shipment.current_role(), last.to_role());
            prop_assert_eq!(shipment.current_holder(), last.holder());
            prop_assert_eq!(
                shipment.status() == Status::Delivered,
                shipment.current_role() == Role::Retailer && shipment.status() != Status::Cancelled
            );
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Through the ledger, the stored events are exactly the history, in
    /// order, whatever mix of accepted and rejected calls happened.
    #[test]
    fn prop_ledger_events_replay_history(ops in prop::collection::vec(op_strategy(), 0..15)) {
        let ledger = CustodyLedger::temporary().unwrap();
        let [s, d, r, outsider] = actors();
        let dir = ledger.directory();
        dir.register(&s, Role::Supplier).unwrap();
        dir.register(&d, Role::Distributor).unwrap();
        dir.register(&r, Role::Retailer).unwrap();
        let roster = [s.clone(), d.clone(), r.clone(), outsider];

        let draft = ShipmentDraft::new()
            .assign(Role::Distributor, d)
            .assign(Role::Retailer, r);
        let id = ledger.create_shipment(&s, draft).unwrap();

        let mut accepted = 0;
        for op in &ops {
            let res = match op {
                Op::Advance { actor, role } => ledger.advance_custody(id, &roster[*actor], *role, "prop"),
                Op::Cancel { actor } => ledger.cancel(id, &roster[*actor], "prop"),
            };
            match res {
                Ok(_) => accepted += 1,
                Err(err) => prop_assert!(err.is_rejection()),
            }
        }

        let shipment = ledger.get_shipment(id).unwrap();
        let events = ledger.events(id).unwrap();
        prop_assert_eq!(shipment.history().len(), accepted + 1);
        prop_assert_eq!(events.len(), shipment.history().len());
        for (event, entry) in events.iter().zip(shipment.history()) {
            prop_assert_eq!(event.seq, entry.seq());
            prop_assert_eq!(event.kind, entry.kind());
            prop_assert_eq!(&event.digest, entry.digest());
        }
        prop_assert!(ledger.verify(id).unwrap());
    }
}
