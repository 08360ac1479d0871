//! Authorization predicates, evaluated before anything is mutated
use super::error::LedgerError;
use super::participant::Participant;
use super::role::Role;
use super::shipment::Shipment;

/// Terminal shipments reject every mutation, whoever asks.
pub fn ensure_open(shipment: &Shipment) -> Result<(), LedgerError> {
    if shipment.is_terminal() {
        return Err(LedgerError::InvalidState {
            id: shipment.id(),
            status: shipment.status(),
        });
    }
    Ok(())
}

pub fn is_custodian(actor: &Participant, shipment: &Shipment) -> bool {
    actor == shipment.current_holder()
}

/// Only the current custodian may hand off.
pub fn may_advance(actor: &Participant, shipment: &Shipment) -> Result<(), LedgerError> {
    if !is_custodian(actor, shipment) {
        return Err(LedgerError::UnauthorizedActor {
            actor: actor.clone(),
            action: "advance custody they do not hold",
        });
    }
    Ok(())
}

/// The original supplier keeps the right to cancel after handing off.
pub fn may_cancel(actor: &Participant, shipment: &Shipment) -> Result<(), LedgerError> {
    if !is_custodian(actor, shipment) && actor != shipment.supplier() {
        return Err(LedgerError::UnauthorizedActor {
            actor: actor.clone(),
            action: "cancel a shipment they neither supplied nor hold",
        });
    }
    Ok(())
}

/// `granted` is what the directory holds for `participant`.
pub fn may_hold(participant: &Participant, role: Role, granted: &[Role]) -> Result<(), LedgerError> {
    if !granted.contains(&role) {
        return Err(LedgerError::UnauthorizedActor {
            actor: participant.clone(),
            action: match role {
                Role::Supplier => "create shipments without the supplier role",
                Role::Distributor => "take custody without the distributor role",
                Role::Retailer => "take custody without the retailer role",
            },
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn may_hold_checks_grants() {
        let p = Participant::new("party_a");

        assert!(may_hold(&p, Role::Supplier, &[Role::Supplier]).is_ok());
        assert!(matches!(
            may_hold(&p, Role::Supplier, &[Role::Distributor]),
            Err(LedgerError::UnauthorizedActor { .. })
        ));
        assert!(may_hold(&p, Role::Retailer, &[]).is_err());
    }
}
