//! Walks one shipment through the supplier/distributor fixture and prints the
//! audit trail.
//!
//! The ledger's info logs are printed alongside.

use custody_ledger::{
    config::LedgerConfig,
    ledger::{CustodyLedger, ShipmentFilter},
    role::{Role, RoleSequence},
    shipment::{ShipmentDraft, Status},
};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let dir = tempfile::tempdir()?;
    let config = LedgerConfig::new()
        .set_path(dir.path().join("custody.db"))
        .set_route(RoleSequence::two_party())
        .set_sync_on_commit(true);
    let ledger = CustodyLedger::open(config)?;

    // accounts[0] and accounts[1] of the fixture
    let supplier = ledger.directory().provision(Role::Supplier)?;
    let distributor = ledger.directory().provision(Role::Distributor)?;

    let draft = ShipmentDraft::new()
        .set_description("12 pallets of flour")
        .set_attribute("mill", "north")
        .assign(Role::Distributor, distributor.clone());
    let id = ledger.create_shipment(&supplier, draft)?;

    if let Err(err) = ledger.advance_custody(id, &distributor, Role::Distributor, "grab") {
        println!("rejected as expected: {err}");
    }
    ledger.advance_custody(id, &supplier, Role::Distributor, "loaded on truck 9")?;
    if let Err(err) = ledger.cancel(id, &supplier, "mistake") {
        println!("rejected as expected: {err}");
    }

    let shipment = ledger.get_shipment(id)?;
    println!(
        "shipment {} is {} with {} ({})",
        shipment.id(),
        shipment.status(),
        shipment.current_holder(),
        shipment.current_role()
    );
    for event in ledger.events(id)? {
        println!(
            "  #{} {} {} -> {} by {} [{}]",
            event.seq,
            event.kind,
            event.from_role,
            event.to_role,
            event.actor,
            &event.digest[..12]
        );
    }

    let delivered = ledger
        .list_shipments(ShipmentFilter::any().with_status(Status::Delivered))
        .count();
    println!("delivered shipments: {delivered}, history verified: {}", ledger.verify(id)?);

    Ok(())
}
