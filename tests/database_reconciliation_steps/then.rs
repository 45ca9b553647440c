//! Then steps for database reconciliation BDD scenarios.

use super::world::{ReconcileWorld, run_async};
use eyre::WrapErr;
use rstest_bdd_macros::then;
use sqlmi_operator::database::{
    domain::DEFAULT_AUDIT_SCHEDULE,
    ports::DatabaseResourceStore,
    services::{ErrorClass, ReconcileOutcome},
};

fn snapshot_isolation_of(world: &ReconcileWorld, database: &str) -> Result<bool, eyre::Report> {
    let live = world
        .server
        .live_record(database)
        .wrap_err("read live record")?
        .ok_or_else(|| eyre::eyre!("database {database} does not exist"))?;
    Ok(live.allow_snapshot_isolation)
}

#[then(r#"the database "{database}" exists on the server"#)]
fn database_exists(world: &ReconcileWorld, database: String) -> Result<(), eyre::Report> {
    let names = world.server.database_names().wrap_err("list databases")?;
    if !names.contains(&database) {
        return Err(eyre::eyre!("expected {database} among {names:?}"));
    }
    Ok(())
}

#[then(r#"the resource status is "{phase}" with the live identity of "{database}""#)]
fn status_with_live_identity(
    world: &ReconcileWorld,
    phase: String,
    database: String,
) -> Result<(), eyre::Report> {
    let key = world.resource_key()?;
    let stored = run_async(world.store.get(&key))
        .wrap_err("read resource")?
        .ok_or_else(|| eyre::eyre!("resource {key} is missing"))?;
    if stored.status().phase().as_str() != phase {
        return Err(eyre::eyre!(
            "expected phase {phase}, found {}",
            stored.status().phase()
        ));
    }
    let live = world
        .server
        .identity_of(&database)
        .wrap_err("look up live identity")?;
    if live.is_none() || stored.status().identity() != live {
        return Err(eyre::eyre!(
            "stored identity {:?} does not match live identity {live:?}",
            stored.status().identity()
        ));
    }
    Ok(())
}

#[then("a drift audit is scheduled for the resource")]
fn drift_audit_scheduled(world: &ReconcileWorld) -> Result<(), eyre::Report> {
    let key = world.resource_key()?;
    let audits = world.scheduler.all().wrap_err("list scheduled audits")?;
    let scheduled = audits
        .iter()
        .any(|audit| audit.owner == key && audit.schedule.as_str() == DEFAULT_AUDIT_SCHEDULE);
    if !scheduled {
        return Err(eyre::eyre!("no default audit scheduled for {key}: {audits:?}"));
    }
    Ok(())
}

#[then("the pass completes")]
fn pass_completes(world: &ReconcileWorld) -> Result<(), eyre::Report> {
    let result = world
        .last_pass
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing reconcile result in scenario world"))?;
    match result {
        Ok(ReconcileOutcome::Done) => Ok(()),
        other => Err(eyre::eyre!("expected a completed pass, got {other:?}")),
    }
}

#[then(r#"snapshot isolation is on for "{database}""#)]
fn snapshot_isolation_on(world: &ReconcileWorld, database: String) -> Result<(), eyre::Report> {
    if !snapshot_isolation_of(world, &database)? {
        return Err(eyre::eyre!("snapshot isolation is off for {database}"));
    }
    Ok(())
}

#[then(r#"snapshot isolation is off for "{database}""#)]
fn snapshot_isolation_off(world: &ReconcileWorld, database: String) -> Result<(), eyre::Report> {
    if snapshot_isolation_of(world, &database)? {
        return Err(eyre::eyre!("snapshot isolation is on for {database}"));
    }
    Ok(())
}

#[then("the pass fails with an integrity violation")]
fn pass_fails_with_integrity_violation(world: &ReconcileWorld) -> Result<(), eyre::Report> {
    let result = world
        .last_pass
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing reconcile result in scenario world"))?;
    let Err(err) = result else {
        return Err(eyre::eyre!("expected the pass to fail, got {result:?}"));
    };
    if err.class() != ErrorClass::IntegrityViolation || err.is_retryable() {
        return Err(eyre::eyre!("expected a terminal integrity violation, got {err}"));
    }
    Ok(())
}

#[then("no statement was sent to the server")]
fn no_statement_sent(world: &ReconcileWorld) -> Result<(), eyre::Report> {
    let statements = world.server.statements().wrap_err("read statement log")?;
    if !statements.is_empty() {
        return Err(eyre::eyre!("unexpected statements: {statements:?}"));
    }
    Ok(())
}

#[then(r#"the database "{database}" no longer exists"#)]
fn database_gone(world: &ReconcileWorld, database: String) -> Result<(), eyre::Report> {
    let names = world.server.database_names().wrap_err("list databases")?;
    if names.contains(&database) {
        return Err(eyre::eyre!("database {database} still exists"));
    }
    Ok(())
}

#[then("the resource is gone from the store")]
fn resource_gone(world: &ReconcileWorld) -> Result<(), eyre::Report> {
    let key = world.resource_key()?;
    if world.store.contains(&key).wrap_err("look up resource")? {
        return Err(eyre::eyre!("resource {key} is still stored"));
    }
    Ok(())
}

#[then("the audit reports snapshot isolation as off")]
fn audit_reports_snapshot_isolation_off(world: &ReconcileWorld) -> Result<(), eyre::Report> {
    let report = world
        .last_audit
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing audit result in scenario world"))?
        .as_ref()
        .map_err(|err| eyre::eyre!("unexpected audit failure: {err}"))?;
    let drift = report
        .drift
        .as_ref()
        .ok_or_else(|| eyre::eyre!("expected the audit to report drift"))?;
    if drift.allow_snapshot_isolation != Some(false) {
        return Err(eyre::eyre!("unexpected drift report: {drift}"));
    }
    if !report.requires_intervention() {
        return Err(eyre::eyre!("expected the report to require intervention"));
    }
    Ok(())
}
