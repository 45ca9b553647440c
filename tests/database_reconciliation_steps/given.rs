//! Given steps for database reconciliation BDD scenarios.

use super::world::{LOGIN, LOGIN_SECRET, NAMESPACE, ReconcileWorld, run_async};
use eyre::WrapErr;
use rstest_bdd_macros::given;
use sqlmi_operator::database::{
    domain::{AlterSettings, DatabaseName, DesiredConfig, ResourceKey},
    ports::{ManagedInstance, SecretRef, SqlCredentials},
    services::ReconcileOutcome,
};

/// Upper bound on passes before a resource is expected to settle.
const MAX_PASSES: usize = 8;

#[given(r#"a ready managed instance "{instance}""#)]
fn ready_instance(world: &mut ReconcileWorld, instance: String) -> Result<(), eyre::Report> {
    let (secret_namespace, secret_name) = LOGIN_SECRET;
    world
        .instances
        .insert(
            NAMESPACE,
            &instance,
            ManagedInstance {
                state: "Ready".to_owned(),
                primary_endpoint: None,
                login_ref: SecretRef {
                    namespace: secret_namespace.to_owned(),
                    name: secret_name.to_owned(),
                },
            },
        )
        .wrap_err("register managed instance")?;
    let (username, password) = LOGIN;
    world
        .server
        .require_login(SqlCredentials::new(username, password))
        .wrap_err("require instance login")?;
    Ok(())
}

fn apply_resource(
    world: &mut ReconcileWorld,
    resource: &str,
    spec: DesiredConfig,
) -> Result<(), eyre::Report> {
    let key = ResourceKey::new(NAMESPACE, resource).wrap_err("construct resource key")?;
    world
        .store
        .apply(&key, spec)
        .wrap_err("apply database resource")?;
    world.resource = Some(key);
    Ok(())
}

fn spec_for(database: &str) -> Result<DesiredConfig, eyre::Report> {
    let name = DatabaseName::new(database).wrap_err("construct database name")?;
    Ok(DesiredConfig::new(name, "sql-mi-1"))
}

#[given(r#"a database resource "{resource}" for database "{database}""#)]
fn database_resource(
    world: &mut ReconcileWorld,
    resource: String,
    database: String,
) -> Result<(), eyre::Report> {
    let spec = spec_for(&database)?;
    apply_resource(world, &resource, spec)
}

#[given(r#"a database resource "{resource}" for database "{database}" with snapshot isolation"#)]
fn database_resource_with_snapshot_isolation(
    world: &mut ReconcileWorld,
    resource: String,
    database: String,
) -> Result<(), eyre::Report> {
    let spec = spec_for(&database)?.with_snapshot_isolation(true);
    apply_resource(world, &resource, spec)
}

#[given("the resource has settled")]
fn resource_settled(world: &mut ReconcileWorld) -> Result<(), eyre::Report> {
    let key = world.resource_key()?;
    for _ in 0..MAX_PASSES {
        let outcome = run_async(world.reconciler.reconcile(&key))
            .map_err(|err| eyre::eyre!("reconcile pass failed: {err}"))?;
        if outcome == ReconcileOutcome::Done {
            world.server.clear_statements().wrap_err("clear statement log")?;
            return Ok(());
        }
    }
    Err(eyre::eyre!("resource {key} did not settle"))
}

#[given(r#"snapshot isolation is turned off on "{database}" by hand"#)]
fn snapshot_isolation_turned_off(
    world: &mut ReconcileWorld,
    database: String,
) -> Result<(), eyre::Report> {
    let settings = AlterSettings {
        allow_snapshot_isolation: Some(false),
        ..AlterSettings::default()
    };
    let altered = world
        .server
        .alter_out_of_band(&database, &settings)
        .wrap_err("alter database by hand")?;
    if !altered {
        return Err(eyre::eyre!("database {database} does not exist"));
    }
    Ok(())
}

#[given(r#""{database}" is restored from a backup"#)]
fn database_restored(world: &mut ReconcileWorld, database: String) -> Result<(), eyre::Report> {
    world
        .server
        .restore_as_new_identity(&database)
        .wrap_err("restore database")?
        .ok_or_else(|| eyre::eyre!("database {database} does not exist"))?;
    Ok(())
}
