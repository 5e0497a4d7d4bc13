use sea_orm::{ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, Schema, Statement};
use tokio::sync::OnceCell;
use unet_core::entities;

static DB_CONN: OnceCell<DatabaseConnection> = OnceCell::const_new();

/// Get a shared in-memory SQLite connection with entity-based schema created once.
pub async fn entity_db() -> DatabaseConnection {
    DB_CONN
        .get_or_init(|| async {
            let conn = Database::connect("sqlite::memory:")
                .await
                .expect("connect sqlite::memory:");
            apply_entity_schema(&conn).await.expect("apply schema");
            conn
        })
        .await
        .clone()
}

/// A brand-new, unshared in-memory SQLite connection with the same schema as
/// [`entity_db`]. Unlike `entity_db`, every call gets its own database, so
/// tests that seed rows with fixed, human-readable ids (`"d1"`, `"r1"`, ...)
/// and assert exact row counts don't collide with other tests running
/// concurrently against the shared singleton.
pub async fn fresh_entity_db() -> DatabaseConnection {
    let conn = Database::connect("sqlite::memory:")
        .await
        .expect("connect sqlite::memory:");
    apply_entity_schema(&conn).await.expect("apply schema");
    conn
}

async fn apply_entity_schema(connection: &impl ConnectionTrait) -> Result<(), Box<dyn std::error::Error>> {
    let schema = Schema::new(DatabaseBackend::Sqlite);

    for stmt in [
        schema.create_table_from_entity(entities::Branches),
        schema.create_table_from_entity(entities::Devices),
        schema.create_table_from_entity(entities::DeviceState),
        schema.create_table_from_entity(entities::DeviceInterfaces),
        schema.create_table_from_entity(entities::DeviceCredentials),
        schema.create_table_from_entity(entities::AlertRules),
        schema.create_table_from_entity(entities::ActiveProblems),
        schema.create_table_from_entity(entities::AlertHistory),
        schema.create_table_from_entity(entities::MaintenanceWindows),
        schema.create_table_from_entity(entities::PingSamples),
        schema.create_table_from_entity(entities::SweepSchedule),
    ] {
        connection
            .execute(connection.get_database_backend().build(&stmt))
            .await?;
    }
    Ok(())
}

/// Convenience: a `CurrentStateStore` bound to the shared in-memory connection.
pub async fn current_state_store() -> unet_core::datastore::CurrentStateStore {
    unet_core::datastore::CurrentStateStore::new(entity_db().await)
}

/// Run a closure within a SQLite savepoint on the shared connection.
/// All changes are rolled back afterwards, so tests can share one schema
/// instance without leaking rows between them.
pub async fn with_savepoint<F, Fut, T>(name: &str, f: F) -> T
where
    F: FnOnce(unet_core::datastore::CurrentStateStore) -> Fut,
    Fut: std::future::Future<Output = T>,
{
    let conn = entity_db().await;
    let backend = sea_orm::DatabaseBackend::Sqlite;
    let save = format!("SAVEPOINT {name}");
    let rollback = format!("ROLLBACK TO {name}");
    let release = format!("RELEASE {name}");
    let _ = conn.execute(Statement::from_string(backend, save)).await;
    let store = unet_core::datastore::CurrentStateStore::new(conn.clone());
    let out = f(store).await;
    let _ = conn
        .execute(Statement::from_string(backend, rollback))
        .await;
    let _ = conn.execute(Statement::from_string(backend, release)).await;
    out
}
