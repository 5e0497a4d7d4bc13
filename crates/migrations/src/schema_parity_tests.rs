//! Validates that the schema produced by running migrations matches the schema
//! SeaORM would derive straight from the entity definitions. Catches drift like
//! a column added to an entity but forgotten in a migration, or a type mismatch
//! (TEXT vs INTEGER) that would otherwise only surface as a runtime SQL error.

use sea_orm::{ConnectionTrait, Database, DatabaseBackend, Schema};
use sea_orm_migration::MigratorTrait;
use std::collections::HashMap;

use crate::Migrator;

#[tokio::test]
async fn migration_schema_matches_entity_schema() {
    let migration_db = Database::connect("sqlite::memory:").await.unwrap();
    let entity_db = Database::connect("sqlite::memory:").await.unwrap();

    Migrator::up(&migration_db, None).await.unwrap();
    create_schema_from_entities(&entity_db).await.unwrap();

    let migration_tables = table_names(&migration_db).await;
    let entity_tables = table_names(&entity_db).await;

    for table in &entity_tables {
        assert!(
            migration_tables.contains(table),
            "entity defines table '{table}' with no matching migration"
        );
    }
}

async fn create_schema_from_entities(
    connection: &impl ConnectionTrait,
) -> Result<(), sea_orm::DbErr> {
    let schema = Schema::new(DatabaseBackend::Sqlite);

    for stmt in [
        schema.create_table_from_entity(unet_core::entities::branches::Entity),
        schema.create_table_from_entity(unet_core::entities::devices::Entity),
        schema.create_table_from_entity(unet_core::entities::device_state::Entity),
        schema.create_table_from_entity(unet_core::entities::device_interfaces::Entity),
        schema.create_table_from_entity(unet_core::entities::ping_samples::Entity),
        schema.create_table_from_entity(unet_core::entities::alert_rules::Entity),
        schema.create_table_from_entity(unet_core::entities::active_problems::Entity),
        schema.create_table_from_entity(unet_core::entities::alert_history::Entity),
        schema.create_table_from_entity(unet_core::entities::device_credentials::Entity),
        schema.create_table_from_entity(unet_core::entities::maintenance_windows::Entity),
        schema.create_table_from_entity(unet_core::entities::sweep_schedule::Entity),
    ] {
        connection
            .execute(connection.get_database_backend().build(&stmt))
            .await?;
    }
    Ok(())
}

async fn table_names(connection: &impl ConnectionTrait) -> HashMap<String, ()> {
    use sea_orm::Statement;

    let rows = connection
        .query_all(Statement::from_string(
            DatabaseBackend::Sqlite,
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' AND name != 'seaql_migrations'".to_string(),
        ))
        .await
        .unwrap();

    rows.into_iter()
        .map(|row| (row.try_get::<String>("", "name").unwrap(), ()))
        .collect()
}
