#![deny(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]

pub use sea_orm_migration::prelude::*;

mod m20260101_000001_create_branches_table;
mod m20260101_000002_create_devices_table;
mod m20260101_000003_create_current_state_tables;
mod m20260101_000004_create_alerting_tables;
mod m20260101_000005_create_device_credentials_table;
mod m20260101_000006_create_sweep_schedule_table;

#[cfg(test)]
mod schema_parity_tests;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260101_000001_create_branches_table::Migration),
            Box::new(m20260101_000002_create_devices_table::Migration),
            Box::new(m20260101_000003_create_current_state_tables::Migration),
            Box::new(m20260101_000004_create_alerting_tables::Migration),
            Box::new(m20260101_000005_create_device_credentials_table::Migration),
            Box::new(m20260101_000006_create_sweep_schedule_table::Migration),
        ]
    }
}
