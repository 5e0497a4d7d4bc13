//! SeaORM entities backing the current-state store.

pub mod active_problems;
pub mod alert_history;
pub mod alert_rules;
pub mod branches;
pub mod device_credentials;
pub mod device_interfaces;
pub mod device_state;
pub mod devices;
pub mod maintenance_windows;
pub mod ping_samples;
pub mod sweep_schedule;

pub use active_problems::Entity as ActiveProblems;
pub use alert_history::Entity as AlertHistory;
pub use alert_rules::Entity as AlertRules;
pub use branches::Entity as Branches;
pub use device_credentials::Entity as DeviceCredentials;
pub use device_interfaces::Entity as DeviceInterfaces;
pub use device_state::Entity as DeviceState;
pub use devices::Entity as Devices;
pub use maintenance_windows::Entity as MaintenanceWindows;
pub use ping_samples::Entity as PingSamples;
pub use sweep_schedule::Entity as SweepSchedule;
