//! Encryption-at-rest for device SNMP credentials.
//!
//! The vault seals community strings / v3 auth+priv secrets with AES-256-GCM
//! under a single master key supplied by the operator (`CREDENTIAL_KEY`, or a
//! password run through Argon2). Sealed payloads are stored in the
//! `device_credential` table via [`crate::entities::device_credentials`];
//! the master key itself never touches the database.

mod main;

pub use main::{CredentialVault, EncryptedSecret, MasterKey};
