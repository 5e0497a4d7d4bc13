//! Credential vault: AES-256-GCM sealing keyed by a single master key.

use crate::error::{Error, Result};
use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use argon2::Argon2;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use zeroize::ZeroizeOnDrop;

/// A sealed secret as stored in the `device_credential` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedSecret {
    /// Base64-encoded ciphertext.
    pub ciphertext: String,
    /// Base64-encoded 96-bit GCM nonce.
    pub nonce: String,
    pub algorithm: String,
}

/// The master key used to seal and open every [`EncryptedSecret`]. Zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; 32],
}

impl MasterKey {
    #[must_use]
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    /// Derive a master key from an operator-supplied password using Argon2.
    /// `salt` should be stable across restarts (e.g. derived from the instance id).
    pub fn from_password(password: &str, salt: &[u8]) -> Result<Self> {
        use argon2::password_hash::{PasswordHasher, SaltString};

        let argon2 = Argon2::default();
        let salt_string = SaltString::encode_b64(salt)
            .map_err(|e| Error::config(format!("invalid credential salt: {e}")))?;
        let hash = argon2
            .hash_password(password.as_bytes(), &salt_string)
            .map_err(|e| Error::config(format!("failed to derive master key: {e}")))?;
        let hash_bytes = hash
            .hash
            .ok_or_else(|| Error::config("argon2 did not produce a hash output"))?;
        let raw = hash_bytes.as_bytes();
        if raw.len() < 32 {
            return Err(Error::config("derived key material shorter than 32 bytes"));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&raw[..32]);
        Ok(Self { key })
    }

    /// Load a master key from the raw 32 bytes in `CREDENTIAL_KEY`, base64-decoded.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| Error::config(format!("CREDENTIAL_KEY is not valid base64: {e}")))?;
        if bytes.len() != 32 {
            return Err(Error::config("CREDENTIAL_KEY must decode to exactly 32 bytes"));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes);
        Ok(Self { key })
    }
}

/// Seals and opens device credentials against a single [`MasterKey`].
pub struct CredentialVault {
    key: MasterKey,
}

impl CredentialVault {
    #[must_use]
    pub const fn new(key: MasterKey) -> Self {
        Self { key }
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new_from_slice(&self.key.key).expect("key is exactly 32 bytes")
    }

    /// Serialize `value` as JSON and seal it.
    pub fn seal<T: Serialize>(&self, value: &T) -> Result<EncryptedSecret> {
        let plaintext = serde_json::to_vec(value)?;
        let cipher = self.cipher();
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|e| Error::internal(format!("credential encryption failed: {e}")))?;
        Ok(EncryptedSecret {
            ciphertext: BASE64.encode(ciphertext),
            nonce: BASE64.encode(nonce),
            algorithm: "aes-256-gcm".to_string(),
        })
    }

    /// Open a sealed secret and deserialize it back into `T`.
    pub fn open<T: DeserializeOwned>(&self, secret: &EncryptedSecret) -> Result<T> {
        if secret.algorithm != "aes-256-gcm" {
            return Err(Error::internal(format!(
                "unsupported credential algorithm: {}",
                secret.algorithm
            )));
        }
        let ciphertext = BASE64
            .decode(&secret.ciphertext)
            .map_err(|e| Error::internal(format!("malformed credential ciphertext: {e}")))?;
        let nonce_bytes = BASE64
            .decode(&secret.nonce)
            .map_err(|e| Error::internal(format!("malformed credential nonce: {e}")))?;
        let nonce = Nonce::from_slice(&nonce_bytes);
        let plaintext = self
            .cipher()
            .decrypt(nonce, ciphertext.as_slice())
            .map_err(|e| Error::internal(format!("credential decryption failed: {e}")))?;
        Ok(serde_json::from_slice(&plaintext)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Community(String);

    #[test]
    fn seal_then_open_roundtrips() {
        let vault = CredentialVault::new(MasterKey::generate());
        let sealed = vault.seal(&Community("public".to_string())).unwrap();
        let opened: Community = vault.open(&sealed).unwrap();
        assert_eq!(opened, Community("public".to_string()));
    }

    #[test]
    fn wrong_key_fails_to_open() {
        let sealed = CredentialVault::new(MasterKey::generate())
            .seal(&Community("secret".to_string()))
            .unwrap();
        let other = CredentialVault::new(MasterKey::generate());
        assert!(other.open::<Community>(&sealed).is_err());
    }

    #[test]
    fn from_base64_rejects_wrong_length() {
        assert!(MasterKey::from_base64(&BASE64.encode(b"too short")).is_err());
    }
}
