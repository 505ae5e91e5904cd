//! # Fingerprint Index
//!
//! Deterministic mapping from a public key to the fixed-length identifier
//! used as its mailbox address.
//!
//! ## Canonical Encoding
//!
//! ```text
//! SHA-256( "mailbox-relay/fingerprint/v1" || u32_be(len(key)) || key )
//! ```
//!
//! The length prefix removes any ambiguity between keys that share a prefix.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::entities::PublicKey;
use crate::errors::RelayError;

/// Domain separator for fingerprint derivation.
const FINGERPRINT_DOMAIN: &[u8] = b"mailbox-relay/fingerprint/v1";

/// Size of a fingerprint in bytes.
pub const FINGERPRINT_LEN: usize = 32;

/// Hash of a public key, used as the sole mailbox address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    /// Wrap raw fingerprint bytes.
    pub fn from_bytes(bytes: [u8; FINGERPRINT_LEN]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }

    /// Lowercase hex form (64 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse the hex form.
    pub fn from_hex(s: &str) -> Result<Self, RelayError> {
        let bytes = hex::decode(s)
            .map_err(|e| RelayError::InvalidInput(format!("fingerprint is not hex: {}", e)))?;
        let array: [u8; FINGERPRINT_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            RelayError::InvalidInput(format!(
                "fingerprint must be {} bytes, got {}",
                FINGERPRINT_LEN,
                b.len()
            ))
        })?;
        Ok(Self(array))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({:02x}{:02x}{:02x}{:02x}..)", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

impl FromStr for Fingerprint {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Self::from_hex(&s).map_err(serde::de::Error::custom)
        } else {
            <[u8; FINGERPRINT_LEN]>::deserialize(deserializer).map(Self)
        }
    }
}

/// Compute the fingerprint of a public key.
///
/// # Errors
///
/// Returns `InvalidKey` for an empty key.
pub fn fingerprint(pubkey: &PublicKey) -> Result<Fingerprint, RelayError> {
    let key = pubkey.as_bytes();
    if key.is_empty() {
        return Err(RelayError::InvalidKey("public key is empty".into()));
    }

    let mut hasher = Sha256::new();
    hasher.update(FINGERPRINT_DOMAIN);
    hasher.update((key.len() as u32).to_be_bytes());
    hasher.update(key);
    Ok(Fingerprint(hasher.finalize().into()))
}
