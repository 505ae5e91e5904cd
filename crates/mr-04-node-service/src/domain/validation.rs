//! Request validation.
//!
//! Runs before delegation so a rejected request never reaches the registry
//! or the store.

use shared_types::{OwnerToken, PublicKey, RelayError};

use super::ServiceLimits;

pub fn validate_public_key(key: &PublicKey, limits: &ServiceLimits) -> Result<(), RelayError> {
    if key.is_empty() {
        return Err(RelayError::InvalidKey("public key is empty".into()));
    }
    if key.as_bytes().len() > limits.max_public_key_bytes {
        return Err(RelayError::InvalidKey(format!(
            "public key exceeds {} bytes",
            limits.max_public_key_bytes
        )));
    }
    Ok(())
}

pub fn validate_owner_token(token: &OwnerToken) -> Result<(), RelayError> {
    token.validate()
}

pub fn validate_ciphertext(ciphertext: &[u8], limits: &ServiceLimits) -> Result<(), RelayError> {
    if ciphertext.is_empty() {
        return Err(RelayError::InvalidInput("ciphertext is empty".into()));
    }
    if ciphertext.len() > limits.max_ciphertext_bytes {
        return Err(RelayError::InvalidInput(format!(
            "ciphertext is {} bytes (max: {})",
            ciphertext.len(),
            limits.max_ciphertext_bytes
        )));
    }
    Ok(())
}

pub fn validate_sender(sender: &[u8], limits: &ServiceLimits) -> Result<(), RelayError> {
    if sender.len() > limits.max_sender_bytes {
        return Err(RelayError::InvalidInput(format!(
            "sender exceeds {} bytes",
            limits.max_sender_bytes
        )));
    }
    Ok(())
}

/// Resolve the page size of a `Fetch`.
pub fn fetch_limit(requested: Option<usize>, limits: &ServiceLimits) -> Result<usize, RelayError> {
    match requested {
        None => Ok(limits.default_fetch_limit),
        Some(0) => Err(RelayError::InvalidInput("limit must be > 0".into())),
        Some(n) if n > limits.max_fetch_limit => Err(RelayError::InvalidInput(format!(
            "limit {} exceeds max_fetch_limit {}",
            n, limits.max_fetch_limit
        ))),
        Some(n) => Ok(n),
    }
}

pub fn validate_deadline(deadline_ms: Option<u64>) -> Result<(), RelayError> {
    if deadline_ms == Some(0) {
        return Err(RelayError::InvalidInput("deadline_ms must be > 0".into()));
    }
    Ok(())
}
