//! Request limits for the client surface.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Limits applied to every client request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceLimits {
    /// Largest accepted ciphertext.
    pub max_ciphertext_bytes: usize,
    /// Largest accepted sender token.
    pub max_sender_bytes: usize,
    /// Largest accepted public key.
    pub max_public_key_bytes: usize,
    /// Upper bound for `Fetch` page size.
    pub max_fetch_limit: usize,
    /// Page size when `Fetch` omits `limit`.
    pub default_fetch_limit: usize,
    /// Deadline applied when the caller supplies none.
    pub default_deadline_ms: u64,
    /// Caller deadlines are clamped to this.
    pub max_deadline_ms: u64,
    /// HTTP body limit. Leaves room for hex encoding of the largest ciphertext.
    pub max_body_bytes: usize,
}

impl Default for ServiceLimits {
    fn default() -> Self {
        Self {
            max_ciphertext_bytes: 64 * 1024,
            max_sender_bytes: 256,
            max_public_key_bytes: 1024,
            max_fetch_limit: 256,
            default_fetch_limit: 50,
            default_deadline_ms: 5_000,
            max_deadline_ms: 60_000,
            max_body_bytes: 256 * 1024,
        }
    }
}

impl ServiceLimits {
    /// Effective deadline for a request.
    pub fn deadline(&self, requested_ms: Option<u64>) -> Duration {
        let ms = requested_ms
            .unwrap_or(self.default_deadline_ms)
            .min(self.max_deadline_ms);
        Duration::from_millis(ms)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_ciphertext_bytes == 0 {
            return Err("max_ciphertext_bytes must be > 0".into());
        }
        if self.max_fetch_limit == 0 {
            return Err("max_fetch_limit must be > 0".into());
        }
        if self.default_fetch_limit == 0 || self.default_fetch_limit > self.max_fetch_limit {
            return Err("default_fetch_limit must be in 1..=max_fetch_limit".into());
        }
        if self.default_deadline_ms == 0 || self.default_deadline_ms > self.max_deadline_ms {
            return Err("default_deadline_ms must be in 1..=max_deadline_ms".into());
        }
        // Hex doubles the ciphertext on the wire.
        if self.max_body_bytes < self.max_ciphertext_bytes * 2 {
            return Err("max_body_bytes must hold a hex-encoded max_ciphertext_bytes".into());
        }
        Ok(())
    }
}
