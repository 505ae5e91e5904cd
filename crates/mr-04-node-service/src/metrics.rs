//! Request counters for `/v1/stats`.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use shared_types::ErrorKind;

/// Node service metrics.
#[derive(Default)]
pub struct ServiceMetrics {
    // Request counters
    pub requests_total: AtomicU64,
    pub requests_failed: AtomicU64,
    pub timeouts: AtomicU64,
    pub rejected_full: AtomicU64,

    // Mailbox traffic
    pub envelopes_accepted: AtomicU64,
    pub ciphertext_bytes_accepted: AtomicU64,
    pub envelopes_deleted: AtomicU64,

    // Registry traffic
    pub registrations: AtomicU64,
    pub unregistrations: AtomicU64,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one client request.
    pub fn record_request(&self, failure: Option<ErrorKind>) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        let Some(kind) = failure else {
            return;
        };
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
        match kind {
            ErrorKind::Timeout => {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
            }
            ErrorKind::MailboxFull => {
                self.rejected_full.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    pub fn record_envelope(&self, bytes: usize) {
        self.envelopes_accepted.fetch_add(1, Ordering::Relaxed);
        self.ciphertext_bytes_accepted
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_deleted(&self, count: usize) {
        self.envelopes_deleted
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_registration(&self) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unregistration(&self) {
        self.unregistrations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ServiceStats {
        ServiceStats {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            rejected_full: self.rejected_full.load(Ordering::Relaxed),
            envelopes_accepted: self.envelopes_accepted.load(Ordering::Relaxed),
            ciphertext_bytes_accepted: self.ciphertext_bytes_accepted.load(Ordering::Relaxed),
            envelopes_deleted: self.envelopes_deleted.load(Ordering::Relaxed),
            registrations: self.registrations.load(Ordering::Relaxed),
            unregistrations: self.unregistrations.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ServiceMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ServiceStats {
    pub requests_total: u64,
    pub requests_failed: u64,
    pub timeouts: u64,
    pub rejected_full: u64,
    pub envelopes_accepted: u64,
    pub ciphertext_bytes_accepted: u64,
    pub envelopes_deleted: u64,
    pub registrations: u64,
    pub unregistrations: u64,
}
