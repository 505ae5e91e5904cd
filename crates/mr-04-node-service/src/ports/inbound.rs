//! # Inbound Ports
//!
//! The client operations of a relay node, independent of transport.

use async_trait::async_trait;

use shared_types::{Fingerprint, Pseudonym, RelayError};

use crate::domain::{
    Ack, CountResponse, DeleteAllRequest, DeleteOneRequest, DeleteResponse, FetchQuery,
    FetchResponse, RegisterRequest, RegisterResponse, ResolveResponse, SendRequest,
    SendResponse, UnregisterRequest,
};

/// Client surface.
///
/// Every call is validated before delegation and bounded by the caller's
/// deadline. A call that times out after its local write completed keeps
/// that write.
#[async_trait]
pub trait NodeApi: Send + Sync {
    /// # Errors
    /// `PseudonymTaken`, `InvalidKey`, `InvalidInput`, `Unauthorized` when the key
    /// is already bound by a different owner
    async fn register(&self, request: RegisterRequest) -> Result<RegisterResponse, RelayError>;

    /// # Errors
    /// `NotFound`
    async fn resolve(
        &self,
        pseudonym: Pseudonym,
        deadline_ms: Option<u64>,
    ) -> Result<ResolveResponse, RelayError>;

    /// # Errors
    /// `Unauthorized`, `NotFound`
    async fn unregister(&self, request: UnregisterRequest) -> Result<Ack, RelayError>;

    /// # Errors
    /// `NotFound` (unknown pseudonym), `MailboxFull`, `InvalidInput`
    async fn send(&self, request: SendRequest) -> Result<SendResponse, RelayError>;

    async fn count(
        &self,
        fingerprint: Fingerprint,
        deadline_ms: Option<u64>,
    ) -> Result<CountResponse, RelayError>;

    /// # Errors
    /// `NotFound` when the mailbox never existed on this node
    async fn fetch(
        &self,
        fingerprint: Fingerprint,
        query: FetchQuery,
    ) -> Result<FetchResponse, RelayError>;

    /// # Errors
    /// `Unauthorized`, `IndexOutOfRange`
    async fn delete_one(&self, request: DeleteOneRequest) -> Result<DeleteResponse, RelayError>;

    /// # Errors
    /// `Unauthorized`
    async fn delete_all(&self, request: DeleteAllRequest) -> Result<DeleteResponse, RelayError>;
}
