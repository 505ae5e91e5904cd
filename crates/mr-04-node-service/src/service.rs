//! # Node Service
//!
//! Validates client requests, runs them against the registry and the
//! mailbox store under the caller's deadline, and hands local changes to
//! replication.
//!
//! ## Deadlines
//!
//! Store and registry calls are synchronous and take short per-key locks.
//! Each one runs on the blocking pool, and the handler waits for it with
//! `tokio::time::timeout`. On expiry the caller gets `Timeout` while the
//! task runs to completion, so an append is either fully applied or not
//! applied at all. The replication hint is sent from inside the task for the
//! same reason.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info};

use mr_01_registry::{RegistryApi, RegistryChanges};
use mr_02_mailbox_store::MailboxStoreApi;
use mr_03_replication::{
    AdvertiseAck, Advertisement, PullRequest, PullResponse, RegistryPullRequest, ReplicationApi,
};
use shared_types::{Fingerprint, NodeId, Pseudonym, RelayError};

use crate::domain::{
    fetch_limit, validate_ciphertext, validate_deadline, validate_owner_token,
    validate_public_key, validate_sender, Ack, CountResponse, DeleteAllRequest,
    DeleteOneRequest, DeleteResponse, FetchQuery, FetchResponse, NodeStats, RegisterRequest,
    RegisterResponse, ResolveResponse, SendRequest, SendResponse, SendTarget, ServiceLimits,
    UnregisterRequest,
};
use crate::metrics::ServiceMetrics;
use crate::ports::inbound::NodeApi;

/// Node Service.
pub struct NodeService {
    node_id: NodeId,
    limits: ServiceLimits,
    registry: Arc<dyn RegistryApi>,
    store: Arc<dyn MailboxStoreApi>,
    replication: Arc<dyn ReplicationApi>,
    metrics: Arc<ServiceMetrics>,
}

impl NodeService {
    pub fn new(
        node_id: NodeId,
        limits: ServiceLimits,
        registry: Arc<dyn RegistryApi>,
        store: Arc<dyn MailboxStoreApi>,
        replication: Arc<dyn ReplicationApi>,
    ) -> Self {
        Self {
            node_id,
            limits,
            registry,
            store,
            replication,
            metrics: Arc::new(ServiceMetrics::new()),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn limits(&self) -> &ServiceLimits {
        &self.limits
    }

    pub fn metrics(&self) -> Arc<ServiceMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Snapshot for `/v1/stats`.
    pub fn stats(&self) -> NodeStats {
        NodeStats {
            node_id: self.node_id.to_string(),
            mailboxes: self.store.mailbox_count(),
            service: self.metrics.snapshot(),
            replication: self.replication.stats(),
            peers: self.replication.peer_status(),
        }
    }

    /// Run `job` on the blocking pool and wait at most the effective deadline.
    async fn run_blocking<R, F>(
        &self,
        operation: &'static str,
        deadline_ms: Option<u64>,
        job: F,
    ) -> Result<R, RelayError>
    where
        F: FnOnce() -> Result<R, RelayError> + Send + 'static,
        R: Send + 'static,
    {
        validate_deadline(deadline_ms)?;
        let deadline = self.limits.deadline(deadline_ms);

        match tokio::time::timeout(deadline, tokio::task::spawn_blocking(job)).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(RelayError::Internal(format!(
                "{} worker failed: {}",
                operation, join_error
            ))),
            Err(_) => Err(RelayError::Timeout(format!(
                "{} exceeded {} ms",
                operation,
                deadline.as_millis()
            ))),
        }
    }

    /// Count the outcome and log failures.
    fn observe<R>(
        &self,
        operation: &'static str,
        result: Result<R, RelayError>,
    ) -> Result<R, RelayError> {
        match &result {
            Ok(_) => self.metrics.record_request(None),
            Err(err) => {
                self.metrics.record_request(Some(err.kind()));
                match err {
                    RelayError::Storage(_) | RelayError::Internal(_) => {
                        error!(operation, error = %err, "Request failed");
                    }
                    _ => debug!(operation, error = %err, "Request rejected"),
                }
            }
        }
        result
    }

    // =========================================================================
    // PEER SURFACE
    // =========================================================================

    /// `Advertise` from a peer.
    pub async fn advertise(&self, advertisement: Advertisement) -> Result<AdvertiseAck, RelayError> {
        let replication = Arc::clone(&self.replication);
        self.run_blocking("advertise", None, move || {
            Ok(replication.handle_advertise(advertisement))
        })
        .await
    }

    /// `PullSince` from a peer.
    pub async fn pull_since(&self, request: PullRequest) -> Result<PullResponse, RelayError> {
        let replication = Arc::clone(&self.replication);
        self.run_blocking("pull_since", None, move || Ok(replication.serve_pull(request)))
            .await
    }

    /// `PullRegistry` from a peer.
    pub async fn pull_registry(
        &self,
        request: RegistryPullRequest,
    ) -> Result<RegistryChanges, RelayError> {
        let replication = Arc::clone(&self.replication);
        self.run_blocking("pull_registry", None, move || {
            Ok(replication.serve_registry(request.since, request.limit))
        })
        .await
    }
}

#[async_trait]
impl NodeApi for NodeService {
    async fn register(&self, request: RegisterRequest) -> Result<RegisterResponse, RelayError> {
        let result = async {
            validate_public_key(&request.public_key, &self.limits)?;
            validate_owner_token(&request.owner_token)?;

            let registry = Arc::clone(&self.registry);
            let metrics = Arc::clone(&self.metrics);
            let RegisterRequest {
                pseudonym,
                public_key,
                owner_token,
                deadline_ms,
            } = request;

            self.run_blocking("register", deadline_ms, move || {
                let registration = registry.register(pseudonym, public_key, &owner_token)?;
                metrics.record_registration();
                info!(
                    pseudonym = %registration.pseudonym,
                    fingerprint = %registration.fingerprint,
                    "Pseudonym registered"
                );
                Ok(RegisterResponse {
                    pseudonym: registration.pseudonym,
                    fingerprint: registration.fingerprint,
                })
            })
            .await
        }
        .await;
        self.observe("register", result)
    }

    async fn resolve(
        &self,
        pseudonym: Pseudonym,
        deadline_ms: Option<u64>,
    ) -> Result<ResolveResponse, RelayError> {
        let registry = Arc::clone(&self.registry);
        let result = self
            .run_blocking("resolve", deadline_ms, move || {
                let registration = registry.resolve(&pseudonym)?;
                Ok(ResolveResponse {
                    pseudonym: registration.pseudonym,
                    public_key: registration.public_key,
                    fingerprint: registration.fingerprint,
                })
            })
            .await;
        self.observe("resolve", result)
    }

    async fn unregister(&self, request: UnregisterRequest) -> Result<Ack, RelayError> {
        let result = async {
            validate_owner_token(&request.owner_token)?;

            let registry = Arc::clone(&self.registry);
            let metrics = Arc::clone(&self.metrics);
            let UnregisterRequest {
                pseudonym,
                owner_token,
                deadline_ms,
            } = request;

            self.run_blocking("unregister", deadline_ms, move || {
                registry.unregister(&pseudonym, &owner_token)?;
                metrics.record_unregistration();
                info!(pseudonym = %pseudonym, "Pseudonym unregistered");
                Ok(Ack {})
            })
            .await
        }
        .await;
        self.observe("unregister", result)
    }

    async fn send(&self, request: SendRequest) -> Result<SendResponse, RelayError> {
        let result = async {
            validate_ciphertext(&request.ciphertext, &self.limits)?;
            validate_sender(&request.sender, &self.limits)?;

            let registry = Arc::clone(&self.registry);
            let store = Arc::clone(&self.store);
            let replication = Arc::clone(&self.replication);
            let metrics = Arc::clone(&self.metrics);
            let SendRequest {
                to,
                ciphertext,
                sender,
                deadline_ms,
            } = request;

            self.run_blocking("send", deadline_ms, move || {
                let fingerprint = match to {
                    SendTarget::Fingerprint(fingerprint) => fingerprint,
                    SendTarget::Pseudonym(pseudonym) => registry.resolve(&pseudonym)?.fingerprint,
                };
                let bytes = ciphertext.len();
                let sequence = store.append(&fingerprint, sender, ciphertext)?;
                metrics.record_envelope(bytes);
                replication.announce(fingerprint);
                debug!(fingerprint = %fingerprint, sequence, bytes, "Envelope accepted");
                Ok(SendResponse {
                    fingerprint,
                    sequence,
                })
            })
            .await
        }
        .await;
        self.observe("send", result)
    }

    async fn count(
        &self,
        fingerprint: Fingerprint,
        deadline_ms: Option<u64>,
    ) -> Result<CountResponse, RelayError> {
        let store = Arc::clone(&self.store);
        let result = self
            .run_blocking("count", deadline_ms, move || {
                Ok(CountResponse {
                    fingerprint,
                    count: store.count(&fingerprint),
                })
            })
            .await;
        self.observe("count", result)
    }

    async fn fetch(
        &self,
        fingerprint: Fingerprint,
        query: FetchQuery,
    ) -> Result<FetchResponse, RelayError> {
        let result = async {
            let limit = fetch_limit(query.limit, &self.limits)?;
            let store = Arc::clone(&self.store);

            self.run_blocking("fetch", query.deadline_ms, move || {
                Ok(FetchResponse {
                    fingerprint,
                    envelopes: store.fetch(&fingerprint, query.from, limit)?,
                })
            })
            .await
        }
        .await;
        self.observe("fetch", result)
    }

    async fn delete_one(&self, request: DeleteOneRequest) -> Result<DeleteResponse, RelayError> {
        let result = async {
            validate_owner_token(&request.owner_token)?;

            let store = Arc::clone(&self.store);
            let replication = Arc::clone(&self.replication);
            let metrics = Arc::clone(&self.metrics);
            let DeleteOneRequest {
                fingerprint,
                index,
                owner_token,
                deadline_ms,
            } = request;

            self.run_blocking("delete_one", deadline_ms, move || {
                store.delete_one(&fingerprint, index, &owner_token)?;
                metrics.record_deleted(1);
                replication.announce(fingerprint);
                debug!(fingerprint = %fingerprint, index, "Envelope deleted");
                Ok(DeleteResponse { deleted: 1 })
            })
            .await
        }
        .await;
        self.observe("delete_one", result)
    }

    async fn delete_all(&self, request: DeleteAllRequest) -> Result<DeleteResponse, RelayError> {
        let result = async {
            validate_owner_token(&request.owner_token)?;

            let store = Arc::clone(&self.store);
            let replication = Arc::clone(&self.replication);
            let metrics = Arc::clone(&self.metrics);
            let DeleteAllRequest {
                fingerprint,
                owner_token,
                deadline_ms,
            } = request;

            self.run_blocking("delete_all", deadline_ms, move || {
                let deleted = store.delete_all(&fingerprint, &owner_token)?;
                if deleted > 0 {
                    metrics.record_deleted(deleted);
                    replication.announce(fingerprint);
                }
                debug!(fingerprint = %fingerprint, deleted, "Mailbox cleared");
                Ok(DeleteResponse { deleted })
            })
            .await
        }
        .await;
        self.observe("delete_all", result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::RegistryOwnerDirectory;
    use mr_01_registry::RegistryService;
    use mr_02_mailbox_store::{InMemoryPersistence, MailboxStoreService, StoreConfig};
    use mr_03_replication::{LoopbackTransport, ReplicationService, SyncConfig};
    use shared_types::{
        fingerprint, Envelope, ErrorKind, LogEntry, OwnerToken, PublicKey, StoredEnvelope,
        SystemTimeSource, TimeSource, Tombstone,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn node_with_store(
        limits: ServiceLimits,
        wrap: impl FnOnce(Arc<MailboxStoreService>) -> Arc<dyn MailboxStoreApi>,
        store_config: StoreConfig,
    ) -> NodeService {
        let clock: Arc<dyn TimeSource> = Arc::new(SystemTimeSource);
        let node_id = NodeId([9; 16]);
        let registry: Arc<dyn RegistryApi> = Arc::new(RegistryService::new(node_id, clock.clone()));
        let store = Arc::new(
            MailboxStoreService::open(
                node_id,
                store_config,
                Arc::new(RegistryOwnerDirectory::new(registry.clone())),
                Arc::new(InMemoryPersistence::new()),
                clock.clone(),
            )
            .unwrap(),
        );
        let store = wrap(store);
        let replication = Arc::new(ReplicationService::new(
            node_id,
            "node-9",
            SyncConfig::default(),
            store.clone(),
            registry.clone(),
            Arc::new(LoopbackTransport::new()),
            clock,
        ));
        NodeService::new(node_id, limits, registry, store, replication)
    }

    fn node() -> NodeService {
        node_with_store(ServiceLimits::default(), |s| s, StoreConfig::default())
    }

    fn token() -> OwnerToken {
        OwnerToken::new(b"tj-owner".to_vec())
    }

    fn key() -> PublicKey {
        PublicKey::new(b"tj-public-key".to_vec())
    }

    async fn register_tj(node: &NodeService) -> Fingerprint {
        node.register(RegisterRequest {
            pseudonym: "tj".parse().unwrap(),
            public_key: key(),
            owner_token: token(),
            deadline_ms: None,
        })
        .await
        .unwrap()
        .fingerprint
    }

    fn send_to(to: SendTarget, ciphertext: &[u8]) -> SendRequest {
        SendRequest {
            to,
            ciphertext: ciphertext.to_vec(),
            sender: Vec::new(),
            deadline_ms: None,
        }
    }

    #[tokio::test]
    async fn test_register_send_fetch_delete_flow() {
        let node = node();
        let fp = register_tj(&node).await;
        assert_eq!(fp, fingerprint(&key()).unwrap());

        let resolved = node.resolve("tj".parse().unwrap(), None).await.unwrap();
        assert_eq!(resolved.public_key, key());

        let first = node
            .send(send_to(SendTarget::Pseudonym("tj".parse().unwrap()), b"one"))
            .await
            .unwrap();
        let second = node
            .send(send_to(SendTarget::Fingerprint(fp), b"two"))
            .await
            .unwrap();
        assert_eq!((first.sequence, second.sequence), (0, 1));
        assert_eq!(node.count(fp, None).await.unwrap().count, 2);

        let page = node.fetch(fp, FetchQuery::default()).await.unwrap();
        let bodies: Vec<&[u8]> = page
            .envelopes
            .iter()
            .map(|e| e.envelope.ciphertext.as_slice())
            .collect();
        assert_eq!(bodies, vec![&b"one"[..], &b"two"[..]]);

        node.delete_one(DeleteOneRequest {
            fingerprint: fp,
            index: 0,
            owner_token: token(),
            deadline_ms: None,
        })
        .await
        .unwrap();
        assert_eq!(node.count(fp, None).await.unwrap().count, 1);

        let cleared = node
            .delete_all(DeleteAllRequest {
                fingerprint: fp,
                owner_token: token(),
                deadline_ms: None,
            })
            .await
            .unwrap();
        assert_eq!(cleared.deleted, 1);
        assert_eq!(node.count(fp, None).await.unwrap().count, 0);
    }

    #[tokio::test]
    async fn test_send_to_unknown_pseudonym_is_not_found() {
        let node = node();
        let err = node
            .send(send_to(SendTarget::Pseudonym("ghost".parse().unwrap()), b"x"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_fourth_send_hits_mailbox_cap() {
        let node = node_with_store(
            ServiceLimits::default(),
            |s| s,
            StoreConfig {
                mailbox_cap: 3,
                ..StoreConfig::default()
            },
        );
        let fp = register_tj(&node).await;

        for body in [&b"a"[..], b"b", b"c"] {
            node.send(send_to(SendTarget::Fingerprint(fp), body))
                .await
                .unwrap();
        }
        let err = node
            .send(send_to(SendTarget::Fingerprint(fp), b"d"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MailboxFull);
        assert_eq!(node.stats().service.rejected_full, 1);
    }

    #[tokio::test]
    async fn test_validation_runs_before_delegation() {
        let node = node_with_store(
            ServiceLimits {
                max_ciphertext_bytes: 4,
                ..ServiceLimits::default()
            },
            |s| s,
            StoreConfig::default(),
        );

        let err = node
            .register(RegisterRequest {
                pseudonym: "tj".parse().unwrap(),
                public_key: PublicKey::new(Vec::new()),
                owner_token: token(),
                deadline_ms: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidKey);
        assert!(node.resolve("tj".parse().unwrap(), None).await.is_err());

        let fp = Fingerprint::from_bytes([3; 32]);
        let err = node
            .send(send_to(SendTarget::Fingerprint(fp), b"too long"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(node.count(fp, None).await.unwrap().count, 0);

        let err = node
            .fetch(
                fp,
                FetchQuery {
                    limit: Some(10_000),
                    ..FetchQuery::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = node.count(fp, Some(0)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_delete_with_wrong_token_is_unauthorized() {
        let node = node();
        let fp = register_tj(&node).await;
        node.send(send_to(SendTarget::Fingerprint(fp), b"keep"))
            .await
            .unwrap();

        let err = node
            .delete_one(DeleteOneRequest {
                fingerprint: fp,
                index: 0,
                owner_token: OwnerToken::new(b"intruder".to_vec()),
                deadline_ms: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(node.count(fp, None).await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_fetch_unknown_mailbox_is_not_found() {
        let node = node();
        let err = node
            .fetch(Fingerprint::from_bytes([5; 32]), FetchQuery::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    /// Store whose appends take longer than the test deadline.
    struct SlowAppends {
        inner: Arc<MailboxStoreService>,
        delay: Duration,
        completed: Arc<AtomicUsize>,
    }

    impl MailboxStoreApi for SlowAppends {
        fn append(
            &self,
            fingerprint: &Fingerprint,
            sender: Vec<u8>,
            ciphertext: Vec<u8>,
        ) -> Result<u64, RelayError> {
            std::thread::sleep(self.delay);
            let sequence = self.inner.append(fingerprint, sender, ciphertext)?;
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(sequence)
        }

        fn count(&self, fingerprint: &Fingerprint) -> usize {
            self.inner.count(fingerprint)
        }

        fn get(&self, fingerprint: &Fingerprint, index: u64) -> Result<StoredEnvelope, RelayError> {
            self.inner.get(fingerprint, index)
        }

        fn fetch(
            &self,
            fingerprint: &Fingerprint,
            from: usize,
            limit: usize,
        ) -> Result<Vec<StoredEnvelope>, RelayError> {
            self.inner.fetch(fingerprint, from, limit)
        }

        fn delete_one(
            &self,
            fingerprint: &Fingerprint,
            index: u64,
            token: &OwnerToken,
        ) -> Result<(), RelayError> {
            self.inner.delete_one(fingerprint, index, token)
        }

        fn delete_all(
            &self,
            fingerprint: &Fingerprint,
            token: &OwnerToken,
        ) -> Result<usize, RelayError> {
            self.inner.delete_all(fingerprint, token)
        }

        fn head(&self, fingerprint: &Fingerprint) -> Option<u64> {
            self.inner.head(fingerprint)
        }

        fn entries_since(
            &self,
            fingerprint: &Fingerprint,
            since: Option<u64>,
            limit: usize,
        ) -> Vec<LogEntry> {
            self.inner.entries_since(fingerprint, since, limit)
        }

        fn merge_envelope(
            &self,
            fingerprint: &Fingerprint,
            envelope: Envelope,
        ) -> Result<bool, RelayError> {
            self.inner.merge_envelope(fingerprint, envelope)
        }

        fn merge_tombstone(&self, tombstone: Tombstone) -> Result<bool, RelayError> {
            self.inner.merge_tombstone(tombstone)
        }

        fn compact(&self) -> Result<usize, RelayError> {
            self.inner.compact()
        }

        fn mailbox_count(&self) -> usize {
            self.inner.mailbox_count()
        }

        fn hosted(&self, after: Option<&Fingerprint>, limit: usize) -> Vec<(Fingerprint, u64)> {
            self.inner.hosted(after, limit)
        }
    }

    #[tokio::test]
    async fn test_deadline_returns_timeout_without_rolling_back() {
        let completed = Arc::new(AtomicUsize::new(0));
        let counter = completed.clone();
        let node = node_with_store(
            ServiceLimits::default(),
            move |inner| {
                Arc::new(SlowAppends {
                    inner,
                    delay: Duration::from_millis(200),
                    completed: counter,
                })
            },
            StoreConfig::default(),
        );
        let fp = Fingerprint::from_bytes([4; 32]);

        let mut request = send_to(SendTarget::Fingerprint(fp), b"late");
        request.deadline_ms = Some(20);
        let err = node.send(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(completed.load(Ordering::SeqCst), 1);
        assert_eq!(node.count(fp, None).await.unwrap().count, 1);
        assert_eq!(node.stats().service.timeouts, 1);
    }

    #[tokio::test]
    async fn test_stats_count_requests() {
        let node = node();
        let fp = register_tj(&node).await;
        node.send(send_to(SendTarget::Fingerprint(fp), b"hello"))
            .await
            .unwrap();
        let _ = node.resolve("nobody".parse().unwrap(), None).await;

        let stats = node.stats();
        assert_eq!(stats.mailboxes, 1);
        assert_eq!(stats.service.requests_total, 3);
        assert_eq!(stats.service.requests_failed, 1);
        assert_eq!(stats.service.registrations, 1);
        assert_eq!(stats.service.envelopes_accepted, 1);
        assert_eq!(stats.service.ciphertext_bytes_accepted, 5);
        assert_eq!(stats.node_id, NodeId([9; 16]).to_string());
    }

    #[tokio::test]
    async fn test_peer_pull_serves_local_log() {
        let node = node();
        let fp = register_tj(&node).await;
        node.send(send_to(SendTarget::Fingerprint(fp), b"x"))
            .await
            .unwrap();

        let response = node
            .pull_since(PullRequest {
                fingerprint: fp,
                since: None,
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(response.head, Some(0));
        assert_eq!(response.entries.len(), 1);

        let changes = node
            .pull_registry(RegistryPullRequest { since: 0, limit: 10 })
            .await
            .unwrap();
        assert_eq!(changes.records.len(), 1);
    }
}
