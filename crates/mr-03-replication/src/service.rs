//! # Replication Service
//!
//! Pull-based anti-entropy between relay nodes.
//!
//! ## Session (one per peer, per tick)
//!
//! 1. `PullRegistry(since)` until caught up, so owner commitments are known
//!    before any tombstone is checked.
//! 2. For each fingerprint the peer advertised ahead of our high-water mark:
//!    `PullSince(fingerprint, since)` in batches, merging each entry.
//! 3. `Advertise` our own heads: locally changed fingerprints first, then the
//!    next slice of hosted mailboxes.
//!
//! Store and peer locks are never held across network I/O. A failed or
//! timed-out session backs off exponentially; replication errors are never
//! surfaced to clients.

use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

use mr_01_registry::{RegistryApi, RegistryChanges};
use mr_02_mailbox_store::MailboxStoreApi;
use shared_types::{Fingerprint, LogEntry, NodeId, RelayError, SyncItem, TimeSource};

use crate::domain::{
    AdvertiseAck, Advertisement, FingerprintHead, PeerState, PeerStatus, PullRequest,
    PullResponse, SyncConfig,
};
use crate::ports::inbound::{PeerSyncApi, ReplicationApi};
use crate::ports::outbound::PeerTransport;

// =============================================================================
// METRICS
// =============================================================================

#[derive(Default)]
struct ReplicationMetrics {
    sessions_ok: AtomicU64,
    sessions_failed: AtomicU64,
    envelopes_merged: AtomicU64,
    tombstones_merged: AtomicU64,
    tombstones_rejected: AtomicU64,
    registry_records_merged: AtomicU64,
}

/// Counters exposed through `/v1/stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplicationStats {
    pub peers: usize,
    pub active_peers: usize,
    pub sessions_ok: u64,
    pub sessions_failed: u64,
    pub envelopes_merged: u64,
    pub tombstones_merged: u64,
    pub tombstones_rejected: u64,
    pub registry_records_merged: u64,
}

/// What one successful session moved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub registry_records: usize,
    pub envelopes: usize,
    pub tombstones: usize,
    pub advertised: usize,
}

/// Result of merging one pulled log entry.
enum Merged {
    Envelope,
    Tombstone,
    Duplicate,
    /// Tombstone failed verification; skipped for good.
    Rejected,
    /// Owner not known yet; retry the rest of the log later.
    Blocked,
}

struct PeerHandle {
    state: Mutex<PeerState>,
    wake: Notify,
    loop_started: AtomicBool,
}

// =============================================================================
// SERVICE
// =============================================================================

/// Replication Service.
///
/// Generic over the transport so tests run whole clusters in-process.
pub struct ReplicationService<T: PeerTransport> {
    node_id: NodeId,
    /// Address peers should use to reach this node.
    address: String,
    config: SyncConfig,
    store: Arc<dyn MailboxStoreApi>,
    registry: Arc<dyn RegistryApi>,
    transport: Arc<T>,
    clock: Arc<dyn TimeSource>,
    peers: DashMap<String, Arc<PeerHandle>>,
    peer_added: Notify,
    metrics: ReplicationMetrics,
}

impl<T: PeerTransport> ReplicationService<T> {
    pub fn new(
        node_id: NodeId,
        address: impl Into<String>,
        config: SyncConfig,
        store: Arc<dyn MailboxStoreApi>,
        registry: Arc<dyn RegistryApi>,
        transport: Arc<T>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            node_id,
            address: address.into(),
            config,
            store,
            registry,
            transport,
            clock,
            peers: DashMap::new(),
            peer_added: Notify::new(),
            metrics: ReplicationMetrics::default(),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Start tracking a peer. Returns `false` for self, duplicates, or when
    /// `max_peers` is reached.
    pub fn add_peer(&self, address: &str) -> bool {
        if address == self.address || self.peers.contains_key(address) {
            return false;
        }
        if self.peers.len() >= self.config.max_peers {
            warn!(peer = %address, max = self.config.max_peers, "Peer limit reached, ignoring");
            return false;
        }

        let handle = PeerHandle {
            state: Mutex::new(PeerState::new(address, &self.config)),
            wake: Notify::new(),
            loop_started: AtomicBool::new(false),
        };
        self.peers.insert(address.to_string(), Arc::new(handle));
        self.peer_added.notify_one();
        info!(peer = %address, "Peer added");
        true
    }

    pub fn peer_addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.peers.iter().map(|p| p.key().clone()).collect();
        addresses.sort();
        addresses
    }

    fn peer(&self, address: &str) -> Option<Arc<PeerHandle>> {
        self.peers.get(address).map(|p| p.value().clone())
    }

    /// Queue `fingerprint` for advertisement to every peer except `except`.
    fn fan_out(&self, fingerprint: Fingerprint, except: Option<&str>) {
        for peer in self.peers.iter() {
            if Some(peer.key().as_str()) == except {
                continue;
            }
            peer.state.lock().outbound.push(fingerprint);
            peer.wake.notify_one();
        }
    }

    fn jitter(delay: Duration) -> Duration {
        let spread = (delay.as_millis() as u64) / 5;
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }

    // =========================================================================
    // CLIENT SIDE
    // =========================================================================

    /// Run one bounded session with `address` and record the outcome.
    pub async fn sync_with_peer(&self, address: &str) -> Result<SessionReport, RelayError> {
        let peer = self
            .peer(address)
            .ok_or_else(|| RelayError::NotFound(format!("peer {}", address)))?;

        let outcome =
            match tokio::time::timeout(self.config.session_timeout(), self.session(address, &peer))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(RelayError::Timeout(format!("session with {}", address))),
            };

        match &outcome {
            Ok(report) => {
                peer.state.lock().record_success(self.clock.now_ms());
                self.metrics.sessions_ok.fetch_add(1, Ordering::Relaxed);
                if report.envelopes + report.tombstones + report.registry_records > 0 {
                    debug!(
                        peer = %address,
                        envelopes = report.envelopes,
                        tombstones = report.tombstones,
                        registry = report.registry_records,
                        "Sync session merged entries"
                    );
                }
            }
            Err(e) => {
                let (retry, active) = {
                    let mut state = peer.state.lock();
                    (state.record_failure(&self.config), state.active)
                };
                self.metrics.sessions_failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    peer = %address,
                    error = %e,
                    retry_in_ms = retry.as_millis() as u64,
                    active,
                    "Sync session failed"
                );
            }
        }
        outcome
    }

    async fn session(&self, address: &str, peer: &PeerHandle) -> Result<SessionReport, RelayError> {
        let mut report = SessionReport {
            registry_records: self.pull_registry(address, peer).await?,
            ..SessionReport::default()
        };

        let pulls = peer.state.lock().pending.take(self.config.max_pulls_per_session);
        for (i, fingerprint) in pulls.iter().enumerate() {
            match self.pull_mailbox(address, peer, fingerprint).await {
                Ok((envelopes, tombstones)) => {
                    report.envelopes += envelopes;
                    report.tombstones += tombstones;
                }
                Err(e) => {
                    Self::requeue(peer, &pulls[i..]);
                    return Err(e);
                }
            }
        }
        if !peer.state.lock().pending.is_empty() {
            peer.wake.notify_one();
        }

        report.advertised = self.advertise_to(address, peer).await?;
        Ok(report)
    }

    fn requeue(peer: &PeerHandle, fingerprints: &[Fingerprint]) {
        let mut state = peer.state.lock();
        for fingerprint in fingerprints {
            state.pending.push(*fingerprint);
        }
    }

    async fn pull_registry(&self, address: &str, peer: &PeerHandle) -> Result<usize, RelayError> {
        let mut since = peer.state.lock().registry_high_water;
        let mut merged = 0;
        let mut reset = false;

        loop {
            let changes: RegistryChanges = self
                .transport
                .pull_registry(address, since, self.config.registry_batch)
                .await?;

            if changes.head < since && !reset {
                // Peer restarted with a fresh registry.
                debug!(peer = %address, since, head = changes.head, "Peer registry regressed, resyncing");
                since = 0;
                reset = true;
                continue;
            }

            let fetched = changes.records.len();
            for record in changes.records {
                if self.registry.merge(record) {
                    merged += 1;
                }
            }
            let progressed = changes.through > since;
            since = since.max(changes.through);
            peer.state.lock().registry_high_water = since;

            if fetched == 0 || !progressed || since >= changes.head {
                break;
            }
        }

        self.metrics
            .registry_records_merged
            .fetch_add(merged as u64, Ordering::Relaxed);
        Ok(merged)
    }

    async fn pull_mailbox(
        &self,
        address: &str,
        peer: &PeerHandle,
        fingerprint: &Fingerprint,
    ) -> Result<(usize, usize), RelayError> {
        let mut envelopes = 0;
        let mut tombstones = 0;

        loop {
            let since = peer.state.lock().high_water.get(fingerprint).copied();
            let response = self
                .transport
                .pull_since(
                    address,
                    PullRequest {
                        fingerprint: *fingerprint,
                        since,
                        limit: self.config.pull_batch,
                    },
                )
                .await?;

            let fetched = response.entries.len();
            let mut through = since;
            let mut blocked = false;
            for LogEntry { sequence, item } in response.entries {
                if since.is_some_and(|s| sequence <= s) {
                    continue;
                }
                match self.merge_item(fingerprint, item)? {
                    Merged::Envelope => envelopes += 1,
                    Merged::Tombstone => tombstones += 1,
                    Merged::Duplicate | Merged::Rejected => {}
                    Merged::Blocked => {
                        blocked = true;
                        break;
                    }
                }
                through = Some(sequence);
            }

            {
                let mut state = peer.state.lock();
                if let Some(sequence) = through {
                    state.advance(*fingerprint, sequence);
                }
                if blocked {
                    state.pending.push(*fingerprint);
                }
            }

            if blocked || through == since || fetched < self.config.pull_batch {
                break;
            }
        }

        if envelopes + tombstones > 0 {
            self.metrics
                .envelopes_merged
                .fetch_add(envelopes as u64, Ordering::Relaxed);
            self.metrics
                .tombstones_merged
                .fetch_add(tombstones as u64, Ordering::Relaxed);
            self.fan_out(*fingerprint, Some(address));
        }
        Ok((envelopes, tombstones))
    }

    fn merge_item(&self, fingerprint: &Fingerprint, item: SyncItem) -> Result<Merged, RelayError> {
        match item {
            SyncItem::Envelope(envelope) => Ok(if self.store.merge_envelope(fingerprint, envelope)? {
                Merged::Envelope
            } else {
                Merged::Duplicate
            }),
            SyncItem::Tombstone(tombstone) => {
                if tombstone.fingerprint != *fingerprint {
                    self.metrics.tombstones_rejected.fetch_add(1, Ordering::Relaxed);
                    warn!(fingerprint = %fingerprint, "Tombstone addressed to another mailbox");
                    return Ok(Merged::Rejected);
                }
                match self.store.merge_tombstone(tombstone) {
                    Ok(true) => Ok(Merged::Tombstone),
                    Ok(false) => Ok(Merged::Duplicate),
                    Err(RelayError::Unauthorized(_)) => {
                        self.metrics.tombstones_rejected.fetch_add(1, Ordering::Relaxed);
                        Ok(Merged::Rejected)
                    }
                    Err(RelayError::NotFound(_)) => Ok(Merged::Blocked),
                    Err(e) => Err(e),
                }
            }
        }
    }

    async fn advertise_to(&self, address: &str, peer: &PeerHandle) -> Result<usize, RelayError> {
        let batch = self.config.advertise_batch;
        let (changed, cursor) = {
            let mut state = peer.state.lock();
            (state.outbound.take(batch), state.advertise_cursor)
        };

        let mut seen = HashSet::new();
        let mut heads = Vec::with_capacity(batch);
        for fingerprint in &changed {
            if let Some(head) = self.store.head(fingerprint) {
                if seen.insert(*fingerprint) {
                    heads.push(FingerprintHead {
                        fingerprint: *fingerprint,
                        head,
                    });
                }
            }
        }

        let room = batch.saturating_sub(heads.len());
        let hosted = self.store.hosted(cursor.as_ref(), room);
        let next_cursor = if hosted.len() < room {
            None
        } else {
            hosted.last().map(|(fp, _)| *fp)
        };
        for (fingerprint, head) in hosted {
            if seen.insert(fingerprint) {
                heads.push(FingerprintHead { fingerprint, head });
            }
        }

        let advertised = heads.len();
        let advertisement = Advertisement {
            node_id: self.node_id,
            address: self.address.clone(),
            heads,
            registry_revision: self.registry.revision(),
        };

        match self.transport.advertise(address, advertisement).await {
            Ok(ack) => {
                let mut state = peer.state.lock();
                state.node_id = Some(ack.node_id);
                state.advertise_cursor = next_cursor;
                Ok(advertised)
            }
            Err(e) => {
                let mut state = peer.state.lock();
                for fingerprint in changed {
                    state.outbound.push(fingerprint);
                }
                Err(e)
            }
        }
    }

    // =========================================================================
    // BACKGROUND TASKS
    // =========================================================================

    /// Sync with one peer until shutdown: every `sync_interval` while healthy,
    /// on wake-up hints, and on the backoff schedule while failing.
    pub async fn run_peer_loop(self: Arc<Self>, address: String, mut shutdown: watch::Receiver<bool>) {
        let Some(peer) = self.peer(&address) else {
            return;
        };
        info!(peer = %address, "Peer sync loop started");

        loop {
            let (delay, healthy) = {
                let state = peer.state.lock();
                (state.retry_delay(&self.config), state.consecutive_failures == 0)
            };
            let delay = if healthy { delay } else { Self::jitter(delay) };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = peer.wake.notified(), if healthy => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            if *shutdown.borrow() {
                break;
            }

            let _ = self.sync_with_peer(&address).await;
        }

        info!(peer = %address, "Peer sync loop stopped");
    }

    /// Spawn a sync loop for every known peer, including peers that introduce
    /// themselves later, until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut handles = Vec::new();
        loop {
            for peer in self.peers.iter() {
                if !peer.loop_started.swap(true, Ordering::SeqCst) {
                    let service = Arc::clone(&self);
                    let address = peer.key().clone();
                    handles.push(tokio::spawn(service.run_peer_loop(address, shutdown.clone())));
                }
            }

            tokio::select! {
                _ = self.peer_added.notified() => {}
                _ = tokio::time::sleep(self.config.sync_interval()) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            if *shutdown.borrow() {
                break;
            }
        }

        for handle in handles {
            let _ = handle.await;
        }
    }
}

// =============================================================================
// SERVER SIDE
// =============================================================================

impl<T: PeerTransport> PeerSyncApi for ReplicationService<T> {
    fn handle_advertise(&self, advertisement: Advertisement) -> AdvertiseAck {
        let mut queued = 0;
        if advertisement.node_id == self.node_id {
            return AdvertiseAck {
                node_id: self.node_id,
                queued,
            };
        }

        if self.peer(&advertisement.address).is_none() {
            self.add_peer(&advertisement.address);
        }
        let Some(peer) = self.peer(&advertisement.address) else {
            return AdvertiseAck {
                node_id: self.node_id,
                queued,
            };
        };

        let registry_behind = {
            let mut state = peer.state.lock();
            state.node_id = Some(advertisement.node_id);
            for FingerprintHead { fingerprint, head } in advertisement.heads {
                if state.high_water.get(&fingerprint).is_some_and(|hw| head < *hw) {
                    // Peer lost entries we already pulled; start over for this mailbox.
                    state.high_water.remove(&fingerprint);
                }
                if state.is_behind(&fingerprint, head) && state.pending.push(fingerprint) {
                    queued += 1;
                }
            }
            advertisement.registry_revision > state.registry_high_water
        };

        if queued > 0 || registry_behind {
            peer.wake.notify_one();
        }
        debug!(peer = %advertisement.address, queued, "Advertisement received");
        AdvertiseAck {
            node_id: self.node_id,
            queued,
        }
    }

    fn serve_pull(&self, request: PullRequest) -> PullResponse {
        let limit = request.limit.min(self.config.pull_batch);
        PullResponse {
            entries: self
                .store
                .entries_since(&request.fingerprint, request.since, limit),
            head: self.store.head(&request.fingerprint),
        }
    }

    fn serve_registry(&self, since: u64, limit: usize) -> RegistryChanges {
        self.registry
            .changes_since(since, limit.min(self.config.registry_batch))
    }
}

impl<T: PeerTransport> ReplicationApi for ReplicationService<T> {
    fn announce(&self, fingerprint: Fingerprint) {
        self.fan_out(fingerprint, None);
    }

    fn peer_status(&self) -> Vec<PeerStatus> {
        let mut status: Vec<PeerStatus> =
            self.peers.iter().map(|p| p.state.lock().status()).collect();
        status.sort_by(|a, b| a.address.cmp(&b.address));
        status
    }

    fn stats(&self) -> ReplicationStats {
        let status = self.peer_status();
        ReplicationStats {
            peers: status.len(),
            active_peers: status.iter().filter(|p| p.active).count(),
            sessions_ok: self.metrics.sessions_ok.load(Ordering::Relaxed),
            sessions_failed: self.metrics.sessions_failed.load(Ordering::Relaxed),
            envelopes_merged: self.metrics.envelopes_merged.load(Ordering::Relaxed),
            tombstones_merged: self.metrics.tombstones_merged.load(Ordering::Relaxed),
            tombstones_rejected: self.metrics.tombstones_rejected.load(Ordering::Relaxed),
            registry_records_merged: self.metrics.registry_records_merged.load(Ordering::Relaxed),
        }
    }
}
