//! # HTTP Peer Transport
//!
//! Client side of the peer protocol over HTTP/JSON, matching the
//! `/v1/peer/*` routes of the node service.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::trace;

use mr_01_registry::RegistryChanges;
use mr_03_replication::{
    AdvertiseAck, Advertisement, PeerTransport, PullRequest, PullResponse, RegistryPullRequest,
};
use shared_types::RelayError;

/// `reqwest`-backed [`PeerTransport`]. Peers are addressed by base URL.
#[derive(Clone)]
pub struct HttpPeerTransport {
    client: reqwest::Client,
}

impl HttpPeerTransport {
    pub fn new(request_timeout: Duration) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| RelayError::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    async fn post<Req, Resp>(&self, peer: &str, path: &str, body: &Req) -> Result<Resp, RelayError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", peer.trim_end_matches('/'), path);
        trace!(url = %url, "Peer request");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| classify(peer, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::PeerUnreachable(format!(
                "{} answered {} on {}",
                peer, status, path
            )));
        }

        response.json::<Resp>().await.map_err(|e| classify(peer, e))
    }
}

fn classify(peer: &str, err: reqwest::Error) -> RelayError {
    if err.is_timeout() {
        RelayError::Timeout(format!("peer {}: {}", peer, err))
    } else {
        RelayError::PeerUnreachable(format!("{}: {}", peer, err))
    }
}

#[async_trait]
impl PeerTransport for HttpPeerTransport {
    async fn advertise(
        &self,
        peer: &str,
        advertisement: Advertisement,
    ) -> Result<AdvertiseAck, RelayError> {
        self.post(peer, "/v1/peer/advertise", &advertisement).await
    }

    async fn pull_since(
        &self,
        peer: &str,
        request: PullRequest,
    ) -> Result<PullResponse, RelayError> {
        self.post(peer, "/v1/peer/pull", &request).await
    }

    async fn pull_registry(
        &self,
        peer: &str,
        since: u64,
        limit: usize,
    ) -> Result<RegistryChanges, RelayError> {
        self.post(peer, "/v1/peer/registry", &RegistryPullRequest { since, limit })
            .await
    }
}
