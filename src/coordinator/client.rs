//! HTTP client for the coordinator API
//!
//! Used by data-serving nodes to join and heartbeat, and by the `minizero` CLI.

use crate::common::{retry_with_backoff, Error, Result};
use crate::coordinator::http::{
    ErrorBody, ShouldServeRequest, ShouldServeResponse, TabletRef, REQUEST_TIMEOUT_HEADER,
};
use crate::coordinator::state::{ClusterSnapshot, Member, MembershipUpdate, ServeStatus};
use crate::coordinator::tablet::MemberRef;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ZeroClient {
    base_url: String,
    http: reqwest::Client,
    timeout: Option<Duration>,
    retries: usize,
}

impl ZeroClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            timeout: None,
            retries: 1,
        }
    }

    /// Bound every call; the coordinator gives up at the same deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Retry transient failures (network errors, unreachable probes,
    /// uncommitted proposals) up to `retries` attempts in total
    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries.max(1);
        self
    }

    pub async fn connect(&self, member: &Member) -> Result<MembershipUpdate> {
        self.post("/connect", member).await
    }

    pub async fn update(&self, member: &Member) -> Result<MembershipUpdate> {
        self.post("/update", member).await
    }

    pub async fn should_serve(&self, member: MemberRef, predicate: &str) -> Result<ServeStatus> {
        let req = ShouldServeRequest {
            member,
            tablet: TabletRef {
                predicate: predicate.to_string(),
            },
        };
        let resp: ShouldServeResponse = self.post("/should_serve", &req).await?;
        Ok(resp.status)
    }

    pub async fn state(&self) -> Result<ClusterSnapshot> {
        let url = format!("{}/state", self.base_url);
        let resp = self.http.get(url).send().await?;
        decode(resp).await
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let url = url.as_str();
        retry_with_backoff(
            move || async move {
                let mut req = self.http.post(url).json(body);
                if let Some(timeout) = self.timeout {
                    req = req
                        .timeout(timeout)
                        .header(REQUEST_TIMEOUT_HEADER, timeout.as_millis().to_string());
                }
                let resp = req.send().await?;
                decode(resp).await
            },
            self.retries,
            Duration::from_millis(100),
        )
        .await
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json::<T>().await?);
    }
    let text = resp.text().await.unwrap_or_default();
    if let Ok(body) = serde_json::from_str::<ErrorBody>(&text) {
        return Err(Error::from_kind(&body.kind, body.error));
    }
    // Not one of ours: framework rejections and unknown routes
    let message = format!("coordinator returned {}: {}", status, text.trim());
    if status.is_client_error() {
        Err(Error::Rejected(message))
    } else {
        Err(Error::Http(message))
    }
}
