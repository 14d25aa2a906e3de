//! Connection probing for joining nodes
//!
//! Before a member is admitted the coordinator dials its advertised
//! address. Probing runs outside the registry lock; a slow address only
//! delays its own Connect call.

use crate::common::{Error, Result};
use std::time::Duration;
use tonic::transport::Endpoint;

/// Reachability check against a member's address
#[tonic::async_trait]
pub trait ConnectionProbe: Send + Sync {
    /// Ok when `address` accepted a connection within the probe's budget
    async fn probe(&self, address: &str) -> Result<()>;
}

/// Dials the address as a gRPC channel (HTTP/2 over TCP).
///
/// Success means the TCP connect and the HTTP/2 client handshake finished
/// within the timeout. No request is sent on the channel, so a listener
/// that accepts connections but never serves them still passes.
#[derive(Debug, Clone)]
pub struct ChannelProbe {
    timeout: Duration,
}

impl ChannelProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn endpoint(&self, address: &str) -> Result<Endpoint> {
        let uri = if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{}", address)
        };
        let endpoint = Endpoint::from_shared(uri).map_err(|e| Error::Unreachable {
            address: address.to_string(),
            reason: e.to_string(),
        })?;
        Ok(endpoint
            .connect_timeout(self.timeout)
            .timeout(self.timeout))
    }
}

impl Default for ChannelProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[tonic::async_trait]
impl ConnectionProbe for ChannelProbe {
    async fn probe(&self, address: &str) -> Result<()> {
        let endpoint = self.endpoint(address)?;
        let unreachable = |reason: String| Error::Unreachable {
            address: address.to_string(),
            reason,
        };

        match tokio::time::timeout(self.timeout, endpoint.connect()).await {
            Ok(Ok(_channel)) => {
                tracing::debug!("Connection successful to addr: {}", address);
                Ok(())
            }
            Ok(Err(e)) => Err(unreachable(e.to_string())),
            Err(_) => Err(unreachable(format!("timed out after {:?}", self.timeout))),
        }
    }
}
