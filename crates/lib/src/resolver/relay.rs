//! Relay path for environments where the direct feed fetch is blocked by
//! origin policy.
//!
//! The lookup is forwarded to a privileged process and the response matched
//! back by a generated request id: a pending-request table keyed by id, with
//! one bounded wait per entry. Responses for unknown ids (late arrivals after
//! a timeout, or duplicates) are dropped with a diagnostic.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

use super::{ChannelId, LabelResolver};
use crate::{Result, constants::RESOLVE_TIMEOUT};

/// Lookup request forwarded to the privileged process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayRequest {
    /// Identity to resolve.
    pub channel_id: ChannelId,
    /// Correlation id; the response must echo it.
    pub request_id: Uuid,
}

/// Response message from the privileged process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayResponse {
    /// Identity that was resolved.
    pub channel_id: ChannelId,
    /// Correlation id echoed from the request.
    pub request_id: Uuid,
    /// The resolved label; `None` when the privileged fetch found nothing.
    pub title: Option<String>,
}

/// Transport seam toward the privileged process.
///
/// Implementations only need to fire the request; responses come back through
/// [`RelayResolver::deliver`] on whatever inbound channel the host wires up.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Send one lookup request toward the privileged process.
    async fn send_request(&self, request: RelayRequest) -> Result<()>;
}

/// Resolver that correlates relayed request/response pairs.
pub struct RelayResolver {
    transport: Arc<dyn RelayTransport>,
    pending: Mutex<HashMap<Uuid, oneshot::Sender<Option<String>>>>,
    timeout: Duration,
}

impl RelayResolver {
    /// Create a resolver with the standard 8 second per-request bound.
    pub fn new(transport: Arc<dyn RelayTransport>) -> Self {
        Self::with_timeout(transport, RESOLVE_TIMEOUT)
    }

    /// Create a resolver with an explicit per-request bound.
    pub fn with_timeout(transport: Arc<dyn RelayTransport>, timeout: Duration) -> Self {
        Self {
            transport,
            pending: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Complete the pending request matching this response.
    ///
    /// Called by the host when a response message arrives from the privileged
    /// process. Unknown request ids are dropped: either the entry already
    /// timed out or the message is a duplicate.
    pub fn deliver(&self, response: RelayResponse) {
        let sender = self.pending.lock().unwrap().remove(&response.request_id);
        match sender {
            Some(sender) => {
                // Receiver gone means the waiter timed out in the same instant.
                let _ = sender.send(response.title);
            }
            None => {
                debug!(
                    request_id = %response.request_id,
                    channel_id = %response.channel_id,
                    "dropping relay response with no pending request"
                );
            }
        }
    }

    /// Number of requests currently awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

#[async_trait]
impl LabelResolver for RelayResolver {
    async fn resolve_label(&self, channel_id: &ChannelId) -> Result<Option<String>> {
        let request_id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(request_id, tx);

        let request = RelayRequest {
            channel_id: channel_id.clone(),
            request_id,
        };
        if let Err(e) = self.transport.send_request(request).await {
            self.pending.lock().unwrap().remove(&request_id);
            return Err(e);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(title)) => Ok(title),
            // Sender dropped without a response; treat like a failed fetch.
            Ok(Err(_)) => Ok(None),
            Err(_) => {
                self.pending.lock().unwrap().remove(&request_id);
                debug!(channel_id = %channel_id, "relay request timed out");
                Ok(None)
            }
        }
    }
}
