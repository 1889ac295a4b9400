//! Queue lifecycle events and their delivery.
//!
//! Every push/pop outcome produces a [`QueueEvent`] record, handed to a
//! [`NotificationSink`]. Delivery is fire-and-forget: a sink must never fail
//! a queue operation, so send errors are logged and swallowed.
//!
//! [`UdpNotifier`] broadcasts each event as one newline-terminated JSON
//! datagram to a configurable list of `host[:port]` targets.

use std::io;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::UdpSocket;
use tracing::warn;

/// Port used for targets that do not specify one.
pub const DEFAULT_NOTIFY_PORT: u16 = 19561;

/// A queue lifecycle event.
///
/// Serializes to a flat JSON object tagged with an `event` field, e.g.
/// `{"event":"queue.enqueue","queue":"build","slot":"default",...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum QueueEvent {
    /// A job was appended to a slot.
    #[serde(rename = "queue.enqueue")]
    Enqueue {
        queue: String,
        slot: String,
        job: String,
        size: u64,
    },

    /// A job was handed to a consumer.
    #[serde(rename = "queue.dequeue")]
    Dequeue {
        queue: String,
        slot: String,
        job: String,
        size: u64,
    },

    /// A slot was observed empty.
    #[serde(rename = "queue.empty")]
    Empty { queue: String, slot: String },

    /// A pop found no job: carries the slot for descriptor-less pops, the
    /// offer's descriptive form for matched pops.
    #[serde(rename = "queue.miss")]
    Miss {
        queue: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        slot: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        offer: Option<Value>,
    },
}

/// Receives queue lifecycle events.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one event. Must not fail the calling queue operation.
    async fn notify(&self, event: &QueueEvent);

    /// Replace the target list, e.g. when per-queue configuration changes.
    fn set_targets(&self, targets: Vec<String>);
}

/// Broadcasts queue events as JSON lines over UDP.
pub struct UdpNotifier {
    socket: UdpSocket,
    targets: Mutex<Vec<(String, u16)>>,
}

impl UdpNotifier {
    /// Bind a socket on an ephemeral port with an empty target list.
    pub async fn bind() -> io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
        Ok(Self {
            socket,
            targets: Mutex::new(Vec::new()),
        })
    }

    /// Add one `host[:port]` target. Unparsable targets are logged and
    /// ignored.
    pub fn add_target(&self, target: &str) {
        if let Some(parsed) = parse_target(target) {
            self.lock_targets().push(parsed);
        } else {
            warn!(target, "ignoring unparsable notification target");
        }
    }

    /// Drop all targets.
    pub fn clear_targets(&self) {
        self.lock_targets().clear();
    }

    fn lock_targets(&self) -> std::sync::MutexGuard<'_, Vec<(String, u16)>> {
        self.targets.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl NotificationSink for UdpNotifier {
    async fn notify(&self, event: &QueueEvent) {
        let targets = self.lock_targets().clone();
        if targets.is_empty() {
            return;
        }

        let payload = match serde_json::to_string(event) {
            Ok(json) => json + "\n",
            Err(err) => {
                warn!(error = %err, "failed to serialize queue event");
                return;
            }
        };

        for (host, port) in targets {
            if let Err(err) = self
                .socket
                .send_to(payload.as_bytes(), (host.as_str(), port))
                .await
            {
                warn!(host = %host, port, error = %err, "failed to send queue notification");
            }
        }
    }

    fn set_targets(&self, targets: Vec<String>) {
        let parsed = targets
            .iter()
            .filter_map(|t| {
                let parsed = parse_target(t);
                if parsed.is_none() {
                    warn!(target = %t, "ignoring unparsable notification target");
                }
                parsed
            })
            .collect();
        *self.lock_targets() = parsed;
    }
}

fn parse_target(target: &str) -> Option<(String, u16)> {
    let mut parts = target.splitn(2, ':');
    let host = parts.next()?.trim();
    if host.is_empty() {
        return None;
    }
    let port = match parts.next() {
        Some(port) => port.trim().parse().ok()?,
        None => DEFAULT_NOTIFY_PORT,
    };
    Some((host.to_string(), port))
}
