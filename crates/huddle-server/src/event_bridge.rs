use std::sync::Arc;

use huddle_telemetry::MetricsRecorder;
use tokio::sync::broadcast;

use crate::client::ClientRegistry;
use crate::hub::Delivery;
use crate::wire;

pub const FRAMES_DROPPED: &str = "huddle.frames_dropped";

/// Subscribes to the hub's event channel and forwards each event to the
/// clients that were attached to its session when it was published. A client
/// that attaches while the bridge is behind never sees earlier events.
pub struct EventBridge {
    registry: Arc<ClientRegistry>,
    metrics: Arc<MetricsRecorder>,
}

impl EventBridge {
    pub fn new(registry: Arc<ClientRegistry>, metrics: Arc<MetricsRecorder>) -> Self {
        Self { registry, metrics }
    }

    /// Spawn the forwarding task. It ends when every sender is gone.
    pub fn start(&self, mut rx: broadcast::Receiver<Delivery>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(&self.registry);
        let metrics = Arc::clone(&self.metrics);

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(Delivery { event, recipients }) => {
                        let Some(frame) = wire::serialize_event(&event) else {
                            continue;
                        };
                        let dropped = registry.deliver(&recipients, &frame);
                        if dropped > 0 {
                            metrics.counter_inc(FRAMES_DROPPED, &[], dropped as u64);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "event bridge lagged, dropped events");
                        metrics.counter_inc(FRAMES_DROPPED, &[("cause", "lagged")], n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("event bridge channel closed");
                        break;
                    }
                }
            }
        })
    }
}

/// Create an event bridge wired to a broadcast channel.
pub fn create_bridge(
    registry: Arc<ClientRegistry>,
    metrics: Arc<MetricsRecorder>,
    rx: broadcast::Receiver<Delivery>,
) -> tokio::task::JoinHandle<()> {
    EventBridge::new(registry, metrics).start(rx)
}
