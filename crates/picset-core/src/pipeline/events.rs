//! Observability events published by an [`ImageGen`](crate::ImageGen).
//!
//! Events go out on a broadcast channel owned by the pipeline instance.
//! Publishing never waits on subscribers and never fails; a subscriber that
//! falls behind loses the oldest events.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::types::VariantFormat;

/// Buffered events per subscriber before it starts lagging.
const EVENT_CAPACITY: usize = 1024;

/// Something the pipeline did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum PipelineEvent {
    /// Output directory is ready
    Initialized,

    /// A read request started
    Read { filename: String },

    /// A variant was planned; `cached` tells whether its file already existed
    Transform {
        filename: String,
        format: VariantFormat,
        width: u32,
        src: String,
        cached: bool,
    },
}

/// Publishing side of the event stream.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: PipelineEvent) {
        tracing::debug!(?event, "pipeline event");
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}
