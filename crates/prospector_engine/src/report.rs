use engine_logging::engine_warn;

use crate::EngineEvent;

/// Best-effort delivery of engine events to a subscriber.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

/// Sink that forwards events over a std mpsc channel.
///
/// A closed channel is logged and ignored: delivery is fire-and-forget and a
/// departed subscriber must never stall or fail the pipeline.
pub struct ChannelProgressSink {
    tx: std::sync::mpsc::Sender<EngineEvent>,
}

impl ChannelProgressSink {
    pub fn new(tx: std::sync::mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, event: EngineEvent) {
        if self.tx.send(event).is_err() {
            engine_warn!("progress subscriber is gone; dropping event");
        }
    }
}
