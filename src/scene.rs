use crate::types::{NodeId, Visual};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::trace;

/// Sink for visualization hooks.
///
/// Hooks are fire-and-forget: a scene never feeds back into the protocol.
pub trait Scene: Send {
    fn draw(&mut self, at: Duration, station: NodeId, visual: &Visual);
}

/// Logs every hook at trace level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TraceScene;

impl Scene for TraceScene {
    fn draw(&mut self, at: Duration, station: NodeId, visual: &Visual) {
        trace!(t_ms = at.as_millis() as u64, station, ?visual, "scene");
    }
}

/// Keeps every hook in order; clones share the same frame log.
#[derive(Debug, Default, Clone)]
pub struct RecordingScene {
    frames: Arc<Mutex<Vec<(Duration, NodeId, Visual)>>>,
}

impl RecordingScene {
    pub fn frames(&self) -> Vec<(Duration, NodeId, Visual)> {
        self.frames
            .lock()
            .map(|frames| frames.clone())
            .unwrap_or_default()
    }
}

impl Scene for RecordingScene {
    fn draw(&mut self, at: Duration, station: NodeId, visual: &Visual) {
        if let Ok(mut frames) = self.frames.lock() {
            frames.push((at, station, visual.clone()));
        }
    }
}
