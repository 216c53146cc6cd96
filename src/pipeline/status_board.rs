// src/pipeline/status_board.rs
//
// Latest posture per stream for readers outside the worker. Each stream has
// exactly one publisher; publishing swaps in a fresh immutable snapshot, so
// readers only ever clone an Arc and never see a half-written state.

use crate::detection::{MissingPhase, PostureState};
use crate::pipeline::session::FrameOutcome;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub stream: String,
    pub timestamp: f64,
    pub posture: PostureState,
    pub confidence: f64,
    pub missing: MissingPhase,
    pub frames: u64,
    pub last_fall_at: Option<f64>,
    pub last_lying_alert_at: Option<f64>,
}

type Slot = Arc<RwLock<Arc<StatusSnapshot>>>;

#[derive(Clone, Default)]
pub struct StatusBoard {
    slots: Arc<RwLock<HashMap<String, Slot>>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stream and hand out its single writer. Registering the
    /// same name again replaces the previous slot.
    pub fn publisher(&self, stream: &str) -> StatusPublisher {
        let initial = Arc::new(StatusSnapshot {
            stream: stream.to_string(),
            timestamp: 0.0,
            posture: PostureState::Unknown,
            confidence: 0.0,
            missing: MissingPhase::Tracking,
            frames: 0,
            last_fall_at: None,
            last_lying_alert_at: None,
        });
        let slot: Slot = Arc::new(RwLock::new(initial));
        self.slots.write().insert(stream.to_string(), slot.clone());
        StatusPublisher {
            stream: stream.to_string(),
            slot,
        }
    }

    pub fn latest(&self, stream: &str) -> Option<Arc<StatusSnapshot>> {
        let slots = self.slots.read();
        slots.get(stream).map(|slot| slot.read().clone())
    }

    pub fn all(&self) -> Vec<Arc<StatusSnapshot>> {
        let slots = self.slots.read();
        let mut all: Vec<_> = slots.values().map(|slot| slot.read().clone()).collect();
        all.sort_by(|a, b| a.stream.cmp(&b.stream));
        all
    }

    pub fn stream_count(&self) -> usize {
        self.slots.read().len()
    }
}

pub struct StatusPublisher {
    stream: String,
    slot: Slot,
}

impl StatusPublisher {
    pub fn publish(&self, outcome: &FrameOutcome) {
        let prev = self.slot.read().clone();
        let next = Arc::new(StatusSnapshot {
            stream: self.stream.clone(),
            timestamp: outcome.timestamp,
            posture: outcome.posture,
            confidence: outcome.confidence,
            missing: outcome.metrics.missing,
            frames: prev.frames + 1,
            last_fall_at: outcome
                .fall_event
                .as_ref()
                .map(|e| e.timestamp)
                .or(prev.last_fall_at),
            last_lying_alert_at: outcome
                .lying_event
                .as_ref()
                .map(|e| e.timestamp)
                .or(prev.last_lying_alert_at),
        });
        *self.slot.write() = next;
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }
}
