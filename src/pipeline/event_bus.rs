// src/pipeline/event_bus.rs
//
// Bounded alert queue between a session and whatever delivers alerts.
// Sessions publish; the delivery side drains.

use crate::detection::{FallEvent, LyingEvent};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::warn;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertEvent {
    Fall { stream: String, event: FallEvent },
    Lying { stream: String, event: LyingEvent },
}

impl AlertEvent {
    pub fn stream(&self) -> &str {
        match self {
            AlertEvent::Fall { stream, .. } | AlertEvent::Lying { stream, .. } => stream,
        }
    }

    pub fn timestamp(&self) -> f64 {
        match self {
            AlertEvent::Fall { event, .. } => event.timestamp,
            AlertEvent::Lying { event, .. } => event.timestamp,
        }
    }
}

pub struct EventBus {
    events: VecDeque<AlertEvent>,
    max_pending: usize,
}

impl EventBus {
    pub fn new(max_pending: usize) -> Self {
        let max_pending = max_pending.max(1);
        Self {
            events: VecDeque::with_capacity(max_pending),
            max_pending,
        }
    }

    pub fn publish(&mut self, event: AlertEvent) {
        if self.events.len() >= self.max_pending {
            warn!(
                "Event bus full ({} events), dropping oldest",
                self.max_pending
            );
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<AlertEvent> {
        self.events.drain(..).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.events.len()
    }
}
