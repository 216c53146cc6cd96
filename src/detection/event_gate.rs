// src/detection/event_gate.rs
//
// Deduplication and rate limiting of alerts. Cooldowns are measured from the
// last emission on the caller's clock.

use crate::detection::types::PostureState;
use crate::types::AlertConfig;
use tracing::{debug, info};

pub struct EventGate {
    config: AlertConfig,
    fall_start: Option<f64>,
    /// Latched after a fall alert; only an upright posture clears it
    fall_confirmed: bool,
    last_fall: Option<f64>,
    lying_start: Option<f64>,
    last_lying_alert: Option<f64>,
}

impl EventGate {
    pub fn new(config: AlertConfig) -> Self {
        Self {
            config,
            fall_start: None,
            fall_confirmed: false,
            last_fall: None,
            lying_start: None,
            last_lying_alert: None,
        }
    }

    /// Fall bookkeeping for a frame with a pose.
    pub fn observe_posture(&mut self, state: PostureState, timestamp: f64) {
        match state {
            PostureState::Falling => {
                self.fall_start.get_or_insert(timestamp);
            }
            s if s.is_upright() => {
                if self.fall_confirmed {
                    debug!("Fall detector re-armed ({})", s.as_str());
                }
                self.fall_start = None;
                self.fall_confirmed = false;
            }
            // Lying keeps the fall open; Unknown never re-arms
            _ => {}
        }
    }

    /// Claim the right to emit a fall alert. Returns the fall duration on
    /// success and latches the gate.
    pub fn try_confirm_fall(&mut self, timestamp: f64) -> Option<f64> {
        if self.fall_confirmed {
            return None;
        }
        if let Some(last) = self.last_fall {
            if timestamp - last < self.config.cooldown_seconds {
                debug!("Fall suppressed by cooldown ({:.1}s since last)", timestamp - last);
                return None;
            }
        }
        self.fall_confirmed = true;
        self.last_fall = Some(timestamp);
        Some(self.fall_duration(timestamp))
    }

    /// Lying bookkeeping; returns the lying duration when an alert is due.
    pub fn update_lying(&mut self, state: PostureState, timestamp: f64) -> Option<f64> {
        if state != PostureState::Lying {
            if self.lying_start.take().is_some() {
                info!("🛏️ Stopped tracking LYING state (now {})", state.as_str());
            }
            return None;
        }

        let start = *self.lying_start.get_or_insert_with(|| {
            info!("🛏️ Started tracking LYING state");
            timestamp
        });
        let duration = timestamp - start;
        if duration < self.config.lying_alert_threshold {
            return None;
        }
        if let Some(last) = self.last_lying_alert {
            if timestamp - last < self.config.lying_cooldown {
                return None;
            }
        }
        self.last_lying_alert = Some(timestamp);
        Some(duration)
    }

    /// Tracking lost for too long: forget the fall and lying in progress.
    /// The confirmation latch stays set.
    pub fn on_tracking_lost(&mut self) {
        self.fall_start = None;
        self.lying_start = None;
    }

    pub fn fall_duration(&self, timestamp: f64) -> f64 {
        self.fall_start.map(|start| timestamp - start).unwrap_or(0.0)
    }

    pub fn fall_in_progress(&self) -> bool {
        self.fall_start.is_some()
    }

    pub fn fall_confirmed(&self) -> bool {
        self.fall_confirmed
    }

    pub fn reset(&mut self) {
        self.fall_start = None;
        self.fall_confirmed = false;
        self.last_fall = None;
        self.lying_start = None;
        self.last_lying_alert = None;
    }
}
