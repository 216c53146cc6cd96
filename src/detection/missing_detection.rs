// src/detection/missing_detection.rs
//
// Tracking → ShortGap → LongGap state machine for frames without a usable
// pose, plus the last-known signals the fallbacks reason about.

use crate::analysis::{BodyMetrics, MotionSample, TemporalSample};
use crate::detection::types::PostureState;
use crate::types::{MissingConfig, MotionConfig};
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum MissingPhase {
    Tracking,
    /// Last posture is held and fallbacks may fire
    ShortGap { missing: u32 },
    /// Gap too long: posture is Unknown and nothing fires
    LongGap { missing: u32 },
}

/// Signals captured on the last frame that had a pose
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct LastValid {
    pub center: Option<(f64, f64)>,
    pub angle: Option<f64>,
    pub speed: f64,
    pub acceleration: f64,
    pub stability: Option<f64>,
}

pub struct MissingDetectionHandler {
    config: MissingConfig,
    motion: MotionConfig,
    missing_frames: u32,
    falling_frames: u32,
    was_falling: bool,
    last: LastValid,
}

impl MissingDetectionHandler {
    pub fn new(config: MissingConfig, motion: MotionConfig) -> Self {
        Self {
            config,
            motion,
            missing_frames: 0,
            falling_frames: 0,
            was_falling: false,
            last: LastValid::default(),
        }
    }

    /// Record a frame with a pose. `fall_in_progress` is the gate's view
    /// before this frame's posture is applied.
    pub fn on_detection(
        &mut self,
        state: PostureState,
        metrics: &BodyMetrics,
        sample: &TemporalSample,
        fall_in_progress: bool,
    ) -> MissingPhase {
        if self.missing_frames > 0 {
            debug!("Pose reacquired after {} missing frames", self.missing_frames);
        }
        self.missing_frames = 0;

        if metrics.center.is_some() {
            self.last.center = metrics.center;
        }
        if metrics.trunk_angle_deg.is_some() {
            self.last.angle = metrics.trunk_angle_deg;
        }
        self.last.speed = sample.vertical_speed;
        self.last.acceleration = sample.acceleration;
        self.last.stability = Some(sample.stability);

        // Momentum: a single Falling frame is not enough to latch
        if state == PostureState::Falling {
            self.falling_frames += 1;
        } else {
            self.falling_frames = 0;
        }
        self.was_falling = if state == PostureState::Falling
            && self.falling_frames >= self.config.falling_momentum_frames
        {
            true
        } else {
            fall_in_progress && state != PostureState::Standing
        };

        MissingPhase::Tracking
    }

    pub fn on_missing(&mut self) -> MissingPhase {
        self.missing_frames = self.missing_frames.saturating_add(1);

        if self.missing_frames > self.config.max_missing_frames {
            if self.missing_frames == self.config.max_missing_frames + 1 {
                info!("Lost tracking for {} frames, resetting state", self.missing_frames);
            }
            self.was_falling = false;
            self.falling_frames = 0;
            MissingPhase::LongGap {
                missing: self.missing_frames,
            }
        } else {
            MissingPhase::ShortGap {
                missing: self.missing_frames,
            }
        }
    }

    /// Confidence of a motion-based fall while the pose is missing, if the
    /// spike happened in a plausible context.
    pub fn motion_fallback(&self, sample: &MotionSample) -> Option<f64> {
        if !sample.is_spike {
            return None;
        }
        let c = &self.config;
        let context_valid = self.was_falling
            || self.last.acceleration > c.context_acceleration
            || self.last.stability.is_some_and(|s| s < c.context_stability)
            || self.missing_frames >= c.context_min_missing
            || sample.magnitude >= self.motion.threshold * c.context_bypass_factor;

        debug!(
            "Missing-pose motion context: valid={} was_falling={} accel={:.3} missing={}",
            context_valid, self.was_falling, self.last.acceleration, self.missing_frames
        );

        context_valid.then(|| {
            (self.motion.missing_base_confidence + sample.magnitude * self.motion.missing_magnitude_gain)
                .min(1.0)
        })
    }

    /// Subject vanished mid-fall while moving down fast enough. Confidence
    /// decays linearly with the gap length.
    pub fn disappearance_fallback(&self, speed_threshold: f64) -> Option<f64> {
        let c = &self.config;
        let qualifies = self.was_falling
            && self.missing_frames <= c.disappearance_max_missing
            && self.last.speed > 0.0
            && self.last.speed > speed_threshold * c.disappearance_speed_fraction;

        qualifies.then(|| {
            let decay = self.missing_frames as f64 / c.disappearance_max_missing as f64;
            (c.disappearance_start_confidence - decay * c.disappearance_confidence_drop).max(0.0)
        })
    }

    pub fn missing_frames(&self) -> u32 {
        self.missing_frames
    }

    pub fn was_falling(&self) -> bool {
        self.was_falling
    }

    pub fn last_valid(&self) -> &LastValid {
        &self.last
    }

    pub fn reset(&mut self) {
        self.missing_frames = 0;
        self.falling_frames = 0;
        self.was_falling = false;
        self.last = LastValid::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> MissingDetectionHandler {
        MissingDetectionHandler::new(MissingConfig::default(), MotionConfig::default())
    }

    fn sample(speed: f64, accel: f64, stability: f64) -> TemporalSample {
        TemporalSample {
            vertical_speed: speed,
            acceleration: accel,
            stability,
        }
    }

    fn spike(magnitude: f64) -> MotionSample {
        MotionSample {
            magnitude,
            previous: Some(0.0),
            is_spike: true,
        }
    }

    #[test]
    fn test_phases_escalate() {
        let mut h = handler();
        for i in 1..=10 {
            assert_eq!(h.on_missing(), MissingPhase::ShortGap { missing: i });
        }
        assert_eq!(h.on_missing(), MissingPhase::LongGap { missing: 11 });
        assert_eq!(h.on_missing(), MissingPhase::LongGap { missing: 12 });

        let phase = h.on_detection(
            PostureState::Standing,
            &BodyMetrics::default(),
            &TemporalSample::default(),
            false,
        );
        assert_eq!(phase, MissingPhase::Tracking);
        assert_eq!(h.missing_frames(), 0);
    }

    #[test]
    fn test_falling_momentum_needs_two_frames() {
        let mut h = handler();
        let m = BodyMetrics::default();
        let s = sample(0.4, 1.0, 0.2);
        h.on_detection(PostureState::Falling, &m, &s, false);
        assert!(!h.was_falling());
        h.on_detection(PostureState::Falling, &m, &s, true);
        assert!(h.was_falling());
        // Fall still in progress and not back upright
        h.on_detection(PostureState::Lying, &m, &s, true);
        assert!(h.was_falling());
        h.on_detection(PostureState::Standing, &m, &s, true);
        assert!(!h.was_falling());
    }

    #[test]
    fn test_last_center_survives_partial_poses() {
        let mut h = handler();
        let with_center = BodyMetrics {
            center: Some((100.0, 200.0)),
            ..Default::default()
        };
        h.on_detection(PostureState::Standing, &with_center, &TemporalSample::default(), false);
        h.on_detection(PostureState::Unknown, &BodyMetrics::default(), &TemporalSample::default(), false);
        assert_eq!(h.last_valid().center, Some((100.0, 200.0)));
    }

    #[test]
    fn test_motion_fallback_needs_a_spike() {
        let mut h = handler();
        h.on_missing();
        let mut s = spike(0.9);
        s.is_spike = false;
        assert_eq!(h.motion_fallback(&s), None);
    }

    #[test]
    fn test_motion_fallback_context() {
        let mut h = handler();
        // Calm, stable subject; one missing frame; small spike
        h.on_detection(PostureState::Standing, &BodyMetrics::default(), &sample(0.0, 0.0, 0.9), false);
        h.on_missing();
        assert_eq!(h.motion_fallback(&spike(0.1)), None);

        // Large spike bypasses context
        let c = h.motion_fallback(&spike(0.5)).unwrap();
        assert!((c - 0.8).abs() < 1e-9);

        // Second missing frame is context on its own
        h.on_missing();
        assert!(h.motion_fallback(&spike(0.1)).is_some());
    }

    #[test]
    fn test_motion_fallback_unstable_subject() {
        let mut h = handler();
        h.on_detection(PostureState::Standing, &BodyMetrics::default(), &sample(0.0, 0.0, 0.5), false);
        h.on_missing();
        let c = h.motion_fallback(&spike(0.1)).unwrap();
        assert!((c - 0.72).abs() < 1e-9);
    }

    #[test]
    fn test_disappearance_confidence_decays() {
        let mut h = handler();
        let m = BodyMetrics::default();
        let s = sample(0.4, 1.0, 0.2);
        h.on_detection(PostureState::Falling, &m, &s, false);
        h.on_detection(PostureState::Falling, &m, &s, true);

        h.on_missing();
        let first = h.disappearance_fallback(0.3).unwrap();
        assert!((first - 0.83).abs() < 1e-9);
        for _ in 0..9 {
            h.on_missing();
        }
        let later = h.disappearance_fallback(0.3).unwrap();
        assert!((later - 0.65).abs() < 1e-9);
        assert!(later < first);
    }

    #[test]
    fn test_disappearance_requires_downward_speed() {
        let mut h = handler();
        let m = BodyMetrics::default();
        let slow = sample(0.1, 0.0, 0.2);
        h.on_detection(PostureState::Falling, &m, &slow, false);
        h.on_detection(PostureState::Falling, &m, &slow, true);
        h.on_missing();
        assert_eq!(h.disappearance_fallback(0.3), None);
    }

    #[test]
    fn test_long_gap_clears_momentum() {
        let mut h = handler();
        let m = BodyMetrics::default();
        let s = sample(0.4, 1.0, 0.2);
        h.on_detection(PostureState::Falling, &m, &s, false);
        h.on_detection(PostureState::Falling, &m, &s, true);
        for _ in 0..11 {
            h.on_missing();
        }
        assert!(!h.was_falling());
        assert_eq!(h.disappearance_fallback(0.3), None);
    }

    #[test]
    fn test_reset() {
        let mut h = handler();
        h.on_detection(PostureState::Falling, &BodyMetrics::default(), &sample(0.4, 1.0, 0.2), true);
        h.on_missing();
        h.reset();
        assert_eq!(h.missing_frames(), 0);
        assert!(!h.was_falling());
        assert_eq!(*h.last_valid(), LastValid::default());
    }
}
