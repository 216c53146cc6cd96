// src/pipeline/session.rs
//
// One detector session per monitored stream. Owns every rolling history and
// flag; driven synchronously one frame at a time.
//
// Single entry point: call process_frame() each frame, in timestamp order.
//
// Per frame:
//   1. validate the input (nothing is mutated on error)
//   2. motion sample from the raster, if enabled and present
//   3a. pose present: metrics → tracker → score / vote → gate → corroboration
//   3b. pose absent:  gap state machine → motion / disappearance fallbacks

use crate::analysis::{
    BodyMetrics, FallConfidenceScorer, GrayFrame, MotionFallbackSignal, MotionSample,
    PostureClassifier, TemporalSample, TemporalTracker,
};
use crate::detection::{
    EventGate, FallEvent, FallSource, LyingEvent, MissingDetectionHandler, MissingPhase, PoseFrame,
    PostureState,
};
use crate::error::DetectError;
use crate::snapshot::encode_rgb_to_jpeg;
use crate::types::{DetectorConfig, Frame};
use serde::Serialize;
use tracing::{debug, info, warn};

// ============================================================================
// INPUT / OUTPUT
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct FrameInput<'a> {
    /// Seconds on the caller's clock, non-decreasing within a session
    pub timestamp: f64,
    pub width: usize,
    pub height: usize,
    /// Packed RGB raster, width * height * 3 bytes. Enables motion fallback
    /// and snapshots.
    pub rgb: Option<&'a [u8]>,
    /// None is the explicit "no detection" signal
    pub pose: Option<&'a PoseFrame>,
}

impl<'a> FrameInput<'a> {
    pub fn from_frame(frame: &'a Frame, pose: Option<&'a PoseFrame>) -> Self {
        Self {
            timestamp: frame.timestamp,
            width: frame.width,
            height: frame.height,
            rgb: Some(&frame.data),
            pose,
        }
    }

    /// Pose-only input, no raster
    pub fn pose_only(timestamp: f64, width: usize, height: usize, pose: Option<&'a PoseFrame>) -> Self {
        Self {
            timestamp,
            width,
            height,
            rgb: None,
            pose,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub body: BodyMetrics,
    pub normalized_y: Option<f64>,
    /// None on frames without a pose
    pub temporal: Option<TemporalSample>,
    pub fall_score: f64,
    pub motion: Option<MotionSample>,
    pub missing: MissingPhase,
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameOutcome {
    pub timestamp: f64,
    pub posture: PostureState,
    pub fall_event: Option<FallEvent>,
    pub lying_event: Option<LyingEvent>,
    /// Fall event confidence, else lying event confidence, else the fused score
    pub confidence: f64,
    pub metrics: MetricsSnapshot,
}

// ============================================================================
// SESSION
// ============================================================================

pub struct FallDetector {
    config: DetectorConfig,
    tracker: TemporalTracker,
    motion: Option<MotionFallbackSignal>,
    classifier: PostureClassifier,
    scorer: FallConfidenceScorer,
    missing: MissingDetectionHandler,
    gate: EventGate,
    state: PostureState,
    last_timestamp: Option<f64>,
    frame_count: u64,
}

impl FallDetector {
    pub fn new(config: DetectorConfig) -> Result<Self, DetectError> {
        config.validate()?;
        let motion = config
            .motion
            .enabled
            .then(|| MotionFallbackSignal::new(config.motion.clone()));

        Ok(Self {
            tracker: TemporalTracker::new(config.history.clone(), config.metrics.clone()),
            motion,
            classifier: PostureClassifier::new(config.voting.clone()),
            scorer: FallConfidenceScorer::new(config.scoring.clone(), config.fall_threshold.vertical_speed),
            missing: MissingDetectionHandler::new(config.missing.clone(), config.motion.clone()),
            gate: EventGate::new(config.alert.clone()),
            state: PostureState::Unknown,
            last_timestamp: None,
            frame_count: 0,
            config,
        })
    }

    pub fn process_frame(&mut self, input: FrameInput<'_>) -> Result<FrameOutcome, DetectError> {
        self.validate(&input)?;
        self.last_timestamp = Some(input.timestamp);
        self.frame_count += 1;

        let motion = match (self.motion.as_mut(), input.rgb) {
            (Some(signal), Some(rgb)) => {
                let gray = GrayFrame::from_rgb(rgb, input.width, input.height);
                Some(signal.observe(&gray))
            }
            _ => None,
        };

        let outcome = match input.pose {
            Some(pose) => self.process_tracked(&input, pose, motion),
            None => self.process_missing(&input, motion),
        };
        Ok(outcome)
    }

    fn validate(&self, input: &FrameInput<'_>) -> Result<(), DetectError> {
        if input.width == 0 || input.height == 0 {
            return Err(DetectError::input(format!(
                "frame dimensions must be positive, got {}x{}",
                input.width, input.height
            )));
        }
        if !input.timestamp.is_finite() {
            return Err(DetectError::input(format!("timestamp {} is not finite", input.timestamp)));
        }
        if let Some(last) = self.last_timestamp {
            if input.timestamp < last {
                return Err(DetectError::input(format!(
                    "timestamp went backwards: {} < {}",
                    input.timestamp, last
                )));
            }
        }
        if let Some(rgb) = input.rgb {
            let expected = input
                .width
                .checked_mul(input.height)
                .and_then(|n| n.checked_mul(3))
                .ok_or_else(|| {
                    DetectError::input(format!(
                        "frame dimensions {}x{} overflow the raster size",
                        input.width, input.height
                    ))
                })?;
            if rgb.len() != expected {
                return Err(DetectError::input(format!(
                    "raster has {} bytes, expected {} for {}x{} RGB",
                    rgb.len(),
                    expected,
                    input.width,
                    input.height
                )));
            }
        }
        if let Some(pose) = input.pose {
            pose.validate()?;
        }
        Ok(())
    }

    fn process_tracked(
        &mut self,
        input: &FrameInput<'_>,
        pose: &PoseFrame,
        motion: Option<MotionSample>,
    ) -> FrameOutcome {
        let ts = input.timestamp;
        let frame_h = input.height as f64;

        let body = BodyMetrics::extract(pose, &self.config.metrics);
        let sample = self.tracker.update(&body, pose, ts, frame_h);
        let normalized_y = body.center.map(|(_, y)| y / frame_h);

        let score = self.scorer.score(
            body.trunk_angle_deg,
            sample.vertical_speed,
            sample.acceleration,
            sample.stability,
            normalized_y,
        );
        let new_state = if self.scorer.is_falling(score, sample.vertical_speed, sample.stability) {
            PostureState::Falling
        } else {
            self.classifier.classify(&body, normalized_y)
        };

        let previous = self.state;
        if new_state != previous {
            info!(
                "🔄 State changed: {} → {} | angle: {} | speed: {:.2}",
                previous.as_str(),
                new_state.as_str(),
                body.trunk_angle_deg
                    .map(|a| format!("{a:.1}°"))
                    .unwrap_or_else(|| "N/A".to_string()),
                sample.vertical_speed
            );
        }

        let phase = self
            .missing
            .on_detection(new_state, &body, &sample, self.gate.fall_in_progress());
        self.gate.observe_posture(new_state, ts);

        let location = self.location(body.center, input);
        let mut fall_event = None;

        match new_state {
            PostureState::Falling => {
                if let Some(duration) = self.gate.try_confirm_fall(ts) {
                    warn!(
                        "🚨 Fall detected! score={:.2} duration={:.2}s speed={:.2}",
                        score, duration, sample.vertical_speed
                    );
                    fall_event =
                        Some(self.fall_event(input, score, location, previous, duration, FallSource::Pose));
                }
            }
            PostureState::Lying if previous == PostureState::Falling => {
                if let Some(duration) = self.gate.try_confirm_fall(ts) {
                    warn!("🚨 Fall confirmed by Falling → Lying transition");
                    let confidence = self.config.alert.transition_confidence;
                    fall_event = Some(self.fall_event(
                        input,
                        confidence,
                        location,
                        previous,
                        duration,
                        FallSource::PoseTransition,
                    ));
                }
            }
            _ => {}
        }

        let lying_event = self.gate.update_lying(new_state, ts).map(|duration| {
            warn!("⚠️ LYING ALERT! Person lying for {:.1}s", duration);
            LyingEvent {
                timestamp: ts,
                confidence: self.config.alert.lying_confidence,
                location,
                previous_state: previous,
                duration,
                frame_snapshot: self.snapshot(input),
            }
        });

        if fall_event.is_none() {
            if let Some(m) = motion.filter(|m| m.is_spike && m.magnitude > 0.0) {
                fall_event = self.corroborate_motion(input, &m, &sample, new_state, location, previous);
            }
        }

        self.state = new_state;

        let confidence = fall_event
            .as_ref()
            .map(|e| e.confidence)
            .or_else(|| lying_event.as_ref().map(|e| e.confidence))
            .unwrap_or(score);

        FrameOutcome {
            timestamp: ts,
            posture: new_state,
            fall_event,
            lying_event,
            confidence,
            metrics: MetricsSnapshot {
                body,
                normalized_y,
                temporal: Some(sample),
                fall_score: score,
                motion,
                missing: phase,
            },
        }
    }

    /// Motion spike while the pose is still visible. Needs supporting
    /// context unless the spike is very large.
    fn corroborate_motion(
        &mut self,
        input: &FrameInput<'_>,
        motion: &MotionSample,
        sample: &TemporalSample,
        state: PostureState,
        location: (i32, i32),
        previous: PostureState,
    ) -> Option<FallEvent> {
        let mc = &self.config.motion;
        let context_valid = state == PostureState::Falling
            || self.missing.was_falling()
            || sample.acceleration > mc.pose_context_acceleration
            || (sample.stability < mc.pose_context_stability
                && sample.vertical_speed > mc.pose_context_speed);
        let bypass = motion.magnitude > mc.threshold * mc.pose_bypass_factor;

        debug!(
            "Motion context: valid={} state={} accel={:.3} stab={:.2} speed={:.3}",
            context_valid,
            state.as_str(),
            sample.acceleration,
            sample.stability,
            sample.vertical_speed
        );

        if !(context_valid || bypass) {
            return None;
        }
        let confidence = (mc.pose_base_confidence + motion.magnitude * mc.pose_magnitude_gain).min(1.0);
        let duration = self.gate.try_confirm_fall(input.timestamp)?;
        warn!(
            "🚨 MOTION-BASED FALL! motion={:.3} confidence={:.2}",
            motion.magnitude, confidence
        );
        Some(self.fall_event(input, confidence, location, previous, duration, FallSource::Motion))
    }

    fn process_missing(&mut self, input: &FrameInput<'_>, motion: Option<MotionSample>) -> FrameOutcome {
        let ts = input.timestamp;
        let phase = self.missing.on_missing();
        let mut fall_event = None;

        match phase {
            MissingPhase::LongGap { .. } => {
                self.state = PostureState::Unknown;
                self.gate.on_tracking_lost();
            }
            MissingPhase::ShortGap { missing } => {
                debug!(
                    "Tracking lost ({}/{}){}",
                    missing,
                    self.config.missing.max_missing_frames,
                    if self.missing.was_falling() { " - falling?" } else { "" }
                );
                let location = self.location(self.missing.last_valid().center, input);

                if let Some(confidence) = motion.as_ref().and_then(|m| self.missing.motion_fallback(m)) {
                    if let Some(duration) = self.gate.try_confirm_fall(ts) {
                        warn!(
                            "🚨 MOTION-BASED FALL while pose missing! missing={} confidence={:.2}",
                            missing, confidence
                        );
                        fall_event = Some(self.fall_event(
                            input,
                            confidence,
                            location,
                            self.state,
                            duration,
                            FallSource::Motion,
                        ));
                    }
                }

                if fall_event.is_none() {
                    let threshold = self.config.fall_threshold.vertical_speed;
                    if let Some(confidence) = self.missing.disappearance_fallback(threshold) {
                        if let Some(duration) = self.gate.try_confirm_fall(ts) {
                            warn!("⚠️ Fall by disappearance, missing {} frames", missing);
                            fall_event = Some(self.fall_event(
                                input,
                                confidence,
                                location,
                                self.state,
                                duration,
                                FallSource::Disappearance,
                            ));
                        }
                    }
                }
            }
            MissingPhase::Tracking => {}
        }

        let confidence = fall_event.as_ref().map(|e| e.confidence).unwrap_or(0.0);

        FrameOutcome {
            timestamp: ts,
            posture: self.state,
            fall_event,
            lying_event: None,
            confidence,
            metrics: MetricsSnapshot {
                body: BodyMetrics::default(),
                normalized_y: None,
                temporal: None,
                fall_score: 0.0,
                motion,
                missing: phase,
            },
        }
    }

    fn fall_event(
        &self,
        input: &FrameInput<'_>,
        confidence: f64,
        location: (i32, i32),
        previous_state: PostureState,
        duration: f64,
        source: FallSource,
    ) -> FallEvent {
        FallEvent {
            timestamp: input.timestamp,
            confidence,
            location,
            previous_state,
            duration,
            source,
            frame_snapshot: self.snapshot(input),
        }
    }

    /// Given center, else frame center
    fn location(&self, center: Option<(f64, f64)>, input: &FrameInput<'_>) -> (i32, i32) {
        match center {
            Some((x, y)) => (x.round() as i32, y.round() as i32),
            None => ((input.width / 2) as i32, (input.height / 2) as i32),
        }
    }

    fn snapshot(&self, input: &FrameInput<'_>) -> Option<Vec<u8>> {
        if !self.config.alert.attach_snapshot {
            return None;
        }
        let rgb = input.rgb?;
        match encode_rgb_to_jpeg(rgb, input.width, input.height, self.config.alert.snapshot_quality) {
            Ok(jpeg) => Some(jpeg),
            Err(e) => {
                warn!("Snapshot encoding failed: {:#}", e);
                None
            }
        }
    }

    pub fn state(&self) -> PostureState {
        self.state
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Clear every history and flag. The next frame behaves like the first
    /// frame of a fresh session.
    pub fn reset(&mut self) {
        self.tracker.reset();
        if let Some(motion) = self.motion.as_mut() {
            motion.reset();
        }
        self.missing.reset();
        self.gate.reset();
        self.state = PostureState::Unknown;
        self.last_timestamp = None;
        self.frame_count = 0;
    }
}
