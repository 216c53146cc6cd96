// src/pipeline/metrics.rs
//
// Run counters shared by every stream worker. Logged as a summary at exit.

use crate::detection::{FallSource, PostureState};
use crate::pipeline::session::FrameOutcome;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub total_frames: Arc<AtomicU64>,
    pub frames_with_pose: Arc<AtomicU64>,
    pub frames_unknown: Arc<AtomicU64>,
    pub rejected_frames: Arc<AtomicU64>,
    pub fall_events: Arc<AtomicU64>,
    pub motion_falls: Arc<AtomicU64>,
    pub disappearance_falls: Arc<AtomicU64>,
    pub lying_events: Arc<AtomicU64>,
    pub streams_completed: Arc<AtomicU64>,
    pub streams_failed: Arc<AtomicU64>,
    pub frame_time_us: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            total_frames: Arc::new(AtomicU64::new(0)),
            frames_with_pose: Arc::new(AtomicU64::new(0)),
            frames_unknown: Arc::new(AtomicU64::new(0)),
            rejected_frames: Arc::new(AtomicU64::new(0)),
            fall_events: Arc::new(AtomicU64::new(0)),
            motion_falls: Arc::new(AtomicU64::new(0)),
            disappearance_falls: Arc::new(AtomicU64::new(0)),
            lying_events: Arc::new(AtomicU64::new(0)),
            streams_completed: Arc::new(AtomicU64::new(0)),
            streams_failed: Arc::new(AtomicU64::new(0)),
            frame_time_us: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_timing(&self, counter: &AtomicU64, duration_us: u64) {
        counter.store(duration_us, Ordering::Relaxed);
    }

    /// Count one processed frame
    pub fn record(&self, outcome: &FrameOutcome, had_pose: bool) {
        self.inc(&self.total_frames);
        if had_pose {
            self.inc(&self.frames_with_pose);
        }
        if outcome.posture == PostureState::Unknown {
            self.inc(&self.frames_unknown);
        }
        if let Some(fall) = &outcome.fall_event {
            self.inc(&self.fall_events);
            match fall.source {
                FallSource::Motion => self.inc(&self.motion_falls),
                FallSource::Disappearance => self.inc(&self.disappearance_falls),
                FallSource::Pose | FallSource::PoseTransition => {}
            }
        }
        if outcome.lying_event.is_some() {
            self.inc(&self.lying_events);
        }
    }

    pub fn fps(&self) -> f64 {
        let frames = self.total_frames.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_frames: self.total_frames.load(Ordering::Relaxed),
            fps: self.fps(),
            frames_with_pose: self.frames_with_pose.load(Ordering::Relaxed),
            frames_unknown: self.frames_unknown.load(Ordering::Relaxed),
            rejected_frames: self.rejected_frames.load(Ordering::Relaxed),
            fall_events: self.fall_events.load(Ordering::Relaxed),
            motion_falls: self.motion_falls.load(Ordering::Relaxed),
            disappearance_falls: self.disappearance_falls.load(Ordering::Relaxed),
            lying_events: self.lying_events.load(Ordering::Relaxed),
            streams_completed: self.streams_completed.load(Ordering::Relaxed),
            streams_failed: self.streams_failed.load(Ordering::Relaxed),
            last_frame_us: self.frame_time_us.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub fps: f64,
    pub frames_with_pose: u64,
    pub frames_unknown: u64,
    pub rejected_frames: u64,
    pub fall_events: u64,
    pub motion_falls: u64,
    pub disappearance_falls: u64,
    pub lying_events: u64,
    pub streams_completed: u64,
    pub streams_failed: u64,
    pub last_frame_us: u64,
    pub elapsed_secs: f64,
}
