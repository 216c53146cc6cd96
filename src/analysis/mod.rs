// src/analysis/mod.rs
//
// Per-frame signal extraction for the fall pipeline.
//
// Signal flow:
//   PoseFrame → body_metrics → temporal_tracker ─┬→ fall_confidence ─┐
//                                                └→ posture_classifier ┼→ PostureState
//   RGB raster → motion_signal ──────────────────────────────────────┘ (corroboration / fallback)
//
// Orchestrated by pipeline::session::FallDetector.

pub mod body_metrics;
pub mod fall_confidence;
pub mod motion_signal;
pub mod posture_classifier;
pub mod temporal_tracker;

pub use body_metrics::BodyMetrics;
pub use fall_confidence::FallConfidenceScorer;
pub use motion_signal::{GrayFrame, MotionFallbackSignal, MotionSample};
pub use posture_classifier::{PostureClassifier, PostureVotes};
pub use temporal_tracker::{TemporalSample, TemporalTracker};
