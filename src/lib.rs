// src/lib.rs

pub mod analysis;
pub mod config;
pub mod detection;
pub mod error;
pub mod pipeline;
pub mod replay;
pub mod snapshot;
pub mod types;

pub use detection::{FallEvent, FallSource, Landmark, LyingEvent, PoseFrame, PostureState};
pub use error::DetectError;
pub use pipeline::{FallDetector, FrameInput, FrameOutcome};
pub use types::{Config, DetectorConfig, Frame};
