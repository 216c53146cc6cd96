// src/detection/mod.rs

mod event_gate;
mod missing_detection;
mod types;

// Re-export public APIs
pub use event_gate::EventGate;
pub use missing_detection::{LastValid, MissingDetectionHandler, MissingPhase};
pub use types::*;
