// src/pipeline/mod.rs

pub mod event_bus;
pub mod metrics;
pub mod session;
pub mod status_board;

pub use event_bus::{AlertEvent, EventBus};
pub use metrics::{MetricsSummary, PipelineMetrics};
pub use session::{FallDetector, FrameInput, FrameOutcome, MetricsSnapshot};
pub use status_board::{StatusBoard, StatusPublisher, StatusSnapshot};
