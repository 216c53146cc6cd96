// src/types.rs

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub detector: DetectorConfig,
    pub replay: ReplayConfig,
    pub logging: LoggingConfig,
}

/// Every tunable of the detection engine. Loaded once, never mutated while a
/// session runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub fall_threshold: FallThresholdConfig,
    pub history: HistoryConfig,
    pub metrics: MetricConfig,
    pub voting: VotingConfig,
    pub scoring: ScoringConfig,
    pub motion: MotionConfig,
    pub missing: MissingConfig,
    pub alert: AlertConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallThresholdConfig {
    /// Normalized downward speed (frame heights per second) treated as a full fall
    pub vertical_speed: f64,
}

impl Default for FallThresholdConfig {
    fn default() -> Self {
        Self {
            vertical_speed: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Capacity of the center / angle / timestamp / velocity / stability rings
    pub size: usize,
    /// Capacity of the acceleration ring
    pub acceleration_size: usize,
    /// Entries used for the vertical speed average
    pub speed_window: usize,
    /// Entries used for horizontal sway
    pub sway_window: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            size: 30, // ~1s at 30fps
            acceleration_size: 10,
            speed_window: 5,
            sway_window: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricConfig {
    pub center_min_confidence: f32,
    pub trunk_min_confidence: f32,
    pub head_min_confidence: f32,
    pub bbox_min_confidence: f32,
    pub bbox_min_visible: usize,
    /// Boxes shorter than this are rejected (division guard)
    pub bbox_min_height_px: f64,
    pub leg_min_confidence: f32,
    pub leg_min_length_px: f64,
    pub ankle_min_confidence: f32,
    /// Ankle separation considered a fully stable stance
    pub stance_reference_px: f64,
    /// Horizontal sway (std dev) at which the sway factor reaches zero
    pub sway_reference_px: f64,
}

impl Default for MetricConfig {
    fn default() -> Self {
        Self {
            center_min_confidence: 0.5,
            trunk_min_confidence: 0.5,
            head_min_confidence: 0.5,
            bbox_min_confidence: 0.3,
            bbox_min_visible: 4,
            bbox_min_height_px: 10.0,
            leg_min_confidence: 0.4,
            leg_min_length_px: 10.0,
            ankle_min_confidence: 0.5,
            stance_reference_px: 200.0,
            sway_reference_px: 50.0,
        }
    }
}

/// Band edges for the posture vote. Each factor votes into the band whose
/// lower edge it exceeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VotingConfig {
    pub trunk_lying_deg: f64,
    pub trunk_mixed_deg: f64,
    pub trunk_sitting_deg: f64,
    pub bbox_lying_ratio: f64,
    pub bbox_mixed_ratio: f64,
    pub bbox_sitting_ratio: f64,
    /// head_hip_diff below these values (px) votes toward lying / mixed / sitting
    pub head_hip_lying_px: f64,
    pub head_hip_mixed_px: f64,
    pub head_hip_sitting_px: f64,
    pub leg_lying_deg: f64,
    pub leg_mixed_deg: f64,
    pub leg_sitting_deg: f64,
    pub position_lying: f64,
    pub position_mixed: f64,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            trunk_lying_deg: 70.0,
            trunk_mixed_deg: 50.0,
            trunk_sitting_deg: 30.0,
            bbox_lying_ratio: 1.5,
            bbox_mixed_ratio: 1.0,
            bbox_sitting_ratio: 0.7,
            head_hip_lying_px: 20.0,
            head_hip_mixed_px: 50.0,
            head_hip_sitting_px: 100.0,
            leg_lying_deg: 70.0,
            leg_mixed_deg: 45.0,
            leg_sitting_deg: 25.0,
            position_lying: 0.75,
            position_mixed: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub angle_weight: f64,
    pub speed_weight: f64,
    pub acceleration_weight: f64,
    pub instability_weight: f64,
    pub angle_start_deg: f64,
    pub angle_full_deg: f64,
    pub acceleration_min: f64,
    pub acceleration_full: f64,
    /// normalized_y above this with a steep angle earns the position bonus
    pub low_position: f64,
    pub low_position_angle_deg: f64,
    pub low_position_bonus: f64,
    /// normalized_y below this scales the score down
    pub high_position: f64,
    pub high_position_factor: f64,
    /// Score that must be exceeded before Falling is considered
    pub falling_confidence: f64,
    /// Fraction of the vertical speed threshold that counts as moving down
    pub falling_speed_fraction: f64,
    /// Stability below this counts as losing balance
    pub falling_max_stability: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            angle_weight: 0.30,
            speed_weight: 0.25,
            acceleration_weight: 0.20,
            instability_weight: 0.15,
            angle_start_deg: 30.0,
            angle_full_deg: 90.0,
            acceleration_min: 0.5,
            acceleration_full: 2.0,
            low_position: 0.7,
            low_position_angle_deg: 60.0,
            low_position_bonus: 0.10,
            high_position: 0.4,
            high_position_factor: 0.8,
            falling_confidence: 0.6,
            falling_speed_fraction: 0.3,
            falling_max_stability: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Run frame differencing at all
    pub enabled: bool,
    /// Motion magnitude treated as "large" (fraction of changed pixels, weighted)
    pub threshold: f64,
    /// Box blur radius; 5 gives an 11x11 window
    pub blur_radius: usize,
    /// Absolute intensity difference that marks a pixel as changed
    pub diff_threshold: u8,
    /// Weight of the lower half of the frame; the whole frame gets the rest
    pub lower_half_weight: f64,
    pub history_size: usize,
    /// Spike when magnitude rises by more than this × threshold in one sample
    pub spike_change_factor: f64,
    /// Spike when magnitude alone exceeds this × threshold
    pub spike_peak_factor: f64,
    /// Spike when magnitude exceeds this × threshold after a quiet sample
    pub spike_rise_factor: f64,
    /// Previous sample below this × threshold counts as quiet
    pub quiet_factor: f64,

    // Corroboration while a pose is present
    pub pose_context_acceleration: f64,
    pub pose_context_stability: f64,
    pub pose_context_speed: f64,
    pub pose_bypass_factor: f64,
    pub pose_base_confidence: f64,
    pub pose_magnitude_gain: f64,

    // Fallback while the pose is missing
    pub missing_base_confidence: f64,
    pub missing_magnitude_gain: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.15,
            blur_radius: 5,
            diff_threshold: 15,
            lower_half_weight: 0.7,
            history_size: 10,
            spike_change_factor: 0.6,
            spike_peak_factor: 1.5,
            spike_rise_factor: 1.0,
            quiet_factor: 0.5,
            pose_context_acceleration: 0.3,
            pose_context_stability: 0.4,
            pose_context_speed: 0.05,
            pose_bypass_factor: 1.5,
            pose_base_confidence: 0.75,
            pose_magnitude_gain: 0.15,
            missing_base_confidence: 0.7,
            missing_magnitude_gain: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MissingConfig {
    /// Consecutive missing frames during which the last posture is held
    pub max_missing_frames: u32,
    /// Consecutive Falling frames before "was falling" is latched
    pub falling_momentum_frames: u32,
    pub context_acceleration: f64,
    pub context_stability: f64,
    pub context_min_missing: u32,
    /// Spike magnitude (× motion threshold) that is valid context on its own
    pub context_bypass_factor: f64,
    /// Disappearance fallback gives up after this many missing frames
    pub disappearance_max_missing: u32,
    pub disappearance_speed_fraction: f64,
    pub disappearance_start_confidence: f64,
    pub disappearance_confidence_drop: f64,
}

impl Default for MissingConfig {
    fn default() -> Self {
        Self {
            max_missing_frames: 10,
            falling_momentum_frames: 2,
            context_acceleration: 0.2,
            context_stability: 0.6,
            context_min_missing: 2,
            context_bypass_factor: 1.0,
            disappearance_max_missing: 15,
            disappearance_speed_fraction: 0.5,
            disappearance_start_confidence: 0.85,
            disappearance_confidence_drop: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub cooldown_seconds: f64,
    pub lying_alert_threshold: f64,
    pub lying_cooldown: f64,
    /// Confidence of a fall confirmed by a direct Falling -> Lying transition
    pub transition_confidence: f64,
    pub lying_confidence: f64,
    pub attach_snapshot: bool,
    pub snapshot_quality: u8,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: 5.0,
            lying_alert_threshold: 3.0,
            lying_cooldown: 10.0,
            transition_confidence: 0.95,
            lying_confidence: 0.85,
            attach_snapshot: true,
            snapshot_quality: 80,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub input_dir: String,
    pub output_dir: String,
    pub extension: String,
    /// Decode the frame image referenced by each record (motion fallback + snapshots)
    pub load_frames: bool,
    pub max_pending_events: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            input_dir: "recordings".to_string(),
            output_dir: "alerts".to_string(),
            extension: "jsonl".to_string(),
            load_frames: true,
            max_pending_events: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "fall_watch=info".to_string(),
        }
    }
}

/// Packed RGB raster, row-major, 3 bytes per pixel.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub timestamp: f64,
}
