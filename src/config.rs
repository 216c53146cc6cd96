// src/config.rs

use crate::error::DetectError;
use crate::types::{Config, DetectorConfig};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.detector.validate()?;
        Ok(config)
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), DetectError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(DetectError::config(field, format!("must be a positive number, got {value}")))
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), DetectError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(DetectError::config(field, format!("must be finite and >= 0, got {value}")))
    }
}

fn unit(field: &'static str, value: f64) -> Result<(), DetectError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(DetectError::config(field, format!("must lie in [0, 1], got {value}")))
    }
}

/// Each band triple must be ordered high > mid > low.
fn descending(field: &'static str, values: [f64; 3]) -> Result<(), DetectError> {
    if values.iter().all(|v| v.is_finite()) && values[0] > values[1] && values[1] > values[2] {
        Ok(())
    } else {
        Err(DetectError::config(field, format!("bands must be strictly descending, got {values:?}")))
    }
}

/// Largest accepted motion blur radius in pixels
pub const MAX_BLUR_RADIUS: usize = 32;

impl DetectorConfig {
    /// Reject unusable tunables once, before any frame is processed.
    pub fn validate(&self) -> Result<(), DetectError> {
        positive("fall_threshold.vertical_speed", self.fall_threshold.vertical_speed)?;

        let h = &self.history;
        if h.size < 2 {
            return Err(DetectError::config("history.size", "must be at least 2"));
        }
        if h.acceleration_size < 1 {
            return Err(DetectError::config("history.acceleration_size", "must be at least 1"));
        }
        if h.speed_window < 2 || h.speed_window > h.size {
            return Err(DetectError::config("history.speed_window", "must lie in [2, history.size]"));
        }
        if h.sway_window < 2 || h.sway_window > h.size {
            return Err(DetectError::config("history.sway_window", "must lie in [2, history.size]"));
        }

        let m = &self.metrics;
        for (field, value) in [
            ("metrics.center_min_confidence", m.center_min_confidence),
            ("metrics.trunk_min_confidence", m.trunk_min_confidence),
            ("metrics.head_min_confidence", m.head_min_confidence),
            ("metrics.bbox_min_confidence", m.bbox_min_confidence),
            ("metrics.leg_min_confidence", m.leg_min_confidence),
            ("metrics.ankle_min_confidence", m.ankle_min_confidence),
        ] {
            unit(field, value as f64)?;
        }
        if m.bbox_min_visible < 2 {
            return Err(DetectError::config("metrics.bbox_min_visible", "must be at least 2"));
        }
        positive("metrics.bbox_min_height_px", m.bbox_min_height_px)?;
        non_negative("metrics.leg_min_length_px", m.leg_min_length_px)?;
        positive("metrics.stance_reference_px", m.stance_reference_px)?;
        positive("metrics.sway_reference_px", m.sway_reference_px)?;

        let v = &self.voting;
        descending("voting.trunk_*_deg", [v.trunk_lying_deg, v.trunk_mixed_deg, v.trunk_sitting_deg])?;
        descending("voting.bbox_*_ratio", [v.bbox_lying_ratio, v.bbox_mixed_ratio, v.bbox_sitting_ratio])?;
        descending(
            "voting.head_hip_*_px",
            [v.head_hip_sitting_px, v.head_hip_mixed_px, v.head_hip_lying_px],
        )?;
        descending("voting.leg_*_deg", [v.leg_lying_deg, v.leg_mixed_deg, v.leg_sitting_deg])?;
        if !(v.position_lying > v.position_mixed) {
            return Err(DetectError::config(
                "voting.position_lying",
                "must be greater than voting.position_mixed",
            ));
        }

        let s = &self.scoring;
        for (field, value) in [
            ("scoring.angle_weight", s.angle_weight),
            ("scoring.speed_weight", s.speed_weight),
            ("scoring.acceleration_weight", s.acceleration_weight),
            ("scoring.instability_weight", s.instability_weight),
            ("scoring.low_position_bonus", s.low_position_bonus),
            ("scoring.high_position_factor", s.high_position_factor),
            ("scoring.falling_confidence", s.falling_confidence),
            ("scoring.falling_speed_fraction", s.falling_speed_fraction),
            ("scoring.falling_max_stability", s.falling_max_stability),
        ] {
            unit(field, value)?;
        }
        if !(s.angle_full_deg > s.angle_start_deg) {
            return Err(DetectError::config("scoring.angle_full_deg", "must exceed angle_start_deg"));
        }
        positive("scoring.acceleration_full", s.acceleration_full)?;
        non_negative("scoring.acceleration_min", s.acceleration_min)?;
        unit("scoring.low_position", s.low_position)?;
        unit("scoring.high_position", s.high_position)?;
        non_negative("scoring.low_position_angle_deg", s.low_position_angle_deg)?;

        let mo = &self.motion;
        positive("motion.threshold", mo.threshold)?;
        unit("motion.lower_half_weight", mo.lower_half_weight)?;
        if mo.history_size < 2 {
            return Err(DetectError::config("motion.history_size", "must be at least 2"));
        }
        for (field, value) in [
            ("motion.spike_change_factor", mo.spike_change_factor),
            ("motion.spike_peak_factor", mo.spike_peak_factor),
            ("motion.spike_rise_factor", mo.spike_rise_factor),
            ("motion.quiet_factor", mo.quiet_factor),
            ("motion.pose_bypass_factor", mo.pose_bypass_factor),
        ] {
            positive(field, value)?;
        }
        if mo.blur_radius > MAX_BLUR_RADIUS {
            return Err(DetectError::config(
                "motion.blur_radius",
                format!("must be at most {MAX_BLUR_RADIUS}, got {}", mo.blur_radius),
            ));
        }
        unit("motion.pose_base_confidence", mo.pose_base_confidence)?;
        unit("motion.missing_base_confidence", mo.missing_base_confidence)?;
        unit("motion.pose_context_stability", mo.pose_context_stability)?;
        non_negative("motion.pose_context_acceleration", mo.pose_context_acceleration)?;
        non_negative("motion.pose_context_speed", mo.pose_context_speed)?;
        non_negative("motion.pose_magnitude_gain", mo.pose_magnitude_gain)?;
        non_negative("motion.missing_magnitude_gain", mo.missing_magnitude_gain)?;

        let mi = &self.missing;
        if mi.max_missing_frames < 1 {
            return Err(DetectError::config("missing.max_missing_frames", "must be at least 1"));
        }
        if mi.disappearance_max_missing < 1 {
            return Err(DetectError::config("missing.disappearance_max_missing", "must be at least 1"));
        }
        unit("missing.disappearance_start_confidence", mi.disappearance_start_confidence)?;
        unit("missing.disappearance_confidence_drop", mi.disappearance_confidence_drop)?;
        positive("missing.context_bypass_factor", mi.context_bypass_factor)?;
        non_negative("missing.context_acceleration", mi.context_acceleration)?;
        unit("missing.context_stability", mi.context_stability)?;
        unit("missing.disappearance_speed_fraction", mi.disappearance_speed_fraction)?;

        let a = &self.alert;
        non_negative("alert.cooldown_seconds", a.cooldown_seconds)?;
        non_negative("alert.lying_alert_threshold", a.lying_alert_threshold)?;
        non_negative("alert.lying_cooldown", a.lying_cooldown)?;
        unit("alert.transition_confidence", a.transition_confidence)?;
        unit("alert.lying_confidence", a.lying_confidence)?;
        if a.snapshot_quality == 0 || a.snapshot_quality > 100 {
            return Err(DetectError::config("alert.snapshot_quality", "must lie in [1, 100]"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        assert!(DetectorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_negative_cooldown_rejected() {
        let mut cfg = DetectorConfig::default();
        cfg.alert.cooldown_seconds = -1.0;
        let err = cfg.validate().unwrap_err();
        assert!(matches!(
            err,
            DetectError::InvalidConfig { field: "alert.cooldown_seconds", .. }
        ));
    }

    #[test]
    fn test_confidence_out_of_range_rejected() {
        let mut cfg = DetectorConfig::default();
        cfg.metrics.trunk_min_confidence = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_unordered_bands_rejected() {
        let mut cfg = DetectorConfig::default();
        cfg.voting.trunk_mixed_deg = 80.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_zero_max_missing_rejected() {
        let mut cfg = DetectorConfig::default();
        cfg.missing.max_missing_frames = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_nan_thresholds_rejected() {
        let cases: [(&str, fn(&mut DetectorConfig)); 4] = [
            ("missing.context_stability", |c| c.missing.context_stability = f64::NAN),
            ("motion.pose_context_speed", |c| c.motion.pose_context_speed = f64::NAN),
            ("scoring.low_position", |c| c.scoring.low_position = f64::NAN),
            ("missing.disappearance_speed_fraction", |c| {
                c.missing.disappearance_speed_fraction = f64::NAN
            }),
        ];
        for (expected, set) in cases {
            let mut cfg = DetectorConfig::default();
            set(&mut cfg);
            match cfg.validate() {
                Err(DetectError::InvalidConfig { field, .. }) => assert_eq!(field, expected),
                other => panic!("{expected}: expected InvalidConfig, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_huge_blur_radius_rejected() {
        let mut cfg = DetectorConfig::default();
        cfg.motion.blur_radius = 1 << 40;
        assert!(matches!(
            cfg.validate(),
            Err(DetectError::InvalidConfig { field: "motion.blur_radius", .. })
        ));
        cfg.motion.blur_radius = MAX_BLUR_RADIUS;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_shipped_config_keeps_default_history() {
        let config = Config::load(concat!(env!("CARGO_MANIFEST_DIR"), "/config.yaml")).unwrap();
        assert_eq!(config.detector.history.size, crate::types::HistoryConfig::default().size);
        assert_eq!(config.detector.history.size, 30);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "detector:\n  alert:\n    cooldown_seconds: 8.0\n  missing:\n    max_missing_frames: 15\n"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.detector.alert.cooldown_seconds, 8.0);
        assert_eq!(config.detector.alert.lying_cooldown, 10.0);
        assert_eq!(config.detector.missing.max_missing_frames, 15);
        assert_eq!(config.detector.history.size, 30);
        assert_eq!(config.replay.extension, "jsonl");
    }

    #[test]
    fn test_invalid_yaml_values_rejected_at_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "detector:\n  motion:\n    threshold: 0.0\n").unwrap();
        assert!(Config::load(file.path()).is_err());
    }
}
