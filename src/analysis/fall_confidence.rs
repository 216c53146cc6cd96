// src/analysis/fall_confidence.rs
//
// Weighted fusion of angle, downward speed, acceleration and instability
// into a single fall score in [0, 1].

use crate::types::ScoringConfig;

pub struct FallConfidenceScorer {
    config: ScoringConfig,
    /// Normalized vertical speed treated as a full fall
    speed_threshold: f64,
}

impl FallConfidenceScorer {
    pub fn new(config: ScoringConfig, speed_threshold: f64) -> Self {
        Self {
            config,
            speed_threshold,
        }
    }

    pub fn score(
        &self,
        angle: Option<f64>,
        vertical_speed: f64,
        acceleration: f64,
        stability: f64,
        normalized_y: Option<f64>,
    ) -> f64 {
        let c = &self.config;
        let Some(angle) = angle else {
            return 0.0;
        };

        let angle_score = if angle > c.angle_start_deg {
            ((angle - c.angle_start_deg) / (c.angle_full_deg - c.angle_start_deg)).min(1.0)
        } else {
            0.0
        };

        // Only downward motion counts
        let speed_score = if vertical_speed > 0.0 {
            (vertical_speed / self.speed_threshold).min(1.0)
        } else {
            0.0
        };

        let accel_score = if acceleration > c.acceleration_min {
            (acceleration / c.acceleration_full).min(1.0)
        } else {
            0.0
        };

        let instability = 1.0 - stability.clamp(0.0, 1.0);

        let mut score = angle_score * c.angle_weight
            + speed_score * c.speed_weight
            + accel_score * c.acceleration_weight
            + instability * c.instability_weight;

        if let Some(y) = normalized_y {
            if y > c.low_position && angle > c.low_position_angle_deg {
                score += c.low_position_bonus;
            } else if y < c.high_position {
                score *= c.high_position_factor;
            }
        }

        score.clamp(0.0, 1.0)
    }

    /// Falling needs a confident score plus either downward motion or lost balance.
    pub fn is_falling(&self, score: f64, vertical_speed: f64, stability: f64) -> bool {
        let c = &self.config;
        score > c.falling_confidence
            && (vertical_speed > self.speed_threshold * c.falling_speed_fraction
                || stability < c.falling_max_stability)
    }
}
