// src/analysis/posture_classifier.rs
//
// Static posture from banded votes. Falling is never produced here; it is a
// transition gated by the fall confidence score.

use crate::analysis::body_metrics::BodyMetrics;
use crate::detection::PostureState;
use crate::types::VotingConfig;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PostureVotes {
    pub lying: u32,
    pub sitting: u32,
    pub standing: u32,
}

impl PostureVotes {
    fn add(&mut self, lying: u32, sitting: u32, standing: u32) {
        self.lying += lying;
        self.sitting += sitting;
        self.standing += standing;
    }

    /// Strict plurality wins; any tie falls back to Standing.
    pub fn winner(&self) -> PostureState {
        if self.lying > self.sitting && self.lying > self.standing {
            PostureState::Lying
        } else if self.sitting > self.lying && self.sitting > self.standing {
            PostureState::Sitting
        } else {
            PostureState::Standing
        }
    }
}

pub struct PostureClassifier {
    config: VotingConfig,
}

impl PostureClassifier {
    pub fn new(config: VotingConfig) -> Self {
        Self { config }
    }

    /// Classify one frame. Without a trunk angle there is nothing to anchor
    /// the vote and the result is Unknown.
    pub fn classify(&self, metrics: &BodyMetrics, normalized_y: Option<f64>) -> PostureState {
        let Some(votes) = self.tally(metrics, normalized_y) else {
            return PostureState::Unknown;
        };
        let state = votes.winner();
        debug!(
            "Posture votes L:{} Si:{} St:{} -> {} | angle={:?} bbox={:?} head_hip={:?} leg={:?}",
            votes.lying,
            votes.sitting,
            votes.standing,
            state.as_str(),
            metrics.trunk_angle_deg,
            metrics.bbox_ratio,
            metrics.head_hip_diff,
            metrics.leg_angle_deg
        );
        state
    }

    pub fn tally(&self, metrics: &BodyMetrics, normalized_y: Option<f64>) -> Option<PostureVotes> {
        let c = &self.config;
        let angle = metrics.trunk_angle_deg?;
        let mut votes = PostureVotes::default();

        if angle > c.trunk_lying_deg {
            votes.add(3, 0, 0);
        } else if angle > c.trunk_mixed_deg {
            votes.add(1, 2, 0);
        } else if angle > c.trunk_sitting_deg {
            votes.add(0, 3, 0);
        } else {
            votes.add(0, 0, 3);
        }

        if let Some(ratio) = metrics.bbox_ratio {
            if ratio > c.bbox_lying_ratio {
                votes.add(3, 0, 0);
            } else if ratio > c.bbox_mixed_ratio {
                votes.add(2, 1, 0);
            } else if ratio > c.bbox_sitting_ratio {
                votes.add(0, 2, 0);
            } else {
                votes.add(0, 0, 2);
            }
        }

        // Head near hip level reads as lying
        if let Some(diff) = metrics.head_hip_diff {
            if diff < c.head_hip_lying_px {
                votes.add(3, 0, 0);
            } else if diff < c.head_hip_mixed_px {
                votes.add(1, 1, 0);
            } else if diff < c.head_hip_sitting_px {
                votes.add(0, 2, 0);
            } else {
                votes.add(0, 0, 2);
            }
        }

        if let Some(leg) = metrics.leg_angle_deg {
            if leg > c.leg_lying_deg {
                votes.add(2, 0, 0);
            } else if leg > c.leg_mixed_deg {
                votes.add(1, 2, 0);
            } else if leg > c.leg_sitting_deg {
                votes.add(0, 2, 0);
            } else {
                votes.add(0, 0, 2);
            }
        }

        if let Some(y) = normalized_y {
            if y > c.position_lying {
                votes.add(2, 0, 0);
            } else if y > c.position_mixed {
                votes.add(1, 1, 0);
            }
        }

        Some(votes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> PostureClassifier {
        PostureClassifier::new(VotingConfig::default())
    }

    fn metrics(angle: f64, bbox: f64, head_hip: f64, leg: f64) -> BodyMetrics {
        BodyMetrics {
            center: Some((320.0, 240.0)),
            trunk_angle_deg: Some(angle),
            bbox_ratio: Some(bbox),
            head_hip_diff: Some(head_hip),
            leg_angle_deg: Some(leg),
        }
    }

    #[test]
    fn test_no_angle_is_unknown() {
        let m = BodyMetrics {
            bbox_ratio: Some(2.0),
            ..Default::default()
        };
        assert_eq!(classifier().classify(&m, Some(0.9)), PostureState::Unknown);
    }

    #[test]
    fn test_upright() {
        let m = metrics(5.0, 0.4, 220.0, 3.0);
        assert_eq!(classifier().classify(&m, Some(0.5)), PostureState::Standing);
    }

    #[test]
    fn test_horizontal() {
        let m = metrics(88.0, 2.2, 5.0, 85.0);
        assert_eq!(classifier().classify(&m, Some(0.8)), PostureState::Lying);
    }

    #[test]
    fn test_seated() {
        // Trunk leaning, compact box, head well above hips, thighs forward
        let m = metrics(35.0, 0.8, 80.0, 50.0);
        let votes = classifier().tally(&m, Some(0.65)).unwrap();
        assert_eq!(
            votes,
            PostureVotes {
                lying: 2,
                sitting: 10,
                standing: 0
            }
        );
        assert_eq!(votes.winner(), PostureState::Sitting);
    }

    #[test]
    fn test_angle_only() {
        let m = BodyMetrics {
            trunk_angle_deg: Some(75.0),
            ..Default::default()
        };
        assert_eq!(classifier().classify(&m, None), PostureState::Lying);
    }

    #[test]
    fn test_ties_default_to_standing() {
        // 3 standing from the trunk vs 3 lying from head-hip
        let m = BodyMetrics {
            trunk_angle_deg: Some(10.0),
            head_hip_diff: Some(5.0),
            ..Default::default()
        };
        let votes = classifier().tally(&m, None).unwrap();
        assert_eq!(votes.lying, votes.standing);
        assert_eq!(classifier().classify(&m, None), PostureState::Standing);

        let votes = PostureVotes {
            lying: 4,
            sitting: 4,
            standing: 1,
        };
        assert_eq!(votes.winner(), PostureState::Standing);
    }

    #[test]
    fn test_band_edges_are_exclusive() {
        // Exactly 70 is not > 70: falls to the mixed band
        let m = BodyMetrics {
            trunk_angle_deg: Some(70.0),
            ..Default::default()
        };
        let votes = classifier().tally(&m, None).unwrap();
        assert_eq!((votes.lying, votes.sitting), (1, 2));
    }

    #[test]
    fn test_never_returns_falling() {
        for angle in [0.0, 40.0, 60.0, 80.0, 90.0] {
            let m = metrics(angle, 1.2, 30.0, 50.0);
            assert_ne!(classifier().classify(&m, Some(0.9)), PostureState::Falling);
        }
    }
}
