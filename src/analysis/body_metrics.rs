// src/analysis/body_metrics.rs
//
// Per-frame scalar measurements derived from one pose. Pure functions of
// the landmarks; every metric is None when its landmarks are not confident
// enough, and callers treat None as "no information", never as zero.

use crate::detection::{KeypointIndex, Landmark, PoseFrame};
use crate::types::MetricConfig;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BodyMetrics {
    /// Hip midpoint (px)
    pub center: Option<(f64, f64)>,
    /// Shoulder-center -> hip-center angle from vertical, 0 = upright, 90 = horizontal
    pub trunk_angle_deg: Option<f64>,
    /// Width / height of the box around visible landmarks
    pub bbox_ratio: Option<f64>,
    /// hip_y - head_y (px); positive when the head is above the hips
    pub head_hip_diff: Option<f64>,
    /// Mean hip -> ankle angle from vertical
    pub leg_angle_deg: Option<f64>,
}

impl BodyMetrics {
    pub fn extract(pose: &PoseFrame, cfg: &MetricConfig) -> Self {
        Self {
            center: body_center(pose, cfg),
            trunk_angle_deg: trunk_angle(pose, cfg),
            bbox_ratio: bbox_ratio(pose, cfg),
            head_hip_diff: head_hip_diff(pose, cfg),
            leg_angle_deg: leg_angle(pose, cfg),
        }
    }
}

fn midpoint(a: &Landmark, b: &Landmark) -> (f64, f64) {
    ((a.x + b.x) / 2.0, (a.y + b.y) / 2.0)
}

/// Angle in degrees between (dx, dy) and the reference direction (rx, ry),
/// both in image coordinates (y grows downward).
fn angle_from(dx: f64, dy: f64, rx: f64, ry: f64) -> Option<f64> {
    let mag = (dx * dx + dy * dy).sqrt();
    if mag <= 0.0 {
        return None;
    }
    let ref_mag = (rx * rx + ry * ry).sqrt();
    let cos = ((dx * rx + dy * ry) / (mag * ref_mag)).clamp(-1.0, 1.0);
    Some(cos.acos().to_degrees())
}

pub fn body_center(pose: &PoseFrame, cfg: &MetricConfig) -> Option<(f64, f64)> {
    let left = pose.get(KeypointIndex::LeftHip);
    let right = pose.get(KeypointIndex::RightHip);
    if left.visible(cfg.center_min_confidence) && right.visible(cfg.center_min_confidence) {
        Some(midpoint(left, right))
    } else {
        None
    }
}

pub fn trunk_angle(pose: &PoseFrame, cfg: &MetricConfig) -> Option<f64> {
    let ls = pose.get(KeypointIndex::LeftShoulder);
    let rs = pose.get(KeypointIndex::RightShoulder);
    let lh = pose.get(KeypointIndex::LeftHip);
    let rh = pose.get(KeypointIndex::RightHip);

    let min = cfg.trunk_min_confidence;
    if !(ls.visible(min) && rs.visible(min) && lh.visible(min) && rh.visible(min)) {
        return None;
    }

    let shoulder = midpoint(ls, rs);
    let hip = midpoint(lh, rh);

    // Hip -> shoulder against "up"
    angle_from(shoulder.0 - hip.0, shoulder.1 - hip.1, 0.0, -1.0)
}

pub fn bbox_ratio(pose: &PoseFrame, cfg: &MetricConfig) -> Option<f64> {
    let mut visible = pose
        .landmarks()
        .iter()
        .filter(|lm| lm.visible(cfg.bbox_min_confidence))
        .peekable();

    let first = visible.peek().copied()?;
    let (mut x_min, mut y_min, mut x_max, mut y_max) = (first.x, first.y, first.x, first.y);
    let mut count = 0usize;

    for lm in visible {
        x_min = x_min.min(lm.x);
        x_max = x_max.max(lm.x);
        y_min = y_min.min(lm.y);
        y_max = y_max.max(lm.y);
        count += 1;
    }

    if count < cfg.bbox_min_visible {
        return None;
    }

    let height = y_max - y_min;
    if height < cfg.bbox_min_height_px {
        return None;
    }

    Some((x_max - x_min) / height)
}

pub fn head_hip_diff(pose: &PoseFrame, cfg: &MetricConfig) -> Option<f64> {
    let min = cfg.head_min_confidence;

    let nose = pose.get(KeypointIndex::Nose);
    let le = pose.get(KeypointIndex::LeftEye);
    let re = pose.get(KeypointIndex::RightEye);

    let head_y = if nose.visible(min) {
        nose.y
    } else if le.visible(min) && re.visible(min) {
        (le.y + re.y) / 2.0
    } else {
        return None;
    };

    let lh = pose.get(KeypointIndex::LeftHip);
    let rh = pose.get(KeypointIndex::RightHip);
    if !(lh.visible(min) && rh.visible(min)) {
        return None;
    }
    let hip_y = (lh.y + rh.y) / 2.0;

    Some(hip_y - head_y)
}

pub fn leg_angle(pose: &PoseFrame, cfg: &MetricConfig) -> Option<f64> {
    let legs = [
        (KeypointIndex::LeftHip, KeypointIndex::LeftAnkle),
        (KeypointIndex::RightHip, KeypointIndex::RightAnkle),
    ];

    let angles: Vec<f64> = legs
        .iter()
        .filter_map(|&(hip, ankle)| {
            let hip = pose.get(hip);
            let ankle = pose.get(ankle);
            if !(hip.visible(cfg.leg_min_confidence) && ankle.visible(cfg.leg_min_confidence)) {
                return None;
            }
            let (dx, dy) = (ankle.x - hip.x, ankle.y - hip.y);
            if (dx * dx + dy * dy).sqrt() <= cfg.leg_min_length_px {
                return None;
            }
            // Hip -> ankle against "down"
            angle_from(dx, dy, 0.0, 1.0)
        })
        .collect();

    if angles.is_empty() {
        None
    } else {
        Some(angles.iter().sum::<f64>() / angles.len() as f64)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Upright person, hips at (cx, hip_y), 160px trunk, 200px legs.
    pub(crate) fn standing_pose(cx: f64, hip_y: f64) -> PoseFrame {
        let mut lms = [Landmark::new(0.0, 0.0, 0.0); KeypointIndex::COUNT];
        let set = |lms: &mut [Landmark; KeypointIndex::COUNT], i: KeypointIndex, x: f64, y: f64| {
            lms[i as usize] = Landmark::new(x, y, 0.9);
        };
        set(&mut lms, KeypointIndex::Nose, cx, hip_y - 220.0);
        set(&mut lms, KeypointIndex::LeftEye, cx - 8.0, hip_y - 228.0);
        set(&mut lms, KeypointIndex::RightEye, cx + 8.0, hip_y - 228.0);
        set(&mut lms, KeypointIndex::LeftShoulder, cx - 30.0, hip_y - 160.0);
        set(&mut lms, KeypointIndex::RightShoulder, cx + 30.0, hip_y - 160.0);
        set(&mut lms, KeypointIndex::LeftHip, cx - 20.0, hip_y);
        set(&mut lms, KeypointIndex::RightHip, cx + 20.0, hip_y);
        set(&mut lms, KeypointIndex::LeftKnee, cx - 22.0, hip_y + 100.0);
        set(&mut lms, KeypointIndex::RightKnee, cx + 22.0, hip_y + 100.0);
        set(&mut lms, KeypointIndex::LeftAnkle, cx - 25.0, hip_y + 200.0);
        set(&mut lms, KeypointIndex::RightAnkle, cx + 25.0, hip_y + 200.0);
        PoseFrame::new(lms)
    }

    /// Person lying horizontally, head to the left, body axis at `y`.
    pub(crate) fn lying_pose(cx: f64, y: f64) -> PoseFrame {
        let mut lms = [Landmark::new(0.0, 0.0, 0.0); KeypointIndex::COUNT];
        let set = |lms: &mut [Landmark; KeypointIndex::COUNT], i: KeypointIndex, x: f64, y: f64| {
            lms[i as usize] = Landmark::new(x, y, 0.9);
        };
        set(&mut lms, KeypointIndex::Nose, cx - 220.0, y - 5.0);
        set(&mut lms, KeypointIndex::LeftShoulder, cx - 160.0, y - 15.0);
        set(&mut lms, KeypointIndex::RightShoulder, cx - 160.0, y + 15.0);
        set(&mut lms, KeypointIndex::LeftHip, cx, y - 12.0);
        set(&mut lms, KeypointIndex::RightHip, cx, y + 12.0);
        set(&mut lms, KeypointIndex::LeftKnee, cx + 100.0, y - 10.0);
        set(&mut lms, KeypointIndex::RightKnee, cx + 100.0, y + 10.0);
        set(&mut lms, KeypointIndex::LeftAnkle, cx + 200.0, y - 10.0);
        set(&mut lms, KeypointIndex::RightAnkle, cx + 200.0, y + 10.0);
        PoseFrame::new(lms)
    }

    #[test]
    fn test_standing_metrics() {
        let pose = standing_pose(320.0, 250.0);
        let m = BodyMetrics::extract(&pose, &MetricConfig::default());

        assert_eq!(m.center, Some((320.0, 250.0)));
        assert!(m.trunk_angle_deg.unwrap() < 1.0);
        assert!(m.bbox_ratio.unwrap() < 0.6);
        assert!((m.head_hip_diff.unwrap() - 220.0).abs() < 1e-9);
        assert!(m.leg_angle_deg.unwrap() < 10.0);
    }

    #[test]
    fn test_lying_metrics() {
        let pose = lying_pose(320.0, 400.0);
        let m = BodyMetrics::extract(&pose, &MetricConfig::default());

        assert!(m.trunk_angle_deg.unwrap() > 85.0);
        assert!(m.bbox_ratio.unwrap() > 1.5);
        assert!(m.head_hip_diff.unwrap().abs() < 20.0);
        assert!(m.leg_angle_deg.unwrap() > 80.0);
    }

    #[test]
    fn test_low_confidence_hips_give_no_center() {
        let mut lms = *standing_pose(320.0, 250.0).landmarks();
        lms[KeypointIndex::LeftHip as usize].confidence = 0.5;
        let pose = PoseFrame::new(lms);
        let m = BodyMetrics::extract(&pose, &MetricConfig::default());

        assert_eq!(m.center, None);
        assert_eq!(m.trunk_angle_deg, None);
        assert_eq!(m.head_hip_diff, None);
        // Leg metric has a looser minimum and survives
        assert!(m.leg_angle_deg.is_some());
    }

    #[test]
    fn test_head_falls_back_to_eyes() {
        let mut lms = *standing_pose(320.0, 250.0).landmarks();
        lms[KeypointIndex::Nose as usize].confidence = 0.1;
        let pose = PoseFrame::new(lms);
        let diff = head_hip_diff(&pose, &MetricConfig::default()).unwrap();
        assert!((diff - 228.0).abs() < 1e-9);
    }

    #[test]
    fn test_bbox_needs_enough_points_and_height() {
        let mut lms = [Landmark::default(); KeypointIndex::COUNT];
        for i in 0..3 {
            lms[i] = Landmark::new(i as f64 * 50.0, i as f64 * 50.0, 0.9);
        }
        assert_eq!(bbox_ratio(&PoseFrame::new(lms), &MetricConfig::default()), None);

        // Four points on a flat line: height < 10px
        let mut flat = [Landmark::default(); KeypointIndex::COUNT];
        for i in 0..4 {
            flat[i] = Landmark::new(i as f64 * 50.0, 100.0 + i as f64, 0.9);
        }
        assert_eq!(bbox_ratio(&PoseFrame::new(flat), &MetricConfig::default()), None);
    }

    #[test]
    fn test_short_legs_ignored() {
        let mut lms = *standing_pose(320.0, 250.0).landmarks();
        lms[KeypointIndex::LeftAnkle as usize] = Landmark::new(301.0, 255.0, 0.9);
        lms[KeypointIndex::RightAnkle as usize] = Landmark::new(339.0, 255.0, 0.9);
        assert_eq!(leg_angle(&PoseFrame::new(lms), &MetricConfig::default()), None);
    }

    #[test]
    fn test_all_zero_confidence_is_uninformative() {
        let pose = PoseFrame::new([Landmark::default(); KeypointIndex::COUNT]);
        assert_eq!(BodyMetrics::extract(&pose, &MetricConfig::default()), BodyMetrics::default());
    }
}
