// src/analysis/temporal_tracker.rs
//
// Rolling per-subject history and the rates derived from it.
//
// All rings share one sampling index: every call to `update` pushes exactly
// one entry into center/angle/timestamp/velocity/stability (and the shorter
// acceleration ring), so lookback by position stays aligned.

use crate::analysis::body_metrics::BodyMetrics;
use crate::detection::{KeypointIndex, PoseFrame};
use crate::types::{HistoryConfig, MetricConfig};
use serde::Serialize;
use std::collections::VecDeque;

/// Derived signals for the frame just ingested
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct TemporalSample {
    /// Frame heights per second, positive = moving down
    pub vertical_speed: f64,
    /// Change of vertical_speed per second
    pub acceleration: f64,
    /// 0 = losing balance, 1 = planted
    pub stability: f64,
}

pub struct TemporalTracker {
    history: HistoryConfig,
    metrics: MetricConfig,
    centers: VecDeque<Option<(f64, f64)>>,
    angles: VecDeque<Option<f64>>,
    timestamps: VecDeque<f64>,
    velocities: VecDeque<f64>,
    accelerations: VecDeque<f64>,
    stability: VecDeque<f64>,
}

fn push_bounded<T>(ring: &mut VecDeque<T>, value: T, cap: usize) {
    ring.push_back(value);
    while ring.len() > cap {
        ring.pop_front();
    }
}

impl TemporalTracker {
    pub fn new(history: HistoryConfig, metrics: MetricConfig) -> Self {
        let cap = history.size;
        Self {
            centers: VecDeque::with_capacity(cap + 1),
            angles: VecDeque::with_capacity(cap + 1),
            timestamps: VecDeque::with_capacity(cap + 1),
            velocities: VecDeque::with_capacity(cap + 1),
            accelerations: VecDeque::with_capacity(history.acceleration_size + 1),
            stability: VecDeque::with_capacity(cap + 1),
            history,
            metrics,
        }
    }

    /// Ingest one frame's metrics. `frame_height` normalizes the speed.
    pub fn update(
        &mut self,
        metrics: &BodyMetrics,
        pose: &PoseFrame,
        timestamp: f64,
        frame_height: f64,
    ) -> TemporalSample {
        let cap = self.history.size;
        let prev_speed = self.velocities.back().copied();
        let prev_time = self.timestamps.back().copied();

        push_bounded(&mut self.centers, metrics.center, cap);
        push_bounded(&mut self.angles, metrics.trunk_angle_deg, cap);
        push_bounded(&mut self.timestamps, timestamp, cap);

        let vertical_speed = self.vertical_speed(frame_height);

        let acceleration = match (prev_speed, prev_time) {
            (Some(prev), Some(t0)) if timestamp - t0 > 0.0 => (vertical_speed - prev) / (timestamp - t0),
            _ => 0.0,
        };

        push_bounded(&mut self.velocities, vertical_speed, cap);
        push_bounded(&mut self.accelerations, acceleration, self.history.acceleration_size);

        let stability = self.stability_score(pose);
        push_bounded(&mut self.stability, stability, cap);

        TemporalSample {
            vertical_speed,
            acceleration,
            stability,
        }
    }

    /// Mean dy/dt over the recent window, using only pairs where both
    /// centers are known.
    fn vertical_speed(&self, frame_height: f64) -> f64 {
        let n = self.centers.len();
        if n < 2 || frame_height <= 0.0 {
            return 0.0;
        }
        let start = n.saturating_sub(self.history.speed_window);

        let mut total_dy = 0.0;
        let mut total_dt = 0.0;
        for i in (start + 1)..n {
            if let (Some(prev), Some(cur)) = (self.centers[i - 1], self.centers[i]) {
                let dt = self.timestamps[i] - self.timestamps[i - 1];
                if dt > 0.0 {
                    total_dy += cur.1 - prev.1;
                    total_dt += dt;
                }
            }
        }

        if total_dt > 0.0 {
            (total_dy / total_dt) / frame_height
        } else {
            0.0
        }
    }

    fn stability_score(&self, pose: &PoseFrame) -> f64 {
        let mut stability = 1.0;

        // Base of support
        let la = pose.get(KeypointIndex::LeftAnkle);
        let ra = pose.get(KeypointIndex::RightAnkle);
        let min = self.metrics.ankle_min_confidence;
        if la.visible(min) && ra.visible(min) {
            let width = ((la.x - ra.x).powi(2) + (la.y - ra.y).powi(2)).sqrt();
            let base = (width / self.metrics.stance_reference_px).min(1.0);
            stability *= 0.3 + 0.7 * base;
        } else {
            stability *= 0.5;
        }

        // Horizontal sway
        let w = self.history.sway_window;
        if self.centers.len() >= w {
            let recent: Option<Vec<f64>> = self
                .centers
                .iter()
                .skip(self.centers.len() - w)
                .map(|c| c.map(|(x, _)| x))
                .collect();
            if let Some(xs) = recent {
                let mean = xs.iter().sum::<f64>() / xs.len() as f64;
                let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / xs.len() as f64;
                let sway = var.sqrt();
                stability *= (1.0 - sway / self.metrics.sway_reference_px).max(0.0);
            }
        }

        stability.clamp(0.0, 1.0)
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn last_speed(&self) -> Option<f64> {
        self.velocities.back().copied()
    }

    pub fn last_acceleration(&self) -> Option<f64> {
        self.accelerations.back().copied()
    }

    pub fn last_stability(&self) -> Option<f64> {
        self.stability.back().copied()
    }

    /// Clear every ring together
    pub fn reset(&mut self) {
        self.centers.clear();
        self.angles.clear();
        self.timestamps.clear();
        self.velocities.clear();
        self.accelerations.clear();
        self.stability.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::body_metrics::tests::standing_pose;

    fn tracker() -> TemporalTracker {
        TemporalTracker::new(HistoryConfig::default(), MetricConfig::default())
    }

    fn feed(t: &mut TemporalTracker, hip_y: f64, ts: f64) -> TemporalSample {
        let pose = standing_pose(320.0, hip_y);
        let m = BodyMetrics::extract(&pose, &MetricConfig::default());
        t.update(&m, &pose, ts, 480.0)
    }

    #[test]
    fn test_first_frame_has_no_speed() {
        let mut t = tracker();
        let s = feed(&mut t, 200.0, 0.0);
        assert_eq!(s.vertical_speed, 0.0);
        assert_eq!(s.acceleration, 0.0);
    }

    #[test]
    fn test_downward_speed_normalized_by_height() {
        let mut t = tracker();
        // 48px per 0.1s = 480px/s = 1 frame height per second
        for i in 0..5 {
            feed(&mut t, 100.0 + 48.0 * i as f64, i as f64 * 0.1);
        }
        let speed = t.last_speed().unwrap();
        assert!((speed - 1.0).abs() < 1e-9, "speed = {speed}");
    }

    #[test]
    fn test_upward_motion_is_negative() {
        let mut t = tracker();
        feed(&mut t, 300.0, 0.0);
        let s = feed(&mut t, 252.0, 0.1);
        assert!(s.vertical_speed < 0.0);
    }

    #[test]
    fn test_acceleration_from_consecutive_speeds() {
        let mut t = tracker();
        feed(&mut t, 100.0, 0.0);
        feed(&mut t, 100.0, 0.1);
        // Jump of 48px in 0.1s; window average over two intervals is 0.5 fh/s
        let s = feed(&mut t, 148.0, 0.2);
        assert!((s.vertical_speed - 0.5).abs() < 1e-9);
        assert!((s.acceleration - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_centers_skipped_in_speed() {
        let mut t = tracker();
        let blank = crate::detection::PoseFrame::new(
            [crate::detection::Landmark::default(); KeypointIndex::COUNT],
        );
        feed(&mut t, 100.0, 0.0);
        t.update(&BodyMetrics::default(), &blank, 0.1, 480.0);
        let s = feed(&mut t, 148.0, 0.2);
        // No adjacent pair with both centers known
        assert_eq!(s.vertical_speed, 0.0);
    }

    #[test]
    fn test_narrow_stance_less_stable_than_wide() {
        let mut narrow = *standing_pose(320.0, 200.0).landmarks();
        narrow[KeypointIndex::LeftAnkle as usize].x = 318.0;
        narrow[KeypointIndex::RightAnkle as usize].x = 322.0;
        let narrow = PoseFrame::new(narrow);

        let mut wide = *standing_pose(320.0, 200.0).landmarks();
        wide[KeypointIndex::LeftAnkle as usize].x = 200.0;
        wide[KeypointIndex::RightAnkle as usize].x = 440.0;
        let wide = PoseFrame::new(wide);

        let mut a = tracker();
        let mut b = tracker();
        let sa = a.update(&BodyMetrics::default(), &narrow, 0.0, 480.0).stability;
        let sb = b.update(&BodyMetrics::default(), &wide, 0.0, 480.0).stability;
        assert!(sa < sb);
        assert!((sb - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_hidden_ankles_halve_stability() {
        let mut lms = *standing_pose(320.0, 200.0).landmarks();
        lms[KeypointIndex::LeftAnkle as usize].confidence = 0.2;
        let pose = PoseFrame::new(lms);
        let mut t = tracker();
        let s = t.update(&BodyMetrics::default(), &pose, 0.0, 480.0);
        assert!((s.stability - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_sway_reduces_stability() {
        let mut steady = tracker();
        let mut swaying = tracker();
        let mut s_steady = 0.0;
        let mut s_sway = 0.0;
        for i in 0..5 {
            let ts = i as f64 * 0.033;
            let p = standing_pose(320.0, 200.0);
            let m = BodyMetrics::extract(&p, &MetricConfig::default());
            s_steady = steady.update(&m, &p, ts, 480.0).stability;

            let x = if i % 2 == 0 { 290.0 } else { 350.0 };
            let p = standing_pose(x, 200.0);
            let m = BodyMetrics::extract(&p, &MetricConfig::default());
            s_sway = swaying.update(&m, &p, ts, 480.0).stability;
        }
        assert!(s_sway < s_steady);
    }

    #[test]
    fn test_rings_bounded_and_aligned() {
        let mut t = tracker();
        for i in 0..100 {
            feed(&mut t, 200.0, i as f64 * 0.033);
        }
        assert_eq!(t.len(), 30);
        assert_eq!(t.centers.len(), t.velocities.len());
        assert_eq!(t.angles.len(), t.stability.len());
        assert_eq!(t.accelerations.len(), 10);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut t = tracker();
        for i in 0..10 {
            feed(&mut t, 200.0 + i as f64, i as f64 * 0.033);
        }
        t.reset();
        assert!(t.is_empty());
        assert_eq!(t.last_speed(), None);
        assert_eq!(t.last_acceleration(), None);
        assert_eq!(t.last_stability(), None);
    }
}
