// src/analysis/motion_signal.rs
//
// Frame-differencing motion signal, independent of pose detection.
//
// Each frame is converted to grayscale, box-blurred and compared against the
// previous blurred frame. The fraction of pixels whose intensity changed is
// measured over the whole frame and over the lower half (falls end near the
// floor), and the weighted mix is the motion magnitude in [0, 1].
//
// A fall shows up as a sudden *spike* in that magnitude. Walking produces
// sustained, elevated motion instead, which the spike test ignores.
//
// No OpenCV: plain row-major u8 buffers.

use crate::types::MotionConfig;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, warn};

// ============================================================================
// GRAYSCALE FRAME
// ============================================================================

/// Luma plane the motion signal diffs against. One byte per pixel, rows
/// packed top to bottom.
#[derive(Clone, Debug)]
pub struct GrayFrame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl GrayFrame {
    pub fn new(data: Vec<u8>, width: usize, height: usize) -> Self {
        Self {
            data,
            width,
            height,
        }
    }

    /// Luma of a camera raster, BT.601 weights.
    pub fn from_rgb(rgb: &[u8], width: usize, height: usize) -> Self {
        let luma = rgb
            .chunks_exact(3)
            .map(|px| {
                let [r, g, b] = [px[0], px[1], px[2]].map(f32::from);
                (0.299 * r + 0.587 * g + 0.114 * b) as u8
            })
            .collect();
        Self::new(luma, width, height)
    }

    /// Separable box blur with edge clamping. radius 0 returns a copy.
    pub fn box_blur(&self, radius: usize) -> GrayFrame {
        if radius == 0 || self.width == 0 || self.height == 0 {
            return self.clone();
        }
        let (w, h) = (self.width, self.height);
        let window = (2 * radius + 1) as u32;
        let r = radius as isize;

        let mut horizontal = vec![0u8; w * h];
        for y in 0..h {
            let row = &self.data[y * w..(y + 1) * w];
            for x in 0..w {
                let mut sum = 0u32;
                for k in -r..=r {
                    let sx = (x as isize + k).clamp(0, w as isize - 1) as usize;
                    sum += row[sx] as u32;
                }
                horizontal[y * w + x] = (sum / window) as u8;
            }
        }

        let mut out = vec![0u8; w * h];
        for y in 0..h {
            for x in 0..w {
                let mut sum = 0u32;
                for k in -r..=r {
                    let sy = (y as isize + k).clamp(0, h as isize - 1) as usize;
                    sum += horizontal[sy * w + x] as u32;
                }
                out[y * w + x] = (sum / window) as u8;
            }
        }

        GrayFrame::new(out, w, h)
    }
}

// ============================================================================
// SIGNAL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MotionSample {
    pub magnitude: f64,
    /// Magnitude of the previous sample, if any
    pub previous: Option<f64>,
    pub is_spike: bool,
}

pub struct MotionFallbackSignal {
    config: MotionConfig,
    prev_frame: Option<GrayFrame>,
    history: VecDeque<f64>,
}

impl MotionFallbackSignal {
    pub fn new(config: MotionConfig) -> Self {
        Self {
            prev_frame: None,
            history: VecDeque::with_capacity(config.history_size + 1),
            config,
        }
    }

    /// Measure motion against the previous frame and classify the pattern.
    /// The first frame (or a resolution change) yields magnitude 0.
    pub fn observe(&mut self, frame: &GrayFrame) -> MotionSample {
        let blurred = frame.box_blur(self.config.blur_radius);

        let magnitude = match &self.prev_frame {
            Some(prev) if prev.width == blurred.width && prev.height == blurred.height => {
                self.magnitude(prev, &blurred)
            }
            _ => 0.0,
        };
        self.prev_frame = Some(blurred);

        let previous = self.history.back().copied();
        self.history.push_back(magnitude);
        while self.history.len() > self.config.history_size {
            self.history.pop_front();
        }

        let is_spike = previous
            .map(|prev| self.is_fall_spike(magnitude, prev))
            .unwrap_or(false);

        debug!(
            "Motion: {:.3} (thresh: {:.3}) spike={}",
            magnitude, self.config.threshold, is_spike
        );

        MotionSample {
            magnitude,
            previous,
            is_spike,
        }
    }

    fn magnitude(&self, prev: &GrayFrame, cur: &GrayFrame) -> f64 {
        let total = cur.data.len();
        if total == 0 {
            return 0.0;
        }
        let lower_start = (cur.height / 2) * cur.width;
        let t = self.config.diff_threshold;

        let mut changed = 0usize;
        let mut lower_changed = 0usize;
        for (i, (&a, &b)) in prev.data.iter().zip(cur.data.iter()).enumerate() {
            if a.abs_diff(b) > t {
                changed += 1;
                if i >= lower_start {
                    lower_changed += 1;
                }
            }
        }

        let overall = changed as f64 / total as f64;
        let lower_total = total - lower_start;
        let lower = if lower_total > 0 {
            lower_changed as f64 / lower_total as f64
        } else {
            0.0
        };

        let w = self.config.lower_half_weight;
        (overall * (1.0 - w) + lower * w).min(1.0)
    }

    /// Sudden rise, a very large single sample, or a jump out of quiet.
    pub fn is_fall_spike(&self, magnitude: f64, previous: f64) -> bool {
        let th = self.config.threshold;
        let change = magnitude - previous;

        if change > th * self.config.spike_change_factor {
            warn!("💥 Sudden motion spike: change={:.3}", change);
            return true;
        }
        if magnitude > th * self.config.spike_peak_factor {
            warn!("🔴 Very high motion spike: {:.3}", magnitude);
            return true;
        }
        if magnitude > th * self.config.spike_rise_factor && previous < th * self.config.quiet_factor {
            warn!("⚡ Motion spike from quiet: {:.3} → {:.3}", previous, magnitude);
            return true;
        }
        false
    }

    pub fn last_magnitude(&self) -> Option<f64> {
        self.history.back().copied()
    }

    pub fn reset(&mut self) {
        self.prev_frame = None;
        self.history.clear();
    }
}
