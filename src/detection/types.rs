// src/detection/types.rs
//
// Input and output types of the engine. Landmark layout is the COCO
// 17-point order produced by YOLOv8-pose style estimators (layout v1).

use crate::error::DetectError;
use base64::Engine;
use serde::{Serialize, Serializer};

/// COCO keypoint indices, layout version 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum KeypointIndex {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl KeypointIndex {
    pub const COUNT: usize = 17;
    pub const LAYOUT_VERSION: u32 = 1;
}

/// One body landmark in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, serde::Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    pub confidence: f32,
}

impl Landmark {
    pub fn new(x: f64, y: f64, confidence: f32) -> Self {
        Self { x, y, confidence }
    }

    /// Strictly above the threshold
    #[inline]
    pub fn visible(&self, min_confidence: f32) -> bool {
        self.confidence > min_confidence
    }
}

/// The 17 landmarks of one detected person in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseFrame {
    landmarks: [Landmark; KeypointIndex::COUNT],
}

impl PoseFrame {
    pub fn new(landmarks: [Landmark; KeypointIndex::COUNT]) -> Self {
        Self { landmarks }
    }

    /// Build from an estimator output, rejecting anything that is not a
    /// well-formed 17-point pose.
    pub fn from_landmarks(landmarks: &[Landmark]) -> Result<Self, DetectError> {
        let landmarks: [Landmark; KeypointIndex::COUNT] = landmarks.try_into().map_err(|_| {
            DetectError::input(format!(
                "expected {} landmarks, got {}",
                KeypointIndex::COUNT,
                landmarks.len()
            ))
        })?;
        let pose = Self { landmarks };
        pose.validate()?;
        Ok(pose)
    }

    pub fn validate(&self) -> Result<(), DetectError> {
        for (i, lm) in self.landmarks.iter().enumerate() {
            if !lm.x.is_finite() || !lm.y.is_finite() {
                return Err(DetectError::input(format!(
                    "landmark {i} has non-finite coordinates ({}, {})",
                    lm.x, lm.y
                )));
            }
            if !(0.0..=1.0).contains(&lm.confidence) {
                return Err(DetectError::input(format!(
                    "landmark {i} confidence {} outside [0, 1]",
                    lm.confidence
                )));
            }
        }
        Ok(())
    }

    #[inline]
    pub fn get(&self, index: KeypointIndex) -> &Landmark {
        &self.landmarks[index as usize]
    }

    pub fn landmarks(&self) -> &[Landmark; KeypointIndex::COUNT] {
        &self.landmarks
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PostureState {
    Standing,
    Sitting,
    Lying,
    Falling,
    Unknown,
}

impl PostureState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostureState::Standing => "standing",
            PostureState::Sitting => "sitting",
            PostureState::Lying => "lying",
            PostureState::Falling => "falling",
            PostureState::Unknown => "unknown",
        }
    }

    /// Upright postures re-arm the fall detector
    pub fn is_upright(&self) -> bool {
        matches!(self, PostureState::Standing | PostureState::Sitting)
    }
}

/// Which path produced a fall alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallSource {
    /// Falling posture asserted by the confidence gate
    Pose,
    /// Direct Falling -> Lying transition
    PoseTransition,
    /// Frame-differencing spike
    Motion,
    /// Subject vanished while falling
    Disappearance,
}

impl FallSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallSource::Pose => "pose",
            FallSource::PoseTransition => "pose_transition",
            FallSource::Motion => "motion",
            FallSource::Disappearance => "disappearance",
        }
    }
}

fn serialize_snapshot<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
    match bytes {
        Some(b) => s.serialize_some(&base64::engine::general_purpose::STANDARD.encode(b)),
        None => s.serialize_none(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FallEvent {
    pub timestamp: f64,
    pub confidence: f64,
    pub location: (i32, i32),
    pub previous_state: PostureState,
    /// Seconds since the fall started (0 when no start was observed)
    pub duration: f64,
    pub source: FallSource,
    /// JPEG of the frame at emission, base64 in JSON
    #[serde(serialize_with = "serialize_snapshot")]
    pub frame_snapshot: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LyingEvent {
    pub timestamp: f64,
    pub confidence: f64,
    pub location: (i32, i32),
    pub previous_state: PostureState,
    /// Seconds spent continuously lying
    pub duration: f64,
    #[serde(serialize_with = "serialize_snapshot")]
    pub frame_snapshot: Option<Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_landmarks_rejects_wrong_count() {
        let lms = vec![Landmark::new(0.0, 0.0, 0.9); 16];
        let err = PoseFrame::from_landmarks(&lms).unwrap_err();
        assert!(matches!(err, DetectError::InvalidInput { .. }));
    }

    #[test]
    fn test_from_landmarks_rejects_nan() {
        let mut lms = vec![Landmark::new(10.0, 10.0, 0.9); KeypointIndex::COUNT];
        lms[KeypointIndex::LeftHip as usize].y = f64::NAN;
        assert!(PoseFrame::from_landmarks(&lms).is_err());
    }

    #[test]
    fn test_from_landmarks_rejects_bad_confidence() {
        let mut lms = vec![Landmark::new(10.0, 10.0, 0.9); KeypointIndex::COUNT];
        lms[0].confidence = 1.2;
        assert!(PoseFrame::from_landmarks(&lms).is_err());
    }

    #[test]
    fn test_get_by_index() {
        let mut lms = vec![Landmark::default(); KeypointIndex::COUNT];
        lms[KeypointIndex::RightAnkle as usize] = Landmark::new(12.0, 340.0, 0.8);
        let pose = PoseFrame::from_landmarks(&lms).unwrap();
        let ankle = pose.get(KeypointIndex::RightAnkle);
        assert_eq!(ankle.x, 12.0);
        assert_eq!(ankle.y, 340.0);
    }

    #[test]
    fn test_visible_is_strict() {
        let lm = Landmark::new(0.0, 0.0, 0.5);
        assert!(!lm.visible(0.5));
        assert!(lm.visible(0.4));
    }

    #[test]
    fn test_event_snapshot_serializes_as_base64() {
        let event = LyingEvent {
            timestamp: 12.0,
            confidence: 0.85,
            location: (320, 400),
            previous_state: PostureState::Lying,
            duration: 3.2,
            frame_snapshot: Some(vec![0xff, 0xd8, 0xff]),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["frame_snapshot"], "/9j/");
        assert_eq!(json["previous_state"], "lying");
        assert_eq!(json["location"][0], 320);
    }

    #[test]
    fn test_source_label_matches_json() {
        for source in [
            FallSource::Pose,
            FallSource::PoseTransition,
            FallSource::Motion,
            FallSource::Disappearance,
        ] {
            assert_eq!(serde_json::to_value(source).unwrap(), source.as_str());
        }
    }
}
