//! Telemetry frame variants

use super::{EyeStateSample, EyelidSample, GazeSample};

/// Frame variant, selected purely by total message length.
///
/// The device firmware carries no schema or version field, so a frame of coincidentally
/// matching length with different semantics would be misread. The four lengths are kept
/// for wire compatibility; do not guess other framings without checking the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    /// Gaze point only
    GazeOnly = 1,
    /// Gaze point followed by a block this link does not interpret
    GazeReserved = 2,
    /// Gaze point and per-eye state
    GazeEyeState = 3,
    /// Gaze point, per-eye state and eyelids
    GazeEyeStateEyelid = 4,
}

impl FrameKind {
    /// Total frame length of each variant, header included
    pub const fn frame_len(self) -> usize {
        match self {
            FrameKind::GazeOnly => 21,
            FrameKind::GazeReserved => 29,
            FrameKind::GazeEyeState => 77,
            FrameKind::GazeEyeStateEyelid => 101,
        }
    }

    /// Classify a message by its length
    pub const fn from_len(len: usize) -> Option<Self> {
        match len {
            21 => Some(FrameKind::GazeOnly),
            29 => Some(FrameKind::GazeReserved),
            77 => Some(FrameKind::GazeEyeState),
            101 => Some(FrameKind::GazeEyeStateEyelid),
            _ => None,
        }
    }

    pub const fn has_eye_state(self) -> bool {
        matches!(self, FrameKind::GazeEyeState | FrameKind::GazeEyeStateEyelid)
    }

    pub const fn has_eyelid(self) -> bool {
        matches!(self, FrameKind::GazeEyeStateEyelid)
    }

    pub(crate) const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(FrameKind::GazeOnly),
            2 => Some(FrameKind::GazeReserved),
            3 => Some(FrameKind::GazeEyeState),
            4 => Some(FrameKind::GazeEyeStateEyelid),
            _ => None,
        }
    }
}

/// One decoded telemetry frame
///
/// Sub-records are present exactly when the frame kind carries them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedFrame {
    pub kind: FrameKind,
    pub gaze: GazeSample,
    pub eye_state: Option<EyeStateSample>,
    pub eyelid: Option<EyelidSample>,
}
