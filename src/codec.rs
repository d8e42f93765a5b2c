//! Binary telemetry frame codec
//!
//! Frames arrive as RTP-style packets inside WebSocket binary messages. A frame is
//! recognized only when its total length is one of the four [`FrameKind`] lengths and
//! the low 7 bits of byte 1 (the payload type) equal [`FRAME_TYPE_SENTINEL`]. Anything
//! else sharing the transport (control replies, RTCP, partial frames) is ignored.
//!
//! ## Layout
//!
//! All fields are big-endian `f32`, offsets from the start of the frame:
//!
//! | offset | count | content                                                  |
//! |--------|-------|----------------------------------------------------------|
//! | 12     | 2     | gaze x, gaze y (pixels)                                  |
//! | 21     | 14    | per eye: pupil diameter, eyeball center xyz, optical axis xyz |
//! | 77     | 6     | per eye: eyelid angle top, angle bottom, aperture        |
//!
//! Eye-state values and eyelid apertures are scaled by [`WIRE_SCALE`] (mm to m) and the
//! Y component of every 3D field is negated to convert to a Y-up frame.
//!
//! Decoding is pure: no allocation, no state, safe to call from any thread.

use crate::types::{
    DecodedFrame, EyeState, EyeStateSample, Eyelid, EyelidSample, FrameKind, GazeSample, Vec2,
    Vec3,
};

/// RTP payload type carried by telemetry frames
pub const FRAME_TYPE_SENTINEL: u8 = 99;

/// Scale applied to eye-state values and eyelid apertures
pub const WIRE_SCALE: f32 = 0.001;

const TYPE_TAG_OFFSET: usize = 1;
const TYPE_TAG_MASK: u8 = 0x7f;
const GAZE_OFFSET: usize = 12;
const EYE_STATE_OFFSET: usize = 21;
const EYELID_OFFSET: usize = 77;
const F32_SIZE: usize = 4;

/// Classify a received message, `None` if it is not a telemetry frame.
pub fn classify(bytes: &[u8]) -> Option<FrameKind> {
    let kind = FrameKind::from_len(bytes.len())?;
    if bytes[TYPE_TAG_OFFSET] & TYPE_TAG_MASK != FRAME_TYPE_SENTINEL {
        return None;
    }
    Some(kind)
}

/// Decode a frame into caller-owned samples.
///
/// Only the channels carried by the frame are written; for an unrecognized message
/// nothing is written and `None` is returned.
pub fn decode_into(
    bytes: &[u8],
    gaze: &mut GazeSample,
    eye_state: &mut EyeStateSample,
    eyelid: &mut EyelidSample,
) -> Option<FrameKind> {
    let kind = classify(bytes)?;

    gaze.point = Vec2::new(read_f32(bytes, GAZE_OFFSET), read_f32(bytes, GAZE_OFFSET + F32_SIZE));

    if kind.has_eye_state() {
        eye_state.left = read_eye_state(bytes, EYE_STATE_OFFSET);
        eye_state.right = read_eye_state(bytes, EYE_STATE_OFFSET + 7 * F32_SIZE);
    }

    if kind.has_eyelid() {
        eyelid.left = read_eyelid(bytes, EYELID_OFFSET);
        eyelid.right = read_eyelid(bytes, EYELID_OFFSET + 3 * F32_SIZE);
    }

    Some(kind)
}

/// Decode a frame into one canonical record.
pub fn decode(bytes: &[u8]) -> Option<DecodedFrame> {
    let mut gaze = GazeSample::default();
    let mut eye_state = EyeStateSample::default();
    let mut eyelid = EyelidSample::default();

    let kind = decode_into(bytes, &mut gaze, &mut eye_state, &mut eyelid)?;

    Some(DecodedFrame {
        kind,
        gaze,
        eye_state: kind.has_eye_state().then_some(eye_state),
        eyelid: kind.has_eyelid().then_some(eyelid),
    })
}

// Callers guarantee `offset + 4 <= bytes.len()` via the length classification.
fn read_f32(bytes: &[u8], offset: usize) -> f32 {
    let mut raw = [0u8; F32_SIZE];
    raw.copy_from_slice(&bytes[offset..offset + F32_SIZE]);
    f32::from_be_bytes(raw)
}

fn read_scaled(bytes: &[u8], offset: usize) -> f32 {
    read_f32(bytes, offset) * WIRE_SCALE
}

fn read_vec3(bytes: &[u8], offset: usize) -> Vec3 {
    Vec3::new(
        read_scaled(bytes, offset),
        -read_scaled(bytes, offset + F32_SIZE),
        read_scaled(bytes, offset + 2 * F32_SIZE),
    )
}

fn read_eye_state(bytes: &[u8], offset: usize) -> EyeState {
    EyeState {
        pupil_diameter: read_scaled(bytes, offset),
        eyeball_center: read_vec3(bytes, offset + F32_SIZE),
        optical_axis: read_vec3(bytes, offset + 4 * F32_SIZE),
    }
}

fn read_eyelid(bytes: &[u8], offset: usize) -> Eyelid {
    Eyelid {
        angle_top: read_f32(bytes, offset),
        angle_bottom: read_f32(bytes, offset + F32_SIZE),
        aperture: read_scaled(bytes, offset + 2 * F32_SIZE),
    }
}
