//! Core data types for eye-tracking telemetry.
//!
//! - [`GazeSample`], [`EyeStateSample`] and [`EyelidSample`] are the three sample
//!   channels the device streams.
//! - [`FrameKind`] names the four wire variants, [`DecodedFrame`] is the canonical
//!   record the codec produces from any of them.
//! - [`Sample`] is the bound ring buffers need to average a channel.
//!
//! ```rust
//! use neon_link::types::{GazeSample, Vec2};
//!
//! let a = GazeSample::new(100.0, 200.0);
//! let b = GazeSample::new(300.0, 400.0);
//! let mean = (a + b) * 0.5;
//! assert_eq!(mean.point, Vec2::new(200.0, 300.0));
//! ```

mod frame;
mod samples;
mod update_rate;
mod vector;

pub use frame::{DecodedFrame, FrameKind};
pub use samples::{EyeState, EyeStateSample, Eyelid, EyelidSample, GazeSample, Sample};
pub use update_rate::UpdateRate;
pub use vector::{Vec2, Vec3};

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn frame_kind_round_trips_through_its_length() {
        for kind in [
            FrameKind::GazeOnly,
            FrameKind::GazeReserved,
            FrameKind::GazeEyeState,
            FrameKind::GazeEyeStateEyelid,
        ] {
            assert_eq!(FrameKind::from_len(kind.frame_len()), Some(kind));
            assert_eq!(FrameKind::from_u8(kind as u8), Some(kind));
        }
        assert_eq!(FrameKind::from_u8(0), None);
    }

    #[test]
    fn channel_availability_follows_kind() {
        assert!(!FrameKind::GazeOnly.has_eye_state());
        assert!(!FrameKind::GazeReserved.has_eye_state());
        assert!(FrameKind::GazeEyeState.has_eye_state());
        assert!(!FrameKind::GazeEyeState.has_eyelid());
        assert!(FrameKind::GazeEyeStateEyelid.has_eyelid());
    }

    #[test]
    fn eye_state_arithmetic_is_field_wise() {
        let eye = EyeState {
            pupil_diameter: 0.004,
            eyeball_center: Vec3::new(0.03, -0.01, -0.02),
            optical_axis: Vec3::new(0.0, 0.0, 0.001),
        };
        let sample = EyeStateSample { left: eye, right: eye * 2.0 };
        let doubled = sample + sample;

        assert_eq!(doubled.left, eye * 2.0);
        assert_eq!(doubled.right, eye * 4.0);
    }

    proptest! {
        #[test]
        fn unknown_lengths_are_never_classified(len in 0usize..512) {
            let known = [21usize, 29, 77, 101];
            prop_assert_eq!(FrameKind::from_len(len).is_some(), known.contains(&len));
        }
    }
}
