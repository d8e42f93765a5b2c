//! Per-channel telemetry samples
//!
//! Every sample type is `Copy + Default` and supports field-wise addition and scaling
//! so ring buffers can compute a field-wise mean without knowing the layout.

use std::ops::{Add, Mul};

use super::{Vec2, Vec3};

/// Types that can be stored in a [`RingBuffer`](crate::buffer::RingBuffer).
///
/// `Default` must be the all-zero value; unwritten slots contribute it to the mean.
pub trait Sample:
    Copy + Default + Add<Output = Self> + Mul<f32, Output = Self> + Send + 'static
{
}

impl<T> Sample for T where
    T: Copy + Default + Add<Output = T> + Mul<f32, Output = T> + Send + 'static
{
}

/// Gaze point in sensor image space.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GazeSample {
    pub point: Vec2,
}

impl GazeSample {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { point: Vec2::new(x, y) }
    }
}

impl Add for GazeSample {
    type Output = GazeSample;

    fn add(self, rhs: GazeSample) -> GazeSample {
        GazeSample { point: self.point + rhs.point }
    }
}

impl Mul<f32> for GazeSample {
    type Output = GazeSample;

    fn mul(self, rhs: f32) -> GazeSample {
        GazeSample { point: self.point * rhs }
    }
}

/// State of a single eye.
///
/// Lengths are in metres after decoding (the wire carries millimetres).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EyeState {
    pub pupil_diameter: f32,
    pub eyeball_center: Vec3,
    /// Unit-less direction, scaled by the same wire factor as the other fields
    pub optical_axis: Vec3,
}

impl Add for EyeState {
    type Output = EyeState;

    fn add(self, rhs: EyeState) -> EyeState {
        EyeState {
            pupil_diameter: self.pupil_diameter + rhs.pupil_diameter,
            eyeball_center: self.eyeball_center + rhs.eyeball_center,
            optical_axis: self.optical_axis + rhs.optical_axis,
        }
    }
}

impl Mul<f32> for EyeState {
    type Output = EyeState;

    fn mul(self, rhs: f32) -> EyeState {
        EyeState {
            pupil_diameter: self.pupil_diameter * rhs,
            eyeball_center: self.eyeball_center * rhs,
            optical_axis: self.optical_axis * rhs,
        }
    }
}

/// Eye state for both eyes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EyeStateSample {
    pub left: EyeState,
    pub right: EyeState,
}

impl Add for EyeStateSample {
    type Output = EyeStateSample;

    fn add(self, rhs: EyeStateSample) -> EyeStateSample {
        EyeStateSample { left: self.left + rhs.left, right: self.right + rhs.right }
    }
}

impl Mul<f32> for EyeStateSample {
    type Output = EyeStateSample;

    fn mul(self, rhs: f32) -> EyeStateSample {
        EyeStateSample { left: self.left * rhs, right: self.right * rhs }
    }
}

/// Eyelid of a single eye.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Eyelid {
    /// Top eyelid angle in radians
    pub angle_top: f32,
    /// Bottom eyelid angle in radians
    pub angle_bottom: f32,
    /// Eyelid aperture in metres
    pub aperture: f32,
}

impl Add for Eyelid {
    type Output = Eyelid;

    fn add(self, rhs: Eyelid) -> Eyelid {
        Eyelid {
            angle_top: self.angle_top + rhs.angle_top,
            angle_bottom: self.angle_bottom + rhs.angle_bottom,
            aperture: self.aperture + rhs.aperture,
        }
    }
}

impl Mul<f32> for Eyelid {
    type Output = Eyelid;

    fn mul(self, rhs: f32) -> Eyelid {
        Eyelid {
            angle_top: self.angle_top * rhs,
            angle_bottom: self.angle_bottom * rhs,
            aperture: self.aperture * rhs,
        }
    }
}

/// Eyelids for both eyes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EyelidSample {
    pub left: Eyelid,
    pub right: Eyelid,
}

impl Add for EyelidSample {
    type Output = EyelidSample;

    fn add(self, rhs: EyelidSample) -> EyelidSample {
        EyelidSample { left: self.left + rhs.left, right: self.right + rhs.right }
    }
}

impl Mul<f32> for EyelidSample {
    type Output = EyelidSample;

    fn mul(self, rhs: f32) -> EyelidSample {
        EyelidSample { left: self.left * rhs, right: self.right * rhs }
    }
}
