//! Sensor calibration data
//!
//! Three pieces feed gaze-ray construction downstream of the link:
//!
//! - [`SensorOffset`]: how the sensor is mounted relative to the viewer, loaded with
//!   the rest of [`LinkConfig`](crate::LinkConfig).
//! - [`CameraIntrinsics`]: the scene-camera model exported by the device as a small
//!   binary blob. [`CameraIntrinsics::gaze_direction`] turns a gaze point in sensor
//!   pixels into a direction in the camera frame.
//! - [`CorrespondenceSet`]: reference points paired with observed gaze directions,
//!   handed to a [`PoseSolver`] to refine the mounting offset.
//!
//! ## Binary Layout
//!
//! All values little-endian:
//!
//! | Offset | Size | Content                               |
//! |--------|------|---------------------------------------|
//! | 0      | 1    | format version                        |
//! | 1      | 6    | device serial                         |
//! | 7      | 72   | camera matrix, 9 × f64, row-major     |
//! | 79     | 64   | distortion coefficients, 8 × f64      |

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::types::{GazeSample, Vec3};
use crate::{LinkError, Result};

const VERSION_OFFSET: usize = 0;
const SERIAL_OFFSET: usize = 1;
const SERIAL_LEN: usize = 6;
const CAMERA_MATRIX_OFFSET: usize = 7;
const DISTORTION_OFFSET: usize = 79;

/// Undistortion passes; five converge well inside a pixel for the Neon scene camera
const UNDISTORT_ITERATIONS: usize = 5;

/// Sensor calibration section of the link configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SensorCalibration {
    pub offset: SensorOffset,
}

/// Mounting pose of the sensor relative to the viewer
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SensorOffset {
    /// Translation in metres
    pub position: Vec3,
    /// Euler angles in degrees
    pub rotation: Vec3,
}

/// Scene-camera model exported by the device
#[derive(Debug, Clone, PartialEq)]
pub struct CameraIntrinsics {
    pub version: u8,
    pub serial: [u8; SERIAL_LEN],
    /// Row-major 3×3 matrix: `[fx, 0, cx, 0, fy, cy, 0, 0, 1]`
    pub camera_matrix: [f64; 9],
    /// `k1, k2, p1, p2, k3, k4, k5, k6`
    pub distortion: [f64; 8],
}

impl CameraIntrinsics {
    /// Minimum length of a calibration blob
    pub const ENCODED_LEN: usize = DISTORTION_OFFSET + 8 * 8;

    /// Parse a calibration blob; trailing bytes are ignored
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::ENCODED_LEN {
            return Err(LinkError::parse(
                "camera intrinsics",
                format!("need {} bytes, have {}", Self::ENCODED_LEN, data.len()),
            ));
        }

        let mut serial = [0u8; SERIAL_LEN];
        serial.copy_from_slice(&data[SERIAL_OFFSET..SERIAL_OFFSET + SERIAL_LEN]);

        let mut camera_matrix = [0.0; 9];
        for (i, value) in camera_matrix.iter_mut().enumerate() {
            *value = parse_f64_le(data, CAMERA_MATRIX_OFFSET + i * 8)?;
        }
        let mut distortion = [0.0; 8];
        for (i, value) in distortion.iter_mut().enumerate() {
            *value = parse_f64_le(data, DISTORTION_OFFSET + i * 8)?;
        }

        Ok(Self { version: data[VERSION_OFFSET], serial, camera_matrix, distortion })
    }

    /// Read and parse a calibration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| LinkError::file_error(path.to_path_buf(), e))?;
        let intrinsics = Self::from_bytes(&data)?;
        debug!(
            "Loaded camera intrinsics v{} for serial {} from {}",
            intrinsics.version,
            intrinsics.serial_string(),
            path.display()
        );
        Ok(intrinsics)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(Self::ENCODED_LEN);
        data.push(self.version);
        data.extend_from_slice(&self.serial);
        for value in self.camera_matrix.iter().chain(self.distortion.iter()) {
            data.extend_from_slice(&value.to_le_bytes());
        }
        data
    }

    /// Serial as text, stopping at the first NUL
    pub fn serial_string(&self) -> String {
        let end = self.serial.iter().position(|&b| b == 0).unwrap_or(SERIAL_LEN);
        String::from_utf8_lossy(&self.serial[..end]).into_owned()
    }

    pub fn focal_length(&self) -> (f64, f64) {
        (self.camera_matrix[0], self.camera_matrix[4])
    }

    pub fn principal_point(&self) -> (f64, f64) {
        (self.camera_matrix[2], self.camera_matrix[5])
    }

    /// Direction of a gaze point in the camera frame, Y pointing up, `z == 1`
    ///
    /// Inverts the rational radial plus tangential distortion model by fixed-point
    /// iteration.
    pub fn gaze_direction(&self, gaze: GazeSample) -> Vec3 {
        let (fx, fy) = self.focal_length();
        let (cx, cy) = self.principal_point();
        let k = &self.distortion;

        let x0 = (f64::from(gaze.point.x) - cx) / fx;
        let y0 = (f64::from(gaze.point.y) - cy) / fy;
        let (mut x, mut y) = (x0, y0);

        for _ in 0..UNDISTORT_ITERATIONS {
            let r2 = x * x + y * y;
            let icdist = (1.0 + ((k[7] * r2 + k[6]) * r2 + k[5]) * r2)
                / (1.0 + ((k[4] * r2 + k[1]) * r2 + k[0]) * r2);
            let delta_x = 2.0 * k[2] * x * y + k[3] * (r2 + 2.0 * x * x);
            let delta_y = k[2] * (r2 + 2.0 * y * y) + 2.0 * k[3] * x * y;
            x = (x0 - delta_x) * icdist;
            y = (y0 - delta_y) * icdist;
        }

        Vec3::new(x as f32, -y as f32, 1.0)
    }
}

fn parse_f64_le(data: &[u8], offset: usize) -> Result<f64> {
    let bytes: [u8; 8] = data
        .get(offset..offset + 8)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| {
            LinkError::parse(
                "camera intrinsics",
                format!("insufficient data for f64 at offset {offset}"),
            )
        })?;
    Ok(f64::from_le_bytes(bytes))
}

/// Reference point paired with the gaze direction observed while looking at it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    /// Point in viewer space
    pub reference: Vec3,
    /// Unit direction in sensor space
    pub observed: Vec3,
}

/// Pose recovered by a [`PoseSolver`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolvedPose {
    /// Unit quaternion `(x, y, z, w)`
    pub rotation: [f32; 4],
    pub translation: Vec3,
    /// Mean angular error over all correspondences, in degrees
    pub error: f32,
}

impl SolvedPose {
    pub const IDENTITY: SolvedPose =
        SolvedPose { rotation: [0.0, 0.0, 0.0, 1.0], translation: Vec3::ZERO, error: 0.0 };
}

/// Recovers the sensor mounting pose from correspondences
pub trait PoseSolver {
    fn solve(&self, correspondences: &[Correspondence]) -> Result<SolvedPose>;
}

/// Accumulates correspondences for a [`PoseSolver`]
#[derive(Debug, Clone, Default)]
pub struct CorrespondenceSet {
    pairs: Vec<Correspondence>,
}

impl CorrespondenceSet {
    /// Pairs needed before a rigid pose is determined
    pub const MIN_PAIRS: usize = 3;

    pub fn with_capacity(capacity: usize) -> Self {
        Self { pairs: Vec::with_capacity(capacity) }
    }

    /// Add a pair; the observed direction is normalized
    ///
    /// Zero-length directions carry no information and are skipped.
    pub fn add(&mut self, reference: Vec3, observed: Vec3) -> bool {
        let length = observed.length();
        if length <= f32::EPSILON || !length.is_finite() {
            return false;
        }
        self.pairs.push(Correspondence { reference, observed: observed * (1.0 / length) });
        true
    }

    /// Add a pair from a live gaze sample
    pub fn add_gaze(&mut self, reference: Vec3, gaze: GazeSample, intrinsics: &CameraIntrinsics) -> bool {
        self.add(reference, intrinsics.gaze_direction(gaze))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn clear(&mut self) {
        self.pairs.clear();
    }

    pub fn as_slice(&self) -> &[Correspondence] {
        &self.pairs
    }

    pub fn solve<S: PoseSolver + ?Sized>(&self, solver: &S) -> Result<SolvedPose> {
        if self.pairs.len() < Self::MIN_PAIRS {
            return Err(LinkError::calibration(format!(
                "{} correspondences collected, need at least {}",
                self.pairs.len(),
                Self::MIN_PAIRS
            )));
        }
        let pose = solver.solve(&self.pairs)?;
        debug!("Solved sensor pose from {} pairs, error {:.3}°", self.pairs.len(), pose.error);
        Ok(pose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pinhole(fx: f64, fy: f64, cx: f64, cy: f64) -> CameraIntrinsics {
        CameraIntrinsics {
            version: 1,
            serial: *b"abc123",
            camera_matrix: [fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0],
            distortion: [0.0; 8],
        }
    }

    #[test]
    fn blob_layout_offsets() {
        let mut intrinsics = pinhole(891.6, 891.2, 815.4, 599.1);
        intrinsics.distortion = [-0.13, 0.11, 0.0002, -0.0003, 0.0, 0.17, 0.0, 0.02];
        let data = intrinsics.to_bytes();

        assert_eq!(data.len(), CameraIntrinsics::ENCODED_LEN);
        assert_eq!(data.len(), 143);
        assert_eq!(data[0], 1);
        assert_eq!(&data[1..7], b"abc123");
        assert_eq!(f64::from_le_bytes(data[7..15].try_into().unwrap()), 891.6);
        assert_eq!(f64::from_le_bytes(data[79..87].try_into().unwrap()), -0.13);

        let parsed = CameraIntrinsics::from_bytes(&data).unwrap();
        assert_eq!(parsed, intrinsics);
        assert_eq!(parsed.serial_string(), "abc123");
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut data = pinhole(1.0, 1.0, 0.0, 0.0).to_bytes();
        data.extend_from_slice(&[0xff; 9]);
        assert!(CameraIntrinsics::from_bytes(&data).is_ok());
    }

    #[test]
    fn short_blob_is_rejected() {
        let data = pinhole(1.0, 1.0, 0.0, 0.0).to_bytes();
        let error = CameraIntrinsics::from_bytes(&data[..142]).unwrap_err();
        assert!(matches!(error, LinkError::Parse { .. }));
    }

    #[test]
    fn serial_stops_at_nul() {
        let mut intrinsics = pinhole(1.0, 1.0, 0.0, 0.0);
        intrinsics.serial = [b'n', b'e', b'o', 0, 0, 0];
        assert_eq!(intrinsics.serial_string(), "neo");
    }

    #[test]
    fn undistorted_direction_without_distortion_is_pinhole() {
        let intrinsics = pinhole(800.0, 400.0, 800.0, 600.0);

        let center = intrinsics.gaze_direction(GazeSample::new(800.0, 600.0));
        assert_eq!(center, Vec3::new(0.0, 0.0, 1.0));

        // Image Y grows downward, direction Y grows upward
        let direction = intrinsics.gaze_direction(GazeSample::new(1200.0, 400.0));
        assert!((direction.x - 0.5).abs() < 1e-6);
        assert!((direction.y - 0.5).abs() < 1e-6);
        assert_eq!(direction.z, 1.0);
    }

    #[test]
    fn radial_distortion_is_inverted() {
        let mut intrinsics = pinhole(1.0, 1.0, 0.0, 0.0);
        intrinsics.distortion[0] = 0.1;

        // Forward model: distorted = undistorted * (1 + k1 * r2)
        let (ux, uy) = (0.3f64, -0.2f64);
        let scale = 1.0 + 0.1 * (ux * ux + uy * uy);
        let gaze = GazeSample::new((ux * scale) as f32, (uy * scale) as f32);

        let direction = intrinsics.gaze_direction(gaze);
        assert!((f64::from(direction.x) - ux).abs() < 1e-4);
        assert!((f64::from(direction.y) + uy).abs() < 1e-4);
    }

    struct FixedSolver;

    impl PoseSolver for FixedSolver {
        fn solve(&self, correspondences: &[Correspondence]) -> Result<SolvedPose> {
            Ok(SolvedPose { error: correspondences.len() as f32, ..SolvedPose::IDENTITY })
        }
    }

    #[test]
    fn correspondences_are_normalized_and_solved() {
        let mut set = CorrespondenceSet::with_capacity(4);
        assert!(set.add(Vec3::new(0.0, 0.0, 1.0), Vec3::new(0.0, 0.0, 2.0)));
        assert!(!set.add(Vec3::new(0.0, 0.0, 1.0), Vec3::ZERO));
        assert_eq!(set.len(), 1);
        assert!((set.as_slice()[0].observed.length() - 1.0).abs() < 1e-6);

        assert!(matches!(set.solve(&FixedSolver), Err(LinkError::Calibration { .. })));

        let intrinsics = pinhole(100.0, 100.0, 50.0, 50.0);
        set.add_gaze(Vec3::new(1.0, 0.0, 1.0), GazeSample::new(150.0, 50.0), &intrinsics);
        set.add_gaze(Vec3::new(0.0, 1.0, 1.0), GazeSample::new(50.0, -50.0), &intrinsics);
        let pose = set.solve(&FixedSolver).unwrap();
        assert_eq!(pose.error, 3.0);

        set.clear();
        assert!(set.is_empty());
    }

    #[test]
    fn sensor_offset_config_shape() {
        let calibration: SensorCalibration = serde_yaml_ng::from_str(
            r#"{"offset": {"position": {"x": 0.0, "y": -0.02, "z": 0.01}, "rotation": {"x": 12.0, "y": 0.0, "z": 0.0}}}"#,
        )
        .unwrap();
        assert_eq!(calibration.offset.position, Vec3::new(0.0, -0.02, 0.01));
        assert_eq!(calibration.offset.rotation.x, 12.0);

        let empty: SensorCalibration = serde_yaml_ng::from_str("{}").unwrap();
        assert_eq!(empty, SensorCalibration::default());
    }
}
