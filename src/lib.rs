//! Real-time telemetry link for Neon eye-tracking devices.
//!
//! The Neon Companion app streams gaze, eye-state and eyelid data over an RTSP-style
//! control protocol tunnelled through a WebSocket. This crate finds the device on the
//! local network, runs the control handshake, decodes the binary telemetry frames and
//! keeps a smoothed window of every channel available to any thread.
//!
//! # Features
//!
//! - **Discovery**: multicast DNS query with an HTTP status probe fallback
//! - **Resilience**: per-phase timeouts, clean teardown and automatic reconnects
//! - **Smoothing**: fixed-size ring buffers with lock-guarded latest/mean reads
//! - **Streaming**: decoded frames on a bounded queue, optionally throttled to a
//!   display rate
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use neon_link::{LinkConfig, NeonLink, UpdateRate};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> neon_link::Result<()> {
//!     let config = LinkConfig::load("config.json")?;
//!     let mut link = NeonLink::spawn(config)?;
//!
//!     let mut samples = link.samples(UpdateRate::Max(60)).expect("first subscriber");
//!     while let Some(frame) = samples.next().await {
//!         println!("gaze {:?}, smoothed {:?}", frame.gaze.point, link.smooth_gaze_point().point);
//!     }
//!
//!     link.stop();
//!     link.join().await
//! }
//! ```

// Core types and error handling
pub mod buffer;
pub mod calibration;
pub mod codec;
pub mod config;
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Device protocols
pub mod discovery;
pub mod protocol;
pub mod transport;

// Connection lifecycle
pub mod link;
pub mod session;
pub mod stream;
pub mod supervisor;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use buffer::{LinkBuffers, SampleBuffer};
pub use calibration::{CameraIntrinsics, CorrespondenceSet, PoseSolver, SensorCalibration, SolvedPose};
pub use config::LinkConfig;
pub use discovery::ServiceDiscovery;
pub use link::NeonLink;
pub use session::{SessionOutcome, SessionState, StreamEnd, TelemetrySession};
pub use supervisor::ConnectionSupervisor;
pub use transport::{Connector, DeviceAddress, MessageTransport, WsConnector};
