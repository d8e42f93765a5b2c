//! Link configuration
//!
//! [`LinkConfig`] is deserialized from YAML or JSON (JSON is read through the YAML
//! parser). Keys are camelCase and every section is optional, so the device-settings
//! file written by the Companion tooling loads unchanged:
//!
//! ```rust
//! use neon_link::LinkConfig;
//!
//! let config = LinkConfig::parse(r#"{
//!     "rtspSettings": {
//!         "autoIp": true,
//!         "deviceName": "Neon Companion",
//!         "ip": "192.168.1.23",
//!         "port": 8686,
//!         "dnsPort": 0
//!     },
//!     "sensorCalibration": {
//!         "offset": {
//!             "position": { "x": 0.0, "y": 0.02, "z": 0.0 },
//!             "rotation": { "x": 12.0, "y": 0.0, "z": 0.0 }
//!         }
//!     }
//! }"#).unwrap();
//!
//! assert_eq!(config.rtsp_settings.device_name, "Neon Companion");
//! assert!(config.auto_reconnect);
//! ```

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::calibration::SensorCalibration;
use crate::transport::DeviceAddress;
use crate::{LinkError, Result};

/// Complete configuration of one link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinkConfig {
    /// Device addressing
    pub rtsp_settings: DeviceSettings,
    /// Sensor mounting offset, consumed by gaze-ray construction
    pub sensor_calibration: SensorCalibration,
    /// Smoothing window per channel
    pub buffers: BufferSettings,
    /// Capacity of the decoded-sample queue; frames are dropped when it is full
    pub sample_queue_capacity: usize,
    /// Retry after a failed or finished attempt
    pub auto_reconnect: bool,
    pub reconnect_delay_ms: u64,
    pub timeouts: TimeoutSettings,
    pub discovery: DiscoverySettings,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            rtsp_settings: DeviceSettings::default(),
            sensor_calibration: SensorCalibration::default(),
            buffers: BufferSettings::default(),
            sample_queue_capacity: 256,
            auto_reconnect: true,
            reconnect_delay_ms: 5000,
            timeouts: TimeoutSettings::default(),
            discovery: DiscoverySettings::default(),
        }
    }
}

impl LinkConfig {
    /// Parse and validate configuration text
    pub fn parse(text: &str) -> Result<Self> {
        let config: LinkConfig = serde_yaml_ng::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| LinkError::file_error(path.to_path_buf(), e))?;
        let config = Self::parse(&text)?;
        debug!("Loaded link configuration from {}", path.display());
        Ok(config)
    }

    /// Reject values the link cannot run with
    pub fn validate(&self) -> Result<()> {
        let buffers = &self.buffers;
        if buffers.gaze == 0 || buffers.eye_state == 0 || buffers.eyelid == 0 {
            return Err(LinkError::config("buffer sizes must be at least 1"));
        }
        if self.sample_queue_capacity == 0 {
            return Err(LinkError::config("sampleQueueCapacity must be at least 1"));
        }
        if self.timeouts.handshake_ms >= self.timeouts.read_ms {
            return Err(LinkError::config(format!(
                "handshake timeout ({}ms) must be shorter than read timeout ({}ms)",
                self.timeouts.handshake_ms, self.timeouts.read_ms
            )));
        }
        if self.rtsp_settings.auto_ip && self.discovery.try_count == 0 {
            return Err(LinkError::config("discovery tryCount must be at least 1"));
        }
        if self.rtsp_settings.port == 0 {
            return Err(LinkError::config("device port must not be 0"));
        }
        Ok(())
    }

    /// Configured (fallback) device address
    pub fn device_address(&self) -> DeviceAddress {
        let settings = &self.rtsp_settings;
        DeviceAddress::new(settings.ip.clone(), settings.port, settings.dns_port)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Device addressing, named after the device-settings file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceSettings {
    /// Resolve the device address by multicast discovery on every attempt
    pub auto_ip: bool,
    /// Device name to match during discovery; empty matches any device
    pub device_name: String,
    /// Address used when discovery is disabled or finds nothing
    pub ip: String,
    pub port: u16,
    /// Local port for the discovery socket, 0 for an ephemeral port
    pub dns_port: u16,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            auto_ip: true,
            device_name: String::new(),
            ip: Ipv4Addr::LOCALHOST.to_string(),
            port: 8686,
            dns_port: 0,
        }
    }
}

/// Smoothing window sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BufferSettings {
    pub gaze: usize,
    pub eye_state: usize,
    pub eyelid: usize,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self { gaze: 10, eye_state: 10, eyelid: 10 }
    }
}

/// Per-phase timeouts in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeoutSettings {
    pub connect_ms: u64,
    /// Applies to each handshake step separately
    pub handshake_ms: u64,
    /// Steady-state wait for the next message while streaming
    pub read_ms: u64,
    /// Wait for the teardown acknowledgement
    pub teardown_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self { connect_ms: 1000, handshake_ms: 2000, read_ms: 2500, teardown_ms: 2500 }
    }
}

impl TimeoutSettings {
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    pub fn handshake(&self) -> Duration {
        Duration::from_millis(self.handshake_ms)
    }

    pub fn read(&self) -> Duration {
        Duration::from_millis(self.read_ms)
    }

    pub fn teardown(&self) -> Duration {
        Duration::from_millis(self.teardown_ms)
    }
}

/// Multicast discovery parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiscoverySettings {
    /// Queries sent per interface
    pub try_count: u32,
    /// Silence after which a query round ends
    pub receive_timeout_ms: u64,
    /// Destination of the discovery query
    pub multicast_group: SocketAddrV4,
    /// Port of the device's HTTP status endpoint
    pub probe_port: u16,
    pub probe_timeout_ms: u64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            try_count: 3,
            receive_timeout_ms: 1000,
            multicast_group: SocketAddrV4::new(Ipv4Addr::new(224, 0, 0, 251), 5353),
            probe_port: 8080,
            probe_timeout_ms: 1000,
        }
    }
}

impl DiscoverySettings {
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn defaults_are_valid() -> Result<()> {
        let config = LinkConfig::default();
        config.validate().context("default config must validate")?;
        assert!(config.timeouts.handshake() < config.timeouts.read());
        assert_eq!(config.discovery.multicast_group.to_string(), "224.0.0.251:5353");
        assert_eq!(config.reconnect_delay(), Duration::from_secs(5));
        Ok(())
    }

    #[test]
    fn yaml_overrides_merge_with_defaults() -> Result<()> {
        let config = LinkConfig::parse(
            "autoReconnect: false\nbuffers:\n  gaze: 4\ntimeouts:\n  readMs: 4000\n",
        )?;
        assert!(!config.auto_reconnect);
        assert_eq!(config.buffers, BufferSettings { gaze: 4, eye_state: 10, eyelid: 10 });
        assert_eq!(config.timeouts.read_ms, 4000);
        assert_eq!(config.timeouts.handshake_ms, 2000);
        Ok(())
    }

    #[test]
    fn device_settings_json_shape_loads() -> Result<()> {
        let config = LinkConfig::parse(
            r#"{"rtspSettings": {"autoIp": false, "deviceName": "", "ip": "10.0.0.5", "port": 8686, "dnsPort": 5353}}"#,
        )?;
        assert_eq!(config.device_address(), DeviceAddress::new("10.0.0.5", 8686, 5353));
        assert!(!config.rtsp_settings.auto_ip);
        Ok(())
    }

    #[test]
    fn handshake_must_be_shorter_than_read() {
        let error = LinkConfig::parse("timeouts:\n  handshakeMs: 3000\n  readMs: 2500\n")
            .expect_err("handshake >= read must be rejected");
        assert!(matches!(error, LinkError::Config { .. }));
    }

    #[test]
    fn zero_sizes_are_rejected() {
        assert!(LinkConfig::parse("buffers:\n  eyelid: 0\n").is_err());
        assert!(LinkConfig::parse("sampleQueueCapacity: 0\n").is_err());
    }

    #[test]
    fn malformed_text_is_a_parse_error() {
        let error = LinkConfig::parse("buffers: [1, 2").expect_err("invalid YAML");
        assert!(matches!(error, LinkError::Parse { .. }));
    }

    #[test]
    fn missing_file_reports_path() {
        let error = LinkConfig::load("/nonexistent/neon-link.json").expect_err("missing file");
        assert!(error.to_string().contains("/nonexistent/neon-link.json"));
    }
}
