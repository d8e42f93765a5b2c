//! Delivery rate for sample streams

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delivery rate for the decoded-sample stream
///
/// The device emits gaze at up to 200Hz; display-bound consumers usually want at most
/// one sample per refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateRate {
    /// Every decoded frame
    Native,

    /// At most this many frames per second, latest wins.
    /// A rate at or above the source rate collapses to `Native`.
    Max(u32),
}

impl UpdateRate {
    /// Nominal gaze rate of the device
    pub const DEVICE_HZ: f64 = 200.0;

    /// Normalize against the source rate
    pub fn normalize(self, source_hz: f64) -> Self {
        match self {
            UpdateRate::Max(0) => UpdateRate::Native,
            UpdateRate::Max(hz) if hz as f64 >= source_hz => UpdateRate::Native,
            other => other,
        }
    }

    /// Throttle interval, if any
    pub fn throttle_interval(self, source_hz: f64) -> Option<Duration> {
        match self.normalize(source_hz) {
            UpdateRate::Native => None,
            UpdateRate::Max(hz) => Some(Duration::from_secs_f64(1.0 / hz as f64)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_rate_is_throttled() {
        let interval = UpdateRate::Max(50).throttle_interval(UpdateRate::DEVICE_HZ);
        assert_eq!(interval, Some(Duration::from_millis(20)));
    }

    #[test]
    fn rates_above_source_collapse_to_native() {
        assert_eq!(UpdateRate::Max(240).normalize(200.0), UpdateRate::Native);
        assert_eq!(UpdateRate::Max(0).normalize(200.0), UpdateRate::Native);
        assert_eq!(UpdateRate::Native.throttle_interval(200.0), None);
    }
}
