//! Error types for the telemetry link.
//!
//! All errors implement `std::error::Error` and carry enough structured context to
//! decide how the connection supervisor should react.
//!
//! ## Error Categories
//!
//! - **Transient**: read timeouts, remote close, transport failures and cancellation
//!   races during shutdown. The supervisor retries these after its reconnect delay.
//! - **Protocol**: the device answered but violated the control protocol (no session
//!   id in the setup reply, teardown never acknowledged). Fatal for the current
//!   attempt, but reconnect policy still applies.
//! - **Everything else** (configuration, calibration parsing, local I/O): not retried,
//!   propagates out of the link.
//!
//! ```rust
//! use neon_link::LinkError;
//! use std::time::Duration;
//!
//! let error = LinkError::timeout("read", Duration::from_millis(2500));
//! assert!(error.is_transient());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Result type alias for link operations.
pub type Result<T, E = LinkError> = std::result::Result<T, E>;

/// Main error type for link operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LinkError {
    #[error("{phase} timed out after {duration:?}")]
    Timeout { phase: &'static str, duration: Duration },

    #[error("Connection closed by device")]
    RemoteClosed,

    #[error("Operation cancelled: {context}")]
    Cancelled { context: String },

    #[error("Transport failure: {reason}")]
    Transport {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Protocol violation: {reason}")]
    Protocol { reason: String },

    #[error("Device discovery failed: {reason}")]
    Discovery {
        reason: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Configuration file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Calibration failed: {reason}")]
    Calibration { reason: String },
}

impl LinkError {
    /// Returns whether this error is an expected interruption of a streaming attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LinkError::Timeout { .. }
                | LinkError::RemoteClosed
                | LinkError::Cancelled { .. }
                | LinkError::Transport { .. }
        )
    }

    /// Returns whether the supervisor may start another attempt after this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            LinkError::Timeout { .. } => true,
            LinkError::RemoteClosed => true,
            LinkError::Cancelled { .. } => true,
            LinkError::Transport { .. } => true,
            LinkError::Protocol { .. } => true,
            LinkError::Discovery { .. } => true,
            LinkError::Config { .. } => false,
            LinkError::File { .. } => false,
            LinkError::Parse { .. } => false,
            LinkError::Calibration { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            LinkError::Timeout { .. } => vec![
                "Check that the Companion app is running and streaming",
                "Verify the device and host share the same network",
                "Increase the configured timeout",
            ],
            LinkError::RemoteClosed => vec![
                "Check the Companion app did not stop or restart",
                "Wait for the link to reconnect automatically",
            ],
            LinkError::Cancelled { .. } => vec!["No action needed during shutdown"],
            LinkError::Transport { .. } => vec![
                "Verify the device address and port",
                "Check firewall rules for the streaming port",
                "Enable auto-discovery if the device address changes",
            ],
            LinkError::Protocol { .. } => vec![
                "Update the Companion app to a compatible version",
                "Restart streaming on the device",
            ],
            LinkError::Discovery { .. } => vec![
                "Check multicast traffic is allowed on the local network",
                "Configure a fixed device address instead",
            ],
            LinkError::Config { .. } => vec![
                "Check configuration values against the documented defaults",
                "Remove the offending key to fall back to its default",
            ],
            LinkError::File { .. } => {
                vec!["Check the file exists and is readable", "Check file permissions"]
            }
            LinkError::Parse { .. } => vec![
                "Verify source data integrity",
                "Re-export the calibration data from the device",
            ],
            LinkError::Calibration { .. } => vec![
                "Collect more reference points spread across the field of view",
                "Check the gaze stream was live while collecting points",
            ],
        }
    }

    /// Helper constructor for phase timeouts.
    pub fn timeout(phase: &'static str, duration: Duration) -> Self {
        LinkError::Timeout { phase, duration }
    }

    /// Helper constructor for cancellation.
    pub fn cancelled(context: impl Into<String>) -> Self {
        LinkError::Cancelled { context: context.into() }
    }

    /// Helper constructor for transport failures.
    pub fn transport(reason: impl Into<String>) -> Self {
        LinkError::Transport { reason: reason.into(), source: None }
    }

    /// Helper constructor for transport failures with source.
    pub fn transport_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        LinkError::Transport { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for protocol violations.
    pub fn protocol(reason: impl Into<String>) -> Self {
        LinkError::Protocol { reason: reason.into() }
    }

    /// Helper constructor for discovery socket failures.
    pub fn discovery(reason: impl Into<String>, source: std::io::Error) -> Self {
        LinkError::Discovery { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        LinkError::Config { reason: reason.into() }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        LinkError::File { path, source }
    }

    /// Helper constructor for calibration errors.
    pub fn calibration(reason: impl Into<String>) -> Self {
        LinkError::Calibration { reason: reason.into() }
    }

    /// Helper constructor for parse errors.
    pub fn parse(context: impl Into<String>, details: impl Into<String>) -> Self {
        LinkError::Parse { context: context.into(), details: details.into() }
    }
}

impl From<tungstenite::Error> for LinkError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                LinkError::RemoteClosed
            }
            other => LinkError::transport_with_source("websocket", Box::new(other)),
        }
    }
}

impl From<serde_yaml_ng::Error> for LinkError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        LinkError::Parse { context: "configuration".to_string(), details: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn error_messages_carry_their_context(
            reason in "[a-zA-Z0-9 ]*",
            millis in 1u64..60_000u64,
        ) {
            let protocol = LinkError::protocol(reason.clone());
            let transport = LinkError::transport(reason.clone());
            let timeout = LinkError::timeout("handshake", Duration::from_millis(millis));

            prop_assert!(protocol.to_string().contains(&reason));
            prop_assert!(transport.to_string().contains(&reason));
            prop_assert!(timeout.to_string().contains("handshake"));
        }
    }

    #[test]
    fn transient_classification() {
        assert!(LinkError::timeout("read", Duration::from_secs(1)).is_transient());
        assert!(LinkError::RemoteClosed.is_transient());
        assert!(LinkError::cancelled("stop").is_transient());
        assert!(LinkError::transport("refused").is_transient());

        assert!(!LinkError::protocol("no session").is_transient());
        assert!(!LinkError::config("zero buffer").is_transient());
    }

    #[test]
    fn protocol_violations_are_retryable_but_not_transient() {
        let error = LinkError::protocol("missing Session header");
        assert!(error.is_retryable());
        assert!(!error.is_transient());

        let error = LinkError::parse("calibration", "too short");
        assert!(!error.is_retryable());
    }

    #[test]
    fn closed_websocket_maps_to_remote_close() {
        let error: LinkError = tungstenite::Error::ConnectionClosed.into();
        assert!(matches!(error, LinkError::RemoteClosed));

        let error: LinkError = tungstenite::Error::AlreadyClosed.into();
        assert!(matches!(error, LinkError::RemoteClosed));
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<LinkError>();

        let error = LinkError::transport("test");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn recovery_suggestions_are_provided() {
        let errors = [
            LinkError::timeout("read", Duration::from_secs(1)),
            LinkError::RemoteClosed,
            LinkError::protocol("x"),
            LinkError::config("x"),
        ];
        for error in &errors {
            let suggestions = error.recovery_suggestions();
            assert!(!suggestions.is_empty());
            assert!(suggestions.iter().all(|s| s.len() > 5));
        }
    }
}
