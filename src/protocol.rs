//! RTSP-style control messages carried over the WebSocket tunnel
//!
//! The device speaks a minimal subset of RTSP/1.0 framed inside WebSocket binary
//! messages. Four fixed requests are used, always in the same order with fixed
//! sequence numbers; replies are only inspected for the `Session` header and the
//! success status line.

use std::fmt;

/// Status line prefix of a successful reply
pub const SUCCESS_STATUS: &str = "RTSP/1.0 200 OK";

const SESSION_HEADER: &str = "Session: ";

/// Control requests understood by the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRequest<'a> {
    /// Ask for the gaze stream description
    Describe { url: &'a str },
    /// Declare interleaved TCP transport
    Setup { url: &'a str },
    /// Start streaming for an established session
    Play { url: &'a str, session: &'a str },
    /// End the session
    Teardown { url: &'a str, session: &'a str },
}

impl ControlRequest<'_> {
    /// Request method, for logging
    pub fn method(&self) -> &'static str {
        match self {
            ControlRequest::Describe { .. } => "DESCRIBE",
            ControlRequest::Setup { .. } => "SETUP",
            ControlRequest::Play { .. } => "PLAY",
            ControlRequest::Teardown { .. } => "TEARDOWN",
        }
    }
}

impl fmt::Display for ControlRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlRequest::Describe { url } => write!(
                f,
                "DESCRIBE {url}/?camera=gaze RTSP/1.0\r\nCSeq: 1\r\nAccept: application/sdp\r\n\r\n"
            ),
            ControlRequest::Setup { url } => write!(
                f,
                "SETUP {url} RTSP/1.0\r\nCSeq: 2\r\nBlocksize: 64000\r\nTransport: RTP/AVP/TCP;unicast;interleaved=0-1\r\n\r\n"
            ),
            ControlRequest::Play { url, session } => write!(
                f,
                "PLAY {url} RTSP/1.0\r\nCSeq: 3\r\nRange: npt=0-\r\nSession: {session}\r\n\r\n"
            ),
            ControlRequest::Teardown { url, session } => {
                write!(f, "TEARDOWN {url} RTSP/1.0\r\nCSeq: 4\r\nSession: {session}\r\n\r\n")
            }
        }
    }
}

/// Control URL for a device address
pub fn control_url(host: &str, port: u16) -> String {
    format!("rtsp://{host}:{port}")
}

/// Session identifier from a SETUP reply
///
/// Matches the first line starting with `Session: ` and takes the leading run of ASCII
/// alphanumerics, so `Session: 1185d20035702ca;timeout=60` yields `1185d20035702ca`.
pub fn parse_session_id(reply: &str) -> Option<&str> {
    reply.lines().find_map(|line| {
        let value = line.strip_prefix(SESSION_HEADER)?;
        let end = value.find(|c: char| !c.is_ascii_alphanumeric()).unwrap_or(value.len());
        (end > 0).then(|| &value[..end])
    })
}

/// Whether a reply's status line reports success
pub fn is_success(reply: &str) -> bool {
    reply.starts_with(SUCCESS_STATUS)
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "rtsp://192.168.1.23:8686";

    #[test]
    fn describe_request_is_byte_exact() {
        let request = ControlRequest::Describe { url: URL }.to_string();
        assert_eq!(
            request,
            "DESCRIBE rtsp://192.168.1.23:8686/?camera=gaze RTSP/1.0\r\nCSeq: 1\r\nAccept: application/sdp\r\n\r\n"
        );
    }

    #[test]
    fn setup_declares_interleaved_transport() {
        let request = ControlRequest::Setup { url: URL }.to_string();
        assert!(request.starts_with("SETUP rtsp://192.168.1.23:8686 RTSP/1.0\r\nCSeq: 2\r\n"));
        assert!(request.contains("Transport: RTP/AVP/TCP;unicast;interleaved=0-1\r\n"));
        assert!(request.ends_with("\r\n\r\n"));
    }

    #[test]
    fn play_and_teardown_reference_session() {
        let play = ControlRequest::Play { url: URL, session: "1185d20035702ca" }.to_string();
        assert_eq!(
            play,
            "PLAY rtsp://192.168.1.23:8686 RTSP/1.0\r\nCSeq: 3\r\nRange: npt=0-\r\nSession: 1185d20035702ca\r\n\r\n"
        );

        let teardown =
            ControlRequest::Teardown { url: URL, session: "1185d20035702ca" }.to_string();
        assert_eq!(
            teardown,
            "TEARDOWN rtsp://192.168.1.23:8686 RTSP/1.0\r\nCSeq: 4\r\nSession: 1185d20035702ca\r\n\r\n"
        );
    }

    #[test]
    fn session_id_is_extracted_from_setup_reply() {
        let reply = "RTSP/1.0 200 OK\r\nCSeq: 2\r\nTransport: RTP/AVP/TCP;unicast;interleaved=0-1\r\nSession: 1185d20035702ca\r\n\r\n";
        assert_eq!(parse_session_id(reply), Some("1185d20035702ca"));
    }

    #[test]
    fn session_id_stops_at_parameters() {
        let reply = "RTSP/1.0 200 OK\r\nSession: abc123;timeout=60\r\n\r\n";
        assert_eq!(parse_session_id(reply), Some("abc123"));
    }

    #[test]
    fn missing_or_empty_session_is_none() {
        assert_eq!(parse_session_id("RTSP/1.0 200 OK\r\nCSeq: 2\r\n\r\n"), None);
        assert_eq!(parse_session_id("RTSP/1.0 200 OK\r\nSession: ;x\r\n"), None);
        // Header must start the line
        assert_eq!(parse_session_id("X-Session: abc\r\n"), None);
    }

    #[test]
    fn success_status_detection() {
        assert!(is_success("RTSP/1.0 200 OK\r\nCSeq: 4\r\n\r\n"));
        assert!(!is_success("RTSP/1.0 454 Session Not Found\r\n"));
        assert!(!is_success(""));
    }

    #[test]
    fn control_url_format() {
        assert_eq!(control_url("10.0.0.7", 8686), "rtsp://10.0.0.7:8686");
    }
}
