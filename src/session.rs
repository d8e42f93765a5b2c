//! One connection attempt: connect, handshake, stream, tear down
//!
//! [`TelemetrySession::run`] drives a single attempt against one device address and
//! always closes the transport before returning:
//!
//! ```text
//! Connecting -> Handshaking(Describe -> Setup -> Play) -> Streaming -> Closing -> Disconnected
//! ```
//!
//! Connect and DESCRIBE are aborted by the link stop signal; SETUP and PLAY only by
//! their own timeout, so a session the device has opened is always torn down. While
//! streaming, a stop request or a read timeout ends the stream and TEARDOWN is sent;
//! a remote close ends it without one.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::buffer::LinkBuffers;
use crate::codec;
use crate::config::TimeoutSettings;
use crate::protocol::{self, ControlRequest, SUCCESS_STATUS};
use crate::transport::{Connector, DeviceAddress, Incoming, MessageTransport};
use crate::types::DecodedFrame;
use crate::{LinkError, Result};

/// Frames between progress log lines
const FRAMES_PER_LOG: u64 = 2000;

/// Handshake step in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStep {
    Describe,
    Setup,
    Play,
}

/// Observable link state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Discovering,
    Connecting,
    Handshaking(HandshakeStep),
    Streaming,
    Closing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Discovering => write!(f, "discovering"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Handshaking(step) => write!(f, "handshaking ({step:?})"),
            SessionState::Streaming => write!(f, "streaming"),
            SessionState::Closing => write!(f, "closing"),
        }
    }
}

/// Why streaming ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// Link stop requested
    Stopped,
    /// No message within the read timeout
    ReadTimeout,
    /// Device closed the connection
    RemoteClosed,
}

/// Summary of an attempt that reached the streaming phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOutcome {
    pub end: StreamEnd,
    /// Telemetry frames decoded during the attempt
    pub frames: u64,
    /// Frames decoded but dropped because the sample queue was full
    pub dropped: u64,
    /// TEARDOWN was sent and acknowledged
    pub torn_down: bool,
}

/// Sinks and signals shared by every attempt of one link
#[derive(Debug)]
pub struct SessionContext {
    pub buffers: Arc<LinkBuffers>,
    /// Decoded-frame queue; `None` when nobody consumes frames
    pub samples: Option<mpsc::Sender<DecodedFrame>>,
    pub state: watch::Sender<SessionState>,
    pub stop: CancellationToken,
}

impl SessionContext {
    pub(crate) fn set_state(&self, state: SessionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("Link state {} -> {}", previous, state);
        }
    }
}

/// A single connection attempt
pub struct TelemetrySession<'a> {
    context: &'a SessionContext,
    address: DeviceAddress,
    timeouts: TimeoutSettings,
}

impl<'a> TelemetrySession<'a> {
    pub fn new(context: &'a SessionContext, address: DeviceAddress, timeouts: TimeoutSettings) -> Self {
        Self { context, address, timeouts }
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    /// Run the attempt to completion
    ///
    /// Read timeouts, remote close and stop requests while streaming are normal
    /// outcomes; everything else is returned as an error. The state is
    /// [`SessionState::Disconnected`] again on return.
    pub async fn run<C: Connector>(&self, connector: &C) -> Result<SessionOutcome> {
        let result = self.attempt(connector).await;
        self.context.set_state(SessionState::Disconnected);
        result
    }

    async fn attempt<C: Connector>(&self, connector: &C) -> Result<SessionOutcome> {
        self.context.set_state(SessionState::Connecting);
        let mut transport = self.connect(connector).await?;
        info!("Connected to {}", self.address);

        let result = self.drive(&mut transport).await;

        // Transport already gone is fine here
        if let Err(e) = transport.close().await {
            debug!("Closing transport to {}: {}", self.address, e);
        }
        result
    }

    async fn connect<C: Connector>(&self, connector: &C) -> Result<C::Transport> {
        let limit = self.timeouts.connect();
        self.abortable("connect", limit, connector.connect(&self.address)).await
    }

    async fn drive<T: MessageTransport>(&self, transport: &mut T) -> Result<SessionOutcome> {
        let url = self.address.control_url();
        let session_id = self.handshake(transport, &url).await?;

        self.context.set_state(SessionState::Streaming);
        info!("Streaming from {} (session {})", self.address, session_id);
        let (end, frames, dropped) = self.stream(transport).await?;
        info!("Stream from {} ended ({:?}) after {} frames", self.address, end, frames);
        if dropped > 0 {
            warn!("{} frames dropped on a full sample queue", dropped);
        }

        let torn_down = match end {
            StreamEnd::RemoteClosed => false,
            StreamEnd::Stopped | StreamEnd::ReadTimeout => {
                self.context.set_state(SessionState::Closing);
                self.teardown(transport, &url, &session_id).await?;
                true
            }
        };

        Ok(SessionOutcome { end, frames, dropped, torn_down })
    }

    /// DESCRIBE, SETUP and PLAY; returns the session id
    async fn handshake<T: MessageTransport>(&self, transport: &mut T, url: &str) -> Result<String> {
        let limit = self.timeouts.handshake();

        // Nothing to tear down yet, so a stop request may abort DESCRIBE
        self.context.set_state(SessionState::Handshaking(HandshakeStep::Describe));
        let describe = self
            .abortable("describe", limit, request(transport, ControlRequest::Describe { url }))
            .await?;
        if describe.trim().is_empty() {
            return Err(LinkError::protocol("empty DESCRIBE reply"));
        }

        self.context.set_state(SessionState::Handshaking(HandshakeStep::Setup));
        let setup = timed("setup", limit, request(transport, ControlRequest::Setup { url })).await?;
        let session_id = protocol::parse_session_id(&setup)
            .ok_or_else(|| LinkError::protocol("SETUP reply carries no session id"))?
            .to_string();
        debug!("Session id {}", session_id);

        // PLAY is not answered before the first frame; its reply is skipped while streaming
        self.context.set_state(SessionState::Handshaking(HandshakeStep::Play));
        let play = ControlRequest::Play { url, session: &session_id };
        timed("play", limit, send(transport, &play)).await?;

        Ok(session_id)
    }

    /// Receive until stop, read timeout or remote close
    async fn stream<T: MessageTransport>(&self, transport: &mut T) -> Result<(StreamEnd, u64, u64)> {
        let read_timeout = self.timeouts.read();
        let mut frames = 0u64;
        let mut dropped = 0u64;

        loop {
            let incoming = tokio::select! {
                biased;
                _ = self.context.stop.cancelled() => return Ok((StreamEnd::Stopped, frames, dropped)),
                received = tokio::time::timeout(read_timeout, transport.receive()) => match received {
                    Err(_) => {
                        warn!("No message from {} within {:?}", self.address, read_timeout);
                        return Ok((StreamEnd::ReadTimeout, frames, dropped));
                    }
                    Ok(Ok(Incoming::Closed)) | Ok(Err(LinkError::RemoteClosed)) => {
                        info!("Device {} closed the connection", self.address);
                        return Ok((StreamEnd::RemoteClosed, frames, dropped));
                    }
                    Ok(Err(e)) => return Err(e),
                    Ok(Ok(incoming)) => incoming,
                },
            };

            let Incoming::Binary(data) = incoming else {
                continue;
            };
            let Some(frame) = codec::decode(&data) else {
                trace!("Skipping {}-byte message", data.len());
                continue;
            };

            self.context.buffers.record(&frame);
            if let Some(samples) = &self.context.samples {
                if let Err(mpsc::error::TrySendError::Full(_)) = samples.try_send(frame) {
                    dropped += 1;
                }
            }

            frames += 1;
            if frames % FRAMES_PER_LOG == 0 {
                info!("{} frames processed", frames);
            }
        }
    }

    /// TEARDOWN, then wait for the acknowledgement; frames still in flight are skipped
    async fn teardown<T: MessageTransport>(&self, transport: &mut T, url: &str, session: &str) -> Result<()> {
        let limit = self.timeouts.teardown();
        let teardown = ControlRequest::Teardown { url, session };

        let acknowledged = async {
            send(transport, &teardown).await?;
            loop {
                match transport.receive().await? {
                    Incoming::Binary(data) if data.starts_with(SUCCESS_STATUS.as_bytes()) => {
                        return Ok(());
                    }
                    Incoming::Closed => return Err(LinkError::RemoteClosed),
                    _ => continue,
                }
            }
        };

        match tokio::time::timeout(limit, acknowledged).await {
            Ok(result) => {
                result?;
                debug!("Teardown of session {} acknowledged", session);
                Ok(())
            }
            Err(_) => Err(LinkError::protocol(format!(
                "TEARDOWN of session {session} not acknowledged within {limit:?}"
            ))),
        }
    }

    /// Time-limited and abortable by the link stop signal
    async fn abortable<F, R>(&self, phase: &'static str, limit: Duration, operation: F) -> Result<R>
    where
        F: Future<Output = Result<R>>,
    {
        tokio::select! {
            biased;
            _ = self.context.stop.cancelled() => Err(LinkError::cancelled(phase)),
            result = timed(phase, limit, operation) => result,
        }
    }
}

async fn timed<F, R>(phase: &'static str, limit: Duration, operation: F) -> Result<R>
where
    F: Future<Output = Result<R>>,
{
    tokio::time::timeout(limit, operation).await.map_err(|_| LinkError::timeout(phase, limit))?
}

async fn send<T: MessageTransport>(transport: &mut T, request: &ControlRequest<'_>) -> Result<()> {
    debug!("Sending {}", request.method());
    trace!("{}", request);
    transport.send_text(&request.to_string()).await
}

/// Send a request and return the next binary message as text
async fn request<T: MessageTransport>(transport: &mut T, request: ControlRequest<'_>) -> Result<String> {
    send(transport, &request).await?;
    loop {
        match transport.receive().await? {
            Incoming::Binary(data) => {
                let reply = String::from_utf8_lossy(&data).into_owned();
                debug!("{} reply: {}", request.method(), reply.lines().next().unwrap_or_default());
                return Ok(reply);
            }
            Incoming::Other => continue,
            Incoming::Closed => return Err(LinkError::RemoteClosed),
        }
    }
}
