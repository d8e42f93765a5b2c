//! Message transport seam
//!
//! The session talks to the device through [`MessageTransport`], a full-duplex,
//! message-oriented connection. Methods take `&mut self`, so at most one send or
//! receive is ever in flight; control exchanges are strictly request-then-reply.
//! [`Connector`] opens a fresh transport for every connection attempt.

mod websocket;

pub use websocket::{WsConnector, WsTransport};

use std::fmt;
use std::net::Ipv4Addr;

use crate::Result;

/// One complete message received from the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// Binary payload: a telemetry frame or a control reply
    Binary(Vec<u8>),
    /// Any other message type, ignored by the session
    Other,
    /// The device closed the connection
    Closed,
}

/// Network location of the device for one connection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAddress {
    pub host: String,
    pub port: u16,
    /// Local port the discovery socket binds to
    pub discovery_port: u16,
}

impl DeviceAddress {
    pub fn new(host: impl Into<String>, port: u16, discovery_port: u16) -> Self {
        Self { host: host.into(), port, discovery_port }
    }

    /// Same port settings, discovered host
    pub fn with_host(&self, host: Ipv4Addr) -> Self {
        Self { host: host.to_string(), ..self.clone() }
    }

    /// WebSocket endpoint carrying the control tunnel
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }

    /// Control-protocol URL used inside requests
    pub fn control_url(&self) -> String {
        crate::protocol::control_url(&self.host, self.port)
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Full-duplex message transport to the device
#[async_trait::async_trait]
pub trait MessageTransport: Send + 'static {
    /// Send a control request as one binary message
    async fn send_text(&mut self, text: &str) -> Result<()>;

    /// Receive the next complete message, fragments already reassembled
    async fn receive(&mut self) -> Result<Incoming>;

    /// Close the connection; closing an already-closed transport succeeds
    async fn close(&mut self) -> Result<()>;
}

/// Opens transports to a device
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: MessageTransport;

    async fn connect(&self, address: &DeviceAddress) -> Result<Self::Transport>;
}
