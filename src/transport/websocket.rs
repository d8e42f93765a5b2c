//! WebSocket transport

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use super::{Connector, DeviceAddress, Incoming, MessageTransport};
use crate::Result;

/// Transport over a client WebSocket
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsTransport {
    /// Open the WebSocket endpoint of a device
    pub async fn connect(address: &DeviceAddress) -> Result<Self> {
        let url = address.ws_url();
        debug!("Opening WebSocket {}", url);
        let (stream, response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        trace!("WebSocket handshake status {}", response.status());
        Ok(Self { stream })
    }
}

#[async_trait::async_trait]
impl MessageTransport for WsTransport {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        // The device expects control requests in binary messages
        self.stream.send(Message::binary(text.as_bytes().to_vec())).await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<Incoming> {
        match self.stream.next().await {
            None => Ok(Incoming::Closed),
            Some(Err(e)) => Err(e.into()),
            Some(Ok(Message::Binary(data))) => Ok(Incoming::Binary(data.to_vec())),
            Some(Ok(Message::Close(frame))) => {
                debug!("Device sent close frame: {:?}", frame);
                Ok(Incoming::Closed)
            }
            Some(Ok(_)) => Ok(Incoming::Other),
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self.stream.close(None).await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Connector opening [`WsTransport`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait::async_trait]
impl Connector for WsConnector {
    type Transport = WsTransport;

    async fn connect(&self, address: &DeviceAddress) -> Result<WsTransport> {
        WsTransport::connect(address).await
    }
}
