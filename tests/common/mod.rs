//! In-process stand-ins for a Neon Companion device

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use std::net::Ipv4Addr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

pub const SESSION_ID: &str = "1185d20035702ca";

/// Telemetry frame with gaze and, for 77/101-byte kinds, constant raw values
pub fn frame(len: usize, x: f32, y: f32, raw: f32) -> Vec<u8> {
    let mut frame = vec![0u8; len];
    frame[0] = 0x80;
    frame[1] = 0x80 | 99;
    frame[12..16].copy_from_slice(&x.to_be_bytes());
    frame[16..20].copy_from_slice(&y.to_be_bytes());
    let mut offset = 21;
    while offset + 4 <= len && len >= 77 {
        frame[offset..offset + 4].copy_from_slice(&raw.to_be_bytes());
        offset += 4;
    }
    frame
}

/// How the fake device behaves on each connection
#[derive(Clone)]
pub struct DeviceScript {
    pub frames: Vec<Vec<u8>>,
    /// Close the WebSocket right after the last frame
    pub close_after_frames: bool,
    /// Connections to accept before the device task ends
    pub connections: usize,
}

/// Control requests received, one list per connection
pub type DeviceLog = Vec<Vec<String>>;

/// Serve the control tunnel on an ephemeral loopback port
pub async fn spawn_device(script: DeviceScript) -> anyhow::Result<(u16, JoinHandle<anyhow::Result<DeviceLog>>)> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
    let port = listener.local_addr()?.port();

    let task = tokio::spawn(async move {
        let mut log = Vec::new();
        for _ in 0..script.connections {
            let (stream, _) = listener.accept().await?;
            let mut ws = tokio_tungstenite::accept_async(stream).await?;
            let mut requests = Vec::new();

            while let Some(message) = ws.next().await {
                let data = match message {
                    Ok(Message::Binary(data)) => data,
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => continue,
                };
                let request = String::from_utf8_lossy(&data).into_owned();
                let method = request.split(' ').next().unwrap_or_default().to_string();
                requests.push(request);

                match method.as_str() {
                    "DESCRIBE" => {
                        let reply = "RTSP/1.0 200 OK\r\nCSeq: 1\r\nContent-Type: application/sdp\r\n\r\nv=0\r\nm=application 0 RTP/AVP 99\r\n";
                        ws.send(Message::binary(reply.as_bytes().to_vec())).await?;
                    }
                    "SETUP" => {
                        let reply = format!("RTSP/1.0 200 OK\r\nCSeq: 2\r\nSession: {SESSION_ID};timeout=60\r\n\r\n");
                        ws.send(Message::binary(reply.into_bytes())).await?;
                    }
                    "PLAY" => {
                        let reply = format!("RTSP/1.0 200 OK\r\nCSeq: 3\r\nSession: {SESSION_ID}\r\n\r\n");
                        ws.send(Message::binary(reply.into_bytes())).await?;
                        for frame in &script.frames {
                            ws.send(Message::binary(frame.clone())).await?;
                        }
                        if script.close_after_frames {
                            ws.close(None).await?;
                        }
                    }
                    "TEARDOWN" => {
                        ws.send(Message::binary(b"RTSP/1.0 200 OK\r\nCSeq: 4\r\n\r\n".to_vec())).await?;
                    }
                    _ => {}
                }
            }
            log.push(requests);
        }
        Ok(log)
    });

    Ok((port, task))
}

pub fn methods(requests: &[String]) -> Vec<&str> {
    requests.iter().filter_map(|request| request.split(' ').next()).collect()
}

/// Minimal mDNS response with optional TXT owner and an A record
pub fn mdns_response(txt_owner: Option<&str>, address: Ipv4Addr) -> Vec<u8> {
    let mut records = Vec::new();
    let mut count = 0u16;
    if let Some(owner) = txt_owner {
        records.extend(record(owner, 16, &[0]));
        count += 1;
    }
    records.extend(record("neon.local", 1, &address.octets()));
    count += 1;

    let mut packet = vec![0, 0, 0x84, 0, 0, 0];
    packet.extend_from_slice(&count.to_be_bytes());
    packet.extend_from_slice(&[0, 0, 0, 0]);
    packet.extend(records);
    packet
}

fn record(owner: &str, kind: u16, rdata: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for label in owner.split('.') {
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);
    out.extend_from_slice(&kind.to_be_bytes());
    out.extend_from_slice(&[0x80, 0x01, 0, 0, 0, 120]);
    out.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
    out.extend_from_slice(rdata);
    out
}

/// One-shot HTTP server answering every request with `body`
pub async fn spawn_status_server(body: &'static str) -> anyhow::Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
    let port = listener.local_addr()?.port();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let mut request = [0u8; 1024];
            let _ = stream.read(&mut request).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
        }
    });
    Ok(port)
}
