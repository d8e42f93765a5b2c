//! Test utilities: wire-format builders and a scripted in-memory transport
//!
//! Shared by unit tests and the benchmarks, so everything here is public under the
//! `benchmark` feature as well.

#![cfg(any(test, feature = "benchmark"))]

use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::codec::FRAME_TYPE_SENTINEL;
use crate::transport::{Connector, DeviceAddress, Incoming, MessageTransport};
use crate::types::FrameKind;
use crate::{LinkError, Result};

/// Builds telemetry frames in wire layout
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    kind: FrameKind,
    gaze: [f32; 2],
    eye_state: [f32; 14],
    eyelid: [f32; 6],
}

impl FrameBuilder {
    pub fn new(kind: FrameKind) -> Self {
        Self { kind, gaze: [0.0; 2], eye_state: [0.0; 14], eyelid: [0.0; 6] }
    }

    pub fn gaze(mut self, x: f32, y: f32) -> Self {
        self.gaze = [x, y];
        self
    }

    /// Raw (unscaled, Y-down) eye-state values, left eye first
    pub fn eye_state(mut self, values: [f32; 14]) -> Self {
        self.eye_state = values;
        self
    }

    /// Raw eyelid values, left eye first
    pub fn eyelid(mut self, values: [f32; 6]) -> Self {
        self.eyelid = values;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut frame = vec![0u8; self.kind.frame_len()];
        frame[0] = 0x80;
        frame[1] = 0x80 | FRAME_TYPE_SENTINEL;

        write_f32s(&mut frame, 12, &self.gaze);
        if self.kind.has_eye_state() {
            write_f32s(&mut frame, 21, &self.eye_state);
        }
        if self.kind.has_eyelid() {
            write_f32s(&mut frame, 77, &self.eyelid);
        }
        frame
    }
}

fn write_f32s(frame: &mut [u8], offset: usize, values: &[f32]) {
    for (i, value) in values.iter().enumerate() {
        let at = offset + i * 4;
        frame[at..at + 4].copy_from_slice(&value.to_be_bytes());
    }
}

/// Builds uncompressed mDNS responses
#[derive(Debug, Clone, Default)]
pub struct MdnsResponseBuilder {
    answers: Vec<Vec<u8>>,
    additional: Vec<Vec<u8>>,
}

impl MdnsResponseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn a(mut self, owner: &str, address: Ipv4Addr) -> Self {
        self.answers.push(resource_record(owner, 1, &address.octets()));
        self
    }

    pub fn txt(mut self, owner: &str) -> Self {
        self.answers.push(resource_record(owner, 16, &[0]));
        self
    }

    pub fn additional_a(mut self, owner: &str, address: Ipv4Addr) -> Self {
        self.additional.push(resource_record(owner, 1, &address.octets()));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut packet = vec![0x00, 0x00, 0x84, 0x00, 0x00, 0x00];
        packet.extend_from_slice(&(self.answers.len() as u16).to_be_bytes());
        packet.extend_from_slice(&[0x00, 0x00]);
        packet.extend_from_slice(&(self.additional.len() as u16).to_be_bytes());
        for record in self.answers.iter().chain(self.additional.iter()) {
            packet.extend_from_slice(record);
        }
        packet
    }
}

fn resource_record(owner: &str, kind: u16, rdata: &[u8]) -> Vec<u8> {
    let mut record = Vec::new();
    // Labels may contain spaces and colons; only dots separate them
    for label in owner.split('.').filter(|label| !label.is_empty()) {
        record.push(label.len() as u8);
        record.extend_from_slice(label.as_bytes());
    }
    record.push(0);
    record.extend_from_slice(&kind.to_be_bytes());
    record.extend_from_slice(&[0x80, 0x01]);
    record.extend_from_slice(&120u32.to_be_bytes());
    record.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
    record.extend_from_slice(rdata);
    record
}

/// One scripted receive result
#[derive(Debug)]
pub enum Step {
    Receive(Incoming),
    Fail(LinkError),
    /// Stay silent for a while before the next step
    Delay(Duration),
}

impl Step {
    pub fn text(text: &str) -> Self {
        Step::Receive(Incoming::Binary(text.as_bytes().to_vec()))
    }

    pub fn frame(bytes: Vec<u8>) -> Self {
        Step::Receive(Incoming::Binary(bytes))
    }

    pub fn closed() -> Self {
        Step::Receive(Incoming::Closed)
    }
}

/// Replies for a complete DESCRIBE, SETUP and PLAY exchange
pub fn handshake_replies(session_id: &str) -> Vec<Step> {
    vec![
        Step::text("RTSP/1.0 200 OK\r\nCSeq: 1\r\nContent-Type: application/sdp\r\n\r\nv=0\r\n"),
        Step::text(&format!(
            "RTSP/1.0 200 OK\r\nCSeq: 2\r\nTransport: RTP/AVP/TCP;unicast;interleaved=0-1\r\nSession: {session_id};timeout=60\r\n\r\n"
        )),
        Step::text(&format!("RTSP/1.0 200 OK\r\nCSeq: 3\r\nSession: {session_id}\r\n\r\n")),
    ]
}

pub fn teardown_reply() -> Step {
    Step::text("RTSP/1.0 200 OK\r\nCSeq: 4\r\n\r\n")
}

/// What a scripted transport observed
#[derive(Debug, Default)]
pub struct TransportLog {
    pub sent: Vec<String>,
    pub closed: bool,
}

/// In-memory transport replaying a script
///
/// Once the script is exhausted `receive` never completes, like a silent device.
pub struct ScriptedTransport {
    steps: VecDeque<Step>,
    log: Arc<Mutex<TransportLog>>,
}

impl ScriptedTransport {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> (Self, Arc<Mutex<TransportLog>>) {
        let log = Arc::new(Mutex::new(TransportLog::default()));
        (Self { steps: steps.into_iter().collect(), log: Arc::clone(&log) }, log)
    }
}

#[async_trait::async_trait]
impl MessageTransport for ScriptedTransport {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        let mut log = self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if log.closed {
            return Err(LinkError::transport("send on closed transport"));
        }
        log.sent.push(text.to_string());
        Ok(())
    }

    async fn receive(&mut self) -> Result<Incoming> {
        loop {
            match self.steps.pop_front() {
                Some(Step::Receive(incoming)) => return Ok(incoming),
                Some(Step::Fail(error)) => return Err(error),
                // Popped before sleeping, so a receive abandoned mid-delay moves on
                Some(Step::Delay(duration)) => tokio::time::sleep(duration).await,
                None => return std::future::pending().await,
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).closed = true;
        Ok(())
    }
}

/// Outcome of one scripted connection attempt
pub enum Attempt {
    Refuse(LinkError),
    /// Never completes, like an unreachable host
    Hang,
    Connect(Vec<Step>),
}

/// Connector handing out one scripted outcome per attempt
///
/// Attempts beyond the script are refused.
pub struct ScriptedConnector {
    attempts: Mutex<VecDeque<Attempt>>,
    count: Arc<AtomicUsize>,
    addresses: Arc<Mutex<Vec<DeviceAddress>>>,
    logs: Arc<Mutex<Vec<Arc<Mutex<TransportLog>>>>>,
}

/// Observation handles of a [`ScriptedConnector`]
#[derive(Clone)]
pub struct ConnectorProbe {
    count: Arc<AtomicUsize>,
    addresses: Arc<Mutex<Vec<DeviceAddress>>>,
    logs: Arc<Mutex<Vec<Arc<Mutex<TransportLog>>>>>,
}

impl ConnectorProbe {
    pub fn attempts(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn addresses(&self) -> Vec<DeviceAddress> {
        self.addresses.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    /// Sent messages of the nth established transport
    pub fn sent(&self, index: usize) -> Vec<String> {
        let logs = self.logs.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        logs.get(index)
            .map(|log| log.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).sent.clone())
            .unwrap_or_default()
    }

    pub fn closed(&self, index: usize) -> bool {
        let logs = self.logs.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        logs.get(index)
            .is_some_and(|log| log.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).closed)
    }
}

impl ScriptedConnector {
    pub fn new(attempts: impl IntoIterator<Item = Attempt>) -> (Self, ConnectorProbe) {
        let probe = ConnectorProbe {
            count: Arc::new(AtomicUsize::new(0)),
            addresses: Arc::new(Mutex::new(Vec::new())),
            logs: Arc::new(Mutex::new(Vec::new())),
        };
        let connector = Self {
            attempts: Mutex::new(attempts.into_iter().collect()),
            count: Arc::clone(&probe.count),
            addresses: Arc::clone(&probe.addresses),
            logs: Arc::clone(&probe.logs),
        };
        (connector, probe)
    }
}

#[async_trait::async_trait]
impl Connector for ScriptedConnector {
    type Transport = ScriptedTransport;

    async fn connect(&self, address: &DeviceAddress) -> Result<ScriptedTransport> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.addresses.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(address.clone());

        let attempt = self.attempts.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).pop_front();
        match attempt {
            Some(Attempt::Connect(steps)) => {
                let (transport, log) = ScriptedTransport::new(steps);
                self.logs.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(log);
                Ok(transport)
            }
            Some(Attempt::Hang) => std::future::pending().await,
            Some(Attempt::Refuse(error)) => Err(error),
            None => Err(LinkError::transport("connection refused")),
        }
    }
}
