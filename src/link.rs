//! Handle to a running link

use futures::stream::{BoxStream, Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{ReceiverStream, WatchStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::buffer::LinkBuffers;
use crate::config::LinkConfig;
use crate::session::{SessionContext, SessionState};
use crate::stream::ThrottleExt;
use crate::supervisor::ConnectionSupervisor;
use crate::transport::{Connector, WsConnector};
use crate::types::{DecodedFrame, EyeStateSample, EyelidSample, GazeSample, UpdateRate};
use crate::{LinkError, Result};

/// Running link to one Neon device
///
/// Owns the background task that discovers the device, streams telemetry into the
/// sample buffers and reconnects. Sample accessors never block on the network and may
/// be called from any thread. Dropping the handle stops the link.
pub struct NeonLink {
    buffers: Arc<LinkBuffers>,
    samples: Option<mpsc::Receiver<DecodedFrame>>,
    state: watch::Receiver<SessionState>,
    stop: CancellationToken,
    task: Option<JoinHandle<Result<()>>>,
}

impl NeonLink {
    /// Start a link over WebSocket
    ///
    /// Must be called within a Tokio runtime.
    pub fn spawn(config: LinkConfig) -> Result<Self> {
        Self::spawn_with(config, WsConnector)
    }

    /// Start a link with a custom transport connector
    pub fn spawn_with<C: Connector>(config: LinkConfig, connector: C) -> Result<Self> {
        config.validate()?;

        let buffers = Arc::new(LinkBuffers::new(&config.buffers)?);
        let (samples_tx, samples_rx) = mpsc::channel(config.sample_queue_capacity);
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);
        let stop = CancellationToken::new();

        let context = SessionContext {
            buffers: Arc::clone(&buffers),
            samples: Some(samples_tx),
            state: state_tx,
            stop: stop.clone(),
        };

        info!(
            "Starting link (autoIp: {}, fallback {}:{})",
            config.rtsp_settings.auto_ip, config.rtsp_settings.ip, config.rtsp_settings.port
        );
        let supervisor = ConnectionSupervisor::new(config, connector, context);
        let task = tokio::spawn(supervisor.run());

        Ok(Self { buffers, samples: Some(samples_rx), state: state_rx, stop, task: Some(task) })
    }

    /// Latest gaze point in scene-camera pixels
    pub fn gaze_point(&self) -> GazeSample {
        self.buffers.gaze.read_latest()
    }

    /// Gaze point averaged over the smoothing window
    pub fn smooth_gaze_point(&self) -> GazeSample {
        self.buffers.gaze.read_mean()
    }

    pub fn eye_state(&self) -> EyeStateSample {
        self.buffers.eye_state.read_latest()
    }

    pub fn smooth_eye_state(&self) -> EyeStateSample {
        self.buffers.eye_state.read_mean()
    }

    pub fn eyelid(&self) -> EyelidSample {
        self.buffers.eyelid.read_latest()
    }

    pub fn smooth_eyelid(&self) -> EyelidSample {
        self.buffers.eyelid.read_mean()
    }

    /// Whether the most recent frame carried eye state
    pub fn eye_state_available(&self) -> bool {
        self.buffers.eye_state_available()
    }

    /// Whether the most recent frame carried eyelid data
    pub fn eyelid_available(&self) -> bool {
        self.buffers.eyelid_available()
    }

    pub fn buffers(&self) -> &Arc<LinkBuffers> {
        &self.buffers
    }

    /// Take the decoded-frame stream
    ///
    /// The queue has a single consumer: the first call returns the stream, later calls
    /// return `None`. Frames decoded while the queue is full are dropped (the buffers
    /// still see them). Throttled rates require a Tokio runtime.
    pub fn samples(&mut self, rate: UpdateRate) -> Option<BoxStream<'static, DecodedFrame>> {
        let frames = ReceiverStream::new(self.samples.take()?);
        Some(match rate.throttle_interval(UpdateRate::DEVICE_HZ) {
            None => frames.boxed(),
            Some(period) => frames.throttle(period).boxed(),
        })
    }

    /// Current link state
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Current state, then every change
    pub fn state_updates(&self) -> impl Stream<Item = SessionState> + 'static {
        WatchStream::new(self.state.clone())
    }

    /// Wait until the link reaches `target`; `false` if the link ended first
    pub async fn wait_for_state(&self, target: SessionState) -> bool {
        let mut state = self.state.clone();
        state.wait_for(|current| *current == target).await.is_ok()
    }

    /// Request shutdown; safe to call any number of times
    pub fn stop(&self) {
        if !self.stop.is_cancelled() {
            info!("Stopping link");
        }
        self.stop.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Wait for the background task to finish
    ///
    /// Returns the error that ended the link, if any. Does not stop the link by itself.
    pub async fn join(mut self) -> Result<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        match task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(LinkError::cancelled("link task")),
            Err(e) => Err(LinkError::transport_with_source("link task panicked", Box::new(e))),
        }
    }
}

impl Drop for NeonLink {
    fn drop(&mut self) {
        debug!("Dropping link handle");
        self.stop.cancel();
    }
}
