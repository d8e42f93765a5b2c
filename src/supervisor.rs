//! Retry loop around discovery and telemetry sessions

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::LinkConfig;
use crate::discovery::ServiceDiscovery;
use crate::session::{SessionContext, SessionState, TelemetrySession};
use crate::transport::{Connector, DeviceAddress};
use crate::Result;

/// Drives connection attempts until stopped
///
/// Each attempt resolves the device address (multicast discovery when `autoIp` is set,
/// falling back to the configured address), then runs one [`TelemetrySession`].
/// Between attempts it waits the reconnect delay. With auto-reconnect disabled it
/// makes exactly one attempt. Errors that are not retryable end the loop.
pub struct ConnectionSupervisor<C: Connector> {
    config: LinkConfig,
    connector: C,
    context: SessionContext,
}

impl<C: Connector> ConnectionSupervisor<C> {
    pub fn new(config: LinkConfig, connector: C, context: SessionContext) -> Self {
        Self { config, connector, context }
    }

    pub fn stop_token(&self) -> CancellationToken {
        self.context.stop.clone()
    }

    /// Run until stopped, until the single attempt ends, or until a fatal error
    pub async fn run(self) -> Result<()> {
        info!("Link supervisor started");
        let stop = &self.context.stop;
        let fallback = self.config.device_address();
        let mut attempt = 0u64;

        let result = loop {
            if stop.is_cancelled() {
                break Ok(());
            }
            attempt += 1;

            let address = self.resolve_address(&fallback).await;
            if stop.is_cancelled() {
                break Ok(());
            }

            info!("Attempt {} connecting to {}", attempt, address);
            let session = TelemetrySession::new(&self.context, address, self.config.timeouts);
            match session.run(&self.connector).await {
                Ok(outcome) => info!(
                    "Attempt {} ended ({:?}, {} frames, torn down: {})",
                    attempt, outcome.end, outcome.frames, outcome.torn_down
                ),
                Err(e) if e.is_retryable() => warn!("Attempt {} failed: {}", attempt, e),
                Err(e) => {
                    error!("Attempt {} failed fatally: {}", attempt, e);
                    break Err(e);
                }
            }

            if !self.config.auto_reconnect {
                debug!("Auto-reconnect disabled");
                break Ok(());
            }

            let delay = self.config.reconnect_delay();
            info!("Reconnecting in {:?}", delay);
            tokio::select! {
                _ = stop.cancelled() => break Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        };

        self.context.set_state(SessionState::Disconnected);
        info!("Link supervisor ended after {} attempts", attempt);
        result
    }

    /// Discovered address for this attempt, or the configured one
    async fn resolve_address(&self, fallback: &DeviceAddress) -> DeviceAddress {
        let settings = &self.config.rtsp_settings;
        if !settings.auto_ip {
            return fallback.clone();
        }

        self.context.set_state(SessionState::Discovering);
        let discovery =
            match ServiceDiscovery::new(self.config.discovery.clone(), fallback.discovery_port, &self.context.stop) {
                Ok(discovery) => discovery,
                Err(e) => {
                    warn!("Discovery unavailable, using {}: {}", fallback, e);
                    return fallback.clone();
                }
            };

        match discovery.discover(&settings.device_name, self.config.discovery.try_count).await {
            Ok(Some(host)) => fallback.with_host(host),
            Ok(None) => {
                info!("No device discovered, using configured address {}", fallback);
                fallback.clone()
            }
            Err(e) => {
                warn!("Discovery failed, using {}: {}", fallback, e);
                fallback.clone()
            }
        }
    }
}
