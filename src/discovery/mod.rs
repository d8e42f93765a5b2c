//! Multicast device discovery
//!
//! [`ServiceDiscovery`] finds a Companion device on the local network by sending a
//! fixed mDNS query from every non-loopback IPv4 interface and evaluating replies
//! until one identifies the device:
//!
//! - a TXT record owned by `PI monitor:<device name>:<id>` names the device and is
//!   accepted when the name matches the target (an empty target matches any);
//! - an address without a name is confirmed by probing the device's HTTP status
//!   endpoint.
//!
//! The discovery socket lives for exactly one interface scan. [`ServiceDiscovery::abort`]
//! (or cancelling the parent stop token) drops it mid-receive, and the scan then
//! reports "not found" rather than an error.

pub mod packet;
mod probe;

pub use packet::{DISCOVERY_QUERY, Verdict, device_name, name_matches};
pub use probe::STATUS_OK_PREFIX;

use std::net::{IpAddr, Ipv4Addr};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::DiscoverySettings;
use crate::{LinkError, Result};

/// Largest response read; larger datagrams are truncated and fail to parse
const RECEIVE_BUFFER_LEN: usize = 4096;

/// Finds a device by multicast query
pub struct ServiceDiscovery {
    settings: DiscoverySettings,
    local_port: u16,
    client: reqwest::Client,
    abort: CancellationToken,
}

impl ServiceDiscovery {
    /// `local_port` is the port the discovery socket binds on each interface, 0 for
    /// an ephemeral port. The scan is aborted when `stop` is cancelled.
    pub fn new(settings: DiscoverySettings, local_port: u16, stop: &CancellationToken) -> Result<Self> {
        let client = probe::client(settings.probe_timeout())?;
        Ok(Self { settings, local_port, client, abort: stop.child_token() })
    }

    /// Abort any scan in progress and every later one
    pub fn abort(&self) {
        self.abort.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_cancelled()
    }

    /// Scan every local interface for a device named `target`
    ///
    /// Interfaces whose socket cannot be bound or written are skipped.
    pub async fn discover(&self, target: &str, try_count: u32) -> Result<Option<Ipv4Addr>> {
        let interfaces = local_ipv4_addresses()?;
        if interfaces.is_empty() {
            warn!("No IPv4 interface available for discovery");
        }

        for local in interfaces {
            if self.is_aborted() {
                break;
            }
            match self.discover_on(local, target, try_count).await {
                Ok(Some(address)) => {
                    info!("Discovered device at {} via {}", address, local);
                    return Ok(Some(address));
                }
                Ok(None) => debug!("No device found via {}", local),
                Err(e) => warn!("Discovery via {} failed: {}", local, e),
            }
        }
        Ok(None)
    }

    /// Scan from one local interface address
    pub async fn discover_on(&self, local: Ipv4Addr, target: &str, try_count: u32) -> Result<Option<Ipv4Addr>> {
        if self.is_aborted() {
            return Ok(None);
        }

        let socket = UdpSocket::bind((local, self.local_port))
            .await
            .map_err(|e| LinkError::discovery(format!("binding {}:{}", local, self.local_port), e))?;

        tokio::select! {
            biased;
            _ = self.abort.cancelled() => {
                debug!("Discovery on {} aborted", local);
                Ok(None)
            }
            found = self.query_rounds(&socket, target, try_count) => found,
        }
    }

    async fn query_rounds(&self, socket: &UdpSocket, target: &str, try_count: u32) -> Result<Option<Ipv4Addr>> {
        let mut buffer = vec![0u8; RECEIVE_BUFFER_LEN];
        let receive_timeout = self.settings.receive_timeout();

        for round in 1..=try_count {
            socket
                .send_to(&DISCOVERY_QUERY, self.settings.multicast_group)
                .await
                .map_err(|e| LinkError::discovery("sending discovery query", e))?;
            debug!("Waiting for discovery responses {}/{}", round, try_count);

            loop {
                let (len, from) = match tokio::time::timeout(receive_timeout, socket.recv_from(&mut buffer)).await {
                    Err(_) => {
                        debug!("No device responded within {:?}", receive_timeout);
                        break;
                    }
                    Ok(Err(e)) => {
                        debug!("Discovery receive failed: {}", e);
                        break;
                    }
                    Ok(Ok(received)) => received,
                };

                let Some(records) = packet::parse_response(&buffer[..len]) else {
                    trace!("Ignoring malformed response from {}", from);
                    continue;
                };
                match packet::evaluate(&records, target) {
                    Verdict::Accept(address) => return Ok(Some(address)),
                    Verdict::Probe(address) => {
                        if probe::is_companion(&self.client, address, self.settings.probe_port).await {
                            return Ok(Some(address));
                        }
                    }
                    Verdict::Skip => trace!("Response from {} does not identify the device", from),
                }
            }
        }
        Ok(None)
    }
}

/// Non-loopback IPv4 addresses of local interfaces
pub fn local_ipv4_addresses() -> Result<Vec<Ipv4Addr>> {
    let interfaces = if_addrs::get_if_addrs()
        .map_err(|e| LinkError::discovery("listing network interfaces", e))?;
    Ok(interfaces
        .into_iter()
        .filter(|interface| !interface.is_loopback())
        .filter_map(|interface| match interface.ip() {
            IpAddr::V4(address) => Some(address),
            IpAddr::V6(_) => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MdnsResponseBuilder;
    use std::net::SocketAddrV4;
    use std::time::{Duration, Instant};

    fn settings_for(responder: SocketAddrV4, receive_timeout_ms: u64) -> DiscoverySettings {
        DiscoverySettings {
            multicast_group: responder,
            receive_timeout_ms,
            probe_timeout_ms: 200,
            ..DiscoverySettings::default()
        }
    }

    async fn responder() -> (UdpSocket, SocketAddrV4) {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let address = match socket.local_addr().unwrap() {
            std::net::SocketAddr::V4(address) => address,
            other => panic!("unexpected responder address {other}"),
        };
        (socket, address)
    }

    #[test]
    fn interface_listing_excludes_loopback() {
        let addresses = local_ipv4_addresses().unwrap();
        assert!(addresses.iter().all(|address| !address.is_loopback()));
    }

    #[tokio::test]
    async fn abort_during_receive_reports_not_found() {
        let (_silent, group) = responder().await;
        let stop = CancellationToken::new();
        let discovery = ServiceDiscovery::new(settings_for(group, 5_000), 0, &stop).unwrap();

        let started = Instant::now();
        let scan = discovery.discover_on(Ipv4Addr::LOCALHOST, "", 3);
        let abort = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            discovery.abort();
        };
        let (found, ()) = tokio::join!(scan, abort);

        assert_eq!(found.unwrap(), None);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(discovery.is_aborted());
    }

    #[tokio::test]
    async fn parent_stop_aborts_discovery() {
        let (_silent, group) = responder().await;
        let stop = CancellationToken::new();
        let discovery = ServiceDiscovery::new(settings_for(group, 5_000), 0, &stop).unwrap();
        stop.cancel();

        assert!(discovery.is_aborted());
        assert_eq!(discovery.discover("", 3).await.unwrap(), None);
    }

    #[tokio::test]
    async fn silent_network_exhausts_rounds() {
        let (silent, group) = responder().await;
        let stop = CancellationToken::new();
        let discovery = ServiceDiscovery::new(settings_for(group, 50), 0, &stop).unwrap();

        let found = discovery.discover_on(Ipv4Addr::LOCALHOST, "", 2).await.unwrap();
        assert_eq!(found, None);

        let mut query = [0u8; 64];
        for _ in 0..2 {
            let (len, _) = silent.recv_from(&mut query).await.unwrap();
            assert_eq!(&query[..len], &DISCOVERY_QUERY);
        }
    }

    #[tokio::test]
    async fn mismatched_name_keeps_listening() {
        let (socket, group) = responder().await;
        let stop = CancellationToken::new();
        let discovery = ServiceDiscovery::new(settings_for(group, 500), 0, &stop).unwrap();

        tokio::spawn(async move {
            let mut query = [0u8; 64];
            let (_, asker) = socket.recv_from(&mut query).await.unwrap();
            let other = MdnsResponseBuilder::new()
                .txt("PI monitor:Other Device:0001._http._tcp.local")
                .a("other.local", Ipv4Addr::new(10, 0, 0, 1))
                .build();
            let wanted = MdnsResponseBuilder::new()
                .txt("PI monitor:Neon Companion:a95136f3._http._tcp.local")
                .a("neon.local", Ipv4Addr::new(10, 0, 0, 2))
                .build();
            socket.send_to(&other, asker).await.unwrap();
            socket.send_to(&wanted, asker).await.unwrap();
        });

        let found = discovery.discover_on(Ipv4Addr::LOCALHOST, "Neon Companion", 1).await.unwrap();
        assert_eq!(found, Some(Ipv4Addr::new(10, 0, 0, 2)));
    }

    #[tokio::test]
    async fn failed_probe_rejects_unnamed_address() {
        let (socket, group) = responder().await;
        let stop = CancellationToken::new();
        let mut settings = settings_for(group, 300);
        // Nothing listens on the probe port of a TEST-NET address
        settings.probe_port = 9;
        let discovery = ServiceDiscovery::new(settings, 0, &stop).unwrap();

        tokio::spawn(async move {
            let mut query = [0u8; 64];
            let (_, asker) = socket.recv_from(&mut query).await.unwrap();
            let unnamed = MdnsResponseBuilder::new().a("host.local", Ipv4Addr::new(192, 0, 2, 1)).build();
            socket.send_to(&unnamed, asker).await.unwrap();
        });

        let found = discovery.discover_on(Ipv4Addr::LOCALHOST, "", 1).await.unwrap();
        assert_eq!(found, None);
    }
}
