//! HTTP status probe for responders that do not announce a device name

use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::debug;

use crate::{LinkError, Result};

/// Body prefix of a healthy Companion status endpoint
pub const STATUS_OK_PREFIX: &str = "{\"message\":\"Success\"";

pub(crate) fn client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| LinkError::transport_with_source("building status probe client", Box::new(e)))
}

pub(crate) fn status_url(address: Ipv4Addr, port: u16) -> String {
    format!("http://{address}:{port}/api/status")
}

/// Whether `address` serves the Companion status endpoint
///
/// Any failure, including the timeout, rejects the candidate.
pub(crate) async fn is_companion(client: &reqwest::Client, address: Ipv4Addr, port: u16) -> bool {
    let url = status_url(address, port);
    let body = match client.get(&url).send().await {
        Ok(response) => response.text().await,
        Err(e) => Err(e),
    };
    match body {
        Ok(body) if body.starts_with(STATUS_OK_PREFIX) => true,
        Ok(_) => {
            debug!("Status probe of {} answered without success", url);
            false
        }
        Err(e) if e.is_timeout() => {
            debug!("Status probe of {} timed out", url);
            false
        }
        Err(e) => {
            debug!("Status probe of {} failed: {}", url, e);
            false
        }
    }
}
