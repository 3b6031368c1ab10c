//! HTTP-relay transport variant
//!
//! Wraps each accumulated message in an HTTP POST that a relay server at
//! `http_url` forwards on to `tcp_host:tcp_port`. Grounded on
//! `original_source/serial_forwarder_http.py`'s `_send_to_http`: the header
//! set, the `sum(bytes) % 256` checksum, and the `{"bytes_sent": N}` success
//! criterion are carried over unchanged. Stateless — every send is a fresh
//! request, so there's no persistent connection to keep alive between
//! messages.

use crate::constants::HTTP_REQUEST_TIMEOUT_SECS;
use crate::error::{ForwarderError, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

#[derive(Deserialize)]
struct RelayResponse {
    bytes_sent: usize,
}

pub struct HttpClient {
    url: String,
    target_host: String,
    target_port: u16,
    source_port: String,
    client: Client,
}

impl HttpClient {
    pub fn new(url: String, target_host: String, target_port: u16, source_port: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
            .build()
            .expect("reqwest client builder has no fallible options set here");
        Self {
            url,
            target_host,
            target_port,
            source_port,
            client,
        }
    }

    pub fn endpoint(&self) -> String {
        self.url.clone()
    }

    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        let checksum: u32 = data.iter().map(|&b| b as u32).sum::<u32>() % 256;

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/octet-stream")
            .header("X-TCP-Host", &self.target_host)
            .header("X-TCP-Port", self.target_port.to_string())
            .header("X-Source-Port", &self.source_port)
            .header("X-Data-Length", data.len().to_string())
            .header("X-Data-Checksum", checksum.to_string())
            .body(data.to_vec())
            .send()
            .await
            .map_err(|e| ForwarderError::TransportConnect {
                endpoint: self.url.clone(),
                reason: e.to_string(),
            })?;

        // `original_source/serial_forwarder_http.py:253` treats exactly 200
        // as success; any other status (including other 2xx) is a failure.
        if response.status() != reqwest::StatusCode::OK {
            return Err(ForwarderError::TransportProtocol {
                endpoint: self.url.clone(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let body: RelayResponse =
            response
                .json()
                .await
                .map_err(|e| ForwarderError::TransportProtocol {
                    endpoint: self.url.clone(),
                    reason: format!("malformed response body: {}", e),
                })?;

        if body.bytes_sent != data.len() {
            return Err(ForwarderError::TransportProtocol {
                endpoint: self.url.clone(),
                reason: format!(
                    "relay acked {} bytes, sent {}",
                    body.bytes_sent,
                    data.len()
                ),
            });
        }

        Ok(())
    }
}
