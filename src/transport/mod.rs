//! Transport abstraction for the remote network endpoint
//!
//! A tagged-variant client (Direct-TCP or HTTP-relay), not a trait object:
//! the port configuration picks the variant once at construction and it
//! never changes for the engine's lifetime, so there's no need to pay for
//! dynamic dispatch or juggle a `Box<dyn Transport>`.

pub mod http;
pub mod tcp;

use crate::config::PortConfig;
use crate::error::Result;

/// One port's connection to its remote endpoint
pub enum TransportClient {
    Tcp(tcp::TcpClient),
    Http(http::HttpClient),
}

impl TransportClient {
    /// Build the variant selected by `config` (HTTP-relay if `http_url` is set)
    pub fn new(config: &PortConfig) -> Self {
        match &config.http_url {
            Some(url) => TransportClient::Http(http::HttpClient::new(
                url.clone(),
                config.tcp_host.clone(),
                config.tcp_port,
                config.name.clone(),
            )),
            None => {
                TransportClient::Tcp(tcp::TcpClient::new(config.tcp_host.clone(), config.tcp_port))
            }
        }
    }

    pub fn endpoint(&self) -> String {
        match self {
            TransportClient::Tcp(c) => c.endpoint(),
            TransportClient::Http(c) => c.endpoint(),
        }
    }

    /// Establish the connection. A no-op for HTTP-relay, which is stateless
    /// per-request and has nothing to keep open between messages.
    pub async fn connect(&mut self) -> Result<()> {
        match self {
            TransportClient::Tcp(c) => c.connect().await,
            TransportClient::Http(_) => Ok(()),
        }
    }

    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        match self {
            TransportClient::Tcp(c) => c.send(data).await,
            TransportClient::Http(c) => c.send(data).await,
        }
    }

    /// Liveness probe independent of a send attempt. HTTP-relay has no
    /// persistent connection to probe, so it reports alive unconditionally;
    /// failures surface on the next `send`.
    pub async fn is_alive(&mut self) -> bool {
        match self {
            TransportClient::Tcp(c) => c.is_alive().await,
            TransportClient::Http(_) => true,
        }
    }

    pub async fn close(&mut self) {
        match self {
            TransportClient::Tcp(c) => c.close().await,
            TransportClient::Http(_) => {}
        }
    }
}
