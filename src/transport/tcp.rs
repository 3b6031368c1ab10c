//! Direct-TCP transport variant
//!
//! Connects directly to `tcp_host:tcp_port` and writes accumulated message
//! bytes verbatim, keeping the connection open across messages. A half-open
//! socket can stay writable long after the peer vanishes, so liveness is
//! checked out-of-band with a non-destructive `MSG_PEEK` probe rather than
//! relying solely on the next write failing.

use crate::constants::{
    TCP_CONNECT_TIMEOUT_SECS, TCP_KEEPALIVE_IDLE_SECS, TCP_KEEPALIVE_INTERVAL_SECS,
};
use crate::error::{ForwarderError, Result};
use socket2::{SockRef, TcpKeepalive};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

pub struct TcpClient {
    host: String,
    port: u16,
    stream: Option<TcpStream>,
}

impl TcpClient {
    pub fn new(host: String, port: u16) -> Self {
        Self {
            host,
            port,
            stream: None,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub async fn connect(&mut self) -> Result<()> {
        let addr = self.endpoint();
        let connect = TcpStream::connect(&addr);
        let stream = tokio::time::timeout(Duration::from_secs(TCP_CONNECT_TIMEOUT_SECS), connect)
            .await
            .map_err(|_| ForwarderError::TransportConnect {
                endpoint: addr.clone(),
                reason: "connect timed out".into(),
            })?
            .map_err(|e| ForwarderError::TransportConnect {
                endpoint: addr.clone(),
                reason: e.to_string(),
            })?;

        let keepalive = TcpKeepalive::new()
            .with_time(Duration::from_secs(TCP_KEEPALIVE_IDLE_SECS))
            .with_interval(Duration::from_secs(TCP_KEEPALIVE_INTERVAL_SECS));
        SockRef::from(&stream)
            .set_tcp_keepalive(&keepalive)
            .map_err(|e| ForwarderError::TransportConnect {
                endpoint: addr.clone(),
                reason: format!("keepalive setup failed: {}", e),
            })?;

        self.stream = Some(stream);
        Ok(())
    }

    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        let addr = self.endpoint();
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| ForwarderError::TransportWrite {
                endpoint: addr.clone(),
                reason: "not connected".into(),
            })?;

        if let Err(e) = stream.write_all(data).await {
            self.stream = None;
            return Err(ForwarderError::TransportWrite {
                endpoint: addr,
                reason: e.to_string(),
            });
        }
        Ok(())
    }

    pub async fn is_alive(&mut self) -> bool {
        let alive = match self.stream.as_ref() {
            Some(stream) => peek_alive(stream),
            None => false,
        };
        if !alive {
            self.stream = None;
        }
        alive
    }

    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
    }
}

#[cfg(unix)]
fn peek_alive(stream: &TcpStream) -> bool {
    use std::os::unix::io::AsRawFd;
    let fd = stream.as_raw_fd();
    let mut buf = [0u8; 1];
    let n = unsafe {
        libc::recv(
            fd,
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len(),
            libc::MSG_PEEK | libc::MSG_DONTWAIT,
        )
    };
    if n == 0 {
        false
    } else if n > 0 {
        true
    } else {
        std::io::Error::last_os_error().kind() == std::io::ErrorKind::WouldBlock
    }
}

#[cfg(not(unix))]
fn peek_alive(_stream: &TcpStream) -> bool {
    true
}
