//! Probe transports
//!
//! A transport performs one raw attempt against an address. Platforms that
//! can issue ICMP echoes or do-not-fragment frames provide their own
//! implementation; [`TcpTransport`] covers connect timing everywhere.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};
use tracing::debug;

/// Result of a connect or echo attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Endpoint answered. `rtt` is set when the transport measured the round
    /// trip itself (e.g. parsed from an echo reply); otherwise the prober
    /// uses its own wall clock.
    Reached {
        /// Round trip reported by the transport
        rtt: Option<Duration>,
    },
    /// Endpoint actively refused
    Refused,
    /// Network or host unreachable
    Unreachable,
    /// Name did not resolve
    Unresolvable,
    /// No answer within the timeout
    TimedOut,
}

/// Result of a framed echo sent with the do-not-fragment directive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramedEchoOutcome {
    /// Frame came back intact
    Acked {
        /// Round trip reported by the transport
        rtt: Option<Duration>,
    },
    /// Path rejected the frame as too large
    Fragmented,
    /// No acknowledgement within the timeout
    Dropped,
    /// Name did not resolve
    Unresolvable,
}

/// Raw measurement capability injected into the engine
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    /// Transport name for logs
    fn name(&self) -> &'static str;

    /// Attempt a transport-layer handshake with `address`
    async fn connect(&self, address: &str, timeout: Duration) -> AttemptOutcome;

    /// Echo round trip. Transports without ICMP access time a handshake, so
    /// the default needs a `host:port` address.
    async fn echo(&self, address: &str, timeout: Duration) -> AttemptOutcome {
        self.connect(address, timeout).await
    }

    /// Send `payload_size` bytes to `address`, optionally forbidding
    /// fragmentation on the way.
    async fn framed_echo(
        &self,
        address: &str,
        payload_size: usize,
        timeout: Duration,
        dont_fragment: bool,
    ) -> FramedEchoOutcome {
        debug!(
            transport = self.name(),
            address,
            payload_size,
            dont_fragment,
            ?timeout,
            "framed echo not supported, reporting drop"
        );
        FramedEchoOutcome::Dropped
    }
}

/// Port used for echo timing when the address carries none
pub const DEFAULT_ECHO_PORT: u16 = 443;

/// TCP connect timing over tokio sockets.
///
/// Echo is approximated by a handshake. Route targets are usually bare hosts,
/// so echo appends [`DEFAULT_ECHO_PORT`] (or the port set with
/// [`with_echo_port`](Self::with_echo_port)) when the address has no port.
#[derive(Debug, Clone, Copy)]
pub struct TcpTransport {
    echo_port: u16,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self {
            echo_port: DEFAULT_ECHO_PORT,
        }
    }
}

impl TcpTransport {
    /// Create transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Port used for echoes to port-less addresses
    pub fn with_echo_port(mut self, port: u16) -> Self {
        self.echo_port = port;
        self
    }

    async fn handshake(address: &str) -> AttemptOutcome {
        let addrs = match lookup_host(address).await {
            Ok(addrs) => addrs.collect::<Vec<_>>(),
            Err(e) => {
                debug!(address, error = %e, "address did not resolve");
                return AttemptOutcome::Unresolvable;
            }
        };

        let Some(addr) = addrs.first() else {
            return AttemptOutcome::Unresolvable;
        };

        match TcpStream::connect(addr).await {
            Ok(_) => AttemptOutcome::Reached { rtt: None },
            Err(e) if e.kind() == ErrorKind::ConnectionRefused => AttemptOutcome::Refused,
            Err(e) if e.kind() == ErrorKind::TimedOut => AttemptOutcome::TimedOut,
            Err(e) => {
                debug!(address, error = %e, "connect failed");
                AttemptOutcome::Unreachable
            }
        }
    }
}

/// `address` unchanged when it already names a port, else with `port` added
pub(crate) fn with_default_port(address: &str, port: u16) -> String {
    if let Ok(ip) = address.parse::<IpAddr>() {
        return SocketAddr::new(ip, port).to_string();
    }
    let has_port = address
        .rsplit_once(':')
        .map_or(false, |(_, p)| p.parse::<u16>().is_ok());
    if has_port {
        address.to_string()
    } else {
        format!("{}:{}", address, port)
    }
}

#[async_trait]
impl ProbeTransport for TcpTransport {
    fn name(&self) -> &'static str {
        "tcp"
    }

    async fn connect(&self, address: &str, timeout: Duration) -> AttemptOutcome {
        tokio::time::timeout(timeout, Self::handshake(address))
            .await
            .unwrap_or(AttemptOutcome::TimedOut)
    }

    async fn echo(&self, address: &str, timeout: Duration) -> AttemptOutcome {
        self.connect(&with_default_port(address, self.echo_port), timeout)
            .await
    }
}
