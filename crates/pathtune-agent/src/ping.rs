//! Ping-based probe transport
//!
//! Echo and do-not-fragment probes go through the system `ping` binary, with
//! its arguments chosen per platform at compile time. Connect probes use the
//! core's tokio TCP transport.

use async_trait::async_trait;
use pathtune_core::{AttemptOutcome, FramedEchoOutcome, ProbeTransport, TcpTransport};
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Transport backed by the system `ping` command
#[derive(Debug, Clone, Copy, Default)]
pub struct PingTransport {
    tcp: TcpTransport,
}

impl PingTransport {
    /// Create transport
    pub fn new() -> Self {
        Self::default()
    }

    async fn ping(
        &self,
        address: &str,
        payload: Option<usize>,
        dont_fragment: bool,
        timeout: Duration,
    ) -> FramedEchoOutcome {
        let args = ping_args(address, payload, dont_fragment, timeout);
        let output = match Command::new("ping")
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, "failed to run ping");
                return FramedEchoOutcome::Dropped;
            }
        };

        let text = format!(
            "{}\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        let outcome = classify(output.status.success(), &text);
        debug!(address, ?payload, dont_fragment, ?outcome, "ping finished");
        outcome
    }
}

#[async_trait]
impl ProbeTransport for PingTransport {
    fn name(&self) -> &'static str {
        "ping"
    }

    async fn connect(&self, address: &str, timeout: Duration) -> AttemptOutcome {
        self.tcp.connect(address, timeout).await
    }

    async fn echo(&self, address: &str, timeout: Duration) -> AttemptOutcome {
        match self.ping(address, None, false, timeout).await {
            FramedEchoOutcome::Acked { rtt } => AttemptOutcome::Reached { rtt },
            FramedEchoOutcome::Unresolvable => AttemptOutcome::Unresolvable,
            FramedEchoOutcome::Fragmented => AttemptOutcome::Unreachable,
            FramedEchoOutcome::Dropped => AttemptOutcome::TimedOut,
        }
    }

    async fn framed_echo(
        &self,
        address: &str,
        payload_size: usize,
        timeout: Duration,
        dont_fragment: bool,
    ) -> FramedEchoOutcome {
        self.ping(address, Some(payload_size), dont_fragment, timeout)
            .await
    }
}

#[cfg(target_os = "windows")]
fn ping_args(
    address: &str,
    payload: Option<usize>,
    dont_fragment: bool,
    timeout: Duration,
) -> Vec<String> {
    let mut args = vec![
        "-n".to_string(),
        "1".to_string(),
        "-w".to_string(),
        timeout.as_millis().max(1).to_string(),
    ];
    if dont_fragment {
        args.push("-f".into());
    }
    if let Some(size) = payload {
        args.push("-l".into());
        args.push(size.to_string());
    }
    args.push(address.to_string());
    args
}

#[cfg(target_os = "macos")]
fn ping_args(
    address: &str,
    payload: Option<usize>,
    dont_fragment: bool,
    timeout: Duration,
) -> Vec<String> {
    let mut args = vec![
        "-c".to_string(),
        "1".to_string(),
        "-W".to_string(),
        timeout.as_millis().max(1).to_string(),
    ];
    if dont_fragment {
        args.push("-D".into());
    }
    if let Some(size) = payload {
        args.push("-s".into());
        args.push(size.to_string());
    }
    args.push(address.to_string());
    args
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn ping_args(
    address: &str,
    payload: Option<usize>,
    dont_fragment: bool,
    timeout: Duration,
) -> Vec<String> {
    // -W takes whole seconds
    let secs = timeout.as_secs().max(1);
    let mut args = vec![
        "-c".to_string(),
        "1".to_string(),
        "-W".to_string(),
        secs.to_string(),
    ];
    if dont_fragment {
        args.push("-M".into());
        args.push("do".into());
    }
    if let Some(size) = payload {
        args.push("-s".into());
        args.push(size.to_string());
    }
    args.push(address.to_string());
    args
}

const FRAGMENTATION_MARKERS: [&str; 4] = [
    "message too long",
    "needs to be fragmented",
    "frag needed",
    "fragmentation needed",
];

const UNRESOLVABLE_MARKERS: [&str; 5] = [
    "unknown host",
    "name or service not known",
    "could not find host",
    "cannot resolve",
    "temporary failure in name resolution",
];

/// Interpret ping output
fn classify(exited_ok: bool, output: &str) -> FramedEchoOutcome {
    let lower = output.to_lowercase();
    if FRAGMENTATION_MARKERS.iter().any(|m| lower.contains(m)) {
        return FramedEchoOutcome::Fragmented;
    }
    if UNRESOLVABLE_MARKERS.iter().any(|m| lower.contains(m)) {
        return FramedEchoOutcome::Unresolvable;
    }
    // Windows exits 0 on "destination host unreachable" replies, which carry no time
    match parse_rtt(&lower) {
        Some(rtt) if exited_ok => FramedEchoOutcome::Acked { rtt: Some(rtt) },
        _ => FramedEchoOutcome::Dropped,
    }
}

fn rtt_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"time[=<]\s*(\d+(?:\.\d+)?)\s*ms").ok())
        .as_ref()
}

/// Round trip from a `time=12.3 ms` or `time<1ms` reply line
fn parse_rtt(output: &str) -> Option<Duration> {
    let caps = rtt_pattern()?.captures(output)?;
    let ms: f64 = caps.get(1)?.as_str().parse().ok()?;
    if !ms.is_finite() {
        return None;
    }
    Some(Duration::from_micros((ms * 1000.0).round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINUX_REPLY: &str = "PING 8.8.8.8 (8.8.8.8) 1444(1472) bytes of data.\n\
        1452 bytes from 8.8.8.8: icmp_seq=1 ttl=117 time=14.2 ms\n\n\
        --- 8.8.8.8 ping statistics ---\n\
        1 packets transmitted, 1 received, 0% packet loss, time 0ms";

    const WINDOWS_REPLY: &str = "Pinging 1.1.1.1 with 32 bytes of data:\r\n\
        Reply from 1.1.1.1: bytes=32 time<1ms TTL=58\r\n";

    #[test]
    fn test_rtt_pattern_compiles() {
        assert!(rtt_pattern().is_some());
    }

    #[test]
    fn test_parse_rtt() {
        assert_eq!(parse_rtt(LINUX_REPLY), Some(Duration::from_micros(14_200)));
        assert_eq!(parse_rtt(&WINDOWS_REPLY.to_lowercase()), Some(Duration::from_millis(1)));
        assert_eq!(parse_rtt("reply from 1.1.1.1: bytes=32 time=23ms ttl=58"), Some(Duration::from_millis(23)));
        assert_eq!(parse_rtt("request timed out."), None);
        // summary line has no `=`
        assert_eq!(parse_rtt("1 packets transmitted, 0 received, time 0ms"), None);
        assert_eq!(parse_rtt("64 bytes from ::1: icmp_seq=1 ttl=64 time=0.045 ms"), Some(Duration::from_micros(45)));
    }

    #[test]
    fn test_classify_reply() {
        match classify(true, LINUX_REPLY) {
            FramedEchoOutcome::Acked { rtt } => assert!(rtt.is_some()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_classify_fragmentation() {
        let linux = "ping: local error: message too long, mtu=1500";
        let windows = "Packet needs to be fragmented but DF set.";
        let bsd = "ping: sendto: Message too long";
        for text in [linux, windows, bsd] {
            assert_eq!(classify(false, text), FramedEchoOutcome::Fragmented, "{}", text);
        }
        // a reply that also reports frag needed is still a rejection
        assert_eq!(
            classify(true, "From 10.0.0.1 icmp_seq=1 Frag needed and DF set (mtu = 1400)"),
            FramedEchoOutcome::Fragmented
        );
    }

    #[test]
    fn test_classify_unresolvable_and_drops() {
        assert_eq!(
            classify(false, "ping: nohost.invalid: Name or service not known"),
            FramedEchoOutcome::Unresolvable
        );
        assert_eq!(
            classify(false, "Ping request could not find host nohost. Please check the name."),
            FramedEchoOutcome::Unresolvable
        );
        assert_eq!(
            classify(false, "1 packets transmitted, 0 received, 100% packet loss"),
            FramedEchoOutcome::Dropped
        );
        assert_eq!(
            classify(true, "Reply from 192.168.1.1: Destination host unreachable."),
            FramedEchoOutcome::Dropped
        );
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    #[test]
    fn test_linux_dont_fragment_args() {
        let args = ping_args("8.8.8.8", Some(1472), true, Duration::from_millis(1500));
        assert_eq!(args, vec!["-c", "1", "-W", "1", "-M", "do", "-s", "1472", "8.8.8.8"]);

        let plain = ping_args("1.1.1.1", None, false, Duration::from_secs(3));
        assert_eq!(plain, vec!["-c", "1", "-W", "3", "1.1.1.1"]);
    }
}
