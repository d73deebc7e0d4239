//! Single bounded probe

use crate::{
    error::{EngineError, EngineResult},
    stats::LatencyStats,
    transport::{AttemptOutcome, FramedEchoOutcome, ProbeTransport},
    Candidate,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// IPv4 header (20) plus ICMP echo header (8)
pub const ECHO_HEADER_OVERHEAD: u16 = 28;

/// What a probe measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeMode {
    /// Transport handshake timing
    Connect,
    /// Echo round trip
    Echo,
    /// Do-not-fragment echo of a frame of the given size in bytes
    MtuEcho(u16),
}

/// Outcome of one probe
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// Reached the target
    Success {
        /// Measured latency, never negative
        latency_ms: f64,
    },
    /// No answer in time, or abandoned at the round deadline
    Timeout,
    /// Target refused the connection
    ConnectionRefused,
    /// Network or host unreachable
    Unreachable,
    /// Target name did not resolve
    Unresolvable,
    /// Do-not-fragment frame rejected as too large
    Fragmented,
}

impl ProbeOutcome {
    /// Whether this is a success
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Latency for successes
    #[inline]
    pub fn latency_ms(&self) -> Option<f64> {
        match self {
            Self::Success { latency_ms } => Some(*latency_ms),
            _ => None,
        }
    }
}

/// Probe result, immutable once produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Probed candidate, `last_latency_ms` reflecting this outcome
    pub candidate: Candidate,
    /// Outcome
    pub outcome: ProbeOutcome,
}

impl ProbeResult {
    /// Create result and stamp the candidate with its latency
    pub fn new(mut candidate: Candidate, outcome: ProbeOutcome) -> Self {
        candidate.last_latency_ms = outcome.latency_ms();
        Self { candidate, outcome }
    }

    /// Whether the probe succeeded
    #[inline]
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Latency for successes
    #[inline]
    pub fn latency_ms(&self) -> Option<f64> {
        self.outcome.latency_ms()
    }
}

/// Runs single probes through an injected transport
#[derive(Clone)]
pub struct Prober {
    transport: Arc<dyn ProbeTransport>,
}

impl Prober {
    /// Create prober over a transport
    pub fn new(transport: Arc<dyn ProbeTransport>) -> Self {
        Self { transport }
    }

    /// Transport name
    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Probe one candidate.
    ///
    /// Returns `InvalidArgument` for a zero timeout or an MTU frame too small
    /// to carry the echo headers. Every network failure is an outcome.
    pub async fn probe(
        &self,
        candidate: &Candidate,
        mode: ProbeMode,
        timeout: Duration,
    ) -> EngineResult<ProbeResult> {
        validate_timeout(timeout)?;
        validate_mode(mode)?;
        Ok(self.measure(candidate, mode, timeout).await)
    }

    /// Probe the same candidate `count` times in sequence and summarise
    pub async fn sample(
        &self,
        candidate: &Candidate,
        mode: ProbeMode,
        timeout: Duration,
        count: u32,
    ) -> EngineResult<LatencyStats> {
        validate_timeout(timeout)?;
        validate_mode(mode)?;
        if count == 0 {
            return Err(EngineError::invalid("sample count must be at least 1"));
        }

        let mut results = Vec::with_capacity(count as usize);
        for _ in 0..count {
            results.push(self.measure(candidate, mode, timeout).await);
        }
        Ok(LatencyStats::from_results(&results))
    }

    /// Probe with arguments already validated. Never exceeds `timeout`.
    pub(crate) async fn measure(
        &self,
        candidate: &Candidate,
        mode: ProbeMode,
        timeout: Duration,
    ) -> ProbeResult {
        let outcome = tokio::time::timeout(timeout, self.attempt(&candidate.address, mode, timeout))
            .await
            .unwrap_or(ProbeOutcome::Timeout);

        debug!(
            candidate = %candidate.name,
            address = %candidate.address,
            ?mode,
            ?outcome,
            "probe finished"
        );

        ProbeResult::new(candidate.clone(), outcome)
    }

    async fn attempt(&self, address: &str, mode: ProbeMode, timeout: Duration) -> ProbeOutcome {
        let start = Instant::now();
        match mode {
            ProbeMode::Connect => {
                let attempt = self.transport.connect(address, timeout).await;
                from_attempt(attempt, start)
            }
            ProbeMode::Echo => {
                let attempt = self.transport.echo(address, timeout).await;
                from_attempt(attempt, start)
            }
            ProbeMode::MtuEcho(size) => {
                let payload = usize::from(size - ECHO_HEADER_OVERHEAD);
                match self.transport.framed_echo(address, payload, timeout, true).await {
                    FramedEchoOutcome::Acked { rtt } => success(rtt, start),
                    FramedEchoOutcome::Fragmented => ProbeOutcome::Fragmented,
                    // a silent drop is indistinguishable from fragmentation
                    FramedEchoOutcome::Dropped => ProbeOutcome::Timeout,
                    FramedEchoOutcome::Unresolvable => ProbeOutcome::Unresolvable,
                }
            }
        }
    }
}

fn from_attempt(attempt: AttemptOutcome, start: Instant) -> ProbeOutcome {
    match attempt {
        AttemptOutcome::Reached { rtt } => success(rtt, start),
        AttemptOutcome::Refused => ProbeOutcome::ConnectionRefused,
        AttemptOutcome::Unreachable => ProbeOutcome::Unreachable,
        AttemptOutcome::Unresolvable => ProbeOutcome::Unresolvable,
        AttemptOutcome::TimedOut => ProbeOutcome::Timeout,
    }
}

fn success(rtt: Option<Duration>, start: Instant) -> ProbeOutcome {
    let elapsed = rtt.unwrap_or_else(|| start.elapsed());
    ProbeOutcome::Success {
        latency_ms: elapsed.as_secs_f64() * 1000.0,
    }
}

pub(crate) fn validate_timeout(timeout: Duration) -> EngineResult<()> {
    if timeout.is_zero() {
        return Err(EngineError::invalid("probe timeout must be positive"));
    }
    Ok(())
}

pub(crate) fn validate_mode(mode: ProbeMode) -> EngineResult<()> {
    if let ProbeMode::MtuEcho(size) = mode {
        if size <= ECHO_HEADER_OVERHEAD {
            return Err(EngineError::invalid(format!(
                "MTU probe size {} does not exceed the {} byte echo header",
                size, ECHO_HEADER_OVERHEAD
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;

    fn prober(transport: ScriptedTransport) -> Prober {
        Prober::new(Arc::new(transport))
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_latency_is_wall_clock() {
        let p = prober(ScriptedTransport::new().reach("a:53", 40));
        let result = p
            .probe(&Candidate::new("a", "a:53"), ProbeMode::Connect, Duration::from_secs(2))
            .await
            .unwrap();

        let latency = result.latency_ms().unwrap();
        assert!((latency - 40.0).abs() < 1.0, "latency {}", latency);
        assert_eq!(result.candidate.last_latency_ms, Some(latency));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_rtt_preferred() {
        let p = prober(ScriptedTransport::new().reach_with_rtt("a", 300, 12));
        let result = p
            .probe(&Candidate::new("a", "a"), ProbeMode::Echo, Duration::from_secs(2))
            .await
            .unwrap();
        assert!((result.latency_ms().unwrap() - 12.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_transport_bounded_by_timeout() {
        let p = prober(ScriptedTransport::new().hang("slow:80"));
        let start = Instant::now();
        let result = p
            .probe(&Candidate::new("slow", "slow:80"), ProbeMode::Connect, Duration::from_millis(250))
            .await
            .unwrap();

        assert_eq!(result.outcome, ProbeOutcome::Timeout);
        assert!(start.elapsed() < Duration::from_millis(260));
        assert!(!result.candidate.is_reachable());
    }

    #[tokio::test]
    async fn test_failures_map_to_outcomes() {
        let p = prober(
            ScriptedTransport::new()
                .refuse("refused:53")
                .unreachable("down:53"),
        );
        let t = Duration::from_secs(1);

        let refused = p.probe(&Candidate::new("r", "refused:53"), ProbeMode::Connect, t).await.unwrap();
        assert_eq!(refused.outcome, ProbeOutcome::ConnectionRefused);

        let down = p.probe(&Candidate::new("d", "down:53"), ProbeMode::Connect, t).await.unwrap();
        assert_eq!(down.outcome, ProbeOutcome::Unreachable);

        let unknown = p.probe(&Candidate::new("u", "nowhere:53"), ProbeMode::Connect, t).await.unwrap();
        assert_eq!(unknown.outcome, ProbeOutcome::Unresolvable);
    }

    #[tokio::test]
    async fn test_mtu_echo_subtracts_header_overhead() {
        let transport = Arc::new(ScriptedTransport::new().frame(1472, FramedEchoOutcome::Acked { rtt: None }));
        let p = Prober::new(transport.clone());

        let result = p
            .probe(&Candidate::new("g", "8.8.8.8"), ProbeMode::MtuEcho(1500), Duration::from_secs(1))
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(transport.framed_payloads(), vec![1472]);
    }

    #[tokio::test]
    async fn test_invalid_arguments_rejected() {
        let p = prober(ScriptedTransport::new());
        let c = Candidate::new("a", "a:53");

        let err = p.probe(&c, ProbeMode::Connect, Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));

        let err = p.probe(&c, ProbeMode::MtuEcho(28), Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));

        let err = p.sample(&c, ProbeMode::Connect, Duration::from_secs(1), 0).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sample_summarises_attempts() {
        let p = prober(ScriptedTransport::new().reach("a:53", 20));
        let stats = p
            .sample(&Candidate::new("a", "a:53"), ProbeMode::Connect, Duration::from_secs(1), 5)
            .await
            .unwrap();

        assert_eq!(stats.attempts, 5);
        assert_eq!(stats.successes, 5);
        assert_eq!(stats.loss_percent, 0.0);
    }
}
