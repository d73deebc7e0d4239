//! Scripted transport for unit tests

use crate::transport::{AttemptOutcome, FramedEchoOutcome, ProbeTransport};
use async_trait::async_trait;
use std::collections::HashMap;
use parking_lot::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
enum Step {
    Reach { delay: Duration, rtt: Option<Duration> },
    Refuse,
    Unreachable,
    Hang,
}

/// Answers from a fixed script; unknown addresses do not resolve
#[derive(Debug, Default)]
pub(crate) struct ScriptedTransport {
    steps: HashMap<String, Step>,
    frames: HashMap<usize, FramedEchoOutcome>,
    framed: Mutex<Vec<usize>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reach(mut self, address: &str, delay_ms: u64) -> Self {
        self.steps.insert(
            address.to_string(),
            Step::Reach { delay: Duration::from_millis(delay_ms), rtt: None },
        );
        self
    }

    pub(crate) fn reach_with_rtt(mut self, address: &str, delay_ms: u64, rtt_ms: u64) -> Self {
        self.steps.insert(
            address.to_string(),
            Step::Reach {
                delay: Duration::from_millis(delay_ms),
                rtt: Some(Duration::from_millis(rtt_ms)),
            },
        );
        self
    }

    pub(crate) fn refuse(mut self, address: &str) -> Self {
        self.steps.insert(address.to_string(), Step::Refuse);
        self
    }

    pub(crate) fn unreachable(mut self, address: &str) -> Self {
        self.steps.insert(address.to_string(), Step::Unreachable);
        self
    }

    pub(crate) fn hang(mut self, address: &str) -> Self {
        self.steps.insert(address.to_string(), Step::Hang);
        self
    }

    /// Answer framed echoes carrying `payload` bytes with `outcome`
    pub(crate) fn frame(mut self, payload: usize, outcome: FramedEchoOutcome) -> Self {
        self.frames.insert(payload, outcome);
        self
    }

    /// Payload sizes of every framed echo received, in order
    pub(crate) fn framed_payloads(&self) -> Vec<usize> {
        self.framed.lock().clone()
    }
}

#[async_trait]
impl ProbeTransport for ScriptedTransport {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn connect(&self, address: &str, _timeout: Duration) -> AttemptOutcome {
        match self.steps.get(address).copied() {
            Some(Step::Reach { delay, rtt }) => {
                tokio::time::sleep(delay).await;
                AttemptOutcome::Reached { rtt }
            }
            Some(Step::Refuse) => AttemptOutcome::Refused,
            Some(Step::Unreachable) => AttemptOutcome::Unreachable,
            Some(Step::Hang) => std::future::pending().await,
            None => AttemptOutcome::Unresolvable,
        }
    }

    async fn framed_echo(
        &self,
        _address: &str,
        payload_size: usize,
        _timeout: Duration,
        _dont_fragment: bool,
    ) -> FramedEchoOutcome {
        self.framed.lock().push(payload_size);
        self.frames
            .get(&payload_size)
            .copied()
            .unwrap_or(FramedEchoOutcome::Dropped)
    }
}
