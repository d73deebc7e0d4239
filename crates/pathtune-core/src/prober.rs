//! Deadline-bounded parallel probing

use crate::{
    error::{EngineError, EngineResult},
    probe::{validate_mode, validate_timeout, ProbeMode, ProbeOutcome, ProbeResult, Prober},
    Candidate,
};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

/// Fans a probe out over a set of candidates
#[derive(Clone)]
pub struct ParallelProber {
    prober: Prober,
}

impl ParallelProber {
    /// Create over a single-probe runner
    pub fn new(prober: Prober) -> Self {
        Self { prober }
    }

    /// Underlying single-probe runner
    pub fn prober(&self) -> &Prober {
        &self.prober
    }

    /// Probe every target concurrently.
    ///
    /// Results come back in input order. A probe still running when
    /// `overall_deadline` expires is abandoned and recorded as
    /// [`ProbeOutcome::Timeout`], so the call never outlives the deadline.
    pub async fn probe_all(
        &self,
        targets: &[Candidate],
        mode: ProbeMode,
        per_probe_timeout: Duration,
        overall_deadline: Duration,
    ) -> EngineResult<Vec<ProbeResult>> {
        validate_targets(targets)?;
        validate_timeout(per_probe_timeout)?;
        validate_mode(mode)?;
        if overall_deadline.is_zero() {
            return Err(EngineError::invalid("overall deadline must be positive"));
        }

        let deadline = Instant::now() + overall_deadline;
        info!(
            targets = targets.len(),
            ?mode,
            transport = self.prober.transport_name(),
            "starting probe round"
        );

        let handles: Vec<_> = targets
            .iter()
            .map(|candidate| {
                let prober = self.prober.clone();
                let candidate = candidate.clone();
                tokio::spawn(async move { prober.measure(&candidate, mode, per_probe_timeout).await })
            })
            .collect();

        let mut results = Vec::with_capacity(targets.len());
        for (candidate, mut handle) in targets.iter().zip(handles) {
            let result = match timeout_at(deadline, &mut handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    warn!(candidate = %candidate.name, error = %e, "probe task failed");
                    ProbeResult::new(candidate.clone(), ProbeOutcome::Timeout)
                }
                Err(_) => {
                    handle.abort();
                    debug!(candidate = %candidate.name, "probe abandoned at round deadline");
                    ProbeResult::new(candidate.clone(), ProbeOutcome::Timeout)
                }
            };
            results.push(result);
        }

        let reached = results.iter().filter(|r| r.is_success()).count();
        info!(reached, total = results.len(), "probe round finished");

        Ok(results)
    }
}

fn validate_targets(targets: &[Candidate]) -> EngineResult<()> {
    if targets.is_empty() {
        return Err(EngineError::invalid("candidate list is empty"));
    }

    let mut seen = HashSet::with_capacity(targets.len());
    for candidate in targets {
        if !seen.insert(candidate.name.as_str()) {
            return Err(EngineError::invalid(format!(
                "duplicate candidate name: {}",
                candidate.name
            )));
        }
    }
    Ok(())
}
