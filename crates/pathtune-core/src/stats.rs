//! Latency summary over repeated probes

use crate::probe::ProbeResult;
use serde::{Deserialize, Serialize};

/// Summary of a series of probes against one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    /// Probes sent
    pub attempts: u32,
    /// Probes that succeeded
    pub successes: u32,
    /// Probes that failed for any reason
    pub failures: u32,
    /// Lowest latency seen
    pub min_ms: Option<f64>,
    /// Mean latency over successes
    pub avg_ms: Option<f64>,
    /// Highest latency seen
    pub max_ms: Option<f64>,
    /// Failed share of attempts (0.0 - 100.0)
    pub loss_percent: f64,
}

impl LatencyStats {
    /// Summarise a series of results
    pub fn from_results(results: &[ProbeResult]) -> Self {
        let latencies: Vec<f64> = results.iter().filter_map(|r| r.latency_ms()).collect();

        let attempts = results.len() as u32;
        let successes = latencies.len() as u32;
        let failures = attempts - successes;

        let loss_percent = if attempts == 0 {
            0.0
        } else {
            f64::from(failures) * 100.0 / f64::from(attempts)
        };

        let (min_ms, avg_ms, max_ms) = if latencies.is_empty() {
            (None, None, None)
        } else {
            let min = latencies.iter().copied().fold(f64::INFINITY, f64::min);
            let max = latencies.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let avg = latencies.iter().sum::<f64>() / latencies.len() as f64;
            (Some(min), Some(avg), Some(max))
        };

        Self {
            attempts,
            successes,
            failures,
            min_ms,
            avg_ms,
            max_ms,
            loss_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{probe::ProbeOutcome, Candidate};

    fn result(outcome: ProbeOutcome) -> ProbeResult {
        ProbeResult::new(Candidate::new("t", "t"), outcome)
    }

    #[test]
    fn test_mixed_series() {
        let results = vec![
            result(ProbeOutcome::Success { latency_ms: 10.0 }),
            result(ProbeOutcome::Timeout),
            result(ProbeOutcome::Success { latency_ms: 30.0 }),
            result(ProbeOutcome::Success { latency_ms: 20.0 }),
        ];

        let stats = LatencyStats::from_results(&results);
        assert_eq!(stats.attempts, 4);
        assert_eq!(stats.successes, 3);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.min_ms, Some(10.0));
        assert_eq!(stats.max_ms, Some(30.0));
        assert_eq!(stats.avg_ms, Some(20.0));
        assert!((stats.loss_percent - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_all_failed() {
        let results = vec![result(ProbeOutcome::Timeout), result(ProbeOutcome::ConnectionRefused)];
        let stats = LatencyStats::from_results(&results);
        assert_eq!(stats.avg_ms, None);
        assert_eq!(stats.loss_percent, 100.0);
    }
}
