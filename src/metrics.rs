//! Structured metrics produced by a run.
//!
//! Times are reported as f64 seconds/milliseconds derived from the integer
//! nanosecond clock, so that identical runs serialize to identical JSON and
//! the record round-trips bit-exactly.

use serde::{Deserialize, Serialize};

use crate::job::JobMetrics;
use crate::net::{CompletedFlow, FlowClass};
use crate::sim::SimTime;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub topology: TopologySummary,
    pub seeds: SeedsUsed,
    pub jobs: Vec<JobReport>,
    pub job_flows: FctReport,
    pub mice_flows: FctReport,
    pub packets: PacketReport,
    pub links: LinkReport,
    pub queues: QueueReport,
    /// Simulated time at which the event queue drained.
    pub end_time_s: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkReport {
    pub total_tx_bytes: u64,
    pub min_tx_bytes: u64,
    pub max_tx_bytes: u64,
    /// Accumulated serialization time of the busiest link.
    pub max_busy_time_s: f64,
    /// Transmitted bytes over the full-duplex byte capacity of every link
    /// across the whole run, as a percentage.
    pub avg_utilization_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologySummary {
    pub topology: String,
    pub leaves: usize,
    pub spines: usize,
    pub servers: usize,
    pub links: usize,
    pub failed_links: usize,
    pub routing_mode: String,
    pub mtu: u32,
    pub ttl: u8,
    pub max_path: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedsUsed {
    pub scenario: u64,
    pub link_failure: u64,
    pub mice: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub step_id: u32,
    pub start_s: f64,
    pub end_s: f64,
    pub duration_s: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub name: String,
    pub job_id: u64,
    pub participants: usize,
    pub total_time_s: f64,
    pub steps: Vec<StepReport>,
    pub step_time_avg_ms: f64,
    pub step_time_p50_ms: f64,
    pub step_time_p95_ms: f64,
    pub step_time_p99_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FctReport {
    pub count: usize,
    pub fct_ms: Vec<f64>,
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketReport {
    pub created: u64,
    pub delivered: u64,
    pub delivered_bytes: u64,
    pub dropped_total: u64,
    pub dropped_no_route: u64,
    pub dropped_ttl_expired: u64,
    pub dropped_link_failed: u64,
    pub dropped_host_unreachable: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeQueueReport {
    pub name: String,
    pub peak: usize,
    pub port_peaks: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueReport {
    pub global_peak_port_queue: usize,
    pub nodes: Vec<NodeQueueReport>,
}

/// Nearest-rank percentile over already-collected samples. `p` in [0, 1].
pub fn percentile_ns(values: &[u64], p: f64) -> Option<u64> {
    if values.is_empty() {
        return None;
    }
    let p = p.clamp(0.0, 1.0);
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let idx = (p * sorted.len() as f64).ceil() as usize;
    let idx = idx.saturating_sub(1).min(sorted.len().saturating_sub(1));
    sorted.get(idx).copied()
}

pub fn fct_report(completed: &[CompletedFlow], class: FlowClass) -> FctReport {
    let fct_ns: Vec<u64> = completed
        .iter()
        .filter(|f| f.class == class)
        .map(|f| f.done_at.saturating_sub(f.start_at).0)
        .collect();
    let count = fct_ns.len();
    let avg_ns = if count == 0 {
        0
    } else {
        fct_ns.iter().sum::<u64>() / count as u64
    };
    FctReport {
        count,
        fct_ms: fct_ns.iter().map(|&ns| SimTime(ns).as_millis_f64()).collect(),
        avg_ms: SimTime(avg_ns).as_millis_f64(),
        p50_ms: SimTime(percentile_ns(&fct_ns, 0.50).unwrap_or(0)).as_millis_f64(),
        p95_ms: SimTime(percentile_ns(&fct_ns, 0.95).unwrap_or(0)).as_millis_f64(),
        p99_ms: SimTime(percentile_ns(&fct_ns, 0.99).unwrap_or(0)).as_millis_f64(),
    }
}

pub fn job_report(metrics: &JobMetrics, participants: usize) -> JobReport {
    let steps: Vec<StepReport> = metrics
        .steps
        .iter()
        .filter_map(|s| {
            s.end.map(|end| StepReport {
                step_id: s.step_id,
                start_s: s.start.as_secs_f64(),
                end_s: end.as_secs_f64(),
                duration_s: end.saturating_sub(s.start).as_secs_f64(),
            })
        })
        .collect();
    let durations_ns: Vec<u64> = metrics
        .step_durations()
        .iter()
        .map(|d| d.0)
        .collect();
    let avg_ns = if durations_ns.is_empty() {
        0
    } else {
        durations_ns.iter().sum::<u64>() / durations_ns.len() as u64
    };
    let total = metrics
        .end
        .map(|e| e.saturating_sub(metrics.start))
        .unwrap_or(SimTime::ZERO);
    JobReport {
        name: metrics.name.clone(),
        job_id: metrics.job_id,
        participants,
        total_time_s: total.as_secs_f64(),
        steps,
        step_time_avg_ms: SimTime(avg_ns).as_millis_f64(),
        step_time_p50_ms: SimTime(percentile_ns(&durations_ns, 0.50).unwrap_or(0))
            .as_millis_f64(),
        step_time_p95_ms: SimTime(percentile_ns(&durations_ns, 0.95).unwrap_or(0))
            .as_millis_f64(),
        step_time_p99_ms: SimTime(percentile_ns(&durations_ns, 0.99).unwrap_or(0))
            .as_millis_f64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_uses_nearest_rank() {
        let values: Vec<u64> = (1..=100).collect();
        assert_eq!(percentile_ns(&values, 0.50), Some(50));
        assert_eq!(percentile_ns(&values, 0.95), Some(95));
        assert_eq!(percentile_ns(&values, 0.99), Some(99));
        assert_eq!(percentile_ns(&values, 1.0), Some(100));
        assert_eq!(percentile_ns(&[], 0.5), None);
    }

    #[test]
    fn percentile_of_single_sample_is_that_sample() {
        assert_eq!(percentile_ns(&[7], 0.01), Some(7));
        assert_eq!(percentile_ns(&[7], 0.99), Some(7));
    }
}
