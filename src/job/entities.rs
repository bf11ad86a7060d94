//! Job / step / phase / bucket / flow records and their timing metrics.
//!
//! A job is an ordered list of steps; a step is an ordered list of phases;
//! a comm phase is an ordered list of buckets acting as sequential barriers;
//! flows inside one bucket run concurrently and are joined.

use crate::net::NodeId;
use crate::sim::SimTime;

/// A bulk transfer request emitted by the workload layer.
/// Packet-agnostic: the fabric decides packetization and routing.
#[derive(Debug, Clone)]
pub struct Flow {
    pub flow_id: u64,
    pub job_id: u64,
    pub step_id: u32,
    pub phase_id: u32,
    pub bucket_id: Option<u32>,
    pub tag: String,
    pub src: NodeId,
    pub dst: NodeId,
    pub size_bytes: u64,
    /// Start offset relative to the owning bucket's start.
    pub start_offset: SimTime,
}

#[derive(Debug, Clone)]
pub struct Bucket {
    pub bucket_id: u32,
    pub flows: Vec<Flow>,
}

#[derive(Debug, Clone)]
pub enum PhaseKind {
    Compute { duration: SimTime },
    Comm { buckets: Vec<Bucket> },
}

impl PhaseKind {
    /// Flow ids of a comm phase, in bucket order; None for compute phases.
    pub fn comm_flow_ids(&self) -> Option<Vec<u64>> {
        match self {
            PhaseKind::Comm { buckets } => Some(
                buckets
                    .iter()
                    .flat_map(|b| b.flows.iter().map(|f| f.flow_id))
                    .collect(),
            ),
            PhaseKind::Compute { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Phase {
    pub phase_id: u32,
    pub name: String,
    pub kind: PhaseKind,
}

#[derive(Debug, Clone)]
pub struct JobStep {
    pub step_id: u32,
    pub phases: Vec<Phase>,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub job_id: u64,
    pub name: String,
    pub steps: Vec<JobStep>,
    pub participants: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct BucketMetrics {
    pub bucket_id: u32,
    pub start: SimTime,
    pub end: Option<SimTime>,
}

#[derive(Debug, Clone)]
pub struct PhaseMetrics {
    pub phase_id: u32,
    pub name: String,
    pub start: SimTime,
    pub end: Option<SimTime>,
    pub buckets: Vec<BucketMetrics>,
}

#[derive(Debug, Clone)]
pub struct StepMetrics {
    pub step_id: u32,
    pub start: SimTime,
    pub end: Option<SimTime>,
    pub phases: Vec<PhaseMetrics>,
}

#[derive(Debug, Clone)]
pub struct JobMetrics {
    pub job_id: u64,
    pub name: String,
    pub start: SimTime,
    pub end: Option<SimTime>,
    pub steps: Vec<StepMetrics>,
}

impl JobMetrics {
    pub fn new(job_id: u64, name: impl Into<String>) -> Self {
        Self {
            job_id,
            name: name.into(),
            start: SimTime::ZERO,
            end: None,
            steps: Vec::new(),
        }
    }

    /// Completed step durations, in step order.
    pub fn step_durations(&self) -> Vec<SimTime> {
        self.steps
            .iter()
            .filter_map(|s| s.end.map(|e| e.saturating_sub(s.start)))
            .collect()
    }
}
