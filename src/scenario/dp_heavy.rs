//! Workload 1: DP-heavy training job.
//!
//! Each step is fwd/bwd compute, then a gradient sync comm phase whose
//! buckets model bucketized gradient synchronization (per bucket one ring
//! reduce-scatter plus one ring all-gather), then optimizer compute.

use crate::job::{Bucket, IdGenerator, Job, JobStep, Phase, PhaseKind};
use crate::net::NodeId;
use crate::sim::SimTime;
use crate::traffic::{expand_collective, CollectiveKind};

#[derive(Debug, Clone)]
pub struct DpHeavyConfig {
    pub steps: u32,
    pub seed: u64,
    pub num_buckets: u32,
    pub bucket_bytes_per_participant: u64,
    pub gap_us: f64,
    pub t_fwd_bwd_ms: f64,
    pub optimizer_ms: f64,
}

pub fn build_dp_heavy_job(
    participants: &[NodeId],
    cfg: &DpHeavyConfig,
    job_name: &str,
) -> Job {
    let mut ids = IdGenerator::new(cfg.seed);
    let job_id = ids.next_id();
    let gap = SimTime::from_micros_f64(cfg.gap_us);

    let mut steps = Vec::with_capacity(cfg.steps as usize);
    for step_idx in 0..cfg.steps {
        let mut phases = Vec::new();

        phases.push(Phase {
            phase_id: 0,
            name: "fwd_bwd_compute".to_string(),
            kind: PhaseKind::Compute {
                duration: SimTime::from_millis_f64(cfg.t_fwd_bwd_ms),
            },
        });

        let mut buckets = Vec::with_capacity(cfg.num_buckets as usize);
        for b in 0..cfg.num_buckets {
            let mut rs_ids = ids.child(&format!("step{step_idx}/bucket{b}/rs"));
            let mut flows = expand_collective(
                CollectiveKind::ReduceScatter,
                participants,
                cfg.bucket_bytes_per_participant,
                gap,
                &mut rs_ids,
                job_id,
                step_idx,
                1,
                Some(b),
            );
            let mut ag_ids = ids.child(&format!("step{step_idx}/bucket{b}/ag"));
            flows.extend(expand_collective(
                CollectiveKind::AllGather,
                participants,
                cfg.bucket_bytes_per_participant,
                gap,
                &mut ag_ids,
                job_id,
                step_idx,
                1,
                Some(b),
            ));
            buckets.push(Bucket {
                bucket_id: b,
                flows,
            });
        }
        phases.push(Phase {
            phase_id: 1,
            name: "gradient_sync".to_string(),
            kind: PhaseKind::Comm { buckets },
        });

        phases.push(Phase {
            phase_id: 2,
            name: "optimizer_compute".to_string(),
            kind: PhaseKind::Compute {
                duration: SimTime::from_millis_f64(cfg.optimizer_ms),
            },
        });

        steps.push(JobStep {
            step_id: step_idx,
            phases,
        });
    }

    Job {
        job_id,
        name: job_name.to_string(),
        steps,
        participants: participants.to_vec(),
    }
}
