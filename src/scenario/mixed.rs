//! Mixed workload: two concurrent jobs sharing the fabric.
//!
//! `tp-heavy` alternates many small tensor-parallel all-reduces with short
//! compute gaps before a heavy DP sync; `pp+dp` runs a 4-stage pipeline of
//! forward/backward micro-batch transfers followed by its own DP sync.
//! Participant allocation splits the hosts half/half, either contiguously
//! or balanced per rack.

use std::collections::BTreeMap;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::job::{Bucket, Flow, IdGenerator, Job, JobStep, Phase, PhaseKind};
use crate::net::NodeId;
use crate::sim::SimTime;
use crate::traffic::{expand_collective, CollectiveKind};

pub const PIPELINE_STAGES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMode {
    RackBalanced,
    Contiguous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagePlacementMode {
    TopologyAware,
    TopologyUnaware,
}

#[derive(Debug, Clone)]
pub struct TpHeavyConfig {
    pub steps: u32,
    pub seed: u64,
    pub traffic_scale: f64,
    pub fwd_compute_ms: f64,
    pub micro_collectives: u32,
    pub micro_collective_bytes_per_participant: u64,
    pub micro_compute_gap_ms: f64,
    pub final_sync_bytes_per_participant: u64,
    pub tail_compute_ms: f64,
    pub gap_us: f64,
}

#[derive(Debug, Clone)]
pub struct PpDpConfig {
    pub steps: u32,
    pub seed: u64,
    pub traffic_scale: f64,
    pub microbatch_count: u32,
    pub microbatch_gap_us: f64,
    pub activation_bytes_per_microbatch: u64,
    pub grad_bytes_per_microbatch: u64,
    pub dp_sync_bytes_per_participant: u64,
    pub tail_compute_ms: f64,
}

fn scaled(bytes: u64, scale: f64) -> u64 {
    (bytes as f64 * scale) as u64
}

/// Split hosts half/half between the two jobs. `hosts` pairs each node with
/// its rack index; order must be the deterministic build order.
pub fn split_participants(
    hosts: &[(NodeId, usize)],
    mode: AllocationMode,
) -> Result<(Vec<NodeId>, Vec<NodeId>), String> {
    if hosts.len() % 2 != 0 {
        return Err("mixed scenario requires an even number of hosts".to_string());
    }
    let half = hosts.len() / 2;

    match mode {
        AllocationMode::Contiguous => {
            let a = hosts[..half].iter().map(|(n, _)| *n).collect();
            let b = hosts[half..].iter().map(|(n, _)| *n).collect();
            Ok((a, b))
        }
        AllocationMode::RackBalanced => {
            let mut racks: BTreeMap<usize, Vec<NodeId>> = BTreeMap::new();
            for (node, rack) in hosts {
                racks.entry(*rack).or_default().push(*node);
            }
            let mut a = Vec::with_capacity(half);
            let mut b = Vec::with_capacity(half);
            for nodes in racks.values() {
                let cut = nodes.len() / 2;
                a.extend_from_slice(&nodes[..cut]);
                b.extend_from_slice(&nodes[cut..]);
            }
            // Odd rack sizes can leave a global imbalance; fix it exactly.
            if a.len() != half {
                let mut combined = [a, b].concat();
                combined.sort();
                let a = combined[..half].to_vec();
                let b = combined[half..].to_vec();
                return Ok((a, b));
            }
            Ok((a, b))
        }
    }
}

/// Assign the pp+dp half into 4 equal pipeline stages.
pub fn assign_stages(
    pp_nodes: &[NodeId],
    racks: &BTreeMap<NodeId, usize>,
    mode: StagePlacementMode,
    seed: u64,
) -> Result<Vec<Vec<NodeId>>, String> {
    if pp_nodes.len() % PIPELINE_STAGES != 0 {
        return Err(format!(
            "pp+dp node count {} must be divisible by {PIPELINE_STAGES}",
            pp_nodes.len()
        ));
    }
    let mut nodes = pp_nodes.to_vec();
    match mode {
        StagePlacementMode::TopologyAware => {
            // Group by rack id, then contiguous stage groups.
            nodes.sort_by_key(|n| (racks.get(n).copied().unwrap_or(0), *n));
        }
        StagePlacementMode::TopologyUnaware => {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            for i in (1..nodes.len()).rev() {
                let j = rng.gen_range(0..=i);
                nodes.swap(i, j);
            }
        }
    }
    let per_stage = nodes.len() / PIPELINE_STAGES;
    let mut stages: Vec<Vec<NodeId>> = (0..PIPELINE_STAGES)
        .map(|s| nodes[s * per_stage..(s + 1) * per_stage].to_vec())
        .collect();
    for stage in &mut stages {
        stage.sort();
    }
    Ok(stages)
}

pub fn build_tp_heavy_job(
    participants: &[NodeId],
    cfg: &TpHeavyConfig,
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
            name: "tp_heavy_compute_front".to_string(),
            kind: PhaseKind::Compute {
                duration: SimTime::from_millis_f64(cfg.fwd_compute_ms),
            },
        });

        // TP micro-collectives: alternating comm + small compute gap.
        for m in 0..cfg.micro_collectives {
            let bytes = scaled(cfg.micro_collective_bytes_per_participant, cfg.traffic_scale);
            let mut micro_ids = ids.child(&format!("tp_heavy/step{step_idx}/micro{m}"));
            let flows = expand_collective(
                CollectiveKind::AllReduce,
                participants,
                bytes,
                gap,
                &mut micro_ids,
                job_id,
                step_idx,
                1 + m * 2,
                Some(0),
            );
            phases.push(Phase {
                phase_id: 1 + m * 2,
                name: format!("tp_heavy_tp_micro_{m}"),
                kind: PhaseKind::Comm {
                    buckets: vec![Bucket {
                        bucket_id: 0,
                        flows,
                    }],
                },
            });
            phases.push(Phase {
                phase_id: 2 + m * 2,
                name: format!("tp_heavy_gap_{m}"),
                kind: PhaseKind::Compute {
                    duration: SimTime::from_millis_f64(cfg.micro_compute_gap_ms),
                },
            });
        }

        // Final DP sync (heavier): reduce-scatter + all-gather in one bucket.
        let bytes = scaled(cfg.final_sync_bytes_per_participant, cfg.traffic_scale);
        let mut rs_ids = ids.child(&format!("tp_heavy/step{step_idx}/final/rs"));
        let mut flows = expand_collective(
            CollectiveKind::ReduceScatter,
            participants,
            bytes,
            gap,
            &mut rs_ids,
            job_id,
            step_idx,
            9991,
            Some(0),
        );
        let mut ag_ids = ids.child(&format!("tp_heavy/step{step_idx}/final/ag"));
        flows.extend(expand_collective(
            CollectiveKind::AllGather,
            participants,
            bytes,
            gap,
            &mut ag_ids,
            job_id,
            step_idx,
            9992,
            Some(0),
        ));
        phases.push(Phase {
            phase_id: 9993,
            name: "tp_heavy_dp_sync".to_string(),
            kind: PhaseKind::Comm {
                buckets: vec![Bucket {
                    bucket_id: 0,
                    flows,
                }],
            },
        });

        phases.push(Phase {
            phase_id: 9994,
            name: "tp_heavy_compute_tail".to_string(),
            kind: PhaseKind::Compute {
                duration: SimTime::from_millis_f64(cfg.tail_compute_ms),
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

pub fn build_pp_dp_job(
    participants: &[NodeId],
    stage_nodes: &[Vec<NodeId>],
    cfg: &PpDpConfig,
    job_name: &str,
) -> Job {
    assert_eq!(stage_nodes.len(), PIPELINE_STAGES, "pp+dp requires 4 stages");
    assert!(
        stage_nodes.iter().all(|s| s.len() == stage_nodes[0].len()),
        "all stages must have equal node counts"
    );

    let mut ids = IdGenerator::new(cfg.seed);
    let job_id = ids.next_id();
    let fwd_bytes = scaled(cfg.activation_bytes_per_microbatch, cfg.traffic_scale);
    let bwd_bytes = scaled(cfg.grad_bytes_per_microbatch, cfg.traffic_scale);

    let mut steps = Vec::with_capacity(cfg.steps as usize);
    for step_idx in 0..cfg.steps {
        let mut phases = Vec::new();

        let mut fwd_ids = ids.child(&format!("pp_dp/step{step_idx}/fwd"));
        phases.push(Phase {
            phase_id: 100,
            name: "pp_dp_pp_fwd".to_string(),
            kind: PhaseKind::Comm {
                buckets: vec![Bucket {
                    bucket_id: 0,
                    flows: build_pp_microbatches(
                        &mut fwd_ids,
                        job_id,
                        step_idx,
                        100,
                        stage_nodes,
                        cfg.microbatch_count,
                        SimTime::from_micros_f64(cfg.microbatch_gap_us),
                        fwd_bytes,
                        Direction::Fwd,
                    ),
                }],
            },
        });

        let mut bwd_ids = ids.child(&format!("pp_dp/step{step_idx}/bwd"));
        phases.push(Phase {
            phase_id: 200,
            name: "pp_dp_pp_bwd".to_string(),
            kind: PhaseKind::Comm {
                buckets: vec![Bucket {
                    bucket_id: 0,
                    flows: build_pp_microbatches(
                        &mut bwd_ids,
                        job_id,
                        step_idx,
                        200,
                        stage_nodes,
                        cfg.microbatch_count,
                        SimTime::from_micros_f64(cfg.microbatch_gap_us),
                        bwd_bytes,
                        Direction::Bwd,
                    ),
                }],
            },
        });

        // DP sync across all pp+dp participants.
        let dp_bytes = scaled(cfg.dp_sync_bytes_per_participant, cfg.traffic_scale);
        let mut rs_ids = ids.child(&format!("pp_dp/step{step_idx}/dp/rs"));
        let mut flows = expand_collective(
            CollectiveKind::ReduceScatter,
            participants,
            dp_bytes,
            SimTime::ZERO,
            &mut rs_ids,
            job_id,
            step_idx,
            300,
            Some(0),
        );
        let mut ag_ids = ids.child(&format!("pp_dp/step{step_idx}/dp/ag"));
        flows.extend(expand_collective(
            CollectiveKind::AllGather,
            participants,
            dp_bytes,
            SimTime::ZERO,
            &mut ag_ids,
            job_id,
            step_idx,
            301,
            Some(0),
        ));
        phases.push(Phase {
            phase_id: 302,
            name: "pp_dp_dp_sync".to_string(),
            kind: PhaseKind::Comm {
                buckets: vec![Bucket {
                    bucket_id: 0,
                    flows,
                }],
            },
        });

        phases.push(Phase {
            phase_id: 400,
            name: "pp_dp_compute_tail".to_string(),
            kind: PhaseKind::Compute {
                duration: SimTime::from_millis_f64(cfg.tail_compute_ms),
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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Fwd,
    Bwd,
}

/// Sequential micro-batch bursts: each micro-batch walks the pipeline hop
/// by hop, one flow per (stage pair, rank), at slightly increasing offsets.
#[allow(clippy::too_many_arguments)]
fn build_pp_microbatches(
    ids: &mut IdGenerator,
    job_id: u64,
    step_id: u32,
    phase_id: u32,
    stage_nodes: &[Vec<NodeId>],
    microbatch_count: u32,
    microbatch_gap: SimTime,
    bytes_per_send: u64,
    direction: Direction,
) -> Vec<Flow> {
    let per_stage = stage_nodes[0].len();
    let (pairs, tag): (&[(usize, usize)], &str) = match direction {
        Direction::Fwd => (&[(0, 1), (1, 2), (2, 3)], "pp_dp_pp_fwd"),
        Direction::Bwd => (&[(3, 2), (2, 1), (1, 0)], "pp_dp_pp_bwd"),
    };

    let mut flows = Vec::new();
    for mb in 0..microbatch_count {
        let base = SimTime(microbatch_gap.0.saturating_mul(u64::from(mb)));
        for (hop_idx, &(s_stage, d_stage)) in pairs.iter().enumerate() {
            let t = base.saturating_add(SimTime(
                microbatch_gap.0.saturating_mul(hop_idx as u64),
            ));
            for i in 0..per_stage {
                flows.push(Flow {
                    flow_id: ids.next_id(),
                    job_id,
                    step_id,
                    phase_id,
                    bucket_id: Some(0),
                    tag: format!("{tag}/mb{mb}/hop{hop_idx}"),
                    src: stage_nodes[s_stage][i],
                    dst: stage_nodes[d_stage][i],
                    size_bytes: bytes_per_send,
                    start_offset: t,
                });
            }
        }
    }
    flows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts(n: usize, per_rack: usize) -> Vec<(NodeId, usize)> {
        (0..n).map(|i| (NodeId(i), i / per_rack)).collect()
    }

    #[test]
    fn rack_balanced_split_takes_half_per_rack() {
        let hs = hosts(16, 4);
        let (a, b) = split_participants(&hs, AllocationMode::RackBalanced).expect("split");
        assert_eq!(a.len(), 8);
        assert_eq!(b.len(), 8);
        for rack in 0..4 {
            let in_a = a.iter().filter(|n| n.0 / 4 == rack).count();
            assert_eq!(in_a, 2, "rack {rack} must be split in half");
        }
    }

    #[test]
    fn contiguous_split_is_prefix_suffix() {
        let hs = hosts(8, 4);
        let (a, b) = split_participants(&hs, AllocationMode::Contiguous).expect("split");
        assert_eq!(a, (0..4).map(NodeId).collect::<Vec<_>>());
        assert_eq!(b, (4..8).map(NodeId).collect::<Vec<_>>());
    }

    #[test]
    fn odd_host_count_is_rejected() {
        let hs = hosts(7, 4);
        assert!(split_participants(&hs, AllocationMode::Contiguous).is_err());
    }

    #[test]
    fn stage_assignment_topology_aware_follows_racks() {
        let nodes: Vec<NodeId> = (0..8).map(NodeId).collect();
        let racks: BTreeMap<NodeId, usize> =
            nodes.iter().map(|&n| (n, n.0 / 2)).collect();
        let stages =
            assign_stages(&nodes, &racks, StagePlacementMode::TopologyAware, 0).expect("stages");
        assert_eq!(stages.len(), 4);
        assert_eq!(stages[0], vec![NodeId(0), NodeId(1)]);
        assert_eq!(stages[3], vec![NodeId(6), NodeId(7)]);
    }

    #[test]
    fn stage_assignment_shuffle_is_seed_stable() {
        let nodes: Vec<NodeId> = (0..16).map(NodeId).collect();
        let racks: BTreeMap<NodeId, usize> = nodes.iter().map(|&n| (n, 0)).collect();
        let a = assign_stages(&nodes, &racks, StagePlacementMode::TopologyUnaware, 9).unwrap();
        let b = assign_stages(&nodes, &racks, StagePlacementMode::TopologyUnaware, 9).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn pp_dp_microbatch_flows_walk_the_pipeline() {
        let stages: Vec<Vec<NodeId>> = (0..4).map(|s| vec![NodeId(s)]).collect();
        let cfg = PpDpConfig {
            steps: 1,
            seed: 1,
            traffic_scale: 1.0,
            microbatch_count: 2,
            microbatch_gap_us: 75.0,
            activation_bytes_per_microbatch: 1024,
            grad_bytes_per_microbatch: 2048,
            dp_sync_bytes_per_participant: 4096,
            tail_compute_ms: 3.0,
        };
        let participants: Vec<NodeId> = (0..4).map(NodeId).collect();
        let job = build_pp_dp_job(&participants, &stages, &cfg, "pp_dp");
        let PhaseKind::Comm { buckets } = &job.steps[0].phases[0].kind else {
            panic!("fwd phase must be comm");
        };
        // 2 microbatches x 3 hops x 1 per stage
        assert_eq!(buckets[0].flows.len(), 6);
        assert!(buckets[0]
            .flows
            .iter()
            .all(|f| f.size_bytes == 1024 && f.tag.starts_with("pp_dp_pp_fwd")));
        // Backward flows reverse the pipeline and carry grad bytes.
        let PhaseKind::Comm { buckets } = &job.steps[0].phases[1].kind else {
            panic!("bwd phase must be comm");
        };
        assert!(buckets[0]
            .flows
            .iter()
            .all(|f| f.size_bytes == 2048));
        assert_eq!(buckets[0].flows[0].src, NodeId(3));
        assert_eq!(buckets[0].flows[0].dst, NodeId(2));
    }
}
