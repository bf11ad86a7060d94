//! Run orchestration: configuration -> fabric -> scenario -> metrics.
//!
//! One invocation is one complete run. Fatal problems (bad config, broken
//! connectivity, stalled barriers at queue exhaustion) surface as errors;
//! modeled drops stay counters inside the metrics.

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use tracing::info;

use crate::config::{ConfigError, MiceParams, ScenarioSection, SimConfig};
use crate::job::{
    install_job, job_metrics, stall_report, JobStall, SharedJobState,
};
use crate::metrics::{
    fct_report, job_report, LinkReport, NodeQueueReport, PacketReport, QueueReport, RunMetrics,
    SeedsUsed, TopologySummary,
};
use crate::net::{FlowClass, NetWorld, NodeId, RoutingMode};
use crate::scenario::{
    assign_stages, build_dp_heavy_job, build_pp_dp_job, build_tp_heavy_job, split_participants,
    DpHeavyConfig, PpDpConfig, TpHeavyConfig,
};
use crate::sim::{SimTime, Simulator};
use crate::topo::{build_ai_factory_su, SuTopology, SuTopologyOpts, TopoError};
use crate::traffic::{install_mice, mice_hosts, MiceOpts};

#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Topology(#[from] TopoError),
    #[error("simulation stalled: event queue drained with unfinished jobs: {jobs:?}; unfinished flows: {unfinished_flows:?}")]
    Stalled {
        jobs: Vec<JobStall>,
        unfinished_flows: Vec<u64>,
    },
}

/// Execute one simulation run. Identical config yields identical metrics.
pub fn run(config: &SimConfig) -> Result<RunMetrics, RunError> {
    config.validate()?;

    let mut sim = Simulator::default();
    let mut world = NetWorld::default();
    apply_fabric_config(&mut world, config);

    if config.run.visualize {
        info!("topology visualization is handled outside the core; ignoring run.visualize");
    }

    let su_opts = su_opts_from(config);
    let mut failure_rng = ChaCha8Rng::seed_from_u64(config.topology.links.failure_seed);
    let topo = build_ai_factory_su(&mut world.net, &su_opts, &mut failure_rng)?;

    let (jobs, scenario_seed, mice_seed) = install_scenario(&mut sim, config, &topo)?;

    sim.run(&mut world);

    let stalls: Vec<JobStall> = jobs.iter().filter_map(stall_report).collect();
    if !stalls.is_empty() {
        return Err(RunError::Stalled {
            jobs: stalls,
            unfinished_flows: world.flows.unfinished(),
        });
    }

    Ok(assemble_metrics(
        config,
        &topo,
        &sim,
        &world,
        &jobs,
        scenario_seed,
        mice_seed,
    ))
}

fn apply_fabric_config(world: &mut NetWorld, config: &SimConfig) {
    let net = &mut world.net;
    net.routing_mode = config.topology.routing.mode;
    net.flowlet_n_packets = config.topology.routing.ecmp_flowlet_n_packets;
    net.flowlet_idle_gap = SimTime::from_micros_f64(config.topology.routing.flowlet_idle_gap_us);
    net.mtu = config.topology.mtu;
    net.ttl = config.topology.ttl;
    net.max_path = config.topology.max_path;
    net.verbose_route = config.run.verbose_route;
    net.message_verbose = config.run.message_verbose;
}

fn su_opts_from(config: &SimConfig) -> SuTopologyOpts {
    let su = &config.topology.ai_factory_su;
    SuTopologyOpts {
        leaves: su.leaves,
        spines: su.spines,
        servers_per_leaf: su.servers_per_leaf,
        server_parallel_links: su.server_parallel_links,
        leaf_to_spine_parallel_links: su.leaf_to_spine_parallel_links,
        server_to_leaf_bps: config.topology.links.bandwidth_bps.server_to_leaf,
        leaf_to_spine_bps: config.topology.links.bandwidth_bps.leaf_to_spine,
        link_failure_percent: config.topology.links.failure_percent,
        ..SuTopologyOpts::default()
    }
}

fn mice_opts_from(m: &MiceParams, mtu: u32) -> MiceOpts {
    MiceOpts {
        seed: m.seed,
        start_delay: SimTime::from_secs_f64(m.start_delay_s),
        end_time: SimTime::from_secs_f64(m.end_time_s),
        interarrival: SimTime::from_secs_f64(m.interarrival_s),
        min_packets: m.min_packets,
        max_packets: m.max_packets,
        mtu_bytes: mtu,
        force_cross_rack: m.force_cross_rack,
    }
}

fn install_scenario(
    sim: &mut Simulator,
    config: &SimConfig,
    topo: &SuTopology,
) -> Result<(Vec<SharedJobState>, u64, Option<u64>), RunError> {
    let mut jobs = Vec::new();
    let mut mice_seed = None;
    let scenario_seed;

    match &config.scenario {
        ScenarioSection::DpHeavy(p) => {
            scenario_seed = p.seed;
            let participants = topo.host_nodes();
            let cfg = DpHeavyConfig {
                steps: p.steps,
                seed: p.seed,
                num_buckets: p.num_buckets,
                bucket_bytes_per_participant: p.bucket_bytes_per_participant,
                gap_us: p.gap_us,
                t_fwd_bwd_ms: p.t_fwd_bwd_ms,
                optimizer_ms: p.optimizer_ms,
            };
            let job = build_dp_heavy_job(&participants, &cfg, "workload1-dp-heavy");
            jobs.push(install_job(sim, job));
            if let Some(m) = &p.mice {
                if m.enabled {
                    mice_seed = Some(m.seed);
                    install_mice(sim, mice_hosts(topo), mice_opts_from(m, config.topology.mtu));
                }
            }
        }
        ScenarioSection::Mixed(p) => {
            scenario_seed = p.seed;
            let hosts: Vec<(NodeId, usize)> =
                topo.hosts.iter().map(|h| (h.node, h.leaf)).collect();
            let (tp_nodes, pp_nodes) =
                split_participants(&hosts, p.allocation_mode).map_err(|message| {
                    ConfigError::Invalid {
                        key: "scenario.params.allocation_mode",
                        message,
                    }
                })?;
            let racks: BTreeMap<NodeId, usize> = hosts.iter().copied().collect();
            let stages = assign_stages(&pp_nodes, &racks, p.stage_placement_mode, p.seed)
                .map_err(|message| ConfigError::Invalid {
                    key: "scenario.params.stage_placement_mode",
                    message,
                })?;

            let tp_cfg = TpHeavyConfig {
                steps: p.tp_heavy_steps.unwrap_or(p.steps),
                seed: p.seed ^ 0xA5A5,
                traffic_scale: p.traffic_scale,
                fwd_compute_ms: p.tp_heavy_fwd_compute_ms,
                micro_collectives: p.tp_heavy_micro_collectives,
                micro_collective_bytes_per_participant: p
                    .tp_heavy_micro_collective_bytes_per_participant,
                micro_compute_gap_ms: p.tp_heavy_micro_compute_gap_ms,
                final_sync_bytes_per_participant: p.tp_heavy_final_sync_bytes_per_participant,
                tail_compute_ms: p.tp_heavy_tail_compute_ms,
                gap_us: p.tp_heavy_gap_us,
            };
            let pp_cfg = PpDpConfig {
                steps: p.pp_dp_steps.unwrap_or(p.steps),
                seed: p.seed ^ 0x5A5A,
                traffic_scale: p.traffic_scale,
                microbatch_count: p.pp_dp_microbatch_count,
                microbatch_gap_us: p.pp_dp_microbatch_gap_us,
                activation_bytes_per_microbatch: p.pp_dp_activation_bytes_per_microbatch,
                grad_bytes_per_microbatch: p.pp_dp_grad_bytes_per_microbatch,
                dp_sync_bytes_per_participant: p.pp_dp_dp_sync_bytes_per_participant,
                tail_compute_ms: p.pp_dp_tail_compute_ms,
            };

            jobs.push(install_job(
                sim,
                build_tp_heavy_job(&tp_nodes, &tp_cfg, "mixed-tp-heavy"),
            ));
            jobs.push(install_job(
                sim,
                build_pp_dp_job(&pp_nodes, &stages, &pp_cfg, "mixed-pp-dp"),
            ));
            if let Some(m) = &p.mice {
                if m.enabled {
                    mice_seed = Some(m.seed);
                    install_mice(sim, mice_hosts(topo), mice_opts_from(m, config.topology.mtu));
                }
            }
        }
    }
    Ok((jobs, scenario_seed, mice_seed))
}

fn assemble_metrics(
    config: &SimConfig,
    topo: &SuTopology,
    sim: &Simulator,
    world: &NetWorld,
    jobs: &[SharedJobState],
    scenario_seed: u64,
    mice_seed: Option<u64>,
) -> RunMetrics {
    let net = &world.net;
    let stats = &net.stats;

    let nodes: Vec<NodeQueueReport> = net
        .nodes()
        .iter()
        .map(|n| {
            let port_peaks = n.ports_peak_queue_lens();
            NodeQueueReport {
                name: n.name.clone(),
                peak: port_peaks.iter().copied().max().unwrap_or(0),
                port_peaks,
            }
        })
        .collect();
    let global_peak = nodes.iter().map(|n| n.peak).max().unwrap_or(0);

    RunMetrics {
        topology: TopologySummary {
            topology: config.topology.kind.clone(),
            leaves: topo.leaves.len(),
            spines: topo.spines.len(),
            servers: topo.hosts.len(),
            links: net.links().len(),
            failed_links: net.failed_links(),
            routing_mode: routing_mode_name(net.routing_mode).to_string(),
            mtu: net.mtu,
            ttl: net.ttl,
            max_path: net.max_path,
        },
        seeds: SeedsUsed {
            scenario: scenario_seed,
            link_failure: config.topology.links.failure_seed,
            mice: mice_seed,
        },
        jobs: jobs
            .iter()
            .map(|state| job_report(&job_metrics(state), participants_of(state)))
            .collect(),
        job_flows: fct_report(world.flows.completed(), FlowClass::Job),
        mice_flows: fct_report(world.flows.completed(), FlowClass::Mice),
        packets: PacketReport {
            created: stats.created_pkts,
            delivered: stats.delivered_pkts,
            delivered_bytes: stats.delivered_bytes,
            dropped_total: stats.dropped_total(),
            dropped_no_route: stats.dropped_no_route,
            dropped_ttl_expired: stats.dropped_ttl,
            dropped_link_failed: stats.dropped_link_failed,
            dropped_host_unreachable: stats.dropped_host_unreachable,
        },
        links: link_report(world, sim),
        queues: QueueReport {
            global_peak_port_queue: global_peak,
            nodes,
        },
        end_time_s: sim.now().as_secs_f64(),
    }
}

fn link_report(world: &NetWorld, sim: &Simulator) -> LinkReport {
    let links = world.net.links();
    let total_tx_bytes: u64 = links.iter().map(|l| l.tx_bytes).sum();
    let min_tx_bytes = links.iter().map(|l| l.tx_bytes).min().unwrap_or(0);
    let max_tx_bytes = links.iter().map(|l| l.tx_bytes).max().unwrap_or(0);
    let max_busy_time_s = links
        .iter()
        .map(|l| l.tx_time)
        .max()
        .unwrap_or(SimTime::ZERO)
        .as_secs_f64();
    // Full-duplex: each link can carry bandwidth/8 bytes per second per
    // direction for the whole run.
    let total_secs = sim.now().as_secs_f64();
    let capacity_bytes: f64 = links
        .iter()
        .map(|l| (l.bandwidth_bps as f64 / 8.0) * total_secs * 2.0)
        .sum();
    let avg_utilization_percent = if capacity_bytes > 0.0 {
        total_tx_bytes as f64 / capacity_bytes * 100.0
    } else {
        0.0
    };
    LinkReport {
        total_tx_bytes,
        min_tx_bytes,
        max_tx_bytes,
        max_busy_time_s,
        avg_utilization_percent,
    }
}

fn routing_mode_name(mode: RoutingMode) -> &'static str {
    match mode {
        RoutingMode::Ecmp => "ecmp",
        RoutingMode::Flowlet => "flowlet",
        RoutingMode::Adaptive => "adaptive",
    }
}

fn participants_of(state: &SharedJobState) -> usize {
    crate::job::participant_count(state)
}
