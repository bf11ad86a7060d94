use fabsim_rs::config::{
    BandwidthSection, DpHeavyParams, LinksSection, MiceParams, MixedParams, RoutingSection,
    RunSection, ScenarioSection, SimConfig, SuSection, TopologySection,
};
use fabsim_rs::net::RoutingMode;
use fabsim_rs::scenario::{AllocationMode, StagePlacementMode};
use fabsim_rs::{run, RunError, RunMetrics};

fn base_topology(routing_mode: RoutingMode, failure_percent: f64) -> TopologySection {
    TopologySection {
        kind: "ai-factory-su".to_string(),
        ai_factory_su: SuSection {
            leaves: 2,
            spines: 2,
            servers_per_leaf: 2,
            server_parallel_links: 1,
            leaf_to_spine_parallel_links: 1,
        },
        routing: RoutingSection {
            mode: routing_mode,
            ecmp_flowlet_n_packets: 0,
            flowlet_idle_gap_us: 0.0,
        },
        links: LinksSection {
            failure_percent,
            failure_seed: 0xFA17,
            bandwidth_bps: BandwidthSection {
                server_to_leaf: 100_000_000_000,
                leaf_to_spine: 100_000_000_000,
            },
        },
        max_path: 16,
        mtu: 4096,
        ttl: 16,
    }
}

fn dp_heavy_config() -> SimConfig {
    SimConfig {
        run: RunSection::default(),
        topology: base_topology(RoutingMode::Ecmp, 0.0),
        scenario: ScenarioSection::DpHeavy(DpHeavyParams {
            steps: 2,
            seed: 1234,
            num_buckets: 2,
            bucket_bytes_per_participant: 64 * 1024,
            gap_us: 10.0,
            t_fwd_bwd_ms: 10.0,
            optimizer_ms: 5.0,
            mice: None,
        }),
    }
}

#[test]
fn dp_heavy_run_completes_with_sane_metrics() {
    let metrics = run(&dp_heavy_config()).expect("run succeeds");

    assert_eq!(metrics.topology.servers, 4);
    assert_eq!(metrics.topology.failed_links, 0);
    assert_eq!(metrics.jobs.len(), 1);
    assert_eq!(metrics.jobs[0].steps.len(), 2);
    assert_eq!(metrics.jobs[0].participants, 4);
    assert!(metrics.packets.delivered > 0);
    assert_eq!(metrics.packets.dropped_total, 0);
    assert!(metrics.job_flows.count > 0);
    assert_eq!(metrics.mice_flows.count, 0);
    assert!(metrics.links.total_tx_bytes > 0);
    assert!(metrics.links.avg_utilization_percent > 0.0);
    assert!(metrics.end_time_s > 0.0);
    assert_eq!(metrics.seeds.scenario, 1234);
}

#[test]
fn step_time_is_compute_plus_comm_within_tolerance() {
    let metrics = run(&dp_heavy_config()).expect("run succeeds");
    // 10 ms fwd/bwd + 5 ms optimizer; comm adds a bounded amount on a
    // 100 Gbps fabric (2 x 64 KiB per participant per bucket).
    for step in &metrics.jobs[0].steps {
        assert!(step.duration_s >= 0.015, "step too short: {step:?}");
        assert!(step.duration_s < 0.015 + 0.010, "step too long: {step:?}");
    }
}

#[test]
fn identical_configs_yield_bit_identical_metrics() {
    let a = run(&dp_heavy_config()).expect("first run");
    let b = run(&dp_heavy_config()).expect("second run");
    assert_eq!(a, b);
    let ja = serde_json::to_string(&a).expect("serialize");
    let jb = serde_json::to_string(&b).expect("serialize");
    assert_eq!(ja, jb);
}

#[test]
fn metrics_round_trip_through_json_bit_exactly() {
    let metrics = run(&dp_heavy_config()).expect("run succeeds");
    let json = serde_json::to_string(&metrics).expect("serialize");
    let back: RunMetrics = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(metrics, back);
    let again = serde_json::to_string(&back).expect("reserialize");
    assert_eq!(json, again);
}

#[test]
fn mixed_scenario_with_mice_completes() {
    let config = SimConfig {
        run: RunSection::default(),
        topology: base_topology(RoutingMode::Adaptive, 0.0),
        scenario: ScenarioSection::Mixed(MixedParams {
            steps: 1,
            tp_heavy_steps: None,
            pp_dp_steps: None,
            seed: 99,
            traffic_scale: 1.0,
            allocation_mode: AllocationMode::Contiguous,
            stage_placement_mode: StagePlacementMode::TopologyAware,
            tp_heavy_fwd_compute_ms: 1.0,
            tp_heavy_micro_collectives: 2,
            tp_heavy_micro_collective_bytes_per_participant: 16 * 1024,
            tp_heavy_micro_compute_gap_ms: 0.1,
            tp_heavy_final_sync_bytes_per_participant: 64 * 1024,
            tp_heavy_tail_compute_ms: 0.5,
            tp_heavy_gap_us: 10.0,
            pp_dp_microbatch_count: 2,
            pp_dp_microbatch_gap_us: 50.0,
            pp_dp_activation_bytes_per_microbatch: 32 * 1024,
            pp_dp_grad_bytes_per_microbatch: 32 * 1024,
            pp_dp_dp_sync_bytes_per_participant: 64 * 1024,
            pp_dp_tail_compute_ms: 0.5,
            mice: Some(MiceParams {
                enabled: true,
                seed: 7,
                start_delay_s: 0.0,
                end_time_s: 0.002,
                interarrival_s: 0.0005,
                min_packets: 1,
                max_packets: 2,
                force_cross_rack: true,
            }),
        }),
    };

    // The pp+dp half has 2 hosts, which cannot fill 4 pipeline stages on
    // this small fabric; grow the topology instead.
    let mut config = config;
    config.topology.ai_factory_su.servers_per_leaf = 4;

    let metrics = run(&config).expect("run succeeds");
    assert_eq!(metrics.jobs.len(), 2);
    assert!(metrics.jobs.iter().all(|j| j.steps.len() == 1));
    assert!(metrics.mice_flows.count > 0);
    assert_eq!(metrics.seeds.mice, Some(7));
    assert_eq!(metrics.packets.dropped_total, 0);
}

#[test]
fn config_errors_name_the_offending_key() {
    let mut config = dp_heavy_config();
    config.topology.mtu = 0;
    let err = run(&config).expect_err("mtu 0 must fail");
    let msg = err.to_string();
    assert!(msg.contains("topology.mtu"), "unexpected message: {msg}");
    assert!(matches!(err, RunError::Config(_)));
}

#[test]
fn full_link_failure_is_a_fatal_build_error() {
    let mut config = dp_heavy_config();
    config.topology.links.failure_percent = 100.0;
    let err = run(&config).expect_err("must fail loudly");
    assert!(matches!(err, RunError::Topology(_)));
}

#[test]
fn json_config_parses_with_tagged_scenario() {
    let raw = r#"
    {
      "run": { "file_debug": false, "message_verbose": false,
               "verbose_route": false, "visualize": false },
      "topology": {
        "type": "ai-factory-su",
        "ai_factory_su": { "leaves": 2, "spines": 2, "servers_per_leaf": 2,
                           "server_parallel_links": 1,
                           "leaf_to_spine_parallel_links": 1 },
        "routing": { "mode": "flowlet", "ecmp_flowlet_n_packets": 64,
                     "flowlet_idle_gap_us": 50.0 },
        "links": { "failure_percent": 0.0,
                   "bandwidth_bps": { "server_to_leaf": 400000000000,
                                      "leaf_to_spine": 400000000000 } },
        "max_path": 16,
        "mtu": 4096,
        "ttl": 16
      },
      "scenario": {
        "name": "ai-factory-su-workload1-dp-heavy",
        "params": { "steps": 1, "seed": 42, "num_buckets": 1,
                    "bucket_bytes_per_participant": 4096, "gap_us": 0.0,
                    "t_fwd_bwd_ms": 1.0, "optimizer_ms": 0.5 }
      }
    }"#;
    let config: SimConfig = serde_json::from_str(raw).expect("parse");
    assert!(matches!(config.topology.routing.mode, RoutingMode::Flowlet));
    let metrics = run(&config).expect("run succeeds");
    assert_eq!(metrics.topology.routing_mode, "flowlet");
    assert_eq!(metrics.jobs[0].steps.len(), 1);
}
