use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::net::{FlowClass, NetWorld};
use crate::sim::{SimTime, Simulator};
use crate::topo::{build_ai_factory_su, SuTopology, SuTopologyOpts};
use crate::traffic::{install_mice, mice_hosts, mice_injected, MiceOpts};

fn su() -> (NetWorld, SuTopology) {
    let mut w = NetWorld::default();
    w.net.mtu = 4096;
    let opts = SuTopologyOpts {
        leaves: 2,
        spines: 2,
        servers_per_leaf: 2,
        server_parallel_links: 1,
        leaf_to_spine_parallel_links: 1,
        server_to_leaf_bps: 100_000_000_000,
        leaf_to_spine_bps: 100_000_000_000,
        link_failure_percent: 0.0,
        propagation: SimTime::from_micros(1),
    };
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let topo = build_ai_factory_su(&mut w.net, &opts, &mut rng).expect("build");
    (w, topo)
}

fn mice_opts(seed: u64) -> MiceOpts {
    MiceOpts {
        seed,
        start_delay: SimTime::ZERO,
        end_time: SimTime::from_millis(1),
        interarrival: SimTime::from_micros(100),
        min_packets: 1,
        max_packets: 4,
        mtu_bytes: 4096,
        force_cross_rack: true,
    }
}

#[test]
fn injects_until_the_window_closes_and_all_flows_complete() {
    let (mut w, topo) = su();
    let mut sim = Simulator::default();
    let state = install_mice(&mut sim, mice_hosts(&topo), mice_opts(5));
    sim.run(&mut w);

    // Arrivals at 0, 100us, ..., 900us; the tick at 1ms sees the window
    // closed and injects nothing.
    assert_eq!(mice_injected(&state), 10);
    let mice: Vec<_> = w
        .flows
        .completed()
        .iter()
        .filter(|f| f.class == FlowClass::Mice)
        .collect();
    assert_eq!(mice.len(), 10);
    assert!(mice.iter().all(|f| f.done_at > f.start_at));
    assert!(w.flows.unfinished().is_empty());
}

#[test]
fn mice_fct_sequence_is_deterministic_per_seed() {
    let run = |seed: u64| {
        let (mut w, topo) = su();
        let mut sim = Simulator::default();
        install_mice(&mut sim, mice_hosts(&topo), mice_opts(seed));
        sim.run(&mut w);
        w.flows
            .completed()
            .iter()
            .filter(|f| f.class == FlowClass::Mice)
            .map(|f| (f.flow_id, f.start_at, f.done_at, f.bytes))
            .collect::<Vec<_>>()
    };
    assert_eq!(run(42), run(42));
    assert_ne!(run(42), run(43), "different seeds should differ somewhere");
}

#[test]
fn mice_sizes_respect_the_packet_range() {
    let (mut w, topo) = su();
    let mut sim = Simulator::default();
    install_mice(&mut sim, mice_hosts(&topo), mice_opts(11));
    sim.run(&mut w);

    for f in w.flows.completed() {
        assert!(f.bytes >= 4096 && f.bytes <= 4 * 4096);
        assert_eq!(f.bytes % 4096, 0);
    }
}

#[test]
#[should_panic(expected = "at least 2 hosts")]
fn mice_requires_two_hosts() {
    let mut sim = Simulator::default();
    let (_, topo) = su();
    install_mice(&mut sim, mice_hosts(&topo)[..1].to_vec(), mice_opts(0));
}
