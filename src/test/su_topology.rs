use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::net::{NetWorld, Protocol};
use crate::sim::{SimTime, Simulator};
use crate::topo::{build_ai_factory_su, SuTopologyOpts, TopoError};

fn opts(failure_percent: f64) -> SuTopologyOpts {
    SuTopologyOpts {
        leaves: 2,
        spines: 2,
        servers_per_leaf: 2,
        server_parallel_links: 2,
        leaf_to_spine_parallel_links: 2,
        server_to_leaf_bps: 400_000_000_000,
        leaf_to_spine_bps: 400_000_000_000,
        link_failure_percent: failure_percent,
        propagation: SimTime::from_micros(1),
    }
}

#[test]
fn builds_the_expected_entity_counts_and_addresses() {
    let mut w = NetWorld::default();
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let topo = build_ai_factory_su(&mut w.net, &opts(0.0), &mut rng).expect("build");

    assert_eq!(topo.hosts.len(), 4);
    assert_eq!(topo.leaves.len(), 2);
    assert_eq!(topo.spines.len(), 2);
    assert_eq!(w.net.host_count(), 4);
    assert_eq!(w.net.switch_count(), 4);
    // Host NIC links: 4 x 2; leaf-spine: 2 x 2 x 2.
    assert_eq!(w.net.links().len(), 8 + 8);

    let h = w.net.node_by_name("su1_leaf0_srv0").expect("host exists");
    assert_eq!(w.net.host_ip(h).to_string(), "10.1.1.1");
    let h = w.net.node_by_name("su1_leaf1_srv1").expect("host exists");
    assert_eq!(w.net.host_ip(h).to_string(), "10.1.2.2");
    assert_eq!(topo.rack_of(h), Some(1));
}

#[test]
fn cross_rack_traffic_traverses_the_fabric() {
    let mut w = NetWorld::default();
    w.net.mtu = 4096;
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let topo = build_ai_factory_su(&mut w.net, &opts(0.0), &mut rng).expect("build");

    let mut sim = Simulator::default();
    let src = topo.hosts[0].node; // leaf 0
    let dst = topo.hosts[2].node; // leaf 1
    let dst_ip = w.net.host_ip(dst);
    w.net
        .send_message(src, 1, dst_ip, 4096, 1000, 2000, Protocol::Tcp, &mut sim);
    sim.run(&mut w);

    assert_eq!(w.net.stats.delivered_pkts, 1);
    assert_eq!(w.net.stats.dropped_total(), 0);
}

#[test]
fn same_rack_traffic_stays_under_the_leaf() {
    let mut w = NetWorld::default();
    w.net.mtu = 4096;
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let topo = build_ai_factory_su(&mut w.net, &opts(0.0), &mut rng).expect("build");

    let mut sim = Simulator::default();
    let src = topo.hosts[0].node;
    let dst = topo.hosts[1].node; // same leaf
    let dst_ip = w.net.host_ip(dst);
    w.net
        .send_message(src, 1, dst_ip, 4096, 1000, 2000, Protocol::Tcp, &mut sim);
    sim.run(&mut w);

    assert_eq!(w.net.stats.delivered_pkts, 1);
    // No spine port ever saw traffic.
    for &spine in &topo.spines {
        for port in &w.net.node(spine).ports {
            assert_eq!(port.enqueued_pkts, 0);
        }
    }
}

#[test]
fn zero_failure_percent_fails_no_links() {
    let mut w = NetWorld::default();
    let mut rng = ChaCha8Rng::seed_from_u64(123);
    build_ai_factory_su(&mut w.net, &opts(0.0), &mut rng).expect("build");
    assert_eq!(w.net.failed_links(), 0);
}

#[test]
fn full_failure_percent_fails_loudly() {
    let mut w = NetWorld::default();
    let mut rng = ChaCha8Rng::seed_from_u64(123);
    let err = build_ai_factory_su(&mut w.net, &opts(100.0), &mut rng)
        .expect_err("100% failures cannot be connected");
    assert!(matches!(err, TopoError::Connectivity(_)));
}

#[test]
fn build_is_deterministic_for_a_fixed_failure_seed() {
    let build = || {
        let mut w = NetWorld::default();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let result = build_ai_factory_su(&mut w.net, &opts(10.0), &mut rng);
        let failed: Vec<String> = w
            .net
            .links()
            .iter()
            .filter(|l| l.failed)
            .map(|l| l.name.clone())
            .collect();
        (result.is_ok(), failed, w.net.links().len())
    };
    let (ok_a, failed_a, links_a) = build();
    let (ok_b, failed_b, links_b) = build();
    assert_eq!(ok_a, ok_b);
    assert_eq!(failed_a, failed_b);
    assert_eq!(links_a, links_b);
}

#[test]
fn invalid_parameters_are_rejected() {
    let mut w = NetWorld::default();
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let mut bad = opts(0.0);
    bad.leaves = 0;
    assert!(matches!(
        build_ai_factory_su(&mut w.net, &bad, &mut rng),
        Err(TopoError::Invalid(_))
    ));

    let mut w = NetWorld::default();
    let mut bad = opts(0.0);
    bad.link_failure_percent = 250.0;
    assert!(matches!(
        build_ai_factory_su(&mut w.net, &bad, &mut rng),
        Err(TopoError::Invalid(_))
    ));
}
