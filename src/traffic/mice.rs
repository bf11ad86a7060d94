//! Background "mice" flows.
//!
//! An independent event source injecting small flows at a fixed, configured
//! inter-arrival, with seeded source/destination/size draws. Mice flows are
//! ordinary flows; the tracker keeps their FCT distribution separate from
//! job traffic.

use std::sync::{Arc, Mutex};

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::job::{inject_flow, Flow};
use crate::net::{FlowClass, FlowDoneCallback, NetWorld, NodeId};
use crate::sim::{Event, SimTime, Simulator, World};

use crate::topo::SuTopology;

/// First mice flow id; high enough to stay clear of workload id streams.
const MICE_FLOW_ID_BASE: u64 = 1_000_000_000;

#[derive(Debug, Clone)]
pub struct MiceOpts {
    pub seed: u64,
    pub start_delay: SimTime,
    pub end_time: SimTime,
    pub interarrival: SimTime,
    pub min_packets: u32,
    pub max_packets: u32,
    pub mtu_bytes: u32,
    pub force_cross_rack: bool,
}

/// A mice endpoint candidate: host node + rack (leaf) index.
#[derive(Debug, Clone, Copy)]
pub struct MiceHost {
    pub node: NodeId,
    pub rack: usize,
}

pub fn mice_hosts(topo: &SuTopology) -> Vec<MiceHost> {
    topo.hosts
        .iter()
        .map(|h| MiceHost {
            node: h.node,
            rack: h.leaf,
        })
        .collect()
}

pub struct MiceState {
    rng: ChaCha8Rng,
    hosts: Vec<MiceHost>,
    opts: MiceOpts,
    next_flow_id: u64,
    injected: u64,
}

pub type SharedMiceState = Arc<Mutex<MiceState>>;

pub fn install_mice(sim: &mut Simulator, hosts: Vec<MiceHost>, opts: MiceOpts) -> SharedMiceState {
    assert!(hosts.len() >= 2, "mice requires at least 2 hosts");
    assert!(opts.interarrival > SimTime::ZERO, "mice.interarrival_s must be > 0");
    assert!(
        opts.end_time > opts.start_delay,
        "mice.end_time_s must be > mice.start_delay_s"
    );
    assert!(
        opts.min_packets >= 1 && opts.min_packets <= opts.max_packets,
        "mice packet range must satisfy 1 <= min <= max"
    );
    info!(
        hosts = hosts.len(),
        seed = opts.seed,
        interarrival_ns = opts.interarrival.0,
        "installing mice injector"
    );
    let start = opts.start_delay;
    let state = Arc::new(Mutex::new(MiceState {
        rng: ChaCha8Rng::seed_from_u64(opts.seed),
        hosts,
        opts,
        next_flow_id: MICE_FLOW_ID_BASE,
        injected: 0,
    }));
    sim.schedule(
        start,
        InjectNextMice {
            state: Arc::clone(&state),
        },
    );
    state
}

pub fn mice_injected(state: &SharedMiceState) -> u64 {
    state.lock().expect("mice state lock").injected
}

impl MiceState {
    fn pick_pair(&mut self) -> (MiceHost, MiceHost) {
        let n = self.hosts.len();
        let src = self.hosts[self.rng.gen_range(0..n)];

        if self.opts.force_cross_rack {
            // Keep sampling until the rack differs; bounded, then fall back.
            for _ in 0..128 {
                let dst = self.hosts[self.rng.gen_range(0..n)];
                if dst.node != src.node && dst.rack != src.rack {
                    return (src, dst);
                }
            }
        }
        loop {
            let dst = self.hosts[self.rng.gen_range(0..n)];
            if dst.node != src.node {
                return (src, dst);
            }
        }
    }
}

struct InjectNextMice {
    state: SharedMiceState,
}

impl Event for InjectNextMice {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let InjectNextMice { state } = *self;
        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");

        let (flow, interarrival) = {
            let mut guard = state.lock().expect("mice state lock");
            let st = &mut *guard;
            if sim.now() >= st.opts.end_time {
                debug!(injected = st.injected, "mice injection window closed");
                return;
            }
            let (src, dst) = st.pick_pair();
            let range = st.opts.min_packets..=st.opts.max_packets;
            let n_packets = st.rng.gen_range(range);
            let size_bytes = u64::from(n_packets) * u64::from(st.opts.mtu_bytes);
            let flow_id = st.next_flow_id;
            st.next_flow_id += 1;
            st.injected += 1;
            let flow = Flow {
                flow_id,
                job_id: 0,
                step_id: 0,
                phase_id: 0,
                bucket_id: None,
                tag: "mice".to_string(),
                src: src.node,
                dst: dst.node,
                size_bytes,
                start_offset: SimTime::ZERO,
            };
            (flow, st.opts.interarrival)
        };

        // FCT lands in the tracker under the Mice class; nothing to join.
        let cb: FlowDoneCallback = Box::new(|_, _, _| {});
        inject_flow(sim, w, &flow, FlowClass::Mice, cb);

        sim.schedule_in(
            interarrival,
            InjectNextMice {
                state: Arc::clone(&state),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(force_cross_rack: bool, hosts: Vec<MiceHost>) -> MiceState {
        MiceState {
            rng: ChaCha8Rng::seed_from_u64(1),
            hosts,
            opts: MiceOpts {
                seed: 1,
                start_delay: SimTime::ZERO,
                end_time: SimTime::from_secs(1),
                interarrival: SimTime::from_micros(100),
                min_packets: 1,
                max_packets: 4,
                mtu_bytes: 4096,
                force_cross_rack,
            },
            next_flow_id: MICE_FLOW_ID_BASE,
            injected: 0,
        }
    }

    fn racks_of_4() -> Vec<MiceHost> {
        (0..8)
            .map(|i| MiceHost {
                node: NodeId(i),
                rack: i / 2,
            })
            .collect()
    }

    #[test]
    fn forced_pairs_always_cross_racks() {
        let mut st = state(true, racks_of_4());
        for _ in 0..200 {
            let (src, dst) = st.pick_pair();
            assert_ne!(src.node, dst.node);
            assert_ne!(src.rack, dst.rack);
        }
    }

    #[test]
    fn unforced_pairs_only_avoid_self() {
        let mut st = state(false, racks_of_4());
        let mut same_rack_seen = false;
        for _ in 0..200 {
            let (src, dst) = st.pick_pair();
            assert_ne!(src.node, dst.node);
            if src.rack == dst.rack {
                same_rack_seen = true;
            }
        }
        assert!(same_rack_seen, "unforced picking should allow same-rack pairs");
    }

    #[test]
    fn forced_picking_falls_back_when_only_one_rack_exists() {
        let hosts: Vec<MiceHost> = (0..4)
            .map(|i| MiceHost {
                node: NodeId(i),
                rack: 0,
            })
            .collect();
        let mut st = state(true, hosts);
        let (src, dst) = st.pick_pair();
        assert_ne!(src.node, dst.node);
    }
}
