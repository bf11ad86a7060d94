//! Traffic generation: collective expansion and background mice flows.

mod collective;
mod mice;
mod ring;

pub use collective::{expand_collective, CollectiveKind};
pub use mice::{install_mice, mice_hosts, mice_injected, MiceHost, MiceOpts, SharedMiceState};
pub use ring::{build_ring_order, expand_ring_neighbor_sends, RingPlan};
