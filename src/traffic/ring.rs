//! Ring schedule expansion.
//!
//! Minimum viable ring model: P participants, P-1 steps; at step s every
//! node sends one chunk to its ring successor; all flows of step s start at
//! `s * gap`. Completion of the whole pattern is "all flows delivered",
//! which the bucket barrier enforces.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::job::{Flow, IdGenerator};
use crate::net::NodeId;
use crate::sim::SimTime;

/// A deterministic ring order.
#[derive(Debug, Clone)]
pub struct RingPlan {
    pub participants: Vec<NodeId>,
}

impl RingPlan {
    pub fn next_of(&self, idx: usize) -> NodeId {
        self.participants[(idx + 1) % self.participants.len()]
    }
}

/// Deterministic seeded shuffle: the same seed always yields the same order.
pub fn build_ring_order(participants: &[NodeId], seed: u64) -> RingPlan {
    let mut out = participants.to_vec();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    for i in (1..out.len()).rev() {
        let j = rng.gen_range(0..=i);
        out.swap(i, j);
    }
    RingPlan { participants: out }
}

// Deterministic remainder split: the first `rem` steps get one extra byte.
fn chunk_sizes(bytes_per_participant: u64, p: u64) -> Vec<u64> {
    let base = bytes_per_participant / p;
    let rem = bytes_per_participant % p;
    (0..p).map(|i| base + u64::from(i < rem)).collect()
}

#[allow(clippy::too_many_arguments)]
pub fn expand_ring_neighbor_sends(
    op_tag: &str,
    participants: &[NodeId],
    bytes_per_participant: u64,
    gap: SimTime,
    ids: &mut IdGenerator,
    job_id: u64,
    step_id: u32,
    phase_id: u32,
    bucket_id: Option<u32>,
) -> Vec<Flow> {
    let p = participants.len();
    if p < 2 {
        return Vec::new();
    }

    let ring = build_ring_order(participants, ids.seed());
    let steps = p - 1;
    let chunk_per_step = chunk_sizes(bytes_per_participant, p as u64);

    let mut flows = Vec::with_capacity(steps * p);
    for s in 0..steps {
        let start = SimTime(gap.0.saturating_mul(s as u64));
        for (i, &sender) in ring.participants.iter().enumerate() {
            let receiver = ring.next_of(i);
            flows.push(Flow {
                flow_id: ids.next_id(),
                job_id,
                step_id,
                phase_id,
                bucket_id,
                tag: format!("{op_tag}/ring_step_{s}"),
                src: sender,
                dst: receiver,
                size_bytes: chunk_per_step[s],
                start_offset: start,
            });
        }
    }
    flows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(n: usize) -> Vec<NodeId> {
        (0..n).map(NodeId).collect()
    }

    #[test]
    fn ring_order_is_deterministic_per_seed() {
        let p = nodes(8);
        let a = build_ring_order(&p, 5);
        let b = build_ring_order(&p, 5);
        assert_eq!(a.participants, b.participants);

        let mut sorted = a.participants.clone();
        sorted.sort();
        assert_eq!(sorted, p, "shuffle must be a permutation");
    }

    #[test]
    fn ring_expansion_counts_and_offsets() {
        let p = nodes(4);
        let mut ids = IdGenerator::new(3);
        let flows = expand_ring_neighbor_sends(
            "reduce_scatter",
            &p,
            100,
            SimTime::from_micros(10),
            &mut ids,
            1,
            0,
            1,
            Some(0),
        );
        // 3 steps x 4 senders
        assert_eq!(flows.len(), 12);
        // ceil split of 100 over 4: every step chunk is 25
        assert!(flows.iter().all(|f| f.size_bytes == 25));
        for f in &flows {
            let step: u64 = f
                .tag
                .rsplit('_')
                .next()
                .and_then(|s| s.parse().ok())
                .expect("step suffix");
            assert_eq!(f.start_offset, SimTime::from_micros(10 * step));
        }
    }

    #[test]
    fn chunk_sizes_spread_remainder() {
        assert_eq!(chunk_sizes(10, 4), vec![3, 3, 2, 2]);
        assert_eq!(chunk_sizes(8, 4), vec![2, 2, 2, 2]);
    }

    #[test]
    fn fewer_than_two_participants_yield_no_flows() {
        let mut ids = IdGenerator::new(0);
        let flows = expand_ring_neighbor_sends(
            "all_gather",
            &nodes(1),
            100,
            SimTime::ZERO,
            &mut ids,
            1,
            0,
            1,
            None,
        );
        assert!(flows.is_empty());
    }
}
