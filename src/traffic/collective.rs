//! Collective operations expanded into point-to-point flow schedules.

use crate::job::{Flow, IdGenerator};
use crate::net::NodeId;
use crate::sim::SimTime;

use super::ring::expand_ring_neighbor_sends;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectiveKind {
    ReduceScatter,
    AllGather,
    AllReduce,
}

impl CollectiveKind {
    pub fn tag(self) -> &'static str {
        match self {
            Self::ReduceScatter => "reduce_scatter",
            Self::AllGather => "all_gather",
            Self::AllReduce => "all_reduce",
        }
    }
}

/// Expand a collective into ring neighbor sends.
///
/// All-reduce is modeled as reduce-scatter followed by all-gather over the
/// same participant set; both halves land in the same bucket so the barrier
/// joins the union.
#[allow(clippy::too_many_arguments)]
pub fn expand_collective(
    kind: CollectiveKind,
    participants: &[NodeId],
    bytes_per_participant: u64,
    gap: SimTime,
    ids: &mut IdGenerator,
    job_id: u64,
    step_id: u32,
    phase_id: u32,
    bucket_id: Option<u32>,
) -> Vec<Flow> {
    match kind {
        CollectiveKind::ReduceScatter | CollectiveKind::AllGather => expand_ring_neighbor_sends(
            kind.tag(),
            participants,
            bytes_per_participant,
            gap,
            ids,
            job_id,
            step_id,
            phase_id,
            bucket_id,
        ),
        CollectiveKind::AllReduce => {
            let mut rs_ids = ids.child("rs");
            let mut ag_ids = ids.child("ag");
            let mut flows = expand_ring_neighbor_sends(
                "all_reduce/rs",
                participants,
                bytes_per_participant,
                gap,
                &mut rs_ids,
                job_id,
                step_id,
                phase_id,
                bucket_id,
            );
            flows.extend(expand_ring_neighbor_sends(
                "all_reduce/ag",
                participants,
                bytes_per_participant,
                gap,
                &mut ag_ids,
                job_id,
                step_id,
                phase_id,
                bucket_id,
            ));
            flows
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_reduce_is_rs_plus_ag() {
        let participants: Vec<NodeId> = (0..4).map(NodeId).collect();
        let mut ids = IdGenerator::new(11);
        let flows = expand_collective(
            CollectiveKind::AllReduce,
            &participants,
            1 << 20,
            SimTime::ZERO,
            &mut ids,
            1,
            0,
            1,
            Some(0),
        );
        assert_eq!(flows.len(), 2 * 3 * 4);
        assert!(flows.iter().any(|f| f.tag.starts_with("all_reduce/rs")));
        assert!(flows.iter().any(|f| f.tag.starts_with("all_reduce/ag")));
    }

    #[test]
    fn expansion_is_deterministic() {
        let participants: Vec<NodeId> = (0..6).map(NodeId).collect();
        let run = |seed| {
            let mut ids = IdGenerator::new(seed);
            expand_collective(
                CollectiveKind::ReduceScatter,
                &participants,
                4096,
                SimTime::from_micros(100),
                &mut ids,
                9,
                2,
                1,
                Some(3),
            )
        };
        let a = run(123);
        let b = run(123);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.flow_id, y.flow_id);
            assert_eq!(x.src, y.src);
            assert_eq!(x.dst, y.dst);
            assert_eq!(x.size_bytes, y.size_bytes);
            assert_eq!(x.start_offset, y.start_offset);
        }
    }
}
