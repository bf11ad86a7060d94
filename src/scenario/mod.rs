//! Workload builders: research scenarios expressed as `Job` hierarchies.

mod dp_heavy;
mod mixed;

pub use dp_heavy::{build_dp_heavy_job, DpHeavyConfig};
pub use mixed::{
    assign_stages, build_pp_dp_job, build_tp_heavy_job, split_participants, AllocationMode,
    PpDpConfig, StagePlacementMode, TpHeavyConfig, PIPELINE_STAGES,
};
