//! Job hierarchy, deterministic ids, the event-driven runner, and the
//! flow injection adapter.

mod entities;
mod ids;
mod injector;
mod runner;

pub use entities::{
    Bucket, BucketMetrics, Flow, Job, JobMetrics, JobStep, Phase, PhaseKind, PhaseMetrics,
    StepMetrics,
};
pub use ids::IdGenerator;
pub use injector::{inject_flow, FLOW_DST_PORT, FLOW_SRC_PORT};
pub use runner::{
    install_job, is_finished, job_metrics, participant_count, stall_report, JobStall,
    SharedJobState,
};
