//! Event-driven job runner.
//!
//! A state machine advancing Job -> Step -> Phase, driven entirely by
//! scheduled events; it never spins or sleeps. Compute phases arm timers,
//! comm phases run their buckets as sequential barriers: bucket k+1 is not
//! scheduled until every flow of bucket k has fully delivered its bytes.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::net::{FlowClass, FlowDoneCallback, NetWorld};
use crate::sim::{Event, SimTime, Simulator, World};

use super::entities::{
    BucketMetrics, Flow, Job, JobMetrics, PhaseKind, PhaseMetrics, StepMetrics,
};
use super::injector::inject_flow;

/// Barrier over the flows of one bucket. `fired` guards against a double
/// fire, which must not happen but is cheap to fail closed on.
struct Join {
    pending: HashSet<u64>,
    fired: bool,
}

pub struct JobState {
    job: Job,
    metrics: JobMetrics,
    cursor_step: usize,
    cursor_phase: usize,
    cursor_bucket: usize,
    join: Option<Join>,
    finished: bool,
}

pub type SharedJobState = Arc<Mutex<JobState>>;

/// Install a job: its first event fires at the current simulation time.
pub fn install_job(sim: &mut Simulator, job: Job) -> SharedJobState {
    let metrics = JobMetrics::new(job.job_id, job.name.clone());
    let state = Arc::new(Mutex::new(JobState {
        job,
        metrics,
        cursor_step: 0,
        cursor_phase: 0,
        cursor_bucket: 0,
        join: None,
        finished: false,
    }));
    sim.schedule(
        sim.now(),
        StartJob {
            state: Arc::clone(&state),
        },
    );
    state
}

pub fn job_metrics(state: &SharedJobState) -> JobMetrics {
    state.lock().expect("job state lock").metrics.clone()
}

pub fn is_finished(state: &SharedJobState) -> bool {
    state.lock().expect("job state lock").finished
}

pub fn participant_count(state: &SharedJobState) -> usize {
    state.lock().expect("job state lock").job.participants.len()
}

/// Where an unfinished job was stuck when the event queue drained.
#[derive(Debug, Clone)]
pub struct JobStall {
    pub job: String,
    pub step: usize,
    pub phase: usize,
    pub phase_name: String,
    pub pending_flows: Vec<u64>,
}

pub fn stall_report(state: &SharedJobState) -> Option<JobStall> {
    let st = state.lock().expect("job state lock");
    if st.finished {
        return None;
    }
    let phase_name = st
        .job
        .steps
        .get(st.cursor_step)
        .and_then(|s| s.phases.get(st.cursor_phase))
        .map(|p| p.name.clone())
        .unwrap_or_default();
    let mut pending: Vec<u64> = st
        .join
        .as_ref()
        .map(|j| j.pending.iter().copied().collect())
        .unwrap_or_default();
    pending.sort_unstable();
    Some(JobStall {
        job: st.job.name.clone(),
        step: st.cursor_step,
        phase: st.cursor_phase,
        phase_name,
        pending_flows: pending,
    })
}

struct StartJob {
    state: SharedJobState,
}

impl Event for StartJob {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let StartJob { state } = *self;
        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        {
            let mut guard = state.lock().expect("job state lock");
            let st = &mut *guard;
            st.metrics.start = sim.now();
            info!(
                job = %st.job.name,
                job_id = st.job.job_id,
                participants = st.job.participants.len(),
                steps = st.job.steps.len(),
                "job starting"
            );
        }
        run_step(&state, 0, sim, w);
    }
}

struct PhaseDone {
    state: SharedJobState,
    step_idx: usize,
    phase_idx: usize,
}

impl Event for PhaseDone {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let PhaseDone {
            state,
            step_idx,
            phase_idx,
        } = *self;
        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        {
            let mut guard = state.lock().expect("job state lock");
            let st = &mut *guard;
            if let Some(p) = st
                .metrics
                .steps
                .last_mut()
                .and_then(|s| s.phases.last_mut())
            {
                p.end = Some(sim.now());
                debug!(job = %st.job.name, phase = %p.name, "phase finished");
            }
        }
        run_phase(&state, step_idx, phase_idx + 1, sim, w);
    }
}

struct InjectJobFlow {
    state: SharedJobState,
    flow: Flow,
}

impl Event for InjectJobFlow {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let InjectJobFlow { state, flow } = *self;
        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        let cb_state = Arc::clone(&state);
        let cb: FlowDoneCallback = Box::new(move |flow_id, sim, w| {
            on_flow_complete(&cb_state, flow_id, sim, w);
        });
        inject_flow(sim, w, &flow, FlowClass::Job, cb);
    }
}

fn run_step(state: &SharedJobState, step_idx: usize, sim: &mut Simulator, w: &mut NetWorld) {
    {
        let mut guard = state.lock().expect("job state lock");
        let st = &mut *guard;
        if step_idx >= st.job.steps.len() {
            st.metrics.end = Some(sim.now());
            st.finished = true;
            info!(job = %st.job.name, job_id = st.job.job_id, "job finished");
            return;
        }
        debug!(job = %st.job.name, step = step_idx, "step starting");
        st.cursor_step = step_idx;
        let step_id = st.job.steps[step_idx].step_id;
        st.metrics.steps.push(StepMetrics {
            step_id,
            start: sim.now(),
            end: None,
            phases: Vec::new(),
        });
    }
    run_phase(state, step_idx, 0, sim, w);
}

enum NextPhase {
    StepDone,
    Compute(SimTime),
    Comm,
}

fn run_phase(
    state: &SharedJobState,
    step_idx: usize,
    phase_idx: usize,
    sim: &mut Simulator,
    w: &mut NetWorld,
) {
    let next = {
        let mut guard = state.lock().expect("job state lock");
        let st = &mut *guard;
        if phase_idx >= st.job.steps[step_idx].phases.len() {
            if let Some(s) = st.metrics.steps.last_mut() {
                s.end = Some(sim.now());
            }
            debug!(job = %st.job.name, step = step_idx, "step finished");
            NextPhase::StepDone
        } else {
            st.cursor_phase = phase_idx;
            let phase = &st.job.steps[step_idx].phases[phase_idx];
            debug!(job = %st.job.name, step = step_idx, phase = %phase.name, "phase starting");
            let next = match &phase.kind {
                PhaseKind::Compute { duration } => NextPhase::Compute(*duration),
                PhaseKind::Comm { .. } => NextPhase::Comm,
            };
            let record = PhaseMetrics {
                phase_id: phase.phase_id,
                name: phase.name.clone(),
                start: sim.now(),
                end: None,
                buckets: Vec::new(),
            };
            st.metrics
                .steps
                .last_mut()
                .expect("step metrics pushed")
                .phases
                .push(record);
            next
        }
    };
    match next {
        NextPhase::StepDone => run_step(state, step_idx + 1, sim, w),
        NextPhase::Compute(duration) => {
            // No network activity; the timer is the whole phase.
            sim.schedule_in(
                duration,
                PhaseDone {
                    state: Arc::clone(state),
                    step_idx,
                    phase_idx,
                },
            );
        }
        NextPhase::Comm => run_bucket(state, step_idx, phase_idx, 0, sim, w),
    }
}

enum NextBucket {
    PhaseDone,
    SkipEmpty,
    Inject(Vec<Flow>),
}

fn run_bucket(
    state: &SharedJobState,
    step_idx: usize,
    phase_idx: usize,
    bucket_idx: usize,
    sim: &mut Simulator,
    w: &mut NetWorld,
) {
    let next = {
        let mut guard = state.lock().expect("job state lock");
        let st = &mut *guard;
        let PhaseKind::Comm { buckets } = &st.job.steps[step_idx].phases[phase_idx].kind else {
            unreachable!("run_bucket on a compute phase");
        };
        if bucket_idx >= buckets.len() {
            if let Some(p) = st
                .metrics
                .steps
                .last_mut()
                .and_then(|s| s.phases.last_mut())
            {
                p.end = Some(sim.now());
            }
            debug!(job = %st.job.name, step = step_idx, phase = phase_idx, "phase finished");
            NextBucket::PhaseDone
        } else {
            let bucket = &buckets[bucket_idx];
            let bucket_id = bucket.bucket_id;
            let flows = bucket.flows.clone();
            debug!(
                job = %st.job.name,
                step = step_idx,
                bucket = bucket_idx,
                flows = flows.len(),
                "bucket starting"
            );
            st.cursor_bucket = bucket_idx;
            let record = BucketMetrics {
                bucket_id,
                start: sim.now(),
                end: None,
            };
            let phase_metrics = st
                .metrics
                .steps
                .last_mut()
                .and_then(|s| s.phases.last_mut())
                .expect("phase metrics pushed");
            phase_metrics.buckets.push(record);
            if flows.is_empty() {
                phase_metrics.buckets.last_mut().expect("pushed").end = Some(sim.now());
                NextBucket::SkipEmpty
            } else {
                st.join = Some(Join {
                    pending: flows.iter().map(|f| f.flow_id).collect(),
                    fired: false,
                });
                NextBucket::Inject(flows)
            }
        }
    };
    match next {
        NextBucket::PhaseDone => run_phase(state, step_idx, phase_idx + 1, sim, w),
        NextBucket::SkipEmpty => run_bucket(state, step_idx, phase_idx, bucket_idx + 1, sim, w),
        NextBucket::Inject(flows) => {
            let now = sim.now();
            for flow in flows {
                let at = now.saturating_add(flow.start_offset);
                sim.schedule(
                    at,
                    InjectJobFlow {
                        state: Arc::clone(state),
                        flow,
                    },
                );
            }
        }
    }
}

fn on_flow_complete(state: &SharedJobState, flow_id: u64, sim: &mut Simulator, w: &mut NetWorld) {
    let advance = {
        let mut guard = state.lock().expect("job state lock");
        let st = &mut *guard;
        let done = {
            let Some(join) = st.join.as_mut() else {
                return;
            };
            if !join.pending.remove(&flow_id) {
                return;
            }
            if join.pending.is_empty() && !join.fired {
                join.fired = true;
                true
            } else {
                false
            }
        };
        if done {
            st.join = None;
            if let Some(b) = st
                .metrics
                .steps
                .last_mut()
                .and_then(|s| s.phases.last_mut())
                .and_then(|p| p.buckets.last_mut())
            {
                b.end = Some(sim.now());
            }
            debug!(
                job = %st.job.name,
                step = st.cursor_step,
                bucket = st.cursor_bucket,
                "bucket finished"
            );
            Some((st.cursor_step, st.cursor_phase, st.cursor_bucket))
        } else {
            None
        }
    };
    if let Some((step_idx, phase_idx, bucket_idx)) = advance {
        run_bucket(state, step_idx, phase_idx, bucket_idx + 1, sim, w);
    }
}
