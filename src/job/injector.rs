//! Flow injection adapter: logical `Flow` -> `send_message` + completion
//! registration. Keeps the workload layer packet-agnostic.

use crate::net::{FlowClass, FlowDoneCallback, NetWorld, Protocol};
use crate::sim::Simulator;

use super::entities::Flow;

pub const FLOW_SRC_PORT: u16 = 1000;
pub const FLOW_DST_PORT: u16 = 2000;

/// Inject one flow. Completion is detected by byte accounting at the
/// destination host; `cb` fires exactly once, via a scheduled event.
/// A zero-byte flow completes immediately at injection time and emits no
/// packets.
pub fn inject_flow(
    sim: &mut Simulator,
    w: &mut NetWorld,
    flow: &Flow,
    class: FlowClass,
    cb: FlowDoneCallback,
) {
    if flow.size_bytes == 0 {
        w.flows.complete_empty(flow.flow_id, class, sim, cb);
        return;
    }
    let dst_ip = w.net.host_ip(flow.dst);
    w.flows
        .register(flow.flow_id, dst_ip, flow.size_bytes, class, sim.now(), cb);
    w.net.send_message(
        flow.src,
        flow.flow_id,
        dst_ip,
        flow.size_bytes,
        FLOW_SRC_PORT,
        FLOW_DST_PORT,
        Protocol::Tcp,
        sim,
    );
}
