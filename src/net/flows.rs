//! Flow 跟踪器
//!
//! 注入侧把逻辑 flow 登记到这里；交付侧按“目的主机 + flow_id”做
//! 字节记账，凑齐应收字节后恰好触发一次完成回调。丢包不会被补偿：
//! 缺字节的 flow 永远不完成，表现为屏障停摆（有意的建模选择）。

use std::collections::HashMap;

use tracing::debug;

use super::events::FlowComplete;
use super::ip::IpAddr;
use super::net_world::NetWorld;
use super::packet::Packet;
use crate::sim::{SimTime, Simulator};

/// flow 完成回调。在 `FlowComplete` 事件里执行，可安全访问整个世界。
pub type FlowDoneCallback = Box<dyn FnOnce(u64, &mut Simulator, &mut NetWorld) + Send>;

/// flow 的归类：作业流量或背景 mice 流量（指标分开统计）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowClass {
    Job,
    Mice,
}

struct ActiveFlow {
    dst_ip: IpAddr,
    expected_bytes: u64,
    received_bytes: u64,
    class: FlowClass,
    start_at: SimTime,
    cb: Option<FlowDoneCallback>,
}

/// 已完成 flow 的记录（FCT 统计用）。
#[derive(Debug, Clone)]
pub struct CompletedFlow {
    pub flow_id: u64,
    pub class: FlowClass,
    pub start_at: SimTime,
    pub done_at: SimTime,
    pub bytes: u64,
}

/// Flow 注册表 + 字节记账。
#[derive(Default)]
pub struct FlowTracker {
    active: HashMap<u64, ActiveFlow>,
    completed: Vec<CompletedFlow>,
}

impl FlowTracker {
    pub fn register(
        &mut self,
        flow_id: u64,
        dst_ip: IpAddr,
        expected_bytes: u64,
        class: FlowClass,
        now: SimTime,
        cb: FlowDoneCallback,
    ) {
        assert!(expected_bytes > 0, "zero-byte flows complete at injection");
        let prev = self.active.insert(
            flow_id,
            ActiveFlow {
                dst_ip,
                expected_bytes,
                received_bytes: 0,
                class,
                start_at: now,
                cb: Some(cb),
            },
        );
        assert!(prev.is_none(), "flow_id {flow_id} registered twice");
    }

    /// 零字节 flow：不产生任何包，注入当下即完成。
    pub fn complete_empty(
        &mut self,
        flow_id: u64,
        class: FlowClass,
        sim: &mut Simulator,
        cb: FlowDoneCallback,
    ) {
        let now = sim.now();
        self.completed.push(CompletedFlow {
            flow_id,
            class,
            start_at: now,
            done_at: now,
            bytes: 0,
        });
        sim.schedule(now, FlowComplete { flow_id, cb });
    }

    /// 主机交付回调：只在注册的目的主机上计账。
    pub fn on_host_delivery(&mut self, pkt: &Packet, sim: &mut Simulator) {
        let flow_id = pkt.transport.flow_id;
        let Some(state) = self.active.get_mut(&flow_id) else {
            return;
        };
        if pkt.l3.five_tuple.dst_ip != state.dst_ip {
            return;
        }

        state.received_bytes += pkt.l3.size_bytes as u64;
        assert!(
            state.received_bytes <= state.expected_bytes.saturating_mul(2),
            "flow {flow_id} received {} bytes, more than twice the expected {}",
            state.received_bytes,
            state.expected_bytes
        );

        if state.received_bytes >= state.expected_bytes {
            let mut state = self.active.remove(&flow_id).expect("present");
            let now = sim.now();
            debug!(
                flow_id,
                bytes = state.received_bytes,
                fct_ns = now.saturating_sub(state.start_at).0,
                "✅ flow 完成"
            );
            self.completed.push(CompletedFlow {
                flow_id,
                class: state.class,
                start_at: state.start_at,
                done_at: now,
                bytes: state.received_bytes,
            });
            let cb = state.cb.take().expect("callback taken once");
            sim.schedule(now, FlowComplete { flow_id, cb });
        }
    }

    pub fn completed(&self) -> &[CompletedFlow] {
        &self.completed
    }

    /// 仍未完成的 flow id（升序，便于稳定报告）。
    pub fn unfinished(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.active.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
