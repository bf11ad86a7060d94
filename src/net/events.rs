//! 网络事件
//!
//! 定义网络模拟中的调度事件：数据包交付、端口 drain、flow 完成回调。

use super::flows::FlowDoneCallback;
use super::id::NodeId;
use super::net_world::NetWorld;
use super::packet::Packet;
use crate::sim::{Event, Simulator, World};

/// 事件：把一个 packet 交给某个节点处理。
#[derive(Debug)]
pub struct DeliverPacket {
    pub to: NodeId,
    pub pkt: Packet,
}

impl Event for DeliverPacket {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let DeliverPacket { to, pkt } = *self;
        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        if let Some(delivered) = w.net.deliver(to, pkt, sim) {
            // 主机层交付：通知 flow 跟踪器做字节记账
            w.flows.on_host_delivery(&delivered, sim);
        }
    }
}

/// 事件：尝试把端口队头交给链路发送。
#[derive(Debug)]
pub struct PortDrain {
    pub node: NodeId,
    pub port: usize,
}

impl Event for PortDrain {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let PortDrain { node, port } = *self;
        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        w.net.on_port_drain(node, port, sim);
    }
}

/// 事件：flow 完成，执行完成回调。
///
/// 完成回调不在交付现场同步执行，而是调度到当前时刻，避免
/// “收包 -> 屏障 -> 注入新 flow -> 收包”的深递归。
pub struct FlowComplete {
    pub flow_id: u64,
    pub cb: FlowDoneCallback,
}

impl Event for FlowComplete {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let FlowComplete { flow_id, cb } = *self;
        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        cb(flow_id, sim, w);
    }
}
