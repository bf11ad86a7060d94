//! 网络模拟模块
//!
//! 此模块包含网络模拟的核心组件，如节点、端口、链路、数据包和网络拓扑。

// 子模块声明
mod id;
mod ip;
mod packet;
mod link;
mod port;
mod node;
mod network;
mod events;
mod flows;
mod stats;
mod net_world;

// 重新导出公共接口
pub use id::{LinkId, NodeId};
pub use ip::{IpAddr, IpPrefix, ParseIpError};
pub use packet::{FiveTuple, Packet, PacketL3, PacketTracking, PacketTransport, Protocol};
pub use link::{Endpoint, Link};
pub use port::Port;
pub use node::{mix64, Host, NetworkNode, NodeKind, RoutingMode};
pub use network::{Network, PacketSummary};
pub use events::{DeliverPacket, FlowComplete, PortDrain};
pub use flows::{CompletedFlow, FlowClass, FlowDoneCallback, FlowTracker};
pub use stats::{DropReason, Stats};
pub use net_world::NetWorld;
