//! 网络世界实现
//!
//! 定义网络仿真的世界（World）实现，持有网络拓扑与 flow 跟踪器。

use std::any::Any;

use super::flows::FlowTracker;
use super::network::Network;
use crate::sim::World;

/// 一个默认的网络世界实现：持有 Network 与 FlowTracker。
#[derive(Default)]
pub struct NetWorld {
    pub net: Network,
    pub flows: FlowTracker,
}

impl World for NetWorld {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
