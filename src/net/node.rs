//! 节点类型
//!
//! 定义网络节点（主机/交换机的标签联合）、FIB 与最长前缀匹配，以及
//! 等价路径选择策略（ECMP / flowlet / 自适应）。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::ip::{IpAddr, IpPrefix};
use crate::sim::SimTime;

/// 等价下一跳的选择策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    Ecmp,
    Flowlet,
    Adaptive,
}

/// 一个简单、确定性的 64-bit mixing（替代 RandomState，避免每次运行 hash 不稳定）。
pub fn mix64(mut x: u64) -> u64 {
    // splitmix64
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// flowlet 模式的 per-flow 状态。
#[derive(Debug, Clone)]
pub(crate) struct FlowletEntry {
    pub last_seen: SimTime,
    pub chosen_port: usize,
    pub pkts_since_reroute: u32,
    /// 当前 flowlet 的五元组扰动值
    pub field: u64,
}

/// FIB 表项：前缀 -> 端口下标集合（插入顺序即候选顺序，保证确定性）。
#[derive(Debug, Clone)]
pub struct FibEntry {
    pub prefix: IpPrefix,
    pub ports: Vec<usize>,
}

/// 主机专有状态。
#[derive(Debug)]
pub struct Host {
    pub ip: IpAddr,
    pub received_count: u64,
}

/// 节点种类：主机或交换机。闭合的和类型，穷尽分派。
#[derive(Debug)]
pub enum NodeKind {
    Host(Host),
    Switch,
}

/// 网络节点：名字、种类、端口、FIB 与路由缓存。
#[derive(Debug)]
pub struct NetworkNode {
    pub name: String,
    pub kind: NodeKind,
    pub ports: Vec<super::port::Port>,
    pub(crate) fib: Vec<FibEntry>,
    /// LPM 结果缓存：dst -> (拓扑版本, 存活候选端口)
    pub(crate) lpm_cache: HashMap<u32, (u64, Vec<usize>)>,
    pub(crate) flowlet: HashMap<u64, FlowletEntry>,
}

impl NetworkNode {
    pub(crate) fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            ports: Vec::new(),
            fib: Vec::new(),
            lpm_cache: HashMap::new(),
            flowlet: HashMap::new(),
        }
    }

    pub fn is_host(&self) -> bool {
        matches!(self.kind, NodeKind::Host(_))
    }

    pub fn host_ip(&self) -> Option<IpAddr> {
        match &self.kind {
            NodeKind::Host(h) => Some(h.ip),
            NodeKind::Switch => None,
        }
    }

    /// 注册前缀 -> 端口。同一前缀多次注册即追加等价候选。
    pub(crate) fn add_route(&mut self, prefix: IpPrefix, port: usize) {
        assert!(port < self.ports.len(), "route references unknown port");
        if let Some(entry) = self.fib.iter_mut().find(|e| e.prefix == prefix) {
            if !entry.ports.contains(&port) {
                entry.ports.push(port);
            }
        } else {
            self.fib.push(FibEntry {
                prefix,
                ports: vec![port],
            });
        }
    }

    /// 最长前缀匹配：返回最长匹配前缀对应的端口候选（按插入顺序）。
    /// 无匹配时返回空集合。
    pub(crate) fn lpm_lookup(&self, dst: IpAddr) -> Vec<usize> {
        let mut best_len: i32 = -1;
        for e in &self.fib {
            if e.prefix.contains(dst) {
                best_len = best_len.max(e.prefix.len() as i32);
            }
        }
        if best_len < 0 {
            return Vec::new();
        }
        let mut out = Vec::new();
        for e in &self.fib {
            if e.prefix.len() as i32 == best_len && e.prefix.contains(dst) {
                for &p in &e.ports {
                    if !out.contains(&p) {
                        out.push(p);
                    }
                }
            }
        }
        out
    }

    pub fn port_queue_len(&self, port: usize) -> usize {
        self.ports[port].queue_len()
    }

    pub fn ports_peak_queue_lens(&self) -> Vec<usize> {
        self.ports.iter().map(|p| p.peak_queue_len).collect()
    }
}
