//! AI-Factory SU（Scalable Unit）leaf/spine 拓扑构建
//!
//! 单 SU / POD，全以太网：
//!   - `leaves` 台 ToR（leaf），`spines` 台 spine，每 leaf `servers_per_leaf` 台服务器。
//!   - 服务器以 `server_parallel_links` 条并行链路接入 leaf；
//!     每对 (leaf, spine) 之间有 `leaf_to_spine_parallel_links` 条并行链路。
//!
//! 编址与路由：
//!   - 服务器按 per-leaf /24 子网编址：10.<pod>.<leaf+1>.<srv+1>
//!   - 主机：POD /16 经所有 NIC（ECMP）
//!   - leaf：本地 per-server /32 与 per-leaf /24 走下行口；POD /16 走全部上行口
//!   - spine：per-leaf /24 走到该 leaf 的下行口
//!
//! 链路失效按配置比例在建图时用种子化 PRNG 逐链路抽取；失效链路不进
//! FIB。抽取完成后做连通性校验，校验不过即大声失败。

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use tracing::info;

use crate::net::{IpAddr, IpPrefix, Network, NodeId};
use crate::sim::SimTime;

const POD_ID: u32 = 1;

#[derive(Error, Debug)]
pub enum TopoError {
    #[error("invalid topology parameter: {0}")]
    Invalid(String),
    #[error("link failures break connectivity: {0}")]
    Connectivity(String),
}

#[derive(Debug, Clone)]
pub struct SuTopologyOpts {
    pub leaves: usize,
    pub spines: usize,
    pub servers_per_leaf: usize,
    pub server_parallel_links: usize,
    pub leaf_to_spine_parallel_links: usize,
    pub server_to_leaf_bps: u64,
    pub leaf_to_spine_bps: u64,
    /// 失效链路百分比（0-100）
    pub link_failure_percent: f64,
    pub propagation: SimTime,
}

impl Default for SuTopologyOpts {
    fn default() -> Self {
        Self {
            leaves: 8,
            spines: 4,
            servers_per_leaf: 4,
            server_parallel_links: 8,
            leaf_to_spine_parallel_links: 8,
            server_to_leaf_bps: 400_000_000_000,
            leaf_to_spine_bps: 400_000_000_000,
            link_failure_percent: 0.0,
            // 每跳 1us 传播时延
            propagation: SimTime::from_micros(1),
        }
    }
}

/// 一台服务器：节点句柄、名字与所在 leaf（机架）下标。
#[derive(Debug, Clone)]
pub struct SuHost {
    pub node: NodeId,
    pub name: String,
    pub leaf: usize,
}

#[derive(Debug, Clone)]
pub struct SuTopology {
    pub hosts: Vec<SuHost>,
    pub leaves: Vec<NodeId>,
    pub spines: Vec<NodeId>,
}

impl SuTopology {
    pub fn host_nodes(&self) -> Vec<NodeId> {
        self.hosts.iter().map(|h| h.node).collect()
    }

    pub fn rack_of(&self, node: NodeId) -> Option<usize> {
        self.hosts.iter().find(|h| h.node == node).map(|h| h.leaf)
    }
}

pub fn build_ai_factory_su(
    net: &mut Network,
    opts: &SuTopologyOpts,
    rng: &mut ChaCha8Rng,
) -> Result<SuTopology, TopoError> {
    validate(opts)?;

    let p_fail = (opts.link_failure_percent.clamp(0.0, 100.0)) / 100.0;
    let draw_failed = |rng: &mut ChaCha8Rng| -> bool {
        if opts.link_failure_percent > 0.0 {
            rng.gen_bool(p_fail)
        } else {
            false
        }
    };

    let leaves: Vec<NodeId> = (0..opts.leaves)
        .map(|leaf_i| net.add_switch(format!("su{POD_ID}_leaf{leaf_i}")))
        .collect();
    let spines: Vec<NodeId> = (0..opts.spines)
        .map(|spine_i| net.add_switch(format!("su{POD_ID}_spine{spine_i}")))
        .collect();

    let pod_prefix_16: IpPrefix = format!("10.{POD_ID}.0.0/16")
        .parse()
        .expect("valid pod prefix");

    // 主机与 Host<->Leaf 链路
    let mut hosts = Vec::with_capacity(opts.leaves * opts.servers_per_leaf);
    for (leaf_i, &leaf) in leaves.iter().enumerate() {
        let subnet_third_octet = leaf_i + 1;
        let leaf_prefix_24: IpPrefix = format!("10.{POD_ID}.{subnet_third_octet}.0/24")
            .parse()
            .expect("valid leaf prefix");

        for srv_i in 0..opts.servers_per_leaf {
            let name = format!("su{POD_ID}_leaf{leaf_i}_srv{srv_i}");
            let ip: IpAddr = format!("10.{POD_ID}.{subnet_third_octet}.{}", srv_i + 1)
                .parse()
                .expect("valid host ip");
            let host = net.add_host(name.clone(), ip);

            for k in 0..opts.server_parallel_links {
                let link = net.connect(
                    format!("su{POD_ID}_l_leaf{leaf_i}_srv{srv_i}_nic{k}"),
                    host,
                    leaf,
                    opts.server_to_leaf_bps,
                    opts.propagation,
                );
                if draw_failed(rng) {
                    net.fail_link(link);
                }
                // 主机路由：整个 POD 经任一 NIC（跨 NIC ECMP）
                let host_port = net.port_on(link, host);
                net.set_ip_routing(host, pod_prefix_16, host_port);

                // leaf 路由：该服务器的 /32 与本 leaf 的 /24 走下行口
                let server_32 = IpPrefix::new(ip, 32).expect("valid /32");
                let leaf_port = net.port_on(link, leaf);
                net.set_ip_routing(leaf, server_32, leaf_port);
                net.set_ip_routing(leaf, leaf_prefix_24, leaf_port);
            }

            hosts.push(SuHost {
                node: host,
                name,
                leaf: leaf_i,
            });
        }
    }

    // Leaf<->Spine 链路与 fabric 路由
    for (leaf_i, &leaf) in leaves.iter().enumerate() {
        for (spine_i, &spine) in spines.iter().enumerate() {
            for k in 0..opts.leaf_to_spine_parallel_links {
                let link = net.connect(
                    format!("su{POD_ID}_l_leaf{leaf_i}_spine{spine_i}_{k}"),
                    leaf,
                    spine,
                    opts.leaf_to_spine_bps,
                    opts.propagation,
                );
                if draw_failed(rng) {
                    net.fail_link(link);
                }
                // leaf：POD /16 走所有上行口（跨 spine 与并行链路 ECMP）
                let leaf_port = net.port_on(link, leaf);
                net.set_ip_routing(leaf, pod_prefix_16, leaf_port);

                // spine：各 leaf 的 /24 走到该 leaf 的下行口
                let leaf_prefix_24: IpPrefix = format!("10.{POD_ID}.{}.0/24", leaf_i + 1)
                    .parse()
                    .expect("valid leaf prefix");
                let spine_port = net.port_on(link, spine);
                net.set_ip_routing(spine, leaf_prefix_24, spine_port);
            }
        }
    }

    let topo = SuTopology {
        hosts,
        leaves,
        spines,
    };
    check_connectivity(net, opts, &topo)?;

    info!(
        leaves = opts.leaves,
        spines = opts.spines,
        servers = opts.leaves * opts.servers_per_leaf,
        links = net.links().len(),
        failed_links = net.failed_links(),
        "AI-Factory SU 拓扑已创建"
    );
    Ok(topo)
}

fn validate(opts: &SuTopologyOpts) -> Result<(), TopoError> {
    if opts.leaves == 0 || opts.spines == 0 {
        return Err(TopoError::Invalid(
            "leaves and spines must be > 0".to_string(),
        ));
    }
    if opts.servers_per_leaf == 0 {
        return Err(TopoError::Invalid("servers_per_leaf must be > 0".to_string()));
    }
    if opts.server_parallel_links == 0 || opts.leaf_to_spine_parallel_links == 0 {
        return Err(TopoError::Invalid(
            "parallel link counts must be > 0".to_string(),
        ));
    }
    if opts.leaves > 254 || opts.servers_per_leaf > 254 {
        return Err(TopoError::Invalid(
            "leaves and servers_per_leaf must fit /24 addressing".to_string(),
        ));
    }
    if !(0.0..=100.0).contains(&opts.link_failure_percent) {
        return Err(TopoError::Invalid(
            "link_failure_percent must be within 0-100".to_string(),
        ));
    }
    if opts.server_to_leaf_bps == 0 || opts.leaf_to_spine_bps == 0 {
        return Err(TopoError::Invalid("bandwidth must be > 0".to_string()));
    }
    Ok(())
}

/// 连通性校验。
///
/// leaf 把 POD /16 聚合到所有存活上行口，所以一台只被部分 leaf 可达的
/// spine 会黑洞跨机架流量。约束：
///   - 每台主机至少一条存活 NIC 链路；
///   - 每台 spine 要么对所有 leaf 存活，要么完全断开；
///   - 多 leaf 时至少一台 spine 对所有 leaf 存活。
fn check_connectivity(
    net: &Network,
    opts: &SuTopologyOpts,
    topo: &SuTopology,
) -> Result<(), TopoError> {
    for host in &topo.hosts {
        let node = net.node(host.node);
        let live_nics = node
            .ports
            .iter()
            .filter(|p| !net.link(p.link).failed)
            .count();
        if live_nics == 0 {
            return Err(TopoError::Connectivity(format!(
                "host {} has no live uplink",
                host.name
            )));
        }
    }

    if topo.leaves.len() <= 1 {
        return Ok(());
    }

    // 每台 spine：统计与多少个 leaf 之间还有存活的并行链路
    let mut fully_live_spines = 0usize;
    for (spine_i, &spine) in topo.spines.iter().enumerate() {
        let mut live_leaves = 0usize;
        for &leaf in &topo.leaves {
            let any_live = net.links().iter().any(|l| {
                !l.failed
                    && ((l.endpoints[0].node == leaf && l.endpoints[1].node == spine)
                        || (l.endpoints[0].node == spine && l.endpoints[1].node == leaf))
            });
            if any_live {
                live_leaves += 1;
            }
        }
        if live_leaves == topo.leaves.len() {
            fully_live_spines += 1;
        } else if live_leaves != 0 {
            return Err(TopoError::Connectivity(format!(
                "spine su{POD_ID}_spine{spine_i} reaches only {live_leaves}/{} leaves; \
                 aggregated /16 routes would blackhole cross-rack traffic",
                topo.leaves.len()
            )));
        }
    }
    if fully_live_spines == 0 {
        return Err(TopoError::Connectivity(format!(
            "no spine with live links to all {} leaves",
            opts.leaves
        )));
    }
    Ok(())
}
