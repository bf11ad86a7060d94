//! 网络拓扑管理
//!
//! 定义网络拓扑结构（节点/链路竞技场），包含路由表注册、数据包发送、
//! 转发与交付，以及统计信息。所有实体通过整数句柄互相引用，避免
//! 循环所有权。

use std::collections::{HashMap, VecDeque};

use tracing::{debug, info, trace};

use super::events::{DeliverPacket, PortDrain};
use super::id::{LinkId, NodeId};
use super::ip::IpAddr;
use super::link::{Endpoint, Link};
use super::node::{mix64, FlowletEntry, Host, NetworkNode, NodeKind, RoutingMode};
use super::packet::{FiveTuple, Packet, PacketL3, PacketTracking, PacketTransport, Protocol};
use super::port::Port;
use super::stats::{DropReason, Stats};
use crate::sim::{SimTime, Simulator};

/// 数据包历史环的容量（有界，防止长跑内存增长）。
const HISTORY_CAP: usize = 4096;

/// 历史环中保留的包摘要。
#[derive(Debug, Clone)]
pub struct PacketSummary {
    pub global_id: u64,
    pub flow_id: u64,
    pub birth_time: SimTime,
    pub size_bytes: u32,
}

/// 网络拓扑（fabric）。
pub struct Network {
    nodes: Vec<NetworkNode>,
    links: Vec<Link>,
    names: HashMap<String, NodeId>,
    pub stats: Stats,

    pub routing_mode: RoutingMode,
    /// flowlet 的包计数阈值；0 表示关闭该触发
    pub flowlet_n_packets: u32,
    /// flowlet 的空闲间隙阈值；0 表示关闭该触发
    pub flowlet_idle_gap: SimTime,
    pub mtu: u32,
    pub ttl: u8,
    /// verbose 轨迹的最大记录跳数
    pub max_path: u32,
    pub verbose_route: bool,
    pub message_verbose: bool,

    ecmp_salt: u64,
    topo_version: u64,
    next_pkt_id: u64,
    history: VecDeque<PacketSummary>,
}

impl Default for Network {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            links: Vec::new(),
            names: HashMap::new(),
            stats: Stats::default(),
            routing_mode: RoutingMode::Ecmp,
            flowlet_n_packets: 0,
            flowlet_idle_gap: SimTime::ZERO,
            mtu: 4096,
            ttl: 16,
            max_path: 16,
            verbose_route: false,
            message_verbose: false,
            // 固定盐，保证每次运行 ECMP 选择可重复
            ecmp_salt: 0xC5A1_DA7A_5EED_1234,
            topo_version: 0,
            next_pkt_id: 0,
            history: VecDeque::new(),
        }
    }
}

impl Network {
    /// 添加主机节点
    pub fn add_host(&mut self, name: impl Into<String>, ip: IpAddr) -> NodeId {
        let name = name.into();
        let id = NodeId(self.nodes.len());
        assert!(
            self.names.insert(name.clone(), id).is_none(),
            "duplicate node name: {name}"
        );
        self.nodes.push(NetworkNode::new(
            name,
            NodeKind::Host(Host {
                ip,
                received_count: 0,
            }),
        ));
        id
    }

    /// 添加交换机节点
    pub fn add_switch(&mut self, name: impl Into<String>) -> NodeId {
        let name = name.into();
        let id = NodeId(self.nodes.len());
        assert!(
            self.names.insert(name.clone(), id).is_none(),
            "duplicate node name: {name}"
        );
        self.nodes.push(NetworkNode::new(name, NodeKind::Switch));
        id
    }

    /// 连接两个节点：创建一条全双工链路，并在两端各新建一个端口。
    pub fn connect(
        &mut self,
        name: impl Into<String>,
        a: NodeId,
        b: NodeId,
        bandwidth_bps: u64,
        propagation: SimTime,
    ) -> LinkId {
        let link_id = LinkId(self.links.len());
        let port_a = self.nodes[a.0].ports.len();
        self.nodes[a.0].ports.push(Port::new(link_id, 0));
        let port_b = self.nodes[b.0].ports.len();
        self.nodes[b.0].ports.push(Port::new(link_id, 1));
        self.links.push(Link::new(
            name,
            Endpoint { node: a, port: port_a },
            Endpoint { node: b, port: port_b },
            bandwidth_bps,
            propagation,
        ));
        self.topo_version = self.topo_version.wrapping_add(1);
        link_id
    }

    /// 将链路标记为失效。路由缓存随拓扑版本一起失效。
    pub fn fail_link(&mut self, link: LinkId) {
        self.links[link.0].failed = true;
        self.topo_version = self.topo_version.wrapping_add(1);
    }

    /// 查询节点在某链路上的端口下标。
    pub fn port_on(&self, link: LinkId, node: NodeId) -> usize {
        let l = &self.links[link.0];
        if l.endpoints[0].node == node {
            l.endpoints[0].port
        } else {
            assert!(l.endpoints[1].node == node, "node not on link");
            l.endpoints[1].port
        }
    }

    /// 注册前缀路由。失效链路上的端口不会进表（视同未学到该路由）。
    pub fn set_ip_routing(&mut self, node: NodeId, prefix: super::ip::IpPrefix, port: usize) {
        let link = self.nodes[node.0].ports[port].link;
        if self.links[link.0].failed {
            return;
        }
        self.nodes[node.0].add_route(prefix, port);
    }

    pub fn node(&self, id: NodeId) -> &NetworkNode {
        &self.nodes[id.0]
    }

    pub fn nodes(&self) -> &[NetworkNode] {
        &self.nodes
    }

    pub fn link(&self, id: LinkId) -> &Link {
        &self.links[id.0]
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    pub fn host_ip(&self, id: NodeId) -> IpAddr {
        self.nodes[id.0].host_ip().expect("node is not a host")
    }

    pub fn history(&self) -> &VecDeque<PacketSummary> {
        &self.history
    }

    /// 发送一条应用消息：按 MTU 切包并逐包提交给出端口。
    /// 主机从不阻塞；本次调用即把所有包排入队列。
    pub fn send_message(
        &mut self,
        src: NodeId,
        flow_id: u64,
        dst_ip: IpAddr,
        size_bytes: u64,
        src_port: u16,
        dst_port: u16,
        protocol: Protocol,
        sim: &mut Simulator,
    ) {
        assert!(size_bytes > 0, "zero-byte messages never reach the wire");
        let src_ip = self.nodes[src.0]
            .host_ip()
            .expect("send_message from non-host node");
        let mtu = self.mtu as u64;
        let count = ((size_bytes + mtu - 1) / mtu) as u32;

        if self.message_verbose {
            debug!(
                node = %self.nodes[src.0].name,
                flow_id,
                size_bytes,
                packets = count,
                "📤 主机发送消息"
            );
        }

        for i in 0..count {
            let pkt_size = if u64::from(i + 1) < u64::from(count) {
                self.mtu
            } else {
                (size_bytes - mtu * (u64::from(count) - 1)) as u32
            };
            let global_id = self.next_pkt_id;
            self.next_pkt_id = self.next_pkt_id.wrapping_add(1);
            let pkt = Packet {
                l3: PacketL3 {
                    five_tuple: FiveTuple::new(src_ip, dst_ip, src_port, dst_port, protocol),
                    seq_number: i,
                    size_bytes: pkt_size,
                    ttl: self.ttl,
                    dropped: false,
                },
                transport: PacketTransport {
                    flow_id,
                    flow_count: count,
                    flow_seq: i,
                },
                tracking: PacketTracking {
                    global_id,
                    birth_time: sim.now(),
                    hops_taken: 0,
                    route: if self.verbose_route {
                        Some(vec![src])
                    } else {
                        None
                    },
                    delivered: false,
                    arrival_time: None,
                },
            };
            self.stats.created_pkts += 1;
            self.history_push(&pkt);
            self.internal_send(src, pkt, sim);
        }
    }

    fn history_push(&mut self, pkt: &Packet) {
        if self.history.len() == HISTORY_CAP {
            self.history.pop_front();
        }
        self.history.push_back(PacketSummary {
            global_id: pkt.tracking.global_id,
            flow_id: pkt.transport.flow_id,
            birth_time: pkt.tracking.birth_time,
            size_bytes: pkt.l3.size_bytes,
        });
    }

    fn internal_send(&mut self, from: NodeId, mut pkt: Packet, sim: &mut Simulator) {
        match self.select_port_for_packet(from, &mut pkt, sim.now()) {
            Some(p) => self.enqueue_on_port(from, p, pkt, sim),
            None => {
                pkt.l3.dropped = true;
                self.stats.record_drop(DropReason::NoRoute);
                debug!(
                    node = %self.nodes[from.0].name,
                    dst = %pkt.l3.five_tuple.dst_ip,
                    "无路由可达目的地，丢弃数据包"
                );
            }
        }
    }

    /// 最长前缀匹配 + 存活链路过滤，结果按拓扑版本缓存。
    pub(crate) fn route_candidates(&mut self, node: NodeId, dst: IpAddr) -> Vec<usize> {
        let version = self.topo_version;
        let links = &self.links;
        let node_ref = &mut self.nodes[node.0];
        if let Some((v, cached)) = node_ref.lpm_cache.get(&dst.0) {
            if *v == version {
                return cached.clone();
            }
        }
        let mut cands = node_ref.lpm_lookup(dst);
        cands.retain(|&p| !links[node_ref.ports[p].link.0].failed);
        node_ref.lpm_cache.insert(dst.0, (version, cands.clone()));
        cands
    }

    /// 为数据包选择出端口。候选为空时返回 None（调用方按无路由丢弃）。
    pub(crate) fn select_port_for_packet(
        &mut self,
        node: NodeId,
        pkt: &mut Packet,
        now: SimTime,
    ) -> Option<usize> {
        let cands = self.route_candidates(node, pkt.l3.five_tuple.dst_ip);
        if cands.is_empty() {
            return None;
        }
        let salt = self.ecmp_salt;
        let mode = self.routing_mode;
        let n_thresh = self.flowlet_n_packets;
        let idle_gap = self.flowlet_idle_gap;
        let pick = move |hash: u64, set: &[usize]| -> usize {
            set[(mix64(hash ^ salt) % set.len() as u64) as usize]
        };
        let node_ref = &mut self.nodes[node.0];

        let chosen = match mode {
            RoutingMode::Ecmp => pick(pkt.l3.five_tuple.hash64(), &cands),
            RoutingMode::Adaptive => {
                // 候选中取出队列最短的端口；并列时用 ECMP 哈希定序
                let min_len = cands
                    .iter()
                    .map(|&p| node_ref.ports[p].queue_len())
                    .min()
                    .expect("non-empty candidates");
                let best: Vec<usize> = cands
                    .iter()
                    .copied()
                    .filter(|&p| node_ref.ports[p].queue_len() == min_len)
                    .collect();
                pick(pkt.l3.five_tuple.hash64(), &best)
            }
            RoutingMode::Flowlet => {
                if n_thresh == 0 && idle_gap == SimTime::ZERO {
                    // 两个阈值都为 0：flowlet 关闭，退化为纯 ECMP
                    pick(pkt.l3.five_tuple.hash64(), &cands)
                } else {
                    let flow_id = pkt.transport.flow_id;
                    let initial_field = pkt.l3.five_tuple.flowlet_field();
                    let entry =
                        node_ref
                            .flowlet
                            .entry(flow_id)
                            .or_insert_with(|| FlowletEntry {
                                last_seen: now,
                                chosen_port: usize::MAX,
                                pkts_since_reroute: 0,
                                field: initial_field,
                            });
                    let fresh = entry.chosen_port == usize::MAX;
                    let mut reroute = fresh;
                    if n_thresh > 0 && entry.pkts_since_reroute >= n_thresh {
                        reroute = true;
                    }
                    if idle_gap > SimTime::ZERO
                        && now.saturating_sub(entry.last_seen) > idle_gap
                    {
                        reroute = true;
                    }
                    if reroute && !fresh {
                        // 新 flowlet：扰动哈希字段，让后续交换机也换路
                        entry.field = entry.field.wrapping_add(1);
                    }
                    if reroute {
                        entry.pkts_since_reroute = 0;
                    }
                    pkt.l3.five_tuple.set_flowlet_field(entry.field);
                    if reroute || !cands.contains(&entry.chosen_port) {
                        entry.chosen_port = pick(pkt.l3.five_tuple.hash64(), &cands);
                    }
                    entry.pkts_since_reroute += 1;
                    entry.last_seen = now;
                    entry.chosen_port
                }
            }
        };
        Some(chosen)
    }

    /// 把数据包排入节点的出端口，并保证有 drain 事件在途。
    pub(crate) fn enqueue_on_port(
        &mut self,
        node: NodeId,
        port_idx: usize,
        mut pkt: Packet,
        sim: &mut Simulator,
    ) {
        let link_id = self.nodes[node.0].ports[port_idx].link;
        if self.links[link_id.0].failed {
            // 路由层通常已过滤失效链路；这里兜底计数
            pkt.l3.dropped = true;
            self.links[link_id.0].dropped_pkts += 1;
            self.stats.record_drop(DropReason::LinkFailed);
            return;
        }
        let port = &mut self.nodes[node.0].ports[port_idx];
        port.push(pkt);
        if !port.drain_scheduled {
            port.drain_scheduled = true;
            sim.schedule(
                sim.now(),
                PortDrain {
                    node,
                    port: port_idx,
                },
            );
        }
    }

    /// 端口 drain：循环发送队头，直到队列空或链路在忙。
    /// 链路忙时在其空闲时刻重试，不出队，保证端口 FIFO 且不重复占用链路。
    pub(crate) fn on_port_drain(&mut self, node: NodeId, port_idx: usize, sim: &mut Simulator) {
        loop {
            let now = sim.now();
            let (link_id, dir, empty) = {
                let port = &self.nodes[node.0].ports[port_idx];
                (port.link, port.dir, port.queue.is_empty())
            };
            if empty {
                self.nodes[node.0].ports[port_idx].drain_scheduled = false;
                return;
            }
            if self.links[link_id.0].failed {
                // 链路失效：清空队列并计入失效丢包
                let mut dropped: u64 = 0;
                {
                    let port = &mut self.nodes[node.0].ports[port_idx];
                    while let Some(mut pkt) = port.queue.pop_front() {
                        pkt.l3.dropped = true;
                        dropped += 1;
                    }
                    port.drain_scheduled = false;
                }
                self.links[link_id.0].dropped_pkts += dropped;
                for _ in 0..dropped {
                    self.stats.record_drop(DropReason::LinkFailed);
                }
                return;
            }
            let next_free = self.links[link_id.0].next_available[dir];
            if next_free > now {
                // drain_scheduled 保持 true，事件改到链路空闲时刻
                sim.schedule(
                    next_free,
                    PortDrain {
                        node,
                        port: port_idx,
                    },
                );
                return;
            }

            let pkt = self.nodes[node.0].ports[port_idx]
                .queue
                .pop_front()
                .expect("checked non-empty");
            let (depart, arrive) =
                self.links[link_id.0].commit_transmit(dir, pkt.l3.size_bytes, now);
            let to = self.links[link_id.0].peer(dir).node;
            trace!(
                link = %self.links[link_id.0].name,
                pkt_id = pkt.tracking.global_id,
                depart = ?depart,
                arrive = ?arrive,
                "链路发送队头数据包"
            );
            sim.schedule(arrive, DeliverPacket { to, pkt });
        }
    }

    /// 数据包到达节点：主机消费（返回已交付的包），交换机转发。
    #[tracing::instrument(skip(self, sim, pkt), fields(pkt_id = pkt.tracking.global_id, flow_id = pkt.transport.flow_id, to = ?to))]
    pub(crate) fn deliver(
        &mut self,
        to: NodeId,
        mut pkt: Packet,
        sim: &mut Simulator,
    ) -> Option<Packet> {
        pkt.tracking.hops_taken = pkt.tracking.hops_taken.saturating_add(1);
        if let Some(route) = pkt.tracking.route.as_mut() {
            if route.len() < self.max_path as usize {
                route.push(to);
            }
        }

        if self.nodes[to.0].is_host() {
            let now = sim.now();
            let node = &mut self.nodes[to.0];
            let NodeKind::Host(host) = &mut node.kind else {
                unreachable!("is_host checked");
            };
            if pkt.l3.five_tuple.dst_ip == host.ip {
                host.received_count += 1;
                pkt.tracking.delivered = true;
                pkt.tracking.arrival_time = Some(now);
                self.stats.delivered_pkts += 1;
                self.stats.delivered_bytes += pkt.l3.size_bytes as u64;
                if self.message_verbose {
                    info!(
                        host = %node.name,
                        pkt_id = pkt.tracking.global_id,
                        flow_id = pkt.transport.flow_id,
                        "📬 已到达目的地，标记为已送达"
                    );
                }
                Some(pkt)
            } else {
                // 主机收到不属于自己的包：按目的不可达计数丢弃
                pkt.l3.dropped = true;
                self.stats.record_drop(DropReason::HostUnreachable);
                None
            }
        } else {
            // 交换机：转发前递减 TTL，归零即丢弃
            pkt.l3.ttl = pkt.l3.ttl.saturating_sub(1);
            if pkt.l3.ttl == 0 {
                pkt.l3.dropped = true;
                self.stats.record_drop(DropReason::TtlExpired);
                debug!(node = %self.nodes[to.0].name, "TTL 耗尽，丢弃数据包");
                return None;
            }
            match self.select_port_for_packet(to, &mut pkt, sim.now()) {
                Some(p) => {
                    self.enqueue_on_port(to, p, pkt, sim);
                    None
                }
                None => {
                    pkt.l3.dropped = true;
                    self.stats.record_drop(DropReason::NoRoute);
                    debug!(
                        node = %self.nodes[to.0].name,
                        dst = %pkt.l3.five_tuple.dst_ip,
                        "无路由可达目的地，丢弃数据包"
                    );
                    None
                }
            }
        }
    }

    pub fn failed_links(&self) -> usize {
        self.links.iter().filter(|l| l.failed).count()
    }

    pub fn host_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_host()).count()
    }

    pub fn switch_count(&self) -> usize {
        self.nodes.iter().filter(|n| !n.is_host()).count()
    }
}
