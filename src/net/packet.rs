//! 数据包类型
//!
//! 定义网络数据包及其相关操作：扩展五元组（含 flowlet 扰动字段）、
//! L3 头、传输头与调试跟踪信息。

use super::id::NodeId;
use super::ip::IpAddr;
use super::node::mix64;
use crate::sim::SimTime;

/// 传输层协议标识（参与五元组哈希）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp = 1,
    Udp = 2,
    Control = 3,
}

/// 扩展五元组：标准五元组加上 flowlet 扰动字段。
///
/// 哈希在构造时预计算，只混合打包后的数值分量，与字节序和字符串
/// 表示无关，跨进程稳定（确定性要求）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiveTuple {
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: Protocol,
    flowlet_field: u64,
    hash: u64,
}

impl FiveTuple {
    pub fn new(
        src_ip: IpAddr,
        dst_ip: IpAddr,
        src_port: u16,
        dst_port: u16,
        protocol: Protocol,
    ) -> Self {
        let mut t = Self {
            src_ip,
            dst_ip,
            src_port,
            dst_port,
            protocol,
            flowlet_field: 0,
            hash: 0,
        };
        t.rehash();
        t
    }

    pub fn flowlet_field(&self) -> u64 {
        self.flowlet_field
    }

    /// flowlet 重路由时改写扰动字段，并重新计算缓存的哈希。
    pub fn set_flowlet_field(&mut self, field: u64) {
        if self.flowlet_field != field {
            self.flowlet_field = field;
            self.rehash();
        }
    }

    pub fn hash64(&self) -> u64 {
        self.hash
    }

    fn rehash(&mut self) {
        let ips = ((self.src_ip.0 as u64) << 32) | self.dst_ip.0 as u64;
        let ports = ((self.src_port as u64) << 32)
            | ((self.dst_port as u64) << 8)
            | self.protocol as u64;
        let mut h = mix64(ips);
        h = mix64(h ^ ports);
        h = mix64(h ^ self.flowlet_field);
        self.hash = h;
    }
}

/// L3 头
#[derive(Debug, Clone)]
pub struct PacketL3 {
    pub five_tuple: FiveTuple,
    /// flow 内的包序号（0 起）
    pub seq_number: u32,
    pub size_bytes: u32,
    pub ttl: u8,
    pub dropped: bool,
}

/// 传输头：flow 归属与分包信息。
#[derive(Debug, Clone, Copy)]
pub struct PacketTransport {
    pub flow_id: u64,
    /// flow 被切成的总包数
    pub flow_count: u32,
    /// 本包在 flow 中的下标（0 起）
    pub flow_seq: u32,
}

/// 调试跟踪信息。verbose 关闭时不记录逐跳轨迹。
#[derive(Debug, Clone)]
pub struct PacketTracking {
    pub global_id: u64,
    pub birth_time: SimTime,
    pub hops_taken: u32,
    /// 逐跳节点轨迹，仅 verbose_route 开启时记录
    pub route: Option<Vec<NodeId>>,
    pub delivered: bool,
    pub arrival_time: Option<SimTime>,
}

/// 网络数据包
#[derive(Debug, Clone)]
pub struct Packet {
    pub l3: PacketL3,
    pub transport: PacketTransport,
    pub tracking: PacketTracking,
}

impl Packet {
    pub fn is_expired(&self) -> bool {
        self.l3.ttl == 0
    }
}
