//! 端口类型
//!
//! 节点的出端口：FIFO 出队列 + 防重复 drain 标志。节点决定包走哪个
//! 端口；端口决定什么时候能把队头交给链路。

use std::collections::VecDeque;

use super::id::LinkId;
use super::packet::Packet;

/// 节点出端口。
#[derive(Debug)]
pub struct Port {
    pub link: LinkId,
    /// 本端口在链路上占用的方向下标（0 或 1）
    pub dir: usize,
    pub queue: VecDeque<Packet>,
    /// 已有 drain 事件在途时为 true，避免重复调度
    pub drain_scheduled: bool,
    pub peak_queue_len: usize,
    pub enqueued_pkts: u64,
}

impl Port {
    pub fn new(link: LinkId, dir: usize) -> Self {
        Self {
            link,
            dir,
            queue: VecDeque::new(),
            drain_scheduled: false,
            peak_queue_len: 0,
            enqueued_pkts: 0,
        }
    }

    pub fn push(&mut self, pkt: Packet) {
        self.queue.push_back(pkt);
        self.enqueued_pkts = self.enqueued_pkts.saturating_add(1);
        if self.queue.len() > self.peak_queue_len {
            self.peak_queue_len = self.queue.len();
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }
}
