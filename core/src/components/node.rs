use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::Serialize;

use crate::components::flow::PacketRef;
use crate::traits::{LinkId, NodeId, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueuedPacket {
    pub packet: PacketRef,
    pub size: u64,
}

/// A router with a byte-bounded FIFO buffer.
///
/// `occupancy` always equals the summed size of `queue` and never exceeds
/// `buffer_capacity`.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub id: NodeId,
    pub status: Status,
    pub buffer_capacity: u64,
    occupancy: u64,
    queue: VecDeque<QueuedPacket>,
    pub links: BTreeSet<LinkId>,
    /// Virtual weights towards each usable neighbor, written by the router.
    pub weights: BTreeMap<NodeId, f64>,
    pub overflows: u64,
}

impl Node {
    pub fn new(id: NodeId, buffer_capacity: u64) -> Self {
        Self {
            id,
            status: Status::Active,
            buffer_capacity,
            occupancy: 0,
            queue: VecDeque::new(),
            links: BTreeSet::new(),
            weights: BTreeMap::new(),
            overflows: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn occupancy(&self) -> u64 {
        self.occupancy
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn queued(&self) -> impl Iterator<Item = &QueuedPacket> {
        self.queue.iter()
    }

    /// Check-then-enqueue. Returns `false` on overflow, leaving the buffer
    /// untouched.
    pub fn enqueue(&mut self, packet: PacketRef, size: u64) -> bool {
        if self.occupancy + size > self.buffer_capacity {
            self.overflows += 1;
            return false;
        }
        self.queue.push_back(QueuedPacket { packet, size });
        self.occupancy += size;
        true
    }

    pub fn dequeue(&mut self) -> Option<QueuedPacket> {
        let head = self.queue.pop_front()?;
        self.occupancy -= head.size;
        Some(head)
    }

    pub fn is_consistent(&self) -> bool {
        let queued: u64 = self.queue.iter().map(|q| q.size).sum();
        queued == self.occupancy && self.occupancy <= self.buffer_capacity
    }

    /// Returns `false` if the node was already down. Queued packets stay put
    /// and are dropped when their forward turn comes.
    pub fn fail(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.status = Status::Failed;
        true
    }

    pub fn recover(&mut self) -> bool {
        if self.is_active() {
            return false;
        }
        self.status = Status::Active;
        true
    }
}
