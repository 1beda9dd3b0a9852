use serde::{Deserialize, Serialize};

use crate::traits::{FlowId, NodeId, PacketId};
use crate::SimTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceClass {
    Video,
    Voice,
    Data,
}

impl ServiceClass {
    pub const ALL: [ServiceClass; 3] = [ServiceClass::Video, ServiceClass::Voice, ServiceClass::Data];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowStatus {
    Pending,
    Active,
    Completed,
    Failed,
}

impl FlowStatus {
    pub fn is_resolved(self) -> bool {
        matches!(self, FlowStatus::Completed | FlowStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossReason {
    NoRoute,
    NodeFailed,
    NoLink,
    LinkFailed,
    LinkSaturated,
    BufferOverflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketStatus {
    InTransit,
    Delivered,
    Lost(LossReason),
}

impl PacketStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, PacketStatus::InTransit)
    }
}

/// Address of a packet inside its flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PacketRef {
    pub flow: FlowId,
    pub seq: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Packet {
    pub id: PacketId,
    pub flow: FlowId,
    pub seq: usize,
    pub size: u64,
    /// Node sequence from source to destination, fixed at flow start.
    pub route: Vec<NodeId>,
    /// Index into `route` of the node currently holding the packet.
    pub hop: usize,
    pub status: PacketStatus,
    pub injected_at: Option<SimTime>,
    /// Departure from the current hop's upstream node.
    pub sent_at: Option<SimTime>,
    pub arrived_at: Option<SimTime>,
    pub retransmit_of: Option<PacketId>,
}

impl Packet {
    pub fn new(id: PacketId, flow: FlowId, seq: usize, size: u64, route: Vec<NodeId>) -> Self {
        Self {
            id,
            flow,
            seq,
            size,
            route,
            hop: 0,
            status: PacketStatus::InTransit,
            injected_at: None,
            sent_at: None,
            arrived_at: None,
            retransmit_of: None,
        }
    }

    pub fn key(&self) -> PacketRef {
        PacketRef {
            flow: self.flow,
            seq: self.seq,
        }
    }

    pub fn source(&self) -> Option<NodeId> {
        self.route.first().copied()
    }

    pub fn current_node(&self) -> Option<NodeId> {
        self.route.get(self.hop).copied()
    }

    pub fn next_hop(&self) -> Option<NodeId> {
        self.route.get(self.hop + 1).copied()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Source-to-destination latency of a delivered packet.
    pub fn end_to_end_delay(&self) -> Option<SimTime> {
        match (self.status, self.injected_at, self.arrived_at) {
            (PacketStatus::Delivered, Some(start), Some(end)) => Some(end.saturating_sub(start)),
            _ => None,
        }
    }
}

/// A logical transfer between two nodes, split into fixed-size packets.
#[derive(Debug, Clone, Serialize)]
pub struct Flow {
    pub id: FlowId,
    pub service: ServiceClass,
    pub size: u64,
    pub packet_size: u64,
    pub src: NodeId,
    pub dst: NodeId,
    pub start_time: SimTime,
    pub status: FlowStatus,
    pub packets: Vec<Packet>,
    pub resolved_at: Option<SimTime>,
    outstanding: usize,
}

impl Flow {
    pub fn new(
        id: FlowId,
        service: ServiceClass,
        size: u64,
        src: NodeId,
        dst: NodeId,
        start_time: SimTime,
        packet_size: u64,
    ) -> Self {
        Self {
            id,
            service,
            size,
            packet_size: packet_size.max(1),
            src,
            dst,
            start_time,
            status: FlowStatus::Pending,
            packets: Vec::new(),
            resolved_at: None,
            outstanding: 0,
        }
    }

    /// ceil(size / packet_size)
    pub fn packet_count(&self) -> usize {
        self.size.div_ceil(self.packet_size) as usize
    }

    /// Size of the `seq`-th packet; only the last one may be short.
    pub fn packet_len(&self, seq: usize) -> u64 {
        let offset = seq as u64 * self.packet_size;
        self.size.saturating_sub(offset).min(self.packet_size)
    }

    /// Materializes every packet on `route`, numbering them from `first_id`.
    /// Returns the next unused packet id.
    pub fn packetize(&mut self, first_id: PacketId, route: &[NodeId]) -> PacketId {
        let count = self.packet_count();
        self.packets = (0..count)
            .map(|seq| Packet::new(first_id + seq as PacketId, self.id, seq, self.packet_len(seq), route.to_vec()))
            .collect();
        self.outstanding = count;
        self.status = FlowStatus::Active;
        first_id + count as PacketId
    }

    /// Appends a fresh copy of a lost packet for replay from the source.
    pub fn push_replay(&mut self, id: PacketId, of: usize) -> Option<PacketRef> {
        let original = self.packets.get(of)?;
        let mut replay = Packet::new(id, self.id, self.packets.len(), original.size, original.route.clone());
        replay.retransmit_of = Some(original.id);
        let key = replay.key();
        self.packets.push(replay);
        self.outstanding += 1;
        Some(key)
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Records one packet reaching a terminal state. Returns `true` when this
    /// was the flow's last unresolved packet.
    pub(crate) fn settle_one(&mut self) -> bool {
        self.outstanding = self.outstanding.saturating_sub(1);
        self.outstanding == 0
    }

    pub fn delivered(&self) -> impl Iterator<Item = &Packet> {
        self.packets
            .iter()
            .filter(|p| p.status == PacketStatus::Delivered)
    }

    pub fn delivered_count(&self) -> usize {
        self.delivered().count()
    }

    pub fn lost_count(&self) -> usize {
        self.packets
            .iter()
            .filter(|p| matches!(p.status, PacketStatus::Lost(_)))
            .count()
    }

    /// Moves an active flow to its final status. Returns `false` if the flow
    /// was already resolved, so the transition can only happen once.
    pub(crate) fn finalize(&mut self, now: SimTime) -> bool {
        if self.status.is_resolved() {
            return false;
        }
        self.status = if self.delivered_count() > 0 {
            FlowStatus::Completed
        } else {
            FlowStatus::Failed
        };
        self.resolved_at = Some(now);
        true
    }
}
