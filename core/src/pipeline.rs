//! Packet movement: flow start, paced injection, hop-by-hop sending,
//! arrival, buffering and the terminal bookkeeping of every packet.
//!
//! Link load is reserved when a packet is put on a link and released only
//! when its `Arrive` action runs, whatever happened to the link meanwhile.

use std::collections::BTreeMap;

use log::{debug, trace, warn};

use crate::components::flow::{Flow, LossReason, Packet, PacketRef, PacketStatus};
use crate::engine::Scheduler;
use crate::error::SimError;
use crate::simulation::{SimAction, SimContext};
use crate::traits::{FlowId, LinkId, NodeId, ObservationSink};
use crate::SimTime;

fn packet_mut(flows: &mut BTreeMap<FlowId, Flow>, key: PacketRef) -> Result<&mut Packet, SimError> {
    flows
        .get_mut(&key.flow)
        .ok_or(SimError::UnknownFlow(key.flow))?
        .packets
        .get_mut(key.seq)
        .ok_or(SimError::UnknownPacket {
            flow: key.flow,
            seq: key.seq,
        })
}

impl<S: ObservationSink> SimContext<S> {
    /// Routes the flow, materializes its packets and injects the first one.
    /// A flow without a route loses every packet at once and fails.
    pub(crate) fn start_flow(&mut self, sched: &mut Scheduler<SimAction>, id: FlowId) -> Result<(), SimError> {
        let now = sched.now();
        let flow = self.flows.get_mut(&id).ok_or(SimError::UnknownFlow(id))?;
        if flow.status.is_resolved() || !flow.packets.is_empty() {
            return Ok(());
        }

        let route = self.router.route(flow.src, flow.dst);
        let path = route.as_deref().unwrap_or(&[]);
        self.next_packet_id = flow.packetize(self.next_packet_id, path);
        let count = flow.packet_count();

        if route.is_none() {
            warn!("flow {}: no route from {} to {}", id, flow.src, flow.dst);
            self.counters.injected += count as u64;
            for seq in 0..count {
                self.resolve(now, PacketRef { flow: id, seq }, PacketStatus::Lost(LossReason::NoRoute))?;
            }
            return Ok(());
        }

        debug!("flow {}: {} packets over {:?}", id, count, path);
        self.inject(sched, PacketRef { flow: id, seq: 0 }, true)
    }

    /// Puts a packet on the wire at its source. With `pace`, the flow's next
    /// packet follows one packet interval later.
    pub(crate) fn inject(
        &mut self,
        sched: &mut Scheduler<SimAction>,
        key: PacketRef,
        pace: bool,
    ) -> Result<(), SimError> {
        let now = sched.now();
        let count = self
            .flows
            .get(&key.flow)
            .ok_or(SimError::UnknownFlow(key.flow))?
            .packet_count();
        let packet = packet_mut(&mut self.flows, key)?;
        if packet.is_terminal() {
            return Ok(());
        }
        packet.injected_at = Some(now);
        packet.hop = 0;
        let source = packet.source();

        if pace && key.seq + 1 < count {
            let next = PacketRef {
                flow: key.flow,
                seq: key.seq + 1,
            };
            sched.schedule_in(self.packet_interval, SimAction::Inject { packet: next, pace: true });
        }

        self.counters.injected += 1;
        match source {
            Some(node) => self.send(sched, key, node),
            None => self.resolve(now, key, PacketStatus::Lost(LossReason::NoRoute)),
        }
    }

    /// Moves a packet from `at` onto the link toward its next hop, or
    /// delivers it when `at` is the end of its route.
    pub(crate) fn send(&mut self, sched: &mut Scheduler<SimAction>, key: PacketRef, at: NodeId) -> Result<(), SimError> {
        let now = sched.now();
        if !self.topology.get_node(at).is_some_and(|n| n.is_active()) {
            return self.resolve(now, key, PacketStatus::Lost(LossReason::NodeFailed));
        }

        let (next, size) = {
            let packet = packet_mut(&mut self.flows, key)?;
            if packet.is_terminal() {
                return Ok(());
            }
            (packet.next_hop(), packet.size)
        };
        let Some(next) = next else {
            return self.resolve(now, key, PacketStatus::Delivered);
        };

        let link_id = match self.pick_link(at, next, size) {
            Ok(id) => id,
            Err(reason) => return self.resolve(now, key, PacketStatus::Lost(reason)),
        };
        let Some(link) = self.topology.get_link_mut(link_id) else {
            return self.resolve(now, key, PacketStatus::Lost(LossReason::NoLink));
        };
        if !link.try_reserve(size) {
            trace!("link {} saturated: {}/{} + {}", link_id, link.load, link.capacity, size);
            return self.resolve(now, key, PacketStatus::Lost(LossReason::LinkSaturated));
        }
        let delay = link.sample_delay(&mut self.rng);
        let generation = link.generation;

        let packet = packet_mut(&mut self.flows, key)?;
        packet.sent_at = Some(now);
        packet.hop += 1;
        trace!("packet {} {} -> {} on link {}, {}us", packet.id, at, next, link_id, delay);

        sched.schedule_in(
            delay,
            SimAction::Arrive {
                packet: key,
                link: link_id,
                generation,
                node: next,
            },
        );
        Ok(())
    }

    /// Chooses the link from `at` to `next`. Active parallel links are tried
    /// cheapest first under the router's cost, ties by id; the first with
    /// room for `size` wins. When none has room the cheapest is returned so
    /// its reservation attempt records the drop.
    fn pick_link(&self, at: NodeId, next: NodeId, size: u64) -> Result<LinkId, LossReason> {
        let ids = self.topology.links_between(at, next);
        if ids.is_empty() {
            return Err(LossReason::NoLink);
        }
        let mut active: Vec<(f64, LinkId, u64)> = ids
            .iter()
            .filter_map(|id| self.topology.get_link(*id))
            .filter(|l| l.is_active())
            .map(|l| (self.router.link_cost(l), l.id, l.free()))
            .collect();
        active.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let cheapest = active.first().ok_or(LossReason::LinkFailed)?.1;
        Ok(active
            .iter()
            .find(|(_, _, free)| size <= *free)
            .map_or(cheapest, |(_, id, _)| *id))
    }

    /// Lands a packet at `node`. The link reservation is returned first; a
    /// link that failed while the packet was on it loses the packet.
    pub(crate) fn receive(
        &mut self,
        sched: &mut Scheduler<SimAction>,
        key: PacketRef,
        link_id: LinkId,
        generation: u32,
        node_id: NodeId,
    ) -> Result<(), SimError> {
        let now = sched.now();
        let size = packet_mut(&mut self.flows, key)?.size;

        let cut = match self.topology.get_link_mut(link_id) {
            Some(link) => {
                link.release(size);
                link.generation != generation || !link.is_active()
            }
            None => true,
        };
        if cut {
            return self.resolve(now, key, PacketStatus::Lost(LossReason::LinkFailed));
        }

        let Some(node) = self.topology.get_node_mut(node_id).filter(|n| n.is_active()) else {
            return self.resolve(now, key, PacketStatus::Lost(LossReason::NodeFailed));
        };
        if !node.enqueue(key, size) {
            return self.resolve(now, key, PacketStatus::Lost(LossReason::BufferOverflow));
        }

        packet_mut(&mut self.flows, key)?.arrived_at = Some(now);
        sched.schedule_in(0, SimAction::Forward { node: node_id });
        Ok(())
    }

    /// Serves the head of a node's buffer.
    pub(crate) fn forward(&mut self, sched: &mut Scheduler<SimAction>, node_id: NodeId) -> Result<(), SimError> {
        let queued = self
            .topology
            .get_node_mut(node_id)
            .and_then(|n| n.dequeue())
            .ok_or(SimError::EmptyBuffer(node_id))?;
        self.send(sched, queued.packet, node_id)
    }

    /// Gives a packet its terminal status, updates counters and the sink, and
    /// finalizes the flow when this was its last outstanding packet.
    pub(crate) fn resolve(&mut self, now: SimTime, key: PacketRef, outcome: PacketStatus) -> Result<(), SimError> {
        let flow = self.flows.get_mut(&key.flow).ok_or(SimError::UnknownFlow(key.flow))?;
        let packet = flow.packets.get_mut(key.seq).ok_or(SimError::UnknownPacket {
            flow: key.flow,
            seq: key.seq,
        })?;
        if packet.is_terminal() {
            return Ok(());
        }
        packet.status = outcome;

        match outcome {
            PacketStatus::Delivered => {
                packet.arrived_at = Some(now);
                self.counters.delivered += 1;
                self.sink.on_packet_delivered(now, packet);
            }
            PacketStatus::Lost(reason) => {
                trace!("packet {} of flow {} lost: {:?}", packet.id, key.flow, reason);
                self.counters.lost += 1;
                *self.counters.losses.entry(reason).or_default() += 1;
            }
            PacketStatus::InTransit => {}
        }

        if flow.settle_one() && flow.finalize(now) {
            debug!(
                "flow {} {:?}: {} delivered, {} lost",
                flow.id,
                flow.status,
                flow.delivered_count(),
                flow.lost_count()
            );
            self.sink.on_flow_resolved(now, flow);
        }
        Ok(())
    }

    /// Appends a copy of a lost packet to its flow and injects it at the
    /// source. The lost packet keeps its status.
    pub(crate) fn retransmit(&mut self, sched: &mut Scheduler<SimAction>, key: PacketRef) -> Result<PacketRef, SimError> {
        let flow = self.flows.get_mut(&key.flow).ok_or(SimError::UnknownFlow(key.flow))?;
        let original = flow.packets.get(key.seq).ok_or(SimError::UnknownPacket {
            flow: key.flow,
            seq: key.seq,
        })?;
        if !matches!(original.status, PacketStatus::Lost(_)) {
            return Err(SimError::NotRetransmittable(original.id));
        }

        let id = self.next_packet_id;
        let replay = flow.push_replay(id, key.seq).ok_or(SimError::UnknownPacket {
            flow: key.flow,
            seq: key.seq,
        })?;
        self.next_packet_id += 1;
        debug!("flow {}: retransmitting packet {} as {}", key.flow, key.seq, id);
        sched.schedule_in(0, SimAction::Inject { packet: replay, pace: false });
        Ok(replay)
    }
}
