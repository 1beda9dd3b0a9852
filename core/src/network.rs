use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::traits::{LinkId, NodeId, Status};
use crate::SimTime;

/// A bidirectional link between two nodes.
///
/// `load` counts the bytes of packets currently in flight on the link. A
/// packet reserves its size when it is sent and releases it when it
/// arrives; nothing else touches the load.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Link {
    pub id: LinkId,
    /// Canonical (min, max) endpoint pair.
    pub endpoints: (NodeId, NodeId),
    pub capacity: u64, // bytes in flight
    pub load: u64,
    pub delay: SimTime,  // Base one-way latency
    pub jitter: SimTime, // Amplitude of random variation
    pub status: Status,
    /// Bumped on every failure so in-flight packets can tell whether the
    /// link went down underneath them.
    pub generation: u32,
    pub carried: u64,
    pub saturated_drops: u64,
}

impl Link {
    pub fn new(id: LinkId, a: NodeId, b: NodeId, capacity: u64, delay: SimTime, jitter: SimTime) -> Self {
        Self {
            id,
            endpoints: canonical_key(a, b),
            capacity,
            load: 0,
            delay,
            jitter,
            status: Status::Active,
            generation: 0,
            carried: 0,
            saturated_drops: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn connects(&self, a: NodeId, b: NodeId) -> bool {
        self.endpoints == canonical_key(a, b)
    }

    pub fn other_end(&self, node: NodeId) -> Option<NodeId> {
        match self.endpoints {
            (a, b) if a == node => Some(b),
            (a, b) if b == node => Some(a),
            _ => None,
        }
    }

    pub fn free(&self) -> u64 {
        self.capacity.saturating_sub(self.load)
    }

    /// Check-then-reserve in one step. Returns `false` (reserving nothing)
    /// when the packet does not fit.
    pub fn try_reserve(&mut self, size: u64) -> bool {
        if size > self.free() {
            self.saturated_drops += 1;
            return false;
        }
        self.load += size;
        self.carried += 1;
        true
    }

    pub fn release(&mut self, size: u64) {
        debug_assert!(size <= self.load, "link {} released more than reserved", self.id);
        self.load = self.load.saturating_sub(size);
    }

    /// Base delay shifted by a uniform draw in [-jitter, +jitter], floored at 0.
    pub fn sample_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> SimTime {
        if self.jitter == 0 {
            return self.delay;
        }
        let amplitude = self.jitter.min(i64::MAX as u64) as i64;
        let shift = rng.gen_range(-amplitude..=amplitude);
        (self.delay as i64).saturating_add(shift).max(0) as SimTime
    }

    /// Returns `false` if the link was already down.
    pub fn fail(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.status = Status::Failed;
        self.generation = self.generation.wrapping_add(1);
        true
    }

    /// Returns `false` if the link was already up.
    pub fn recover(&mut self) -> bool {
        if self.is_active() {
            return false;
        }
        self.status = Status::Active;
        true
    }
}

pub fn canonical_key(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}
