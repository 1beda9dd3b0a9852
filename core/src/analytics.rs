use hdrhistogram::Histogram;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::components::flow::{Flow, Packet};
use crate::simulation::NetworkSnapshot;
use crate::traits::{FlowId, ObservationSink};
use crate::{as_secs, SimTime};

/// Measurements of one flow, taken when it resolves.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct FlowMetric {
    pub timestamp: f64,
    pub flow_id: FlowId,
    pub throughput: f64,       // bits per second
    pub delay: f64,            // mean end-to-end, seconds
    pub packet_loss_rate: f64, // percent
    pub jitter: f64,           // mean |delay[i] - delay[i-1]|, seconds
}

impl FlowMetric {
    pub fn measure(now: SimTime, flow: &Flow) -> Self {
        let delays: Vec<f64> = flow
            .delivered()
            .filter_map(Packet::end_to_end_delay)
            .map(as_secs)
            .collect();
        let bits: u64 = flow.delivered().map(|p| p.size * 8).sum();

        let longest = delays.iter().copied().fold(0.0, f64::max);
        let throughput = if longest > 0.0 { bits as f64 / longest } else { 0.0 };
        let delay = if delays.is_empty() {
            0.0
        } else {
            delays.iter().sum::<f64>() / delays.len() as f64
        };
        let sent = flow.packets.len();
        let packet_loss_rate = if sent > 0 {
            (sent - delays.len()) as f64 / sent as f64 * 100.0
        } else {
            0.0
        };
        let jitter = if delays.len() > 1 {
            let diffs: f64 = delays.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
            diffs / (delays.len() - 1) as f64
        } else {
            0.0
        };

        Self {
            timestamp: as_secs(now),
            flow_id: flow.id,
            throughput,
            delay,
            packet_loss_rate,
            jitter,
        }
    }
}

/// Averages over every flow metric recorded so far.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct NetworkMetric {
    pub timestamp: f64,
    pub average_throughput: f64,
    pub average_delay: f64,
    pub average_packet_loss_rate: f64,
    pub average_jitter: f64,
    pub in_flight: u64,
}

/// Default sink: per-flow metrics, a delay histogram and a bounded history
/// of network averages taken on each sample.
pub struct MetricsCollector {
    pub flows: Vec<FlowMetric>,
    pub history: VecDeque<NetworkMetric>,
    pub max_points: usize,
    delays: Histogram<u64>,
    delivered: u64,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl MetricsCollector {
    pub fn new(max_points: usize) -> Self {
        Self {
            flows: Vec::new(),
            history: VecDeque::with_capacity(max_points),
            max_points,
            // Auto-resizing; 3 significant digits is always a valid precision.
            delays: Histogram::new(3).expect("valid histogram precision"),
            delivered: 0,
        }
    }

    /// Current network averages, or `None` before any flow resolved.
    pub fn snapshot(&self, now: SimTime, in_flight: u64) -> Option<NetworkMetric> {
        if self.flows.is_empty() {
            return None;
        }
        let n = self.flows.len() as f64;
        let avg = |f: fn(&FlowMetric) -> f64| self.flows.iter().map(f).sum::<f64>() / n;
        Some(NetworkMetric {
            timestamp: as_secs(now),
            average_throughput: avg(|m| m.throughput),
            average_delay: avg(|m| m.delay),
            average_packet_loss_rate: avg(|m| m.packet_loss_rate),
            average_jitter: avg(|m| m.jitter),
            in_flight,
        })
    }

    /// End-to-end delay percentile in ticks over every delivered packet.
    pub fn delay_percentile(&self, p: f64) -> Option<SimTime> {
        if self.delays.is_empty() {
            return None;
        }
        Some(self.delays.value_at_percentile(p))
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn flow(&self, id: FlowId) -> Option<&FlowMetric> {
        self.flows.iter().find(|m| m.flow_id == id)
    }

    pub fn reset(&mut self) {
        self.flows.clear();
        self.history.clear();
        self.delays.reset();
        self.delivered = 0;
    }
}

impl ObservationSink for MetricsCollector {
    fn on_packet_delivered(&mut self, _now: SimTime, packet: &Packet) {
        self.delivered += 1;
        if let Some(delay) = packet.end_to_end_delay() {
            if let Err(e) = self.delays.record(delay) {
                warn!("packet {}: delay {}us not recorded: {:?}", packet.id, delay, e);
            }
        }
    }

    fn on_flow_resolved(&mut self, now: SimTime, flow: &Flow) {
        self.flows.push(FlowMetric::measure(now, flow));
    }

    fn on_sample(&mut self, now: SimTime, snapshot: &NetworkSnapshot) {
        let Some(point) = self.snapshot(now, snapshot.in_flight) else {
            return;
        };
        self.history.push_back(point);
        if self.history.len() > self.max_points {
            self.history.pop_front();
        }
    }
}
