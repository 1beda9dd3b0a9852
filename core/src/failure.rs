use std::fmt;

use log::debug;
use rand::Rng;
use rand_distr::{Distribution, Exp};
use serde::{Deserialize, Serialize};

use crate::engine::Scheduler;
use crate::error::{ConfigWarning, SimError};
use crate::simulation::{SimAction, SimContext};
use crate::topology::TopologyStore;
use crate::traits::{LinkId, NodeId, ObservationSink, Status};
use crate::{as_secs, secs, SimTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum FailureTarget {
    Node(NodeId),
    Link(LinkId),
}

impl fmt::Display for FailureTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureTarget::Node(id) => write!(f, "node {id}"),
            FailureTarget::Link(id) => write!(f, "link {id}"),
        }
    }
}

/// One outage: down at `time`, back up at `time + duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEvent {
    pub time: SimTime,
    pub target: FailureTarget,
    pub duration: SimTime,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DurationDistribution {
    /// Seconds, drawn uniformly from [low, high).
    Uniform { low: f64, high: f64 },
    /// Seconds, exponential with the given mean.
    Exponential { mean: f64 },
}

impl Default for DurationDistribution {
    fn default() -> Self {
        DurationDistribution::Uniform {
            low: 0.0,
            high: 100.0,
        }
    }
}

impl DurationDistribution {
    /// Resolves a distribution name. Unknown names fall back to
    /// uniform(0, 100) and come with a warning for the caller to surface.
    pub fn parse_lenient(name: &str) -> (Self, Option<ConfigWarning>) {
        match name.trim().to_ascii_lowercase().as_str() {
            "uniform" => (Self::default(), None),
            "exponential" => (DurationDistribution::Exponential { mean: 50.0 }, None),
            _ => (
                Self::default(),
                Some(ConfigWarning::UnknownDistribution(name.to_string())),
            ),
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> SimTime {
        let seconds = match *self {
            DurationDistribution::Uniform { low, high } if high > low => rng.gen_range(low..high),
            DurationDistribution::Uniform { low, .. } => low,
            DurationDistribution::Exponential { mean } => match Exp::new(1.0 / mean) {
                Ok(exp) => exp.sample(rng),
                Err(_) => mean,
            },
        };
        secs(seconds)
    }
}

/// Plans random outages and keeps the log of every outage handed to the
/// scheduler, scripted or random.
#[derive(Debug, Clone, Default)]
pub struct FailureController {
    pub rate: f64,
    pub distribution: DurationDistribution,
    events: Vec<FailureEvent>,
    pub failures_applied: u64,
    pub recoveries_applied: u64,
}

impl FailureController {
    pub fn new(rate: f64, distribution: DurationDistribution) -> Self {
        Self {
            rate,
            distribution,
            ..Default::default()
        }
    }

    /// floor(rate * horizon) outages, uniform over [0, horizon], each
    /// hitting a uniformly chosen node or link.
    pub fn synthesize<R: Rng + ?Sized>(
        &self,
        topology: &TopologyStore,
        horizon_secs: f64,
        rng: &mut R,
    ) -> Vec<FailureEvent> {
        let count = planned_count(self.rate, horizon_secs);
        let nodes = topology.node_ids();
        let links = topology.link_ids();
        if nodes.is_empty() && links.is_empty() {
            return Vec::new();
        }

        let horizon = secs(horizon_secs);
        (0..count)
            .map(|_| {
                let time = rng.gen_range(0..=horizon);
                let pick_link = match (nodes.is_empty(), links.is_empty()) {
                    (true, _) => true,
                    (_, true) => false,
                    _ => rng.gen_bool(0.5),
                };
                let target = if pick_link {
                    FailureTarget::Link(links[rng.gen_range(0..links.len())])
                } else {
                    FailureTarget::Node(nodes[rng.gen_range(0..nodes.len())])
                };
                let duration = self.distribution.sample(&mut *rng);
                FailureEvent {
                    time,
                    target,
                    duration,
                }
            })
            .collect()
    }

    /// Stores an outage and returns its index for the scheduler.
    pub fn register(&mut self, event: FailureEvent) -> usize {
        self.events.push(event);
        self.events.len() - 1
    }

    pub fn event(&self, index: usize) -> Option<&FailureEvent> {
        self.events.get(index)
    }

    pub fn events(&self) -> &[FailureEvent] {
        &self.events
    }
}

/// Flips a node or link to `status`. `None` if the element does not exist,
/// `Some(false)` if it already had that status.
fn set_status(topology: &mut TopologyStore, target: FailureTarget, status: Status) -> Option<bool> {
    match (target, status) {
        (FailureTarget::Node(id), Status::Failed) => topology.get_node_mut(id).map(|n| n.fail()),
        (FailureTarget::Node(id), Status::Active) => topology.get_node_mut(id).map(|n| n.recover()),
        (FailureTarget::Link(id), Status::Failed) => topology.get_link_mut(id).map(|l| l.fail()),
        (FailureTarget::Link(id), Status::Active) => topology.get_link_mut(id).map(|l| l.recover()),
    }
}

impl<S: ObservationSink> SimContext<S> {
    /// Fires a registered outage. An element that is already down ignores
    /// the event and no recovery is queued for it.
    pub(crate) fn apply_failure(&mut self, sched: &mut Scheduler<SimAction>, index: usize) -> Result<(), SimError> {
        let event = *self
            .failures
            .event(index)
            .ok_or(SimError::UnknownFailureEvent(index))?;
        if !self.fail_now(sched.now(), event.target) {
            return Ok(());
        }
        debug!("{} back in {:.3}s", event.target, as_secs(event.duration));
        sched.schedule_in(event.duration, SimAction::Recover { target: event.target });
        Ok(())
    }

    pub(crate) fn fail_now(&mut self, now: SimTime, target: FailureTarget) -> bool {
        match set_status(&mut self.topology, target, Status::Failed) {
            Some(true) => {
                self.failures.failures_applied += 1;
                debug!("t={:.3}s {} failed", as_secs(now), target);
                self.router.refresh(&mut self.topology);
                true
            }
            Some(false) => {
                debug!("t={:.3}s {} already down, ignoring failure", as_secs(now), target);
                false
            }
            None => {
                debug!("t={:.3}s failure names unknown {}", as_secs(now), target);
                false
            }
        }
    }

    pub(crate) fn apply_recovery(&mut self, now: SimTime, target: FailureTarget) -> bool {
        if set_status(&mut self.topology, target, Status::Active) != Some(true) {
            return false;
        }
        self.failures.recoveries_applied += 1;
        debug!("t={:.3}s {} recovered", as_secs(now), target);
        self.router.refresh(&mut self.topology);
        true
    }
}

/// Upper bound on synthesized failures per run.
pub const MAX_PLANNED_FAILURES: usize = 1_000_000;

/// floor(rate * horizon), capped at [`MAX_PLANNED_FAILURES`].
pub fn planned_count(rate: f64, horizon_secs: f64) -> usize {
    let expected = rate * horizon_secs;
    if !expected.is_finite() || expected <= 0.0 {
        return 0;
    }
    (expected.floor() as usize).min(MAX_PLANNED_FAILURES)
}
