use std::collections::{BTreeMap, BTreeSet};

use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::analytics::MetricsCollector;
use crate::components::flow::{Flow, FlowStatus, LossReason, Packet, PacketRef, PacketStatus};
use crate::config::SimConfig;
use crate::engine::Scheduler;
use crate::error::{ConfigWarning, ScheduleError, SimError};
use crate::failure::{FailureController, FailureEvent, FailureTarget};
use crate::routing::{NetworkState, Router};
use crate::scenario::{random_flows, FlowScenario};
use crate::topology::{TopologySpec, TopologyStore};
use crate::traits::{FlowId, LinkId, NodeId, ObservationSink, PacketId, RoutingStrategy};
use crate::{as_secs, secs, SimTime};

/// Everything the scheduler can be asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimAction {
    StartFlow {
        flow: FlowId,
    },
    /// Hand a packet to its source node. `pace` chains the flow's next packet.
    Inject {
        packet: PacketRef,
        pace: bool,
    },
    /// Serve the head of a node's buffer.
    Forward {
        node: NodeId,
    },
    Arrive {
        packet: PacketRef,
        link: LinkId,
        generation: u32,
        node: NodeId,
    },
    Fail {
        event: usize,
    },
    Recover {
        target: FailureTarget,
    },
    Sample,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PacketCounters {
    /// Packets offered to the network, including those dropped at flow
    /// start for lack of a route.
    pub injected: u64,
    pub delivered: u64,
    pub lost: u64,
    pub losses: BTreeMap<LossReason, u64>,
}

impl PacketCounters {
    /// Injected but not yet delivered or lost.
    pub fn in_flight(&self) -> u64 {
        self.injected.saturating_sub(self.delivered + self.lost)
    }
}

/// Mutable state of one run, handed to every action.
pub struct SimContext<S> {
    pub(crate) topology: TopologyStore,
    pub(crate) router: Router,
    pub(crate) failures: FailureController,
    pub(crate) flows: BTreeMap<FlowId, Flow>,
    pub(crate) sink: S,
    pub(crate) rng: StdRng,
    pub(crate) packet_interval: SimTime,
    pub(crate) sample_interval: Option<SimTime>,
    pub(crate) counters: PacketCounters,
    pub(crate) next_packet_id: PacketId,
}

impl<S: ObservationSink> SimContext<S> {
    pub(crate) fn dispatch(&mut self, sched: &mut Scheduler<SimAction>, action: SimAction) -> Result<(), SimError> {
        match action {
            SimAction::StartFlow { flow } => self.start_flow(sched, flow),
            SimAction::Inject { packet, pace } => self.inject(sched, packet, pace),
            SimAction::Forward { node } => self.forward(sched, node),
            SimAction::Arrive {
                packet,
                link,
                generation,
                node,
            } => self.receive(sched, packet, link, generation, node),
            SimAction::Fail { event } => self.apply_failure(sched, event),
            SimAction::Recover { target } => {
                self.apply_recovery(sched.now(), target);
                Ok(())
            }
            SimAction::Sample => {
                let now = sched.now();
                let snapshot = self.snapshot(now);
                self.sink.on_sample(now, &snapshot);
                if let Some(interval) = self.sample_interval {
                    if now.saturating_add(interval) <= sched.horizon() {
                        sched.schedule_in(interval, SimAction::Sample);
                    }
                }
                Ok(())
            }
        }
    }

    pub(crate) fn snapshot(&self, time: SimTime) -> NetworkSnapshot {
        let resolved_flows = self.flows.values().filter(|f| f.status.is_resolved()).count();
        let active_flows = self
            .flows
            .values()
            .filter(|f| f.status == FlowStatus::Active)
            .count();
        NetworkSnapshot {
            time,
            delivered: self.counters.delivered,
            lost: self.counters.lost,
            in_flight: self.counters.in_flight(),
            active_flows,
            resolved_flows,
            state: NetworkState::capture(&self.topology),
        }
    }
}

/// Point-in-time view handed to the sink on each sample.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkSnapshot {
    pub time: SimTime,
    pub delivered: u64,
    pub lost: u64,
    pub in_flight: u64,
    pub active_flows: usize,
    pub resolved_flows: usize,
    pub state: NetworkState,
}

/// Final (or intermediate) counts of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub end_time: f64, // seconds
    pub delivered: u64,
    pub lost: u64,
    pub losses: BTreeMap<LossReason, u64>,
    pub in_transit: u64,
    pub flows_completed: usize,
    pub flows_failed: usize,
    pub flows_unresolved: usize,
    pub failures_applied: u64,
    pub recoveries_applied: u64,
    pub events_processed: u64,
    pub action_faults: u64,
}

/// One simulation run: the scheduler plus the context it drives.
///
/// Lifecycle: `new` (load + validate), optional `add_flows` /
/// `schedule_failure`, `start`, then `run` / `run_until` / `step`.
pub struct Simulation<S = MetricsCollector> {
    scheduler: Scheduler<SimAction>,
    ctx: SimContext<S>,
    config: SimConfig,
    warnings: Vec<ConfigWarning>,
    started: bool,
}

impl<S: ObservationSink> Simulation<S> {
    /// Loads the topology and resolves the configuration. Structural problems
    /// and an unknown routing algorithm abort here, before anything runs.
    pub fn new(config: SimConfig, topology: &TopologySpec, sink: S) -> Result<Self, SimError> {
        let resolved = config.resolve()?;
        for w in &resolved.warnings {
            warn!("{}", w);
        }

        let mut store = TopologyStore::load(topology, config.buffer_size)?;
        let router = Router::new(resolved.algorithm, &mut store);
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        info!(
            "loaded {} nodes, {} links; routing with '{}'",
            store.node_count(),
            store.link_count(),
            router.strategy_name()
        );

        Ok(Self {
            scheduler: Scheduler::new(secs(config.horizon)),
            ctx: SimContext {
                topology: store,
                router,
                failures: FailureController::new(config.failure_rate, resolved.distribution),
                flows: BTreeMap::new(),
                sink,
                rng,
                packet_interval: secs(config.packet_interval),
                sample_interval: config.sample_interval.map(secs),
                counters: PacketCounters::default(),
                next_packet_id: 0,
            },
            config,
            warnings: resolved.warnings,
            started: false,
        })
    }

    /// Swaps in a custom routing strategy. Weights are recomputed at once.
    pub fn with_strategy(mut self, strategy: Box<dyn RoutingStrategy>) -> Self {
        self.ctx.router = Router::with_strategy(strategy, &mut self.ctx.topology);
        self
    }

    /// Adds scenario flows. All-or-nothing: one bad entry rejects the batch.
    pub fn add_flows(&mut self, scenario: &FlowScenario) -> Result<usize, SimError> {
        let taken: BTreeSet<FlowId> = self.ctx.flows.keys().copied().collect();
        let flows = scenario.build(&self.ctx.topology, &taken, self.config.packet_size as u64)?;
        let count = flows.len();
        for flow in flows {
            self.admit(flow);
        }
        Ok(count)
    }

    /// Adds `count` random flows; returns how many were created.
    pub fn generate_flows(&mut self, count: usize) -> usize {
        let first_id = self.ctx.flows.keys().next_back().map_or(1, |id| id + 1);
        let flows = random_flows(
            &self.ctx.topology,
            count,
            first_id,
            self.scheduler.horizon(),
            self.config.packet_size as u64,
            &mut self.ctx.rng,
        );
        let created = flows.len();
        for flow in flows {
            self.admit(flow);
        }
        created
    }

    fn admit(&mut self, flow: Flow) {
        let (id, start) = (flow.id, flow.start_time);
        self.ctx.flows.insert(id, flow);
        if self.started {
            let at = start.max(self.scheduler.now());
            self.schedule(at, SimAction::StartFlow { flow: id });
        }
    }

    fn schedule(&mut self, at: SimTime, action: SimAction) {
        let delay = at.saturating_sub(self.scheduler.now());
        self.scheduler.schedule_in(delay, action);
    }

    /// Queues a scripted outage (and, when it fires, its recovery).
    pub fn schedule_failure(&mut self, event: FailureEvent) -> Result<(), SimError> {
        let now = self.scheduler.now();
        if event.time < now {
            return Err(ScheduleError::InPast { time: event.time, now }.into());
        }
        let index = self.ctx.failures.register(event);
        self.scheduler.schedule(event.time, SimAction::Fail { event: index })?;
        Ok(())
    }

    /// Schedules flow starts, synthesized failures and sampling. Runs once;
    /// without any flows the random generator fills in.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;

        if self.ctx.flows.is_empty() && self.config.random_flows > 0 {
            let created = self.generate_flows(self.config.random_flows);
            info!("generated {} random flows", created);
        }
        let starts: Vec<(FlowId, SimTime)> = self
            .ctx
            .flows
            .values()
            .filter(|f| f.status == FlowStatus::Pending)
            .map(|f| (f.id, f.start_time))
            .collect();
        for (flow, at) in starts {
            self.schedule(at, SimAction::StartFlow { flow });
        }

        let planned = self
            .ctx
            .failures
            .synthesize(&self.ctx.topology, self.config.horizon, &mut self.ctx.rng);
        if !planned.is_empty() {
            info!("planned {} random failures", planned.len());
        }
        for event in planned {
            let index = self.ctx.failures.register(event);
            self.schedule(event.time, SimAction::Fail { event: index });
        }

        if let Some(interval) = self.ctx.sample_interval {
            self.schedule(interval, SimAction::Sample);
        }
    }

    /// Executes one same-time batch.
    pub fn step(&mut self) -> bool {
        self.start();
        let ctx = &mut self.ctx;
        let mut handler = |sched: &mut Scheduler<SimAction>, action: SimAction| ctx.dispatch(sched, action);
        self.scheduler.step(&mut handler)
    }

    /// Runs until the queue drains or the horizon is reached.
    pub fn run(&mut self) -> RunSummary {
        self.run_until_tick(SimTime::MAX)
    }

    /// Runs every event due at or before `seconds` (capped by the horizon).
    pub fn run_until(&mut self, seconds: f64) -> RunSummary {
        self.run_until_tick(secs(seconds))
    }

    fn run_until_tick(&mut self, limit: SimTime) -> RunSummary {
        self.start();
        info!("running to t={:.3}s", as_secs(limit.min(self.scheduler.horizon())));
        let ctx = &mut self.ctx;
        let handler = |sched: &mut Scheduler<SimAction>, action: SimAction| ctx.dispatch(sched, action);
        self.scheduler.run_until(limit, handler);
        let summary = self.summary();
        info!(
            "t={:.3}s delivered={} lost={} flows completed={} failed={} faults={}",
            summary.end_time,
            summary.delivered,
            summary.lost,
            summary.flows_completed,
            summary.flows_failed,
            summary.action_faults
        );
        summary
    }

    /// Fails a node or link right now; with a duration (seconds) its
    /// recovery is queued too. Returns `false` if the element is unknown or
    /// already down.
    pub fn fail(&mut self, target: FailureTarget, duration: Option<f64>) -> bool {
        if !self.ctx.fail_now(self.scheduler.now(), target) {
            return false;
        }
        if let Some(duration) = duration {
            self.scheduler.schedule_in(secs(duration), SimAction::Recover { target });
        }
        true
    }

    /// Brings a node or link back right now.
    pub fn recover(&mut self, target: FailureTarget) -> bool {
        self.ctx.apply_recovery(self.scheduler.now(), target)
    }

    /// Replays a lost packet from its source as a new packet.
    pub fn retransmit(&mut self, packet: PacketRef) -> Result<PacketRef, SimError> {
        self.ctx.retransmit(&mut self.scheduler, packet)
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            end_time: as_secs(self.scheduler.now()),
            delivered: self.ctx.counters.delivered,
            lost: self.ctx.counters.lost,
            losses: self.ctx.counters.losses.clone(),
            failures_applied: self.ctx.failures.failures_applied,
            recoveries_applied: self.ctx.failures.recoveries_applied,
            events_processed: self.scheduler.processed(),
            action_faults: self.scheduler.faults(),
            ..Default::default()
        };
        for flow in self.ctx.flows.values() {
            match flow.status {
                FlowStatus::Completed => summary.flows_completed += 1,
                FlowStatus::Failed => summary.flows_failed += 1,
                FlowStatus::Pending | FlowStatus::Active => summary.flows_unresolved += 1,
            }
            summary.in_transit += flow
                .packets
                .iter()
                .filter(|p| p.status == PacketStatus::InTransit)
                .count() as u64;
        }
        summary
    }

    pub fn snapshot(&self) -> NetworkSnapshot {
        self.ctx.snapshot(self.scheduler.now())
    }

    pub fn now(&self) -> SimTime {
        self.scheduler.now()
    }

    pub fn pending_events(&self) -> usize {
        self.scheduler.pending()
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn warnings(&self) -> &[ConfigWarning] {
        &self.warnings
    }

    pub fn topology(&self) -> &TopologyStore {
        &self.ctx.topology
    }

    pub fn router(&self) -> &Router {
        &self.ctx.router
    }

    pub fn failures(&self) -> &FailureController {
        &self.ctx.failures
    }

    pub fn counters(&self) -> &PacketCounters {
        &self.ctx.counters
    }

    pub fn flows(&self) -> impl Iterator<Item = &Flow> {
        self.ctx.flows.values()
    }

    pub fn flow(&self, id: FlowId) -> Option<&Flow> {
        self.ctx.flows.get(&id)
    }

    pub fn packet(&self, packet: PacketRef) -> Option<&Packet> {
        self.ctx.flows.get(&packet.flow)?.packets.get(packet.seq)
    }

    pub fn sink(&self) -> &S {
        &self.ctx.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.ctx.sink
    }

    pub fn into_sink(self) -> S {
        self.ctx.sink
    }
}
