use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BinaryHeap};
use std::fmt;
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::network::Link;
use crate::topology::TopologyStore;
use crate::traits::{LinkId, NodeId, RoutingStrategy, Status};
use crate::{as_secs, SimTime};

/// Neighbor weights per node: `table[a][b]` is the cost of hopping a -> b.
pub type WeightTable = BTreeMap<NodeId, BTreeMap<NodeId, f64>>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NodeView {
    pub status: Status,
    pub buffer_occupancy: u64,
    pub buffer_capacity: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinkView {
    pub endpoints: (NodeId, NodeId),
    pub status: Status,
    pub capacity: u64,
    pub load: u64,
    pub delay: SimTime,
    pub jitter: SimTime,
}

impl LinkView {
    pub fn of(link: &Link) -> Self {
        Self {
            endpoints: link.endpoints,
            status: link.status,
            capacity: link.capacity,
            load: link.load,
            delay: link.delay,
            jitter: link.jitter,
        }
    }
}

/// Read view of the topology, always derived from the store.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NetworkState {
    pub nodes: BTreeMap<NodeId, NodeView>,
    pub links: BTreeMap<LinkId, LinkView>,
}

impl NetworkState {
    pub fn capture(topology: &TopologyStore) -> Self {
        let nodes = topology
            .nodes()
            .map(|n| {
                let view = NodeView {
                    status: n.status,
                    buffer_occupancy: n.occupancy(),
                    buffer_capacity: n.buffer_capacity,
                };
                (n.id, view)
            })
            .collect();
        let links = topology.links().map(|l| (l.id, LinkView::of(l))).collect();
        Self { nodes, links }
    }

    pub fn node_active(&self, id: NodeId) -> bool {
        self.nodes.get(&id).is_some_and(|n| n.status.is_active())
    }

    /// Links that may carry traffic: the link and both endpoints are up.
    /// Everything else is left out of the routing graph entirely.
    pub fn usable_links(&self) -> impl Iterator<Item = (LinkId, &LinkView)> {
        self.links.iter().filter_map(move |(&id, l)| {
            let (a, b) = l.endpoints;
            (l.status.is_active() && self.node_active(a) && self.node_active(b)).then_some((id, l))
        })
    }

    /// Builds a symmetric weight table from a per-link cost. Active nodes
    /// always get an entry, even when isolated. Parallel links keep their
    /// cheapest cost.
    pub fn weigh<F>(&self, cost: F) -> WeightTable
    where
        F: Fn(&LinkView) -> f64,
    {
        let mut table: WeightTable = self
            .nodes
            .iter()
            .filter(|(_, n)| n.status.is_active())
            .map(|(&id, _)| (id, BTreeMap::new()))
            .collect();
        for (_, link) in self.usable_links() {
            let w = cost(link);
            let (a, b) = link.endpoints;
            for (from, to) in [(a, b), (b, a)] {
                let slot = table.entry(from).or_default().entry(to).or_insert(w);
                if w < *slot {
                    *slot = w;
                }
            }
        }
        table
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    cost: f64,
    node: NodeId,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cost
            .total_cmp(&other.cost)
            .then_with(|| self.node.cmp(&other.node))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Dijkstra over `weights`. Among equal-cost paths the first predecessor
/// to reach a node keeps it, so the same table always yields the same path.
pub fn shortest_path(weights: &WeightTable, src: NodeId, dst: NodeId) -> Option<Vec<NodeId>> {
    if !weights.contains_key(&src) || !weights.contains_key(&dst) {
        return None;
    }
    if src == dst {
        return Some(vec![src]);
    }

    let mut dist: BTreeMap<NodeId, f64> = BTreeMap::new();
    let mut prev: BTreeMap<NodeId, NodeId> = BTreeMap::new();
    let mut heap = BinaryHeap::new();
    dist.insert(src, 0.0);
    heap.push(Reverse(Candidate { cost: 0.0, node: src }));

    while let Some(Reverse(Candidate { cost, node })) = heap.pop() {
        if node == dst {
            break;
        }
        if dist.get(&node).is_some_and(|&best| cost > best) {
            continue;
        }
        let Some(neighbors) = weights.get(&node) else {
            continue;
        };
        for (&next, &w) in neighbors {
            if !w.is_finite() || !weights.contains_key(&next) {
                continue;
            }
            let candidate = cost + w;
            let better = dist.get(&next).map_or(true, |&d| candidate < d);
            if better {
                dist.insert(next, candidate);
                prev.insert(next, node);
                heap.push(Reverse(Candidate {
                    cost: candidate,
                    node: next,
                }));
            }
        }
    }

    if !prev.contains_key(&dst) {
        return None;
    }
    let mut path = vec![dst];
    let mut cursor = dst;
    while let Some(&p) = prev.get(&cursor) {
        path.push(p);
        cursor = p;
    }
    path.reverse();
    Some(path)
}

/// Lowest delay + 1/capacity over usable links.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShortestPath;

impl RoutingStrategy for ShortestPath {
    fn name(&self) -> &str {
        "shortest-path"
    }

}

/// Slot for a learned policy. Until one is plugged in it scales delay by
/// link utilisation, deterministically.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoadAware;

impl RoutingStrategy for LoadAware {
    fn name(&self) -> &str {
        "learned-a"
    }

    fn link_cost(&self, l: &LinkView) -> f64 {
        let capacity = l.capacity as f64;
        as_secs(l.delay) * (1.0 + l.load as f64 / capacity) + 1.0 / capacity
    }
}

/// Second learned-policy slot; falls back to fewest hops.
#[derive(Debug, Default, Clone, Copy)]
pub struct HopCount;

impl RoutingStrategy for HopCount {
    fn name(&self) -> &str {
        "learned-b"
    }

    fn link_cost(&self, _link: &LinkView) -> f64 {
        1.0
    }
}

macro_rules! register_algorithms {
    ($($variant:ident => $type:ty, [$($name:literal),+]);* $(;)?) => {
        /// The closed set of built-in strategies, picked once per run.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum RoutingAlgorithm {
            $($variant),*
        }

        impl RoutingAlgorithm {
            pub fn strategy(self) -> Box<dyn RoutingStrategy> {
                match self {
                    $(RoutingAlgorithm::$variant => Box::new(<$type>::default())),*
                }
            }

            pub fn names() -> Vec<&'static str> {
                vec![$($($name),+),*]
            }
        }

        impl FromStr for RoutingAlgorithm {
            type Err = ConfigError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($($name)|+ => Ok(RoutingAlgorithm::$variant),)*
                    _ => Err(ConfigError::UnknownRoutingAlgorithm(s.to_string())),
                }
            }
        }
    };
}

register_algorithms!(
    ShortestPath => ShortestPath, ["shortest-path", "dijkstra"];
    LoadAware => LoadAware, ["learned-a", "dqn"];
    HopCount => HopCount, ["learned-b", "ddpg"];
);

/// Routing engine: owns the strategy, the cached network view and the
/// weight table derived from it.
///
/// The cache is rebuilt in full by [`Router::refresh`], which the
/// simulation calls on load and on every failure or recovery, so a query
/// never sees state older than the last topology change.
pub struct Router {
    strategy: Box<dyn RoutingStrategy>,
    state: NetworkState,
    weights: WeightTable,
    version: u64,
}

impl Router {
    pub fn new(algorithm: RoutingAlgorithm, topology: &mut TopologyStore) -> Self {
        Self::with_strategy(algorithm.strategy(), topology)
    }

    pub fn with_strategy(strategy: Box<dyn RoutingStrategy>, topology: &mut TopologyStore) -> Self {
        let mut router = Self {
            strategy,
            state: NetworkState::default(),
            weights: WeightTable::new(),
            version: 0,
        };
        router.refresh(topology);
        router
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    /// Recaptures the network view, recomputes every weight and publishes
    /// each node's neighbor weights.
    pub fn refresh(&mut self, topology: &mut TopologyStore) {
        let state = NetworkState::capture(topology);
        let weights = self.strategy.compute_weights(&state);
        for node in topology.nodes_mut() {
            node.weights = weights.get(&node.id).cloned().unwrap_or_default();
        }
        self.state = state;
        self.weights = weights;
        self.version += 1;
        debug!("router '{}' recomputed weights (v{})", self.strategy.name(), self.version);
    }

    /// Answers from the weights cached by the last refresh.
    pub fn route(&self, src: NodeId, dst: NodeId) -> Option<Vec<NodeId>> {
        self.strategy.compute_route(src, dst, &self.state, &self.weights)
    }

    /// Cost the current strategy assigns to `link` in its live state.
    pub fn link_cost(&self, link: &Link) -> f64 {
        self.strategy.link_cost(&LinkView::of(link))
    }

    pub fn state(&self) -> &NetworkState {
        &self.state
    }

    pub fn weights(&self) -> &WeightTable {
        &self.weights
    }

    /// Number of recomputations so far.
    pub fn version(&self) -> u64 {
        self.version
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("strategy", &self.strategy.name())
            .field("version", &self.version)
            .finish()
    }
}
