use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::node::Node;
use crate::error::TopologyError;
use crate::network::{canonical_key, Link};
use crate::traits::{LinkId, NodeId};
use crate::secs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    /// Bytes; the simulation default applies when absent.
    #[serde(default)]
    pub buffer_size: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSpec {
    pub id: LinkId,
    pub node1: NodeId,
    pub node2: NodeId,
    pub capacity: f64, // bytes in flight
    pub delay: f64,    // seconds
    #[serde(default)]
    pub jitter: f64, // seconds
}

/// External topology description, consumed once by [`TopologyStore::load`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologySpec {
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub links: Vec<LinkSpec>,
}

impl TopologySpec {
    pub fn from_json(text: &str) -> Result<Self, TopologyError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn node(mut self, id: NodeId) -> Self {
        self.nodes.push(NodeSpec { id, buffer_size: None });
        self
    }

    pub fn link(mut self, id: LinkId, node1: NodeId, node2: NodeId, capacity: f64, delay: f64, jitter: f64) -> Self {
        self.links.push(LinkSpec {
            id,
            node1,
            node2,
            capacity,
            delay,
            jitter,
        });
        self
    }
}

/// Owner of every node and link for one run.
#[derive(Debug, Clone, Default)]
pub struct TopologyStore {
    nodes: BTreeMap<NodeId, Node>,
    links: BTreeMap<LinkId, Link>,
    /// Canonical endpoint pair -> links joining that pair, ascending id.
    pairs: BTreeMap<(NodeId, NodeId), Vec<LinkId>>,
}

impl TopologyStore {
    /// Builds the store, rejecting duplicate ids and malformed links.
    pub fn load(spec: &TopologySpec, default_buffer: u64) -> Result<Self, TopologyError> {
        let mut store = TopologyStore::default();

        for n in &spec.nodes {
            if store.nodes.contains_key(&n.id) {
                return Err(TopologyError::DuplicateNode(n.id));
            }
            store
                .nodes
                .insert(n.id, Node::new(n.id, n.buffer_size.unwrap_or(default_buffer)));
        }

        for l in &spec.links {
            if store.links.contains_key(&l.id) {
                return Err(TopologyError::DuplicateLink(l.id));
            }
            if l.node1 == l.node2 {
                return Err(TopologyError::SelfLoop(l.id));
            }
            for node in [l.node1, l.node2] {
                if !store.nodes.contains_key(&node) {
                    return Err(TopologyError::UnknownEndpoint { link: l.id, node });
                }
            }
            if !l.capacity.is_finite() || l.capacity < 1.0 {
                return Err(invalid(l.id, "capacity", l.capacity));
            }
            if !l.delay.is_finite() || l.delay < 0.0 {
                return Err(invalid(l.id, "delay", l.delay));
            }
            if !l.jitter.is_finite() || l.jitter < 0.0 {
                return Err(invalid(l.id, "jitter", l.jitter));
            }

            let link = Link::new(l.id, l.node1, l.node2, l.capacity as u64, secs(l.delay), secs(l.jitter));
            store.pairs.entry(link.endpoints).or_default().push(l.id);
            for node in [l.node1, l.node2] {
                if let Some(n) = store.nodes.get_mut(&node) {
                    n.links.insert(l.id);
                }
            }
            store.links.insert(l.id, link);
        }

        for ids in store.pairs.values_mut() {
            ids.sort_unstable();
        }
        Ok(store)
    }

    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn get_node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn get_link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(&id)
    }

    pub fn get_link_mut(&mut self, id: LinkId) -> Option<&mut Link> {
        self.links.get_mut(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.values_mut()
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    pub fn link_ids(&self) -> Vec<LinkId> {
        self.links.keys().copied().collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Every link joining `a` and `b`, ascending id, whatever their status.
    pub fn links_between(&self, a: NodeId, b: NodeId) -> &[LinkId] {
        self.pairs.get(&canonical_key(a, b)).map_or(&[], Vec::as_slice)
    }
}

fn invalid(link: LinkId, field: &'static str, value: f64) -> TopologyError {
    TopologyError::InvalidLink { link, field, value }
}
