//! Cluster formation: member affiliation and gateway-based adjacency discovery.

use crate::types::{HeardHead, NodeId};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// State of a node that joined a cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberState {
    /// First head heard while undecided.
    pub official_head: NodeId,
    /// Every head heard this round, in arrival order.
    pub known_heads: Vec<HeardHead>,
}

impl MemberState {
    pub fn new(official_head: NodeId, quality: f64) -> Self {
        Self {
            official_head,
            known_heads: vec![HeardHead {
                id: official_head,
                quality,
            }],
        }
    }

    /// Records a later head announcement; repeats are ignored.
    pub fn record_head(&mut self, id: NodeId, quality: f64) {
        if !self.known_heads.iter().any(|h| h.id == id) {
            self.known_heads.push(HeardHead { id, quality });
        }
    }
}

/// A member through which a head reaches an adjacent cluster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Gateway {
    pub member: NodeId,
    /// Distance between the local head and the member.
    pub distance: f64,
    /// Quality of the member -> local head link.
    pub local_quality: f64,
    /// Quality the member measured on the adjacent head's announcement.
    pub remote_quality: f64,
    /// Residual energy the member reported.
    pub residual: f64,
}

impl Gateway {
    /// Two-hop relay cost `1/local + 1/remote`; lower is better.
    pub fn relay_cost(&self) -> f64 {
        inverse(self.local_quality) + inverse(self.remote_quality)
    }
}

fn inverse(quality: f64) -> f64 {
    if quality > 0.0 {
        1.0 / quality
    } else {
        f64::INFINITY
    }
}

/// Directed cluster-adjacency graph seen from one head.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Adjacency {
    gateways: BTreeMap<NodeId, Vec<Gateway>>,
}

impl Adjacency {
    /// Records `member` as a gateway to every head in `heads` other than `local_head`.
    ///
    /// Returns the adjacent heads that were touched. A member re-announcing
    /// replaces its earlier entry instead of duplicating it.
    pub fn record(
        &mut self,
        local_head: NodeId,
        member: NodeId,
        distance: f64,
        local_quality: f64,
        heads: &[HeardHead],
        residual: f64,
    ) -> Vec<NodeId> {
        let mut touched = Vec::new();
        for head in heads.iter().filter(|h| h.id != local_head) {
            let gateway = Gateway {
                member,
                distance,
                local_quality,
                remote_quality: head.quality,
                residual,
            };
            let entries = self.gateways.entry(head.id).or_default();
            match entries.iter_mut().find(|g| g.member == member) {
                Some(existing) => *existing = gateway,
                None => entries.push(gateway),
            }
            touched.push(head.id);
        }
        touched
    }

    pub fn is_empty(&self) -> bool {
        self.gateways.is_empty()
    }

    pub fn is_adjacent(&self, head: NodeId) -> bool {
        self.gateways.contains_key(&head)
    }

    /// Adjacent heads in ascending id order.
    pub fn adjacent_heads(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.gateways.keys().copied()
    }

    pub fn gateways_to(&self, head: NodeId) -> &[Gateway] {
        self.gateways.get(&head).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Gateway with the lowest relay cost toward `head`, lowest member id on ties.
    pub fn best_gateway(&self, head: NodeId) -> Option<&Gateway> {
        self.gateways_to(head).iter().min_by(|a, b| {
            a.relay_cost()
                .total_cmp(&b.relay_cost())
                .then(a.member.cmp(&b.member))
        })
    }

    /// Each gateway member once, whatever cluster it bridges to.
    pub fn distinct_gateways(&self) -> Vec<Gateway> {
        let mut seen = BTreeSet::new();
        self.gateways
            .values()
            .flatten()
            .filter(|g| seen.insert(g.member))
            .copied()
            .collect()
    }

    /// Snapshot as adjacent head -> gateway member ids.
    pub fn snapshot(&self) -> BTreeMap<NodeId, Vec<NodeId>> {
        self.gateways
            .iter()
            .map(|(head, gws)| (*head, gws.iter().map(|g| g.member).collect()))
            .collect()
    }
}

/// Cluster bookkeeping of a node holding the cluster-head role.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeadState {
    pub members: BTreeSet<NodeId>,
    pub adjacency: Adjacency,
}
