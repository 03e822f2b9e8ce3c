//! Inter-cluster routing tree: sink-rooted flood and parent-selection exchange.
//!
//! Both schemes end in one [`Parent`] pointer per cluster head. The flood keeps
//! one [`RouteEntry`] per upstream and rejects any advertisement whose visited
//! path already contains the receiver, so recorded paths never loop.
//!
//! A head also only accepts routes no longer (in hops) than its current best,
//! and its best route's hop count never grows during a round. Every parent
//! therefore holds strictly fewer hops than its child, whichever metric picks
//! the best route, and parent pointers cannot form a cycle.

use crate::cluster::Gateway;
use crate::config::{RouteMetric, TieBreak};
use crate::election::dominates;
use crate::types::NodeId;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Upstream relay of a cluster head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Parent {
    Sink,
    Head(NodeId),
}

/// A route toward the sink learned from one upstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteEntry {
    /// Logical origin of the advertisement: the sink or an adjacent head.
    pub upstream: NodeId,
    /// Cluster hops to the sink, including this one.
    pub hops: u32,
    /// Sum of per-hop link qualities.
    pub quality: f64,
    /// Heads traversed from the sink, ending with the receiver.
    pub path: Vec<NodeId>,
}

/// Outcome of offering an advertisement to a [`RouteTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// The receiver is already on the visited path.
    Loop,
    /// A better-or-equal route from the same upstream is already recorded.
    NotBetter,
    /// More hops than the receiver's current best route.
    Infeasible,
    /// Recorded; `improved_best` tells whether the best route changed.
    Recorded { improved_best: bool },
}

/// Orders two routes; `Ordering::Less` means `a` is preferred.
pub fn compare_routes(metric: RouteMetric, a: &RouteEntry, b: &RouteEntry) -> Ordering {
    let by_hops = a.hops.cmp(&b.hops);
    let by_quality = b.quality.total_cmp(&a.quality);
    let primary = match metric {
        RouteMetric::MinHops => by_hops.then(by_quality),
        RouteMetric::MaxQuality => by_quality.then(by_hops),
    };
    primary.then(a.upstream.cmp(&b.upstream))
}

/// Routes a head has learned this round, keyed by upstream.
#[derive(Debug, Clone)]
pub struct RouteTable {
    sink: NodeId,
    metric: RouteMetric,
    entries: BTreeMap<NodeId, RouteEntry>,
    /// Hop count of the current best route; never grows within a round.
    feasible_hops: Option<u32>,
}

impl RouteTable {
    pub fn new(sink: NodeId, metric: RouteMetric) -> Self {
        Self {
            sink,
            metric,
            entries: BTreeMap::new(),
            feasible_hops: None,
        }
    }

    /// Offers an advertisement from `upstream` received over a link of `link_quality`.
    pub fn offer(
        &mut self,
        own_id: NodeId,
        upstream: NodeId,
        hop_count: u32,
        accumulated_quality: f64,
        visited_path: &[NodeId],
        link_quality: f64,
    ) -> Offer {
        if visited_path.contains(&own_id) {
            return Offer::Loop;
        }
        let mut path = visited_path.to_vec();
        path.push(own_id);
        let candidate = RouteEntry {
            upstream,
            hops: hop_count.saturating_add(1),
            quality: accumulated_quality + link_quality,
            path,
        };
        if let Some(existing) = self.entries.get(&upstream) {
            if compare_routes(self.metric, existing, &candidate) != Ordering::Greater {
                return Offer::NotBetter;
            }
        }
        if self.feasible_hops.is_some_and(|hops| candidate.hops > hops) {
            return Offer::Infeasible;
        }
        let previous_best = self.best().cloned();
        self.entries.insert(upstream, candidate);
        let best = self.best().cloned();
        self.feasible_hops = best.as_ref().map(|entry| entry.hops);
        let improved_best = match (&previous_best, &best) {
            (None, Some(_)) => true,
            (Some(old), Some(new)) => compare_routes(self.metric, new, old) == Ordering::Less,
            _ => false,
        };
        Offer::Recorded { improved_best }
    }

    /// Preferred route under the table's metric, among routes still within
    /// the feasible hop count.
    pub fn best(&self) -> Option<&RouteEntry> {
        self.entries
            .values()
            .filter(|entry| self.feasible_hops.map_or(true, |hops| entry.hops <= hops))
            .min_by(|a, b| compare_routes(self.metric, a, b))
    }

    pub fn parent(&self) -> Option<Parent> {
        self.best().map(|entry| {
            if entry.upstream == self.sink {
                Parent::Sink
            } else {
                Parent::Head(entry.upstream)
            }
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parent-selection value: `residual × Σ gateway.residual / gateway.distance`.
///
/// A zero-distance gateway saturates the sum to `f64::INFINITY`.
pub fn parent_selection_value(residual: f64, gateways: &[Gateway]) -> f64 {
    if residual <= 0.0 {
        return 0.0;
    }
    let mut sum = 0.0;
    for gateway in gateways {
        if gateway.distance <= 0.0 {
            return f64::INFINITY;
        }
        sum += gateway.residual.max(0.0) / gateway.distance;
    }
    residual * sum
}

/// Parent-selection values collected by one head.
#[derive(Debug, Clone, Default)]
pub struct PsvExchange {
    pub own: Option<f64>,
    pub received: BTreeMap<NodeId, f64>,
}

impl PsvExchange {
    /// Sink when the own value dominates (or nothing arrived), otherwise the best adjacent head.
    pub fn choose_parent(&self, tie_break: TieBreak, own_id: NodeId) -> Parent {
        let own = self.own.unwrap_or(0.0);
        if dominates(tie_break, own_id, own, &self.received) {
            return Parent::Sink;
        }
        self.received
            .iter()
            .filter(|(_, s)| !s.is_nan())
            .max_by(|(ia, a), (ib, b)| a.total_cmp(b).then(ib.cmp(ia)))
            .map(|(&id, _)| Parent::Head(id))
            .unwrap_or(Parent::Sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINK: NodeId = 99;

    #[test]
    fn test_loop_rejected() {
        let mut table = RouteTable::new(SINK, RouteMetric::MinHops);
        assert_eq!(table.offer(3, 5, 1, 10.0, &[5, 3, 7], 4.0), Offer::Loop);
        assert!(table.is_empty());
    }

    #[test]
    fn test_first_offer_records_and_appends_self() {
        let mut table = RouteTable::new(SINK, RouteMetric::MinHops);
        let offer = table.offer(3, SINK, 0, 0.0, &[], 4.0);
        assert_eq!(offer, Offer::Recorded { improved_best: true });
        let best = table.best().unwrap();
        assert_eq!(best.hops, 1);
        assert_eq!(best.path, vec![3]);
        assert_eq!(table.parent(), Some(Parent::Sink));
    }

    #[test]
    fn test_equal_offer_from_same_upstream_rejected() {
        let mut table = RouteTable::new(SINK, RouteMetric::MinHops);
        table.offer(3, 5, 1, 10.0, &[5], 4.0);
        assert_eq!(table.offer(3, 5, 1, 10.0, &[5], 4.0), Offer::NotBetter);
        assert_eq!(table.offer(3, 5, 2, 50.0, &[8, 5], 4.0), Offer::NotBetter);
        assert_eq!(
            table.offer(3, 5, 1, 20.0, &[5], 4.0),
            Offer::Recorded { improved_best: true }
        );
    }

    #[test]
    fn test_worse_upstream_recorded_without_improving() {
        let mut table = RouteTable::new(SINK, RouteMetric::MinHops);
        table.offer(3, 5, 1, 10.0, &[5], 4.0);
        let offer = table.offer(3, 6, 1, 1.0, &[6], 4.0);
        assert_eq!(offer, Offer::Recorded { improved_best: false });
        assert_eq!(table.len(), 2);
        assert_eq!(table.parent(), Some(Parent::Head(5)));
    }

    #[test]
    fn test_longer_route_than_best_is_infeasible() {
        let mut table = RouteTable::new(SINK, RouteMetric::MinHops);
        table.offer(3, SINK, 0, 0.0, &[], 4.0);
        assert_eq!(table.offer(3, 5, 1, 10.0, &[5], 4.0), Offer::Infeasible);
        assert_eq!(table.len(), 1);
        assert_eq!(table.parent(), Some(Parent::Sink));
    }

    #[test]
    fn test_max_quality_prefers_stronger_feasible_path() {
        let mut table = RouteTable::new(SINK, RouteMetric::MaxQuality);
        table.offer(3, 5, 2, 10.0, &[8, 5], 4.0);
        let offer = table.offer(3, 7, 1, 1.0, &[7], 4.0);
        assert_eq!(offer, Offer::Recorded { improved_best: false });
        assert_eq!(table.parent(), Some(Parent::Head(5)));
        assert_eq!(table.offer(3, 9, 3, 90.0, &[1, 2, 9], 4.0), Offer::Infeasible);
        assert_eq!(table.parent(), Some(Parent::Head(5)));
    }

    #[test]
    fn test_heads_both_next_to_sink_ignore_each_others_reflood() {
        // Heads 3 and 5 both hear the sink, then each relays its route to the
        // other with a higher accumulated quality.
        let mut left = RouteTable::new(SINK, RouteMetric::MaxQuality);
        let mut right = RouteTable::new(SINK, RouteMetric::MaxQuality);
        left.offer(3, SINK, 0, 0.0, &[], 4.0);
        right.offer(5, SINK, 0, 0.0, &[], 4.0);
        assert_eq!(left.offer(3, 5, 1, 50.0, &[5], 4.0), Offer::Infeasible);
        assert_eq!(right.offer(5, 3, 1, 50.0, &[3], 4.0), Offer::Infeasible);
        assert_eq!(left.parent(), Some(Parent::Sink));
        assert_eq!(right.parent(), Some(Parent::Sink));
    }

    #[test]
    fn test_psv_sentinel_and_scaling() {
        let gateway = |distance, residual| Gateway {
            member: 1,
            distance,
            local_quality: 1.0,
            remote_quality: 1.0,
            residual,
        };
        assert_eq!(parent_selection_value(10.0, &[]), 0.0);
        assert_eq!(
            parent_selection_value(10.0, &[gateway(0.0, 5.0)]),
            f64::INFINITY
        );
        let psv = parent_selection_value(2.0, &[gateway(10.0, 100.0), gateway(20.0, 100.0)]);
        assert!((psv - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_choose_parent() {
        let mut exchange = PsvExchange {
            own: Some(5.0),
            received: BTreeMap::new(),
        };
        assert_eq!(exchange.choose_parent(TieBreak::Lenient, 1), Parent::Sink);

        exchange.received.insert(4, 9.0);
        exchange.received.insert(2, 9.0);
        exchange.received.insert(6, 3.0);
        assert_eq!(exchange.choose_parent(TieBreak::Lenient, 1), Parent::Head(2));

        exchange.own = Some(9.0);
        assert_eq!(exchange.choose_parent(TieBreak::Lenient, 1), Parent::Sink);
        assert_eq!(exchange.choose_parent(TieBreak::Strict, 3), Parent::Head(2));
    }
}
