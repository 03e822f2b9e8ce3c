//! Property tests for the protocol building blocks
//!
//! - Link quality: monotonically non-increasing in distance
//! - Election: the maximum score always promotes
//! - Routing: a path containing the receiver is never recorded
//! - Aggregation: forwarding loses and duplicates nothing
//! - Whole rounds: every sensor ends decided, parents form a tree under
//!   every routing scheme, route metric and tie-break

use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use wsn_cluster::*;

// ============================================================================
// Strategies
// ============================================================================

fn distance() -> impl Strategy<Value = f64> {
    0.01f64..1000.0
}

fn scores() -> impl Strategy<Value = BTreeMap<NodeId, f64>> {
    prop::collection::btree_map(0usize..50, 0.0f64..1e6, 0..12)
}

fn record() -> impl Strategy<Value = Record> {
    (0u64..3, 0usize..20, 0u32..4).prop_map(|(round, source, seq)| Record {
        round,
        source,
        seq,
        payload: format!("r{round}-s{source}-q{seq}"),
    })
}

fn protocol() -> impl Strategy<Value = (RoutingStrategy, RouteMetric, TieBreak)> {
    (
        prop_oneof![
            Just(RoutingStrategy::Flood),
            Just(RoutingStrategy::ParentSelection)
        ],
        prop_oneof![Just(RouteMetric::MinHops), Just(RouteMetric::MaxQuality)],
        prop_oneof![Just(TieBreak::Lenient), Just(TieBreak::Strict)],
    )
}

fn deployment() -> impl Strategy<Value = Vec<Position>> {
    prop::collection::vec((0.0f64..300.0, 0.0f64..300.0), 1..16)
        .prop_map(|points| points.into_iter().map(|(x, y)| Position::new(x, y)).collect())
}

// ============================================================================
// Link quality
// ============================================================================

proptest! {
    #[test]
    fn quality_non_increasing_in_distance(
        a in distance(),
        b in distance(),
        noise in -5.0f64..5.0,
    ) {
        let (near, far) = if a <= b { (a, b) } else { (b, a) };
        let q_near = path_loss_quality(40.0, 20.0, near, noise);
        let q_far = path_loss_quality(40.0, 20.0, far, noise);
        prop_assert!(q_near >= q_far, "q({near}) = {q_near} < q({far}) = {q_far}");
    }

    #[test]
    fn quality_is_positive(d in distance(), noise in -10.0f64..10.0) {
        prop_assert!(path_loss_quality(40.0, 20.0, d, noise) > 0.0);
    }
}

// ============================================================================
// Election
// ============================================================================

proptest! {
    /// The highest score in a neighborhood always promotes, under either tie-break
    /// when it is unique, and under the lenient one regardless.
    #[test]
    fn maximum_score_promotes(own_id in 50usize..60, others in scores()) {
        let best = others.values().copied().fold(0.0f64, f64::max);
        let lenient = ResidualElection::new(TieBreak::Lenient);
        prop_assert!(lenient.should_promote(own_id, best, &others));

        let strict = ResidualElection::new(TieBreak::Strict);
        prop_assert!(strict.should_promote(own_id, best + 1.0, &others));
    }

    #[test]
    fn strict_promotes_exactly_lowest_id_of_a_tie(
        score in 0.0f64..1e6,
        ids in prop::collection::btree_set(0usize..30, 2..6),
    ) {
        let rule = ResidualElection::new(TieBreak::Strict);
        let winners: Vec<_> = ids
            .iter()
            .filter(|&&id| {
                let others: BTreeMap<_, _> = ids
                    .iter()
                    .filter(|&&o| o != id)
                    .map(|&o| (o, score))
                    .collect();
                rule.should_promote(id, score, &others)
            })
            .collect();
        prop_assert_eq!(winners, vec![ids.iter().next().unwrap()]);
    }

    #[test]
    fn score_grows_with_residual(low in 1.0f64..500.0, extra in 1.0f64..500.0, q in 1.0f64..1e4) {
        let rule = ResidualElection::new(TieBreak::Lenient);
        let neighbors = [Neighbor { id: 1, distance: 10.0, quality: q }];
        prop_assert!(rule.score(low + extra, &neighbors) > rule.score(low, &neighbors));
    }
}

// ============================================================================
// Routing
// ============================================================================

proptest! {
    #[test]
    fn route_containing_receiver_rejected(
        own in 0usize..20,
        mut path in prop::collection::vec(0usize..20, 0..8),
        insert_at in 0usize..8,
        hops in 0u32..10,
    ) {
        let at = insert_at.min(path.len());
        path.insert(at, own);
        let mut table = RouteTable::new(99, RouteMetric::MinHops);
        prop_assert_eq!(table.offer(own, 98, hops, 1.0, &path, 1.0), Offer::Loop);
        prop_assert!(table.is_empty());
    }

    #[test]
    fn recorded_path_ends_with_receiver_and_never_repeats_it(
        own in 0usize..20,
        path in prop::collection::btree_set(20usize..40, 0..8),
    ) {
        let path: Vec<_> = path.into_iter().collect();
        let mut table = RouteTable::new(99, RouteMetric::MaxQuality);
        table.offer(own, 98, path.len() as u32, 5.0, &path, 2.0);
        let best = table.best().unwrap();
        prop_assert_eq!(best.path.last(), Some(&own));
        prop_assert_eq!(best.path.iter().filter(|&&id| id == own).count(), 1);
        prop_assert_eq!(best.hops as usize, path.len() + 1);
    }
}

// ============================================================================
// Aggregation
// ============================================================================

proptest! {
    #[test]
    fn forwarding_is_lossless_and_deduplicated(records in prop::collection::vec(record(), 0..40)) {
        let mut downstream = AggregationBuffer::new();
        downstream.extend(records.clone());
        let mut upstream = AggregationBuffer::new();
        upstream.extend(downstream.take());
        prop_assert!(downstream.is_empty());

        let expected: BTreeSet<_> = records.iter().map(Record::key).collect();
        let forwarded = upstream.take();
        let keys: Vec<_> = forwarded.iter().map(Record::key).collect();
        prop_assert_eq!(keys.len(), expected.len());
        prop_assert_eq!(keys.iter().copied().collect::<BTreeSet<_>>(), expected);
    }
}

// ============================================================================
// Whole rounds
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn rounds_end_decided_with_acyclic_parents(
        positions in deployment(),
        seed in 0u64..1000,
        (routing, route_metric, tie_break) in protocol(),
    ) {
        let mut config = SimConfig::default();
        config.seed = seed;
        config.protocol.routing = routing;
        config.protocol.route_metric = route_metric;
        config.protocol.tie_break = tie_break;
        config.sink.position = Position::new(150.0, 150.0);
        let sensors = positions.len();
        let mut network = Network::new(config, positions).unwrap();

        for _ in 0..2 {
            let report = network.run_round().unwrap();
            prop_assert_eq!(report.roles.len(), sensors);
            prop_assert_eq!(report.role_count(Role::Undefined), 0);
            for &head in report.parents.keys() {
                let mut current = head;
                let mut steps = 0;
                while let Some(Parent::Head(next)) = report.parents.get(&current) {
                    current = *next;
                    steps += 1;
                    prop_assert!(steps <= sensors, "parent cycle through {}", head);
                }
            }
        }
    }
}
