use crate::config::TieBreak;
use crate::types::{Neighbor, NodeId};
use std::collections::BTreeMap;

/// Trait for cluster-head election rules.
///
/// Implementors define the local election score (CHSV) and decide, from the
/// scores collected from neighbors, whether a node takes the cluster-head role.
pub trait ElectionRule: Send + Sync + Clone + 'static {
    /// Computes the election score from residual energy and the neighbors in range.
    fn score(&self, residual: f64, neighbors: &[Neighbor]) -> f64;

    /// Whether `own_score` wins against the remaining neighbor scores.
    fn should_promote(
        &self,
        own_id: NodeId,
        own_score: f64,
        neighbor_scores: &BTreeMap<NodeId, f64>,
    ) -> bool;
}

/// Residual-value election: `CHSV = residual × Σ quality(self, neighbor)`.
///
/// More energy and better aggregate connectivity both raise the score. A node
/// promotes when its score is at least the best score it heard, or when it
/// heard none.
#[derive(Debug, Clone)]
pub struct ResidualElection {
    tie_break: TieBreak,
}

impl ResidualElection {
    pub fn new(tie_break: TieBreak) -> Self {
        Self { tie_break }
    }

    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }
}

impl ElectionRule for ResidualElection {
    fn score(&self, residual: f64, neighbors: &[Neighbor]) -> f64 {
        if residual <= 0.0 {
            return 0.0;
        }
        let connectivity: f64 = neighbors.iter().map(|n| n.quality).sum();
        if connectivity.is_infinite() {
            // Co-located neighbor; saturate instead of propagating inf * x.
            return f64::INFINITY;
        }
        residual * connectivity
    }

    fn should_promote(
        &self,
        own_id: NodeId,
        own_score: f64,
        neighbor_scores: &BTreeMap<NodeId, f64>,
    ) -> bool {
        dominates(self.tie_break, own_id, own_score, neighbor_scores)
    }
}

/// Election state of an undecided node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Candidate {
    pub score: f64,
    /// Scores reported by neighbors still in the running.
    pub neighbor_scores: BTreeMap<NodeId, f64>,
    /// Set once the steady phase passed without a decision; no later promotion.
    pub closed: bool,
}

impl Candidate {
    pub fn new(score: f64) -> Self {
        Self {
            score,
            neighbor_scores: BTreeMap::new(),
            closed: false,
        }
    }
}

/// Whether `own_score` beats every score in `others` under `tie_break`.
///
/// An empty map always dominates. NaN scores are ignored.
pub(crate) fn dominates(
    tie_break: TieBreak,
    own_id: NodeId,
    own_score: f64,
    others: &BTreeMap<NodeId, f64>,
) -> bool {
    let best = others
        .values()
        .copied()
        .filter(|s| !s.is_nan())
        .fold(f64::NEG_INFINITY, f64::max);
    if best == f64::NEG_INFINITY {
        return true;
    }
    match tie_break {
        TieBreak::Lenient => own_score >= best,
        TieBreak::Strict => {
            own_score > best
                || (own_score == best
                    && others
                        .iter()
                        .filter(|&(_, &s)| s == best)
                        .all(|(&id, _)| id > own_id))
        }
    }
}
