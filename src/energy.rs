use crate::{error::WsnError, types::MessageKind};
use serde::{Deserialize, Serialize};

/// Trait for transmission energy accounting.
///
/// Implementors decide what a single transmission costs; the node's [`Battery`]
/// is drained by that amount before the send is handed to the medium.
pub trait EnergyModel: Send + Sync + Clone + 'static {
    /// Energy consumed by transmitting `kind` once.
    fn transmission_cost(&self, kind: &MessageKind) -> f64;
}

/// Flat per-transmission cost, independent of payload and destination.
#[derive(Debug, Clone)]
pub struct FixedCost {
    per_transmission: f64,
}

impl FixedCost {
    /// Creates a fixed-cost model.
    ///
    /// # Errors
    /// Returns an error if `per_transmission` is negative or not finite.
    pub fn new(per_transmission: f64) -> Result<Self, WsnError> {
        if !(per_transmission >= 0.0 && per_transmission.is_finite()) {
            return Err(WsnError::InvalidConfig(
                "transmission cost must be a non-negative number".into(),
            ));
        }
        Ok(Self { per_transmission })
    }
}

impl EnergyModel for FixedCost {
    fn transmission_cost(&self, _kind: &MessageKind) -> f64 {
        self.per_transmission
    }
}

/// Residual energy of one node.
///
/// Never increases within a round; only [`Battery::recharge`] restores it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Battery {
    residual: f64,
}

impl Battery {
    pub fn new(initial: f64) -> Self {
        Self { residual: initial }
    }

    /// Deducts `cost`; the residual may go negative since sends are not gated here.
    pub fn drain(&mut self, cost: f64) {
        self.residual -= cost.max(0.0);
    }

    pub fn residual(&self) -> f64 {
        self.residual
    }

    pub fn is_depleted(&self) -> bool {
        self.residual <= 0.0
    }

    pub fn recharge(&mut self, level: f64) {
        self.residual = level;
    }
}
