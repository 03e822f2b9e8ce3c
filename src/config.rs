use crate::error::WsnError;
use crate::types::Position;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How equal election or parent-selection scores are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// A score equal to the best neighbor score still wins; tied nodes may all promote.
    #[default]
    Lenient,
    /// Only a strictly greater score wins; exact ties go to the lowest id.
    Strict,
}

/// Inter-cluster routing scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    /// Sink floods route advertisements through the cluster adjacency graph.
    #[default]
    Flood,
    /// Heads exchange parent-selection values with adjacent heads.
    ParentSelection,
}

/// Ordering used to compare recorded routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteMetric {
    /// Fewest cluster hops, higher accumulated quality on ties.
    #[default]
    MinHops,
    /// Highest accumulated quality, fewer hops on ties.
    MaxQuality,
}

/// When link noise is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseSampling {
    /// One draw per directed pair per round.
    #[default]
    PerRound,
    /// A fresh draw on every query.
    PerMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// Transmission range of every sensor.
    pub tx_range: f64,
    /// Received signal at unit distance, in dB.
    pub base_loss_db: f64,
    /// Multiplier of `log10(distance)` in the path-loss term.
    pub path_loss_exponent: f64,
    /// Standard deviation of the additive Gaussian noise, in dB.
    pub noise_std_db: f64,
    pub noise_sampling: NoiseSampling,
    /// Share one noise draw between both directions of a pair.
    pub symmetric_noise: bool,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            tx_range: 130.0,
            base_loss_db: 40.0,
            path_loss_exponent: 20.0,
            noise_std_db: 1.0,
            noise_sampling: NoiseSampling::PerRound,
            symmetric_noise: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Delay between deciding to transmit and delivery.
    pub broadcast_delay_ms: u64,
    /// Time spent collecting neighbor scores.
    pub election_window_ms: u64,
    /// Time between the election decision and the steady phase.
    pub announce_window_ms: u64,
    /// Offset of route construction from the steady phase.
    pub route_setup_delay_ms: u64,
    /// Time spent collecting parent-selection values.
    pub psv_window_ms: u64,
    /// Offset of the first data tick from the steady phase.
    pub data_offset_ms: u64,
    /// Offset of a head's forwarding tick from the matching data tick.
    pub forward_delay_ms: u64,
    /// Spacing between consecutive data and forwarding ticks.
    pub forward_interval_ms: u64,
    pub data_jitter_min_ms: u64,
    pub data_jitter_max_ms: u64,
    /// Readings each member sends per round.
    pub records_per_round: u32,
    /// Residual energy of a fresh node.
    pub initial_energy: f64,
    /// Energy drained by each transmission.
    pub tx_cost: f64,
    pub tie_break: TieBreak,
    pub routing: RoutingStrategy,
    pub route_metric: RouteMetric,
    /// Promote nodes still undecided when the steady phase begins.
    pub promote_orphans: bool,
    /// Suppress transmissions once residual energy is exhausted.
    pub halt_when_depleted: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            broadcast_delay_ms: 100,
            election_window_ms: 500,
            announce_window_ms: 500,
            route_setup_delay_ms: 400,
            psv_window_ms: 500,
            data_offset_ms: 1000,
            forward_delay_ms: 1000,
            forward_interval_ms: 2000,
            data_jitter_min_ms: 100,
            data_jitter_max_ms: 700,
            records_per_round: 2,
            initial_energy: 1000.0,
            tx_cost: 1.0,
            tie_break: TieBreak::Lenient,
            routing: RoutingStrategy::Flood,
            route_metric: RouteMetric::MinHops,
            promote_orphans: true,
            halt_when_depleted: false,
        }
    }
}

impl ProtocolConfig {
    pub fn broadcast_delay(&self) -> Duration {
        Duration::from_millis(self.broadcast_delay_ms)
    }

    pub fn election_window(&self) -> Duration {
        Duration::from_millis(self.election_window_ms)
    }

    pub fn announce_window(&self) -> Duration {
        Duration::from_millis(self.announce_window_ms)
    }

    pub fn route_setup_delay(&self) -> Duration {
        Duration::from_millis(self.route_setup_delay_ms)
    }

    pub fn psv_window(&self) -> Duration {
        Duration::from_millis(self.psv_window_ms)
    }

    /// Offset of the steady phase from round start.
    pub fn steady_offset(&self) -> Duration {
        self.broadcast_delay() + self.election_window() + self.announce_window()
    }

    /// Offset of data tick `k` from the steady phase, before jitter.
    pub fn data_tick_offset(&self, k: u32) -> Duration {
        let spread = u64::from(k).saturating_mul(self.forward_interval_ms);
        Duration::from_millis(self.data_offset_ms.saturating_add(spread))
    }

    /// Offset of forwarding tick `k` from the steady phase.
    pub fn forward_tick_offset(&self, k: u32) -> Duration {
        self.data_tick_offset(k) + Duration::from_millis(self.forward_delay_ms)
    }

    /// Offset of the last forwarding tick from round start.
    pub fn last_forward_offset(&self) -> Duration {
        self.steady_offset() + self.forward_tick_offset(self.records_per_round.saturating_sub(1))
    }

    /// [`Self::last_forward_offset`] in milliseconds, or `None` if it overflows.
    fn checked_last_forward_ms(&self) -> Option<u64> {
        let spread = u64::from(self.records_per_round.saturating_sub(1))
            .checked_mul(self.forward_interval_ms)?;
        [
            self.broadcast_delay_ms,
            self.election_window_ms,
            self.announce_window_ms,
            self.data_offset_ms,
            self.forward_delay_ms,
        ]
        .into_iter()
        .try_fold(spread, u64::checked_add)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundConfig {
    /// Length of one election-formation-routing-data cycle.
    pub interval_ms: u64,
    /// Keep residual energy across rounds instead of recharging.
    pub carry_energy: bool,
    /// Bound of the random displacement applied at round start; zero disables movement.
    pub max_displacement: f64,
    pub terrain_width: f64,
    pub terrain_height: f64,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            interval_ms: 12_000,
            carry_energy: true,
            max_displacement: 0.0,
            terrain_width: 700.0,
            terrain_height: 700.0,
        }
    }
}

impl RoundConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub position: Position,
    /// Range of the sink's route advertisements.
    pub range: f64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            position: Position::new(620.0, 620.0),
            range: 250.0,
        }
    }
}

/// Complete configuration of a simulated deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seed of every random draw in the simulation.
    pub seed: u64,
    pub radio: RadioConfig,
    pub protocol: ProtocolConfig,
    pub rounds: RoundConfig,
    pub sink: SinkConfig,
}

impl SimConfig {
    /// Parses a JSON configuration and validates it.
    pub fn from_json(json: &str) -> Result<Self, WsnError> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks ranges and that a round's timeline fits in its interval.
    ///
    /// # Errors
    /// Returns [`WsnError::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<(), WsnError> {
        let radio = &self.radio;
        let protocol = &self.protocol;
        let rounds = &self.rounds;

        if !(radio.tx_range > 0.0 && radio.tx_range.is_finite()) {
            return Err(invalid("radio.tx_range must be positive"));
        }
        if !(radio.noise_std_db >= 0.0 && radio.noise_std_db.is_finite()) {
            return Err(invalid("radio.noise_std_db must be non-negative"));
        }
        if !radio.base_loss_db.is_finite() || !(radio.path_loss_exponent >= 0.0) {
            return Err(invalid("radio path-loss parameters must be finite and non-negative"));
        }
        if !(self.sink.range >= 0.0) {
            return Err(invalid("sink.range must be non-negative"));
        }
        if !(protocol.initial_energy >= 0.0) || !(protocol.tx_cost >= 0.0) {
            return Err(invalid("energy values must be non-negative"));
        }
        if protocol.broadcast_delay_ms == 0 {
            return Err(invalid("protocol.broadcast_delay_ms must be positive"));
        }
        if protocol.forward_interval_ms == 0 {
            return Err(invalid("protocol.forward_interval_ms must be positive"));
        }
        if protocol.data_jitter_min_ms > protocol.data_jitter_max_ms {
            return Err(invalid("protocol.data_jitter_min_ms exceeds data_jitter_max_ms"));
        }
        let latest_arrival = protocol
            .data_jitter_max_ms
            .checked_add(protocol.broadcast_delay_ms);
        if latest_arrival.map_or(true, |arrival| arrival >= protocol.forward_delay_ms) {
            return Err(invalid(
                "readings must reach the head before its forwarding tick",
            ));
        }
        if protocol.forward_delay_ms >= protocol.forward_interval_ms {
            return Err(invalid("protocol.forward_delay_ms must be below forward_interval_ms"));
        }
        if !(rounds.max_displacement >= 0.0)
            || !(rounds.terrain_width > 0.0)
            || !(rounds.terrain_height > 0.0)
        {
            return Err(invalid("round movement bounds must be positive"));
        }
        let last_forward_ms = protocol
            .checked_last_forward_ms()
            .ok_or_else(|| invalid("protocol timeline overflows"))?;
        if last_forward_ms >= rounds.interval_ms {
            return Err(invalid(
                "round interval is shorter than the protocol timeline",
            ));
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> WsnError {
    WsnError::InvalidConfig(reason.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        SimConfig::default().validate().unwrap();
    }

    #[test]
    fn test_steady_offset_matches_timeline() {
        let protocol = ProtocolConfig::default();
        assert_eq!(protocol.steady_offset(), Duration::from_millis(1100));
        assert_eq!(protocol.forward_tick_offset(1), Duration::from_millis(4000));
        assert_eq!(protocol.last_forward_offset(), Duration::from_millis(5100));
    }

    #[test]
    fn test_short_interval_rejected() {
        let mut config = SimConfig::default();
        config.rounds.interval_ms = 3000;
        assert!(matches!(
            config.validate(),
            Err(WsnError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_overflowing_timeline_rejected() {
        let huge = u64::MAX;
        let jitter = format!(r#"{{ "protocol": {{ "data_jitter_max_ms": {huge} }} }}"#);
        assert!(matches!(
            SimConfig::from_json(&jitter),
            Err(WsnError::InvalidConfig(_))
        ));

        let spread = format!(
            r#"{{ "protocol": {{ "forward_interval_ms": {huge}, "records_per_round": 3 }} }}"#
        );
        assert!(matches!(
            SimConfig::from_json(&spread),
            Err(WsnError::InvalidConfig(_))
        ));

        let protocol = ProtocolConfig {
            forward_interval_ms: huge,
            ..Default::default()
        };
        assert_eq!(protocol.data_tick_offset(3), Duration::from_millis(huge));
    }

    #[test]
    fn test_negative_range_rejected() {
        let mut config = SimConfig::default();
        config.radio.tx_range = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SimConfig::from_json(
            r#"{ "seed": 7, "protocol": { "tie_break": "strict", "routing": "parent_selection" } }"#,
        )
        .unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.protocol.tie_break, TieBreak::Strict);
        assert_eq!(config.protocol.routing, RoutingStrategy::ParentSelection);
        assert_eq!(config.radio.tx_range, 130.0);
    }
}
