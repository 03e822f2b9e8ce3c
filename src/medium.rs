//! Shared radio medium: geometry, range checks and link-quality stamping.
//!
//! Stations `0..n` are sensors; station `n` is the sink. Broadcasts reach
//! every other station within the sender's range, unicasts are dropped when
//! the receiver is out of range, and the sink uplink always gets through.

use crate::error::WsnError;
use crate::link::LinkQuality;
use crate::types::{Envelope, Message, Neighbor, NodeId, Position, Target};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::trace;

/// Outcome of handing one transmission to the medium.
#[derive(Debug, Default)]
pub struct Transmission {
    /// Receiver and stamped envelope, in ascending receiver order.
    pub deliveries: Vec<(NodeId, Envelope)>,
    /// Unicasts that failed the range check.
    pub dropped: u64,
}

pub struct Medium<L: LinkQuality> {
    positions: Vec<Position>,
    tx_range: f64,
    sink_range: f64,
    link: L,
    rng: ChaCha8Rng,
}

impl<L: LinkQuality> Medium<L> {
    pub fn new(
        sensors: Vec<Position>,
        sink: Position,
        tx_range: f64,
        sink_range: f64,
        link: L,
        seed: u64,
    ) -> Self {
        let mut positions = sensors;
        positions.push(sink);
        Self {
            positions,
            tx_range,
            sink_range,
            link,
            rng: ChaCha8Rng::seed_from_u64(seed ^ 0x6d65_6469_756d),
        }
    }

    pub fn sensor_count(&self) -> usize {
        self.positions.len() - 1
    }

    pub fn sink_id(&self) -> NodeId {
        self.positions.len() - 1
    }

    pub fn tx_range(&self) -> f64 {
        self.tx_range
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn position(&self, id: NodeId) -> Result<Position, WsnError> {
        self.positions
            .get(id)
            .copied()
            .ok_or(WsnError::UnknownNode(id))
    }

    pub fn distance(&self, a: NodeId, b: NodeId) -> Result<f64, WsnError> {
        Ok(self.position(a)?.distance(&self.position(b)?))
    }

    fn range_of(&self, id: NodeId) -> f64 {
        if id == self.sink_id() {
            self.sink_range
        } else {
            self.tx_range
        }
    }

    /// Starts a new round of link-quality draws.
    pub fn begin_round(&mut self) {
        self.link.begin_round();
    }

    /// Sensors within transmission range of `id`, in ascending id order.
    pub fn neighbors_in_range(&mut self, id: NodeId) -> Result<Vec<Neighbor>, WsnError> {
        let origin = self.position(id)?;
        let mut neighbors = Vec::new();
        for other in 0..self.sensor_count() {
            if other == id {
                continue;
            }
            let distance = origin.distance(&self.positions[other]);
            if distance <= self.tx_range {
                neighbors.push(Neighbor {
                    id: other,
                    distance,
                    quality: self.link.quality(id, other, distance),
                });
            }
        }
        Ok(neighbors)
    }

    /// Resolves the receivers of a transmission by `from` and stamps each envelope.
    pub fn transmit(
        &mut self,
        from: NodeId,
        target: Target,
        message: &Message,
    ) -> Result<Transmission, WsnError> {
        let origin = self.position(from)?;
        let range = self.range_of(from);
        let mut transmission = Transmission::default();

        let receivers: Vec<NodeId> = match target {
            Target::Broadcast => (0..self.positions.len())
                .filter(|&to| to != from && origin.distance(&self.positions[to]) <= range)
                .collect(),
            Target::Node(to) => {
                let distance = origin.distance(&self.position(to)?);
                if to != from && distance <= range {
                    vec![to]
                } else {
                    trace!(from, to, distance, range, "unicast out of range, dropped");
                    transmission.dropped += 1;
                    Vec::new()
                }
            }
            Target::Sink => vec![self.sink_id()],
        };

        for to in receivers {
            let distance = origin.distance(&self.positions[to]);
            let quality = self.link.quality(from, to, distance);
            transmission.deliveries.push((
                to,
                Envelope {
                    from,
                    message: message.clone(),
                    distance,
                    quality,
                },
            ));
        }
        Ok(transmission)
    }

    /// Places a station at `position`.
    pub fn move_node(&mut self, id: NodeId, position: Position) -> Result<(), WsnError> {
        let slot = self
            .positions
            .get_mut(id)
            .ok_or(WsnError::UnknownNode(id))?;
        *slot = position;
        Ok(())
    }

    /// Shifts every sensor by up to `max_displacement` per axis, clamped to the terrain.
    pub fn perturb(&mut self, max_displacement: f64, width: f64, height: f64) {
        if max_displacement <= 0.0 {
            return;
        }
        let sensors = self.sensor_count();
        for position in self.positions.iter_mut().take(sensors) {
            let dx = self.rng.gen_range(-max_displacement..=max_displacement);
            let dy = self.rng.gen_range(-max_displacement..=max_displacement);
            position.x = (position.x + dx).clamp(0.0, width);
            position.y = (position.y + dy).clamp(0.0, height);
        }
    }
}

/// Sensors on a `columns × rows` grid starting at `origin`.
///
/// Each sensor is shifted by up to `jitter` per axis. Ids run row by row.
pub fn jittered_grid(
    columns: usize,
    rows: usize,
    origin: f64,
    spacing: f64,
    jitter: f64,
    seed: u64,
) -> Vec<Position> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let offset = |rng: &mut ChaCha8Rng| {
        if jitter > 0.0 {
            rng.gen_range(-jitter..=jitter)
        } else {
            0.0
        }
    };
    let mut positions = Vec::with_capacity(columns * rows);
    for row in 0..rows {
        for column in 0..columns {
            let x = origin + spacing * column as f64 + offset(&mut rng);
            let y = origin + spacing * row as f64 + offset(&mut rng);
            positions.push(Position::new(x, y));
        }
    }
    positions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RadioConfig;
    use crate::link::LogDistance;
    use crate::types::MessageKind;

    fn line_medium() -> Medium<LogDistance> {
        let radio = RadioConfig {
            tx_range: 15.0,
            noise_std_db: 0.0,
            ..Default::default()
        };
        Medium::new(
            vec![
                Position::new(0.0, 0.0),
                Position::new(10.0, 0.0),
                Position::new(20.0, 0.0),
            ],
            Position::new(30.0, 0.0),
            radio.tx_range,
            12.0,
            LogDistance::new(&radio, 1),
            1,
        )
    }

    fn hello(source: NodeId) -> Message {
        Message::new(source, MessageKind::IAmClusterHead)
    }

    #[test]
    fn test_neighbors_exclude_sink_and_far_nodes() {
        let mut medium = line_medium();
        let ids: Vec<_> = medium
            .neighbors_in_range(0)
            .unwrap()
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![1]);
        let ids: Vec<_> = medium
            .neighbors_in_range(2)
            .unwrap()
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn test_broadcast_reaches_sink_in_range() {
        let mut medium = line_medium();
        let tx = medium.transmit(2, Target::Broadcast, &hello(2)).unwrap();
        let receivers: Vec<_> = tx.deliveries.iter().map(|(to, _)| *to).collect();
        assert_eq!(receivers, vec![1, 3]);
        let (_, envelope) = &tx.deliveries[0];
        assert_eq!(envelope.from, 2);
        assert!((envelope.distance - 10.0).abs() < 1e-9);
        assert!((envelope.quality - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_unicast_out_of_range_dropped() {
        let mut medium = line_medium();
        let tx = medium.transmit(0, Target::Node(2), &hello(0)).unwrap();
        assert!(tx.deliveries.is_empty());
        assert_eq!(tx.dropped, 1);
        assert!(matches!(
            medium.transmit(0, Target::Node(42), &hello(0)),
            Err(WsnError::UnknownNode(42))
        ));
    }

    #[test]
    fn test_sink_uplink_ignores_range() {
        let mut medium = line_medium();
        let tx = medium.transmit(0, Target::Sink, &hello(0)).unwrap();
        assert_eq!(tx.deliveries.len(), 1);
        assert_eq!(tx.deliveries[0].0, medium.sink_id());
    }

    #[test]
    fn test_perturb_stays_on_terrain() {
        let mut medium = line_medium();
        medium.perturb(50.0, 25.0, 25.0);
        for position in &medium.positions()[..medium.sensor_count()] {
            assert!((0.0..=25.0).contains(&position.x));
            assert!((0.0..=25.0).contains(&position.y));
        }
        assert_eq!(medium.position(3).unwrap(), Position::new(30.0, 0.0));
    }

    #[test]
    fn test_jittered_grid_bounds() {
        let grid = jittered_grid(6, 6, 60.0, 100.0, 40.0, 5);
        assert_eq!(grid.len(), 36);
        let last = grid[35];
        assert!((520.0..=600.0).contains(&last.x));
        assert!((520.0..=600.0).contains(&last.y));
        assert_eq!(grid, jittered_grid(6, 6, 60.0, 100.0, 40.0, 5));
    }
}
