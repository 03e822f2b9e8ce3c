//! Pairwise link quality from log-distance path loss with Gaussian noise.

use crate::config::{NoiseSampling, RadioConfig};
use crate::types::NodeId;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

/// Trait for link-quality models consulted by the medium.
pub trait LinkQuality: Send {
    /// Quality of the directed link `from -> to` at `distance`.
    ///
    /// Higher is better. A zero distance yields `f64::INFINITY`.
    fn quality(&mut self, from: NodeId, to: NodeId, distance: f64) -> f64;

    /// Drops per-round state such as cached noise draws.
    fn begin_round(&mut self);
}

/// Converts a path-loss reading into a linear quality value.
///
/// `signal_db = base_loss_db - exponent * log10(distance) + noise_db`, then
/// `q = 10^(signal_db / 10)`.
pub fn path_loss_quality(base_loss_db: f64, exponent: f64, distance: f64, noise_db: f64) -> f64 {
    if distance <= 0.0 {
        return f64::INFINITY;
    }
    let signal_db = base_loss_db - exponent * distance.log10() + noise_db;
    10f64.powf(signal_db / 10.0)
}

/// Sample from a Gaussian using the Box-Muller transform.
pub fn sample_gaussian<R: Rng>(rng: &mut R, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = rng.gen();
    let u2: f64 = rng.gen();

    // Avoid log(0)
    let u1 = if u1 == 0.0 { f64::MIN_POSITIVE } else { u1 };

    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + std_dev * z0
}

/// Log-distance model with seeded, optionally shared, noise draws.
#[derive(Debug, Clone)]
pub struct LogDistance {
    base_loss_db: f64,
    exponent: f64,
    noise_std_db: f64,
    sampling: NoiseSampling,
    symmetric: bool,
    noise: BTreeMap<(NodeId, NodeId), f64>,
    rng: ChaCha8Rng,
}

impl LogDistance {
    pub fn new(config: &RadioConfig, seed: u64) -> Self {
        Self {
            base_loss_db: config.base_loss_db,
            exponent: config.path_loss_exponent,
            noise_std_db: config.noise_std_db,
            sampling: config.noise_sampling,
            symmetric: config.symmetric_noise,
            noise: BTreeMap::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    fn noise_for(&mut self, from: NodeId, to: NodeId) -> f64 {
        if self.noise_std_db == 0.0 {
            return 0.0;
        }
        let key = if self.symmetric {
            (from.min(to), from.max(to))
        } else {
            (from, to)
        };
        match self.sampling {
            NoiseSampling::PerMessage => sample_gaussian(&mut self.rng, 0.0, self.noise_std_db),
            NoiseSampling::PerRound => {
                let std_dev = self.noise_std_db;
                let rng = &mut self.rng;
                *self
                    .noise
                    .entry(key)
                    .or_insert_with(|| sample_gaussian(rng, 0.0, std_dev))
            }
        }
    }
}

impl LinkQuality for LogDistance {
    fn quality(&mut self, from: NodeId, to: NodeId, distance: f64) -> f64 {
        let noise = self.noise_for(from, to);
        path_loss_quality(self.base_loss_db, self.exponent, distance, noise)
    }

    fn begin_round(&mut self) {
        self.noise.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noiseless() -> RadioConfig {
        RadioConfig {
            noise_std_db: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_quality_decreases_with_distance() {
        let mut model = LogDistance::new(&noiseless(), 1);
        let near = model.quality(0, 1, 10.0);
        let far = model.quality(0, 1, 20.0);
        assert!((near - 100.0).abs() < 1e-9);
        assert!(far < near);
    }

    #[test]
    fn test_zero_distance_is_infinite() {
        let mut model = LogDistance::new(&noiseless(), 1);
        assert_eq!(model.quality(0, 1, 0.0), f64::INFINITY);
    }

    #[test]
    fn test_symmetric_noise_shared_per_round() {
        let mut model = LogDistance::new(&RadioConfig::default(), 9);
        let forward = model.quality(2, 5, 50.0);
        let backward = model.quality(5, 2, 50.0);
        assert_eq!(forward, backward);
        assert_eq!(model.quality(2, 5, 50.0), forward);
    }

    #[test]
    fn test_directional_noise_differs() {
        let config = RadioConfig {
            symmetric_noise: false,
            noise_std_db: 3.0,
            ..Default::default()
        };
        let mut model = LogDistance::new(&config, 9);
        let forward = model.quality(2, 5, 50.0);
        let backward = model.quality(5, 2, 50.0);
        assert_ne!(forward, backward);
    }

    #[test]
    fn test_begin_round_redraws_noise() {
        let mut model = LogDistance::new(&RadioConfig::default(), 3);
        let first = model.quality(0, 1, 40.0);
        model.begin_round();
        let second = model.quality(0, 1, 40.0);
        assert_ne!(first, second);
    }

    #[test]
    fn test_per_message_redraws_every_query() {
        let config = RadioConfig {
            noise_sampling: NoiseSampling::PerMessage,
            ..Default::default()
        };
        let mut model = LogDistance::new(&config, 4);
        let draws: Vec<f64> = (0..4).map(|_| model.quality(0, 1, 40.0)).collect();
        for pair in draws.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
        assert!(model.noise.is_empty());
    }

    #[test]
    fn test_per_round_cached_until_begin_round() {
        let mut model = LogDistance::new(&RadioConfig::default(), 4);
        let first = model.quality(0, 1, 40.0);
        for _ in 0..3 {
            assert_eq!(model.quality(0, 1, 40.0), first);
        }
        assert_eq!(model.noise.len(), 1);
        model.begin_round();
        assert!(model.noise.is_empty());
        assert_ne!(model.quality(0, 1, 40.0), first);
    }

    #[test]
    fn test_same_seed_same_draws() {
        let mut a = LogDistance::new(&RadioConfig::default(), 11);
        let mut b = LogDistance::new(&RadioConfig::default(), 11);
        for pair in 0..5 {
            assert_eq!(a.quality(pair, pair + 1, 30.0), b.quality(pair, pair + 1, 30.0));
        }
    }
}
