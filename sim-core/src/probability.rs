use anyhow::{Context, Result};
use rand::Rng;
use rand_distr::Bernoulli;

/// Builds a Bernoulli trial for a probability which has already been validated.
pub fn bernoulli(probability: f64) -> Result<Bernoulli> {
    Bernoulli::new(probability).with_context(|| format!("invalid probability {probability}"))
}

/// A fraction which drifts up or down by a fixed step every round,
/// without ever leaving its band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundedWalk {
    level: f64,
    step: f64,
    lb: f64,
    ub: f64,
}

impl BoundedWalk {
    /// Starts the walk in the middle of `[lb, ub]`.
    pub fn centered(lb: f64, ub: f64, step: f64) -> Self {
        Self {
            level: (lb + ub) / 2.0,
            step,
            lb,
            ub,
        }
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn advance<R: Rng + ?Sized>(&mut self, rng: &mut R) -> f64 {
        let delta = if rng.random::<bool>() {
            self.step
        } else {
            -self.step
        };
        self.level = (self.level + delta).clamp(self.lb, self.ub);
        self.level
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaChaRng;
    use rand_distr::Distribution as _;

    use super::{BoundedWalk, bernoulli};

    #[test]
    fn should_reject_impossible_probabilities() {
        assert!(bernoulli(1.01).is_err());
        assert!(bernoulli(-0.5).is_err());
        assert!(bernoulli(0.0).is_ok());
        assert!(bernoulli(1.0).is_ok());
    }

    #[test]
    fn should_respect_degenerate_probabilities() {
        let mut rng = ChaChaRng::seed_from_u64(7);
        let never = bernoulli(0.0).unwrap();
        let always = bernoulli(1.0).unwrap();
        for _ in 0..1000 {
            assert!(!never.sample(&mut rng));
            assert!(always.sample(&mut rng));
        }
    }

    #[test]
    fn should_keep_walk_inside_its_band() {
        let mut rng = ChaChaRng::seed_from_u64(0);
        let mut walk = BoundedWalk::centered(0.2, 0.4, 0.05);
        assert!((walk.level() - 0.3).abs() < 1e-12);
        for _ in 0..10_000 {
            let level = walk.advance(&mut rng);
            assert!((0.2..=0.4).contains(&level), "{level} escaped the band");
        }
    }

    #[test]
    fn should_stay_put_in_a_zero_width_band() {
        let mut rng = ChaChaRng::seed_from_u64(0);
        let mut walk = BoundedWalk::centered(0.5, 0.5, 0.1);
        for _ in 0..100 {
            assert_eq!(walk.advance(&mut rng), 0.5);
        }
    }
}
