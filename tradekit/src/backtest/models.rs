use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::backtest::BacktestError;

/// Probabilistic parameterization of fill behavior in simulation.
///
/// All draws come from a single seeded PRNG (`StdRng`), so with an identical
/// seed and an identical sequence of input events the emitted event stream is
/// bit-identical across runs.
#[derive(Clone, Debug)]
pub struct FillModel {
    prob_fill_at_limit: f64,
    prob_fill_at_stop: f64,
    prob_slippage: f64,
    rng: StdRng,
}

impl FillModel {
    pub fn new(
        prob_fill_at_limit: f64,
        prob_fill_at_stop: f64,
        prob_slippage: f64,
        random_seed: u64,
    ) -> Result<Self, BacktestError> {
        for (name, prob) in [
            ("prob_fill_at_limit", prob_fill_at_limit),
            ("prob_fill_at_stop", prob_fill_at_stop),
            ("prob_slippage", prob_slippage),
        ] {
            if !(0.0..=1.0).contains(&prob) {
                return Err(BacktestError::InvalidConfiguration(format!(
                    "{name} must be within [0, 1], was {prob}"
                )));
            }
        }
        Ok(Self {
            prob_fill_at_limit,
            prob_fill_at_stop,
            prob_slippage,
            rng: StdRng::seed_from_u64(random_seed),
        })
    }

    /// Whether a resting limit order fills when its price is touched.
    pub fn is_limit_filled(&mut self) -> bool {
        self.event_success(self.prob_fill_at_limit)
    }

    /// Whether a stop order triggers when its trigger price is touched.
    pub fn is_stop_filled(&mut self) -> bool {
        self.event_success(self.prob_fill_at_stop)
    }

    /// Whether a market or stop-market execution slips one tick adverse.
    pub fn is_slipped(&mut self) -> bool {
        self.event_success(self.prob_slippage)
    }

    fn event_success(&mut self, probability: f64) -> bool {
        if probability == 0.0 {
            false
        } else if probability == 1.0 {
            true
        } else {
            self.rng.gen_bool(probability)
        }
    }
}

impl Default for FillModel {
    /// Fills at limit and stop always succeed and nothing slips; seed 42.
    fn default() -> Self {
        Self::new(1.0, 1.0, 0.0, 42).expect("default probabilities are valid")
    }
}
