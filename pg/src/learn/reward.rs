use std::ops::Range;

use anyhow::Result;

use crate::prelude::PgError;

/// Round-local discounted returns.
///
/// `returns[t] = sum(rewards[k] * 𝛾^(k-t))` for `k >= t`, stopping at the first nonzero reward (inclusive).
/// A nonzero reward ends a round, so credit never flows into an earlier round.
/// Steps after the last nonzero reward get 0.
pub fn discount_rewards(
    rewards: &[f32],
    discount_factor: f32,
) -> Vec<f32> {
    let mut returns = vec![0.0; rewards.len()];
    let mut running = 0.0;
    for t in (0..rewards.len()).rev() {
        running = if rewards[t] != 0.0 {
            rewards[t]
        } else {
            running * discount_factor
        };
        returns[t] = running;
    }
    returns
}

/// Subtracts the mean and divides by the (population) standard deviation, in place.
///
/// A batch without variance can't be normalized; that is reported as [PgError::DegenerateRewards].
pub fn normalize(returns: &mut [f32]) -> Result<()> {
    let len = returns.len();
    if len == 0 {
        return Err(PgError::DegenerateRewards { len, mean: 0.0 }.into());
    }
    let mean = returns.iter().map(|&r| r as f64).sum::<f64>() / len as f64;
    let variance = returns.iter().map(|&r| (r as f64 - mean).powi(2)).sum::<f64>() / len as f64;
    let std = variance.sqrt();
    if !std.is_finite() || std <= 4.0 * f64::EPSILON * (1.0 + mean.abs()) {
        return Err(PgError::DegenerateRewards { len, mean }.into());
    }
    for r in returns.iter_mut() {
        *r = ((*r as f64 - mean) / std) as f32;
    }
    Ok(())
}

/// Turns the raw rewards of a batch into normalized, discounted returns
#[derive(Clone, Copy, Debug)]
pub struct RewardShaper {
    discount_factor: f32,
}

impl RewardShaper {
    pub fn new(discount_factor: f32) -> Self {
        assert!((0.0..=1.0).contains(&discount_factor));
        Self { discount_factor }
    }

    pub fn discount(
        &self,
        rewards: &[f32],
    ) -> Vec<f32> {
        discount_rewards(rewards, self.discount_factor)
    }

    /// Discounts every episode on its own, so no credit crosses an episode reset
    /// (an episode may end without a scored point).
    pub fn discount_episodes(
        &self,
        rewards: &[f32],
        episodes: &[Range<usize>],
    ) -> Vec<f32> {
        debug_assert_eq!(episodes.iter().map(|e| e.len()).sum::<usize>(), rewards.len());
        let mut returns = Vec::with_capacity(rewards.len());
        for episode in episodes {
            returns.extend(self.discount(&rewards[episode.clone()]));
        }
        returns
    }

    /// Discounted and batch-wide normalized returns
    pub fn shape(
        &self,
        rewards: &[f32],
        episodes: &[Range<usize>],
    ) -> Result<Vec<f32>> {
        let mut returns = self.discount_episodes(rewards, episodes);
        normalize(&mut returns)?;
        Ok(returns)
    }
}
