use std::time::{Duration, Instant};

use crate::learn::metrics::RewardMovingAverage;
use crate::util::format;

/// Run-scoped bookkeeping of a training run: counters and the reward metric.
///
/// Lifecycle: [TrainingSession::open] when training starts, [TrainingSession::close] when it ends.
#[derive(Debug)]
pub struct TrainingSession {
    /// 1-based number of the current episode
    episode_n: usize,
    /// logical (frame-skipped) steps over all episodes
    step_count: usize,
    update_count: usize,
    checkpoint_count: usize,
    reward_average: RewardMovingAverage,
    opened_at: Instant,
    closed: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SessionSummary {
    pub episodes: usize,
    pub steps: usize,
    pub updates: usize,
    pub checkpoints: usize,
    pub reward_average: Option<f32>,
    pub duration: Duration,
}

impl TrainingSession {
    pub fn open() -> Self {
        log::info!("training session opened");
        Self {
            episode_n: 1,
            step_count: 0,
            update_count: 0,
            checkpoint_count: 0,
            reward_average: RewardMovingAverage::default(),
            opened_at: Instant::now(),
            closed: false,
        }
    }

    pub fn episode_n(&self) -> usize { self.episode_n }

    pub fn step_count(&self) -> usize { self.step_count }

    pub fn update_count(&self) -> usize { self.update_count }

    pub fn checkpoint_count(&self) -> usize { self.checkpoint_count }

    pub fn reward_average(&self) -> &RewardMovingAverage { &self.reward_average }

    pub fn is_closed(&self) -> bool { self.closed }

    pub fn add_step(&mut self) { self.step_count += 1; }

    pub fn add_update(&mut self) { self.update_count += 1; }

    pub fn add_checkpoint(&mut self) { self.checkpoint_count += 1; }

    /// Feeds the finished episode's reward into the moving average and logs both
    pub fn log_episode_reward(
        &mut self,
        reward_sum: f32,
    ) -> f32 {
        let average = self.reward_average.record(reward_sum, self.episode_n);
        log::info!("Reward total was {:.3}; reward average is {:.3}", reward_sum, average);
        average
    }

    pub fn next_episode(&mut self) { self.episode_n += 1; }

    pub fn close(&mut self) -> SessionSummary {
        let summary = SessionSummary {
            episodes: self.episode_n - 1,
            steps: self.step_count,
            updates: self.update_count,
            checkpoints: self.checkpoint_count,
            reward_average: self.reward_average.average(),
            duration: self.opened_at.elapsed(),
        };
        if !self.closed {
            log::info!(
                "training session closed after {:.1?}: episodes: {}, steps: {}, updates: {}, checkpoints: {}, reward average: {:?}",
                summary.duration,
                format::formatted(summary.episodes),
                format::formatted(summary.steps),
                summary.updates,
                summary.checkpoints,
                summary.reward_average
            );
            self.closed = true;
        }
        summary
    }
}
