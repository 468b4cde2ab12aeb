use std::ops::Range;

use anyhow::Result;

use crate::frame::state::State;
use crate::prelude::{ModelActionType, PgError};

/// One environment step: the state observed *before* acting, the chosen action and the resulting reward
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub state: State,
    pub action_index: ModelActionType,
    pub reward: f32,
}

/// Transition as fed into a policy update
#[derive(Clone, Debug, PartialEq)]
pub struct ShapedTransition {
    pub state: State,
    pub action_index: ModelActionType,
    pub shaped_reward: f32,
}

/// Transitions of one or more complete episodes, consumed by exactly one policy update
#[derive(Clone, Debug, Default)]
pub struct Batch {
    pub transitions: Vec<Transition>,
    /// index ranges of the episodes within `transitions`, in order
    pub episodes: Vec<Range<usize>>,
}

impl Batch {
    pub fn len(&self) -> usize { self.transitions.len() }

    pub fn is_empty(&self) -> bool { self.transitions.is_empty() }

    pub fn rewards(&self) -> Vec<f32> { self.transitions.iter().map(|t| t.reward).collect() }

    pub fn actions(&self) -> impl Iterator<Item = ModelActionType> + '_ { self.transitions.iter().map(|t| t.action_index) }

    /// Replaces the raw rewards with the given shaped ones (same order)
    pub fn into_shaped(
        self,
        shaped_rewards: Vec<f32>,
    ) -> Vec<ShapedTransition> {
        assert_eq!(self.transitions.len(), shaped_rewards.len());
        self.transitions
            .into_iter()
            .zip(shaped_rewards)
            .map(|(t, shaped_reward)| ShapedTransition {
                state: t.state,
                action_index: t.action_index,
                shaped_reward,
            })
            .collect()
    }
}

/// Collects transitions across episodes until the next policy update.
///
/// Episodes are bracketed by [Self::begin_episode] / [Self::end_episode];
/// [Self::drain] is refused while an episode is open, so a batch never ends in the middle of a round.
#[derive(Debug, Default)]
pub struct TrajectoryRecorder {
    transitions: Vec<Transition>,
    episodes: Vec<Range<usize>>,
    open_episode_start: Option<usize>,
}

impl TrajectoryRecorder {
    pub fn new() -> Self { Self::default() }

    pub fn begin_episode(&mut self) {
        debug_assert!(self.open_episode_start.is_none(), "previous episode not finished");
        self.open_episode_start = Some(self.transitions.len());
    }

    pub fn record(
        &mut self,
        state: State,
        action_index: ModelActionType,
        reward: f32,
    ) {
        debug_assert!(self.open_episode_start.is_some(), "recording outside of an episode");
        self.transitions.push(Transition {
            state,
            action_index,
            reward,
        });
    }

    pub fn end_episode(&mut self) {
        if let Some(start) = self.open_episode_start.take() {
            self.episodes.push(start..self.transitions.len());
        }
    }

    /// Drops the open episode together with everything recorded since [Self::begin_episode]
    pub fn abort_episode(&mut self) {
        if let Some(start) = self.open_episode_start.take() {
            self.transitions.truncate(start);
        }
    }

    /// Hands out all recorded transitions and leaves the recorder empty
    pub fn drain(&mut self) -> Result<Batch> {
        if self.open_episode_start.is_some() {
            return Err(PgError::DrainMidEpisode.into());
        }
        Ok(Batch {
            transitions: std::mem::take(&mut self.transitions),
            episodes: std::mem::take(&mut self.episodes),
        })
    }

    pub fn len(&self) -> usize { self.transitions.len() }

    pub fn is_empty(&self) -> bool { self.transitions.is_empty() }

    /// Number of completed episodes since the last drain
    pub fn episode_count(&self) -> usize { self.episodes.len() }
}
