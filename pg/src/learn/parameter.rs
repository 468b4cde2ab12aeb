use anyhow::Result;

use crate::frame::state::StateMode;
use crate::prelude::PgError;

/// Number of no-op steps issued at the start of every episode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoopWarmUp {
    /// uniformly drawn from `0..=max`; `max` must be small enough that the game can't score a point meanwhile
    Random { max: usize },
    /// fixed number of steps (for debugging)
    Fixed(usize),
}

/// When an episode is considered finished
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EpisodeTermination {
    /// the first scored point (nonzero reward) ends the episode - one round per episode
    FirstReward,
    /// the simulator's terminal signal ends the episode - many rounds per episode
    SimulatorDone,
}

/// Opaque settings for the policy implementation; the learner only passes them through
#[derive(Clone, Debug, PartialEq)]
pub struct PolicyParameter {
    pub learning_rate: f32,
    pub hidden_layer_size: usize,
}

impl Default for PolicyParameter {
    fn default() -> Self {
        Self {
            learning_rate: 0.0005,
            hidden_layer_size: 200,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    /// Discount rate; (0 <= 𝛾 <= 1) represents the value of future rewards inside a round
    pub discount_factor: f32,
    /// Number of episodes collected for one policy update
    pub batch_size_episodes: usize,
    pub checkpoint_every_n_episodes: usize,
    /// Resume from the latest checkpoint instead of starting fresh
    pub load_checkpoint: bool,
    /// Render every simulator step
    pub render: bool,
    // Number of simulator steps a chosen action is repeated
    pub frame_skip: usize,
    pub noop_warm_up: NoopWarmUp,
    pub state_mode: StateMode,
    pub episode_termination: EpisodeTermination,
    // Wait for <Enter> after each episode (debugging aid)
    pub pause_between_episodes: bool,
    // Seed for action sampling and warm-up length; `None` seeds from entropy
    pub seed: Option<u64>,
    pub policy: PolicyParameter,
}

impl Default for Parameter {
    fn default() -> Self {
        Self {
            discount_factor: 0.99,
            batch_size_episodes: 1,
            checkpoint_every_n_episodes: 10,
            load_checkpoint: false,
            render: false,
            frame_skip: 4,
            noop_warm_up: NoopWarmUp::Random { max: 30 },
            state_mode: StateMode::FrameDelta,
            episode_termination: EpisodeTermination::SimulatorDone,
            pause_between_episodes: false,
            seed: None,
            policy: PolicyParameter::default(),
        }
    }
}

impl Parameter {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| -> Result<()> { Err(PgError::InvalidParameter(msg.to_string()).into()) };

        if !(0.0..=1.0).contains(&self.discount_factor) {
            return invalid("discount_factor must be within [0, 1]");
        }
        if self.batch_size_episodes == 0 {
            return invalid("batch_size_episodes must be at least 1");
        }
        if self.checkpoint_every_n_episodes == 0 {
            return invalid("checkpoint_every_n_episodes must be at least 1");
        }
        if self.frame_skip == 0 {
            return invalid("frame_skip must be at least 1");
        }
        if self.state_mode.history_len() == 0 {
            return invalid("frame stack must hold at least one frame");
        }
        Ok(())
    }
}
