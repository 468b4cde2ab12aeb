use std::fmt::{Display, Formatter};
use std::hash::Hash;

use anyhow::Result;
use image::RgbImage;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::frame::state::State;
use crate::learn::trajectory::ShapedTransition;

/// Data type we use to encode an `Action` to feed the model (index into the policy output).
pub type ModelActionType = u8;

/// Action code as understood by the simulator (e.g. the ALE action number).
pub type RawActionCode = u8;

/// Raw color frame as delivered by the simulator, e.g. 210x160x3 for Atari games
pub type RawFrame = RgbImage;

/// Simulator diagnostics returned along with each step (e.g. `"ale.lives"`)
pub type StepInfo = FxHashMap<String, f32>;

/// Closed, ordered set of actions the policy chooses from.
///
/// Every action has a fixed position in the policy output (`numeric`) and a fixed code understood
/// by the simulator (`raw_code`). Both mappings must be bijective; see [Action::validate_mapping].
pub trait Action: Display + Sized + Clone + Copy + Hash + PartialEq + Eq {
    /// Number of possible actions
    const ACTION_SPACE: ModelActionType;

    /// Identifying the Action as a unique value in range (0..Self::ACTION_SPACE)
    fn numeric(&self) -> ModelActionType;
    fn try_from_numeric(value: ModelActionType) -> Result<Self>;

    fn raw_code(&self) -> RawActionCode;
    fn try_from_raw_code(code: RawActionCode) -> Result<Self>;

    /// Simulator code meaning "do nothing". Used during warm-up; never chosen by the policy.
    fn noop_code() -> RawActionCode;

    fn all() -> Result<Vec<Self>> {
        (0..Self::ACTION_SPACE).map(Self::try_from_numeric).collect()
    }

    /// Checks that both mappings round-trip, raw codes are distinct and the no-op code is not part of the set.
    fn validate_mapping() -> Result<()> {
        if Self::ACTION_SPACE == 0 {
            return Err(PgError::ActionMapping("empty action set".to_string()).into());
        }
        let mut raw_codes = FxHashSet::default();
        for value in 0..Self::ACTION_SPACE {
            let action = Self::try_from_numeric(value)?;
            if action.numeric() != value {
                return Err(PgError::ActionMapping(format!("action {} maps index {} to {}", action, value, action.numeric())).into());
            }
            if Self::try_from_raw_code(action.raw_code())? != action {
                return Err(PgError::ActionMapping(format!("raw code {} does not map back to action {}", action.raw_code(), action)).into());
            }
            if !raw_codes.insert(action.raw_code()) {
                return Err(PgError::ActionMapping(format!("raw code {} used twice", action.raw_code())).into());
            }
        }
        if raw_codes.contains(&Self::noop_code()) {
            return Err(PgError::ActionMapping(format!("no-op code {} collides with an action", Self::noop_code())).into());
        }
        Ok(())
    }
}

/// Outcome of a single low-level simulator step
#[derive(Clone, Debug)]
pub struct SimulatorStep {
    pub frame: RawFrame,
    pub reward: f32,
    pub done: bool,
    pub info: StepInfo,
}

/// The game simulator - an external, stateful collaborator
pub trait Simulator {
    /// Starts a new game and returns its first frame
    fn reset(&mut self) -> Result<RawFrame>;

    /// Performs one time step with the given raw action code
    fn step(
        &mut self,
        action: RawActionCode,
    ) -> Result<SimulatorStep>;

    /// Shows the current frame; headless simulators may ignore it
    fn render(&mut self) -> Result<()> { Ok(()) }
}

/// Trainable stochastic policy
pub trait Policy {
    /// Probability distribution over the action set, one entry per action (summing up to 1)
    fn forward_pass(
        &self,
        state: &State,
    ) -> Result<Vec<f32>>;

    /// Performs a single update using a batch of transitions with shaped (discounted, normalized) rewards
    fn train(
        &mut self,
        batch: &[ShapedTransition],
    ) -> Result<()>;

    fn save_checkpoint(&mut self) -> Result<()>;

    fn load_checkpoint(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum PgError {
    /// A reward or terminal signal occurred while only no-op actions were issued
    WarmUpViolation { step: usize, reward: f32, done: bool },
    /// Discounted returns of a batch have no variance, so they can't be normalized
    DegenerateRewards { len: usize, mean: f64 },
    InvalidDistribution(String),
    DrainMidEpisode,
    InvalidParameter(String),
    FrameShape { expected: (u32, u32), actual: (u32, u32) },
    ActionMapping(String),
}

impl Display for PgError {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            PgError::WarmUpViolation { step, reward, done } => write!(
                f,
                "no-op warm-up step {} produced reward {} (done: {}); reduce the configured no-op maximum",
                step, reward, done
            ),
            PgError::DegenerateRewards { len, mean } => write!(
                f,
                "discounted returns of the batch ({} transitions, mean {}) have zero variance; normalization undefined",
                len, mean
            ),
            PgError::InvalidDistribution(msg) => write!(f, "invalid action distribution: {}", msg),
            PgError::DrainMidEpisode => f.write_str("trajectory drained while an episode is still open"),
            PgError::InvalidParameter(msg) => write!(f, "invalid parameter: {}", msg),
            PgError::FrameShape { expected, actual } => write!(
                f,
                "raw frame size mismatch. Expected {}x{}, got {}x{}",
                expected.0, expected.1, actual.0, actual.1
            ),
            PgError::ActionMapping(msg) => write!(f, "inconsistent action mapping: {}", msg),
        }
    }
}

impl std::error::Error for PgError {}
