use anyhow::Result;

use pg::frame::preprocess::{FramePreprocessor, PreprocessParameter};
use pg::learn::parameter::{Parameter, PolicyParameter};
use pg::learn::policy_gradient_learner::PolicyGradientLearner;
use pg::prelude::{Policy, Simulator};

use crate::action::PongAction;

/// Atari 2600 screen size
pub const FRAME_WIDTH: u32 = 160;
pub const FRAME_HEIGHT: u32 = 210;

/// Playing field rows (score display above, bottom border below)
pub const FIELD_TOP: u32 = 35;
pub const FIELD_BOTTOM: u32 = 195;

pub const DOWNSAMPLE: u32 = 2;

/// Red channel values of the two Pong background colors
pub const BACKGROUND_RED: [u8; 2] = [144, 109];

pub type PongLearner<S, P> = PolicyGradientLearner<S, P, PongAction>;

/// 210x160 RGB => 80x80 binary
pub fn pong_preprocess_parameter() -> PreprocessParameter {
    PreprocessParameter {
        input_width: FRAME_WIDTH,
        input_height: FRAME_HEIGHT,
        crop_top: FIELD_TOP,
        crop_bottom: FIELD_BOTTOM,
        downsample: DOWNSAMPLE,
        channel: 0,
        background: BACKGROUND_RED.to_vec(),
    }
}

pub fn pong_preprocessor() -> Result<FramePreprocessor> { FramePreprocessor::new(pong_preprocess_parameter()) }

/// Wires a Pong simulator and a policy (built by `policy_init` from `param.policy`) into a learner
pub fn pong_learner<S: Simulator, P: Policy>(
    simulator: S,
    policy_init: impl FnOnce(&PolicyParameter) -> Result<P>,
    param: Parameter,
) -> Result<PongLearner<S, P>> {
    log::info!(
        "Pong learner: 𝛾={}, {} episode(s) per update, frame skip {}, {:?}, {:?}",
        param.discount_factor,
        param.batch_size_episodes,
        param.frame_skip,
        param.state_mode,
        param.episode_termination
    );
    PolicyGradientLearner::new(simulator, policy_init, pong_preprocessor()?, param)
}
