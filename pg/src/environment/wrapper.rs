use std::marker::PhantomData;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::Rng;

use crate::frame::frame_history::FrameHistory;
use crate::frame::preprocess::{BinaryFrame, FramePreprocessor};
use crate::frame::state::{State, StateMode};
use crate::learn::parameter::NoopWarmUp;
use crate::prelude::{Action, PgError, RawActionCode, Simulator, SimulatorStep, StepInfo};

/// Result of one logical (frame-skipped) step
#[derive(Clone, Debug)]
pub struct WrappedStep {
    /// state after the step
    pub state: State,
    /// sum of all rewards during the skipped span
    pub reward: f32,
    pub done: bool,
    pub info: StepInfo,
}

/// Wraps the raw simulator and hides frame skipping, no-op warm-up and preprocessing.
pub struct EnvironmentWrapper<S, A>
where
    S: Simulator,
    A: Action,
{
    simulator: S,
    preprocessor: FramePreprocessor,
    history: FrameHistory<BinaryFrame>,
    state_mode: StateMode,
    frame_skip: usize,
    noop_warm_up: NoopWarmUp,
    render: bool,
    rng: StdRng,
    /// low-level simulator steps since the last reset
    simulator_steps: usize,
    _action: PhantomData<A>,
}

impl<S, A> EnvironmentWrapper<S, A>
where
    S: Simulator,
    A: Action,
{
    pub fn new(
        simulator: S,
        preprocessor: FramePreprocessor,
        state_mode: StateMode,
        frame_skip: usize,
        noop_warm_up: NoopWarmUp,
        render: bool,
        rng: StdRng,
    ) -> Result<Self> {
        if frame_skip == 0 {
            return Err(PgError::InvalidParameter("frame_skip must be at least 1".to_string()).into());
        }
        if state_mode.history_len() == 0 {
            return Err(PgError::InvalidParameter("frame stack must hold at least one frame".to_string()).into());
        }
        Ok(Self {
            simulator,
            preprocessor,
            history: FrameHistory::new(state_mode.history_len()),
            state_mode,
            frame_skip,
            noop_warm_up,
            render,
            rng,
            simulator_steps: 0,
            _action: PhantomData,
        })
    }

    /// Starts a new episode: reset + no-op warm-up. Returns the first state the policy may see.
    pub fn reset(&mut self) -> Result<State> {
        self.reset_simulator()?;
        self.warm_up()
    }

    /// Resets the simulator and the frame history; the history contains just the initial frame afterwards.
    pub fn reset_simulator(&mut self) -> Result<()> {
        self.history.clear();
        self.simulator_steps = 0;
        let frame = self.simulator.reset()?;
        self.render_if_enabled()?;
        self.history.push(self.preprocessor.preprocess(&frame)?);
        Ok(())
    }

    /// Issues the warm-up no-op steps, then as many further no-ops as needed to fill the frame history.
    ///
    /// Fails with [PgError::WarmUpViolation] if any of these steps produces a reward or ends the game.
    pub fn warm_up(&mut self) -> Result<State> {
        let noop_steps = match self.noop_warm_up {
            NoopWarmUp::Random { max } => self.rng.gen_range(0..=max),
            NoopWarmUp::Fixed(n) => n,
        };
        log::trace!("warm-up with {} no-op steps", noop_steps);

        for _ in 0..noop_steps {
            self.noop_step()?;
        }
        while !self.history.is_full() {
            self.noop_step()?;
        }
        Ok(self.state())
    }

    fn noop_step(&mut self) -> Result<()> {
        let step = self.simulator_step(A::noop_code())?;
        if step.reward != 0.0 || step.done {
            return Err(PgError::WarmUpViolation {
                step: self.simulator_steps,
                reward: step.reward,
                done: step.done,
            }
            .into());
        }
        self.history.push(self.preprocessor.preprocess(&step.frame)?);
        Ok(())
    }

    /// Repeats `action` for up to `frame_skip` simulator steps and reports the summed reward.
    ///
    /// The span ends early on a terminal signal or a scored point, so one logical step never covers two rounds.
    pub fn step(
        &mut self,
        action: A,
    ) -> Result<WrappedStep> {
        debug_assert!(self.history.is_full(), "step before warm-up");

        let mut outcome = self.simulator_step(action.raw_code())?;
        let mut reward = outcome.reward;
        for _ in 1..self.frame_skip {
            if outcome.done || reward != 0.0 {
                break;
            }
            outcome = self.simulator_step(action.raw_code())?;
            reward += outcome.reward;
        }

        self.history.push(self.preprocessor.preprocess(&outcome.frame)?);
        log::trace!("step with action {} resulted in reward: {:.2}, done: {}", action, reward, outcome.done);

        Ok(WrappedStep {
            state: self.state(),
            reward,
            done: outcome.done,
            info: outcome.info,
        })
    }

    fn simulator_step(
        &mut self,
        code: RawActionCode,
    ) -> Result<SimulatorStep> {
        let step = self.simulator.step(code)?;
        self.simulator_steps += 1;
        self.render_if_enabled()?;
        Ok(step)
    }

    fn render_if_enabled(&mut self) -> Result<()> {
        if self.render {
            self.simulator.render()?;
        }
        Ok(())
    }

    /// Current state built from the frame history
    pub fn state(&self) -> State { self.state_mode.build(&self.history.snapshot()) }

    pub fn history(&self) -> &FrameHistory<BinaryFrame> { &self.history }

    pub fn simulator(&self) -> &S { &self.simulator }

    pub fn simulator_steps(&self) -> usize { self.simulator_steps }
}
