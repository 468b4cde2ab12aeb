use anyhow::Result;
use itertools::Itertools;
use num_format::ToFormattedString;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rustc_hash::FxHashMap;

use crate::environment::wrapper::{EnvironmentWrapper, WrappedStep};
use crate::frame::preprocess::FramePreprocessor;
use crate::frame::state::State;
use crate::learn::parameter::{EpisodeTermination, Parameter, PolicyParameter};
use crate::learn::reward::RewardShaper;
use crate::learn::session::{SessionSummary, TrainingSession};
use crate::learn::trajectory::TrajectoryRecorder;
use crate::prelude::{Action, ModelActionType, PgError, Policy, Simulator};
use crate::util::format;

/// Tolerance for the sum of an action distribution
const DISTRIBUTION_SUM_TOLERANCE: f32 = 1e-3;

/// Phases of one episode
#[derive(Debug)]
enum Phase {
    EpisodeStart,
    WarmUp,
    Stepping(State),
    EpisodeEnd,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EpisodeSummary {
    pub episode: usize,
    pub reward_sum: f32,
    pub rounds: usize,
    pub steps: usize,
    pub reward_average: f32,
    /// the policy was updated at the end of this episode
    pub trained: bool,
    pub checkpoint_saved: bool,
}

#[derive(Debug, Default)]
struct EpisodeCounters {
    reward_sum: f32,
    steps: usize,
    /// 1-based number of the current round
    round_n: usize,
    round_steps: usize,
}

/**
    Policy gradient learner (REINFORCE with round-local discounted returns).

    Collects whole episodes with a stochastic policy, and every `batch_size_episodes` episodes
    discounts the rewards (credit stays within a round), normalizes them over the batch and hands
    the batch to the policy for an update.

    ```text
    EpisodeStart -> WarmUp -> Stepping -> EpisodeEnd -> EpisodeStart ...
    ```
 */
pub struct PolicyGradientLearner<S, P, A>
where
    S: Simulator,
    P: Policy,
    A: Action,
{
    param: Parameter,
    environment: EnvironmentWrapper<S, A>,
    policy: P,
    recorder: TrajectoryRecorder,
    shaper: RewardShaper,
    session: TrainingSession,
    rng: StdRng,
}

impl<S, P, A> PolicyGradientLearner<S, P, A>
where
    S: Simulator,
    P: Policy,
    A: Action,
{
    /// `policy_init` builds the policy from the (opaque) policy settings of `param`
    pub fn new(
        simulator: S,
        policy_init: impl FnOnce(&PolicyParameter) -> Result<P>,
        preprocessor: FramePreprocessor,
        param: Parameter,
    ) -> Result<Self> {
        param.validate()?;
        A::validate_mapping()?;

        let (rng, environment_rng) = match param.seed {
            Some(seed) => (StdRng::seed_from_u64(seed), StdRng::seed_from_u64(seed.wrapping_add(1))),
            None => (StdRng::from_entropy(), StdRng::from_entropy()),
        };
        let environment = EnvironmentWrapper::new(
            simulator,
            preprocessor,
            param.state_mode,
            param.frame_skip,
            param.noop_warm_up,
            param.render,
            environment_rng,
        )?;

        let mut policy = policy_init(&param.policy)?;
        if param.load_checkpoint {
            policy.load_checkpoint()?;
            log::info!("resumed from the latest checkpoint");
        }

        Ok(Self {
            shaper: RewardShaper::new(param.discount_factor),
            param,
            environment,
            policy,
            recorder: TrajectoryRecorder::new(),
            session: TrainingSession::open(),
            rng,
        })
    }

    /// Trains until the process gets stopped (or a fatal error occurs)
    pub fn run(&mut self) -> Result<()> {
        loop {
            self.run_episode()?;
        }
    }

    /// Plays one episode. On failure the partially recorded episode is discarded.
    pub fn run_episode(&mut self) -> Result<EpisodeSummary> {
        let result = self.play_episode();
        if result.is_err() {
            self.recorder.abort_episode();
        }
        result
    }

    fn play_episode(&mut self) -> Result<EpisodeSummary> {
        let mut counters = EpisodeCounters {
            round_n: 1,
            ..EpisodeCounters::default()
        };
        let mut phase = Phase::EpisodeStart;

        loop {
            phase = match phase {
                Phase::EpisodeStart => {
                    log::info!("Starting episode {}", self.session.episode_n());
                    self.environment.reset_simulator()?;
                    self.recorder.begin_episode();
                    Phase::WarmUp
                }
                Phase::WarmUp => Phase::Stepping(self.environment.warm_up()?),
                Phase::Stepping(state) => {
                    let action = self.sample_action(&state)?;
                    let step = self.environment.step(action)?;
                    self.session.add_step();
                    counters.steps += 1;
                    counters.round_steps += 1;
                    counters.reward_sum += step.reward;

                    // the update needs the state the action was chosen on
                    self.recorder.record(state, action.numeric(), step.reward);

                    if step.reward != 0.0 {
                        self.log_round(&counters, step.reward);
                        counters.round_n += 1;
                        counters.round_steps = 0;
                    }

                    if self.episode_finished(&step) {
                        Phase::EpisodeEnd
                    } else {
                        Phase::Stepping(step.state)
                    }
                }
                Phase::EpisodeEnd => return self.finish_episode(&counters),
            }
        }
    }

    fn sample_action(
        &mut self,
        state: &State,
    ) -> Result<A> {
        let probabilities = self.policy.forward_pass(state)?;
        validate_distribution(&probabilities, A::ACTION_SPACE)?;
        let distribution = WeightedIndex::new(&probabilities).map_err(|e| PgError::InvalidDistribution(e.to_string()))?;
        let index = distribution.sample(&mut self.rng);
        A::try_from_numeric(index as ModelActionType)
    }

    fn log_round(
        &self,
        counters: &EpisodeCounters,
        reward: f32,
    ) {
        if reward < 0.0 {
            log::info!("Round {}: {} time steps; lost...", counters.round_n, counters.round_steps);
        } else {
            log::info!("Round {}: {} time steps; won!", counters.round_n, counters.round_steps);
        }
    }

    fn episode_finished(
        &self,
        step: &WrappedStep,
    ) -> bool {
        match self.param.episode_termination {
            EpisodeTermination::SimulatorDone => step.done,
            EpisodeTermination::FirstReward if step.reward != 0.0 => true,
            EpisodeTermination::FirstReward => {
                if step.done {
                    log::warn!(
                        "simulator reported a terminal state before a point was scored (info: {:?}); starting over with a reset",
                        step.info
                    );
                }
                step.done
            }
        }
    }

    fn finish_episode(
        &mut self,
        counters: &EpisodeCounters,
    ) -> Result<EpisodeSummary> {
        self.recorder.end_episode();
        let episode_n = self.session.episode_n();
        // completed (scored) rounds
        let rounds = counters.round_n - 1;
        log::info!("Episode {} finished after {} rounds", episode_n, rounds);

        let reward_average = self.session.log_episode_reward(counters.reward_sum);

        let trained = episode_n % self.param.batch_size_episodes == 0;
        if trained {
            self.update_policy()?;
        }

        let checkpoint_saved = episode_n % self.param.checkpoint_every_n_episodes == 0;
        if checkpoint_saved {
            self.policy.save_checkpoint()?;
            self.session.add_checkpoint();
            log::info!("checkpoint saved after episode {}", episode_n);
        }

        self.session.next_episode();

        if self.param.pause_between_episodes {
            wait_for_enter()?;
        }

        Ok(EpisodeSummary {
            episode: episode_n,
            reward_sum: counters.reward_sum,
            rounds,
            steps: counters.steps,
            reward_average,
            trained,
            checkpoint_saved,
        })
    }

    fn update_policy(&mut self) -> Result<()> {
        let batch = self.recorder.drain()?;
        let shaped_rewards = self.shaper.shape(&batch.rewards(), &batch.episodes)?;
        self.learning_update_log(batch.len(), batch.episodes.len(), batch.actions());

        let batch = batch.into_shaped(shaped_rewards);
        self.policy.train(&batch)?;
        self.session.add_update();
        Ok(())
    }

    fn learning_update_log(
        &self,
        batch_len: usize,
        batch_episodes: usize,
        actions: impl Iterator<Item = ModelActionType>,
    ) {
        let number_format = format::number_format();

        let mut action_counts = FxHashMap::<ModelActionType, usize>::default();
        for a in actions {
            action_counts.entry(a).and_modify(|e| *e += 1).or_insert(1);
        }
        let action_distribution_line = action_counts
            .iter()
            .sorted()
            .map(|(&action, &count)| {
                let name = A::try_from_numeric(action).map(|a| a.to_string()).unwrap_or_else(|_| action.to_string());
                format!("{} {:.1}%", name, 100.0 * count as f32 / batch_len.max(1) as f32)
            })
            .join(", ");

        log::debug!(
            "policy update {}: {} transitions from {} episode(s), 𝛾={:.2}, total steps: {}, action_distribution: {}",
            self.session.update_count() + 1,
            batch_len.to_formatted_string(&number_format),
            batch_episodes,
            self.param.discount_factor,
            self.session.step_count().to_formatted_string(&number_format),
            action_distribution_line
        );
    }

    /// Ends the training session and returns its summary
    pub fn close(&mut self) -> SessionSummary { self.session.close() }

    pub fn session(&self) -> &TrainingSession { &self.session }

    pub fn policy(&self) -> &P { &self.policy }

    pub fn environment(&self) -> &EnvironmentWrapper<S, A> { &self.environment }

    /// Transitions waiting for the next policy update
    pub fn pending_transitions(&self) -> usize { self.recorder.len() }
}

/// One entry per action, each finite and non-negative, summing up to 1
fn validate_distribution(
    probabilities: &[f32],
    action_space: ModelActionType,
) -> Result<()> {
    if probabilities.len() != action_space as usize {
        return Err(PgError::InvalidDistribution(format!(
            "expected {} probabilities, got {}",
            action_space,
            probabilities.len()
        ))
        .into());
    }
    if probabilities.iter().any(|p| !p.is_finite() || *p < 0.0) {
        return Err(PgError::InvalidDistribution(format!("{:?}", probabilities)).into());
    }
    let sum = probabilities.iter().sum::<f32>();
    if (sum - 1.0).abs() > DISTRIBUTION_SUM_TOLERANCE {
        return Err(PgError::InvalidDistribution(format!("probabilities sum up to {}", sum)).into());
    }
    Ok(())
}

fn wait_for_enter() -> Result<()> {
    log::info!("press <Enter> to start the next episode");
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use crate::frame::state::StateMode;
    use crate::learn::parameter::NoopWarmUp;
    use crate::test::fixed_policy::FixedPolicy;
    use crate::test::tick_simulator::{test_preprocessor, TickAction, TickSimulator};

    use super::*;

    fn param() -> Parameter {
        Parameter {
            frame_skip: 1,
            noop_warm_up: NoopWarmUp::Fixed(0),
            seed: Some(42),
            ..Parameter::default()
        }
    }

    fn learner(
        simulator: TickSimulator,
        policy: FixedPolicy,
        param: Parameter,
    ) -> PolicyGradientLearner<TickSimulator, FixedPolicy, TickAction> {
        PolicyGradientLearner::new(simulator, |_| Ok(policy), test_preprocessor(), param).unwrap()
    }

    #[test]
    fn test_multi_round_episode() {
        // points at steps 5, 10, 15; game over at 15
        let simulator = TickSimulator::new(15).with_reward_every(5, 1.0);
        let mut learner = learner(simulator, FixedPolicy::uniform(2), param());

        let summary = learner.run_episode().unwrap();
        assert_eq!(summary.episode, 1);
        assert_eq!(summary.rounds, 3);
        assert_eq!(summary.reward_sum, 1.0);
        // one filling no-op, then 14 logical steps
        assert_eq!(summary.steps, 14);
        assert!(summary.trained);
        assert!(!summary.checkpoint_saved);

        let batches = learner.policy().train_batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 14);
        assert_eq!(learner.pending_transitions(), 0);
        assert_eq!(learner.session().episode_n(), 2);
    }

    #[test]
    fn test_batch_is_normalized() {
        let simulator = TickSimulator::new(15).with_reward_every(5, 1.0);
        let mut learner = learner(simulator, FixedPolicy::uniform(2), param());
        learner.run_episode().unwrap();

        let rewards = learner.policy().train_batches()[0].iter().map(|t| t.shaped_reward).collect::<Vec<_>>();
        let n = rewards.len() as f32;
        let mean = rewards.iter().sum::<f32>() / n;
        let var = rewards.iter().map(|r| (r - mean).powi(2)).sum::<f32>() / n;
        assert!(mean.abs() < 1e-5);
        assert!((var - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_recorded_states_are_pre_step_states() {
        let simulator = TickSimulator::new(9).with_reward_every(3, -1.0);
        let mut learner = learner(simulator, FixedPolicy::uniform(2), param());
        learner.run_episode().unwrap();

        let policy = learner.policy();
        let seen = policy.seen_states();
        let trained = policy.train_batches()[0].iter().map(|t| t.state.clone()).collect::<Vec<_>>();
        assert_eq!(seen, trained);
        // the state after the last step is never recorded
        assert_ne!(trained.last(), Some(&learner.environment().state()));
    }

    #[test]
    fn test_first_reward_terminates_episode() {
        let simulator = TickSimulator::new(100).with_reward_every(4, 1.0);
        let param = Parameter {
            episode_termination: EpisodeTermination::FirstReward,
            ..param()
        };
        let mut learner = learner(simulator, FixedPolicy::uniform(2), param);
        let summary = learner.run_episode().unwrap();
        assert_eq!(summary.rounds, 1);
        assert_eq!(summary.reward_sum, 1.0);
        assert_eq!(summary.steps, 3);

        learner.run_episode().unwrap();
        assert_eq!(learner.environment().simulator().resets(), 2);
    }

    #[test]
    fn test_first_reward_mode_recovers_from_done() {
        // the game ends before any point is scored
        let simulator = TickSimulator::new(5);
        let param = Parameter {
            episode_termination: EpisodeTermination::FirstReward,
            batch_size_episodes: 2,
            ..param()
        };
        let mut learner = learner(simulator, FixedPolicy::uniform(2), param);
        let summary = learner.run_episode().unwrap();
        assert_eq!(summary.rounds, 0);
        assert!(!summary.trained);
        assert_eq!(learner.pending_transitions(), 4);
    }

    #[test]
    fn test_batch_spans_episodes() {
        let simulator = TickSimulator::new(6).with_reward_every(3, 1.0);
        let param = Parameter {
            batch_size_episodes: 2,
            ..param()
        };
        let mut learner = learner(simulator, FixedPolicy::uniform(2), param);

        assert!(!learner.run_episode().unwrap().trained);
        assert_eq!(learner.pending_transitions(), 5);
        assert!(learner.run_episode().unwrap().trained);

        let batches = learner.policy().train_batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 10);
    }

    #[test]
    fn test_checkpoint_interval() {
        let simulator = TickSimulator::new(6).with_reward_every(3, 1.0);
        let param = Parameter {
            checkpoint_every_n_episodes: 2,
            ..param()
        };
        let mut learner = learner(simulator, FixedPolicy::uniform(2), param);
        let saved = (0..5).map(|_| learner.run_episode().unwrap().checkpoint_saved).collect::<Vec<_>>();
        assert_eq!(saved, vec![false, true, false, true, false]);
        assert_eq!(learner.policy().checkpoints_saved(), 2);
        assert_eq!(learner.policy().checkpoints_loaded(), 0);

        let summary = learner.close();
        assert_eq!(summary.episodes, 5);
        assert_eq!(summary.checkpoints, 2);
        assert_eq!(summary.updates, 5);
    }

    #[test]
    fn test_resume_loads_checkpoint() {
        let param = Parameter {
            load_checkpoint: true,
            ..param()
        };
        let learner = learner(TickSimulator::new(6), FixedPolicy::uniform(2), param);
        assert_eq!(learner.policy().checkpoints_loaded(), 1);
    }

    #[test]
    fn test_deterministic_policy_picks_action() {
        let simulator = TickSimulator::new(6).with_reward_every(3, 1.0);
        let mut learner = learner(simulator, FixedPolicy::new(vec![0.0, 1.0]), param());
        learner.run_episode().unwrap();
        let batch = &learner.policy().train_batches()[0];
        assert!(batch.iter().all(|t| t.action_index == TickAction::Down.numeric()));
        let actions = learner.environment().simulator().actions();
        assert!(actions.iter().skip(1).all(|&a| a == TickAction::Down.raw_code()));
    }

    #[test]
    fn test_warm_up_violation_aborts() {
        let simulator = TickSimulator::new(100).with_reward_at(2, 1.0);
        let param = Parameter {
            noop_warm_up: NoopWarmUp::Fixed(3),
            ..param()
        };
        let mut learner = learner(simulator, FixedPolicy::uniform(2), param);
        let err = learner.run_episode().unwrap_err();
        assert!(matches!(err.downcast_ref::<PgError>(), Some(PgError::WarmUpViolation { step: 2, .. })));
    }

    #[test]
    fn test_degenerate_batch_aborts() {
        // a single transition per episode => no variance
        let simulator = TickSimulator::new(100).with_reward_at(2, 1.0);
        let param = Parameter {
            episode_termination: EpisodeTermination::FirstReward,
            ..param()
        };
        let mut learner = learner(simulator, FixedPolicy::uniform(2), param);
        let err = learner.run_episode().unwrap_err();
        assert!(matches!(err.downcast_ref::<PgError>(), Some(PgError::DegenerateRewards { len: 1, .. })));
    }

    #[rstest]
    #[case(vec![1.0])]
    #[case(vec![0.7, 0.7])]
    #[case(vec![1.5, -0.5])]
    #[case(vec![f32::NAN, 1.0])]
    fn test_invalid_distribution_aborts(#[case] probabilities: Vec<f32>) {
        let mut learner = learner(TickSimulator::new(100), FixedPolicy::new(probabilities), param());
        let err = learner.run_episode().unwrap_err();
        assert!(matches!(err.downcast_ref::<PgError>(), Some(PgError::InvalidDistribution(_))));
    }

    #[test]
    fn test_policy_built_from_policy_parameter() {
        let param = Parameter {
            policy: PolicyParameter {
                learning_rate: 0.001,
                hidden_layer_size: 64,
            },
            ..param()
        };
        let learner = PolicyGradientLearner::<_, _, TickAction>::new(
            TickSimulator::new(6),
            |policy_param: &PolicyParameter| Ok(FixedPolicy::uniform(2).configured_with(policy_param.clone())),
            test_preprocessor(),
            param,
        )
        .unwrap();
        assert_eq!(
            learner.policy().configured(),
            Some(&PolicyParameter {
                learning_rate: 0.001,
                hidden_layer_size: 64,
            })
        );
    }

    #[test]
    fn test_failing_policy_init_rejected() {
        let r = PolicyGradientLearner::<TickSimulator, FixedPolicy, TickAction>::new(
            TickSimulator::new(6),
            |_| Err(anyhow::anyhow!("no such model")),
            test_preprocessor(),
            param(),
        );
        assert!(r.is_err());
    }

    #[test]
    fn test_next_episode_after_failed_one() {
        let simulator = TickSimulator::new(6).with_reward_every(3, 1.0);
        let param = Parameter {
            batch_size_episodes: 2,
            ..param()
        };
        let mut learner = learner(simulator, FixedPolicy::new(vec![0.7, 0.7]), param);
        let err = learner.run_episode().unwrap_err();
        assert!(matches!(err.downcast_ref::<PgError>(), Some(PgError::InvalidDistribution(_))));
        assert_eq!(learner.pending_transitions(), 0);

        learner.policy.set_probabilities(vec![0.5, 0.5]);
        for _ in 0..2 {
            learner.run_episode().unwrap();
        }
        let batches = learner.policy().train_batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 10);
        assert_eq!(learner.session().episode_n(), 3);
    }

    #[test]
    fn test_partial_episode_discarded_on_error() {
        let simulator = TickSimulator::new(6).with_reward_every(3, 1.0);
        let policy = FixedPolicy::uniform(2).invalid_from_pass(3);
        let mut learner = learner(simulator, policy, param());
        assert!(learner.run_episode().is_err());
        // two transitions were recorded before the failing pass
        assert_eq!(learner.policy().seen_states().len(), 3);
        assert_eq!(learner.pending_transitions(), 0);

        learner.policy.set_probabilities(vec![0.5, 0.5]);
        let summary = learner.run_episode().unwrap();
        assert!(summary.trained);
        assert_eq!(learner.policy().train_batches()[0].len(), summary.steps);
    }

    #[test]
    fn test_invalid_parameter_rejected() {
        let param = Parameter {
            batch_size_episodes: 0,
            ..param()
        };
        let r = PolicyGradientLearner::<_, _, TickAction>::new(
            TickSimulator::new(6),
            |_| Ok(FixedPolicy::uniform(2)),
            test_preprocessor(),
            param,
        );
        assert!(r.is_err());
    }

    #[test]
    fn test_frame_stack_mode() {
        let simulator = TickSimulator::new(12).with_reward_every(4, 1.0);
        let param = Parameter {
            state_mode: StateMode::FrameStack(4),
            ..param()
        };
        let mut learner = learner(simulator, FixedPolicy::uniform(2), param);
        let summary = learner.run_episode().unwrap();
        // three filling no-ops
        assert_eq!(summary.steps, 9);
        let batch = &learner.policy().train_batches()[0];
        assert!(batch.iter().all(|t| t.state.dims() == &[4, 4, 4]));
    }
}
