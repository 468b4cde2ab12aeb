pub mod parameter;
pub mod reward;
pub mod trajectory;
pub mod metrics;
pub mod session;
pub mod policy_gradient_learner;
