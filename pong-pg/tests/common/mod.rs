use pg::learn::parameter::{NoopWarmUp, Parameter};

pub const SEED: u64 = 2016;

/// Default parameters with a fixed seed and a short warm-up
pub fn test_param() -> Parameter {
    Parameter {
        noop_warm_up: NoopWarmUp::Fixed(2),
        seed: Some(SEED),
        ..Parameter::default()
    }
}
