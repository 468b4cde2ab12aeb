use log::LevelFilter;

/// Console logging for training runs; `RUST_LOG` overrides the default level.
///
/// Safe to call more than once (e.g. from several tests of one binary).
pub fn init_logging() {
    let _ = env_logger::builder()
        .format_target(false)
        .format_timestamp_secs()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .try_init();
}

#[cfg(test)]
#[ctor::ctor]
fn init() {
    use log::LevelFilter;
    env_logger::builder()
        .format_timestamp_secs()
        .filter_level(LevelFilter::Debug)
        .parse_default_env()
        .init()
}
