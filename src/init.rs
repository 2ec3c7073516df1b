use rild::clienv;
use rild::RildConfig;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Filter precedence: $RILD_LOG > config `log_level` > info
fn build_filter(config: Option<&RildConfig>) -> EnvFilter {
    clienv::log_filter()
        .or_else(|| config.and_then(|c| c.log_level.clone()))
        .and_then(|spec| EnvFilter::try_new(spec).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

/// Stderr logging; init captures it into the system log.
pub(crate) fn initialize_logging(config: Option<&RildConfig>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(build_filter(config))
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_names(true)
        .try_init();
}

pub(crate) fn load_config() -> anyhow::Result<RildConfig> {
    let config = RildConfig::load()?;
    tracing::trace!(config = ?config, "Config loaded");
    Ok(config)
}
