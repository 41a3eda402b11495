use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use loved_config::{Config, LimiterConfig};
use loved_limiter::PacedQueue;

/// Load and validate configuration from an optional file path.
pub fn load_config(path: Option<&str>) -> anyhow::Result<Config> {
    let config = loved_config::load_config(path.map(Path::new))
        .with_context(|| format!("failed to load config from {:?}", path))?;
    loved_config::validate_config(&config).context("invalid configuration")?;
    Ok(config)
}

/// Build the outbound queue described by the limiter section.
pub fn queue_from_config(cfg: &LimiterConfig) -> anyhow::Result<PacedQueue> {
    let slots = NonZeroUsize::new(cfg.concurrency).context("limiter.concurrency must be >= 1")?;
    Ok(PacedQueue::with_concurrency(
        Duration::from_millis(cfg.min_interval_ms),
        slots,
    ))
}
