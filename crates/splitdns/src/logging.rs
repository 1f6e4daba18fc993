use anyhow::Context;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt::layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const LOGGING_ENV: &str = "SPLITDNS_LOG";

pub fn setup_logging() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            layer().with_filter(
                EnvFilter::builder()
                    .with_env_var(LOGGING_ENV)
                    .with_default_directive(LevelFilter::INFO.into())
                    .from_env_lossy(),
            ),
        )
        .try_init()
        .context("failed to initialize tracing_subscriber")
}
