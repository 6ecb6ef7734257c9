use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// Install a global tracing subscriber writing to stderr, for proxies
/// which embed the filter and don't configure their own.
///
/// Output is controlled by the RUST_LOG environment variable as usual,
/// and otherwise defaults to WARN. Returns an error if a global subscriber
/// is already installed.
pub fn install() -> anyhow::Result<()> {
    let fmt_layer = tracing_subscriber::fmt::Layer::default()
        .with_writer(std::io::stderr)
        .with_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into()) // Otherwise it's ERROR.
                .from_env_lossy(),
        );

    tracing_subscriber::registry().with(fmt_layer).try_init()?;

    Ok(())
}
