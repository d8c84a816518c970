use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "elif_migrate=info";
const VERBOSE_FILTER: &str = "elif_migrate=debug,elif_migrate_cli=debug";

/// Install the global subscriber. `RUST_LOG` wins over `--verbose`.
pub fn init(verbose: bool) -> anyhow::Result<()> {
    let fallback = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(fallback))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(Layer::new().with_writer(std::io::stderr).with_target(verbose))
        .try_init()?;
    Ok(())
}
