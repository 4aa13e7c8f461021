use clap::Parser;
use tracing_subscriber::EnvFilter;

use chainflow::cli::{self, Cli};
use chainflow::config::{Config, LoggingConfig};

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.filter.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env_with_toml(cli.config.as_deref())?;
    init_tracing(&config.logging);
    tracing::debug!(env = config.runtime.env.as_str(), "Configuration loaded");

    cli::run(cli.command, &config)
}
