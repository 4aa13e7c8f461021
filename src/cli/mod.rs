//! `chainflow` command-line interface.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::billing::BillingPolicy;
use crate::config::Config;
use crate::settings::Settings;
use crate::task::{Task, TaskRegistry, describe_task};

#[derive(Parser, Debug)]
#[command(name = "chainflow", version, about = "Billable on-chain task runtime")]
pub struct Cli {
    /// TOML config file (defaults to ~/.chainflow/config.toml).
    #[arg(long, global = true, env = "CHAINFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List task kinds with their billing flag and deadline.
    Kinds,

    /// Validate a task JSON file and print its canonical description.
    Describe {
        /// Path to a JSON file holding `{ "kind": ..., "payload": ... }`.
        file: PathBuf,
    },

    /// Inspect or create configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommand {
    /// Print the resolved runtime configuration.
    Show,

    /// Write a default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,

        /// Also pin CHAINFLOW_ENV in ~/.chainflow/.env.
        #[arg(long)]
        env: Option<String>,
    },
}

/// Execute a parsed command against resolved configuration.
pub fn run(command: Command, config: &Config) -> anyhow::Result<()> {
    match command {
        Command::Kinds => {
            print_kinds(config);
            Ok(())
        }
        Command::Describe { file } => describe_file(&file),
        Command::Config(ConfigCommand::Show) => {
            print_config(config);
            Ok(())
        }
        Command::Config(ConfigCommand::Init { force, env }) => init_config(force, env.as_deref()),
    }
}

fn print_kinds(config: &Config) {
    let registry = TaskRegistry::standard();
    let policy = BillingPolicy::new(config.runtime.env);

    println!("{:<34} {:<8} {:<9} TIMEOUT", "KIND", "PAYLOAD", "BILLABLE");
    for kind in registry.kinds() {
        println!(
            "{:<34} {:<8} {:<9} {}s",
            kind.as_str(),
            kind.shape().to_string(),
            if policy.is_billable(kind) { "yes" } else { "no" },
            config.runtime.timeout_for(kind).as_secs()
        );
    }
}

fn describe_file(file: &std::path::Path) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let task: Task = serde_json::from_str(&raw)
        .with_context(|| format!("invalid task in {}", file.display()))?;
    println!("{}", describe_task(&task)?);
    Ok(())
}

fn print_config(config: &Config) {
    let runtime = &config.runtime;
    println!("env                   {}", runtime.env.as_str());
    println!("task_timeout          {}s", runtime.task_timeout.as_secs());
    println!(
        "starknet_task_timeout {}s",
        runtime.starknet_task_timeout.as_secs()
    );
    println!(
        "tx_poll_interval      {}ms",
        runtime.tx_poll_interval.as_millis()
    );
    println!(
        "log_format            {}",
        if config.logging.json { "json" } else { "pretty" }
    );
}

fn init_config(force: bool, env: Option<&str>) -> anyhow::Result<()> {
    let path = Settings::default_toml_path();
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    let mut settings = Settings::default();
    if let Some(env) = env {
        settings.runtime.env = env.to_string();
    }
    settings
        .save_toml(&path)
        .map_err(|e| anyhow::anyhow!(e))?;
    println!("Wrote {}", path.display());

    if let Some(env) = env {
        crate::bootstrap::save_bootstrap_env(&[("CHAINFLOW_ENV", env)])?;
        println!("Wrote {}", crate::bootstrap::chainflow_env_path().display());
    }
    Ok(())
}
