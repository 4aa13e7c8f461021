//! Bootstrap helpers for Chainflow.
//!
//! Env vars that must be known before any config file is read live in
//! `~/.chainflow/.env` (standard dotenvy format).

use std::path::{Path, PathBuf};

/// `~/.chainflow`, or `./.chainflow` when no home directory is known.
pub fn chainflow_base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".chainflow")
}

/// Path to the Chainflow-specific `.env` file: `~/.chainflow/.env`.
pub fn chainflow_env_path() -> PathBuf {
    chainflow_base_dir().join(".env")
}

/// Load env vars from `~/.chainflow/.env` (in addition to the standard `.env`).
///
/// Call this **after** `dotenvy::dotenv()` so that the standard `./.env`
/// takes priority. dotenvy never overwrites existing env vars, so the
/// effective priority is:
///
///   explicit env vars > `./.env` > `~/.chainflow/.env`
pub fn load_chainflow_env() {
    load_env_file(&chainflow_env_path());
}

fn load_env_file(path: &Path) {
    if !path.exists() {
        return;
    }
    if let Err(e) = dotenvy::from_path(path) {
        tracing::warn!("Failed to load {}: {}", path.display(), e);
    }
}

/// Write bootstrap vars to `~/.chainflow/.env`.
///
/// Values are double-quoted so that `#` and other shell-special characters
/// are preserved by dotenvy.
pub fn save_bootstrap_env(vars: &[(&str, &str)]) -> std::io::Result<()> {
    write_env_file(&chainflow_env_path(), vars)
}

fn write_env_file(path: &Path, vars: &[(&str, &str)]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut content = String::new();
    for (key, value) in vars {
        // Escape backslashes and double quotes so a value cannot open a new line.
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        content.push_str(&format!("{}=\"{}\"\n", key, escaped));
    }
    std::fs::write(path, content)
}
