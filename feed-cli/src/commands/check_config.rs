//! Validate a config file.

use anyhow::{Context, Result};
use feed_client::EngineConfig;
use std::path::Path;

/// Run the check-config command.
pub fn run(path: &Path) -> Result<()> {
    let config = EngineConfig::load(path)
        .with_context(|| format!("Invalid config {}", path.display()))?;
    println!("{}", render(&config)?);
    Ok(())
}

/// The effective configuration, every default filled in.
fn render(config: &EngineConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to render config")
}
