//! Build the filter menu.

use anyhow::{Context, Result};
use feed_client::{filter_menu, StaticDirectory};
use feed_types::Filter;
use serde::Deserialize;
use std::path::Path;

/// Directory contents read from a JSON file.
#[derive(Debug, Clone, Default, Deserialize)]
struct DirectoryFile {
    #[serde(default)]
    lists: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    servers: Vec<String>,
}

/// Run the menu command.
pub async fn run(path: &Path, authenticated: bool) -> Result<()> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read directory {}", path.display()))?;
    let file: DirectoryFile = serde_json::from_str(&contents).context("Invalid directory file")?;

    for filter in build(file, authenticated).await {
        println!("{}", filter.title());
    }
    Ok(())
}

async fn build(file: DirectoryFile, authenticated: bool) -> Vec<Filter> {
    let directory = StaticDirectory::new()
        .with_lists(file.lists)
        .with_tags(file.tags)
        .with_servers(file.servers);
    filter_menu(&directory, authenticated).await
}
