use crate::config::AppConfig;
use crate::data::{self, Transport};
use crate::processing::{self, MetadataTable};
use crate::render;
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// One generation run: fetch, enrich, render. Returns the written document.
pub async fn run<T: Transport>(config: &AppConfig, transport: &T) -> Result<PathBuf> {
    // Detail pages are produced elsewhere, the map only links to them
    fs::create_dir_all(&config.output.pages_dir)
        .with_context(|| format!("Failed to create pages directory: {:?}", config.output.pages_dir))?;

    // 1. Fetch regions
    let mut regions = data::resolve(transport, &config.source).await?;

    // 2. Attach metadata
    processing::enrich(&mut regions, &MetadataTable::france());

    // 3. Render map
    render::render(&regions, config, &config.output.html_file)?;

    Ok(config.output.html_file.clone())
}

/// Prints the outcome of a run and gives the process exit status.
pub fn report(result: &Result<PathBuf>) -> u8 {
    match result {
        Ok(path) => {
            println!("Carte générée dans: {}", path.display());
            0
        }
        Err(err) => {
            eprintln!("Error: {:#}", err);
            1
        }
    }
}
