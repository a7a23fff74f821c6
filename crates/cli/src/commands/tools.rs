//! `hybridrag tools` lists the catalog the reasoning model would see.

use hybridrag_agent::load_catalog;
use hybridrag_config::AppConfig;
use hybridrag_tools::ToolCatalog;
use std::path::PathBuf;

pub async fn run(dir: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = match dir {
        Some(dir) => ToolCatalog::load_dir(&dir),
        None => {
            let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
            load_catalog(&config)
        }
    };

    if catalog.is_empty() {
        println!("  No tools loaded.");
        return Ok(());
    }

    println!("  {} tool(s):", catalog.len());
    for line in render(&catalog) {
        println!("{line}");
    }
    Ok(())
}

fn render(catalog: &ToolCatalog) -> Vec<String> {
    catalog
        .entries()
        .iter()
        .map(|entry| {
            format!(
                "    {:<18} {:<13} {}",
                entry.definition.name,
                entry.class(),
                entry.definition.description
            )
        })
        .collect()
}
