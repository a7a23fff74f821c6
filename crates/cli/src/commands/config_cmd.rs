//! `hybridrag config` prints the default configuration.

use hybridrag_config::AppConfig;

pub fn run(path: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path {
        println!("{}", config_path().display());
    } else {
        println!("{}", AppConfig::default_toml());
    }
    Ok(())
}

fn config_path() -> std::path::PathBuf {
    std::env::var("HYBRIDRAG_CONFIG")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| AppConfig::config_dir().join("config.toml"))
}
