use crate::config::TopologyConfig;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::{info, warn};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Load, parse and validate a topology configuration from a JSON file
pub fn load_config(config_path: &Path) -> Result<TopologyConfig> {
    info!("Loading configuration from: {:?}", config_path);

    let file = File::open(config_path)
        .wrap_err_with(|| format!("Failed to open configuration '{}'", config_path.display()))?;

    let config: TopologyConfig = serde_json::from_reader(BufReader::new(file))
        .wrap_err_with(|| format!("Failed to parse configuration '{}'", config_path.display()))?;

    if config.is_empty() {
        warn!("Configuration defines no origins; only the management subnet will be built");
    }

    config.validate()?;

    info!("Loaded {} origin(s)", config.len());
    Ok(config)
}

/// Write a topology configuration as pretty-printed JSON
pub fn write_config(config: &TopologyConfig, config_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(config_path, json + "\n")
        .wrap_err_with(|| format!("Failed to write configuration '{}'", config_path.display()))?;
    info!("Wrote configuration for {} origin(s) to {:?}", config.len(), config_path);
    Ok(())
}
