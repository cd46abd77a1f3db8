//! Configuration commands.

use std::path::Path;

use busylight_server::{ConfigLoader, DaemonConfig, FileConfigLoader};

use crate::error::{ClientError, ClientResult};

/// Prints the parsed configuration with defaults filled in.
pub fn dump(path: &Path) -> ClientResult<()> {
    println!("# config.toml ({})", path.display());
    println!("{}", render(path)?);
    Ok(())
}

fn render(path: &Path) -> ClientResult<String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ClientError::Config(format!("failed to read {}: {e}", path.display())))?;
    let config = DaemonConfig::from_toml(&content)
        .map_err(|e| ClientError::Config(format!("failed to parse {}: {e}", path.display())))?;
    Ok(config.to_toml()?)
}

/// Loads the configuration the way the daemon does, credentials included.
pub fn validate(path: &Path) -> ClientResult<()> {
    check(path)?;
    println!("Configuration is valid.");
    Ok(())
}

fn check(path: &Path) -> ClientResult<DaemonConfig> {
    let loader = FileConfigLoader::new(path);
    let config = loader.load()?;
    loader.build_source(&config)?;
    if !config.token_file.exists() {
        println!(
            "warning: token file {} does not exist yet",
            config.token_file.display()
        );
    }
    Ok(config)
}

/// Shows the configuration file path.
pub fn path(path: &Path) -> ClientResult<()> {
    println!("config: {}", path.display());
    Ok(())
}
