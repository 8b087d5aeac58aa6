use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use std::path::{Path, PathBuf};

/// Loads and parses a configuration file from the given path
///
/// Relative paths in the `[paths]` and `[logging]` sections are resolved
/// against the directory containing the configuration file.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use octagon_harvest::config::load_config;
///
/// let config = load_config(Path::new("harvest.toml")).unwrap();
/// println!("URL lists go to: {}", config.paths.url_dir.display());
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    // Read the configuration file
    let content = std::fs::read_to_string(path)?;

    // Parse TOML
    let config: Config = toml::from_str(&content)?;

    let base = absolute_dir(path.parent().unwrap_or_else(|| Path::new("")))?;
    let config = resolve_paths(config, &base);

    // Validate the configuration
    validate(&config)?;

    Ok(config)
}

/// Loads the configuration file if one is given, otherwise the defaults
/// resolved against the current working directory
pub fn load_config_or_default(path: Option<&Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => {
            let base = std::env::current_dir()?;
            let config = resolve_paths(Config::default(), &base);
            validate(&config)?;
            Ok(config)
        }
    }
}

fn resolve_paths(mut config: Config, base: &Path) -> Config {
    config.paths = config.paths.resolve(base);
    config.logging.file = config.logging.file.map(|f| {
        if f.is_absolute() {
            f
        } else {
            base.join(f)
        }
    });
    config
}

fn absolute_dir(dir: &Path) -> Result<PathBuf, ConfigError> {
    if dir.is_absolute() {
        Ok(dir.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(dir))
    }
}
