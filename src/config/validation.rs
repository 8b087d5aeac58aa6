use crate::config::types::{Config, DiscoveryConfig, HttpConfig, PathsConfig, SiteConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_site_config(&config.site)?;
    validate_http_config(&config.http)?;
    validate_discovery_config(&config.discovery)?;
    validate_paths_config(&config.paths)?;
    Ok(())
}

/// Validates the target site
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' must use http or https",
            config.base_url
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' has no host",
            config.base_url
        )));
    }

    Ok(())
}

/// Validates HTTP client configuration
fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "timeout-secs must be >= 1, got {}",
            config.timeout_secs
        )));
    }

    if config.connect_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "connect-timeout-secs must be >= 1, got {}",
            config.connect_timeout_secs
        )));
    }

    if config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max-retries must be <= 10, got {}",
            config.max_retries
        )));
    }

    Ok(())
}

/// Validates discovery pacing
fn validate_discovery_config(config: &DiscoveryConfig) -> Result<(), ConfigError> {
    if config.checkpoint_every < 1 {
        return Err(ConfigError::Validation(format!(
            "checkpoint-every must be >= 1, got {}",
            config.checkpoint_every
        )));
    }

    Ok(())
}

/// Validates storage locations
fn validate_paths_config(config: &PathsConfig) -> Result<(), ConfigError> {
    for (name, path) in [
        ("url-dir", &config.url_dir),
        ("checkpoint-dir", &config.checkpoint_dir),
        ("raw-dir", &config.raw_dir),
        ("normalized-dir", &config.normalized_dir),
    ] {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }

    if let Some(registry) = &config.key_registry {
        if registry.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "key-registry cannot be empty when set".to_string(),
            ));
        }
    }

    Ok(())
}
