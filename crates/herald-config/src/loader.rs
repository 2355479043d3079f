//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "herald.toml",
    "config.toml",
    "./config/herald.toml",
    "/etc/herald/config.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with process environment overrides
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        self.load_with_env(|key| env::var(key).ok())
    }

    /// Load configuration, resolving environment variables through `lookup`
    pub fn load_with_env<F>(&self, lookup: F) -> Result<AppConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file(&lookup) {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        apply_env_overrides(&mut config, &lookup)?;
        Ok(config)
    }

    fn find_config_file<F>(&self, lookup: &F) -> Option<PathBuf>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
            warn!(?path, "Configured config file does not exist");
        }

        if let Some(path) = lookup("HERALD_CONFIG").map(PathBuf::from) {
            if path.exists() {
                return Some(path);
            }
        }

        CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn apply_env_overrides<F>(config: &mut AppConfig, lookup: &F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // Unparseable numbers keep the previous value, like the file defaults
    fn set_parsed<T: std::str::FromStr>(target: &mut T, key: &str, value: Option<String>) {
        if let Some(raw) = value {
            match raw.trim().parse() {
                Ok(parsed) => *target = parsed,
                Err(_) => warn!(key, value = %raw, "Ignoring unparseable environment override"),
            }
        }
    }

    // HTTP
    if let Some(val) = lookup("HERALD_HTTP_HOST") {
        config.http.host = val;
    }
    set_parsed(&mut config.http.port, "HERALD_HTTP_PORT", lookup("HERALD_HTTP_PORT"));

    // Database
    if let Some(val) = lookup("HERALD_DATABASE_TYPE") {
        config.database.db_type = val.parse()?;
    }
    if let Some(val) = lookup("HERALD_DATABASE_URL") {
        config.database.url = val;
    }
    set_parsed(
        &mut config.database.max_connections,
        "HERALD_DATABASE_MAX_CONNECTIONS",
        lookup("HERALD_DATABASE_MAX_CONNECTIONS"),
    );

    // Redis
    if let Some(enabled) = lookup("HERALD_REDIS_ENABLED").as_deref().and_then(parse_bool) {
        config.redis.enabled = enabled;
    }
    if let Some(val) = lookup("HERALD_REDIS_URL") {
        config.redis.url = val;
    }

    // Dispatch
    if let Some(val) = lookup("HERALD_WEBHOOK_URL") {
        config.dispatch.webhook_url = val;
    }
    set_parsed(
        &mut config.dispatch.batch_size,
        "HERALD_WORKER_BATCH_SIZE",
        lookup("HERALD_WORKER_BATCH_SIZE"),
    );
    set_parsed(
        &mut config.dispatch.interval_secs,
        "HERALD_WORKER_INTERVAL_SECS",
        lookup("HERALD_WORKER_INTERVAL_SECS"),
    );
    set_parsed(
        &mut config.dispatch.cache_ttl_secs,
        "HERALD_CACHE_TTL_SECS",
        lookup("HERALD_CACHE_TTL_SECS"),
    );
    set_parsed(
        &mut config.dispatch.request_timeout_ms,
        "HERALD_REQUEST_TIMEOUT_MS",
        lookup("HERALD_REQUEST_TIMEOUT_MS"),
    );
    if let Some(autostart) = lookup("HERALD_SCHEDULER_AUTOSTART").as_deref().and_then(parse_bool) {
        config.dispatch.autostart = autostart;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DatabaseType;
    use std::collections::HashMap;
    use std::io::Write;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[dispatch]
webhook_url = "http://file.example/hook"
batch_size = 5
"#
        )
        .unwrap();

        let loader = ConfigLoader::with_path(file.path());
        let config = loader
            .load_with_env(env_from(&[
                ("HERALD_WORKER_BATCH_SIZE", "7"),
                ("HERALD_REDIS_ENABLED", "false"),
                ("HERALD_DATABASE_TYPE", "memory"),
            ]))
            .unwrap();

        assert_eq!(config.dispatch.webhook_url, "http://file.example/hook");
        assert_eq!(config.dispatch.batch_size, 7);
        assert!(!config.redis.enabled);
        assert_eq!(config.database.db_type, DatabaseType::Memory);
    }

    #[test]
    fn test_unparseable_number_keeps_previous_value() {
        let config = ConfigLoader::with_path("/nonexistent/herald.toml")
            .load_with_env(env_from(&[("HERALD_WORKER_INTERVAL_SECS", "two minutes")]))
            .unwrap();
        assert_eq!(config.dispatch.interval_secs, 120);
    }

    #[test]
    fn test_unknown_database_type_is_an_error() {
        let result = ConfigLoader::with_path("/nonexistent/herald.toml")
            .load_with_env(env_from(&[("HERALD_DATABASE_TYPE", "cassandra")]));
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[dispatch\nbatch_size = ").unwrap();
        let result = ConfigLoader::with_path(file.path()).load_with_env(env_from(&[]));
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_parse_bool_variants() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
