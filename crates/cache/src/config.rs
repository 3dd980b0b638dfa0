//! Capacity configuration for the resource cache.
//!
//! The only tunable is the maximum number of simultaneously running
//! resources. It is read once at startup (environment variable or config
//! file); a configuration-change notification at runtime is delivered by
//! calling `ResourceCache::resize` with the re-read value.

use std::fs;
use std::io;
use std::path::Path;

/// Default maximum number of simultaneously running resources.
pub const DEFAULT_MAX_RUNNING: usize = 20;

/// Configuration for the resource cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of resources kept in the `Running` state
    pub max_running: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_running: DEFAULT_MAX_RUNNING,
        }
    }
}

impl CacheConfig {
    /// Creates a configuration with the given capacity.
    pub fn new(max_running: usize) -> Self {
        Self { max_running }
    }

    /// Sets the maximum number of running resources.
    pub fn with_max_running(mut self, max_running: usize) -> Self {
        self.max_running = max_running;
        self
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `EMBED_HOST_MAX_RUNNING`: maximum running resources (default: 20)
    ///
    /// # Errors
    /// Returns an error if the variable contains an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("EMBED_HOST_MAX_RUNNING") {
            config.max_running = val
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidValue("EMBED_HOST_MAX_RUNNING".to_string()))?;
        }

        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// Expected file format:
    /// ```toml
    /// max_running = 20
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;

        Self::from_toml(&contents)
    }

    /// Parses configuration from a TOML string.
    fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for line in toml_str.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim().trim_matches('"');

                match key {
                    "max_running" => {
                        config.max_running = value
                            .parse::<usize>()
                            .map_err(|_| ConfigError::InvalidValue(key.to_string()))?;
                    }
                    _ => {} // Ignore unknown keys
                }
            }
        }

        Ok(config)
    }

    /// Saves configuration to a TOML file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path.as_ref(), self.to_toml()).map_err(ConfigError::Io)
    }

    fn to_toml(&self) -> String {
        format!(
            "# Embedded resource cache configuration\n\
             max_running = {}\n",
            self.max_running
        )
    }
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for configuration key: {0}")]
    InvalidValue(String),
    #[error("I/O error: {0}")]
    Io(io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.max_running, 20);
    }

    #[test]
    fn test_builder() {
        let config = CacheConfig::default().with_max_running(5);
        assert_eq!(config.max_running, 5);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        let _guard = EnvGuard::new(&["EMBED_HOST_MAX_RUNNING"]);

        env::set_var("EMBED_HOST_MAX_RUNNING", "7");
        let config = CacheConfig::from_env().unwrap();
        assert_eq!(config.max_running, 7);
    }

    #[test]
    #[serial]
    fn test_from_env_unset_uses_default() {
        let _guard = EnvGuard::new(&["EMBED_HOST_MAX_RUNNING"]);

        env::remove_var("EMBED_HOST_MAX_RUNNING");
        let config = CacheConfig::from_env().unwrap();
        assert_eq!(config.max_running, DEFAULT_MAX_RUNNING);
    }

    #[test]
    #[serial]
    fn test_from_env_invalid() {
        let _guard = EnvGuard::new(&["EMBED_HOST_MAX_RUNNING"]);

        env::set_var("EMBED_HOST_MAX_RUNNING", "not_a_number");
        assert!(CacheConfig::from_env().is_err());
    }

    // Helper to save and restore environment variables
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(var_names: &[&str]) -> Self {
            let vars = var_names
                .iter()
                .map(|name| (name.to_string(), env::var(name).ok()))
                .collect();
            Self { vars }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (name, value) in &self.vars {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = CacheConfig::new(12);
        let toml = config.to_toml();
        let parsed = CacheConfig::from_toml(&toml).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_from_toml_ignores_unknown_keys() {
        let toml = r#"
            # Test configuration
            max_running = 3
            some_future_key = "whatever"
        "#;

        let config = CacheConfig::from_toml(toml).unwrap();
        assert_eq!(config.max_running, 3);
    }

    #[test]
    fn test_from_toml_invalid_value() {
        assert!(CacheConfig::from_toml("max_running = lots").is_err());
    }

    #[test]
    fn test_file_save_and_load() {
        let temp_dir = std::env::temp_dir();
        let config_path = temp_dir.join("test_embed_host_cache_config.toml");

        let config = CacheConfig::new(31);
        config.save_to_file(&config_path).unwrap();

        let loaded = CacheConfig::from_file(&config_path).unwrap();
        assert_eq!(config, loaded);

        // Cleanup
        let _ = fs::remove_file(config_path);
    }
}
