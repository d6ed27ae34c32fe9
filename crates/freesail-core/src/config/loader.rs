//! Configuration loading and persistence.

use super::Config;
use crate::error::ConfigError;
use crate::paths;
use std::fs;
use std::path::Path;

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = paths::config_file()?;
        Self::load(&path)
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::Json5(e.to_string()))
    }

    /// Save configuration to the default path.
    pub fn save_default(&self) -> Result<(), ConfigError> {
        let path = paths::config_file()?;
        self.save(&path)
    }

    /// Save configuration to a file path.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_json5()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write atomically
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Serialize to JSON5 string.
    pub fn to_json5(&self) -> Result<String, ConfigError> {
        // json5 has no serializer; plain JSON is valid JSON5
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from an explicit path if given, otherwise the default path, falling
    /// back to defaults when no file exists.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::load_or_default()),
        }
    }

    /// Load configuration from the default path, falling back to defaults if
    /// no file exists or it cannot be read.
    pub fn load_or_default() -> Self {
        match Self::load_default() {
            Ok(config) => config,
            Err(ConfigError::NotFound(_)) => Self::default(),
            Err(e) => {
                tracing::warn!("Ignoring unreadable config file: {}", e);
                Self::default()
            }
        }
    }

    /// Validate the configuration, collecting all errors before returning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.gateway.port == 0 {
            errors.push("Gateway port cannot be 0".to_string());
        }
        if self.gateway.max_connections == 0 {
            errors.push("Gateway max_connections must be greater than 0".to_string());
        }

        if self.session.idle_timeout_secs == 0 {
            errors.push("Session idle_timeout_secs must be greater than 0".to_string());
        }
        if self.session.sweep_interval_secs == 0 {
            errors.push("Session sweep_interval_secs must be greater than 0".to_string());
        }
        if self.session.keepalive_secs == 0 {
            errors.push("Session keepalive_secs must be greater than 0".to_string());
        }

        if self.codec.max_buffer_bytes < 1024 {
            errors.push(format!(
                "Codec max_buffer_bytes {} is below the minimum of 1024",
                self.codec.max_buffer_bytes
            ));
        }

        let transport = &self.transport;
        if url::Url::parse(&transport.base_url).is_err() {
            errors.push(format!(
                "Transport base_url '{}' is not a valid URL",
                transport.base_url
            ));
        }
        if transport.initial_delay_ms == 0 {
            errors.push("Transport initial_delay_ms must be greater than 0".to_string());
        }
        if transport.max_delay_ms < transport.initial_delay_ms {
            errors.push(format!(
                "Transport max_delay_ms ({}) is below initial_delay_ms ({})",
                transport.max_delay_ms, transport.initial_delay_ms
            ));
        }
        if !(transport.backoff_factor >= 1.0) {
            errors.push(format!(
                "Transport backoff_factor {} must be at least 1.0",
                transport.backoff_factor
            ));
        }
        if transport.max_queue == 0 {
            errors.push("Transport max_queue must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors.join("; ")))
        }
    }
}
