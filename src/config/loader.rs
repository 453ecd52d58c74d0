// Configuration loader with environment variable substitution

use super::types::*;
use anyhow::{bail, Context, Result};
use regex::Regex;
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file with environment variable substitution
    pub fn load<P: AsRef<Path>>(path: P) -> Result<SyncConfig> {
        let content = std::fs::read_to_string(path.as_ref())
            .context("Failed to read config file")?;

        // Substitute environment variables
        let content = Self::substitute_env_vars(&content);

        // Parse YAML
        let config: SyncConfig = serde_yaml::from_str(&content)
            .context("Failed to parse YAML configuration")?;

        // Validate configuration
        Self::validate(&config)?;

        Ok(config)
    }

    /// Substitute ${VAR} and ${VAR:-default} patterns with environment variables
    ///
    /// Examples:
    /// - ${HOME} -> /home/user
    /// - ${OBJSYNC_TOKEN:-anonymous} -> anonymous (if OBJSYNC_TOKEN not set)
    fn substitute_env_vars(content: &str) -> String {
        let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]+))?\}").unwrap();

        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str());

            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    if let Some(default) = default_value {
                        default.to_string()
                    } else {
                        // Keep original if no default and var not found
                        format!("${{{}}}", var_name)
                    }
                }
            }
        }).to_string()
    }

    /// Validate configuration
    fn validate(config: &SyncConfig) -> Result<()> {
        Self::validate_store(&config.source, "source")?;
        Self::validate_store(&config.target, "target")?;
        Ok(())
    }

    fn validate_store(store: &StoreConfig, role: &str) -> Result<()> {
        match store.store.as_str() {
            "memory" => {}
            "disk" => {
                let disk = store
                    .disk
                    .as_ref()
                    .with_context(|| format!("{}: disk store selected but disk config missing", role))?;
                if disk.root_path.is_empty() {
                    bail!("{}: disk.root_path cannot be empty", role);
                }
            }
            "embedded" => {
                let embedded = store.embedded.as_ref().with_context(|| {
                    format!("{}: embedded store selected but embedded config missing", role)
                })?;
                if embedded.db_path.is_empty() {
                    bail!("{}: embedded.db_path cannot be empty", role);
                }
            }
            "server" => {
                let server = store.server.as_ref().with_context(|| {
                    format!("{}: server store selected but server config missing", role)
                })?;
                if server.collection_id.is_empty() {
                    bail!("{}: server.collection_id cannot be empty", role);
                }
                Self::validate_flush(&server.flush, role)?;
            }
            "document" => {
                let document = store.document.as_ref().with_context(|| {
                    format!("{}: document store selected but document config missing", role)
                })?;
                if document.database.is_empty() {
                    bail!("{}: document.database cannot be empty", role);
                }
                Self::validate_flush(&document.flush, role)?;
            }
            unknown => bail!(
                "{}: unknown store: '{}'. Supported: memory, disk, embedded, server, document",
                role,
                unknown
            ),
        }
        Ok(())
    }

    fn validate_flush(flush: &FlushPolicy, role: &str) -> Result<()> {
        if flush.max_batch_bytes == 0 {
            bail!("{}: flush.max_batch_bytes must be > 0", role);
        }
        if flush.max_batch_objects == 0 {
            bail!("{}: flush.max_batch_objects must be > 0", role);
        }
        if flush.max_multipart_count == 0 {
            bail!("{}: flush.max_multipart_count must be > 0", role);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        // Set test environment variable
        std::env::set_var("TEST_VAR", "test_value");

        let input = "url: ${TEST_VAR}";
        let output = ConfigLoader::substitute_env_vars(input);
        assert_eq!(output, "url: test_value");

        std::env::remove_var("TEST_VAR");
    }

    #[test]
    fn test_env_var_with_default() {
        // Don't set TEST_VAR2
        std::env::remove_var("TEST_VAR2");

        let input = "collection_id: ${TEST_VAR2:-default-collection}";
        let output = ConfigLoader::substitute_env_vars(input);
        assert_eq!(output, "collection_id: default-collection");
    }

    #[test]
    fn test_validation_unknown_store() {
        let config = SyncConfig {
            source: StoreConfig {
                store: "carrier-pigeon".to_string(),
                ..StoreConfig::memory()
            },
            target: StoreConfig::memory(),
            logging: LoggingConfig::default(),
        };

        let result = ConfigLoader::validate(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("unknown store"));
    }

    #[test]
    fn test_validation_missing_backend_section() {
        let config = SyncConfig {
            source: StoreConfig {
                store: "server".to_string(),
                ..StoreConfig::memory()
            },
            target: StoreConfig::memory(),
            logging: LoggingConfig::default(),
        };

        let result = ConfigLoader::validate(&config);
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_invalid_flush_policy() {
        let mut server = ServerConfig::default();
        server.flush.max_batch_bytes = 0;
        let config = SyncConfig {
            source: StoreConfig {
                store: "server".to_string(),
                server: Some(server),
                ..StoreConfig::memory()
            },
            target: StoreConfig::memory(),
            logging: LoggingConfig::default(),
        };

        let result = ConfigLoader::validate(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("max_batch_bytes"));
    }
}
