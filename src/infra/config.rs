//! Configuration management infrastructure.
//!
//! Persists simulation preferences (worker count, catalog scanning, unsigned
//! extension set, hashing chunk size) in a TOML file under the user's config
//! directory, with JSON and YAML export/import.

use crate::domain::constants::{
    DEFAULT_CATALOG_ROOT, DEFAULT_HASH_CHUNK_MIB, DEFAULT_PROGRESS_INTERVAL_MS,
    DEFAULT_UNSIGNED_EXTENSIONS,
};
use crate::infra::error::{SimulationError, SimulationResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Application configuration with all simulation preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfiguration {
    /// Number of worker threads used for per-file evaluation
    pub threads: u16,

    /// Whether security catalogs are scanned for catalog-signed files
    pub scan_security_catalogs: bool,

    /// Directories searched recursively for `.cat` files
    pub catalog_roots: Vec<PathBuf>,

    /// Extensions that can never carry an embedded signature
    pub unsigned_extensions: Vec<String>,

    /// Chunk size used when streaming ranges through the digest contexts
    pub hash_chunk_size_mib: u32,

    /// Interval between progress samples
    pub progress_interval_ms: u64,

    /// Whether whole-file SHA3 digests are computed alongside the authenticode ones
    pub compute_flat_hashes: bool,

    /// Whether to show verbose output
    pub verbose: bool,
}

impl Default for SimulationConfiguration {
    fn default() -> Self {
        Self {
            threads: 2,
            scan_security_catalogs: true,
            catalog_roots: vec![PathBuf::from(DEFAULT_CATALOG_ROOT)],
            unsigned_extensions: DEFAULT_UNSIGNED_EXTENSIONS
                .iter()
                .map(|ext| (*ext).to_string())
                .collect(),
            hash_chunk_size_mib: DEFAULT_HASH_CHUNK_MIB,
            progress_interval_ms: DEFAULT_PROGRESS_INTERVAL_MS,
            compute_flat_hashes: true,
            verbose: false,
        }
    }
}

impl SimulationConfiguration {
    /// Chunk size in bytes.
    #[must_use]
    pub fn hash_chunk_size(&self) -> usize {
        self.hash_chunk_size_mib as usize * 1024 * 1024
    }

    /// Catalog roots to scan, or `None` when catalog scanning is disabled.
    #[must_use]
    pub fn effective_catalog_roots(&self) -> Option<Vec<PathBuf>> {
        self.scan_security_catalogs
            .then(|| self.catalog_roots.clone())
    }

    /// Unsigned extensions normalized to lowercase with a leading dot.
    #[must_use]
    pub fn normalized_unsigned_extensions(&self) -> Vec<String> {
        self.unsigned_extensions
            .iter()
            .map(|ext| normalize_extension(ext))
            .collect()
    }
}

/// Lowercase an extension and make sure it starts with a dot.
#[must_use]
pub fn normalize_extension(ext: &str) -> String {
    let lower = ext.trim().to_ascii_lowercase();
    if lower.starts_with('.') {
        lower
    } else {
        format!(".{lower}")
    }
}

/// Configuration manager for handling config files
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new configuration manager with default path
    pub fn new() -> SimulationResult<Self> {
        let config_path = Self::default_config_path()?;
        Ok(Self { config_path })
    }

    /// Create a configuration manager with custom path
    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            config_path: path.as_ref().to_path_buf(),
        }
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> SimulationResult<PathBuf> {
        if let Some(config_dir) = dirs::config_dir() {
            Ok(config_dir.join("appcontrol-simulator").join("config.toml"))
        } else {
            Ok(PathBuf::from("appcontrol-simulator.toml"))
        }
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub fn load_or_create_default(&self) -> SimulationResult<SimulationConfiguration> {
        if self.config_path.exists() {
            self.load()
        } else {
            log::info!(
                "Configuration file not found, creating default: {}",
                self.config_path.display()
            );
            let default_config = SimulationConfiguration::default();
            self.save(&default_config)?;
            Ok(default_config)
        }
    }

    /// Load configuration from file, falling back to defaults without writing
    /// anything when the file is absent.
    pub fn load_or_default(&self) -> SimulationResult<SimulationConfiguration> {
        if self.config_path.exists() {
            self.load()
        } else {
            Ok(SimulationConfiguration::default())
        }
    }

    /// Load configuration from file
    pub fn load(&self) -> SimulationResult<SimulationConfiguration> {
        log::debug!("Loading configuration from: {}", self.config_path.display());

        let content = fs::read_to_string(&self.config_path).map_err(|e| {
            SimulationError::ConfigurationError(format!(
                "Failed to read config file {}: {}",
                self.config_path.display(),
                e
            ))
        })?;

        let config: SimulationConfiguration = toml::from_str(&content).map_err(|e| {
            SimulationError::ConfigurationError(format!("Failed to parse config file: {e}"))
        })?;

        validate_config(&config)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, config: &SimulationConfiguration) -> SimulationResult<()> {
        log::info!("Saving configuration to: {}", self.config_path.display());

        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SimulationError::ConfigurationError(format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let content = toml::to_string_pretty(config).map_err(|e| {
            SimulationError::ConfigurationError(format!("Failed to serialize config: {e}"))
        })?;

        fs::write(&self.config_path, content).map_err(|e| {
            SimulationError::ConfigurationError(format!(
                "Failed to write config file {}: {}",
                self.config_path.display(),
                e
            ))
        })?;

        Ok(())
    }

    /// Update a specific configuration value
    pub fn update_value(&self, key: &str, value: &str) -> SimulationResult<()> {
        let mut config = self.load_or_default()?;

        match key {
            "threads" => {
                config.threads = parse_value(key, value)?;
            }
            "scan_security_catalogs" => {
                config.scan_security_catalogs = parse_value(key, value)?;
            }
            "catalog_roots" => {
                config.catalog_roots = split_list(value).map(PathBuf::from).collect();
            }
            "unsigned_extensions" => {
                config.unsigned_extensions = split_list(value).map(normalize_extension).collect();
            }
            "hash_chunk_size_mib" => {
                config.hash_chunk_size_mib = parse_value(key, value)?;
            }
            "progress_interval_ms" => {
                config.progress_interval_ms = parse_value(key, value)?;
            }
            "compute_flat_hashes" => {
                config.compute_flat_hashes = parse_value(key, value)?;
            }
            "verbose" => {
                config.verbose = parse_value(key, value)?;
            }
            _ => {
                return Err(SimulationError::ConfigurationError(format!(
                    "Unknown configuration key: {key}"
                )));
            }
        }

        validate_config(&config)?;
        self.save(&config)
    }

    /// Get the configuration file path
    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Export configuration as a portable format
    pub fn export_config(&self, format: ExportFormat) -> SimulationResult<String> {
        let config = self.load_or_default()?;

        match format {
            ExportFormat::Toml => toml::to_string_pretty(&config).map_err(|e| {
                SimulationError::ConfigurationError(format!("TOML export failed: {e}"))
            }),
            ExportFormat::Json => serde_json::to_string_pretty(&config).map_err(|e| {
                SimulationError::ConfigurationError(format!("JSON export failed: {e}"))
            }),
            ExportFormat::Yaml => serde_yaml::to_string(&config).map_err(|e| {
                SimulationError::ConfigurationError(format!("YAML export failed: {e}"))
            }),
        }
    }

    /// Import configuration from a string
    pub fn import_config(&self, content: &str, format: ExportFormat) -> SimulationResult<()> {
        let config: SimulationConfiguration = match format {
            ExportFormat::Toml => toml::from_str(content).map_err(|e| {
                SimulationError::ConfigurationError(format!("TOML import failed: {e}"))
            })?,
            ExportFormat::Json => serde_json::from_str(content).map_err(|e| {
                SimulationError::ConfigurationError(format!("JSON import failed: {e}"))
            })?,
            ExportFormat::Yaml => serde_yaml::from_str(content).map_err(|e| {
                SimulationError::ConfigurationError(format!("YAML import failed: {e}"))
            })?,
        };

        validate_config(&config)?;
        self.save(&config)
    }
}

/// Validate configuration values
pub fn validate_config(config: &SimulationConfiguration) -> SimulationResult<()> {
    if config.threads == 0 {
        return Err(SimulationError::ConfigurationError(
            "Thread count must be greater than 0".to_string(),
        ));
    }

    if config.hash_chunk_size_mib == 0 {
        return Err(SimulationError::ConfigurationError(
            "Hash chunk size must be greater than 0".to_string(),
        ));
    }

    if config.progress_interval_ms == 0 {
        return Err(SimulationError::ConfigurationError(
            "Progress interval must be greater than 0".to_string(),
        ));
    }

    if let Some(bad) = config
        .unsigned_extensions
        .iter()
        .find(|ext| ext.trim().trim_start_matches('.').is_empty())
    {
        return Err(SimulationError::ConfigurationError(format!(
            "Invalid unsigned extension: '{bad}'"
        )));
    }

    Ok(())
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> SimulationResult<T> {
    value.trim().parse().map_err(|_| {
        SimulationError::ConfigurationError(format!("Invalid value for {key}: {value}"))
    })
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty())
}

/// Configuration export/import formats
#[derive(Debug, Clone, Copy)]
pub enum ExportFormat {
    Toml,
    Json,
    Yaml,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_configuration() {
        let config = SimulationConfiguration::default();
        assert_eq!(config.threads, 2);
        assert_eq!(config.hash_chunk_size(), 32 * 1024 * 1024);
        assert!(config.unsigned_extensions.contains(&".bat".to_string()));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = SimulationConfiguration::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: SimulationConfiguration = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: SimulationConfiguration = toml::from_str("threads = 8").unwrap();
        assert_eq!(config.threads, 8);
        assert_eq!(config.progress_interval_ms, 2000);
    }

    #[test]
    fn test_config_manager_with_temp_path() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test_config.toml");
        let manager = ConfigManager::with_path(&config_path);

        let config = manager.load_or_create_default().unwrap();
        assert!(config_path.exists());

        let loaded_config = manager.load().unwrap();
        assert_eq!(config, loaded_config);
    }

    #[test]
    fn test_update_value() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(temp_dir.path().join("config.toml"));

        manager.update_value("threads", "6").unwrap();
        manager
            .update_value("unsigned_extensions", "OCX, .ps1")
            .unwrap();

        let config = manager.load().unwrap();
        assert_eq!(config.threads, 6);
        assert_eq!(config.unsigned_extensions, vec![".ocx", ".ps1"]);

        assert!(manager.update_value("threads", "0").is_err());
        assert!(manager.update_value("no_such_key", "1").is_err());
    }

    #[test]
    fn test_export_import_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let source = ConfigManager::with_path(temp_dir.path().join("a.toml"));
        source.update_value("compute_flat_hashes", "false").unwrap();

        let exported = source.export_config(ExportFormat::Yaml).unwrap();
        let target = ConfigManager::with_path(temp_dir.path().join("b.toml"));
        target.import_config(&exported, ExportFormat::Yaml).unwrap();

        assert!(!target.load().unwrap().compute_flat_hashes);

        let json = target.export_config(ExportFormat::Json).unwrap();
        assert!(json.contains("\"compute_flat_hashes\": false"));
    }
}
