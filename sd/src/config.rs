//! sosdispatch configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::coordinator::CoordinatorConfig;
use crate::registry::{InMemoryRegistry, builtin_seed, load_seed};

/// Main sosdispatch configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Dispatch coordinator settings
    pub coordinator: CoordinatorConfig,

    /// Provider registry settings
    pub registry: RegistryConfig,

    /// `sd simulate` settings
    pub simulation: SimulationConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        debug!(?config_path, "Config::load: called");
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .sosdispatch.yml
        let local_config = PathBuf::from(".sosdispatch.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/sosdispatch/sosdispatch.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("sosdispatch").join("sosdispatch.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate().context("Invalid config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Validate configuration before use
    pub fn validate(&self) -> Result<()> {
        self.coordinator.validate()
    }

    /// Build the provider registry from the configured seed
    pub fn registry(&self) -> Result<InMemoryRegistry> {
        debug!(seed_path = ?self.registry.seed_path, "Config::registry: called");
        let providers = match &self.registry.seed_path {
            Some(path) => load_seed(path)?,
            None => builtin_seed()?,
        };
        InMemoryRegistry::from_providers(providers).context("Failed to build provider registry")
    }
}

/// Provider registry configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Seed file; the built-in seed is used when absent
    #[serde(rename = "seed-path")]
    pub seed_path: Option<PathBuf>,
}

/// Simulated provider behaviour for `sd simulate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Seconds before the simulated provider answers
    #[serde(rename = "response-delay-secs", default = "default_response_delay_secs")]
    pub response_delay_secs: u64,

    /// Whether the simulated provider accepts
    #[serde(default = "default_accept")]
    pub accept: bool,
}

fn default_response_delay_secs() -> u64 {
    debug!("default_response_delay_secs: called");
    10
}

fn default_accept() -> bool {
    true
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            response_delay_secs: default_response_delay_secs(),
            accept: default_accept(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ProviderRegistry;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.coordinator.response_window_secs, 180);
        assert!(!config.coordinator.rematch_on_reject);
        assert_eq!(config.registry.seed_path, None);
        assert_eq!(config.simulation.response_delay_secs, 10);
        assert!(config.simulation.accept);
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
coordinator:
  response-window-secs: 60
  rematch-on-reject: true
  max-distance-km: 25.0

registry:
  seed-path: /etc/sosdispatch/providers.yml

simulation:
  response-delay-secs: 2
  accept: false
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.coordinator.response_window_secs, 60);
        assert!(config.coordinator.rematch_on_reject);
        assert_eq!(config.coordinator.max_distance_km, Some(25.0));
        assert_eq!(config.coordinator.max_rematch_attempts, 3);
        assert_eq!(
            config.registry.seed_path,
            Some(PathBuf::from("/etc/sosdispatch/providers.yml"))
        );
        assert_eq!(config.simulation.response_delay_secs, 2);
        assert!(!config.simulation.accept);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = serde_yaml::from_str("simulation:\n  accept: false\n").unwrap();

        assert_eq!(config.coordinator, CoordinatorConfig::default());
        assert_eq!(config.simulation.response_delay_secs, 10);
        assert!(!config.simulation.accept);
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "coordinator:\n  response-window-secs: 5").unwrap();

        let config = Config::load(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(config.coordinator.response_window_secs, 5);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yml");
        assert!(Config::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_registry_from_builtin_seed() {
        let registry = Config::default().registry().unwrap();
        assert_eq!(registry.list().len(), 4);
    }

    #[test]
    fn test_registry_from_seed_path() {
        let mut seed = NamedTempFile::new().unwrap();
        writeln!(
            seed,
            "providers:\n  - id: p1\n    name: Only\n    location:\n      latitude: 1.0\n      longitude: 2.0"
        )
        .unwrap();

        let config = Config {
            registry: RegistryConfig {
                seed_path: Some(seed.path().to_path_buf()),
            },
            ..Default::default()
        };
        let registry = config.registry().unwrap();
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn test_load_rejects_nan_tie_epsilon() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "coordinator:\n  tie-epsilon-km: .nan").unwrap();

        let err = Config::load(Some(&file.path().to_path_buf())).unwrap_err();
        assert!(format!("{:?}", err).contains("tie-epsilon-km"));
    }

    #[test]
    fn test_load_rejects_negative_tolerances() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "coordinator:\n  tie-epsilon-km: -0.5").unwrap();
        assert!(Config::load(Some(&file.path().to_path_buf())).is_err());

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "coordinator:\n  max-distance-km: -1.0").unwrap();
        let err = Config::load(Some(&file.path().to_path_buf())).unwrap_err();
        assert!(format!("{:?}", err).contains("max-distance-km"));
    }
}
