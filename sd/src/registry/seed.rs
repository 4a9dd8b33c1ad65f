//! Seed data for the provider registry
//!
//! Seed files are YAML with a top-level `providers:` list.

use std::path::Path;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::Provider;

/// Builtin seed (embedded in binary)
const BUILTIN_SEED: &str = include_str!("seed.yml");

/// On-disk seed format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub providers: Vec<Provider>,
}

impl SeedFile {
    fn parse(content: &str) -> Result<Self> {
        let seed: SeedFile = serde_yaml::from_str(content).context("Failed to parse provider seed")?;
        for provider in &seed.providers {
            provider
                .location
                .validate()
                .with_context(|| format!("Provider {} has an invalid location", provider.id))?;
        }
        Ok(seed)
    }
}

/// Providers shipped with the binary
pub fn builtin_seed() -> Result<Vec<Provider>> {
    debug!("builtin_seed: called");
    Ok(SeedFile::parse(BUILTIN_SEED)?.providers)
}

/// Load providers from a seed file
pub fn load_seed(path: impl AsRef<Path>) -> Result<Vec<Provider>> {
    let path = path.as_ref();
    debug!(path = %path.display(), "load_seed: called");
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read seed file {}", path.display()))?;
    let seed = SeedFile::parse(&content).with_context(|| format!("Invalid seed file {}", path.display()))?;
    info!(count = seed.providers.len(), "Loaded seed from: {}", path.display());
    Ok(seed.providers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_builtin_seed_parses() {
        let providers = builtin_seed().unwrap();
        assert_eq!(providers.len(), 4);
        let fatima = providers.iter().find(|p| p.id.as_str() == "mw-001").unwrap();
        assert_eq!(fatima.name, "Fatima Mohammed");
        assert_eq!(fatima.metadata.get("experience").map(String::as_str), Some("8 years"));
        assert!(providers.iter().any(|p| !p.available));
    }

    #[test]
    fn test_load_seed_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
providers:
  - id: p-1
    name: One
    location: {{ latitude: 1.0, longitude: 2.0 }}
"#
        )
        .unwrap();

        let providers = load_seed(file.path()).unwrap();
        assert_eq!(providers.len(), 1);
        assert!(providers[0].available);
    }

    #[test]
    fn test_load_seed_rejects_bad_location() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
providers:
  - id: p-1
    name: One
    location: {{ latitude: 100.0, longitude: 2.0 }}
"#
        )
        .unwrap();

        let err = load_seed(file.path()).unwrap_err();
        assert!(format!("{:?}", err).contains("invalid location"));
    }

    #[test]
    fn test_load_seed_missing_file() {
        assert!(load_seed("/nonexistent/seed.yml").is_err());
    }
}
