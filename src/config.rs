use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::TrackKind;
use crate::error::CuffError;
use crate::import::{DEFAULT_BATCH_SIZE, DEFAULT_LIBRARY, DEFAULT_SPECIES};

pub const DEFAULT_CONFIG_FILE: &str = "cuffbase.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub species: Option<String>,
    #[serde(default)]
    pub library: Option<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub genome_build: Option<String>,
    #[serde(default)]
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub database: Option<Utf8PathBuf>,
    pub species: String,
    pub library: String,
    pub exclude: Vec<TrackKind>,
    pub genome_build: Option<String>,
    pub batch_size: usize,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            database: None,
            species: DEFAULT_SPECIES.to_string(),
            library: DEFAULT_LIBRARY.to_string(),
            exclude: Vec::new(),
            genome_build: None,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `cuffbase.json` in the working directory when no
    /// path is given. A missing default file yields the defaults; a missing
    /// explicit file is an error.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, CuffError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(ResolvedConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| CuffError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| CuffError::ConfigParse(err.to_string()))?;
        tracing::debug!(path = %config_path.display(), "config loaded");

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, CuffError> {
        let exclude = config
            .exclude
            .iter()
            .map(|name| name.parse())
            .collect::<Result<Vec<TrackKind>, CuffError>>()?;

        let batch_size = match config.batch_size {
            Some(0) => {
                return Err(CuffError::ConfigParse(
                    "batch_size must be positive".to_string(),
                ));
            }
            Some(size) => size,
            None => DEFAULT_BATCH_SIZE,
        };

        Ok(ResolvedConfig {
            database: config.database.map(Utf8PathBuf::from),
            species: config
                .species
                .unwrap_or_else(|| DEFAULT_SPECIES.to_string()),
            library: config
                .library
                .unwrap_or_else(|| DEFAULT_LIBRARY.to_string()),
            exclude,
            genome_build: config.genome_build,
            batch_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
        assert_eq!(resolved, ResolvedConfig::default());
        assert_eq!(resolved.species, "C.elegans");
    }

    #[test]
    fn exclude_accepts_track_aliases() {
        let config = Config {
            exclude: vec!["tss_groups".to_string(), "CDS".to_string()],
            ..Config::default()
        };
        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.exclude, vec![TrackKind::Tss, TrackKind::Cds]);
    }

    #[test]
    fn unknown_track_is_rejected() {
        let config = Config {
            exclude: vec!["exon".to_string()],
            ..Config::default()
        };
        assert_matches!(
            ConfigLoader::resolve_config(config),
            Err(CuffError::UnknownTrack(_))
        );
    }
}
