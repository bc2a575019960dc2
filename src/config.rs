use crate::error::LDrawError;
use serde::{Deserialize, Serialize};
use std::{
    fs::{read_to_string, write},
    path::{Path, PathBuf},
    time::Duration,
};

const LIBRARY_TABLE: &str = "library";

/// Where the parts library lives and how it is kept current.
///
/// ```toml
/// [library]
/// search_path = ["/opt/ldraw", "/home/me/ldraw-unofficial"]
/// index_cache = "/home/me/.cache/ldraw-index.json"
/// watch = true
/// debounce_ms = 500
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Library roots, highest precedence first.
    pub search_path: Vec<PathBuf>,
    /// Persisted index snapshot. Without one the index is rebuilt on every start.
    pub index_cache: Option<PathBuf>,
    /// Monitor the search path for changes.
    pub watch: bool,
    /// Debounce window for filesystem notifications.
    pub debounce_ms: u64,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        LibraryConfig {
            search_path: Vec::new(),
            index_cache: None,
            watch: true,
            debounce_ms: 500,
        }
    }
}

impl LibraryConfig {
    pub fn new(search_path: Vec<PathBuf>) -> Self {
        LibraryConfig {
            search_path,
            ..Default::default()
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Search-path roots that are not directories.
    pub fn missing_roots(&self) -> Vec<&Path> {
        self.search_path
            .iter()
            .map(PathBuf::as_path)
            .filter(|root| !root.is_dir())
            .collect()
    }
}

pub trait LibraryConfigProvider: Send + Sync {
    fn get_library(&self) -> Result<LibraryConfig, LDrawError>;
    fn set_library(&self, config: LibraryConfig) -> Result<(), LDrawError>;
}

/// Reads and writes the `[library]` table of a TOML file, leaving other tables alone.
#[derive(Debug, Serialize, Deserialize)]
pub struct TomlConfigProvider {
    path: PathBuf,
}

impl TomlConfigProvider {
    pub fn new(path: PathBuf) -> Self {
        TomlConfigProvider { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_table(&self) -> Result<toml::Table, LDrawError> {
        if !self.path.exists() {
            return Ok(toml::Table::new());
        }
        let content = read_to_string(&self.path)?;
        Ok(toml::from_str(&content)?)
    }
}

impl LibraryConfigProvider for TomlConfigProvider {
    fn get_library(&self) -> Result<LibraryConfig, LDrawError> {
        tracing::debug!("Attempting to read library config from: {:?}", &self.path);
        let mut table = self.read_table()?;
        match table.remove(LIBRARY_TABLE) {
            Some(value) => Ok(value.try_into()?),
            None => {
                tracing::debug!("No [library] table found, using defaults.");
                Ok(LibraryConfig::default())
            }
        }
    }

    fn set_library(&self, config: LibraryConfig) -> Result<(), LDrawError> {
        tracing::debug!("Attempting to write library config to: {:?}", &self.path);
        let mut table = self.read_table()?;
        table.insert(LIBRARY_TABLE.to_string(), toml::Value::try_from(config)?);
        write(&self.path, toml::to_string(&table)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let provider = TomlConfigProvider::new(dir.path().join("config.toml"));
        assert_eq!(provider.get_library().unwrap(), LibraryConfig::default());
    }

    #[test]
    fn round_trip_preserves_other_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[editor]\ntheme = \"dark\"\n").unwrap();
        let provider = TomlConfigProvider::new(path.clone());

        let mut config = LibraryConfig::new(vec![PathBuf::from("/opt/ldraw")]);
        config.debounce_ms = 50;
        config.index_cache = Some(PathBuf::from("/tmp/index.json"));
        provider.set_library(config.clone()).unwrap();

        assert_eq!(provider.get_library().unwrap(), config);
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("theme = \"dark\""));
    }

    #[test]
    fn partial_tables_fill_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[library]\nsearch_path = [\"/a\", \"/b\"]\n").unwrap();
        let config = TomlConfigProvider::new(path).get_library().unwrap();
        assert_eq!(config.search_path.len(), 2);
        assert!(config.watch);
        assert_eq!(config.debounce(), Duration::from_millis(500));
    }
}
