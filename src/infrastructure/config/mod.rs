//! Configuration component (spec §4.1, component A).
//!
//! Grounded on `original_source/src/config/loader.py`: a file-backed
//! YAML tree layered under a fixed whitelist of environment overrides.
//! Loading never fails the process -- a missing file or a parse error
//! both yield an empty tree, because secrets may still be reachable
//! through the environment overlay.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use rust_decimal::Decimal;
use serde_yaml_bw::Value as YamlValue;

use crate::application::ports::ConfigLookup;

/// Environment variable names the engine recognizes as secrets/overrides
/// (spec §6 "Environment overlay").
const ENV_WHITELIST: &[&str] = &[
    "OANDA_API_KEY",
    "OANDA_ACCOUNT_ID",
    "OANDA_API_URL",
    "ALPACA_API_KEY_ID",
    "ALPACA_API_SECRET_KEY",
    "WEBHOOK_SHARED_SECRET",
    "API_URL",
];

/// Process-wide configuration: a file-backed YAML tree plus an
/// environment overlay, swappable atomically on reload.
pub struct ConfigStore {
    file_path: PathBuf,
    tree: RwLock<YamlValue>,
    env_vars: HashMap<String, String>,
}

impl ConfigStore {
    /// Load the file at `file_path` and capture the whitelisted
    /// environment variables. Never fails: a missing or unparsable file
    /// yields an empty tree, with a diagnostic logged.
    #[must_use]
    pub fn load(file_path: impl Into<PathBuf>) -> Self {
        let file_path = file_path.into();
        let tree = Self::load_yaml(&file_path);
        let env_vars = Self::capture_env();
        Self {
            file_path,
            tree: RwLock::new(tree),
            env_vars,
        }
    }

    fn load_yaml(path: &Path) -> YamlValue {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml_bw::from_str(&contents) {
                Ok(value) => value,
                Err(err) => {
                    tracing::error!(error = %err, path = %path.display(), "failed to parse config file; using empty config");
                    YamlValue::Mapping(Default::default())
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, path = %path.display(), "config file not found; using empty config");
                YamlValue::Mapping(Default::default())
            }
        }
    }

    fn capture_env() -> HashMap<String, String> {
        ENV_WHITELIST
            .iter()
            .filter_map(|name| std::env::var(name).ok().map(|v| ((*name).to_string(), v)))
            .collect()
    }

    /// Re-read the file from disk, atomically swapping the in-memory
    /// tree. Idempotent; callers may invoke repeatedly.
    pub fn force_reload(&self) {
        let tree = Self::load_yaml(&self.file_path);
        *self.tree.write().unwrap_or_else(std::sync::PoisonError::into_inner) = tree;
    }

    /// Atomically overwrite the file with `new_config` and reload. Some
    /// components (notably the active broker) only observe the change
    /// after a process restart (spec §4.1, §9).
    pub fn save(&self, new_config: &YamlValue) -> std::io::Result<()> {
        let serialized = serde_yaml_bw::to_string(new_config)
            .map_err(|err| std::io::Error::other(err.to_string()))?;
        std::fs::write(&self.file_path, serialized)?;
        self.force_reload();
        Ok(())
    }

    /// Return the current file-portion tree (for `GET /config`).
    #[must_use]
    pub fn snapshot(&self) -> YamlValue {
        self.tree
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn walk(&self, key_path: &str) -> Option<YamlValue> {
        let tree = self.tree.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut current = &*tree;
        for segment in key_path.split('.') {
            let YamlValue::Mapping(mapping) = current else {
                return None;
            };
            current = mapping.get(&YamlValue::String(segment.to_string()))?;
        }
        Some(current.clone())
    }
}

impl ConfigLookup for ConfigStore {
    fn get_string(&self, key_path: &str, default: &str) -> String {
        // Priority 1: an exact whitelist hit on the literal key path,
        // matching the original's `config_get("OANDA_API_KEY")` style
        // lookups (not a per-segment override).
        if let Some(value) = self.env_vars.get(key_path) {
            return value.clone();
        }
        match self.walk(key_path) {
            Some(YamlValue::String(s)) => s,
            Some(YamlValue::Number(n)) => n.to_string(),
            _ => default.to_string(),
        }
    }

    fn get_decimal(&self, key_path: &str, default: Decimal) -> Decimal {
        if let Some(value) = self.env_vars.get(key_path) {
            return value.parse().unwrap_or(default);
        }
        match self.walk(key_path) {
            Some(YamlValue::Number(n)) => n.to_string().parse().unwrap_or(default),
            Some(YamlValue::String(s)) => s.parse().unwrap_or(default),
            _ => default,
        }
    }

    fn get_string_list(&self, key_path: &str) -> Vec<String> {
        match self.walk(key_path) {
            Some(YamlValue::Sequence(items)) => items
                .into_iter()
                .filter_map(|item| match item {
                    YamlValue::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_empty_tree_not_an_error() {
        let config = ConfigStore::load("/nonexistent/path/config.yaml");
        assert_eq!(config.get_string("broker.name", "alpaca"), "alpaca");
    }

    #[test]
    fn file_values_resolve_through_dotted_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "broker:\n  name: oanda\ntrading:\n  defaults:\n    quantity: 10\n"
        )
        .unwrap();
        let config = ConfigStore::load(file.path());
        assert_eq!(config.get_string("broker.name", "x"), "oanda");
        assert_eq!(
            config.get_decimal("trading.defaults.quantity", Decimal::ONE),
            Decimal::new(10, 0)
        );
        assert_eq!(config.get_string("no.such.path", "fallback"), "fallback");
    }

    #[test]
    fn malformed_file_yields_empty_tree_not_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not: [valid: yaml:::").unwrap();
        let config = ConfigStore::load(file.path());
        assert_eq!(config.get_string("broker.name", "fallback"), "fallback");
    }

    #[test]
    fn env_whitelist_shadows_file_value_by_exact_path() {
        // SAFETY-equivalent: test runs in its own process env mutation,
        // matches the loader's documented whitelist-exact-match lookup.
        unsafe {
            std::env::set_var("WEBHOOK_SHARED_SECRET", "from-env");
        }
        let config = ConfigStore::load("/nonexistent/path/config.yaml");
        assert_eq!(
            config.get_string("WEBHOOK_SHARED_SECRET", "fallback"),
            "from-env"
        );
        unsafe {
            std::env::remove_var("WEBHOOK_SHARED_SECRET");
        }
    }
}
