use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::session::SessionConfig;

/// Per-module overrides of the built-in presets.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModuleOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Module used when none is given on the command line.
    pub module: String,
    /// Extra bank file merged into the built-in banks.
    pub bank_path: Option<PathBuf>,
    pub modules: BTreeMap<String, ModuleOverride>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            module: "grammar".to_string(),
            bank_path: None,
            modules: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Resolve session settings: explicit values win, then this file's
    /// override for the module, then the module preset.
    pub fn session_config(&self, module: &str, question_count: Option<usize>, budget_secs: Option<u64>) -> SessionConfig {
        let preset = SessionConfig::preset(module);
        let over = self.modules.get(&module.to_lowercase()).cloned().unwrap_or_default();
        SessionConfig::new(
            question_count
                .or(over.question_count)
                .unwrap_or(preset.question_count),
            budget_secs
                .or(over.budget_secs)
                .unwrap_or(preset.budget.as_secs()),
        )
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "proctor") {
            pd.config_dir().join("config.json")
        } else {
            PathBuf::from("proctor_config.json")
        };
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        if let Ok(bytes) = fs::read(&self.path) {
            match serde_json::from_slice::<Config>(&bytes) {
                Ok(cfg) => return cfg,
                Err(e) => tracing::warn!("ignoring invalid config {}: {}", self.path.display(), e),
            }
        }
        Config::default()
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg).unwrap_or_default();
        fs::write(&self.path, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = Config::default();
        store.save(&cfg).unwrap();
        let loaded = store.load();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn save_and_load_custom_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let store = FileConfigStore::with_path(&path);
        let mut modules = BTreeMap::new();
        modules.insert(
            "aptitude".to_string(),
            ModuleOverride {
                question_count: Some(5),
                budget_secs: None,
            },
        );
        let cfg = Config {
            module: "aptitude".into(),
            bank_path: Some(PathBuf::from("/tmp/bank.json")),
            modules,
        };
        store.save(&cfg).unwrap();
        assert_eq!(cfg, store.load());
    }

    #[test]
    fn missing_or_invalid_file_yields_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        assert_eq!(FileConfigStore::with_path(&path).load(), Config::default());

        fs::write(&path, b"{ not json").unwrap();
        assert_eq!(FileConfigStore::with_path(&path).load(), Config::default());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, br#"{"module": "subject"}"#).unwrap();
        let cfg = FileConfigStore::with_path(&path).load();
        assert_eq!(cfg.module, "subject");
        assert!(cfg.modules.is_empty());
    }

    #[test]
    fn session_config_precedence() {
        let mut cfg = Config::default();
        cfg.modules.insert(
            "grammar".into(),
            ModuleOverride {
                question_count: Some(5),
                budget_secs: Some(90),
            },
        );

        let from_override = cfg.session_config("grammar", None, None);
        assert_eq!(from_override.question_count, 5);
        assert_eq!(from_override.budget, Duration::from_secs(90));

        let explicit = cfg.session_config("grammar", Some(8), None);
        assert_eq!(explicit.question_count, 8);

        let preset = cfg.session_config("subject", None, None);
        assert_eq!(preset, SessionConfig::preset("subject"));
    }
}
