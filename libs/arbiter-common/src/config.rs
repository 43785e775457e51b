// Engine configuration: workspace, limits and per-language interpreters
use crate::types::Language;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config/arbiter.json";
pub const CONFIG_ENV: &str = "ARBITER_CONFIG";
pub const WORKSPACE_ENV: &str = "ARBITER_WORKSPACE";

const DEFAULT_CHILD_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// How one language's interpreter is launched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub file_extension: String,
    /// Extra variables for the child. The host environment is never inherited.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl LanguageConfig {
    pub fn language(&self) -> Option<Language> {
        Language::from_str(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
    /// `PATH` handed to child processes.
    #[serde(default = "default_child_path")]
    pub path: String,
    #[serde(default = "default_max_concurrent_processes")]
    pub max_concurrent_processes: usize,
    #[serde(default = "default_max_parallel_tests")]
    pub max_parallel_tests: usize,
    #[serde(default = "default_max_source_bytes")]
    pub max_source_bytes: usize,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    #[serde(default = "default_languages")]
    pub languages: Vec<LanguageConfig>,
}

fn default_workspace_root() -> PathBuf {
    std::env::temp_dir().join("arbiter-workspace")
}

fn default_child_path() -> String {
    DEFAULT_CHILD_PATH.to_string()
}

fn default_max_concurrent_processes() -> usize {
    4
}

fn default_max_parallel_tests() -> usize {
    1
}

fn default_max_source_bytes() -> usize {
    1024 * 1024
}

fn default_max_output_bytes() -> usize {
    1024 * 1024
}

fn default_languages() -> Vec<LanguageConfig> {
    vec![
        LanguageConfig {
            name: "python".to_string(),
            command: "python3".to_string(),
            // -I keeps the script directory off sys.path and ignores PYTHON* variables
            args: ["-I", "-u", "-B", "-X", "utf8"].map(String::from).to_vec(),
            file_extension: "py".to_string(),
            env: BTreeMap::new(),
        },
        LanguageConfig {
            name: "javascript".to_string(),
            command: "node".to_string(),
            args: Vec::new(),
            file_extension: "js".to_string(),
            env: BTreeMap::new(),
        },
    ]
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workspace_root: default_workspace_root(),
            path: default_child_path(),
            max_concurrent_processes: default_max_concurrent_processes(),
            max_parallel_tests: default_max_parallel_tests(),
            max_source_bytes: default_max_source_bytes(),
            max_output_bytes: default_max_output_bytes(),
            languages: default_languages(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file and validate it
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Engine config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: EngineConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Resolve configuration the way the worker does at boot:
    /// explicit path, then `ARBITER_CONFIG`, then `config/arbiter.json` if
    /// present, then built-in defaults. `ARBITER_WORKSPACE` overrides the
    /// workspace root in every case.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let mut config = match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::load(&path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::load(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        if let Some(root) = std::env::var_os(WORKSPACE_ENV) {
            config.workspace_root = PathBuf::from(root);
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.languages.is_empty() {
            bail!("No languages configured");
        }
        for lang in &self.languages {
            if lang.language().is_none() {
                bail!("Unknown language '{}' in engine config", lang.name);
            }
            if lang.command.trim().is_empty() {
                bail!("Language '{}' has an empty command", lang.name);
            }
        }
        if self.max_concurrent_processes == 0 {
            bail!("max_concurrent_processes must be at least 1");
        }
        if self.max_parallel_tests == 0 {
            bail!("max_parallel_tests must be at least 1");
        }
        Ok(())
    }

    /// Configured languages keyed by their enum value. Later entries win.
    pub fn language_map(&self) -> HashMap<Language, &LanguageConfig> {
        self.languages
            .iter()
            .filter_map(|cfg| cfg.language().map(|lang| (lang, cfg)))
            .collect()
    }

    pub fn get_language(&self, language: Language) -> Option<&LanguageConfig> {
        self.languages
            .iter()
            .rev()
            .find(|cfg| cfg.language() == Some(language))
    }

    pub fn list_languages(&self) -> Vec<String> {
        self.languages.iter().map(|l| l.name.clone()).collect()
    }
}
