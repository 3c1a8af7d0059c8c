//! Settings management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Scripting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptingConfig {
    /// Scripts shipped with the editor.
    pub bundled_dir: PathBuf,
    /// Scripts written by the user.
    pub user_dir: PathBuf,
    /// File extensions (without the dot) treated as scripts.
    pub extensions: Vec<String>,
    /// Heap limit per script runtime, in bytes.
    pub memory_limit: Option<usize>,
    /// Stack limit per script runtime, in bytes.
    pub max_stack_size: Option<usize>,
    pub input_defaults: InputDefaults,
    /// Entries kept by request caches before the oldest is evicted.
    pub cache_limit: usize,
    pub frame_rate: u32,
}

/// Values handed back to scripts that ask for `input()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputDefaults {
    pub int: i32,
    pub number: f64,
    pub string: String,
}

impl Default for InputDefaults {
    fn default() -> Self {
        Self {
            int: 8,
            number: 90.0,
            string: String::new(),
        }
    }
}

impl Default for ScriptingConfig {
    fn default() -> Self {
        Self {
            bundled_dir: PathBuf::from("scripts"),
            user_dir: default_user_dir(),
            extensions: vec!["js".to_owned(), "mjs".to_owned()],
            memory_limit: None,
            max_stack_size: None,
            input_defaults: InputDefaults::default(),
            cache_limit: 20,
            frame_rate: 60,
        }
    }
}

impl ScriptingConfig {
    /// Load settings from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_owned(),
                    source,
                })
            }
        };
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    /// Directories searched for scripts, in load order.
    pub fn script_dirs(&self) -> [&Path; 2] {
        [&self.bundled_dir, &self.user_dir]
    }

    /// Whether `path` carries one of the configured script extensions.
    pub fn is_script(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e == ext))
    }
}

fn default_user_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("edkit").join("scripts"))
        .unwrap_or_else(|| PathBuf::from("user-scripts"))
}
