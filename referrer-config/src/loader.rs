use std::{
    env, fs,
    path::{Path, PathBuf},
};

use referrer_core::ResolverConfig;
use thiserror::Error;
use tracing::{debug, info};

/// Environment variable naming a TOML or JSON config file.
pub const CONFIG_PATH_ENV: &str = "REFERRER_CONFIG_PATH";
/// Environment variable holding inline JSON config.
pub const CONFIG_JSON_ENV: &str = "REFERRER_CONFIG_JSON";

const DEFAULT_CANDIDATES: &[&str] =
    &["referrer.toml", "referrer.json", "config/referrer.toml"];

/// Source that produced the resolver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read resolver config from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid resolver config {origin}: {message}")]
    Parse { origin: String, message: String },
}

/// A loaded configuration and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLoad {
    pub config: ResolverConfig,
    pub source: ConfigSource,
}

/// Resolves [`ResolverConfig`] from, in order:
/// 1) an explicit file path (`$REFERRER_CONFIG_PATH`),
/// 2) inline JSON (`$REFERRER_CONFIG_JSON`),
/// 3) the first default file found under the search root,
/// 4) defaults.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    path: Option<PathBuf>,
    inline_json: Option<String>,
    search_root: PathBuf,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self {
            path: None,
            inline_json: None,
            search_root: PathBuf::from("."),
        }
    }
}

impl ConfigLoader {
    /// Loader seeded from the process environment and working directory.
    pub fn from_env() -> Self {
        let non_empty = |key: &str| {
            env::var(key).ok().filter(|value| !value.trim().is_empty())
        };
        Self {
            path: non_empty(CONFIG_PATH_ENV).map(PathBuf::from),
            inline_json: non_empty(CONFIG_JSON_ENV),
            search_root: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_inline_json(mut self, raw: impl Into<String>) -> Self {
        self.inline_json = Some(raw.into());
        self
    }

    pub fn with_search_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.search_root = root.into();
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let load = if let Some(path) = &self.path {
            ConfigLoad {
                config: load_from_file(path)?,
                source: ConfigSource::EnvPath(path.clone()),
            }
        } else if let Some(raw) = &self.inline_json {
            ConfigLoad {
                config: parse_json(raw, CONFIG_JSON_ENV)?,
                source: ConfigSource::EnvInline,
            }
        } else if let Some(path) = self.find_default_file() {
            ConfigLoad {
                config: load_from_file(&path)?,
                source: ConfigSource::File(path),
            }
        } else {
            ConfigLoad {
                config: ResolverConfig::default(),
                source: ConfigSource::Default,
            }
        };

        info!(
            "resolver config loaded: source={:?}, request_timeout={:?}",
            load.source, load.config.request_timeout
        );
        Ok(load)
    }

    fn find_default_file(&self) -> Option<PathBuf> {
        DEFAULT_CANDIDATES
            .iter()
            .map(|candidate| self.search_root.join(candidate))
            .find(|path| {
                let exists = path.is_file();
                debug!(
                    "resolver config candidate: path={}, exists={}",
                    path.display(),
                    exists
                );
                exists
            })
    }
}

pub fn load_from_file(path: &Path) -> Result<ResolverConfig, ConfigLoadError> {
    let contents =
        fs::read_to_string(path).map_err(|source| ConfigLoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let origin = path.display().to_string();

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => parse_json(&contents, &origin),
        Some("toml") | Some("tml") => parse_toml(&contents, &origin),
        _ => parse_from_str(&contents, &origin),
    }
}

/// Parse a config of unknown format: TOML first, then JSON.
pub fn parse_from_str(
    contents: &str,
    origin: &str,
) -> Result<ResolverConfig, ConfigLoadError> {
    toml::from_str(contents).or_else(|toml_err| {
        serde_json::from_str(contents).map_err(|json_err| ConfigLoadError::Parse {
            origin: origin.to_string(),
            message: format!("toml error: {toml_err}; json error: {json_err}"),
        })
    })
}

pub fn parse_json(
    raw: &str,
    origin: &str,
) -> Result<ResolverConfig, ConfigLoadError> {
    serde_json::from_str(raw).map_err(|err| ConfigLoadError::Parse {
        origin: origin.to_string(),
        message: err.to_string(),
    })
}

fn parse_toml(
    raw: &str,
    origin: &str,
) -> Result<ResolverConfig, ConfigLoadError> {
    toml::from_str(raw).map_err(|err| ConfigLoadError::Parse {
        origin: origin.to_string(),
        message: err.to_string(),
    })
}
