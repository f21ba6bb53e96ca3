use anyhow::{Context, Result};
use attend_engine::EngineOptions;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CLI configuration: defaults, then an optional TOML file, then `ATTEND_*`
/// environment variables. Command-line flags are applied last by the caller.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    /// Directory containing `det_10g.onnx` and `w600k_r50.onnx`.
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,
    /// Path to the SQLite enrollment database.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default)]
    pub engine: EngineOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
            db_path: default_db_path(),
            engine: EngineOptions::default(),
        }
    }
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("attend")
}

fn default_model_dir() -> PathBuf {
    data_dir().join("models")
}

fn default_db_path() -> PathBuf {
    data_dir().join("attend.db")
}

impl Config {
    /// Resolve configuration for this process.
    ///
    /// `explicit` (from `--config`) wins over `ATTEND_CONFIG`. A named file
    /// that cannot be read is an error; no file at all means defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let file = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("ATTEND_CONFIG").ok().map(PathBuf::from));

        let mut config = match file {
            Some(path) => {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("cannot read config file {}", path.display()))?;
                let config = Self::from_toml(&text)
                    .with_context(|| format!("invalid config file {}", path.display()))?;
                tracing::debug!(path = %path.display(), "loaded config file");
                config
            }
            None => Self::default(),
        };

        config.apply_env_with(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Overlay `ATTEND_*` variables. Unparsable values are ignored with a warning.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("ATTEND_MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("ATTEND_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        if let Some(v) = env_parse(&lookup, "ATTEND_TOLERANCE") {
            self.engine.tolerance = v;
        }
        if let Some(v) = env_parse(&lookup, "ATTEND_FRAME_INTERVAL") {
            self.engine.frame_interval = v;
        }
        if let Some(v) = env_parse(&lookup, "ATTEND_WORKERS") {
            self.engine.workers = v;
        }
        if let Some(v) = env_parse(&lookup, "ATTEND_MAX_FRAMES") {
            self.engine.max_sampled_frames = Some(v);
        }
        if let Some(v) = env_parse(&lookup, "ATTEND_TIME_BUDGET_SECS") {
            self.engine.time_budget_secs = Some(v);
        }
    }
}

fn env_parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment variable");
            None
        }
    }
}
