//! Configuration loading
//!
//! Settings are layered, later layers winning:
//!
//! 1. built-in defaults
//! 2. a TOML file: the explicit path, else `VIBELANG_CONFIG_PATH`, else an
//!    optional `vibelang.toml` in the working directory
//! 3. `VIBELANG_*` environment variables, `__` separating nested keys
//!    (e.g. `VIBELANG_ENGINE__PARALLEL_WORKERS=8`)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const ENV_PREFIX: &str = "VIBELANG";
const CONFIG_PATH_VAR: &str = "VIBELANG_CONFIG_PATH";
const DEFAULT_FILE: &str = "vibelang.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker pool size for `parallel`
    pub parallel_workers: usize,
    /// Maximum nesting of step calls
    pub max_call_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive, used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            parallel_workers: 4,
            max_call_depth: 64,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            filter: "warn".to_string(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load with no explicit overrides
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }

    fn validate(self) -> Result<Self> {
        if self.engine.parallel_workers == 0 {
            anyhow::bail!("engine.parallel_workers must be at least 1");
        }
        if self.engine.max_call_depth == 0 {
            anyhow::bail!("engine.max_call_depth must be at least 1");
        }
        Ok(self)
    }
}

#[derive(Debug)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    use_env: bool,
}

impl ConfigBuilder {
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    /// Skip `VIBELANG_*` variables (the config path variable included)
    pub fn without_env(mut self) -> Self {
        self.use_env = false;
        self
    }

    pub fn build(self) -> Result<Config> {
        let defaults = Config::default();
        let mut layers = config::Config::builder()
            .set_default("engine.parallel_workers", defaults.engine.parallel_workers as i64)?
            .set_default("engine.max_call_depth", defaults.engine.max_call_depth as i64)?
            .set_default("logging.filter", defaults.logging.filter)?;

        let explicit = self.config_path.or_else(|| {
            self.use_env
                .then(|| std::env::var_os(CONFIG_PATH_VAR).map(PathBuf::from))
                .flatten()
        });
        layers = match &explicit {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("config file not found: {}", path.display());
                }
                layers.add_source(config::File::from(path.as_path()).required(true))
            }
            None => layers.add_source(config::File::with_name(DEFAULT_FILE).required(false)),
        };

        if self.use_env {
            layers = layers.add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config: Config = layers
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")?;
        config.validate()
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        ConfigBuilder {
            config_path: None,
            use_env: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn toml_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp file");
        file.write_all(contents.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn test_defaults() {
        let file = toml_file("");
        let config = Config::builder()
            .config_path(Some(file.path().to_path_buf()))
            .without_env()
            .build()
            .expect("Should load");

        assert_eq!(config, Config::default());
        assert_eq!(config.engine.parallel_workers, 4);
        assert_eq!(config.logging.filter, "warn");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file = toml_file("[engine]\nparallel_workers = 8\n\n[logging]\nfilter = \"debug\"\n");
        let config = Config::builder()
            .config_path(Some(file.path().to_path_buf()))
            .without_env()
            .build()
            .expect("Should load");

        assert_eq!(config.engine.parallel_workers, 8);
        assert_eq!(config.engine.max_call_depth, 64);
        assert_eq!(config.logging.filter, "debug");
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = Config::builder()
            .config_path(Some(PathBuf::from("/nonexistent/vibelang.toml")))
            .without_env()
            .build()
            .expect_err("Should fail");
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn test_rejects_zero_workers() {
        let file = toml_file("[engine]\nparallel_workers = 0\n");
        let err = Config::builder()
            .config_path(Some(file.path().to_path_buf()))
            .without_env()
            .build()
            .expect_err("Should fail");
        assert!(err.to_string().contains("parallel_workers"));
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = toml_file("[engine]\nmax_call_depth = 10\n");
        std::env::set_var("VIBELANG_ENGINE__MAX_CALL_DEPTH", "12");
        let config = Config::builder()
            .config_path(Some(file.path().to_path_buf()))
            .build();
        std::env::remove_var("VIBELANG_ENGINE__MAX_CALL_DEPTH");

        assert_eq!(config.expect("Should load").engine.max_call_depth, 12);
    }
}
