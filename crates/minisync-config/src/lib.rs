//! Configuration management for minisync.
//!
//! Parses `minisync.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! `server.host` supports environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default

mod expand;

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override server host.
    pub host: Option<String>,
    /// Override preferred server port.
    pub port: Option<u16>,
    /// Override served directories.
    pub dirs: Option<Vec<PathBuf>>,
    /// Override client script injection.
    pub inject_client_script: Option<bool>,
    /// Override file watching.
    pub watch: Option<bool>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "minisync.toml";

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Served directories (paths are relative strings from TOML).
    serve: ServeConfigRaw,
    /// Live reload configuration.
    pub live_reload: LiveReloadConfig,

    /// Resolved serve configuration (set after loading).
    #[serde(skip)]
    pub serve_resolved: ServeConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Server configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address.
    pub host: String,
    /// Preferred server port. Incremented on conflict.
    pub port: u16,
    /// How many ports to try before giving up.
    pub max_port_attempts: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 3000,
            max_port_attempts: 100,
        }
    }
}

/// One directory or an ordered list of directories.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DirsRaw {
    One(String),
    Many(Vec<String>),
}

/// Raw serve configuration as parsed from TOML (paths as strings).
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ServeConfigRaw {
    dir: Option<DirsRaw>,
    inject_client_script: Option<bool>,
}

/// Resolved serve configuration with absolute paths.
#[derive(Debug)]
pub struct ServeConfig {
    /// Directories to serve, in lookup order.
    pub dirs: Vec<PathBuf>,
    /// Whether to inject the client script into served HTML.
    pub inject_client_script: bool,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            dirs: vec![PathBuf::from(".")],
            inject_client_script: true,
        }
    }
}

/// Live reload configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LiveReloadConfig {
    /// Whether served directories are watched for changes.
    pub watch: bool,
    /// File patterns to watch for changes.
    pub watch_patterns: Option<Vec<String>>,
    /// Debounce window for filesystem events, in milliseconds.
    pub debounce_ms: u64,
    /// Interval between keepalive frames, in seconds.
    pub keepalive_secs: u64,
    /// Reconnect hint sent to clients, in milliseconds.
    pub retry_ms: u64,
}

impl LiveReloadConfig {
    /// Keepalive interval as a [`Duration`].
    #[must_use]
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }

    /// Client reconnect hint as a [`Duration`].
    #[must_use]
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_ms)
    }
}

impl Default for LiveReloadConfig {
    fn default() -> Self {
        Self {
            watch: true,
            watch_patterns: None,
            debounce_ms: 100,
            keepalive_secs: 10,
            retry_ms: 10_000,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`server.host`").
        field: String,
        /// Error message (e.g., "${`MINISYNC_HOST`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Require a numeric field to be non-zero.
fn require_non_zero(value: u64, field: &str) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Validation(format!(
            "{field} must be greater than 0"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `minisync.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails,
    /// or the resulting configuration is invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
            config.validate()?;
        }

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.server.port = port;
        }
        if let Some(dirs) = &settings.dirs
            && !dirs.is_empty()
        {
            self.serve_resolved.dirs.clone_from(dirs);
        }
        if let Some(inject) = settings.inject_client_script {
            self.serve_resolved.inject_client_script = inject;
        }
        if let Some(watch) = settings.watch {
            self.live_reload.watch = watch;
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            server: ServerConfig::default(),
            serve: ServeConfigRaw::default(),
            live_reload: LiveReloadConfig::default(),
            serve_resolved: ServeConfig {
                dirs: vec![base.to_path_buf()],
                inject_client_script: true,
            },
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_serve()?;
        self.validate_live_reload()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.server.host, "server.host")?;
        require_non_zero(
            u64::from(self.server.max_port_attempts),
            "server.max_port_attempts",
        )?;
        Ok(())
    }

    fn validate_serve(&self) -> Result<(), ConfigError> {
        if self.serve_resolved.dirs.is_empty() {
            return Err(ConfigError::Validation(
                "serve.dir must name at least one directory".to_owned(),
            ));
        }
        Ok(())
    }

    fn validate_live_reload(&self) -> Result<(), ConfigError> {
        require_non_zero(self.live_reload.keepalive_secs, "live_reload.keepalive_secs")?;
        require_non_zero(self.live_reload.retry_ms, "live_reload.retry_ms")?;
        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.server.host = expand::expand_env(&self.server.host, "server.host")?;
        Ok(())
    }

    /// Resolve relative paths to absolute paths based on config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        let dirs = match &self.serve.dir {
            Some(DirsRaw::One(dir)) => vec![config_dir.join(dir)],
            Some(DirsRaw::Many(dirs)) => dirs.iter().map(|d| config_dir.join(d)).collect(),
            None => vec![config_dir.to_path_buf()],
        };

        self.serve_resolved = ServeConfig {
            dirs,
            inject_client_script: self.serve.inject_client_script.unwrap_or(true),
        };
    }
}
