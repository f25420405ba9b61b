// Process-wide configuration
//
// Resolved once at start-up from `BIO_MCP_*` environment variables and shared
// read-only (behind an `Arc`) by every component afterwards.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Environment variable prefix for all overrides
pub const ENV_PREFIX: &str = "BIO_MCP_";

/// Default timeout for a single aligner invocation (1 hour)
pub const DEFAULT_TIMEOUT_SECS: u64 = 3600;

/// Default ceiling for any input data file (50 GiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * (1 << 30);

/// Default number of concurrent invocations admitted by the stdio server
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

const DEFAULT_BWA_BINARY: &str = "bwa";
const DEFAULT_TEMP_DIR_NAME: &str = "bio-mcp-bwa";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Scratch directory; working directory and output location for every invocation
    pub temp_dir: PathBuf,

    /// Path to the `bwa` executable
    pub bwa_path: PathBuf,

    /// Wall-clock limit per invocation, in seconds
    pub timeout_secs: u64,

    /// Largest accepted input file, in bytes
    pub max_file_size: u64,

    /// Stdio server settings
    pub server: ServerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Settings for the outer protocol server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Maximum number of tool calls running at once
    pub max_concurrent: usize,

    /// Port for the Prometheus endpoint (disabled when `None`)
    pub metrics_port: Option<u16>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            metrics_port: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Read `BIO_MCP_LOG_LEVEL` and `BIO_MCP_LOG_FORMAT` through `lookup`
    ///
    /// Separate from [`Config::from_lookup`] so logging can be set up before
    /// the rest of the configuration is resolved. No subscriber exists yet at
    /// that point, so rejected values are returned as messages for the caller
    /// to log once tracing is initialised.
    pub fn parse<F>(lookup: F) -> (Self, Vec<String>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_lowercase())
                .filter(|v| !v.is_empty())
        };
        let mut logging = Self::default();
        let mut rejected = Vec::new();

        if let Some(level) = get("LOG_LEVEL") {
            match level.as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => logging.level = level,
                _ => rejected.push(format!(
                    "Ignoring invalid {ENV_PREFIX}LOG_LEVEL={level:?}, using {:?}",
                    logging.level
                )),
            }
        }

        if let Some(format) = get("LOG_FORMAT") {
            match format.as_str() {
                "json" | "pretty" | "compact" => logging.format = format,
                _ => rejected.push(format!(
                    "Ignoring invalid {ENV_PREFIX}LOG_FORMAT={format:?}, using {:?}",
                    logging.format
                )),
            }
        }

        (logging, rejected)
    }

    /// Logging settings from the process environment
    pub fn parse_env() -> (Self, Vec<String>) {
        Self::parse(|key| std::env::var(key).ok())
    }

    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir().join(DEFAULT_TEMP_DIR_NAME),
            bwa_path: PathBuf::from(DEFAULT_BWA_BINARY),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Resolve configuration from the process environment and prepare the
    /// scratch directory.
    ///
    /// # Errors
    ///
    /// Returns an error only if the temp directory cannot be created or
    /// written. Every other malformed value falls back to its default.
    pub fn resolve() -> Result<Self> {
        let path_var = std::env::var_os("PATH");
        let config = Self::from_lookup(|key| std::env::var(key).ok(), path_var.as_deref());
        config.prepare_temp_dir()?;
        tracing::info!(
            temp_dir = %config.temp_dir.display(),
            bwa_path = %config.bwa_path.display(),
            timeout_secs = config.timeout_secs,
            max_file_size = config.max_file_size,
            "Resolved configuration"
        );
        Ok(config)
    }

    /// Build a configuration from an arbitrary key lookup
    ///
    /// `lookup` receives full variable names (e.g. `BIO_MCP_TIMEOUT`);
    /// `search_path` is the `PATH`-style list used to locate `bwa` when no
    /// explicit binary is configured.
    pub fn from_lookup<F>(lookup: F, search_path: Option<&std::ffi::OsStr>) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        // The aligner runs with the scratch directory as its working
        // directory, so relative paths must be pinned to ours first
        if let Some(dir) = get("TEMP_DIR") {
            config.temp_dir = absolutize(PathBuf::from(dir));
        }

        config.bwa_path = match get("BWA_PATH") {
            // A bare name is left for the OS to look up on PATH
            Some(path) if Path::new(&path).components().count() > 1 => absolutize(PathBuf::from(path)),
            Some(path) => PathBuf::from(path),
            None => search_path
                .and_then(|paths| find_on_search_path(DEFAULT_BWA_BINARY, paths))
                .map(absolutize)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_BWA_BINARY)),
        };

        if let Some(raw) = get("TIMEOUT") {
            match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => config.timeout_secs = secs,
                _ => tracing::warn!("Ignoring invalid {ENV_PREFIX}TIMEOUT={raw:?}, using default"),
            }
        }

        if let Some(raw) = get("MAX_FILE_SIZE") {
            match raw.parse::<u64>() {
                Ok(size) if size > 0 => config.max_file_size = size,
                _ => tracing::warn!(
                    "Ignoring invalid {ENV_PREFIX}MAX_FILE_SIZE={raw:?}, using default"
                ),
            }
        }

        if let Some(raw) = get("MAX_CONCURRENT") {
            match raw.parse::<usize>() {
                Ok(n) if n > 0 => config.server.max_concurrent = n,
                _ => tracing::warn!(
                    "Ignoring invalid {ENV_PREFIX}MAX_CONCURRENT={raw:?}, using default"
                ),
            }
        }

        if let Some(raw) = get("METRICS_PORT") {
            match raw.parse::<u16>() {
                Ok(port) if port > 0 => config.server.metrics_port = Some(port),
                _ => tracing::warn!("Ignoring invalid {ENV_PREFIX}METRICS_PORT={raw:?}"),
            }
        }

        // Rejected logging values are reported by whoever set up tracing
        config.logging = LoggingConfig::parse(&lookup).0;

        config
    }

    /// Create the temp directory if needed and prove it is writable
    pub fn prepare_temp_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.temp_dir).with_context(|| {
            format!("Failed to create temp directory {:?}", self.temp_dir)
        })?;

        let marker = self.temp_dir.join(format!(".write-check-{}", Uuid::new_v4()));
        fs::write(&marker, b"")
            .with_context(|| format!("Temp directory {:?} is not writable", self.temp_dir))?;
        let _ = fs::remove_file(&marker);
        Ok(())
    }

    /// Timeout as a `Duration`
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

/// `path` joined onto the current directory when it is relative
fn absolutize(path: PathBuf) -> PathBuf {
    std::path::absolute(&path).unwrap_or(path)
}

/// Locate an executable by name on a `PATH`-style list
fn find_on_search_path(binary: &str, search_path: &std::ffi::OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_path)
        .map(|dir| dir.join(binary))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
