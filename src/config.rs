//! Configuration module for the betrelay server.
//!
//! Supports command-line arguments, environment variables and a TOML
//! configuration file. Precedence, highest first: CLI argument, environment
//! variable, config file, built-in default.

use crate::storage::DEFAULT_STORAGE_PATH;
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// Command-line arguments for the bet server
#[derive(Parser, Debug, Default)]
#[command(name = "betrelay")]
#[command(version)]
#[command(about = "A lottery bet submission server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, env = "SERVER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long, env = "SERVER_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "SERVER_PORT")]
    pub port: Option<u16>,

    /// Maximum number of pending connections
    #[arg(short = 'b', long, env = "SERVER_LISTEN_BACKLOG")]
    pub listen_backlog: Option<u32>,

    /// Agencies that must ask for winners before the draw
    #[arg(short = 'a', long, env = "SERVER_NUMBER_OF_AGENCIES")]
    pub number_of_agencies: Option<usize>,

    /// File bets are appended to
    #[arg(short = 's', long, env = "STORAGE_PATH")]
    pub storage_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOGGING_LEVEL")]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_listen_backlog")]
    pub listen_backlog: u32,
    #[serde(default = "default_number_of_agencies")]
    pub number_of_agencies: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            listen_backlog: default_listen_backlog(),
            number_of_agencies: default_number_of_agencies(),
        }
    }
}

/// Storage-related configuration
#[derive(Debug, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    crate::DEFAULT_PORT
}

fn default_listen_backlog() -> u32 {
    5
}

fn default_number_of_agencies() -> usize {
    5
}

fn default_storage_path() -> PathBuf {
    PathBuf::from(DEFAULT_STORAGE_PATH)
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub listen_backlog: u32,
    pub number_of_agencies: usize,
    pub storage_path: PathBuf,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::merge(CliArgs::default(), TomlConfig::default())
    }
}

impl Config {
    /// Load configuration from CLI args, environment and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        let toml_config = match cli.config {
            Some(ref config_path) => {
                let contents = std::fs::read_to_string(config_path)
                    .map_err(|source| ConfigError::FileRead {
                        path: config_path.clone(),
                        source,
                    })?;
                Self::parse_toml(config_path.clone(), &contents)?
            }
            None => TomlConfig::default(),
        };

        Ok(Self::merge(cli, toml_config))
    }

    fn parse_toml(path: PathBuf, contents: &str) -> Result<TomlConfig, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::TomlParse { path, source })
    }

    /// Merges CLI args over TOML values (CLI takes precedence).
    pub fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        Config {
            host: cli.host.unwrap_or(toml_config.server.host),
            port: cli.port.unwrap_or(toml_config.server.port),
            listen_backlog: cli
                .listen_backlog
                .unwrap_or(toml_config.server.listen_backlog),
            number_of_agencies: cli
                .number_of_agencies
                .unwrap_or(toml_config.server.number_of_agencies),
            storage_path: cli.storage_path.unwrap_or(toml_config.storage.path),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        }
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", .path.display())]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{}': {source}", .path.display())]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
