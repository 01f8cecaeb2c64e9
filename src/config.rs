//! Configuration for the bank server and the load-testing client.
//!
//! The server accepts command-line arguments and an optional TOML file.
//! CLI arguments take precedence over config file values. The client is
//! configured from the command line only.

use crate::error::ConfigError;
use clap::error::ErrorKind;
use clap::Parser;
use serde::Deserialize;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

/// Exit code for missing or invalid arguments
pub const EXIT_USAGE: u8 = 1;

/// Exit code for an unreadable or invalid test script
pub const EXIT_INPUT: u8 = 2;

/// Command-line arguments for the bank server
#[derive(Parser, Debug)]
#[command(name = "bank-server")]
#[command(version)]
#[command(about = "A multithreaded banking transaction server", long_about = None)]
pub struct ServerArgs {
    /// Port to listen on (0 = pick a free port)
    pub port: Option<u16>,

    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Number of worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Maximum number of connections served at once
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Timeout for reading a request head in milliseconds (0 = none)
    #[arg(long)]
    pub read_timeout_ms: Option<u64>,

    /// Test script to run against this server with the embedded client
    #[arg(long, env = "TEST_FILE")]
    pub test_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error) [default: info]
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Command-line arguments for the load-testing client
#[derive(Parser, Debug)]
#[command(name = "bank-client")]
#[command(version)]
#[command(about = "Runs batches of concurrent requests against a bank server", long_about = None)]
pub struct ClientArgs {
    /// Test script with request/response pairs and run directives
    pub input: PathBuf,

    /// Port of the bank server
    pub port: u16,

    /// Host of the bank server
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Per-request timeout in milliseconds
    #[arg(long, default_value_t = 10_000)]
    pub timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Parse command-line arguments, exiting with [`EXIT_USAGE`] on error.
///
/// `--help` and `--version` still exit successfully.
pub fn parse_args<T: Parser>() -> T {
    match T::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let _ = e.print();
            std::process::exit(i32::from(EXIT_USAGE));
        }
    }
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerSection {
    /// Address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default)]
    pub port: u16,
    /// Number of worker threads
    pub workers: Option<usize>,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 0,
            workers: None,
            max_connections: default_max_connections(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    /// Log level
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

fn default_max_connections() -> usize {
    10_000
}

fn default_read_timeout_ms() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
    pub max_connections: usize,
    /// `None` disables the request read timeout
    pub read_timeout: Option<Duration>,
    pub test_file: Option<PathBuf>,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let server = ServerSection::default();
        ServerConfig {
            host: server.host,
            port: server.port,
            workers: server.workers,
            max_connections: server.max_connections,
            read_timeout: timeout_from_millis(server.read_timeout_ms),
            test_file: None,
            log_level: default_log_level(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(parse_args())
    }

    /// Merge parsed CLI args with the TOML file they point to, if any.
    /// CLI arguments take precedence over TOML file values.
    pub fn from_args(cli: ServerArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Ok(ServerConfig {
            host: cli.host.unwrap_or(toml_config.server.host),
            port: cli.port.unwrap_or(toml_config.server.port),
            workers: cli
                .workers
                .or(toml_config.server.workers)
                .filter(|&n| n > 0),
            max_connections: cli
                .max_connections
                .unwrap_or(toml_config.server.max_connections)
                .max(1),
            read_timeout: timeout_from_millis(
                cli.read_timeout_ms
                    .unwrap_or(toml_config.server.read_timeout_ms),
            ),
            test_file: cli.test_file,
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        })
    }

    /// Resolve `host:port` to the address the listener binds.
    pub fn socket_addr(&self) -> io::Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("no address found for host '{}'", self.host),
                )
            })
    }
}

fn timeout_from_millis(millis: u64) -> Option<Duration> {
    (millis > 0).then(|| Duration::from_millis(millis))
}

/// Settings for the batched request driver
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub host: String,
    pub port: u16,
    /// Limit for one request/response exchange, including connect
    pub timeout: Duration,
}

impl DriverConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        DriverConfig {
            host: host.into(),
            port,
            timeout: Duration::from_secs(10),
        }
    }

    /// `host:port`, used both to connect and as the `Host` header
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl From<&ClientArgs> for DriverConfig {
    fn from(args: &ClientArgs) -> Self {
        DriverConfig {
            host: args.host.clone(),
            port: args.port,
            timeout: Duration::from_millis(args.timeout_ms.max(1)),
        }
    }
}
