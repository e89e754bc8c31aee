//! Command-line interface
//!
//! The implicit subcommand runs the chain-index; `version` and
//! `health-check` are the only explicit ones. Argument names are part of the
//! stable surface.

use crate::chain::{Pattern, Point};
use crate::config::{
    Config, ConfigError, DatabaseLocation, InputManagementMode, ProducerConfig,
    DEFAULT_GC_INTERVAL_SECS, DEFAULT_LONGEST_ROLLBACK, DEFAULT_MAX_CONCURRENCY, DEFAULT_PORT,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "kupo")]
#[command(about = "Fast, lightweight and configurable chain-index for Cardano", long_about = None)]
#[command(version, disable_version_flag = true)]
pub struct Cli {
    /// Print version information
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: Option<bool>,

    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print version information
    Version,

    /// Probe the health of a running daemon; exits 0 when healthy
    HealthCheck {
        /// Address of the daemon to probe
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port of the daemon to probe
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
}

/// Arguments of the implicit `run` subcommand.
#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Path to the node-to-client socket
    #[arg(long, value_name = "FILEPATH")]
    pub node_socket: Option<PathBuf>,

    /// Path to the node configuration file
    #[arg(long, value_name = "FILEPATH")]
    pub node_config: Option<PathBuf>,

    /// Hostname of an Ogmios JSON-RPC bridge
    #[arg(long, value_name = "HOSTNAME")]
    pub ogmios_host: Option<String>,

    /// Port of an Ogmios JSON-RPC bridge
    #[arg(long, value_name = "PORT")]
    pub ogmios_port: Option<u16>,

    /// Working directory holding the database
    #[arg(long, value_name = "DIRECTORY", conflicts_with = "in_memory")]
    pub workdir: Option<PathBuf>,

    /// Keep the database in memory (nothing survives a restart)
    #[arg(long)]
    pub in_memory: bool,

    /// Address the HTTP server binds to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: IpAddr,

    /// Port the HTTP server binds to
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Point to start synchronizing from: 'origin' or '<slot>.<hash>'
    #[arg(long, value_name = "POINT")]
    pub since: Option<String>,

    /// Pattern selecting outputs to index (repeatable, logical OR)
    #[arg(long = "match", value_name = "PATTERN")]
    pub matches: Vec<String>,

    /// Remove spent inputs once they fall beyond the rollback horizon
    #[arg(long)]
    pub prune_utxo: bool,

    /// Seconds between garbage collection passes
    #[arg(long, value_name = "SECONDS", default_value_t = DEFAULT_GC_INTERVAL_SECS)]
    pub gc_interval: u64,

    /// Size of the HTTP task pool (minimum 10)
    #[arg(long, value_name = "INT", default_value_t = DEFAULT_MAX_CONCURRENCY)]
    pub max_concurrency: u32,

    /// Skip secondary index installation for a faster first synchronization
    #[arg(long)]
    pub defer_db_indexes: bool,

    /// Minimal severity of the global logger
    #[arg(long, value_name = "SEVERITY", value_enum, ignore_case = true, default_value_t = Severity::Info)]
    pub log_level: Severity,

    /// Minimal severity of the chain consumer logger
    #[arg(long, value_name = "SEVERITY", value_enum, ignore_case = true)]
    pub log_level_consumer: Option<Severity>,

    /// Minimal severity of the database logger
    #[arg(long, value_name = "SEVERITY", value_enum, ignore_case = true)]
    pub log_level_db: Option<Severity>,

    /// Minimal severity of the HTTP server logger
    #[arg(long, value_name = "SEVERITY", value_enum, ignore_case = true)]
    pub log_level_http: Option<Severity>,

    /// Minimal severity of the garbage collector logger
    #[arg(long, value_name = "SEVERITY", value_enum, ignore_case = true)]
    pub log_level_gc: Option<Severity>,
}

/// Log severities, mapped onto tracing levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Severity {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Off,
}

impl Severity {
    fn directive(self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info | Severity::Notice => "info",
            Severity::Warning => "warn",
            Severity::Error => "error",
            Severity::Off => "off",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.directive())
    }
}

impl RunArgs {
    /// Resolve and validate into a runtime configuration.
    pub fn into_config(self) -> Result<Config, ConfigError> {
        if self.node_socket.is_some() || self.node_config.is_some() {
            return Err(ConfigError::hint(
                "this build speaks to the node through an Ogmios JSON-RPC bridge; \
                 use --ogmios-host and --ogmios-port instead of --node-socket/--node-config",
            ));
        }
        let producer = match (self.ogmios_host.as_deref(), self.ogmios_port) {
            (Some(host), Some(port)) => ProducerConfig::Ogmios {
                host: host.to_string(),
                port,
            },
            _ => {
                return Err(ConfigError::hint(
                    "no producer configured; provide both --ogmios-host and --ogmios-port",
                ))
            }
        };

        let database = match (self.workdir, self.in_memory) {
            (Some(dir), false) => DatabaseLocation::Dir(dir),
            (None, true) => DatabaseLocation::InMemory,
            _ => {
                return Err(ConfigError::hint(
                    "no database location; provide --workdir or --in-memory",
                ))
            }
        };

        let since = self
            .since
            .as_deref()
            .map(|text| {
                text.parse::<Point>().map_err(|_| {
                    ConfigError::hint(format!(
                        "malformed --since '{}'; expected 'origin' or '<slot>.<hash>'",
                        text
                    ))
                })
            })
            .transpose()?;

        let patterns = self
            .matches
            .iter()
            .map(|text| {
                text.parse::<Pattern>().map_err(|_| {
                    ConfigError::hint(format!("invalid --match pattern '{}'", text))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let config = Config {
            producer,
            database,
            host: self.host,
            port: self.port,
            since,
            patterns,
            input_management: if self.prune_utxo {
                InputManagementMode::RemoveSpentInputs
            } else {
                InputManagementMode::MarkSpentInputs
            },
            gc_interval: Duration::from_secs(self.gc_interval),
            max_concurrency: self.max_concurrency,
            defer_indexes: self.defer_db_indexes,
            longest_rollback: DEFAULT_LONGEST_ROLLBACK,
        };
        config.validate()?;
        Ok(config)
    }

    /// Build the tracing filter directives from the log-level flags.
    pub fn tracing_directives(&self) -> String {
        let mut directives = vec![self.log_level.directive().to_string()];
        for (target, level) in [
            ("kupo::consumer", self.log_level_consumer),
            ("kupo::db", self.log_level_db),
            ("kupo::api", self.log_level_http),
            ("kupo::gc", self.log_level_gc),
        ] {
            if let Some(level) = level {
                directives.push(format!("{}={}", target, level.directive()));
            }
        }
        directives.join(",")
    }
}
