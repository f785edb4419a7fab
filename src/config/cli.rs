use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

use crate::cache::SharedStorePolicy;

/// Command-line arguments for the hybrid-cache binary.
#[derive(Debug, Parser)]
#[command(
    name = "hybrid-cache",
    version,
    about = "Two-tier response cache server"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "HYBRID_CACHE_CONFIG_FILE",
        value_name = "PATH"
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
    /// Apply pending database migrations and exit.
    Migrate(MaintenanceArgs),
    /// Delete expired rows from the shared cache table and exit.
    Sweep(MaintenanceArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct MaintenanceArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Toggle the response cache.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Override how long memoized responses live.
    #[arg(long = "cache-response-ttl-seconds", value_name = "SECONDS")]
    pub cache_response_ttl_seconds: Option<u64>,

    /// Override the number of entries kept in the local tier.
    #[arg(long = "cache-local-capacity", value_name = "COUNT")]
    pub cache_local_capacity: Option<u64>,

    /// Override the largest response body that will be cached.
    #[arg(long = "cache-max-body-bytes", value_name = "BYTES")]
    pub cache_max_body_bytes: Option<u64>,

    /// Override the shared store failure policy (fail_fast|degrade).
    #[arg(long = "cache-shared-store-policy", value_name = "POLICY")]
    pub cache_shared_store_policy: Option<SharedStorePolicy>,

    /// Override how often expired shared entries are deleted.
    #[arg(long = "cache-sweep-interval-seconds", value_name = "SECONDS")]
    pub cache_sweep_interval_seconds: Option<u64>,
}
