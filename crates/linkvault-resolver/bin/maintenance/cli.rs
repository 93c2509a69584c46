use clap::{Parser, ValueEnum};
use std::fmt::{Display, Formatter};

pub const MYSQL_DSN_ENV: &str = "LINKVAULT_MYSQL_DSN";
pub const REDIS_URL_ENV: &str = "LINKVAULT_REDIS_URL";
pub const FILTER_KEY_ENV: &str = "LINKVAULT_FILTER_KEY";
pub const FILTER_BITS_ENV: &str = "LINKVAULT_FILTER_BITS";
pub const FILTER_HASHES_ENV: &str = "LINKVAULT_FILTER_HASHES";
pub const INTERVAL_SECS_ENV: &str = "LINKVAULT_MAINTENANCE_INTERVAL_SECS";
pub const TIMEOUT_SECS_ENV: &str = "LINKVAULT_MAINTENANCE_TIMEOUT_SECS";
pub const LOG_FORMAT_ENV: &str = "LINKVAULT_LOG_FORMAT";

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_FILTER_KEY: &str = "linkvault:bloom";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    #[value(name = "text")]
    Text,
    #[value(name = "json")]
    Json,
}

impl Display for LogFormatArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormatArg::Text => write!(f, "text"),
            LogFormatArg::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "linkvault-maintenance")]
pub struct CLI {
    #[arg(long, env = MYSQL_DSN_ENV)]
    pub mysql_dsn: String,

    #[arg(long, env = REDIS_URL_ENV, default_value = DEFAULT_REDIS_URL)]
    pub redis_url: String,

    #[arg(long, env = FILTER_KEY_ENV, default_value = DEFAULT_FILTER_KEY)]
    pub filter_key: String,

    #[arg(long, env = FILTER_BITS_ENV, default_value_t = 1_000_000)]
    pub filter_bits: u64,

    #[arg(long, env = FILTER_HASHES_ENV, default_value_t = 7)]
    pub filter_hashes: u32,

    /// Seconds between two maintenance passes.
    #[arg(long, env = INTERVAL_SECS_ENV, default_value_t = 3600)]
    pub interval_secs: u64,

    /// Upper bound of one pass in seconds.
    #[arg(long, env = TIMEOUT_SECS_ENV, default_value_t = 300)]
    pub timeout_secs: u64,

    /// Create missing shard tables before starting.
    #[arg(long)]
    pub migrate: bool,

    /// Run a single pass and exit.
    #[arg(long)]
    pub once: bool,

    #[arg(
        long,
        env = LOG_FORMAT_ENV,
        value_enum,
        default_value_t = LogFormatArg::Text
    )]
    pub log_format: LogFormatArg,
}
