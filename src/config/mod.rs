//! Process configuration.
//!
//! Every option can be given as a flag or through the environment, so the
//! service runs unchanged under a container runtime that only sets env vars.

mod logging;

pub use logging::{LogFormat, LoggingConfig};

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Args;

use crate::consts::{
    DEFAULT_ENGINE_BIN, DEFAULT_PORT, DEFAULT_QUERY_TIMEOUT, DEFAULT_RATE_LIMIT_CAPACITY,
    DEFAULT_RATE_LIMIT_REFILL, DEFAULT_RESTART_DELAY,
};

/// HTTP listener.
#[derive(Debug, Clone, Args)]
pub struct HttpConfig {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address to bind
    #[arg(long, env = "BIND_ADDR", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind_addr: IpAddr,
}

impl HttpConfig {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

/// Connection to the indicator store.
#[derive(Clone, Args)]
pub struct DbConfig {
    #[arg(long = "db-host", env = "DB_HOST", default_value = "localhost")]
    pub host: String,

    #[arg(id = "db_port", long = "db-port", env = "DB_PORT", default_value_t = 5432)]
    pub port: u16,

    #[arg(long = "db-user", env = "DB_USER", default_value = "postgres")]
    pub user: String,

    #[arg(long = "db-password", env = "DB_PASSWORD", default_value = "", hide_env_values = true)]
    pub password: String,

    #[arg(long = "db-name", env = "DB_NAME", default_value = "postgres")]
    pub name: String,

    #[arg(long = "db-sslmode", env = "DB_SSLMODE", default_value = "disable")]
    pub sslmode: String,

    /// Read indicators from this SQLite file instead of PostgreSQL
    #[arg(long = "db-sqlite-path", env = "DB_SQLITE_PATH")]
    pub sqlite_path: Option<PathBuf>,
}

impl DbConfig {
    /// libpq-style connection string. Values are single-quoted so that
    /// spaces or quotes in a password survive.
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={} sslmode={}",
            quote_conn_value(&self.host),
            self.port,
            quote_conn_value(&self.user),
            quote_conn_value(&self.password),
            quote_conn_value(&self.name),
            quote_conn_value(&self.sslmode),
        )
    }
}

// Hand-written so the password never ends up in a log line.
impl std::fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .field("sslmode", &self.sslmode)
            .field("sqlite_path", &self.sqlite_path)
            .finish()
    }
}

fn quote_conn_value(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}

/// The engine binary and its restart policy.
#[derive(Debug, Clone, Args)]
pub struct EngineConfig {
    /// Path to the engine executable
    #[arg(long = "engine-bin", env = "ENGINE_BIN", default_value = DEFAULT_ENGINE_BIN)]
    pub program: PathBuf,

    /// Extra arguments for the engine (space separated)
    #[arg(long = "engine-args", env = "ENGINE_ARGS", value_delimiter = ' ', allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Seconds to wait before restarting an exited engine
    #[arg(long = "engine-restart-delay-secs", env = "ENGINE_RESTART_DELAY_SECS",
          default_value_t = DEFAULT_RESTART_DELAY.as_secs())]
    pub restart_delay_secs: u64,

    /// Upper bound on one query round trip, in milliseconds
    #[arg(long = "engine-query-timeout-ms", env = "ENGINE_QUERY_TIMEOUT_MS",
          default_value_t = DEFAULT_QUERY_TIMEOUT.as_millis() as u64)]
    pub query_timeout_ms: u64,
}

impl EngineConfig {
    /// Run `program` with the default timings.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            restart_delay_secs: DEFAULT_RESTART_DELAY.as_secs(),
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT.as_millis() as u64,
        }
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs(self.restart_delay_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

/// Admission limiter.
#[derive(Debug, Clone, Args)]
pub struct LimiterConfig {
    /// Token bucket capacity
    #[arg(long = "rate-limit-capacity", env = "RATE_LIMIT_CAPACITY",
          default_value_t = DEFAULT_RATE_LIMIT_CAPACITY)]
    pub capacity: u32,

    /// Milliseconds between token refills
    #[arg(long = "rate-limit-refill-ms", env = "RATE_LIMIT_REFILL_MS",
          default_value_t = DEFAULT_RATE_LIMIT_REFILL.as_millis() as u64)]
    pub refill_ms: u64,
}

impl LimiterConfig {
    pub fn refill_period(&self) -> Duration {
        Duration::from_millis(self.refill_ms)
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_RATE_LIMIT_CAPACITY,
            refill_ms: DEFAULT_RATE_LIMIT_REFILL.as_millis() as u64,
        }
    }
}

/// Everything the gateway process needs.
#[derive(Debug, Clone, Args)]
pub struct GatewayConfig {
    #[command(flatten)]
    pub http: HttpConfig,

    #[command(flatten)]
    pub db: DbConfig,

    #[command(flatten)]
    pub engine: EngineConfig,

    #[command(flatten)]
    pub limiter: LimiterConfig,

    #[command(flatten)]
    pub logging: LoggingConfig,
}

impl GatewayConfig {
    /// Reject settings that would make the service unusable.
    pub fn validate(&self) -> Result<()> {
        if self.limiter.capacity == 0 {
            bail!("rate limit capacity must be at least 1");
        }
        if self.limiter.refill_ms == 0 {
            bail!("rate limit refill period must be non-zero");
        }
        if self.engine.query_timeout_ms == 0 {
            bail!("engine query timeout must be non-zero");
        }
        if self.engine.program.as_os_str().is_empty() {
            bail!("engine binary path is empty");
        }
        Ok(())
    }
}
