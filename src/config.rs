//! Store connection configuration

use std::env;
use std::time::Duration;

/// Connection settings for the backing key-value store
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Server host (default: "localhost")
    pub host: String,

    /// Server port (default: 6379)
    pub port: u16,

    /// Password (default: None)
    pub password: Option<String>,

    /// Logical database index (default: 0)
    pub db: i64,

    /// Backoff applied while establishing and re-establishing the connection
    pub retry: RetryPolicy,
}

/// Bounded exponential backoff for connection attempts
///
/// Retrying stops at whichever comes first: `max_attempts` failed attempts
/// or `max_elapsed` since the first attempt started, counting both the time
/// spent inside attempts and the delays between them.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry (default: 100ms)
    pub base_delay: Duration,

    /// Upper bound on a single delay (default: 3s)
    pub max_delay: Duration,

    /// Maximum number of connection attempts (default: 10)
    pub max_attempts: u32,

    /// Maximum total time for connecting, attempts included (default: 1 hour)
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(3),
            max_attempts: 10,
            max_elapsed: Duration::from_secs(60 * 60),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        let delay = self.base_delay.saturating_mul(1u32 << shift);
        delay.min(self.max_delay)
    }

    /// Whether another attempt is allowed after `attempt` failures, with
    /// `elapsed` measured from the start of the first attempt
    pub fn should_retry(&self, attempt: u32, elapsed: Duration) -> bool {
        attempt < self.max_attempts
            && elapsed.saturating_add(self.delay_for(attempt)) <= self.max_elapsed
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            db: 0,
            retry: RetryPolicy::default(),
        }
    }
}

impl StoreConfig {
    /// Create a configuration for the given host and port
    pub fn new<S: Into<String>>(host: S, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// - `REDIS_HOST` (default: localhost)
    /// - `REDIS_PORT` (default: 6379)
    /// - `REDIS_PASSWORD` (default: none)
    /// - `REDIS_DB` (default: 0)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env::var("REDIS_HOST").unwrap_or(defaults.host),
            port: env::var("REDIS_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            password: env::var("REDIS_PASSWORD").ok().filter(|p| !p.is_empty()),
            db: env::var("REDIS_DB")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.db),
            retry: defaults.retry,
        }
    }

    /// Set the host
    pub fn with_host<S: Into<String>>(mut self, host: S) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the password
    pub fn with_password<S: Into<String>>(mut self, password: S) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the database index
    pub fn with_db(mut self, db: i64) -> Self {
        self.db = db;
        self
    }

    /// Set the connection retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Connection URL in `redis://[:password@]host:port/db` form
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                urlencoding::encode(password),
                self.host,
                self.port,
                self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}
