//! Connection settings applied to every physical connection.

use super::ConfigError;
use std::str::FromStr;
use std::time::Duration;

/// A single tunable connection setting, addressable by environment variable
/// or by its key in the instance JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Setting {
    MaxOpenConns,
    MaxIdleConns,
    ConnMaxLifetime,
    ConnMaxIdleTime,
    RetryCount,
    RetryBackoff,
    MaxRetryDuration,
    QueryTimeout,
    MaxRows,
}

impl Setting {
    pub(crate) const fn env_var(self) -> &'static str {
        match self {
            Self::MaxOpenConns => "LAKEGLASS_DB_MAX_OPEN_CONNS",
            Self::MaxIdleConns => "LAKEGLASS_DB_MAX_IDLE_CONNS",
            Self::ConnMaxLifetime => "LAKEGLASS_DB_CONN_MAX_LIFETIME_SECS",
            Self::ConnMaxIdleTime => "LAKEGLASS_DB_CONN_MAX_IDLE_TIME_SECS",
            Self::RetryCount => "LAKEGLASS_DB_RETRY_COUNT",
            Self::RetryBackoff => "LAKEGLASS_DB_RETRY_BACKOFF_MS",
            Self::MaxRetryDuration => "LAKEGLASS_DB_MAX_RETRY_DURATION_SECS",
            Self::QueryTimeout => "LAKEGLASS_DB_QUERY_TIMEOUT_SECS",
            Self::MaxRows => "LAKEGLASS_DB_MAX_ROWS",
        }
    }

    pub(crate) const fn json_key(self) -> &'static str {
        match self {
            Self::MaxOpenConns => "maxOpenConns",
            Self::MaxIdleConns => "maxIdleConns",
            Self::ConnMaxLifetime => "connMaxLifetime",
            Self::ConnMaxIdleTime => "connMaxIdleTime",
            Self::RetryCount => "retryCount",
            Self::RetryBackoff => "retryBackoffMs",
            Self::MaxRetryDuration => "maxRetryDuration",
            Self::QueryTimeout => "queryTimeout",
            Self::MaxRows => "maxRows",
        }
    }
}

/// Limits and timeouts of the pooled connection.
///
/// Immutable once the datasource instance is built; every rebuilt connection
/// gets the same values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Maximum concurrent statements; `0` means unlimited.
    pub max_open_conns: usize,
    /// Maximum idle HTTP connections kept per host.
    pub max_idle_conns: usize,
    /// Age after which the connection pool is replaced, if any.
    pub conn_max_lifetime: Option<Duration>,
    /// Idle time after which pooled connections are closed, if any.
    pub conn_max_idle_time: Option<Duration>,
    /// Transport-level retries for throttled or unavailable responses.
    pub retry_count: u32,
    /// Base delay of the exponential transport backoff.
    pub retry_backoff: Duration,
    /// Upper bound on the total time spent in transport retries.
    pub max_retry_duration: Duration,
    /// Overall deadline of a single statement, if any.
    pub query_timeout: Option<Duration>,
    /// Maximum rows returned by a statement.
    pub max_rows: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            max_open_conns: 0,
            max_idle_conns: 2,
            conn_max_lifetime: None,
            conn_max_idle_time: Some(Duration::from_secs(6 * 60 * 60)),
            retry_count: 4,
            retry_backoff: Duration::from_secs(1),
            max_retry_duration: Duration::from_secs(60),
            query_timeout: None,
            max_rows: 100_000,
        }
    }
}

impl ConnectionSettings {
    /// Loads settings from `LAKEGLASS_DB_*` environment variables, falling
    /// back to the defaults for unset ones.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSetting`] if a variable is set but not a
    /// non-negative integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(|setting| std::env::var(setting.env_var()).ok())
    }

    /// Loads settings from the instance `jsonData` object. Values may be JSON
    /// numbers or numeric strings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSetting`] if a value is not a
    /// non-negative integer.
    pub fn from_json(json_data: &serde_json::Value) -> Result<Self, ConfigError> {
        Self::from_source(|setting| super::json_string(json_data, setting.json_key()))
    }

    pub(crate) fn from_source<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(Setting) -> Option<String>,
    {
        let defaults = Self::default();
        let secs = |setting: Setting| {
            parse::<u64>(&get, setting).map(|v| v.map(Duration::from_secs))
        };
        // Zero disables an optional limit.
        let optional_secs = |setting: Setting, default: Option<Duration>| {
            secs(setting).map(|v| v.map_or(default, |d| (!d.is_zero()).then_some(d)))
        };

        Ok(Self {
            max_open_conns: parse(&get, Setting::MaxOpenConns)?.unwrap_or(defaults.max_open_conns),
            max_idle_conns: parse(&get, Setting::MaxIdleConns)?.unwrap_or(defaults.max_idle_conns),
            conn_max_lifetime: optional_secs(Setting::ConnMaxLifetime, defaults.conn_max_lifetime)?,
            conn_max_idle_time: optional_secs(
                Setting::ConnMaxIdleTime,
                defaults.conn_max_idle_time,
            )?,
            retry_count: parse(&get, Setting::RetryCount)?.unwrap_or(defaults.retry_count),
            retry_backoff: parse::<u64>(&get, Setting::RetryBackoff)?
                .map_or(defaults.retry_backoff, Duration::from_millis),
            max_retry_duration: secs(Setting::MaxRetryDuration)?
                .unwrap_or(defaults.max_retry_duration),
            query_timeout: optional_secs(Setting::QueryTimeout, defaults.query_timeout)?,
            max_rows: parse(&get, Setting::MaxRows)?.unwrap_or(defaults.max_rows),
        })
    }
}

fn parse<T: FromStr>(
    get: &impl Fn(Setting) -> Option<String>,
    setting: Setting,
) -> Result<Option<T>, ConfigError> {
    let Some(raw) = get(setting) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse().map(Some).map_err(|_| ConfigError::InvalidSetting {
        name: setting.json_key().to_string(),
        value: raw.to_string(),
    })
}
