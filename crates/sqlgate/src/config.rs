//! Runtime settings.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::pagination::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, PageLimits};
use crate::{Error, Result};

pub const DEFAULT_STATEMENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Executor settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Page size used when a request asks for none.
    pub default_page_size: i64,

    /// Requested page sizes above this are clamped.
    pub max_page_size: i64,

    /// Upper bound on a single database round trip.
    pub statement_timeout: Duration,

    /// Register models on first use instead of failing with `NotRegistered`.
    pub lazy_registration: bool,

    /// Treat an update that matches nothing as an error.
    pub reject_zero_rows_updated: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            statement_timeout: DEFAULT_STATEMENT_TIMEOUT,
            lazy_registration: false,
            reject_zero_rows_updated: false,
        }
    }
}

impl Config {
    /// Load from `SQLGATE_*` variables, reading `.env` first if present.
    ///
    /// | variable                            | default |
    /// |-------------------------------------|---------|
    /// | `SQLGATE_DEFAULT_PAGE_SIZE`         | 10      |
    /// | `SQLGATE_MAX_PAGE_SIZE`             | 100     |
    /// | `SQLGATE_STATEMENT_TIMEOUT_MS`      | 30000   |
    /// | `SQLGATE_LAZY_REGISTRATION`         | false   |
    /// | `SQLGATE_REJECT_ZERO_ROWS_UPDATED`  | false   |
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            default_page_size: parse(&lookup, "SQLGATE_DEFAULT_PAGE_SIZE")?
                .unwrap_or(defaults.default_page_size),
            max_page_size: parse(&lookup, "SQLGATE_MAX_PAGE_SIZE")?
                .unwrap_or(defaults.max_page_size),
            statement_timeout: parse(&lookup, "SQLGATE_STATEMENT_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.statement_timeout),
            lazy_registration: parse(&lookup, "SQLGATE_LAZY_REGISTRATION")?
                .unwrap_or(defaults.lazy_registration),
            reject_zero_rows_updated: parse(&lookup, "SQLGATE_REJECT_ZERO_ROWS_UPDATED")?
                .unwrap_or(defaults.reject_zero_rows_updated),
        };
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        if self.default_page_size < 1 {
            return Err(Error::Config(format!(
                "default page size must be at least 1, got {}",
                self.default_page_size
            )));
        }
        if self.max_page_size < self.default_page_size {
            return Err(Error::Config(format!(
                "max page size {} is below the default page size {}",
                self.max_page_size, self.default_page_size
            )));
        }
        if self.statement_timeout.is_zero() {
            return Err(Error::Config("statement timeout must be non-zero".into()));
        }
        Ok(())
    }

    pub fn page_limits(&self) -> PageLimits {
        PageLimits {
            default_page_size: self.default_page_size,
            max_page_size: self.max_page_size,
        }
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse()
        .map(Some)
        .map_err(|e| Error::Config(format!("{key}={raw:?}: {e}")))
}
