use crate::adapters::nexus::Credentials;
use crate::utils::error::{ConstructorError, Result};
use crate::utils::validation::{validate_non_empty_string, Validate};
use std::env;
use std::time::Duration;

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 10;
pub const DEFAULT_RETRY_DELAY_SECONDS: u64 = 5;
pub const DEFAULT_PROBE_TIMEOUT_SECONDS: u64 = 5;
pub const DEFAULT_LOCAL_HOST: &str = "localhost";
/// Nexus proxy repository the pip traffic goes through.
pub const DEFAULT_PIP_REPOSITORY: &str = "cachito-pip-proxy";

/// Tuning for service discovery and the repository-manager proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorSettings {
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    /// Upper bound for each health or credential request of an attempt.
    pub probe_timeout: Duration,
    /// Host substituted into `local_url`, as seen from the machine running us.
    pub local_host: String,
    pub credentials: Credentials,
    pub pip_repository: String,
}

impl Default for LocatorSettings {
    fn default() -> Self {
        Self {
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECONDS),
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECONDS),
            local_host: DEFAULT_LOCAL_HOST.to_string(),
            credentials: Credentials::default(),
            pip_repository: DEFAULT_PIP_REPOSITORY.to_string(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            ConstructorError::validation(name, format!("'{}' is not a valid number", raw))
        }),
        Err(_) => Ok(default),
    }
}

impl LocatorSettings {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            retry_attempts: parse_env("CONSTRUCTOR_RETRY_ATTEMPTS", DEFAULT_RETRY_ATTEMPTS)?,
            retry_delay: Duration::from_secs(parse_env(
                "CONSTRUCTOR_RETRY_DELAY_SECONDS",
                DEFAULT_RETRY_DELAY_SECONDS,
            )?),
            probe_timeout: Duration::from_secs(parse_env(
                "CONSTRUCTOR_PROBE_TIMEOUT_SECONDS",
                DEFAULT_PROBE_TIMEOUT_SECONDS,
            )?),
            local_host: env::var("CONSTRUCTOR_LOCAL_HOST").unwrap_or(defaults.local_host),
            credentials: Credentials {
                user: env::var("NEXUS_USER").unwrap_or(defaults.credentials.user),
                password: env::var("NEXUS_PASS").unwrap_or(defaults.credentials.password),
            },
            pip_repository: env::var("CONSTRUCTOR_PIP_REPOSITORY")
                .unwrap_or(defaults.pip_repository),
        })
    }
}

impl Validate for LocatorSettings {
    fn validate(&self) -> Result<()> {
        if self.retry_attempts == 0 {
            return Err(ConstructorError::validation(
                "CONSTRUCTOR_RETRY_ATTEMPTS",
                "at least one attempt is required",
            ));
        }
        if self.probe_timeout.is_zero() {
            return Err(ConstructorError::validation(
                "CONSTRUCTOR_PROBE_TIMEOUT_SECONDS",
                "timeout must be at least one second",
            ));
        }
        validate_non_empty_string("CONSTRUCTOR_LOCAL_HOST", &self.local_host)?;
        validate_non_empty_string("NEXUS_USER", &self.credentials.user)?;
        validate_non_empty_string("CONSTRUCTOR_PIP_REPOSITORY", &self.pip_repository)
    }
}
