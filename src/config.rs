use std::path::PathBuf;
use std::time::Duration;

use crate::audit::{AuditConfig, SinkTarget, MAX_CAPACITY};
use crate::authz::DEFAULT_POLICY_VERSION;
use crate::errors::{ConfigError, ConfigResult};

pub const POLICY_VERSION_VAR: &str = "AUTHZ_POLICY_VERSION";
pub const AUDIT_SINK_VAR: &str = "AUTHZ_AUDIT_SINK";
pub const AUDIT_CAPACITY_VAR: &str = "AUTHZ_AUDIT_CAPACITY";
pub const AUDIT_MAX_ATTEMPTS_VAR: &str = "AUTHZ_AUDIT_MAX_ATTEMPTS";
pub const AUDIT_SHUTDOWN_TIMEOUT_VAR: &str = "AUTHZ_AUDIT_SHUTDOWN_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthzConfig {
    pub policy_version: String,
    pub audit_sink: SinkTarget,
    pub audit: AuditConfig,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            policy_version: DEFAULT_POLICY_VERSION.to_string(),
            audit_sink: SinkTarget::Log,
            audit: AuditConfig::default(),
        }
    }
}

impl AuthzConfig {
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`AuthzConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let policy_version = lookup(POLICY_VERSION_VAR)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or(defaults.policy_version);

        let audit_sink = match lookup(AUDIT_SINK_VAR) {
            Some(value) => parse_sink(&value)?,
            None => defaults.audit_sink,
        };

        let capacity = parse_number::<usize>(&lookup, AUDIT_CAPACITY_VAR)?
            .unwrap_or(defaults.audit.capacity);
        if capacity == 0 || capacity > MAX_CAPACITY {
            return Err(ConfigError::invalid_setting(
                AUDIT_CAPACITY_VAR,
                capacity.to_string(),
            ));
        }

        let max_attempts = parse_number::<u32>(&lookup, AUDIT_MAX_ATTEMPTS_VAR)?
            .unwrap_or(defaults.audit.max_attempts)
            .max(1);

        let shutdown_timeout = parse_number::<u64>(&lookup, AUDIT_SHUTDOWN_TIMEOUT_VAR)?
            .map(Duration::from_millis)
            .unwrap_or(defaults.audit.shutdown_timeout);

        Ok(Self {
            policy_version,
            audit_sink,
            audit: AuditConfig {
                capacity,
                max_attempts,
                shutdown_timeout,
                ..defaults.audit
            },
        })
    }
}

fn parse_sink(value: &str) -> ConfigResult<SinkTarget> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("log") {
        return Ok(SinkTarget::Log);
    }
    match value.strip_prefix("file:") {
        Some(path) if !path.trim().is_empty() => Ok(SinkTarget::File(PathBuf::from(path.trim()))),
        _ => Err(ConfigError::invalid_setting(AUDIT_SINK_VAR, value)),
    }
}

fn parse_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> ConfigResult<Option<T>> {
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::invalid_setting(name, raw)),
        None => Ok(None),
    }
}
