// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::listener::DEFAULT_LISTEN_ADDR;
use crate::queue::DEFAULT_CAPACITY;
use crate::shipper::DEFAULT_BACKEND_ADDR;

pub const LISTEN_ADDR_ENV: &str = "LISTEN_ADDR";
pub const BACKEND_ADDR_ENV: &str = "ELASTICSEARCH_ADDR";
pub const QUEUE_SIZE_ENV: &str = "QUEUE_SIZE";
pub const REQUEST_TIMEOUT_ENV: &str = "REQUEST_TIMEOUT_SECS";
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

pub const DEFAULT_LOG_LEVEL: &str = "info";
const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Settings of the shipping daemon.
///
/// Values start at the built-in defaults, are replaced by command-line
/// flags, and finally by any non-empty environment variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// UDP `host:port` to receive datagrams on
    pub listen_addr: String,
    /// Backend `host:port`, without scheme
    pub backend_addr: String,
    pub queue_capacity: usize,
    /// `None` waits on the backend forever
    pub request_timeout: Option<Duration>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            backend_addr: DEFAULT_BACKEND_ADDR.to_string(),
            queue_capacity: DEFAULT_CAPACITY,
            request_timeout: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Config {
    /// Applies overrides from the process environment.
    pub fn apply_process_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_overrides(|key| env::var(key).ok())
    }

    /// Applies overrides from `lookup`. Unset and empty variables are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(addr) = get(LISTEN_ADDR_ENV) {
            self.listen_addr = addr;
        }
        if let Some(addr) = get(BACKEND_ADDR_ENV) {
            self.backend_addr = addr;
        }
        if let Some(size) = get(QUEUE_SIZE_ENV) {
            self.queue_capacity = parse_env(QUEUE_SIZE_ENV, &size)?;
        }
        if let Some(secs) = get(REQUEST_TIMEOUT_ENV) {
            let secs = parse_env(REQUEST_TIMEOUT_ENV, &secs)?;
            self.request_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(level) = get(LOG_LEVEL_ENV) {
            self.log_level = level.to_lowercase();
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !has_port(&self.listen_addr) {
            return Err(ConfigError::InvalidListenAddr(self.listen_addr.clone()));
        }

        if self.backend_addr.trim().is_empty() || self.backend_addr.contains("://") {
            return Err(ConfigError::InvalidBackendAddr(self.backend_addr.clone()));
        }

        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }

        if self.request_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::ZeroRequestTimeout);
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.log_level.clone()));
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnvValue {
            key: key.to_string(),
            value: value.to_string(),
        })
}

// "[::1]:5000", "localhost:5000" and ":5000" (all interfaces) all qualify
fn has_port(addr: &str) -> bool {
    addr.rsplit_once(':')
        .is_some_and(|(_, port)| port.parse::<u16>().is_ok())
}
