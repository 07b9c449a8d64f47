// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for every stage of the pipeline.

use std::fmt;

use reqwest::StatusCode;

/// Invalid settings detected while resolving or validating [`crate::config::Config`].
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("listen address '{0}' must be in host:port form")]
    InvalidListenAddr(String),
    #[error("backend address '{0}' must be a non-empty host:port without a scheme")]
    InvalidBackendAddr(String),
    #[error("queue capacity must be greater than 0")]
    ZeroQueueCapacity,
    #[error("request timeout must be greater than 0 seconds")]
    ZeroRequestTimeout,
    #[error("invalid log level '{0}'. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),
    #[error("environment variable {key} has invalid value '{value}'")]
    InvalidEnvValue { key: String, value: String },
}

/// Startup failures of the UDP listener. These are fatal for the process.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("unable to resolve listen address {addr}: {source}")]
    Resolve {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("queue capacity must be greater than 0")]
    ZeroCapacity,
    /// The consuming side of the queue was dropped.
    #[error("event queue is closed")]
    Closed,
}

/// The HTTP client could not be set up. Fatal at startup.
#[derive(Debug, thiserror::Error)]
#[error("unable to build HTTP client: {0}")]
pub struct ClientError(#[from] pub reqwest::Error);

/// Why a single event could not be delivered. Every variant is recoverable:
/// the event is dropped and the worker moves on.
#[derive(Debug, thiserror::Error)]
pub enum ShippingError {
    #[error("invalid payload: {0}")]
    Payload(#[source] serde_json::Error),
    #[error("unable to write payload to backend: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("unexpected status code {status} for response: {body}")]
    UnexpectedStatus {
        status: StatusCode,
        body: ResponseBody,
    },
}

/// Body of a non-201 backend response, decoded on a best-effort basis.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(serde_json::Value),
    Undecodable(String),
}

impl ResponseBody {
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Self {
        match serde_json::from_slice(bytes) {
            Ok(value) => Self::Json(value),
            Err(e) => Self::Undecodable(e.to_string()),
        }
    }
}

impl fmt::Display for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(value) => write!(f, "{value}"),
            Self::Undecodable(reason) => write!(f, "unable to decode response body: {reason}"),
        }
    }
}
