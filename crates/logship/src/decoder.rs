// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Turns raw datagrams into [`Event`]s and queues them for delivery.
//!
//! A datagram holding a JSON object becomes the document as-is. Anything else
//! is wrapped as `{"message": <text>}`. Either way the decoder stamps the
//! `host`, `@timestamp` and `@version` fields, overwriting any value the
//! sender supplied, and targets the daily `logstash-YYYY.MM.DD` index.

use std::net::SocketAddr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::errors::QueueError;
use crate::event::{Event, Fields};
use crate::queue::QueueHandle;

pub const MESSAGE_FIELD: &str = "message";
pub const HOST_FIELD: &str = "host";
pub const TIMESTAMP_FIELD: &str = "@timestamp";
pub const VERSION_FIELD: &str = "@version";
pub const SCHEMA_VERSION: u64 = 1;
pub const INDEX_PREFIX: &str = "logstash-";
pub const DOCUMENT_TYPE: &str = "logs";

pub type Clock = fn() -> DateTime<Utc>;

/// Builds the event for one datagram received from `host` at `now`.
#[must_use]
pub fn normalize(host: &str, buf: &[u8], now: DateTime<Utc>) -> Event {
    // `null` is accepted and yields an empty document
    let mut fields = match serde_json::from_slice::<Option<Fields>>(buf) {
        Ok(decoded) => decoded.unwrap_or_default(),
        Err(_) => {
            let mut fields = Fields::new();
            fields.insert(
                MESSAGE_FIELD.to_string(),
                Value::String(String::from_utf8_lossy(buf).into_owned()),
            );
            fields
        }
    };

    fields.insert(HOST_FIELD.to_string(), Value::String(host.to_string()));
    fields.insert(
        TIMESTAMP_FIELD.to_string(),
        Value::String(now.to_rfc3339_opts(SecondsFormat::Secs, true)),
    );
    fields.insert(VERSION_FIELD.to_string(), Value::from(SCHEMA_VERSION));

    Event::new(index_name(now), DOCUMENT_TYPE.to_string(), fields)
}

/// Daily index name, e.g. `logstash-2024.01.01`.
#[must_use]
pub fn index_name(now: DateTime<Utc>) -> String {
    format!("{INDEX_PREFIX}{}", now.format("%Y.%m.%d"))
}

/// Host part of a peer address, without the port. IPv6 addresses are kept whole.
///
/// IPv4 peers seen through a dual-stack socket (`::ffff:a.b.c.d`) are reported
/// as plain `a.b.c.d`.
#[must_use]
pub fn peer_host(addr: &SocketAddr) -> String {
    addr.ip().to_canonical().to_string()
}

/// Normalizes datagrams and pushes the resulting events onto the queue.
#[derive(Clone, Debug)]
pub struct Decoder {
    queue: QueueHandle,
    clock: Clock,
}

impl Decoder {
    #[must_use]
    pub fn new(queue: QueueHandle) -> Self {
        Self::with_clock(queue, Utc::now)
    }

    #[must_use]
    pub fn with_clock(queue: QueueHandle, clock: Clock) -> Self {
        Decoder { queue, clock }
    }

    /// Decodes one datagram and enqueues it, waiting while the queue is full.
    pub async fn decode(&self, host: &str, buf: &[u8]) -> Result<(), QueueError> {
        let event = normalize(host, buf, (self.clock)());
        self.queue.push(event).await
    }
}
