// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of single events to the indexing backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use tracing::{debug, trace};

use crate::errors::{ClientError, ResponseBody, ShippingError};
use crate::event::Event;

pub const DEFAULT_BACKEND_ADDR: &str = "127.0.0.1:9200";

#[async_trait]
pub trait Shipper: Send + Sync {
    /// Sends one event to the backend. No retries: a failed event is lost.
    async fn ship(&self, event: &Event) -> Result<(), ShippingError>;
}

/// Posts each event as a JSON document to `http://<backend>/<index>/<type>`.
#[derive(Debug, Clone)]
pub struct HttpShipper {
    client: reqwest::Client,
    backend_addr: String,
}

impl HttpShipper {
    /// Builds the shipper. Without a `timeout` a hung backend blocks delivery
    /// indefinitely, which in turn backs up the queue and the listener.
    pub fn new(backend_addr: &str, timeout: Option<Duration>) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(HttpShipper {
            client,
            backend_addr: backend_addr.to_string(),
        })
    }

    #[must_use]
    pub fn endpoint(&self, event: &Event) -> String {
        format!("http://{}{}", self.backend_addr, event.path())
    }
}

#[async_trait]
impl Shipper for HttpShipper {
    async fn ship(&self, event: &Event) -> Result<(), ShippingError> {
        let body = serde_json::to_vec(event.fields()).map_err(ShippingError::Payload)?;
        let url = self.endpoint(event);
        trace!("POST {} ({} bytes)", url, body.len());

        let resp = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(ShippingError::Transport)?;

        let status = resp.status();
        // Read the whole body on every path so the connection goes back to the pool
        let bytes = resp.bytes().await;

        if status == StatusCode::CREATED {
            if let Err(e) = bytes {
                debug!("unable to read response body from {}: {}", url, e);
            }
            return Ok(());
        }

        let body = match bytes {
            Ok(bytes) => ResponseBody::decode(&bytes),
            Err(e) => ResponseBody::Undecodable(e.to_string()),
        };
        Err(ShippingError::UnexpectedStatus { status, body })
    }
}
