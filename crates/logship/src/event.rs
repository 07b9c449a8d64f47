// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde_json::{Map, Value};

/// Document body of an event.
pub type Fields = Map<String, Value>;

/// One normalized log record, ready to be indexed.
///
/// Events are built by the decoder and never modified afterwards; the
/// delivery worker only borrows them.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    target_index: String,
    target_type: String,
    fields: Fields,
}

impl Event {
    #[must_use]
    pub fn new(target_index: String, target_type: String, fields: Fields) -> Self {
        Event {
            target_index,
            target_type,
            fields,
        }
    }

    #[must_use]
    pub fn target_index(&self) -> &str {
        &self.target_index
    }

    #[must_use]
    pub fn target_type(&self) -> &str {
        &self.target_type
    }

    #[must_use]
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Request path on the backend: `/<index>/<type>`.
    #[must_use]
    pub fn path(&self) -> String {
        format!("/{}/{}", self.target_index, self.target_type)
    }
}
