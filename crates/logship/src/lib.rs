// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # logship
//!
//! Receives log events over UDP, normalizes them into JSON documents and
//! forwards them to an Elasticsearch-compatible backend.
//!
//! ```text
//!   datagram ─▶ Listener ─▶ Decoder ─push─▶ Queue ─pop─▶ DeliveryWorker ─POST─▶ backend
//! ```
//!
//! The listener (with the decoder inline) and the delivery worker run as two
//! concurrent tasks joined only by the bounded [`queue`]. Delivery is strictly
//! sequential and in enqueue order. Failed events are logged and dropped.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod decoder;
pub mod errors;
pub mod event;
pub mod listener;
pub mod queue;
pub mod shipper;
pub mod worker;
