// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The delivery worker: the single consumer of the event queue.
//!
//! Events are shipped one at a time in queue order. Every failure is logged
//! and the event dropped; there is no retry and no requeue, so one bad event
//! never holds up the ones behind it.

use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::errors::ShippingError;
use crate::event::Event;
use crate::queue::QueueReceiver;
use crate::shipper::Shipper;

pub struct DeliveryWorker<S> {
    shipper: S,
    receiver: QueueReceiver,
    cancel_token: CancellationToken,
}

impl<S: Shipper> DeliveryWorker<S> {
    #[must_use]
    pub fn new(shipper: S, receiver: QueueReceiver, cancel_token: CancellationToken) -> Self {
        DeliveryWorker {
            shipper,
            receiver,
            cancel_token,
        }
    }

    /// Pops and ships events until cancelled or until every producer is gone.
    ///
    /// Events still queued at cancellation are discarded.
    pub async fn spin(mut self) {
        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel_token.cancelled() => break,
                next = self.receiver.pop() => next,
            };
            let Some(event) = next else {
                debug!("event queue closed, delivery worker exiting");
                break;
            };
            self.deliver(&event).await;
        }
        debug!("delivery worker stopped");
    }

    /// Ships one event and logs the outcome.
    async fn deliver(&self, event: &Event) {
        match self.shipper.ship(event).await {
            Ok(()) => debug!("indexed event into {}", event.target_index()),
            Err(e) => report_failure(event, &e),
        }
    }
}

fn report_failure(event: &Event, error: &ShippingError) {
    error!("dropping event for {}: {}", event.target_index(), error);
}
