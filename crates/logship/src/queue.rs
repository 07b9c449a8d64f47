// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded FIFO connecting the listener (producer) to the delivery worker (consumer).
//!
//! The queue is the only synchronization point of the pipeline. Producers
//! hold a cloneable [`QueueHandle`]; the single consumer owns the
//! [`QueueReceiver`].
//!
//! ```text
//!   Listener ──push──▶ [ e1 e2 e3 ... eN ] ──pop──▶ DeliveryWorker
//!                       (capacity N, FIFO)
//! ```
//!
//! A push on a full queue waits until the consumer frees a slot. That wait is
//! the pipeline's only backpressure: a stalled backend eventually stalls the
//! socket reads.

use tokio::sync::mpsc;

use crate::errors::QueueError;
use crate::event::Event;

pub const DEFAULT_CAPACITY: usize = 10_000;

/// Creates a bounded queue holding at most `capacity` events.
pub fn channel(capacity: usize) -> Result<(QueueHandle, QueueReceiver), QueueError> {
    if capacity == 0 {
        return Err(QueueError::ZeroCapacity);
    }
    let (tx, rx) = mpsc::channel(capacity);
    Ok((QueueHandle { tx }, QueueReceiver { rx }))
}

/// Producer side of the queue. Cheap to clone.
#[derive(Clone, Debug)]
pub struct QueueHandle {
    tx: mpsc::Sender<Event>,
}

impl QueueHandle {
    /// Appends an event, waiting while the queue is full.
    ///
    /// Fails only once the receiver has been dropped.
    pub async fn push(&self, event: Event) -> Result<(), QueueError> {
        self.tx.send(event).await.map_err(|_| QueueError::Closed)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Number of events currently buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side of the queue.
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::Receiver<Event>,
}

impl QueueReceiver {
    /// Removes the oldest event, waiting while the queue is empty.
    ///
    /// Returns `None` once every handle is dropped and the queue is drained.
    pub async fn pop(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}
