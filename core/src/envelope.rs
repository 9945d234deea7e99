//! The wire envelope and the manual acknowledgment handle.
//!
//! Transports hand consumers a [`Delivery`]: the envelope plus a one-shot
//! receipt channel back to the transport. The consumer must resolve every
//! delivery exactly once: acknowledge it (removes the message permanently)
//! or reject it, with requeue for transient failures or without requeue for
//! messages that can never succeed.
//!
//! Dropping an unresolved delivery counts as reject-with-requeue, matching
//! what a broker does when a consumer dies mid-message.

use std::fmt;
use tokio::sync::oneshot;
use uuid::Uuid;

/// An immutable message as carried by the broker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    /// Broker-assigned message id.
    pub message_id: Uuid,

    /// Exchange the message was published to (empty for the default
    /// exchange).
    pub exchange: String,

    /// Routing key the message was published with.
    pub routing_key: String,

    /// Serialized event payload (JSON).
    pub body: Vec<u8>,

    /// How many times this message has been requeued after a rejection.
    ///
    /// Zero on first delivery. Dispatch loops compare this against their
    /// redelivery policy to decide between requeue and dead-letter.
    pub redelivery_count: u32,
}

impl Envelope {
    /// Create a first-delivery envelope with a fresh message id.
    #[must_use]
    pub fn new(
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        body: Vec<u8>,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            body,
            redelivery_count: 0,
        }
    }

    /// Whether this message has been delivered before.
    #[must_use]
    pub const fn redelivered(&self) -> bool {
        self.redelivery_count > 0
    }
}

/// Consumer verdict on a single delivery, reported back to the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Processing succeeded; remove the message permanently.
    Ack,

    /// Processing did not succeed.
    Reject {
        /// `true` requeues the message for redelivery; `false` routes it to
        /// the queue's dead-letter queue (or drops it if none is configured).
        requeue: bool,
    },
}

/// A single in-flight message awaiting acknowledgment.
///
/// Consuming [`ack`](Delivery::ack) or [`reject`](Delivery::reject) resolves
/// the delivery. An unresolved `Delivery` resolves to reject-with-requeue on
/// drop.
pub struct Delivery {
    envelope: Envelope,
    receipt: Option<oneshot::Sender<Disposition>>,
}

impl Delivery {
    /// Pair a new delivery with the receipt channel the transport awaits.
    #[must_use]
    pub fn new(envelope: Envelope) -> (Self, oneshot::Receiver<Disposition>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                envelope,
                receipt: Some(tx),
            },
            rx,
        )
    }

    /// The delivered message.
    #[must_use]
    pub const fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Acknowledge the message, removing it permanently.
    pub fn ack(mut self) {
        self.resolve(Disposition::Ack);
    }

    /// Reject the message, optionally requeueing it for redelivery.
    pub fn reject(mut self, requeue: bool) {
        self.resolve(Disposition::Reject { requeue });
    }

    fn resolve(&mut self, disposition: Disposition) {
        if let Some(receipt) = self.receipt.take() {
            // The transport may have gone away; nothing left to confirm.
            let _ = receipt.send(disposition);
        }
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        self.resolve(Disposition::Reject { requeue: true });
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("envelope", &self.envelope)
            .field("resolved", &self.receipt.is_none())
            .finish()
    }
}
