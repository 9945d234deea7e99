//! Per-queue consumer dispatch loop.
//!
//! A [`Consumer`] owns one queue subscription and a set of typed handlers,
//! each registered under a routing-key binding pattern. The loop processes
//! deliveries one at a time in arrival order and converts every handler
//! outcome into an acknowledgment decision, so the broker's requeue
//! machinery is the only retry mechanism.
//!
//! # Scopes
//!
//! Handlers receive a fresh scope per message, produced by the
//! [`ScopeFactory`]. The delivery callback executes outside of and
//! concurrently with any per-request context, so collaborators must never
//! leak state from one message into the next.
//!
//! # Example
//!
//! ```ignore
//! let consumer = Consumer::new("order.payment.events", scope_factory)
//!     .with_idempotency(store)
//!     .on("payment.completed", |scope: OrderScope, event: PaymentCompleted| async move {
//!         scope.orders.update_status(event.order_id, OrderStatus::Paid).await?;
//!         Ok(())
//!     })?;
//!
//! consumer.spawn(broker);
//! ```

use crate::idempotency::IdempotencyStore;
use crate::redelivery::RedeliveryPolicy;
use bazaar_core::broker::{Broker, BrokerError};
use bazaar_core::envelope::{Delivery, Envelope};
use bazaar_core::event::Event;
use bazaar_core::topology::{BindingPattern, PatternError};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// How a handler invocation failed, which decides the message's fate.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The payload could not be deserialized into the bound contract type.
    /// Redelivery can never help; the message is rejected without requeue.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// A business rule rejected the message (unknown order, disallowed
    /// transition, ...). The message is logged and acknowledged.
    #[error("message discarded: {0}")]
    Discard(String),

    /// A transient failure (downstream unavailable, publish failed, bug).
    /// The message is requeued until the redelivery cap, then dead-lettered.
    #[error("handler failed: {0}")]
    Retry(anyhow::Error),
}

impl HandlerError {
    /// Wrap any error as a transient, requeue-worthy failure.
    pub fn retry(err: impl Into<anyhow::Error>) -> Self {
        Self::Retry(err.into())
    }

    /// Build a discard outcome from a business-rule violation.
    pub fn discard(reason: impl Into<String>) -> Self {
        Self::Discard(reason.into())
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        Self::Retry(err)
    }
}

/// Produces a fresh, isolated scope of stateful collaborators per message.
///
/// The scope plays the role a per-request dependency scope plays on the
/// synchronous side: each delivery gets its own value, so concurrent and
/// successive messages cannot bleed state into each other. Scopes are
/// usually cheap bundles of `Arc` handles.
pub trait ScopeFactory: Send + Sync + 'static {
    /// The scope handed to handlers.
    type Scope: Send + 'static;

    /// Create a scope for one message.
    fn create_scope(&self) -> Self::Scope;
}

#[derive(Clone)]
struct HandlerContext {
    queue: Arc<str>,
    idempotency: Option<Arc<dyn IdempotencyStore>>,
}

impl HandlerContext {
    fn scoped_key(&self, key: &str) -> String {
        format!("{}:{}", self.queue, key)
    }

    fn already_processed(&self, key: &str) -> bool {
        self.idempotency
            .as_deref()
            .is_some_and(|store| store.already_processed(key))
    }

    fn mark_processed(&self, key: String) {
        if let Some(store) = self.idempotency.as_deref() {
            store.mark_processed(key);
        }
    }
}

type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send>>;
type BoxedHandler<S> = Box<dyn Fn(S, Envelope, HandlerContext) -> HandlerFuture + Send + Sync>;

/// One queue's dispatch loop: typed handlers keyed by binding pattern.
pub struct Consumer<F: ScopeFactory> {
    queue: String,
    factory: Arc<F>,
    policy: RedeliveryPolicy,
    idempotency: Option<Arc<dyn IdempotencyStore>>,
    handlers: Vec<(BindingPattern, BoxedHandler<F::Scope>)>,
}

impl<F: ScopeFactory> Consumer<F> {
    /// Create a consumer for a queue with the default redelivery policy.
    pub fn new(queue: impl Into<String>, factory: F) -> Self {
        Self {
            queue: queue.into(),
            factory: Arc::new(factory),
            policy: RedeliveryPolicy::default(),
            idempotency: None,
            handlers: Vec::new(),
        }
    }

    /// Replace the redelivery policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RedeliveryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Attach an idempotency store; events exposing a key are deduplicated
    /// against it, scoped to this queue.
    #[must_use]
    pub fn with_idempotency(mut self, store: Arc<dyn IdempotencyStore>) -> Self {
        self.idempotency = Some(store);
        self
    }

    /// Register a typed handler under a routing-key binding pattern.
    ///
    /// The first registered pattern matching a delivery's routing key wins,
    /// so register literal patterns before overlapping wildcard ones.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] when the binding pattern does not parse,
    /// a configuration error surfaced at wiring time.
    pub fn on<E, H, Fut>(mut self, pattern: &str, handler: H) -> Result<Self, PatternError>
    where
        E: Event + DeserializeOwned,
        H: Fn(F::Scope, E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let pattern = BindingPattern::parse(pattern)?;
        let handler = Arc::new(handler);

        let boxed: BoxedHandler<F::Scope> = Box::new(move |scope, envelope, ctx| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let event = match E::from_bytes(&envelope.body) {
                    Ok(event) => event,
                    Err(err) => return Err(HandlerError::Malformed(err.to_string())),
                };

                let Some(key) = event.idempotency_key() else {
                    return (*handler)(scope, event).await;
                };

                let key = ctx.scoped_key(&key);
                if ctx.already_processed(&key) {
                    tracing::debug!(
                        routing_key = %envelope.routing_key,
                        idempotency_key = %key,
                        "Skipping duplicate event"
                    );
                    return Ok(());
                }

                (*handler)(scope, event).await?;
                ctx.mark_processed(key);
                Ok(())
            })
        });

        self.handlers.push((pattern, boxed));
        Ok(self)
    }

    /// Run the dispatch loop until the subscription stream ends.
    ///
    /// # Errors
    ///
    /// Returns the [`BrokerError`] from the initial subscription; errors on
    /// individual deliveries are logged and the loop continues.
    pub async fn run(self, broker: Arc<dyn Broker>) -> Result<(), BrokerError> {
        let mut stream = broker.subscribe(&self.queue).await?;
        let ctx = HandlerContext {
            queue: Arc::from(self.queue.as_str()),
            idempotency: self.idempotency.clone(),
        };

        tracing::info!(
            queue = %self.queue,
            handlers = self.handlers.len(),
            max_redeliveries = self.policy.max_redeliveries,
            "Consumer started"
        );

        while let Some(next) = stream.next().await {
            match next {
                Ok(delivery) => self.dispatch(delivery, &ctx).await,
                Err(err) => {
                    tracing::error!(queue = %self.queue, error = %err, "Delivery stream error");
                },
            }
        }

        tracing::info!(queue = %self.queue, "Consumer stream ended");
        Ok(())
    }

    /// Spawn [`run`](Self::run) on the runtime.
    pub fn spawn(self, broker: Arc<dyn Broker>) -> tokio::task::JoinHandle<Result<(), BrokerError>> {
        tokio::spawn(self.run(broker))
    }

    async fn dispatch(&self, delivery: Delivery, ctx: &HandlerContext) {
        let envelope = delivery.envelope().clone();

        let Some((pattern, handler)) = self
            .handlers
            .iter()
            .find(|(pattern, _)| pattern.matches(&envelope.routing_key))
        else {
            tracing::warn!(
                queue = %self.queue,
                routing_key = %envelope.routing_key,
                "No handler bound for routing key, dropping message"
            );
            delivery.ack();
            return;
        };

        let scope = self.factory.create_scope();
        let future = handler(scope, envelope.clone(), ctx.clone());

        // The handler runs on its own worker task so a blocking or panicking
        // handler cannot take the dispatch loop down with it; the message is
        // acknowledged only after the worker completes.
        let outcome = match tokio::spawn(future).await {
            Ok(outcome) => outcome,
            Err(join_err) => Err(HandlerError::Retry(anyhow::anyhow!(
                "handler worker failed: {join_err}"
            ))),
        };

        match outcome {
            Ok(()) => {
                tracing::debug!(
                    queue = %self.queue,
                    routing_key = %envelope.routing_key,
                    pattern = %pattern,
                    "Message processed"
                );
                delivery.ack();
            },
            Err(HandlerError::Malformed(reason)) => {
                tracing::error!(
                    queue = %self.queue,
                    routing_key = %envelope.routing_key,
                    %reason,
                    "Rejecting undeserializable message without requeue"
                );
                delivery.reject(false);
            },
            Err(HandlerError::Discard(reason)) => {
                tracing::warn!(
                    queue = %self.queue,
                    routing_key = %envelope.routing_key,
                    %reason,
                    "Discarding message after business-rule violation"
                );
                delivery.ack();
            },
            Err(HandlerError::Retry(err)) => {
                if self.policy.should_requeue(envelope.redelivery_count) {
                    tracing::warn!(
                        queue = %self.queue,
                        routing_key = %envelope.routing_key,
                        redelivery_count = envelope.redelivery_count,
                        error = %err,
                        "Handler failed, requeueing message"
                    );
                    delivery.reject(true);
                } else {
                    tracing::error!(
                        queue = %self.queue,
                        routing_key = %envelope.routing_key,
                        redelivery_count = envelope.redelivery_count,
                        error = %err,
                        "Redelivery cap reached, dead-lettering message"
                    );
                    delivery.reject(false);
                }
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Panics: assertions in tests
mod tests {
    use super::*;
    use bazaar_core::broker::publish_event;
    use bazaar_core::topology::Topology;
    use bazaar_testing::InMemoryBroker;
    use serde::{Deserialize, Serialize};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct StockAdjusted {
        sku: String,
        delta: i64,
    }

    impl Event for StockAdjusted {
        fn event_type(&self) -> &'static str {
            "StockAdjusted"
        }

        fn exchange(&self) -> &'static str {
            "stock.events"
        }

        fn routing_key(&self) -> String {
            "stock.adjusted".to_string()
        }

        fn idempotency_key(&self) -> Option<String> {
            Some(format!("{}:StockAdjusted", self.sku))
        }
    }

    struct RecorderFactory {
        scopes_created: Arc<AtomicUsize>,
        recorder: Arc<Mutex<Vec<StockAdjusted>>>,
    }

    impl ScopeFactory for RecorderFactory {
        type Scope = Arc<Mutex<Vec<StockAdjusted>>>;

        fn create_scope(&self) -> Self::Scope {
            self.scopes_created.fetch_add(1, Ordering::SeqCst);
            Arc::clone(&self.recorder)
        }
    }

    fn topology() -> Topology {
        Topology::new()
            .exchange("stock.events")
            .queue_with_dead_letter("warehouse.stock.events", "warehouse.stock.events.dlq")
            .bind("warehouse.stock.events", "stock.events", "stock.*")
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(condition(), "condition not met within timeout");
    }

    async fn started_broker() -> Arc<InMemoryBroker> {
        let broker = Arc::new(InMemoryBroker::new());
        broker
            .declare_topology(&topology())
            .await
            .expect("topology should declare");
        broker
    }

    #[tokio::test]
    async fn dispatches_typed_event_with_fresh_scope_per_message() {
        let broker = started_broker().await;
        let scopes_created = Arc::new(AtomicUsize::new(0));
        let recorder = Arc::new(Mutex::new(Vec::new()));

        let consumer = Consumer::new(
            "warehouse.stock.events",
            RecorderFactory {
                scopes_created: Arc::clone(&scopes_created),
                recorder: Arc::clone(&recorder),
            },
        )
        .on(
            "stock.adjusted",
            |scope: Arc<Mutex<Vec<StockAdjusted>>>, event: StockAdjusted| async move {
                scope.lock().unwrap().push(event);
                Ok(())
            },
        )
        .unwrap();
        consumer.spawn(broker.clone() as Arc<dyn Broker>);

        for sku in ["a", "b"] {
            publish_event(
                broker.as_ref(),
                &StockAdjusted {
                    sku: sku.to_string(),
                    delta: 1,
                },
            )
            .await
            .unwrap();
        }

        wait_until(|| recorder.lock().unwrap().len() == 2).await;
        assert_eq!(scopes_created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn malformed_payload_dead_letters_without_requeue() {
        let broker = started_broker().await;
        let recorder = Arc::new(Mutex::new(Vec::new()));

        let consumer = Consumer::new(
            "warehouse.stock.events",
            RecorderFactory {
                scopes_created: Arc::new(AtomicUsize::new(0)),
                recorder: Arc::clone(&recorder),
            },
        )
        .on(
            "stock.adjusted",
            |scope: Arc<Mutex<Vec<StockAdjusted>>>, event: StockAdjusted| async move {
                scope.lock().unwrap().push(event);
                Ok(())
            },
        )
        .unwrap();
        consumer.spawn(broker.clone() as Arc<dyn Broker>);

        broker
            .publish("stock.events", "stock.adjusted", b"not json".to_vec())
            .await
            .unwrap();

        wait_until(|| broker.queue_depth("warehouse.stock.events.dlq") == 1).await;
        assert!(recorder.lock().unwrap().is_empty());

        // The loop keeps serving the queue after the poison message.
        publish_event(
            broker.as_ref(),
            &StockAdjusted {
                sku: "c".to_string(),
                delta: 1,
            },
        )
        .await
        .unwrap();
        wait_until(|| recorder.lock().unwrap().len() == 1).await;
    }

    #[tokio::test]
    async fn failing_handler_is_redelivered_until_success() {
        let broker = started_broker().await;
        let attempts = Arc::new(AtomicUsize::new(0));
        let recorder = Arc::new(Mutex::new(Vec::new()));

        let attempts_in_handler = Arc::clone(&attempts);
        let consumer = Consumer::new(
            "warehouse.stock.events",
            RecorderFactory {
                scopes_created: Arc::new(AtomicUsize::new(0)),
                recorder: Arc::clone(&recorder),
            },
        )
        .on(
            "stock.adjusted",
            move |scope: Arc<Mutex<Vec<StockAdjusted>>>, event: StockAdjusted| {
                let attempts = Arc::clone(&attempts_in_handler);
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                        return Err(HandlerError::retry(anyhow::anyhow!("flaky downstream")));
                    }
                    scope.lock().unwrap().push(event);
                    Ok(())
                }
            },
        )
        .unwrap();
        consumer.spawn(broker.clone() as Arc<dyn Broker>);

        publish_event(
            broker.as_ref(),
            &StockAdjusted {
                sku: "flaky".to_string(),
                delta: 1,
            },
        )
        .await
        .unwrap();

        wait_until(|| recorder.lock().unwrap().len() == 1).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(broker.queue_depth("warehouse.stock.events.dlq"), 0);
    }

    #[tokio::test]
    async fn redelivery_cap_dead_letters_persistent_failures() {
        let broker = started_broker().await;
        let attempts = Arc::new(AtomicUsize::new(0));

        let attempts_in_handler = Arc::clone(&attempts);
        let consumer = Consumer::new(
            "warehouse.stock.events",
            RecorderFactory {
                scopes_created: Arc::new(AtomicUsize::new(0)),
                recorder: Arc::new(Mutex::new(Vec::new())),
            },
        )
        .with_policy(RedeliveryPolicy::new(1))
        .on(
            "stock.adjusted",
            move |_scope: Arc<Mutex<Vec<StockAdjusted>>>, _event: StockAdjusted| {
                let attempts = Arc::clone(&attempts_in_handler);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(HandlerError::retry(anyhow::anyhow!("always down")))
                }
            },
        )
        .unwrap();
        consumer.spawn(broker.clone() as Arc<dyn Broker>);

        publish_event(
            broker.as_ref(),
            &StockAdjusted {
                sku: "poison".to_string(),
                delta: 1,
            },
        )
        .await
        .unwrap();

        wait_until(|| broker.queue_depth("warehouse.stock.events.dlq") == 1).await;
        // Initial delivery plus one redelivery.
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn duplicate_events_are_skipped_with_idempotency_store() {
        let broker = started_broker().await;
        let recorder = Arc::new(Mutex::new(Vec::new()));
        let store: Arc<dyn IdempotencyStore> =
            Arc::new(crate::idempotency::InMemoryIdempotencyStore::new());

        let consumer = Consumer::new(
            "warehouse.stock.events",
            RecorderFactory {
                scopes_created: Arc::new(AtomicUsize::new(0)),
                recorder: Arc::clone(&recorder),
            },
        )
        .with_idempotency(store)
        .on(
            "stock.adjusted",
            |scope: Arc<Mutex<Vec<StockAdjusted>>>, event: StockAdjusted| async move {
                scope.lock().unwrap().push(event);
                Ok(())
            },
        )
        .unwrap();
        consumer.spawn(broker.clone() as Arc<dyn Broker>);

        let event = StockAdjusted {
            sku: "dup".to_string(),
            delta: 1,
        };
        publish_event(broker.as_ref(), &event).await.unwrap();
        publish_event(broker.as_ref(), &event).await.unwrap();
        // A distinct aggregate still processes.
        publish_event(
            broker.as_ref(),
            &StockAdjusted {
                sku: "other".to_string(),
                delta: 1,
            },
        )
        .await
        .unwrap();

        wait_until(|| recorder.lock().unwrap().len() == 2).await;
        assert_eq!(broker.queue_depth("warehouse.stock.events"), 0);
        let skus: Vec<String> = recorder.lock().unwrap().iter().map(|e| e.sku.clone()).collect();
        assert_eq!(skus, vec!["dup".to_string(), "other".to_string()]);
    }

    #[tokio::test]
    async fn unmatched_routing_keys_are_dropped() {
        let broker = started_broker().await;
        let recorder = Arc::new(Mutex::new(Vec::new()));

        let consumer = Consumer::new(
            "warehouse.stock.events",
            RecorderFactory {
                scopes_created: Arc::new(AtomicUsize::new(0)),
                recorder: Arc::clone(&recorder),
            },
        )
        .on(
            "stock.adjusted",
            |scope: Arc<Mutex<Vec<StockAdjusted>>>, event: StockAdjusted| async move {
                scope.lock().unwrap().push(event);
                Ok(())
            },
        )
        .unwrap();
        consumer.spawn(broker.clone() as Arc<dyn Broker>);

        // Bound to the queue by the `stock.*` binding, but no handler
        // pattern matches.
        broker
            .publish("stock.events", "stock.depleted", b"{}".to_vec())
            .await
            .unwrap();

        wait_until(|| broker.queue_depth("warehouse.stock.events") == 0).await;
        assert!(recorder.lock().unwrap().is_empty());
        assert_eq!(broker.queue_depth("warehouse.stock.events.dlq"), 0);
    }
}
