//! In-process topic exchange implementing the `Broker` trait.
//!
//! Faithful to the transport contract rather than a recording stub:
//!
//! - topic exchanges fan out to every queue whose binding pattern matches
//!   the routing key (`*` one segment, `#` zero or more);
//! - the default exchange routes directly to the queue named by the routing
//!   key;
//! - each queue delivers one message at a time, in order, and waits for the
//!   consumer's ack/reject before handing out the next;
//! - reject-with-requeue puts the message back at the head with an
//!   incremented redelivery count;
//! - reject-without-requeue routes to the queue's dead-letter queue, or
//!   drops the message when none is configured;
//! - redeclaring identical topology is a no-op, mismatched properties fail.
//!
//! Durability flags are accepted and recorded but meaningless in a single
//! process.

use bazaar_core::broker::{Broker, BrokerError, DeliveryStream};
use bazaar_core::envelope::{Delivery, Disposition, Envelope};
use bazaar_core::topology::{BindingPattern, ExchangeSpec, QueueSpec, Topology};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, mpsc};

struct ExchangeState {
    spec: ExchangeSpec,
    bindings: Vec<(String, BindingPattern)>,
}

struct QueueState {
    spec: QueueSpec,
    messages: Mutex<VecDeque<Envelope>>,
    notify: Notify,
}

impl QueueState {
    fn enqueue(&self, envelope: Envelope) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push_back(envelope);
        }
        self.notify.notify_one();
    }

    fn requeue_front(&self, envelope: Envelope) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push_front(envelope);
        }
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<Envelope> {
        self.messages.lock().ok().and_then(|mut m| m.pop_front())
    }
}

#[derive(Default)]
struct Inner {
    exchanges: Mutex<HashMap<String, ExchangeState>>,
    queues: Mutex<HashMap<String, Arc<QueueState>>>,
}

impl Inner {
    fn queue(&self, name: &str) -> Option<Arc<QueueState>> {
        self.queues
            .lock()
            .ok()
            .and_then(|queues| queues.get(name).cloned())
    }

    fn dead_letter(&self, queue: &QueueState, envelope: Envelope) {
        match &queue.spec.dead_letter {
            Some(target) => match self.queue(target) {
                Some(dlq) => {
                    tracing::debug!(
                        queue = %queue.spec.name,
                        dead_letter = %target,
                        routing_key = %envelope.routing_key,
                        "Routing rejected message to dead-letter queue"
                    );
                    dlq.enqueue(envelope);
                },
                None => {
                    tracing::warn!(
                        queue = %queue.spec.name,
                        dead_letter = %target,
                        "Dead-letter queue missing, dropping rejected message"
                    );
                },
            },
            None => {
                tracing::warn!(
                    queue = %queue.spec.name,
                    routing_key = %envelope.routing_key,
                    "No dead-letter queue configured, dropping rejected message"
                );
            },
        }
    }
}

/// Single-process topic exchange for tests and demos.
///
/// # Example
///
/// ```
/// use bazaar_core::broker::Broker;
/// use bazaar_core::topology::Topology;
/// use bazaar_testing::InMemoryBroker;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let broker = InMemoryBroker::new();
/// broker
///     .declare_topology(
///         &Topology::new()
///             .exchange("order.events")
///             .queue("audit.order.events")
///             .bind("audit.order.events", "order.events", "order.#"),
///     )
///     .await?;
///
/// broker
///     .publish("order.events", "order.created", b"{}".to_vec())
///     .await?;
/// assert_eq!(broker.queue_depth("audit.order.events"), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

impl InMemoryBroker {
    /// Create an empty broker with no topology.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages currently waiting in a queue.
    ///
    /// Messages handed to a subscriber and awaiting acknowledgment are not
    /// counted. Unknown queues report zero.
    #[must_use]
    pub fn queue_depth(&self, queue: &str) -> usize {
        self.inner
            .queue(queue)
            .and_then(|q| q.messages.lock().map(|m| m.len()).ok())
            .unwrap_or(0)
    }

    /// Snapshot of the messages currently waiting in a queue.
    #[must_use]
    pub fn peek_queue(&self, queue: &str) -> Vec<Envelope> {
        self.inner
            .queue(queue)
            .and_then(|q| q.messages.lock().map(|m| m.iter().cloned().collect()).ok())
            .unwrap_or_default()
    }

    fn apply_topology(&self, topology: &Topology) -> Result<(), BrokerError> {
        topology.validate()?;

        {
            let Ok(mut exchanges) = self.inner.exchanges.lock() else {
                return Err(BrokerError::Transport("broker state poisoned".to_string()));
            };
            for spec in topology.exchanges() {
                match exchanges.get(&spec.name) {
                    Some(existing) if existing.spec == *spec => {},
                    Some(_) => {
                        return Err(BrokerError::TopologyMismatch(format!(
                            "exchange '{}' already declared with different properties",
                            spec.name
                        )));
                    },
                    None => {
                        exchanges.insert(
                            spec.name.clone(),
                            ExchangeState {
                                spec: spec.clone(),
                                bindings: Vec::new(),
                            },
                        );
                    },
                }
            }
        }

        {
            let Ok(mut queues) = self.inner.queues.lock() else {
                return Err(BrokerError::Transport("broker state poisoned".to_string()));
            };
            for spec in topology.queues() {
                match queues.get(&spec.name) {
                    Some(existing) if existing.spec == *spec => {},
                    Some(_) => {
                        return Err(BrokerError::TopologyMismatch(format!(
                            "queue '{}' already declared with different properties",
                            spec.name
                        )));
                    },
                    None => {
                        queues.insert(
                            spec.name.clone(),
                            Arc::new(QueueState {
                                spec: spec.clone(),
                                messages: Mutex::new(VecDeque::new()),
                                notify: Notify::new(),
                            }),
                        );
                    },
                }
            }
        }

        let Ok(mut exchanges) = self.inner.exchanges.lock() else {
            return Err(BrokerError::Transport("broker state poisoned".to_string()));
        };
        for binding in topology.bindings() {
            let pattern = BindingPattern::parse(&binding.pattern)
                .map_err(|e| BrokerError::Transport(e.to_string()))?;
            let Some(exchange) = exchanges.get_mut(&binding.exchange) else {
                return Err(BrokerError::UnknownExchange(binding.exchange.clone()));
            };
            let already_bound = exchange
                .bindings
                .iter()
                .any(|(queue, existing)| queue == &binding.queue && existing == &pattern);
            if !already_bound {
                exchange.bindings.push((binding.queue.clone(), pattern));
            }
        }

        Ok(())
    }

    fn route(&self, envelope: &Envelope) -> Result<(), BrokerError> {
        if envelope.exchange.is_empty() {
            // Default exchange: straight to the queue named by the key.
            match self.inner.queue(&envelope.routing_key) {
                Some(queue) => queue.enqueue(envelope.clone()),
                None => {
                    tracing::warn!(
                        routing_key = %envelope.routing_key,
                        "No queue for default-exchange publish, message dropped"
                    );
                },
            }
            return Ok(());
        }

        let targets: Vec<String> = {
            let Ok(exchanges) = self.inner.exchanges.lock() else {
                return Err(BrokerError::Transport("broker state poisoned".to_string()));
            };
            let Some(exchange) = exchanges.get(&envelope.exchange) else {
                return Err(BrokerError::UnknownExchange(envelope.exchange.clone()));
            };
            exchange
                .bindings
                .iter()
                .filter(|(_, pattern)| pattern.matches(&envelope.routing_key))
                .map(|(queue, _)| queue.clone())
                .collect()
        };

        if targets.is_empty() {
            tracing::warn!(
                exchange = %envelope.exchange,
                routing_key = %envelope.routing_key,
                "No bound queue matches, message dropped"
            );
            return Ok(());
        }

        tracing::debug!(
            exchange = %envelope.exchange,
            routing_key = %envelope.routing_key,
            queues = targets.len(),
            "Fanning message out"
        );
        for target in targets {
            if let Some(queue) = self.inner.queue(&target) {
                queue.enqueue(envelope.clone());
            }
        }
        Ok(())
    }
}

impl Broker for InMemoryBroker {
    fn declare_topology(
        &self,
        topology: &Topology,
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>> {
        let result = self.apply_topology(topology);
        Box::pin(async move { result })
    }

    fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>> {
        let envelope = Envelope::new(exchange, routing_key, body);
        let result = self.route(&envelope);
        Box::pin(async move { result })
    }

    fn subscribe(
        &self,
        queue: &str,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, BrokerError>> + Send + '_>> {
        let queue_name = queue.to_string();
        let inner = Arc::clone(&self.inner);

        Box::pin(async move {
            let Some(queue) = inner.queue(&queue_name) else {
                return Err(BrokerError::UnknownQueue(queue_name));
            };

            let (tx, mut rx) = mpsc::channel::<Result<Delivery, BrokerError>>(1);

            // Pump task: owns the consume loop for this subscription. The
            // next message is not handed out until the previous delivery is
            // acknowledged or rejected.
            tokio::spawn(async move {
                loop {
                    let Some(envelope) = queue.pop() else {
                        tokio::select! {
                            () = queue.notify.notified() => continue,
                            () = tx.closed() => break,
                        }
                    };

                    let (delivery, receipt) = Delivery::new(envelope.clone());
                    if tx.send(Ok(delivery)).await.is_err() {
                        // Subscriber went away; the message stays deliverable.
                        queue.requeue_front(envelope);
                        break;
                    }

                    match receipt.await {
                        Ok(Disposition::Ack) => {
                            tracing::trace!(
                                queue = %queue.spec.name,
                                routing_key = %envelope.routing_key,
                                "Message acknowledged"
                            );
                        },
                        Ok(Disposition::Reject { requeue: true }) | Err(_) => {
                            let mut envelope = envelope;
                            envelope.redelivery_count += 1;
                            tracing::debug!(
                                queue = %queue.spec.name,
                                routing_key = %envelope.routing_key,
                                redelivery_count = envelope.redelivery_count,
                                "Message requeued for redelivery"
                            );
                            queue.requeue_front(envelope);
                        },
                        Ok(Disposition::Reject { requeue: false }) => {
                            inner.dead_letter(&queue, envelope);
                        },
                    }
                }
                tracing::debug!(queue = %queue.spec.name, "Subscription pump exiting");
            });

            let stream = async_stream::stream! {
                while let Some(item) = rx.recv().await {
                    yield item;
                }
            };

            Ok(Box::pin(stream) as DeliveryStream)
        })
    }
}
