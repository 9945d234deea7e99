//! Redpanda (Kafka-compatible) transport for the Bazaar broker contract.
//!
//! Kafka has topics and consumer groups rather than exchanges, queues and
//! bindings, so this crate maps the topic-exchange model onto it:
//!
//! - **exchange → topic**: a publish to `order.events` produces to the
//!   `order.events` topic; a publish to the default exchange produces to the
//!   topic named by the routing key (the queue's own topic);
//! - **routing key → message key**: the routing key rides along as the
//!   Kafka message key, which also keeps one aggregate's events ordered
//!   within a partition;
//! - **queue → consumer group**: every queue subscribes to the topics of
//!   the exchanges it is bound to, under a consumer group named after the
//!   queue, so competing consumers of one queue share the workload while
//!   distinct queues each see every message;
//! - **bindings → client-side filters**: messages whose key does not match
//!   any of the queue's binding patterns are committed and skipped.
//!
//! # Delivery Semantics
//!
//! At-least-once with manual commits: an offset is committed only after the
//! consumer acknowledges the delivery (or rejects it without requeue, in
//! which case the message is first produced to the queue's dead-letter
//! topic). Reject-with-requeue redelivers locally with an incremented
//! redelivery count before the offset moves.
//!
//! # Example
//!
//! ```no_run
//! use bazaar_redpanda::RedpandaBroker;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let broker = RedpandaBroker::builder()
//!     .brokers("localhost:9092")
//!     .producer_acks("all")
//!     .compression("lz4")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use bazaar_core::broker::{Broker, BrokerError, DeliveryStream};
use bazaar_core::envelope::{Delivery, Disposition, Envelope};
use bazaar_core::topology::{BindingPattern, QueueSpec, Topology};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

/// Per-queue view of the declared topology.
#[derive(Clone)]
struct QueueRoute {
    spec: QueueSpec,
    /// (exchange, parsed pattern) pairs this queue is bound with.
    bindings: Vec<(String, BindingPattern)>,
}

impl QueueRoute {
    /// Topics this queue consumes: every bound exchange plus the queue's
    /// own topic for default-exchange publishes.
    fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .bindings
            .iter()
            .map(|(exchange, _)| exchange.clone())
            .collect();
        topics.push(self.spec.name.clone());
        topics.sort();
        topics.dedup();
        topics
    }

    /// Whether a message on `topic` with `routing_key` belongs to this
    /// queue.
    fn accepts(&self, topic: &str, routing_key: &str) -> bool {
        if topic == self.spec.name {
            return true;
        }
        self.bindings
            .iter()
            .any(|(exchange, pattern)| exchange.as_str() == topic && pattern.matches(routing_key))
    }
}

/// Kafka-compatible implementation of the broker contract.
pub struct RedpandaBroker {
    producer: FutureProducer,
    brokers: String,
    timeout: Duration,
    auto_offset_reset: String,
    buffer_size: usize,
    routes: Mutex<HashMap<String, QueueRoute>>,
}

impl RedpandaBroker {
    /// Create a broker with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ConnectionFailed`] when the producer cannot be
    /// created from the given addresses.
    pub fn new(brokers: &str) -> Result<Self, BrokerError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder for configuring the broker.
    #[must_use]
    pub fn builder() -> RedpandaBrokerBuilder {
        RedpandaBrokerBuilder::default()
    }

    /// The configured bootstrap servers.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    fn route_for(&self, queue: &str) -> Option<QueueRoute> {
        self.routes
            .lock()
            .ok()
            .and_then(|routes| routes.get(queue).cloned())
    }

    fn cache_topology(&self, topology: &Topology) -> Result<(), BrokerError> {
        topology.validate()?;

        let Ok(mut routes) = self.routes.lock() else {
            return Err(BrokerError::Transport("broker state poisoned".to_string()));
        };

        for spec in topology.queues() {
            let bindings: Vec<(String, BindingPattern)> = topology
                .bindings()
                .iter()
                .filter(|b| b.queue == spec.name)
                .map(|b| {
                    BindingPattern::parse(&b.pattern)
                        .map(|pattern| (b.exchange.clone(), pattern))
                        .map_err(|e| BrokerError::Transport(e.to_string()))
                })
                .collect::<Result<_, _>>()?;

            let route = QueueRoute {
                spec: spec.clone(),
                bindings,
            };

            match routes.get(&spec.name) {
                None => {
                    routes.insert(spec.name.clone(), route);
                },
                Some(existing) if existing.spec == *spec => {
                    // Re-declared identically; merge any new bindings.
                    if let Some(entry) = routes.get_mut(&spec.name) {
                        for binding in route.bindings {
                            if !entry.bindings.contains(&binding) {
                                entry.bindings.push(binding);
                            }
                        }
                    }
                },
                Some(_) => {
                    return Err(BrokerError::TopologyMismatch(format!(
                        "queue '{}' already declared with different properties",
                        spec.name
                    )));
                },
            }
        }

        // Topics are auto-created by the cluster; exchanges need no
        // server-side declaration beyond the cached routing view.
        tracing::info!(
            exchanges = topology.exchanges().len(),
            queues = topology.queues().len(),
            bindings = topology.bindings().len(),
            "Topology declared"
        );
        Ok(())
    }
}

/// Builder for configuring a [`RedpandaBroker`].
#[derive(Default)]
pub struct RedpandaBrokerBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    buffer_size: Option<usize>,
    auto_offset_reset: Option<String>,
}

impl RedpandaBrokerBuilder {
    /// Set the bootstrap servers (comma-separated).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the producer acknowledgment mode: `"0"`, `"1"` or `"all"`.
    ///
    /// Default: `"all"`; published messages are persisted before the send
    /// resolves.
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the compression codec: `"none"`, `"gzip"`, `"snappy"`, `"lz4"`,
    /// `"zstd"`.
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the producer send timeout. Default: 5 seconds.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the per-subscription delivery buffer. Default: 1.
    ///
    /// The contract hands out one delivery at a time per queue, so the
    /// buffer only smooths the hop between the consumer task and the
    /// subscription stream.
    #[must_use]
    pub const fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size);
        self
    }

    /// Where new consumer groups start reading: `"earliest"` or `"latest"`.
    ///
    /// Default: `"earliest"`, so a freshly declared queue sees messages
    /// published before its first subscriber attached, matching durable
    /// queue semantics.
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Build the [`RedpandaBroker`].
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ConnectionFailed`] when brokers are not set or
    /// the producer cannot be created.
    pub fn build(self) -> Result<RedpandaBroker, BrokerError> {
        let brokers = self
            .brokers
            .ok_or_else(|| BrokerError::ConnectionFailed("brokers not configured".to_string()))?;

        let mut producer_config = ClientConfig::new();
        producer_config
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", self.producer_acks.as_deref().unwrap_or("all"))
            .set(
                "compression.type",
                self.compression.as_deref().unwrap_or("none"),
            );

        let producer: FutureProducer = producer_config.create().map_err(|e| {
            BrokerError::ConnectionFailed(format!("failed to create producer: {e}"))
        })?;

        tracing::info!(
            brokers = %brokers,
            acks = self.producer_acks.as_deref().unwrap_or("all"),
            compression = self.compression.as_deref().unwrap_or("none"),
            "RedpandaBroker created"
        );

        Ok(RedpandaBroker {
            producer,
            brokers,
            timeout: self.timeout.unwrap_or(Duration::from_secs(5)),
            auto_offset_reset: self
                .auto_offset_reset
                .unwrap_or_else(|| "earliest".to_string()),
            buffer_size: self.buffer_size.unwrap_or(1).max(1),
            routes: Mutex::new(HashMap::new()),
        })
    }
}

async fn produce(
    producer: &FutureProducer,
    timeout: Duration,
    topic: &str,
    routing_key: &str,
    body: &[u8],
) -> Result<(), BrokerError> {
    let record = FutureRecord::to(topic).payload(body).key(routing_key);

    match producer.send(record, Timeout::After(timeout)).await {
        Ok((partition, offset)) => {
            tracing::debug!(
                topic,
                partition,
                offset,
                routing_key,
                "Message published"
            );
            Ok(())
        },
        Err((kafka_error, _)) => {
            tracing::error!(topic, routing_key, error = %kafka_error, "Publish failed");
            Err(BrokerError::PublishFailed {
                exchange: topic.to_string(),
                routing_key: routing_key.to_string(),
                reason: kafka_error.to_string(),
            })
        },
    }
}

impl Broker for RedpandaBroker {
    fn declare_topology(
        &self,
        topology: &Topology,
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>> {
        let result = self.cache_topology(topology);
        Box::pin(async move { result })
    }

    fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>> {
        // Default-exchange publishes go straight to the queue's own topic.
        let topic = if exchange.is_empty() {
            routing_key.to_string()
        } else {
            exchange.to_string()
        };
        let routing_key = routing_key.to_string();

        Box::pin(async move {
            produce(&self.producer, self.timeout, &topic, &routing_key, &body).await
        })
    }

    #[allow(clippy::too_many_lines)] // At-least-once with manual commits and local requeue
    fn subscribe(
        &self,
        queue: &str,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, BrokerError>> + Send + '_>> {
        let queue_name = queue.to_string();
        let brokers = self.brokers.clone();
        let auto_offset_reset = self.auto_offset_reset.clone();
        let buffer_size = self.buffer_size;
        let producer = self.producer.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            let Some(route) = self.route_for(&queue_name) else {
                return Err(BrokerError::UnknownQueue(queue_name));
            };

            let consumer: StreamConsumer = ClientConfig::new()
                .set("bootstrap.servers", &brokers)
                .set("group.id", &queue_name)
                .set("enable.auto.commit", "false")
                .set("auto.offset.reset", &auto_offset_reset)
                .set("session.timeout.ms", "6000")
                .set("enable.partition.eof", "false")
                .create()
                .map_err(|e| BrokerError::SubscriptionFailed {
                    queue: queue_name.clone(),
                    reason: format!("failed to create consumer: {e}"),
                })?;

            let topics = route.topics();
            let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
            consumer
                .subscribe(&topic_refs)
                .map_err(|e| BrokerError::SubscriptionFailed {
                    queue: queue_name.clone(),
                    reason: format!("failed to subscribe to topics: {e}"),
                })?;

            tracing::info!(
                queue = %queue_name,
                topics = ?topics,
                "Subscribed"
            );

            let (tx, mut rx) = tokio::sync::mpsc::channel(buffer_size);

            tokio::spawn(async move {
                use futures::StreamExt;

                let mut stream = consumer.stream();

                'messages: while let Some(next) = stream.next().await {
                    let message = match next {
                        Ok(message) => message,
                        Err(e) => {
                            let err = BrokerError::Transport(format!(
                                "failed to receive message: {e}"
                            ));
                            if tx.send(Err(err)).await.is_err() {
                                break;
                            }
                            continue;
                        },
                    };

                    let topic = message.topic().to_string();
                    let routing_key = message
                        .key()
                        .map(|k| String::from_utf8_lossy(k).into_owned())
                        .unwrap_or_default();
                    let body = message.payload().map(<[u8]>::to_vec).unwrap_or_default();

                    if !route.accepts(&topic, &routing_key) {
                        // Bound patterns filter client-side on Kafka.
                        if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                            tracing::warn!(error = %e, "Failed to commit filtered message");
                        }
                        continue;
                    }

                    let exchange = if topic == route.spec.name {
                        String::new()
                    } else {
                        topic
                    };
                    let mut envelope = Envelope::new(exchange, routing_key, body);

                    // Local redelivery loop: the offset moves only once the
                    // delivery is acknowledged or finally rejected.
                    loop {
                        let (delivery, receipt) = Delivery::new(envelope.clone());
                        if tx.send(Ok(delivery)).await.is_err() {
                            // Subscriber dropped before commit; the message
                            // redelivers to the next group member.
                            break 'messages;
                        }

                        match receipt.await {
                            Ok(Disposition::Ack) => break,
                            Ok(Disposition::Reject { requeue: true }) | Err(_) => {
                                envelope.redelivery_count += 1;
                                continue;
                            },
                            Ok(Disposition::Reject { requeue: false }) => {
                                if let Some(dead_letter) = &route.spec.dead_letter {
                                    if let Err(e) = produce(
                                        &producer,
                                        timeout,
                                        dead_letter,
                                        &envelope.routing_key,
                                        &envelope.body,
                                    )
                                    .await
                                    {
                                        tracing::error!(
                                            queue = %route.spec.name,
                                            error = %e,
                                            "Failed to dead-letter message"
                                        );
                                    }
                                } else {
                                    tracing::warn!(
                                        queue = %route.spec.name,
                                        routing_key = %envelope.routing_key,
                                        "No dead-letter queue configured, dropping message"
                                    );
                                }
                                break;
                            },
                        }
                    }

                    if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                        tracing::warn!(
                            queue = %route.spec.name,
                            error = %e,
                            "Failed to commit offset (message may be redelivered)"
                        );
                    }
                }

                tracing::debug!("Consumer task exiting");
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

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Panics: assertions in tests
mod tests {
    use super::*;

    #[test]
    fn redpanda_broker_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedpandaBroker>();
        assert_sync::<RedpandaBroker>();
    }

    #[test]
    fn builder_requires_brokers() {
        let result = RedpandaBroker::builder().build();
        assert!(matches!(result, Err(BrokerError::ConnectionFailed(_))));
    }

    #[test]
    fn queue_route_accepts_bound_patterns_and_own_topic() {
        let route = QueueRoute {
            spec: QueueSpec {
                name: "order.payment.events".to_string(),
                durable: true,
                dead_letter: None,
            },
            bindings: vec![(
                "payment.events".to_string(),
                BindingPattern::parse("payment.*").unwrap(),
            )],
        };

        assert!(route.accepts("payment.events", "payment.completed"));
        assert!(!route.accepts("payment.events", "refund.issued"));
        assert!(!route.accepts("order.events", "payment.completed"));
        // Direct publishes to the queue's own topic always belong to it.
        assert!(route.accepts("order.payment.events", "anything"));
    }

    #[test]
    fn queue_route_topics_are_deduplicated() {
        let route = QueueRoute {
            spec: QueueSpec {
                name: "notification.payment.events".to_string(),
                durable: true,
                dead_letter: None,
            },
            bindings: vec![
                (
                    "payment.events".to_string(),
                    BindingPattern::parse("payment.completed").unwrap(),
                ),
                (
                    "payment.events".to_string(),
                    BindingPattern::parse("payment.failed").unwrap(),
                ),
            ],
        };

        assert_eq!(
            route.topics(),
            vec![
                "notification.payment.events".to_string(),
                "payment.events".to_string()
            ]
        );
    }
}
