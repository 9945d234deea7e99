//! Declarative broker topology: exchanges, queues and bindings.
//!
//! Each service declares the topology it needs at startup. Declaring an
//! exchange or queue that already exists with identical properties is a
//! no-op; declaring it with different properties is a fatal configuration
//! error surfaced by the transport.
//!
//! Binding patterns are dot-segmented routing-key matchers in the usual
//! topic-exchange dialect: `*` matches exactly one segment, `#` matches zero
//! or more segments.
//!
//! # Example
//!
//! ```
//! use bazaar_core::topology::Topology;
//!
//! let topology = Topology::new()
//!     .exchange("payment.events")
//!     .queue_with_dead_letter("order.payment.events", "order.payment.events.dlq")
//!     .bind("order.payment.events", "payment.events", "payment.*");
//!
//! assert!(topology.validate().is_ok());
//! ```

use thiserror::Error;

/// Errors raised while parsing a binding pattern.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    /// The pattern string was empty.
    #[error("binding pattern must not be empty")]
    Empty,

    /// A dot-separated segment was empty (e.g. `order..created`).
    #[error("binding pattern contains an empty segment")]
    EmptySegment,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `*`: exactly one segment.
    Single,
    /// `#`: zero or more segments.
    Multi,
}

/// A parsed routing-key binding pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindingPattern {
    source: String,
    segments: Vec<Segment>,
}

impl BindingPattern {
    /// Parse a dot-segmented pattern with `*`/`#` wildcards.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] for empty patterns or empty segments.
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        if pattern.is_empty() {
            return Err(PatternError::Empty);
        }

        let mut segments = Vec::new();
        for raw in pattern.split('.') {
            match raw {
                "" => return Err(PatternError::EmptySegment),
                "*" => segments.push(Segment::Single),
                "#" => segments.push(Segment::Multi),
                literal => segments.push(Segment::Literal(literal.to_string())),
            }
        }

        Ok(Self {
            source: pattern.to_string(),
            segments,
        })
    }

    /// The original pattern string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether this pattern matches the given routing key.
    #[must_use]
    pub fn matches(&self, routing_key: &str) -> bool {
        let key: Vec<&str> = routing_key.split('.').collect();
        Self::matches_segments(&self.segments, &key)
    }

    fn matches_segments(pattern: &[Segment], key: &[&str]) -> bool {
        let Some((head, rest)) = pattern.split_first() else {
            return key.is_empty();
        };

        match head {
            Segment::Literal(lit) => key.split_first().is_some_and(|(first, tail)| {
                *first == lit.as_str() && Self::matches_segments(rest, tail)
            }),
            Segment::Single => key
                .split_first()
                .is_some_and(|(_, tail)| Self::matches_segments(rest, tail)),
            Segment::Multi => (0..=key.len())
                .any(|skip| key.get(skip..).is_some_and(|tail| Self::matches_segments(rest, tail))),
        }
    }
}

impl std::fmt::Display for BindingPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

/// Exchange routing behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExchangeKind {
    /// Topic exchange: fan out to every bound queue whose pattern matches
    /// the routing key.
    Topic,
}

/// A declared exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExchangeSpec {
    /// Exchange name.
    pub name: String,
    /// Routing behavior.
    pub kind: ExchangeKind,
    /// Whether the exchange survives a broker restart.
    pub durable: bool,
}

/// A declared queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueSpec {
    /// Queue name.
    pub name: String,
    /// Whether the queue and its messages survive a broker restart.
    pub durable: bool,
    /// Queue that receives messages rejected without requeue, if any.
    pub dead_letter: Option<String>,
}

/// A queue-to-exchange binding with a routing-key pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindingSpec {
    /// Bound queue name.
    pub queue: String,
    /// Source exchange name.
    pub exchange: String,
    /// Routing-key pattern (unparsed; validated at declaration time).
    pub pattern: String,
}

/// Errors raised by [`Topology::validate`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    /// A binding references an exchange the topology does not declare.
    #[error("binding for queue '{queue}' references undeclared exchange '{exchange}'")]
    UnknownExchange {
        /// The bound queue.
        queue: String,
        /// The missing exchange.
        exchange: String,
    },

    /// A binding references a queue the topology does not declare.
    #[error("binding references undeclared queue '{queue}'")]
    UnknownQueue {
        /// The missing queue.
        queue: String,
    },

    /// A queue names a dead-letter target the topology does not declare.
    #[error("queue '{queue}' names undeclared dead-letter queue '{dead_letter}'")]
    UnknownDeadLetter {
        /// The declaring queue.
        queue: String,
        /// The missing dead-letter queue.
        dead_letter: String,
    },

    /// A binding pattern failed to parse.
    #[error("invalid binding pattern '{pattern}' for queue '{queue}': {source}")]
    InvalidPattern {
        /// The bound queue.
        queue: String,
        /// The offending pattern.
        pattern: String,
        /// Parse failure.
        source: PatternError,
    },

    /// The same name was declared twice with different properties.
    #[error("conflicting declarations for '{name}'")]
    Conflict {
        /// The doubly-declared name.
        name: String,
    },
}

/// The set of exchanges, queues and bindings one service declares at startup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Topology {
    exchanges: Vec<ExchangeSpec>,
    queues: Vec<QueueSpec>,
    bindings: Vec<BindingSpec>,
}

impl Topology {
    /// Start an empty topology.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a durable topic exchange.
    #[must_use]
    pub fn exchange(mut self, name: &str) -> Self {
        self.exchanges.push(ExchangeSpec {
            name: name.to_string(),
            kind: ExchangeKind::Topic,
            durable: true,
        });
        self
    }

    /// Declare a durable queue without a dead-letter target.
    #[must_use]
    pub fn queue(mut self, name: &str) -> Self {
        self.queues.push(QueueSpec {
            name: name.to_string(),
            durable: true,
            dead_letter: None,
        });
        self
    }

    /// Declare a durable queue plus the dead-letter queue it rejects into.
    #[must_use]
    pub fn queue_with_dead_letter(mut self, name: &str, dead_letter: &str) -> Self {
        self.queues.push(QueueSpec {
            name: name.to_string(),
            durable: true,
            dead_letter: Some(dead_letter.to_string()),
        });
        self.queue(dead_letter)
    }

    /// Bind a queue to an exchange with a routing-key pattern.
    #[must_use]
    pub fn bind(mut self, queue: &str, exchange: &str, pattern: &str) -> Self {
        self.bindings.push(BindingSpec {
            queue: queue.to_string(),
            exchange: exchange.to_string(),
            pattern: pattern.to_string(),
        });
        self
    }

    /// Declared exchanges.
    #[must_use]
    pub fn exchanges(&self) -> &[ExchangeSpec] {
        &self.exchanges
    }

    /// Declared queues.
    #[must_use]
    pub fn queues(&self) -> &[QueueSpec] {
        &self.queues
    }

    /// Declared bindings.
    #[must_use]
    pub fn bindings(&self) -> &[BindingSpec] {
        &self.bindings
    }

    /// Check the topology for internal consistency.
    ///
    /// Transports call this before declaring anything, so a bad pattern or a
    /// dangling reference fails at startup rather than at first use.
    ///
    /// # Errors
    ///
    /// Returns the first [`TopologyError`] found: dangling exchange/queue
    /// references, undeclared dead-letter targets, invalid patterns, or
    /// conflicting duplicate declarations.
    pub fn validate(&self) -> Result<(), TopologyError> {
        for exchange in &self.exchanges {
            let conflicting = self
                .exchanges
                .iter()
                .any(|other| other.name == exchange.name && other != exchange);
            if conflicting {
                return Err(TopologyError::Conflict {
                    name: exchange.name.clone(),
                });
            }
        }

        for queue in &self.queues {
            let conflicting = self
                .queues
                .iter()
                .any(|other| other.name == queue.name && other != queue);
            if conflicting {
                return Err(TopologyError::Conflict {
                    name: queue.name.clone(),
                });
            }

            if let Some(dead_letter) = &queue.dead_letter {
                if !self.queues.iter().any(|q| &q.name == dead_letter) {
                    return Err(TopologyError::UnknownDeadLetter {
                        queue: queue.name.clone(),
                        dead_letter: dead_letter.clone(),
                    });
                }
            }
        }

        for binding in &self.bindings {
            if !self.exchanges.iter().any(|e| e.name == binding.exchange) {
                return Err(TopologyError::UnknownExchange {
                    queue: binding.queue.clone(),
                    exchange: binding.exchange.clone(),
                });
            }
            if !self.queues.iter().any(|q| q.name == binding.queue) {
                return Err(TopologyError::UnknownQueue {
                    queue: binding.queue.clone(),
                });
            }
            if let Err(source) = BindingPattern::parse(&binding.pattern) {
                return Err(TopologyError::InvalidPattern {
                    queue: binding.queue.clone(),
                    pattern: binding.pattern.clone(),
                    source,
                });
            }
        }

        Ok(())
    }
}
