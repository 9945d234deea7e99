//! # Bazaar Testing
//!
//! Testing utilities for the Bazaar choreography layer:
//!
//! - [`broker::InMemoryBroker`]: a complete single-process topic exchange
//!   implementing the `Broker` trait, so every choreography scenario runs
//!   without external infrastructure
//! - [`mocks::FixedClock`] / [`mocks::test_clock`]: deterministic time
//!
//! The in-memory broker is not a stub: wildcard bindings, per-queue in-order
//! delivery, manual acknowledgment, redelivery counting and dead-letter
//! routing all behave as the transport contract specifies, which is what
//! makes the acknowledgment-based retry paths testable.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod broker;

use bazaar_core::environment::Clock;
use chrono::{DateTime, Utc};

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests.
    ///
    /// Always returns the same time, making timestamps reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use bazaar_testing::mocks::FixedClock;
    /// use bazaar_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone, Copy)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a fixed clock pinned to the given instant.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Default fixed clock for tests (2025-01-01 00:00:00 UTC).
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse, which cannot happen.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

pub use broker::InMemoryBroker;
pub use mocks::{FixedClock, test_clock};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_is_deterministic() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }
}
