//! Payment gateway collaborator.
//!
//! The real gateway is an external system; this boundary simulates it with a
//! configurable random delay and success probability, matching the behavior
//! the rest of the choreography is built against (~90% approval).

use bazaar_contracts::{Money, OrderId, PaymentId};
use futures::future::BoxFuture;
use rand::Rng;
use std::time::Duration;
use thiserror::Error;

/// A declined or failed charge.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct GatewayError {
    /// Gateway-reported reason.
    pub message: String,
}

/// Charge settlement boundary.
pub trait PaymentGateway: Send + Sync {
    /// Attempt to charge the given amount for a payment.
    fn charge(
        &self,
        payment_id: PaymentId,
        order_id: OrderId,
        amount: Money,
    ) -> BoxFuture<'_, Result<(), GatewayError>>;
}

/// Tunables for [`SimulatedGateway`].
///
/// # Default Values
///
/// - `success_rate`: 0.9
/// - `min_delay`: 8 seconds
/// - `max_delay`: 10 seconds
#[derive(Debug, Clone, Copy)]
pub struct GatewayConfig {
    /// Probability in `[0, 1]` that a charge succeeds.
    pub success_rate: f64,
    /// Lower bound of the simulated processing delay.
    pub min_delay: Duration,
    /// Upper bound of the simulated processing delay.
    pub max_delay: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            success_rate: 0.9,
            min_delay: Duration::from_secs(8),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl GatewayConfig {
    /// Set the success probability, clamped to `[0, 1]`.
    #[must_use]
    pub fn with_success_rate(mut self, success_rate: f64) -> Self {
        self.success_rate = success_rate.clamp(0.0, 1.0);
        self
    }

    /// Set the simulated processing delay window.
    #[must_use]
    pub const fn with_delay(mut self, min: Duration, max: Duration) -> Self {
        self.min_delay = min;
        self.max_delay = max;
        self
    }
}

/// Gateway simulation: sleeps for a random delay inside the configured
/// window, then approves with the configured probability.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedGateway {
    config: GatewayConfig,
}

impl SimulatedGateway {
    /// Create a gateway from explicit tunables.
    #[must_use]
    pub const fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    /// Deterministic gateway that approves instantly. For tests and demos.
    #[must_use]
    pub fn always_approve() -> Self {
        Self::new(
            GatewayConfig::default()
                .with_success_rate(1.0)
                .with_delay(Duration::ZERO, Duration::ZERO),
        )
    }

    /// Deterministic gateway that declines instantly. For tests.
    #[must_use]
    pub fn always_decline() -> Self {
        Self::new(
            GatewayConfig::default()
                .with_success_rate(0.0)
                .with_delay(Duration::ZERO, Duration::ZERO),
        )
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new(GatewayConfig::default())
    }
}

impl PaymentGateway for SimulatedGateway {
    fn charge(
        &self,
        payment_id: PaymentId,
        order_id: OrderId,
        amount: Money,
    ) -> BoxFuture<'_, Result<(), GatewayError>> {
        let config = self.config;
        Box::pin(async move {
            let (delay, approved) = {
                let mut rng = rand::thread_rng();
                let delay = if config.max_delay > config.min_delay {
                    rng.gen_range(config.min_delay..=config.max_delay)
                } else {
                    config.min_delay
                };
                (delay, rng.gen_bool(config.success_rate))
            };

            tracing::info!(
                payment = %payment_id,
                order = %order_id,
                amount = %amount,
                delay_ms = delay.as_millis(),
                "Processing charge"
            );
            tokio::time::sleep(delay).await;

            if approved {
                Ok(())
            } else {
                Err(GatewayError {
                    message: "Payment processing failed".to_string(),
                })
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Panics: assertions in tests
mod tests {
    use super::*;

    #[tokio::test]
    async fn always_approve_settles_instantly() {
        let gateway = SimulatedGateway::always_approve();
        let result = gateway
            .charge(PaymentId::new(), OrderId::new(), Money::from_cents(10_00))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn always_decline_reports_the_failure_message() {
        let gateway = SimulatedGateway::always_decline();
        let err = gateway
            .charge(PaymentId::new(), OrderId::new(), Money::from_cents(10_00))
            .await
            .unwrap_err();
        assert_eq!(err.message, "Payment processing failed");
    }

    #[test]
    fn success_rate_is_clamped() {
        let config = GatewayConfig::default().with_success_rate(7.0);
        assert!((config.success_rate - 1.0).abs() < f64::EPSILON);
    }
}
