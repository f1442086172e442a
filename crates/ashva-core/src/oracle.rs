//! Token price sources.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{MembershipError, MembershipResult};

/// Source of the current token price in USD
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn current_price(&self) -> MembershipResult<Decimal>;
}

/// Always returns the configured price
#[derive(Debug, Clone, Copy)]
pub struct StaticPriceOracle {
    price: Decimal,
}

impl StaticPriceOracle {
    pub fn new(price: Decimal) -> Self {
        Self { price }
    }
}

#[async_trait]
impl PriceOracle for StaticPriceOracle {
    async fn current_price(&self) -> MembershipResult<Decimal> {
        Ok(self.price)
    }
}

/// Wraps a live oracle with a timeout and a static fallback price.
///
/// `current_price` never fails: timeouts, upstream errors and non-positive
/// quotes are logged and replaced by the fallback.
pub struct FallbackPriceOracle<O> {
    inner: O,
    fallback: Decimal,
    timeout: Duration,
}

impl<O: PriceOracle> FallbackPriceOracle<O> {
    pub fn new(inner: O, fallback: Decimal, timeout: Duration) -> Self {
        Self {
            inner,
            fallback,
            timeout,
        }
    }

    pub fn fallback(&self) -> Decimal {
        self.fallback
    }

    async fn fetch(&self) -> MembershipResult<Decimal> {
        let price = tokio::time::timeout(self.timeout, self.inner.current_price())
            .await
            .map_err(|_| {
                MembershipError::UpstreamUnavailable(format!(
                    "price fetch timed out after {:?}",
                    self.timeout
                ))
            })??;

        if price <= Decimal::ZERO {
            return Err(MembershipError::UpstreamUnavailable(format!(
                "price source returned non-positive price {}",
                price
            )));
        }

        Ok(price)
    }
}

#[async_trait]
impl<O: PriceOracle> PriceOracle for FallbackPriceOracle<O> {
    async fn current_price(&self) -> MembershipResult<Decimal> {
        match self.fetch().await {
            Ok(price) => {
                debug!("Fetched token price {}", price);
                Ok(price)
            }
            Err(e) => {
                warn!("Using fallback token price {}: {}", self.fallback, e);
                Ok(self.fallback)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    struct FailingOracle;

    #[async_trait]
    impl PriceOracle for FailingOracle {
        async fn current_price(&self) -> MembershipResult<Decimal> {
            Err(MembershipError::UpstreamUnavailable("dex offline".to_string()))
        }
    }

    struct SlowOracle;

    #[async_trait]
    impl PriceOracle for SlowOracle {
        async fn current_price(&self) -> MembershipResult<Decimal> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(dec!(9.99))
        }
    }

    #[tokio::test]
    async fn passes_through_live_price() {
        let oracle = FallbackPriceOracle::new(
            StaticPriceOracle::new(dec!(0.42)),
            dec!(0.1),
            Duration::from_secs(1),
        );
        assert_eq!(oracle.current_price().await.unwrap(), dec!(0.42));
    }

    #[tokio::test]
    async fn falls_back_on_upstream_error() {
        let oracle = FallbackPriceOracle::new(FailingOracle, dec!(0.1), Duration::from_secs(1));
        assert_eq!(oracle.current_price().await.unwrap(), dec!(0.1));
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_on_timeout() {
        let oracle = FallbackPriceOracle::new(SlowOracle, dec!(0.1), Duration::from_millis(50));
        assert_eq!(oracle.current_price().await.unwrap(), dec!(0.1));
    }

    #[tokio::test]
    async fn rejects_zero_quote() {
        let oracle = FallbackPriceOracle::new(
            StaticPriceOracle::new(Decimal::ZERO),
            dec!(0.2),
            Duration::from_secs(1),
        );
        assert_eq!(oracle.current_price().await.unwrap(), dec!(0.2));
    }
}
