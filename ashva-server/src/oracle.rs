//! HTTP price source.

use ashva_core::{MembershipError, MembershipResult, PriceOracle};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Reads the token price from a JSON endpoint at a JSON pointer, e.g. a DEX
/// pair API where `/pairs/0/priceUsd` holds the quote.
pub struct HttpPriceOracle {
    client: Client,
    url: String,
    pointer: String,
}

fn upstream(e: impl std::fmt::Display) -> MembershipError {
    MembershipError::UpstreamUnavailable(e.to_string())
}

impl HttpPriceOracle {
    pub fn new(url: impl Into<String>, pointer: impl Into<String>, timeout: Duration) -> MembershipResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(upstream)?;
        Ok(Self {
            client,
            url: url.into(),
            pointer: pointer.into(),
        })
    }

    fn extract(&self, body: &Value) -> MembershipResult<Decimal> {
        let value = body.pointer(&self.pointer).ok_or_else(|| {
            upstream(format!("no price at {} in oracle response", self.pointer))
        })?;

        match value {
            Value::String(s) => Decimal::from_str(s.trim()).map_err(upstream),
            Value::Number(n) => Decimal::from_str(&n.to_string())
                .or_else(|_| Decimal::from_scientific(&n.to_string()))
                .map_err(upstream),
            other => Err(upstream(format!("unexpected price value: {}", other))),
        }
    }
}

#[async_trait]
impl PriceOracle for HttpPriceOracle {
    async fn current_price(&self) -> MembershipResult<Decimal> {
        let response = self.client.get(&self.url).send().await.map_err(upstream)?;

        if !response.status().is_success() {
            return Err(upstream(format!(
                "price oracle returned {}",
                response.status()
            )));
        }

        let body: Value = response.json().await.map_err(upstream)?;
        let price = self.extract(&body)?;
        debug!("Price oracle quoted {}", price);
        Ok(price)
    }
}
