use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConversionError {
    #[error("cannot convert from {from} to {to}")]
    UnsupportedPair { from: String, to: String },
    #[error("rate lookup failed: {0}")]
    Lookup(String),
}

/// External exchange-rate service. Failures propagate to the submitter; the
/// core never retries conversions.
#[async_trait]
pub trait CurrencyConverter: Send + Sync {
    async fn convert(&self, from: &str, to: &str, amount: Decimal)
        -> Result<Decimal, ConversionError>;
}

/// Deterministic converter backed by a fixed rate table. Identity conversion
/// always succeeds.
#[derive(Clone, Debug, Default)]
pub struct FixedRateConverter {
    rates: HashMap<(String, String), Decimal>,
}

impl FixedRateConverter {
    pub fn with_rate(mut self, from: &str, to: &str, rate: Decimal) -> Self {
        self.rates.insert((normalize(from), normalize(to)), rate);
        self
    }
}

#[async_trait]
impl CurrencyConverter for FixedRateConverter {
    async fn convert(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<Decimal, ConversionError> {
        if normalize(from) == normalize(to) {
            return Ok(amount);
        }

        self.rates
            .get(&(normalize(from), normalize(to)))
            .map(|rate| amount * rate)
            .ok_or_else(|| ConversionError::UnsupportedPair {
                from: from.to_string(),
                to: to.to_string(),
            })
    }
}

fn normalize(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{ConversionError, CurrencyConverter, FixedRateConverter};

    #[tokio::test]
    async fn identity_conversion_is_free() {
        let converter = FixedRateConverter::default();
        let amount = Decimal::new(12_345, 2);
        assert_eq!(converter.convert("USD", "usd", amount).await, Ok(amount));
    }

    #[tokio::test]
    async fn fixed_rates_apply() {
        let converter = FixedRateConverter::default().with_rate("EUR", "USD", Decimal::new(110, 2));
        let converted = converter
            .convert("eur", "USD", Decimal::new(10_000, 2))
            .await
            .expect("conversion");
        assert_eq!(converted, Decimal::new(1_100_000, 4));
    }

    #[tokio::test]
    async fn unknown_pairs_fail() {
        let converter = FixedRateConverter::default();
        let error = converter
            .convert("EUR", "JPY", Decimal::ONE)
            .await
            .expect_err("missing rate must fail");
        assert!(matches!(error, ConversionError::UnsupportedPair { .. }));
    }
}
