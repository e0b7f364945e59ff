use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use outlay_core::config::CurrencyConfig;
use outlay_core::currency::{ConversionError, CurrencyConverter};

/// Exchange-rate client against an `exchangerate-api`-style endpoint:
/// `GET {base_url}/latest/{FROM}` returns `{"rates": {"USD": 1.08, ...}}`.
pub struct HttpRateClient {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

#[derive(Debug, Deserialize)]
struct RatesResponse {
    rates: HashMap<String, f64>,
}

impl HttpRateClient {
    pub fn from_config(config: &CurrencyConfig) -> Result<Self, ConversionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConversionError::Lookup(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl CurrencyConverter for HttpRateClient {
    async fn convert(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<Decimal, ConversionError> {
        let from = from.trim().to_ascii_uppercase();
        let to = to.trim().to_ascii_uppercase();
        if from == to {
            return Ok(amount);
        }

        let url = format!("{}/latest/{}", self.base_url, from);
        let mut request = self.client.get(&url);
        if let Some(api_key) = &self.api_key {
            request = request.query(&[("apiKey", api_key.expose_secret())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ConversionError::Lookup(e.to_string()))?
            .error_for_status()
            .map_err(|e| ConversionError::Lookup(e.to_string()))?;

        let body: RatesResponse =
            response.json().await.map_err(|e| ConversionError::Lookup(e.to_string()))?;

        let rate = body
            .rates
            .get(&to)
            .copied()
            .ok_or_else(|| ConversionError::UnsupportedPair { from: from.clone(), to: to.clone() })?;
        let rate = Decimal::try_from(rate)
            .map_err(|e| ConversionError::Lookup(format!("unrepresentable rate {rate}: {e}")))?;

        debug!(
            event_name = "currency.rate_resolved",
            from = %from,
            to = %to,
            rate = %rate,
            "exchange rate resolved"
        );

        Ok(amount * rate)
    }
}
