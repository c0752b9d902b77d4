use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Deserializer};
use services::{
    Result,
    gas_oracle::{GasFeeSuggestion, port::Api},
    request::guarded,
};
use tracing::debug;
use url::Url;

use crate::error::Error;

/// Public gas tracker endpoint. An API key can be appended as `&apikey=...`.
pub const DEFAULT_GAS_ORACLE_URL: &str =
    "https://api.etherscan.io/api?module=gastracker&action=gasoracle";

const STATUS_OK: u64 = 1;

/// Gas price suggestions from the Etherscan gas tracker.
#[derive(Debug, Clone)]
pub struct EtherscanGasOracle {
    client: Client,
    url: Url,
    timeout: Duration,
}

impl EtherscanGasOracle {
    pub fn new(url: Url, timeout: Duration) -> crate::error::Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .use_rustls_tls()
            .build()?;

        Ok(Self {
            client,
            url,
            timeout,
        })
    }

    async fn fetch(&self) -> crate::error::Result<GasFeeSuggestion> {
        let response = self.client.get(self.url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(Error::Http(response.status()));
        }

        let response: OracleResponse = response.json().await?;
        if response.status != STATUS_OK {
            let reason = match response.result {
                OracleResult::Message(message) => format!("{}: {message}", response.message),
                OracleResult::Prices(_) => response.message,
            };
            return Err(Error::Rejected(reason));
        }

        let OracleResult::Prices(prices) = response.result else {
            return Err(Error::Other("gas oracle returned no prices".to_string()));
        };

        Ok(GasFeeSuggestion {
            slow_gwei: prices.safe_gas_price,
            standard_gwei: prices.propose_gas_price,
            fast_gwei: prices.fast_gas_price,
        })
    }
}

impl Api for EtherscanGasOracle {
    async fn gas_prices(&self) -> Result<GasFeeSuggestion> {
        debug!(
            "Fetching gas prices from {}",
            self.url.host_str().unwrap_or_default()
        );
        guarded(self.timeout, "gasoracle", async {
            self.fetch().await.map_err(services::Error::from)
        })
        .await
    }
}

#[derive(Debug, Deserialize)]
struct OracleResponse {
    #[serde(deserialize_with = "quoted")]
    status: u64,
    message: String,
    result: OracleResult,
}

/// A successful call carries prices, a rejected one a plain message.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OracleResult {
    Prices(GasPrices),
    Message(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GasPrices {
    #[serde(deserialize_with = "quoted")]
    safe_gas_price: f64,
    #[serde(deserialize_with = "quoted")]
    propose_gas_price: f64,
    #[serde(deserialize_with = "quoted")]
    fast_gas_price: f64,
}

/// Etherscan quotes every number, gas prices may carry a fractional part.
fn quoted<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let value = String::deserialize(deserializer)?;
    value.trim().parse().map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_quoted_prices() {
        // given
        let body = json!({
            "status": "1",
            "message": "OK",
            "result": {
                "LastBlock": "19000000",
                "SafeGasPrice": "12",
                "ProposeGasPrice": "13.5",
                "FastGasPrice": "15",
                "suggestBaseFeee": "11.9",
                "gasUsedRatio": "0.4,0.5"
            }
        });

        // when
        let response: OracleResponse = serde_json::from_value(body).unwrap();

        // then
        assert_eq!(response.status, 1);
        let OracleResult::Prices(prices) = response.result else {
            panic!("expected prices");
        };
        assert_eq!(prices.propose_gas_price, 13.5);
    }

    #[test]
    fn unquoted_status_is_rejected() {
        let body = json!({"status": 1, "message": "OK", "result": "x"});

        assert!(serde_json::from_value::<OracleResponse>(body).is_err());
    }
}
