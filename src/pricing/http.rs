//! CoinGecko-compatible REST price resolver.

use super::{PriceError, PriceResolver};
use crate::domain::{Asset, Decimal, TimeMs};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Symbols priced at exactly one dollar without a network call.
const USD_PEGGED: &[&str] = &["USD", "USDT", "USDC", "DAI", "BUSD"];

/// Resolver backed by the `/simple/price` and `/coins/{id}/history` endpoints.
#[derive(Debug, Clone)]
pub struct HttpPriceResolver {
    client: Client,
    base_url: String,
}

impl HttpPriceResolver {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_json(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value, PriceError> {
        let url = format!("{}{}", self.base_url, path);
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(20)),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self
                .client
                .get(&url)
                .query(query)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(PriceError::NetworkError(e.to_string())))?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(PriceError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(PriceError::HttpError {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if status == 404 {
                return Ok(serde_json::Value::Null);
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(PriceError::HttpError {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| backoff::Error::permanent(PriceError::ParseError(e.to_string())))
        })
        .await
    }
}

#[async_trait]
impl PriceResolver for HttpPriceResolver {
    async fn current_price(&self, asset: &Asset) -> Result<Option<Decimal>, PriceError> {
        if is_usd_pegged(asset) {
            return Ok(Some(Decimal::one()));
        }
        let id = coin_id(asset);
        debug!(asset = %asset, coin_id = %id, "Fetching current price");

        let response = self
            .get_json(
                "/simple/price",
                &[("ids", id.clone()), ("vs_currencies", "usd".to_string())],
            )
            .await?;
        parse_simple_price(&response, &id)
    }

    async fn historical_price(
        &self,
        asset: &Asset,
        at: TimeMs,
    ) -> Result<Option<Decimal>, PriceError> {
        if is_usd_pegged(asset) {
            return Ok(Some(Decimal::one()));
        }
        let id = coin_id(asset);
        let date = history_date(at)?;
        debug!(asset = %asset, coin_id = %id, date = %date, "Fetching historical price");

        let response = self
            .get_json(
                &format!("/coins/{}/history", id),
                &[("date", date), ("localization", "false".to_string())],
            )
            .await?;
        parse_history_price(&response)
    }
}

fn is_usd_pegged(asset: &Asset) -> bool {
    USD_PEGGED.contains(&asset.as_str())
}

/// Map a ticker to the oracle's coin id; unknown tickers fall back to lower-case.
fn coin_id(asset: &Asset) -> String {
    let id = match asset.as_str() {
        "BTC" => "bitcoin",
        "ETH" => "ethereum",
        "SOL" => "solana",
        "BNB" => "binancecoin",
        "XRP" => "ripple",
        "ADA" => "cardano",
        "DOGE" => "dogecoin",
        "DOT" => "polkadot",
        "MATIC" => "matic-network",
        "AVAX" => "avalanche-2",
        "LTC" => "litecoin",
        "LINK" => "chainlink",
        "ATOM" => "cosmos",
        other => return other.to_lowercase(),
    };
    id.to_string()
}

/// The history endpoint takes a UTC calendar date as `dd-mm-yyyy`.
fn history_date(at: TimeMs) -> Result<String, PriceError> {
    Utc.timestamp_millis_opt(at.as_ms())
        .single()
        .map(|dt| dt.format("%d-%m-%Y").to_string())
        .ok_or_else(|| PriceError::Other(format!("timestamp out of range: {}", at.as_ms())))
}

fn parse_simple_price(
    response: &serde_json::Value,
    coin_id: &str,
) -> Result<Option<Decimal>, PriceError> {
    match response.get(coin_id).and_then(|entry| entry.get("usd")) {
        None => Ok(None),
        Some(value) => parse_usd(value).map(Some),
    }
}

fn parse_history_price(response: &serde_json::Value) -> Result<Option<Decimal>, PriceError> {
    match response
        .get("market_data")
        .and_then(|m| m.get("current_price"))
        .and_then(|p| p.get("usd"))
    {
        None => Ok(None),
        Some(value) => parse_usd(value).map(Some),
    }
}

fn parse_usd(value: &serde_json::Value) -> Result<Decimal, PriceError> {
    value
        .as_f64()
        .and_then(Decimal::from_f64)
        .ok_or_else(|| PriceError::ParseError(format!("Invalid usd price: {}", value)))
}
