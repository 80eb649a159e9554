use async_trait::async_trait;
use serde::Deserialize;

use super::{get_json, validate_price, PriceSource};
use crate::error::FeedError;
use crate::market_data::types::FeedSource;

/// `{ "USD": <number> }`
#[derive(Debug, Deserialize)]
struct UsdPrice {
    #[serde(rename = "USD")]
    usd: f64,
}

pub fn parse_price(body: &serde_json::Value) -> Result<f64, FeedError> {
    let price: UsdPrice = serde_json::from_value(body.clone())
        .map_err(|e| FeedError::MalformedPayload(format!("cryptocompare: {e}")))?;
    validate_price(price.usd)
}

/// Secondary price source.
pub struct CryptoCompareSource {
    client: reqwest::Client,
    url: String,
}

impl CryptoCompareSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl PriceSource for CryptoCompareSource {
    fn name(&self) -> &'static str {
        "cryptocompare"
    }

    fn kind(&self) -> FeedSource {
        FeedSource::Secondary
    }

    async fn fetch_price(&self) -> Result<f64, FeedError> {
        let body = get_json(&self.client, &self.url).await?;
        parse_price(&body)
    }
}
