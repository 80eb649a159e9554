use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

use super::{get_json, validate_price, PriceSource};
use crate::error::FeedError;
use crate::market_data::types::FeedSource;

/// `{ "<asset_id>": { "usd": <number> } }`
#[derive(Debug, Deserialize)]
struct UsdQuote {
    usd: f64,
}

pub fn parse_price(body: &serde_json::Value, asset_id: &str) -> Result<f64, FeedError> {
    let quotes: HashMap<String, UsdQuote> = serde_json::from_value(body.clone())
        .map_err(|e| FeedError::MalformedPayload(format!("coingecko: {e}")))?;

    let quote = quotes
        .get(asset_id)
        .ok_or_else(|| FeedError::MalformedPayload(format!("coingecko: no quote for `{asset_id}`")))?;

    validate_price(quote.usd)
}

/// Primary price source.
pub struct CoinGeckoSource {
    client: reqwest::Client,
    url: String,
    asset_id: String,
}

impl CoinGeckoSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>, asset_id: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            asset_id: asset_id.into(),
        }
    }
}

#[async_trait]
impl PriceSource for CoinGeckoSource {
    fn name(&self) -> &'static str {
        "coingecko"
    }

    fn kind(&self) -> FeedSource {
        FeedSource::Primary
    }

    async fn fetch_price(&self) -> Result<f64, FeedError> {
        let body = get_json(&self.client, &self.url).await?;
        parse_price(&body, &self.asset_id)
    }
}
