pub mod coingecko;
pub mod cryptocompare;

use async_trait::async_trait;

use crate::error::FeedError;
use crate::market_data::types::FeedSource;

/// A reference price endpoint.
///
/// Implementations report every failure as a [`FeedError`]; the feed decides
/// whether to fall through to the next source or simulate.
#[async_trait]
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Which slot of the fallback chain this source fills.
    fn kind(&self) -> FeedSource;

    async fn fetch_price(&self) -> Result<f64, FeedError>;
}

/// Shared response handling: 429 is a rate limit, any other non-2xx is an
/// HTTP failure, and the body must be JSON.
pub(crate) async fn get_json(
    client: &reqwest::Client,
    url: &str,
) -> Result<serde_json::Value, FeedError> {
    let res = client
        .get(url)
        .header(reqwest::header::CACHE_CONTROL, "no-store")
        .send()
        .await?;

    let status = res.status();
    if status.as_u16() == 429 {
        return Err(FeedError::RateLimited);
    }
    if !status.is_success() {
        return Err(FeedError::Http { status: status.as_u16() });
    }

    res.json::<serde_json::Value>()
        .await
        .map_err(|e| FeedError::MalformedPayload(e.to_string()))
}

/// Rejects NaN, infinities and non-positive quotes.
pub(crate) fn validate_price(price: f64) -> Result<f64, FeedError> {
    if price.is_finite() && price > 0.0 {
        Ok(price)
    } else {
        Err(FeedError::MalformedPayload(format!("unusable price {price}")))
    }
}
