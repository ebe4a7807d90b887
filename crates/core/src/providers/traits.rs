use async_trait::async_trait;

use crate::errors::CoreError;
use crate::models::asset::Asset;

/// Source of the market catalog.
///
/// The production implementation talks to CoinGecko; tests plug in scripted
/// providers to control timing and failures.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Human-readable name of this provider (for logs/errors).
    fn name(&self) -> &str;

    /// Fetch the full list of tracked assets, ordered by market cap.
    /// The result replaces the previous snapshot entirely.
    async fn fetch_markets(&self) -> Result<Vec<Asset>, CoreError>;
}
