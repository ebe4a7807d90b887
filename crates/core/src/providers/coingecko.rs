use async_trait::async_trait;
use reqwest::Client;

use super::traits::MarketDataProvider;
use crate::errors::CoreError;
use crate::models::asset::Asset;
use crate::models::settings::Settings;

const PROVIDER_NAME: &str = "CoinGecko";
const API_KEY_HEADER: &str = "x-cg-demo-api-key";

/// CoinGecko `/coins/markets` provider.
///
/// - **Free**: works without a key; a demo key raises the rate limit.
/// - **Data**: top-N coins by market cap with price, 24h change, volume.
/// - **Endpoint**: `/coins/markets?vs_currency=usd&order=market_cap_desc&...`
pub struct CoinGeckoProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    vs_currency: String,
    per_page: u32,
}

impl CoinGeckoProvider {
    pub fn new(settings: &Settings) -> Self {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            vs_currency: settings.vs_currency.to_lowercase(),
            per_page: settings.per_page,
        }
    }

    /// Point the provider at another host (mock servers, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn markets_url(&self) -> String {
        format!("{}/coins/markets", self.base_url)
    }

    fn query(&self) -> [(&'static str, String); 6] {
        [
            ("vs_currency", self.vs_currency.clone()),
            ("order", "market_cap_desc".to_string()),
            ("per_page", self.per_page.to_string()),
            ("page", "1".to_string()),
            ("sparkline", "false".to_string()),
            ("price_change_percentage", "24h".to_string()),
        ]
    }
}

impl Default for CoinGeckoProvider {
    fn default() -> Self {
        Self::new(&Settings::default())
    }
}

#[async_trait]
impl MarketDataProvider for CoinGeckoProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn fetch_markets(&self) -> Result<Vec<Asset>, CoreError> {
        let mut request = self.client.get(self.markets_url()).query(&self.query());
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CoreError::HttpStatus {
                status: status.as_u16(),
            });
        }

        resp.json::<Vec<Asset>>().await.map_err(|e| CoreError::Api {
            provider: PROVIDER_NAME.into(),
            message: format!("Failed to parse markets response: {e}"),
        })
    }
}
