use serde::{Deserialize, Deserializer, Serialize};

/// One tradable coin as reported by the market-data source.
///
/// Read-only from the engine's point of view: snapshots are replaced
/// wholesale, never patched. Prices are in USD.
///
/// Upstream occasionally reports `null` for market figures of freshly listed
/// coins; those deserialize to `0.0` so one incomplete record does not reject
/// the whole snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    /// Market-data identifier (e.g., "bitcoin")
    pub id: String,

    /// Ticker symbol as delivered by the source (e.g., "btc")
    pub symbol: String,

    /// Human-readable name (e.g., "Bitcoin")
    pub name: String,

    /// Logo URL
    #[serde(default)]
    pub image: String,

    /// Current price in USD
    #[serde(default, deserialize_with = "null_as_zero")]
    pub current_price: f64,

    #[serde(default, deserialize_with = "null_as_zero")]
    pub market_cap: f64,

    #[serde(default)]
    pub market_cap_rank: Option<u32>,

    /// 24h price change in percent
    #[serde(default, deserialize_with = "null_as_zero")]
    pub price_change_percentage_24h: f64,

    #[serde(default, deserialize_with = "null_as_zero")]
    pub total_volume: f64,
}

impl Asset {
    pub fn new(
        id: impl Into<String>,
        symbol: impl Into<String>,
        name: impl Into<String>,
        current_price: f64,
    ) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.into(),
            name: name.into(),
            current_price,
            ..Self::default()
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn with_change_24h(mut self, pct: f64) -> Self {
        self.price_change_percentage_24h = pct;
        self
    }

    pub fn with_market_cap(mut self, market_cap: f64, rank: u32) -> Self {
        self.market_cap = market_cap;
        self.market_cap_rank = Some(rank);
        self
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.total_volume = volume;
        self
    }
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}
