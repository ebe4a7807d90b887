use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::asset::Asset;
use crate::errors::CoreError;

/// A user's position in one asset.
///
/// `asset_id` is a foreign key into the market catalog and is allowed to
/// dangle: a coin that drops out of the top-N simply stops being valued.
/// `symbol`, `name` and `image` are copies taken when the holding was added.
///
/// Serialized with camelCase keys; this is the persisted format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    /// Unique identifier, stable across edits. New holdings get a v4 uuid;
    /// older envelopes may carry any other string (e.g. a millisecond stamp).
    pub id: String,

    /// Catalog id of the held asset
    #[serde(rename = "cryptoId")]
    pub asset_id: String,

    pub symbol: String,

    pub name: String,

    #[serde(default)]
    pub image: String,

    /// Units owned
    pub amount: f64,

    /// Average purchase price per unit in USD. Zero means "not recorded".
    #[serde(default)]
    pub purchase_price: f64,
}

impl Holding {
    /// Create a holding for `asset`, copying its display fields.
    /// Always generates a fresh id.
    pub fn new(asset: &Asset, amount: f64, purchase_price: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            asset_id: asset.id.clone(),
            symbol: asset.symbol.clone(),
            name: asset.name.clone(),
            image: asset.image.clone(),
            amount,
            purchase_price,
        }
    }

    /// Total paid for this position (`amount × purchase_price`).
    pub fn purchase_value(&self) -> f64 {
        self.amount * self.purchase_price
    }
}

/// Validated amount / purchase price pair coming from the presentation layer.
///
/// Policy: the amount must be finite and strictly positive, the purchase
/// price finite and non-negative (zero is accepted as "unknown").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoldingInput {
    pub amount: f64,
    pub purchase_price: f64,
}

impl HoldingInput {
    pub fn new(amount: f64, purchase_price: f64) -> Result<Self, CoreError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(CoreError::ValidationError(format!(
                "Amount must be a positive number, got {amount}"
            )));
        }
        if !purchase_price.is_finite() || purchase_price < 0.0 {
            return Err(CoreError::ValidationError(format!(
                "Purchase price must be zero or a positive number, got {purchase_price}"
            )));
        }
        Ok(Self {
            amount,
            purchase_price,
        })
    }

    /// Parse raw form text. Missing or non-numeric fields are rejected.
    pub fn parse(amount: &str, purchase_price: &str) -> Result<Self, CoreError> {
        let amount = parse_field("Amount", amount)?;
        let purchase_price = parse_field("Purchase price", purchase_price)?;
        Self::new(amount, purchase_price)
    }
}

fn parse_field(label: &str, raw: &str) -> Result<f64, CoreError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CoreError::ValidationError(format!("{label} is required")));
    }
    trimmed
        .parse::<f64>()
        .map_err(|_| CoreError::ValidationError(format!("{label} is not a number: '{trimmed}'")))
}
