use serde::{Deserialize, Serialize};

/// A holding joined with the current market price of its asset.
/// Derived on every valuation pass, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuedHolding {
    pub holding_id: String,
    pub asset_id: String,
    pub symbol: String,
    pub name: String,
    pub image: String,
    pub amount: f64,
    pub purchase_price: f64,
    pub current_price: f64,
    pub price_change_percentage_24h: f64,

    /// `amount × current_price`
    pub value: f64,

    /// `value − amount × purchase_price`
    pub profit_loss: f64,

    /// Return on the purchase value in percent; 0 when nothing was paid
    pub profit_loss_percentage: f64,

    /// Share of the portfolio's total value in percent
    pub allocation_percentage: f64,
}

/// The valued portfolio.
///
/// `holdings` keeps store insertion order. Sorted views are produced by
/// `ValuationService::sort_holdings` and never written back here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub holdings: Vec<ValuedHolding>,
    pub total_value: f64,
    pub total_profit_loss: f64,
    pub total_profit_loss_percentage: f64,
}

impl Portfolio {
    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }

    /// Total paid for the valued holdings.
    pub fn total_purchase_value(&self) -> f64 {
        self.total_value - self.total_profit_loss
    }
}

/// Sort keys offered to the presentation layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HoldingSortOrder {
    /// Largest current value first (default)
    #[default]
    Value,
    /// Best profit/loss percentage first
    Performance,
    /// Alphabetical by asset name
    Name,
    /// Largest amount first
    Amount,
}
