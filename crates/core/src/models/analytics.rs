use serde::{Deserialize, Serialize};

use super::portfolio::ValuedHolding;

/// Aggregates over the whole market snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketStats {
    /// Sum of market capitalization of all tracked assets
    pub total_market_cap: f64,

    /// Unweighted mean of the 24h price changes
    pub average_change_24h: f64,

    /// Assets whose price rose in the last 24h
    pub gainers: usize,

    /// Assets whose price fell in the last 24h
    pub losers: usize,
}

/// Performance breakdown of a valued portfolio.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    pub holding_count: usize,

    /// Highest profit/loss percentage
    pub best_performer: Option<ValuedHolding>,

    /// Lowest profit/loss percentage
    pub worst_performer: Option<ValuedHolding>,

    /// Unweighted mean of the holdings' profit/loss percentages
    pub average_return_percentage: f64,

    /// Sum of positive profit/loss
    pub total_gains: f64,

    /// Absolute sum of negative profit/loss
    pub total_losses: f64,
}
