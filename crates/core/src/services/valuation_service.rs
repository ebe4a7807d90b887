use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::asset::Asset;
use crate::models::holding::Holding;
use crate::models::portfolio::{HoldingSortOrder, Portfolio, ValuedHolding};

/// Values holdings against a catalog snapshot.
///
/// Pure business logic with no I/O, clock or state. The same inputs always
/// produce the same `Portfolio`, so callers simply re-run it after any
/// change instead of patching a previous result.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValuationService;

impl ValuationService {
    pub fn new() -> Self {
        Self
    }

    /// Build the portfolio for `holdings` at the prices in `snapshot`.
    ///
    /// Holdings whose asset is missing from the snapshot are skipped; they
    /// contribute to neither the list nor the totals.
    pub fn value(&self, snapshot: &[Asset], holdings: &[Holding]) -> Portfolio {
        if snapshot.is_empty() || holdings.is_empty() {
            return Portfolio::default();
        }

        // First entry wins on duplicate ids.
        let mut by_id: HashMap<&str, &Asset> = HashMap::with_capacity(snapshot.len());
        for asset in snapshot {
            by_id.entry(asset.id.as_str()).or_insert(asset);
        }

        let mut valued: Vec<ValuedHolding> = holdings
            .iter()
            .filter_map(|h| by_id.get(h.asset_id.as_str()).map(|a| Self::value_one(h, a)))
            .collect();

        let total_value: f64 = valued.iter().map(|v| v.value).sum();
        let total_profit_loss: f64 = valued.iter().map(|v| v.profit_loss).sum();
        let total_purchase_value = total_value - total_profit_loss;

        for v in &mut valued {
            v.allocation_percentage = percentage(v.value, total_value);
        }

        Portfolio {
            holdings: valued,
            total_value,
            total_profit_loss,
            total_profit_loss_percentage: percentage(total_profit_loss, total_purchase_value),
        }
    }

    /// A sorted copy of the portfolio's holdings. The portfolio itself keeps
    /// insertion order.
    ///
    /// All orders are stable. Value, performance and amount sort descending;
    /// name sorts ascending, case-insensitively.
    pub fn sort_holdings(&self, portfolio: &Portfolio, order: HoldingSortOrder) -> Vec<ValuedHolding> {
        let mut holdings = portfolio.holdings.clone();
        match order {
            HoldingSortOrder::Value => holdings.sort_by(|a, b| desc(a.value, b.value)),
            HoldingSortOrder::Performance => holdings
                .sort_by(|a, b| desc(a.profit_loss_percentage, b.profit_loss_percentage)),
            HoldingSortOrder::Name => {
                holdings.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
            }
            HoldingSortOrder::Amount => holdings.sort_by(|a, b| desc(a.amount, b.amount)),
        }
        holdings
    }

    fn value_one(holding: &Holding, asset: &Asset) -> ValuedHolding {
        let value = holding.amount * asset.current_price;
        let purchase_value = holding.purchase_value();
        let profit_loss = value - purchase_value;

        ValuedHolding {
            holding_id: holding.id.clone(),
            asset_id: asset.id.clone(),
            symbol: asset.symbol.clone(),
            name: asset.name.clone(),
            image: asset.image.clone(),
            amount: holding.amount,
            purchase_price: holding.purchase_price,
            current_price: asset.current_price,
            price_change_percentage_24h: asset.price_change_percentage_24h,
            value,
            profit_loss,
            profit_loss_percentage: percentage(profit_loss, purchase_value),
            allocation_percentage: 0.0, // filled once the total is known
        }
    }
}

/// `part / whole × 100`, or 0 when `whole` is not positive.
fn percentage(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}

fn desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}
