use crate::models::analytics::{MarketStats, PortfolioMetrics};
use crate::models::asset::Asset;
use crate::models::portfolio::{Portfolio, ValuedHolding};

/// Read-only summaries over the market snapshot and the valued portfolio.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalyticsService;

impl AnalyticsService {
    pub fn new() -> Self {
        Self
    }

    /// Assets whose name or symbol contains `query`, case-insensitively.
    /// An empty (or whitespace) query matches everything.
    pub fn search_assets<'a>(&self, snapshot: &'a [Asset], query: &str) -> Vec<&'a Asset> {
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return snapshot.iter().collect();
        }
        snapshot
            .iter()
            .filter(|a| a.name.to_lowercase().contains(&q) || a.symbol.to_lowercase().contains(&q))
            .collect()
    }

    /// Market-wide totals. An empty snapshot yields all zeros.
    pub fn market_stats(&self, snapshot: &[Asset]) -> MarketStats {
        if snapshot.is_empty() {
            return MarketStats::default();
        }

        let total_market_cap = snapshot.iter().map(|a| a.market_cap).sum();
        let change_sum: f64 = snapshot.iter().map(|a| a.price_change_percentage_24h).sum();

        MarketStats {
            total_market_cap,
            average_change_24h: change_sum / snapshot.len() as f64,
            gainers: snapshot
                .iter()
                .filter(|a| a.price_change_percentage_24h > 0.0)
                .count(),
            losers: snapshot
                .iter()
                .filter(|a| a.price_change_percentage_24h < 0.0)
                .count(),
        }
    }

    /// Best/worst performers and gain/loss split.
    ///
    /// Ties keep the earlier holding (insertion order).
    pub fn portfolio_metrics(&self, portfolio: &Portfolio) -> PortfolioMetrics {
        let holdings = &portfolio.holdings;
        if holdings.is_empty() {
            return PortfolioMetrics::default();
        }

        let mut best: &ValuedHolding = &holdings[0];
        let mut worst: &ValuedHolding = &holdings[0];
        for h in &holdings[1..] {
            if h.profit_loss_percentage > best.profit_loss_percentage {
                best = h;
            }
            if h.profit_loss_percentage < worst.profit_loss_percentage {
                worst = h;
            }
        }

        let return_sum: f64 = holdings.iter().map(|h| h.profit_loss_percentage).sum();

        PortfolioMetrics {
            holding_count: holdings.len(),
            best_performer: Some(best.clone()),
            worst_performer: Some(worst.clone()),
            average_return_percentage: return_sum / holdings.len() as f64,
            total_gains: holdings
                .iter()
                .filter(|h| h.profit_loss > 0.0)
                .map(|h| h.profit_loss)
                .sum(),
            total_losses: holdings
                .iter()
                .filter(|h| h.profit_loss < 0.0)
                .map(|h| -h.profit_loss)
                .sum(),
        }
    }
}
