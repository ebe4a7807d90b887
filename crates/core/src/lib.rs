pub mod clock;
pub mod errors;
pub mod models;
pub mod providers;
pub mod services;
pub mod storage;

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use clock::{Clock, SystemClock};
use errors::CoreError;
use models::{
    analytics::{MarketStats, PortfolioMetrics},
    asset::Asset,
    catalog::CatalogStatus,
    holding::{Holding, HoldingInput},
    portfolio::{HoldingSortOrder, Portfolio, ValuedHolding},
    settings::Settings,
};
use providers::{coingecko::CoinGeckoProvider, traits::MarketDataProvider};
use services::{
    analytics_service::AnalyticsService,
    catalog_service::{CatalogService, PollingHandle},
    holdings_store::HoldingsStore,
    valuation_service::ValuationService,
};
use storage::{kv::KeyValueStore, manager::StorageManager};

/// Main entry point for the crypto portfolio core library.
///
/// Owns the two inputs of the valuation (the catalog snapshot and the
/// holdings) plus the `Portfolio` derived from them. Every committed change
/// to either input is followed by a full valuation pass before the call
/// returns, so `portfolio()` is always consistent with `holdings()` and
/// `assets()`.
///
/// Lifecycle: `open` loads persisted holdings (dropping expired ones),
/// `start` begins background polling, `shutdown` (or drop) cancels it.
#[must_use]
pub struct PortfolioTracker {
    store: HoldingsStore,
    catalog: CatalogService,
    catalog_rx: watch::Receiver<CatalogStatus>,
    snapshot: Option<Arc<Vec<Asset>>>,
    portfolio: Portfolio,
    valuation_service: ValuationService,
    analytics_service: AnalyticsService,
    poller: Option<PollingHandle>,
}

impl std::fmt::Debug for PortfolioTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortfolioTracker")
            .field("holdings", &self.store.len())
            .field("assets", &self.assets().len())
            .field("valued", &self.portfolio.holdings.len())
            .field("total_value", &self.portfolio.total_value)
            .field("polling", &self.is_polling())
            .finish()
    }
}

impl PortfolioTracker {
    /// Build a tracker from explicit collaborators.
    pub fn open(
        settings: &Settings,
        provider: Arc<dyn MarketDataProvider>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CoreError> {
        let storage = StorageManager::new(store, clock, settings.expiry_window);
        let store = HoldingsStore::open(storage)?;
        let catalog = CatalogService::new(provider, settings);
        let catalog_rx = catalog.subscribe();

        let mut tracker = Self {
            store,
            catalog,
            catalog_rx,
            snapshot: None,
            portfolio: Portfolio::default(),
            valuation_service: ValuationService::new(),
            analytics_service: AnalyticsService::new(),
            poller: None,
        };
        tracker.sync_catalog();
        Ok(tracker)
    }

    /// Tracker backed by CoinGecko and the system clock.
    pub fn with_coingecko(
        settings: &Settings,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, CoreError> {
        Self::open(
            settings,
            Arc::new(CoinGeckoProvider::new(settings)),
            store,
            Arc::new(SystemClock),
        )
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Start background polling. No-op if already running.
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) {
        if self.is_polling() {
            return;
        }
        if let Some(stale) = self.poller.take() {
            stale.shutdown();
        }
        self.poller = Some(self.catalog.start_polling());
    }

    /// Cancel polling. Results of fetches still in flight are ignored.
    pub fn shutdown(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.shutdown();
        }
        self.catalog.shutdown();
    }

    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().is_some_and(PollingHandle::is_running)
    }

    // ── Catalog ─────────────────────────────────────────────────────

    /// Ask the polling loop for one extra fetch. Returns `false` when
    /// polling is not running.
    pub fn trigger_refresh(&self) -> bool {
        match &self.poller {
            Some(poller) if poller.is_running() => {
                poller.trigger();
                true
            }
            _ => false,
        }
    }

    /// Fetch now and apply the result. A failed fetch keeps the current
    /// snapshot; the error is also recorded in `catalog_status()`.
    pub async fn refresh(&mut self) -> Result<(), CoreError> {
        let result = self.catalog.fetch().await;
        self.sync_catalog();
        result.map(|_| ())
    }

    /// Pick up the latest published snapshot. Revalues and returns `true` if
    /// the snapshot changed since the last call.
    pub fn sync_catalog(&mut self) -> bool {
        let latest = self.catalog_rx.borrow_and_update().snapshot.clone();
        let changed = match (&self.snapshot, &latest) {
            (Some(current), Some(next)) => !Arc::ptr_eq(current, next),
            (None, None) => false,
            _ => true,
        };
        if changed {
            self.snapshot = latest;
            self.revalue();
        }
        changed
    }

    /// Wait for the next catalog status change, then sync. Returns whether
    /// the snapshot changed; `false` also when the catalog is gone.
    pub async fn next_update(&mut self) -> bool {
        if self.catalog_rx.changed().await.is_err() {
            return false;
        }
        self.sync_catalog()
    }

    /// Loading / refreshing / error flags plus the published snapshot.
    #[must_use]
    pub fn catalog_status(&self) -> CatalogStatus {
        self.catalog_rx.borrow().clone()
    }

    /// Assets of the snapshot the portfolio was valued against.
    #[must_use]
    pub fn assets(&self) -> &[Asset] {
        self.snapshot.as_deref().map(Vec::as_slice).unwrap_or(&[])
    }

    #[must_use]
    pub fn get_asset(&self, asset_id: &str) -> Option<&Asset> {
        self.assets().iter().find(|a| a.id == asset_id)
    }

    /// Assets whose name or symbol contains `query` (case-insensitive).
    #[must_use]
    pub fn search_assets(&self, query: &str) -> Vec<&Asset> {
        self.analytics_service.search_assets(self.assets(), query)
    }

    #[must_use]
    pub fn market_stats(&self) -> MarketStats {
        self.analytics_service.market_stats(self.assets())
    }

    // ── Holdings (Mutation API) ─────────────────────────────────────

    /// Add a holding of `asset_id`.
    ///
    /// Invalid numbers are rejected with `ValidationError`; an asset id not in
    /// the current catalog is a silent no-op (`Ok(None)`). Neither changes any
    /// state.
    pub fn add_holding(
        &mut self,
        asset_id: &str,
        amount: f64,
        purchase_price: f64,
    ) -> Result<Option<Holding>, CoreError> {
        let input = HoldingInput::new(amount, purchase_price)?;
        let snapshot = self.snapshot.clone();
        let catalog = snapshot.as_deref().map(Vec::as_slice).unwrap_or(&[]);

        let added = self
            .store
            .add(catalog, asset_id, input.amount, input.purchase_price)?;
        if added.is_some() {
            self.revalue();
        }
        Ok(added)
    }

    /// Same as `add_holding`, taking raw form text for the numbers.
    pub fn add_holding_from_form(
        &mut self,
        asset_id: &str,
        amount: &str,
        purchase_price: &str,
    ) -> Result<Option<Holding>, CoreError> {
        let input = HoldingInput::parse(amount, purchase_price)?;
        self.add_holding(asset_id, input.amount, input.purchase_price)
    }

    /// Change amount and purchase price of an existing holding. Id, asset
    /// reference and display fields stay as they are.
    ///
    /// Returns `Ok(false)` when the id is unknown.
    pub fn update_holding(
        &mut self,
        holding_id: &str,
        amount: f64,
        purchase_price: f64,
    ) -> Result<bool, CoreError> {
        let input = HoldingInput::new(amount, purchase_price)?;
        let Some(existing) = self.store.get(holding_id) else {
            debug!(%holding_id, "Update requested for unknown holding");
            return Ok(false);
        };

        let updated = Holding {
            amount: input.amount,
            purchase_price: input.purchase_price,
            ..existing.clone()
        };
        let changed = self.store.update(updated)?;
        if changed {
            self.revalue();
        }
        Ok(changed)
    }

    /// Same as `update_holding`, taking raw form text for the numbers.
    pub fn update_holding_from_form(
        &mut self,
        holding_id: &str,
        amount: &str,
        purchase_price: &str,
    ) -> Result<bool, CoreError> {
        let input = HoldingInput::parse(amount, purchase_price)?;
        self.update_holding(holding_id, input.amount, input.purchase_price)
    }

    /// Remove a holding. Returns `Ok(false)` when the id is unknown.
    pub fn remove_holding(&mut self, holding_id: &str) -> Result<bool, CoreError> {
        let removed = self.store.remove(holding_id)?;
        if removed {
            self.revalue();
        }
        Ok(removed)
    }

    /// Remove every holding and clear persisted data.
    pub fn clear_holdings(&mut self) -> Result<(), CoreError> {
        self.store.clear()?;
        self.revalue();
        Ok(())
    }

    /// Re-read holdings from persistence (expiry applies) and revalue.
    pub fn reload_holdings(&mut self) -> Result<(), CoreError> {
        self.store.load()?;
        self.revalue();
        Ok(())
    }

    /// Every stored holding, including ones not currently valued.
    #[must_use]
    pub fn holdings(&self) -> &[Holding] {
        self.store.holdings()
    }

    #[must_use]
    pub fn get_holding(&self, holding_id: &str) -> Option<&Holding> {
        self.store.get(holding_id)
    }

    /// Stored holdings whose asset is missing from the current catalog.
    #[must_use]
    pub fn unresolved_holdings(&self) -> Vec<&Holding> {
        self.store
            .holdings()
            .iter()
            .filter(|h| self.get_asset(&h.asset_id).is_none())
            .collect()
    }

    // ── Portfolio ───────────────────────────────────────────────────

    /// The current valuation, in holding insertion order.
    #[must_use]
    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    /// A sorted copy of the valued holdings.
    #[must_use]
    pub fn sorted_holdings(&self, order: HoldingSortOrder) -> Vec<ValuedHolding> {
        self.valuation_service.sort_holdings(&self.portfolio, order)
    }

    #[must_use]
    pub fn portfolio_metrics(&self) -> PortfolioMetrics {
        self.analytics_service.portfolio_metrics(&self.portfolio)
    }

    /// Export the current valuation as JSON.
    pub fn portfolio_to_json(&self) -> Result<String, CoreError> {
        serde_json::to_string_pretty(&self.portfolio)
            .map_err(|e| CoreError::Serialization(format!("Failed to serialize portfolio: {e}")))
    }

    // ── Internal ────────────────────────────────────────────────────

    fn revalue(&mut self) {
        let snapshot = self.snapshot.as_deref().map(Vec::as_slice).unwrap_or(&[]);
        self.portfolio = self.valuation_service.value(snapshot, self.store.holdings());
    }
}

impl Drop for PortfolioTracker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
