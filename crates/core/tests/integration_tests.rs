// ═══════════════════════════════════════════════════════════════════
// Integration Tests: PortfolioTracker end to end
// ═══════════════════════════════════════════════════════════════════

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use crypto_portfolio_core::clock::{Clock, FixedClock};
use crypto_portfolio_core::errors::CoreError;
use crypto_portfolio_core::models::asset::Asset;
use crypto_portfolio_core::models::catalog::FetchPhase;
use crypto_portfolio_core::models::holding::Holding;
use crypto_portfolio_core::models::portfolio::HoldingSortOrder;
use crypto_portfolio_core::models::settings::Settings;
use crypto_portfolio_core::providers::traits::MarketDataProvider;
use crypto_portfolio_core::storage::kv::{JsonFileStore, KeyValueStore, MemoryStore};
use crypto_portfolio_core::storage::manager::{HOLDINGS_KEY, TIMESTAMP_KEY};
use crypto_portfolio_core::PortfolioTracker;
use tokio::time::sleep;

// ═══════════════════════════════════════════════════════════════════
// Mock Market Provider
// ═══════════════════════════════════════════════════════════════════

/// Serves whatever catalog is currently set, or fails when told to.
struct MockMarket {
    assets: Mutex<Vec<Asset>>,
    failing: Mutex<bool>,
}

impl MockMarket {
    fn new(assets: Vec<Asset>) -> Arc<Self> {
        Arc::new(Self {
            assets: Mutex::new(assets),
            failing: Mutex::new(false),
        })
    }

    fn set_assets(&self, assets: Vec<Asset>) {
        *self.assets.lock().unwrap() = assets;
    }

    fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }
}

#[async_trait]
impl MarketDataProvider for MockMarket {
    fn name(&self) -> &str {
        "MockMarket"
    }

    async fn fetch_markets(&self) -> Result<Vec<Asset>, CoreError> {
        if *self.failing.lock().unwrap() {
            return Err(CoreError::HttpStatus { status: 500 });
        }
        Ok(self.assets.lock().unwrap().clone())
    }
}

fn btc(price: f64) -> Asset {
    Asset::new("btc", "btc", "Bitcoin", price).with_change_24h(1.0)
}

fn eth(price: f64) -> Asset {
    Asset::new("eth", "eth", "Ethereum", price).with_change_24h(-1.0)
}

fn doge(price: f64) -> Asset {
    Asset::new("doge", "doge", "Dogecoin", price)
}

fn settings() -> Settings {
    Settings {
        min_refresh_delay: Duration::ZERO,
        ..Settings::default()
    }
}

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap(),
    ))
}

fn tracker(market: Arc<MockMarket>, store: Arc<MemoryStore>) -> PortfolioTracker {
    PortfolioTracker::open(&settings(), market, store, clock()).unwrap()
}

async fn loaded_tracker(assets: Vec<Asset>) -> (PortfolioTracker, Arc<MockMarket>, Arc<MemoryStore>) {
    let market = MockMarket::new(assets);
    let store = Arc::new(MemoryStore::new());
    let mut t = tracker(market.clone(), store.clone());
    t.refresh().await.unwrap();
    (t, market, store)
}

// ═══════════════════════════════════════════════════════════════════
// Opening
// ═══════════════════════════════════════════════════════════════════

mod opening {
    use super::*;

    #[test]
    fn fresh_tracker_is_empty() {
        let t = tracker(MockMarket::new(vec![]), Arc::new(MemoryStore::new()));
        assert!(t.holdings().is_empty());
        assert!(t.assets().is_empty());
        assert!(t.portfolio().is_empty());
        assert!(!t.is_polling());
        assert_eq!(t.catalog_status().phase, FetchPhase::Idle);
        assert!(format!("{t:?}").contains("PortfolioTracker"));
    }

    #[test]
    fn expired_envelope_is_discarded_on_open() {
        let store = Arc::new(MemoryStore::new());
        let c = clock();
        let holdings = vec![Holding::new(&btc(1.0), 1.0, 1.0)];
        store
            .set(HOLDINGS_KEY, &serde_json::to_string(&holdings).unwrap())
            .unwrap();
        store
            .set(
                TIMESTAMP_KEY,
                &(c.now_millis() - 49 * 60 * 60 * 1000).to_string(),
            )
            .unwrap();

        let t = PortfolioTracker::open(&settings(), MockMarket::new(vec![]), store.clone(), c)
            .unwrap();
        assert!(t.holdings().is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn corrupt_envelope_opens_empty() {
        let store = Arc::new(MemoryStore::new());
        store.set(HOLDINGS_KEY, "not json").unwrap();
        store
            .set(TIMESTAMP_KEY, &clock().now_millis().to_string())
            .unwrap();

        let t = tracker(MockMarket::new(vec![]), store);
        assert!(t.holdings().is_empty());
    }

    #[tokio::test]
    async fn holdings_persist_across_instances() {
        let market = MockMarket::new(vec![btc(50_000.0)]);
        let store = Arc::new(MemoryStore::new());
        let id = {
            let mut t = tracker(market.clone(), store.clone());
            t.refresh().await.unwrap();
            t.add_holding("btc", 2.0, 40_000.0).unwrap().unwrap().id
        };

        let mut reopened = tracker(market, store);
        assert_eq!(reopened.holdings().len(), 1);
        assert_eq!(reopened.holdings()[0].id, id);
        // Not valued until a catalog arrives.
        assert!(reopened.portfolio().is_empty());

        reopened.refresh().await.unwrap();
        assert_eq!(reopened.portfolio().total_value, 100_000.0);
    }

    #[tokio::test]
    async fn corrupt_store_file_opens_empty_and_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{ truncated").unwrap();

        let mut t = PortfolioTracker::open(
            &settings(),
            MockMarket::new(vec![btc(10.0)]),
            Arc::new(JsonFileStore::new(&path)),
            clock(),
        )
        .unwrap();
        assert!(t.holdings().is_empty());

        t.refresh().await.unwrap();
        t.add_holding("btc", 1.0, 5.0).unwrap().unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(serde_json::from_str::<serde_json::Value>(&raw).is_ok());
    }

    #[tokio::test]
    async fn millisecond_stamp_envelope_is_valued() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                HOLDINGS_KEY,
                r#"[{"id":"1717234200000","cryptoId":"btc","symbol":"btc","name":"Bitcoin","image":"","amount":2,"purchasePrice":40000}]"#,
            )
            .unwrap();
        store
            .set(TIMESTAMP_KEY, &clock().now_millis().to_string())
            .unwrap();

        let mut t = tracker(MockMarket::new(vec![btc(50_000.0)]), store);
        assert_eq!(t.holdings().len(), 1);
        t.refresh().await.unwrap();
        assert_eq!(t.portfolio().total_value, 100_000.0);

        assert!(t.update_holding("1717234200000", 3.0, 40_000.0).unwrap());
        assert!(t.remove_holding("1717234200000").unwrap());
        assert!(t.holdings().is_empty());
    }

    #[tokio::test]
    async fn file_backed_tracker_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portfolio.json");
        let market = MockMarket::new(vec![btc(10.0)]);

        {
            let mut t = PortfolioTracker::open(
                &settings(),
                market.clone(),
                Arc::new(JsonFileStore::new(&path)),
                clock(),
            )
            .unwrap();
            t.refresh().await.unwrap();
            t.add_holding("btc", 3.0, 5.0).unwrap();
        }

        let t = PortfolioTracker::open(
            &settings(),
            market,
            Arc::new(JsonFileStore::new(&path)),
            clock(),
        )
        .unwrap();
        assert_eq!(t.holdings().len(), 1);
        assert_eq!(t.holdings()[0].amount, 3.0);
    }
}

// ═══════════════════════════════════════════════════════════════════
// Mutations trigger revaluation
// ═══════════════════════════════════════════════════════════════════

mod mutations {
    use super::*;

    #[tokio::test]
    async fn add_values_immediately() {
        let (mut t, _, _) = loaded_tracker(vec![btc(50_000.0)]).await;
        let h = t.add_holding("btc", 2.0, 40_000.0).unwrap().unwrap();

        let p = t.portfolio();
        assert_eq!(p.holdings.len(), 1);
        assert_eq!(p.holdings[0].holding_id, h.id);
        assert_eq!(p.total_value, 100_000.0);
        assert_eq!(p.total_profit_loss, 20_000.0);
        assert_eq!(p.total_profit_loss_percentage, 25.0);
    }

    #[tokio::test]
    async fn add_unknown_asset_is_silent_noop() {
        let (mut t, _, store) = loaded_tracker(vec![btc(1.0)]).await;
        assert!(t.add_holding("doge", 1.0, 1.0).unwrap().is_none());
        assert!(t.holdings().is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn add_before_first_snapshot_is_noop() {
        let mut t = tracker(MockMarket::new(vec![btc(1.0)]), Arc::new(MemoryStore::new()));
        assert!(t.add_holding("btc", 1.0, 1.0).unwrap().is_none());
    }

    #[tokio::test]
    async fn invalid_input_rejected_without_state_change() {
        let (mut t, _, store) = loaded_tracker(vec![btc(1.0)]).await;
        assert!(matches!(
            t.add_holding("btc", 0.0, 1.0),
            Err(CoreError::ValidationError(_))
        ));
        assert!(matches!(
            t.add_holding("btc", 1.0, -5.0),
            Err(CoreError::ValidationError(_))
        ));
        assert!(matches!(
            t.add_holding_from_form("btc", "", "10"),
            Err(CoreError::ValidationError(_))
        ));
        assert!(matches!(
            t.add_holding_from_form("btc", "1", "ten"),
            Err(CoreError::ValidationError(_))
        ));
        assert!(t.holdings().is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn add_from_form_parses_text() {
        let (mut t, _, _) = loaded_tracker(vec![btc(100.0)]).await;
        let h = t.add_holding_from_form("btc", "1.5", " 80 ").unwrap().unwrap();
        assert_eq!(h.amount, 1.5);
        assert_eq!(h.purchase_price, 80.0);
        assert_eq!(t.portfolio().total_value, 150.0);
    }

    #[tokio::test]
    async fn update_changes_only_amount_and_price() {
        let (mut t, _, _) = loaded_tracker(vec![btc(50_000.0)]).await;
        let h = t.add_holding("btc", 1.0, 40_000.0).unwrap().unwrap();

        assert!(t.update_holding(&h.id, 3.0, 45_000.0).unwrap());

        let stored = t.get_holding(&h.id).unwrap();
        assert_eq!(stored.id, h.id);
        assert_eq!(stored.asset_id, "btc");
        assert_eq!(stored.name, h.name);
        assert_eq!(stored.amount, 3.0);
        assert_eq!(stored.purchase_price, 45_000.0);
        assert_eq!(t.portfolio().total_value, 150_000.0);
        assert_eq!(t.portfolio().total_profit_loss, 15_000.0);
    }

    #[tokio::test]
    async fn update_from_form_validates() {
        let (mut t, _, _) = loaded_tracker(vec![btc(10.0)]).await;
        let h = t.add_holding("btc", 1.0, 5.0).unwrap().unwrap();

        assert!(t.update_holding_from_form(&h.id, "abc", "5").is_err());
        assert_eq!(t.get_holding(&h.id).unwrap().amount, 1.0);

        assert!(t.update_holding_from_form(&h.id, "4", "5").unwrap());
        assert_eq!(t.portfolio().total_value, 40.0);
    }

    #[tokio::test]
    async fn update_unknown_id_is_noop() {
        let (mut t, _, _) = loaded_tracker(vec![btc(10.0)]).await;
        assert!(!t.update_holding("no-such-id", 1.0, 1.0).unwrap());
    }

    #[tokio::test]
    async fn remove_revalues_and_clears_persistence() {
        let (mut t, _, store) = loaded_tracker(vec![btc(10.0), eth(5.0)]).await;
        let a = t.add_holding("btc", 1.0, 0.0).unwrap().unwrap();
        let b = t.add_holding("eth", 2.0, 0.0).unwrap().unwrap();
        assert_eq!(t.portfolio().total_value, 20.0);

        assert!(t.remove_holding(&a.id).unwrap());
        assert_eq!(t.portfolio().total_value, 10.0);
        assert!(!store.is_empty());

        assert!(t.remove_holding(&b.id).unwrap());
        assert!(t.portfolio().is_empty());
        assert!(store.is_empty());

        assert!(!t.remove_holding(&b.id).unwrap());
    }

    #[tokio::test]
    async fn readd_after_remove_gets_new_id() {
        let (mut t, _, _) = loaded_tracker(vec![btc(10.0)]).await;
        let first = t.add_holding("btc", 1.0, 1.0).unwrap().unwrap();
        t.remove_holding(&first.id).unwrap();
        let second = t.add_holding("btc", 1.0, 1.0).unwrap().unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn clear_and_reload() {
        let (mut t, _, store) = loaded_tracker(vec![btc(10.0)]).await;
        t.add_holding("btc", 1.0, 1.0).unwrap();
        t.clear_holdings().unwrap();
        assert!(t.holdings().is_empty());
        assert!(t.portfolio().is_empty());
        assert!(store.is_empty());

        t.add_holding("btc", 2.0, 1.0).unwrap();
        t.reload_holdings().unwrap();
        assert_eq!(t.holdings().len(), 1);
        assert_eq!(t.portfolio().total_value, 20.0);
    }
}

// ═══════════════════════════════════════════════════════════════════
// Catalog changes trigger revaluation
// ═══════════════════════════════════════════════════════════════════

mod catalog_sync {
    use super::*;

    #[tokio::test]
    async fn new_prices_revalue_portfolio() {
        let (mut t, market, _) = loaded_tracker(vec![btc(100.0)]).await;
        t.add_holding("btc", 2.0, 50.0).unwrap();
        assert_eq!(t.portfolio().total_value, 200.0);

        market.set_assets(vec![btc(150.0)]);
        t.refresh().await.unwrap();

        assert_eq!(t.portfolio().total_value, 300.0);
        assert_eq!(t.portfolio().total_profit_loss, 200.0);
        assert_eq!(t.portfolio().total_profit_loss_percentage, 200.0);
    }

    #[tokio::test]
    async fn asset_leaving_catalog_is_excluded_but_kept() {
        let (mut t, market, _) = loaded_tracker(vec![btc(50_000.0), doge(0.1)]).await;
        t.add_holding("btc", 2.0, 40_000.0).unwrap();
        t.add_holding("doge", 1_000.0, 0.05).unwrap();
        assert_eq!(t.portfolio().holdings.len(), 2);

        market.set_assets(vec![btc(50_000.0)]);
        t.refresh().await.unwrap();

        assert_eq!(t.portfolio().holdings.len(), 1);
        assert_eq!(t.portfolio().total_value, 100_000.0);
        assert_eq!(t.portfolio().total_profit_loss, 20_000.0);
        assert_eq!(t.holdings().len(), 2);
        let unresolved = t.unresolved_holdings();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].asset_id, "doge");

        // Coming back restores the valuation.
        market.set_assets(vec![btc(50_000.0), doge(0.1)]);
        t.refresh().await.unwrap();
        assert_eq!(t.portfolio().holdings.len(), 2);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_snapshot_and_valuation() {
        let (mut t, market, _) = loaded_tracker(vec![btc(10.0)]).await;
        t.add_holding("btc", 1.0, 5.0).unwrap();

        market.set_failing(true);
        let err = t.refresh().await.unwrap_err();
        assert!(matches!(err, CoreError::HttpStatus { status: 500 }));

        assert_eq!(t.assets().len(), 1);
        assert_eq!(t.portfolio().total_value, 10.0);
        assert_eq!(
            t.catalog_status().error.as_deref(),
            Some("HTTP error! status: 500")
        );

        market.set_failing(false);
        t.refresh().await.unwrap();
        assert!(t.catalog_status().error.is_none());
    }

    #[tokio::test]
    async fn sync_reports_only_snapshot_changes() {
        let (mut t, _, _) = loaded_tracker(vec![btc(10.0)]).await;
        assert!(!t.sync_catalog());
    }

    #[tokio::test]
    async fn empty_store_with_catalog_is_all_zero() {
        let (t, _, _) = loaded_tracker(vec![btc(10.0), eth(5.0)]).await;
        let p = t.portfolio();
        assert!(p.holdings.is_empty());
        assert_eq!(p.total_value, 0.0);
        assert_eq!(p.total_profit_loss, 0.0);
        assert_eq!(p.total_profit_loss_percentage, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn polling_updates_flow_into_portfolio() {
        let market = MockMarket::new(vec![btc(10.0)]);
        let mut t = tracker(market.clone(), Arc::new(MemoryStore::new()));
        t.start();
        assert!(t.is_polling());

        while !t.next_update().await {}
        assert_eq!(t.assets().len(), 1);
        t.add_holding("btc", 1.0, 0.0).unwrap();

        market.set_assets(vec![btc(20.0)]);
        assert!(t.trigger_refresh());
        while !t.next_update().await {}
        assert_eq!(t.portfolio().total_value, 20.0);

        t.shutdown();
        assert!(!t.is_polling());
        assert!(!t.trigger_refresh());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_after_shutdown_keeps_prices_flowing() {
        let (mut t, market, _) = loaded_tracker(vec![btc(100.0)]).await;
        t.add_holding("btc", 1.0, 0.0).unwrap();

        t.start();
        t.shutdown();
        t.start();
        assert!(t.is_polling());

        market.set_assets(vec![btc(200.0)]);
        t.refresh().await.unwrap();
        assert_eq!(t.get_asset("btc").unwrap().current_price, 200.0);
        assert_eq!(t.portfolio().total_value, 200.0);

        market.set_assets(vec![btc(300.0)]);
        assert!(t.trigger_refresh());
        sleep(Duration::from_secs(65)).await;
        t.sync_catalog();
        assert_eq!(t.portfolio().total_value, 300.0);
        t.shutdown();
    }

    #[tokio::test]
    async fn refresh_after_shutdown_still_applies() {
        let (mut t, market, _) = loaded_tracker(vec![btc(100.0)]).await;
        t.start();
        t.shutdown();

        market.set_assets(vec![btc(150.0)]);
        t.refresh().await.unwrap();
        assert_eq!(t.get_asset("btc").unwrap().current_price, 150.0);
    }
}

// ═══════════════════════════════════════════════════════════════════
// Read-side views
// ═══════════════════════════════════════════════════════════════════

mod views {
    use super::*;

    #[tokio::test]
    async fn sorted_holdings_do_not_reorder_portfolio() {
        let (mut t, _, _) = loaded_tracker(vec![btc(100.0), eth(10.0)]).await;
        t.add_holding("eth", 1.0, 0.0).unwrap();
        t.add_holding("btc", 1.0, 0.0).unwrap();

        let by_value = t.sorted_holdings(HoldingSortOrder::Value);
        assert_eq!(by_value[0].asset_id, "btc");
        assert_eq!(t.portfolio().holdings[0].asset_id, "eth");
    }

    #[tokio::test]
    async fn search_stats_and_metrics() {
        let (mut t, _, _) = loaded_tracker(vec![
            btc(100.0).with_market_cap(2_000.0, 1),
            eth(10.0).with_market_cap(500.0, 2),
        ])
        .await;
        assert_eq!(t.search_assets("eth").len(), 1);
        assert_eq!(t.get_asset("btc").unwrap().name, "Bitcoin");

        let stats = t.market_stats();
        assert_eq!(stats.total_market_cap, 2_500.0);
        assert_eq!(stats.gainers, 1);
        assert_eq!(stats.losers, 1);

        t.add_holding("btc", 1.0, 50.0).unwrap();
        t.add_holding("eth", 1.0, 20.0).unwrap();
        let m = t.portfolio_metrics();
        assert_eq!(m.best_performer.unwrap().asset_id, "btc");
        assert_eq!(m.worst_performer.unwrap().asset_id, "eth");
        assert_eq!(m.total_gains, 50.0);
        assert_eq!(m.total_losses, 10.0);
    }

    #[tokio::test]
    async fn portfolio_exports_as_json() {
        let (mut t, _, _) = loaded_tracker(vec![btc(100.0)]).await;
        t.add_holding("btc", 1.0, 50.0).unwrap();
        let json = t.portfolio_to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["total_value"], 100.0);
        assert_eq!(value["holdings"][0]["asset_id"], "btc");
    }
}
