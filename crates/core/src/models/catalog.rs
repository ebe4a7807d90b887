use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::asset::Asset;

/// What the catalog fetcher is doing right now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchPhase {
    /// A fetch is running and no snapshot exists yet. Blocking spinner.
    InitialLoad,
    /// A fetch is running over an existing snapshot. Stale data stays visible.
    Refreshing,
    /// Nothing in flight.
    #[default]
    Idle,
}

/// Observable state of the price catalog.
#[derive(Debug, Clone, Default)]
pub struct CatalogStatus {
    /// Latest applied snapshot; `None` until the first successful fetch.
    pub snapshot: Option<Arc<Vec<Asset>>>,

    pub phase: FetchPhase,

    /// Message of the most recently applied failed fetch. Cleared by the next
    /// applied success.
    pub error: Option<String>,

    /// When the current snapshot was applied
    pub last_updated: Option<DateTime<Utc>>,

    /// Sequence number of the last applied fetch (0 = none yet)
    pub sequence: u64,
}

impl CatalogStatus {
    pub fn is_loading(&self) -> bool {
        self.phase == FetchPhase::InitialLoad
    }

    pub fn is_refreshing(&self) -> bool {
        self.phase == FetchPhase::Refreshing
    }

    /// Current assets, empty before the first successful fetch.
    pub fn assets(&self) -> &[Asset] {
        self.snapshot.as_deref().map(Vec::as_slice).unwrap_or(&[])
    }
}
