use tracing::debug;

use crate::errors::CoreError;
use crate::models::asset::Asset;
use crate::models::holding::Holding;
use crate::storage::manager::StorageManager;

/// The user's holdings, kept in memory and mirrored to the persisted
/// envelope on every change.
///
/// Each mutation builds the next list on the side, persists it, and only then
/// swaps it in. A failed write leaves the in-memory list untouched, so readers
/// never observe a half-applied change.
pub struct HoldingsStore {
    holdings: Vec<Holding>,
    storage: StorageManager,
}

impl HoldingsStore {
    /// Open the store and load whatever survived the expiry check.
    pub fn open(storage: StorageManager) -> Result<Self, CoreError> {
        let holdings = storage.load()?;
        Ok(Self { holdings, storage })
    }

    /// Reload from persistence, replacing the in-memory list.
    pub fn load(&mut self) -> Result<&[Holding], CoreError> {
        self.holdings = self.storage.load()?;
        Ok(&self.holdings)
    }

    /// All holdings in insertion order, including ones whose asset is not in
    /// the current catalog.
    pub fn holdings(&self) -> &[Holding] {
        &self.holdings
    }

    pub fn get(&self, id: &str) -> Option<&Holding> {
        self.holdings.iter().find(|h| h.id == id)
    }

    pub fn len(&self) -> usize {
        self.holdings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }

    /// Add a holding for `asset_id` with a freshly generated id.
    ///
    /// Returns `Ok(None)` without touching anything when `asset_id` is not in
    /// `catalog`.
    pub fn add(
        &mut self,
        catalog: &[Asset],
        asset_id: &str,
        amount: f64,
        purchase_price: f64,
    ) -> Result<Option<Holding>, CoreError> {
        let Some(asset) = catalog.iter().find(|a| a.id == asset_id) else {
            debug!(asset_id, "Ignoring add for asset not in catalog");
            return Ok(None);
        };

        let holding = Holding::new(asset, amount, purchase_price);
        let mut next = self.holdings.clone();
        next.push(holding.clone());
        self.commit(next)?;
        Ok(Some(holding))
    }

    /// Replace the holding with the same id. Returns `false` (no-op) if no
    /// such holding exists.
    pub fn update(&mut self, holding: Holding) -> Result<bool, CoreError> {
        let Some(idx) = self.holdings.iter().position(|h| h.id == holding.id) else {
            debug!(id = %holding.id, "Ignoring update for unknown holding");
            return Ok(false);
        };

        let mut next = self.holdings.clone();
        next[idx] = holding;
        self.commit(next)?;
        Ok(true)
    }

    /// Delete by id. Returns `false` (no-op) if no such holding exists.
    pub fn remove(&mut self, id: &str) -> Result<bool, CoreError> {
        if !self.holdings.iter().any(|h| h.id == id) {
            debug!(%id, "Ignoring remove for unknown holding");
            return Ok(false);
        }

        let next: Vec<Holding> = self
            .holdings
            .iter()
            .filter(|h| h.id != id)
            .cloned()
            .collect();
        self.commit(next)?;
        Ok(true)
    }

    /// Write the current list to persistence (clears it when empty).
    pub fn persist(&self) -> Result<(), CoreError> {
        self.storage.persist(&self.holdings)
    }

    /// Drop every holding and clear the persisted envelope.
    pub fn clear(&mut self) -> Result<(), CoreError> {
        self.commit(Vec::new())
    }

    fn commit(&mut self, next: Vec<Holding>) -> Result<(), CoreError> {
        self.storage.persist(&next)?;
        self.holdings = next;
        Ok(())
    }
}
