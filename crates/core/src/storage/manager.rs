use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::errors::CoreError;
use crate::models::holding::Holding;

use super::kv::KeyValueStore;

/// Key of the serialized holdings list.
pub const HOLDINGS_KEY: &str = "crypto-portfolio-holdings";

/// Key of the last-touched timestamp (epoch milliseconds as text).
pub const TIMESTAMP_KEY: &str = "crypto-portfolio-timestamp";

/// Reads and writes the persisted envelope: the holdings list plus the time
/// it was last touched.
///
/// Invariant: if the list is present, so is a timestamp inside the expiry
/// window. Anything else reads as "no saved data".
pub struct StorageManager {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    expiry_window: Duration,
}

impl StorageManager {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        expiry_window: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            expiry_window,
        }
    }

    /// Load persisted holdings.
    ///
    /// Both entries must be present and the timestamp inside the expiry
    /// window, otherwise the envelope is cleared. Corrupt data is logged,
    /// cleared and treated as empty; only substrate I/O failures are returned
    /// as errors.
    pub fn load(&self) -> Result<Vec<Holding>, CoreError> {
        let raw_holdings = self.store.get(HOLDINGS_KEY)?;
        let raw_timestamp = self.store.get(TIMESTAMP_KEY)?;

        let (raw_holdings, raw_timestamp) = match (raw_holdings, raw_timestamp) {
            (Some(h), Some(t)) => (h, t),
            (None, None) => return Ok(Vec::new()),
            _ => {
                warn!("Incomplete persisted holdings envelope, discarding");
                self.clear()?;
                return Ok(Vec::new());
            }
        };

        let last_touched = match raw_timestamp.trim().parse::<i64>() {
            Ok(ms) => ms,
            Err(e) => {
                warn!(value = %raw_timestamp, error = %e, "Invalid holdings timestamp, discarding");
                self.clear()?;
                return Ok(Vec::new());
            }
        };

        if self.is_expired(last_touched) {
            info!(last_touched, "Persisted holdings expired, discarding");
            self.clear()?;
            return Ok(Vec::new());
        }

        match serde_json::from_str::<Vec<Holding>>(&raw_holdings) {
            Ok(holdings) => {
                debug!(count = holdings.len(), "Loaded persisted holdings");
                Ok(holdings)
            }
            Err(e) => {
                warn!(error = %e, "Error loading saved holdings, discarding");
                self.clear()?;
                Ok(Vec::new())
            }
        }
    }

    /// Persist the full holdings list and stamp it with the current time.
    /// An empty list clears the envelope instead.
    ///
    /// Timestamp first: a failed list write leaves the previous list on disk
    /// under a fresh stamp.
    pub fn persist(&self, holdings: &[Holding]) -> Result<(), CoreError> {
        if holdings.is_empty() {
            return self.clear();
        }
        let json = serde_json::to_string(holdings)
            .map_err(|e| CoreError::Serialization(format!("Failed to serialize holdings: {e}")))?;
        self.store
            .set(TIMESTAMP_KEY, &self.clock.now_millis().to_string())?;
        self.store.set(HOLDINGS_KEY, &json)
    }

    /// Remove both envelope entries.
    pub fn clear(&self) -> Result<(), CoreError> {
        self.store.remove(HOLDINGS_KEY)?;
        self.store.remove(TIMESTAMP_KEY)?;
        Ok(())
    }

    /// Last-touched time of the envelope, if one is stored and readable.
    pub fn last_touched_millis(&self) -> Result<Option<i64>, CoreError> {
        Ok(self
            .store
            .get(TIMESTAMP_KEY)?
            .and_then(|raw| raw.trim().parse::<i64>().ok()))
    }

    pub fn expiry_window(&self) -> Duration {
        self.expiry_window
    }

    fn is_expired(&self, last_touched_ms: i64) -> bool {
        let window_ms = i64::try_from(self.expiry_window.as_millis()).unwrap_or(i64::MAX);
        self.clock.now_millis().saturating_sub(last_touched_ms) > window_ms
    }
}
