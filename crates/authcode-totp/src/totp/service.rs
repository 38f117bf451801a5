//! High-level orchestrator: owns the history ledger and its store, and
//! runs the validate → derive → record → persist pipeline.

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::totp::clock::SharedClock;
use crate::totp::codec::{self, NormalizedSecret};
use crate::totp::core;
use crate::totp::history::HistoryLedger;
use crate::totp::storage::HistoryStore;
use crate::totp::types::*;

/// Shared service state.
pub type TotpServiceState = Arc<Mutex<TotpService>>;

/// Result of a successful [`TotpService::generate`].
#[derive(Debug, Clone)]
pub struct Generation {
    pub code: GeneratedCode,
    pub secret: NormalizedSecret,
    pub entry_id: String,
    /// `false` when an existing entry was promoted.
    pub created: bool,
    /// Ids of entries pushed out by the capacity bound.
    pub evicted_ids: Vec<String>,
}

/// Central TOTP service.
pub struct TotpService {
    ledger: HistoryLedger,
    store: Box<dyn HistoryStore>,
    clock: SharedClock,
    last_persistence_error: Option<TotpError>,
}

impl TotpService {
    /// Load history from `store` and wrap the service for sharing.
    pub fn new(store: Box<dyn HistoryStore>, clock: SharedClock) -> TotpServiceState {
        Arc::new(Mutex::new(Self::open(store, clock)))
    }

    /// Load history from `store`. A store that cannot be read leaves the
    /// ledger empty; the failure is logged and kept for inspection.
    pub fn open(store: Box<dyn HistoryStore>, clock: SharedClock) -> Self {
        let mut last_persistence_error = None;
        let ledger = match store.load() {
            Ok(entries) => {
                let (ledger, dropped) = HistoryLedger::from_entries(entries);
                if dropped > 0 {
                    log::warn!("Dropped {} duplicate or excess history entries on load", dropped);
                }
                log::info!("Loaded {} history entries", ledger.len());
                ledger
            }
            Err(e) => {
                log::warn!("Failed to load history, starting empty: {}", e);
                last_persistence_error = Some(e);
                HistoryLedger::new()
            }
        };
        Self {
            ledger,
            store,
            clock,
            last_persistence_error,
        }
    }

    pub fn clock(&self) -> SharedClock {
        Arc::clone(&self.clock)
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    //  Code generation
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Validate `raw_secret`, derive its current code, then record or
    /// promote it in the history and persist. Nothing is recorded unless
    /// derivation succeeds.
    pub fn generate(
        &mut self,
        raw_secret: &str,
        display_name_hint: Option<&str>,
        reveal_secret: bool,
    ) -> Result<Generation, TotpError> {
        let secret = codec::normalize(raw_secret)?;
        let mut code = core::generate_code_at(&secret, self.clock.now_unix(), None)?;

        let outcome = self
            .ledger
            .record_or_promote(&secret, display_name_hint, reveal_secret);
        code.entry_id = Some(outcome.id.clone());
        if outcome.created {
            log::debug!("Recorded history entry {}", outcome.id);
        } else {
            log::debug!("Promoted history entry {}", outcome.id);
        }
        for evicted in &outcome.evicted {
            log::debug!("Evicted history entry {}", evicted.id);
        }
        self.persist();

        Ok(Generation {
            code,
            secret,
            entry_id: outcome.id,
            created: outcome.created,
            evicted_ids: outcome.evicted.into_iter().map(|e| e.id).collect(),
        })
    }

    /// Current code for one history entry.
    pub fn code_for_entry(&self, id: &str) -> Result<GeneratedCode, TotpError> {
        let entry = self.get_entry(id)?;
        Self::code_for(entry, self.clock.now_unix())
    }

    /// Current codes for every entry, most recent first. One failing entry
    /// does not affect the others.
    pub fn generate_all_codes(&self) -> Vec<(HistoryEntry, Result<GeneratedCode, TotpError>)> {
        let now = self.clock.now_unix();
        self.ledger
            .list()
            .iter()
            .map(|entry| (entry.clone(), Self::code_for(entry, now)))
            .collect()
    }

    fn code_for(entry: &HistoryEntry, unix_seconds: u64) -> Result<GeneratedCode, TotpError> {
        let secret = codec::normalize(&entry.secret).map_err(|e| {
            TotpError::new(TotpErrorKind::DerivationError, "Invalid secret").with_detail(e.message)
        })?;
        core::generate_code_at(&secret, unix_seconds, Some(entry.id.clone()))
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    //  History management
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub fn rename_entry(&mut self, id: &str, new_name: &str) -> Result<HistoryEntry, TotpError> {
        self.ledger.rename(id, new_name)?;
        log::debug!("Renamed history entry {}", id);
        self.persist();
        self.get_entry(id).cloned()
    }

    pub fn delete_entry(&mut self, id: &str) -> Result<HistoryEntry, TotpError> {
        let removed = self.ledger.delete(id)?;
        log::debug!("Deleted history entry {}", id);
        self.persist();
        Ok(removed)
    }

    /// Empty the history. Returns how many entries were removed.
    pub fn clear_history(&mut self) -> usize {
        let n = self.ledger.clear();
        log::info!("Cleared {} history entries", n);
        self.persist();
        n
    }

    /// Empty the history and purge the backing store entirely.
    pub fn reset(&mut self) -> usize {
        let n = self.ledger.clear();
        match self.store.purge() {
            Ok(()) => {
                self.last_persistence_error = None;
                log::info!("Reset: removed {} entries and purged history store", n);
            }
            Err(e) => {
                log::warn!("Failed to purge history store: {}", e);
                self.last_persistence_error = Some(e);
            }
        }
        n
    }

    pub fn list_entries(&self) -> &[HistoryEntry] {
        self.ledger.list()
    }

    pub fn get_entry(&self, id: &str) -> Result<&HistoryEntry, TotpError> {
        self.ledger.get(id).ok_or_else(|| TotpError::not_found(id))
    }

    pub fn next_default_name(&self) -> String {
        self.ledger.next_default_name()
    }

    /// The most recent load/save failure, cleared by the next success.
    pub fn last_persistence_error(&self) -> Option<&TotpError> {
        self.last_persistence_error.as_ref()
    }

    fn persist(&mut self) {
        match self.store.save(self.ledger.list()) {
            Ok(()) => self.last_persistence_error = None,
            Err(e) => {
                log::warn!("Failed to save history: {}", e);
                self.last_persistence_error = Some(e);
            }
        }
    }
}
