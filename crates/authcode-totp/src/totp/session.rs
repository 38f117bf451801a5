//! Session state owned by the top-level controller: the active secret,
//! the countdown tasks and the privacy toggle, over a shared service.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

use crate::totp::clock::SharedClock;
use crate::totp::codec::{self, NormalizedSecret};
use crate::totp::service::{Generation, TotpServiceState};
use crate::totp::ticker::{CountdownTicker, SlotView};
use crate::totp::types::*;

/// Label of the primary row when its history entry is gone.
const PRIMARY_FALLBACK_NAME: &str = "Current";

/// The secret currently shown in the primary slot.
#[derive(Debug, Clone)]
struct PrimarySlot {
    entry_id: String,
    secret: NormalizedSecret,
}

/// Held while a primary-slot generation runs.
struct GenerationGuard(Arc<AtomicBool>);

impl GenerationGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self, TotpError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| TotpError::new(TotpErrorKind::Busy, "A code is already being generated"))?;
        Ok(Self(Arc::clone(flag)))
    }
}

impl Drop for GenerationGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One rendered line of the board.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardRow {
    pub slot: SlotId,
    pub entry_id: Option<String>,
    pub name: String,
    /// Code as it should be shown (placeholder, code, error or redacted).
    pub code: String,
    pub remaining_seconds: u32,
    pub progress: f64,
    /// Seed text for history rows; `None` for the primary row.
    pub seed_preview: Option<String>,
    pub failed: bool,
}

/// Everything a front end needs to draw one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub privacy_mode: bool,
    pub primary: Option<BoardRow>,
    pub entries: Vec<BoardRow>,
}

/// Cloneable handle; clones share the same state and tasks.
#[derive(Clone)]
pub struct Session {
    service: TotpServiceState,
    ticker: Arc<Mutex<CountdownTicker>>,
    primary: Arc<Mutex<Option<PrimarySlot>>>,
    generating: Arc<AtomicBool>,
    privacy_mode: Arc<AtomicBool>,
}

impl Session {
    pub fn new(service: TotpServiceState, clock: SharedClock, tick: Duration, privacy_mode: bool) -> Self {
        Self {
            service,
            ticker: Arc::new(Mutex::new(CountdownTicker::new(clock, tick))),
            primary: Arc::new(Mutex::new(None)),
            generating: Arc::new(AtomicBool::new(false)),
            privacy_mode: Arc::new(AtomicBool::new(privacy_mode)),
        }
    }

    pub fn service(&self) -> TotpServiceState {
        Arc::clone(&self.service)
    }

    /// Start countdowns for every loaded history entry.
    pub async fn start(&self) {
        self.sync_history_timers().await;
    }

    /// Generate a code for `raw_secret`, show it in the primary slot and
    /// refresh the history countdowns. Invalid input leaves the current
    /// display and the history untouched. Returns `Busy` while another
    /// submission is still in flight.
    pub async fn submit(
        &self,
        raw_secret: &str,
        display_name_hint: Option<&str>,
        reveal_secret: bool,
    ) -> Result<Generation, TotpError> {
        let _guard = GenerationGuard::acquire(&self.generating)?;

        let generation = self
            .service
            .lock()
            .await
            .generate(raw_secret, display_name_hint, reveal_secret)?;

        self.ticker
            .lock()
            .await
            .start(SlotId::Primary, generation.secret.clone());
        *self.primary.lock().await = Some(PrimarySlot {
            entry_id: generation.entry_id.clone(),
            secret: generation.secret.clone(),
        });
        self.sync_history_timers().await;
        Ok(generation)
    }

    /// Match entry countdowns to the current history: stop tasks for
    /// entries that are gone, start tasks for new ones.
    pub async fn sync_history_timers(&self) {
        // Lock order is service then ticker. Holding the service guard
        // keeps a concurrent delete from landing between the two.
        let svc = self.service.lock().await;
        let entries = svc.list_entries();
        let ids: HashSet<String> = entries.iter().map(|e| e.id.clone()).collect();

        let mut ticker = self.ticker.lock().await;
        ticker.retain_entries(&ids);
        for entry in entries {
            let slot = SlotId::Entry(entry.id.clone());
            if ticker.is_running(&slot) {
                continue;
            }
            match codec::normalize(&entry.secret) {
                Ok(secret) => {
                    ticker.start(slot, secret);
                }
                Err(e) => log::warn!("Not starting countdown for entry {}: {}", entry.id, e.message),
            }
        }
    }

    pub async fn rename(&self, id: &str, new_name: &str) -> Result<HistoryEntry, TotpError> {
        self.service.lock().await.rename_entry(id, new_name)
    }

    /// Delete an entry and stop its countdown.
    pub async fn delete(&self, id: &str) -> Result<HistoryEntry, TotpError> {
        let removed = self.service.lock().await.delete_entry(id)?;
        self.ticker.lock().await.stop(&SlotId::Entry(removed.id.clone()));
        Ok(removed)
    }

    /// Clear the history and stop every entry countdown. The primary slot
    /// keeps running.
    pub async fn clear(&self) -> usize {
        let n = self.service.lock().await.clear_history();
        self.ticker.lock().await.stop_entries();
        n
    }

    /// Clear and purge the history and stop every countdown.
    pub async fn reset(&self) -> usize {
        let n = self.service.lock().await.reset();
        self.ticker.lock().await.stop_all();
        *self.primary.lock().await = None;
        n
    }

    /// Stop all countdown tasks.
    pub async fn shutdown(&self) {
        self.ticker.lock().await.stop_all();
        log::debug!("Session shut down");
    }

    // ── Privacy ──────────────────────────────────────────────────

    pub fn privacy_mode(&self) -> bool {
        self.privacy_mode.load(Ordering::Relaxed)
    }

    pub fn set_privacy_mode(&self, on: bool) {
        self.privacy_mode.store(on, Ordering::Relaxed);
    }

    /// Flip privacy mode and return the new value.
    pub fn toggle_privacy_mode(&self) -> bool {
        !self.privacy_mode.fetch_xor(true, Ordering::Relaxed)
    }

    // ── Views ────────────────────────────────────────────────────

    /// Whether a primary secret is active.
    pub async fn has_primary(&self) -> bool {
        self.primary.lock().await.is_some()
    }

    /// Normalised secret in the primary slot.
    pub async fn primary_secret(&self) -> Option<NormalizedSecret> {
        self.primary.lock().await.as_ref().map(|p| p.secret.clone())
    }

    pub async fn view(&self, slot: &SlotId) -> Option<SlotView> {
        self.ticker.lock().await.view(slot)
    }

    pub async fn subscribe(&self, slot: &SlotId) -> Option<watch::Receiver<SlotView>> {
        self.ticker.lock().await.subscribe(slot)
    }

    /// Snapshot of every slot, with privacy applied.
    pub async fn board(&self) -> Board {
        let privacy = self.privacy_mode();
        let entries: Vec<HistoryEntry> = self.service.lock().await.list_entries().to_vec();
        let primary = self.primary.lock().await.clone();
        let ticker = self.ticker.lock().await;

        let primary_row = primary.and_then(|p| {
            let view = ticker.view(&SlotId::Primary)?;
            let name = entries
                .iter()
                .find(|e| e.id == p.entry_id)
                .map(|e| e.display_name.clone())
                .unwrap_or_else(|| PRIMARY_FALLBACK_NAME.to_string());
            Some(Self::row(view, Some(p.entry_id), name, None, privacy))
        });

        let entry_rows = entries
            .iter()
            .map(|entry| {
                let slot = SlotId::Entry(entry.id.clone());
                let view = ticker
                    .view(&slot)
                    .unwrap_or_else(|| SlotView::pending(slot));
                Self::row(
                    view,
                    Some(entry.id.clone()),
                    entry.display_name.clone(),
                    Some(entry.seed_preview(privacy)),
                    privacy,
                )
            })
            .collect();

        Board {
            privacy_mode: privacy,
            primary: primary_row,
            entries: entry_rows,
        }
    }

    fn row(
        view: SlotView,
        entry_id: Option<String>,
        name: String,
        seed_preview: Option<String>,
        privacy: bool,
    ) -> BoardRow {
        BoardRow {
            code: view.display.render(privacy),
            failed: view.display.is_failed(),
            slot: view.slot,
            entry_id,
            name,
            remaining_seconds: view.remaining_seconds,
            progress: view.progress,
            seed_preview,
        }
    }
}
