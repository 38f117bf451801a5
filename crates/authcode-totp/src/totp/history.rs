//! Bounded, deduplicated, most-recent-first history of used secrets.

use crate::totp::codec::NormalizedSecret;
use crate::totp::types::*;

/// Result of [`HistoryLedger::record_or_promote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    /// Id of the entry now at the front.
    pub id: String,
    /// `false` when an existing entry was promoted.
    pub created: bool,
    /// Entries pushed out of the tail by the capacity bound.
    pub evicted: Vec<HistoryEntry>,
}

/// Ordered history. Index 0 is the most recently used entry; no two
/// entries share a secret; never longer than its capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryLedger {
    entries: Vec<HistoryEntry>,
    capacity: usize,
}

impl Default for HistoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryLedger {
    pub fn new() -> Self {
        Self::with_capacity(MAX_HISTORY_ITEMS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Rebuild a ledger from stored entries, already in most-recent-first
    /// order. Later duplicates of a secret and anything past the capacity
    /// are dropped; the number dropped is returned alongside.
    pub fn from_entries(entries: Vec<HistoryEntry>) -> (Self, usize) {
        let total = entries.len();
        let mut ledger = Self::new();
        for entry in entries {
            if ledger.entries.len() == ledger.capacity {
                break;
            }
            if ledger.find_by_secret(&entry.secret).is_none() {
                ledger.entries.push(entry);
            }
        }
        let dropped = total - ledger.entries.len();
        (ledger, dropped)
    }

    // ── Mutations ────────────────────────────────────────────────

    /// Move an existing entry for `secret` to the front, or create one
    /// there. Existing entries keep their id, name, reveal flag and
    /// creation time.
    pub fn record_or_promote(
        &mut self,
        secret: &NormalizedSecret,
        display_name_hint: Option<&str>,
        reveal_secret: bool,
    ) -> RecordOutcome {
        if let Some(pos) = self.position_by_secret(secret.as_str()) {
            let entry = self.entries.remove(pos);
            let id = entry.id.clone();
            self.entries.insert(0, entry);
            return RecordOutcome {
                id,
                created: false,
                evicted: Vec::new(),
            };
        }

        let name = display_name_hint
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.next_default_name());
        let entry = HistoryEntry::new(name, secret, reveal_secret);
        let id = entry.id.clone();
        self.entries.insert(0, entry);

        let evicted = if self.entries.len() > self.capacity {
            self.entries.split_off(self.capacity)
        } else {
            Vec::new()
        };
        RecordOutcome {
            id,
            created: true,
            evicted,
        }
    }

    /// Rename an entry. The name is trimmed and must not end up empty.
    pub fn rename(&mut self, id: &str, new_name: &str) -> Result<(), TotpError> {
        let name = new_name.trim();
        if name.is_empty() {
            return Err(TotpError::new(
                TotpErrorKind::InvalidInput,
                "Display name must not be empty",
            ));
        }
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| TotpError::not_found(id))?;
        entry.display_name = name.to_string();
        Ok(())
    }

    /// Remove an entry and return it.
    pub fn delete(&mut self, id: &str) -> Result<HistoryEntry, TotpError> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| TotpError::not_found(id))?;
        Ok(self.entries.remove(pos))
    }

    /// Remove everything. Returns how many entries were dropped.
    pub fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }

    // ── Queries ──────────────────────────────────────────────────

    /// Entries, most recent first.
    pub fn list(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn find_by_secret(&self, secret: &str) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.secret == secret)
    }

    fn position_by_secret(&self, secret: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.secret == secret)
    }

    /// Name a new entry would get without a hint.
    pub fn next_default_name(&self) -> String {
        format!("{} {}", DEFAULT_NAME_PREFIX, self.entries.len() + 1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
