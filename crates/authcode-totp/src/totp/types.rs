//! Core types for the authcode TOTP engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::totp::codec::NormalizedSecret;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Constants
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Length of one time window in seconds.
pub const PERIOD_SECONDS: u64 = 30;

/// Number of decimal digits in a code.
pub const CODE_DIGITS: usize = 6;

/// `10^CODE_DIGITS`.
pub const CODE_MODULUS: u32 = 1_000_000;

/// Hard cap on the number of history entries.
pub const MAX_HISTORY_ITEMS: usize = 20;

/// Prefix of auto-generated entry names ("Query 1", "Query 2", ...).
pub const DEFAULT_NAME_PREFIX: &str = "Query";

/// Shown in a slot whose code has not been computed yet.
pub const PENDING_PLACEHOLDER: &str = "000000";

/// Shown in a slot whose last derivation failed.
pub const ERROR_INDICATOR: &str = "ERROR";

/// Replaces codes and seeds while privacy mode is on.
pub const REDACTED: &str = "***";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  History entry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A previously used secret with its user-facing metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Opaque, creation-ordered identifier.
    pub id: String,
    /// User-editable label.
    pub display_name: String,
    /// Normalised Base32 secret.
    pub secret: String,
    /// Whether the seed may be shown next to the code.
    pub reveal_secret: bool,
    /// When the entry was first recorded.
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    /// Create an entry with a fresh time-ordered id.
    pub fn new(
        display_name: impl Into<String>,
        secret: &NormalizedSecret,
        reveal_secret: bool,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            display_name: display_name.into(),
            secret: secret.as_str().to_string(),
            reveal_secret,
            created_at: Utc::now(),
        }
    }

    /// Seed text for display: the secret itself only when the entry was
    /// created with reveal enabled and privacy mode is off.
    pub fn seed_preview(&self, privacy_mode: bool) -> String {
        if self.reveal_secret && !privacy_mode {
            self.secret.clone()
        } else {
            REDACTED.to_string()
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Generated code result
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A generated code with associated timing info.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedCode {
    /// The 6-digit code (e.g. "996554").
    pub code: String,
    /// Seconds until the code expires, in `1..=30`.
    pub remaining_seconds: u32,
    /// Window length in seconds.
    pub period: u32,
    /// Elapsed fraction of the window, `0.0..1.0`.
    pub progress: f64,
    /// The time-step counter the code was derived from.
    pub counter: u64,
    /// History entry this code belongs to, if any.
    pub entry_id: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Display slots
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Identifies one independently ticking code display.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotId {
    /// The code for the most recently submitted secret.
    Primary,
    /// The code for one history entry.
    Entry(String),
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Entry(id) => write!(f, "entry:{}", id),
        }
    }
}

/// What a slot currently shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "code", rename_all = "snake_case")]
pub enum SlotDisplay {
    /// Not computed yet.
    Pending,
    /// A valid code for the slot's current window.
    Ready(String),
    /// The last derivation failed.
    Failed,
}

impl Default for SlotDisplay {
    fn default() -> Self {
        Self::Pending
    }
}

impl SlotDisplay {
    /// The code, if one is available.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Ready(code) => Some(code),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Text shown to the user. Privacy mode masks every state.
    pub fn render(&self, privacy_mode: bool) -> String {
        if privacy_mode {
            return REDACTED.to_string();
        }
        match self {
            Self::Pending => PENDING_PLACEHOLDER.to_string(),
            Self::Ready(code) => code.clone(),
            Self::Failed => ERROR_INDICATOR.to_string(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Error type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Error kind for this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TotpErrorKind {
    /// Empty or non-Base32 input, rejected before decoding.
    InvalidSecret,
    /// A symbol outside the alphabet reached the decoder.
    DecodeError,
    /// Umbrella for any failure inside the derivation pipeline.
    DerivationError,
    /// Unknown history entry id.
    NotFound,
    /// Rejected argument other than a secret (e.g. a blank name).
    InvalidInput,
    /// A primary-slot generation is already running.
    Busy,
    /// The history store could not be read or written.
    PersistenceError,
    /// The configuration file could not be used.
    Config,
}

/// Crate-level error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotpError {
    pub kind: TotpErrorKind,
    pub message: String,
    pub detail: Option<String>,
}

impl fmt::Display for TotpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)?;
        if let Some(d) = &self.detail {
            write!(f, " ({})", d)?;
        }
        Ok(())
    }
}

impl std::error::Error for TotpError {}

impl TotpError {
    pub fn new(kind: TotpErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn not_found(id: &str) -> Self {
        Self::new(TotpErrorKind::NotFound, format!("History entry not found: {}", id))
    }

    /// `true` for every error a caller should present as "invalid secret".
    pub fn is_invalid_secret(&self) -> bool {
        matches!(
            self.kind,
            TotpErrorKind::InvalidSecret
                | TotpErrorKind::DecodeError
                | TotpErrorKind::DerivationError
        )
    }
}

impl From<TotpError> for String {
    fn from(e: TotpError) -> String {
        e.to_string()
    }
}
