//! TOTP crate: sub-modules.

pub mod types;
pub mod codec;
pub mod hmac_sha1;
pub mod core;
pub mod clock;
pub mod history;
pub mod storage;
pub mod service;
pub mod ticker;
pub mod session;

// Re-export top-level items for convenience.
pub use types::*;
pub use codec::NormalizedSecret;
pub use clock::{Clock, ManualClock, SharedClock, SystemClock, TimeWindow};
pub use history::{HistoryLedger, RecordOutcome};
pub use storage::{HistoryStore, JsonFileStore, MemoryStore};
pub use service::{Generation, TotpService, TotpServiceState};
pub use ticker::{CountdownTicker, SlotView};
pub use session::{Board, BoardRow, Session};
