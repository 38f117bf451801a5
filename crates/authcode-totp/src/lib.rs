//! # authcode – TOTP engine
//!
//! Local, single-user time-based one-time password generator:
//!
//! - **Secret codec** – whitespace/case-insensitive, strict RFC 4648 Base32
//! - **RFC 4226 / 6238** – HMAC-SHA1 dynamic truncation over 30-second windows
//! - **Countdown clock** – wall-clock aligned counters and seconds-remaining
//! - **History ledger** – most-recent-first, deduplicated, capped at 20 entries
//! - **Persistence** – JSON history store with legacy record migration
//! - **Session** – primary slot plus one cancellable countdown task per entry

pub mod totp;
