//! Code derivation: RFC 4226 dynamic truncation applied to the RFC 6238
//! 30-second time counter, using HMAC-SHA1 and 6 digits.

use crate::totp::clock::{self, Clock, SystemClock};
use crate::totp::codec::{self, NormalizedSecret};
use crate::totp::hmac_sha1::{self, DIGEST_LEN};
use crate::totp::types::*;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Truncation (RFC 4226 §5.3)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Dynamic truncation to a 31-bit value.
pub fn truncate(digest: &[u8; DIGEST_LEN]) -> u32 {
    let offset = (digest[DIGEST_LEN - 1] & 0x0f) as usize;
    ((digest[offset] as u32 & 0x7f) << 24)
        | ((digest[offset + 1] as u32) << 16)
        | ((digest[offset + 2] as u32) << 8)
        | (digest[offset + 3] as u32)
}

/// Reduce a truncated value to a zero-padded 6-digit string.
pub fn format_code(truncated: u32) -> String {
    format!("{:0>width$}", truncated % CODE_MODULUS, width = CODE_DIGITS)
}

/// HOTP over raw key bytes.
pub fn code_from_key(key: &[u8], counter: u64) -> Result<String, TotpError> {
    let digest = hmac_sha1::sign(key, &counter.to_be_bytes())?;
    Ok(format_code(truncate(&digest)))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Derivation from secrets
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn derivation_failed(cause: TotpError) -> TotpError {
    TotpError::new(TotpErrorKind::DerivationError, "Invalid secret").with_detail(cause.to_string())
}

/// Code for an already normalised secret at `unix_seconds`.
pub fn derive_code_for(secret: &NormalizedSecret, unix_seconds: u64) -> Result<String, TotpError> {
    let key = codec::decode(secret).map_err(derivation_failed)?;
    code_from_key(&key, clock::counter_for(unix_seconds)).map_err(derivation_failed)
}

/// Code for raw user input at `unix_seconds`. Every failure is reported
/// as a single `DerivationError`.
pub fn derive_code_at(raw_secret: &str, unix_seconds: u64) -> Result<String, TotpError> {
    let secret = codec::normalize(raw_secret).map_err(derivation_failed)?;
    derive_code_for(&secret, unix_seconds)
}

/// Code for raw user input at the current system time.
pub fn derive_code(raw_secret: &str) -> Result<String, TotpError> {
    derive_code_at(raw_secret, SystemClock.now_unix())
}

/// Code plus countdown info for a secret at `unix_seconds`.
pub fn generate_code_at(
    secret: &NormalizedSecret,
    unix_seconds: u64,
    entry_id: Option<String>,
) -> Result<GeneratedCode, TotpError> {
    let code = derive_code_for(secret, unix_seconds)?;
    Ok(GeneratedCode {
        code,
        remaining_seconds: clock::seconds_remaining(unix_seconds),
        period: PERIOD_SECONDS as u32,
        progress: clock::progress_fraction(unix_seconds),
        counter: clock::counter_for(unix_seconds),
        entry_id,
    })
}

/// Format a code with a space in the middle (e.g. "996 554").
pub fn format_code_display(code: &str) -> String {
    if code.len() <= 4 {
        return code.to_string();
    }
    let mid = code.len() / 2;
    format!("{} {}", &code[..mid], &code[mid..])
}
