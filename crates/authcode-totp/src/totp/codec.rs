//! Strict RFC 4648 Base32 secret handling.
//!
//! Input is normalised (whitespace removed, ASCII letters upper-cased) and
//! validated against `A-Z2-7` before any decoding happens. Padding is not
//! accepted. Decoding goes through the `base32` crate (unpadded RFC 4648),
//! which discards any trailing bits that do not fill a byte.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::totp::types::{TotpError, TotpErrorKind};

/// RFC 4648 Base32 alphabet.
pub const BASE32_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// A secret that passed normalisation. Only constructible through
/// [`normalize`], so holding one means the text is non-empty Base32.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NormalizedSecret(String);

impl NormalizedSecret {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// Secrets never end up in logs through `{:?}`.
impl fmt::Debug for NormalizedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NormalizedSecret(<{} symbols>)", self.0.len())
    }
}

impl AsRef<str> for NormalizedSecret {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for NormalizedSecret {
    type Error = TotpError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        normalize(&raw)
    }
}

impl From<NormalizedSecret> for String {
    fn from(s: NormalizedSecret) -> String {
        s.0
    }
}

/// Value of one alphabet symbol, or `None` if it is not in `A-Z2-7`.
pub fn symbol_value(c: char) -> Option<u8> {
    match c {
        'A'..='Z' => Some(c as u8 - b'A'),
        '2'..='7' => Some(c as u8 - b'2' + 26),
        _ => None,
    }
}

/// Strip whitespace, upper-case ASCII letters and validate.
pub fn normalize(raw: &str) -> Result<NormalizedSecret, TotpError> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if cleaned.is_empty() {
        return Err(TotpError::new(
            TotpErrorKind::InvalidSecret,
            "Secret is empty",
        ));
    }
    if let Some((pos, _)) = cleaned.char_indices().find(|(_, c)| symbol_value(*c).is_none()) {
        return Err(
            TotpError::new(TotpErrorKind::InvalidSecret, "Secret is not valid Base32")
                .with_detail(format!("unexpected character at byte {}", pos)),
        );
    }
    Ok(NormalizedSecret(cleaned))
}

/// Whether `raw` would survive [`normalize`].
pub fn is_valid_base32(raw: &str) -> bool {
    normalize(raw).is_ok()
}

/// Decode a normalised secret. Cannot fail for a [`NormalizedSecret`], but
/// shares its error path with [`decode_symbols`].
pub fn decode(secret: &NormalizedSecret) -> Result<Vec<u8>, TotpError> {
    decode_symbols(secret.as_str())
}

/// Decode a string that is expected to contain only alphabet symbols.
pub fn decode_symbols(symbols: &str) -> Result<Vec<u8>, TotpError> {
    base32::decode(base32::Alphabet::Rfc4648 { padding: false }, symbols).ok_or_else(|| {
        let pos = symbols.chars().position(|c| symbol_value(c).is_none()).unwrap_or(0);
        TotpError::new(TotpErrorKind::DecodeError, "Invalid Base32 symbol")
            .with_detail(format!("position {}", pos))
    })
}

/// Normalise then decode in one step.
pub fn normalize_and_decode(raw: &str) -> Result<Vec<u8>, TotpError> {
    decode(&normalize(raw)?)
}

/// Live input filter: drops anything that could never be part of a secret
/// and upper-cases letters. Whitespace is kept so grouped secrets stay
/// readable while typing.
pub fn sanitize_input(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphabetic() || ('2'..='7').contains(c) || c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}
