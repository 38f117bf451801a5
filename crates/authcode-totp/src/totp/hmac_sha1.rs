//! HMAC-SHA1 (RFC 2104) over the `hmac` and `sha1` crates.

use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::totp::types::{TotpError, TotpErrorKind};

type HmacSha1 = Hmac<Sha1>;

/// SHA-1 digest length in bytes.
pub const DIGEST_LEN: usize = 20;

/// Compute HMAC-SHA1 of `message` under `key`. Keys of any length are
/// accepted; longer-than-block keys are hashed first.
pub fn sign(key: &[u8], message: &[u8]) -> Result<[u8; DIGEST_LEN], TotpError> {
    let mut mac = HmacSha1::new_from_slice(key).map_err(|e| {
        TotpError::new(TotpErrorKind::DerivationError, "HMAC key rejected")
            .with_detail(e.to_string())
    })?;
    mac.update(message);
    let tag = mac.finalize().into_bytes();

    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&tag);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign_hex(key: &[u8], msg: &[u8]) -> String {
        hex::encode(sign(key, msg).unwrap())
    }

    #[test]
    fn rfc2202_case_1() {
        assert_eq!(
            sign_hex(&[0x0b; 20], b"Hi There"),
            "b617318655057264e28bc0b6fb378c8ef146be00"
        );
    }

    #[test]
    fn rfc2202_case_2() {
        assert_eq!(
            sign_hex(b"Jefe", b"what do ya want for nothing?"),
            "effcdf6ae5eb2fa2d27416d5f184df9c259a7c79"
        );
    }

    #[test]
    fn key_longer_than_block() {
        assert_eq!(
            sign_hex(
                &[0xaa; 80],
                b"Test Using Larger Than Block-Size Key - Hash Key First"
            ),
            "aa4ae5e15272d00e95705637ce8a3b55ed402112"
        );
    }

    #[test]
    fn empty_key_and_message() {
        assert_eq!(sign_hex(b"", b""), "fbdb1d1b18aa6c08324b7d64b71fb76370690e1d");
    }

    #[test]
    fn rfc4226_counter_one() {
        let counter = 1u64.to_be_bytes();
        assert_eq!(
            sign_hex(b"12345678901234567890", &counter),
            "75a48a19d4cbe100644e8ac1397eea747a2d33ab"
        );
    }
}
