use crate::types::VerificationResult;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Compute the header value the vendor sends for `body`: "sha256=<lowercase hex>".
pub fn signature_for(secret: &[u8], body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(body);
    let digest = mac.finalize().into_bytes();
    Some(format!("{SIGNATURE_PREFIX}{}", hex::encode(digest)))
}

/// Check a delivery's signature header against the stored secret.
///
/// Without a secret nothing is checked. With a secret but no header the delivery
/// is also passed through as `Unsigned`: the vendor does not guarantee the header,
/// so callers that need it must enforce `require_signature` themselves.
pub fn verify(secret: Option<&str>, body: &[u8], header: Option<&[u8]>) -> VerificationResult {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        return VerificationResult::Unsigned;
    };
    let Some(header) = header else {
        return VerificationResult::Unsigned;
    };

    let received = match std::str::from_utf8(header) {
        Ok(s) if s.starts_with(SIGNATURE_PREFIX) => s,
        _ => return VerificationResult::MalformedSignature,
    };

    let Some(expected) = signature_for(secret.as_bytes(), body) else {
        return VerificationResult::MalformedSignature;
    };

    if constant_time_eq(received.as_bytes(), expected.as_bytes()) {
        VerificationResult::Verified
    } else {
        VerificationResult::SignatureMismatch
    }
}

/// Length-checked comparison. Equal-length inputs are compared in fixed time.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
