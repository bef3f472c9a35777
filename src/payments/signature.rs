use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Check a hex-encoded HMAC-SHA256 of the raw request body.
pub fn verify_webhook_signature(secret: &str, payload: &[u8], signature: &str) -> Result<bool> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal("Invalid webhook secret".into()))?;
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());

    let signature = signature.trim().to_ascii_lowercase();
    Ok(expected.as_bytes().ct_eq(signature.as_bytes()).into())
}
