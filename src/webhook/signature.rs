//! HMAC verification of webhook bodies.
//!
//! The platform signs the raw request body with the app secret and sends
//! `x-hub-signature: sha1=<hex>` (or `sha256=<hex>` in the newer header).

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use thiserror::Error;

pub const SIGNATURE_HEADER: &str = "x-hub-signature";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("request carries no signature header")]
    Missing,
    #[error("signature header is not of the form <method>=<hex>")]
    Malformed,
    #[error("unsupported signature method: {0}")]
    UnsupportedMethod(String),
    #[error("request signature does not match the body")]
    Mismatch,
}

/// Check `header` against the HMAC of `body` under `secret`.
pub fn verify(secret: &str, body: &[u8], header: Option<&str>) -> Result<(), SignatureError> {
    let header = header.map(str::trim).filter(|h| !h.is_empty());
    let (method, digest) = header
        .ok_or(SignatureError::Missing)?
        .split_once('=')
        .ok_or(SignatureError::Malformed)?;
    let expected = hex::decode(digest.trim()).map_err(|_| SignatureError::Malformed)?;

    let matches = match method.trim().to_ascii_lowercase().as_str() {
        "sha1" => {
            let mut mac = Hmac::<Sha1>::new_from_slice(secret.as_bytes())
                .map_err(|_| SignatureError::Mismatch)?;
            mac.update(body);
            mac.verify_slice(&expected).is_ok()
        }
        "sha256" => {
            let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
                .map_err(|_| SignatureError::Mismatch)?;
            mac.update(body);
            mac.verify_slice(&expected).is_ok()
        }
        other => return Err(SignatureError::UnsupportedMethod(other.to_string())),
    };

    if matches {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// `sha1=<hex>` header value for `body`, as the platform would send it
#[cfg(test)]
pub(crate) fn sign_sha1(secret: &str, body: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha1>::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    format!("sha1={}", hex::encode(mac.finalize().into_bytes()))
}

/// `sha256=<hex>` header value for `body`
#[cfg(test)]
pub(crate) fn sign_sha256(secret: &str, body: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
