//! Signed payloads for student attendance QR codes.
//!
//! Format: `ACAD1.<student_id>.<sig>`, where `sig` is the first 8 bytes of
//! HMAC-SHA256(secret, student_id) in lowercase hex. Clients render the
//! payload as a QR image themselves.

use crate::errors::{AppError, AppResult};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const PREFIX: &str = "ACAD1";
const SIG_BYTES: usize = 8;

fn mac_for(secret: &str, student_id: &str) -> AppResult<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(AppError::internal)?;
    mac.update(student_id.as_bytes());
    Ok(mac)
}

pub fn payload_for(secret: &str, student_id: &str) -> AppResult<String> {
    let digest = mac_for(secret, student_id)?.finalize().into_bytes();
    let sig = hex::encode(&digest[..SIG_BYTES]);
    Ok(format!("{PREFIX}.{student_id}.{sig}"))
}

/// Returns the student id carried by a genuine payload.
pub fn verify_payload(secret: &str, payload: &str) -> AppResult<String> {
    let malformed = || AppError::bad_request("unrecognised QR code");

    let mut parts = payload.trim().split('.');
    let (Some(prefix), Some(student_id), Some(sig), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(malformed());
    };
    if prefix != PREFIX || student_id.is_empty() {
        return Err(malformed());
    }
    let sig = hex::decode(sig)
        .ok()
        .filter(|bytes| bytes.len() == SIG_BYTES)
        .ok_or_else(malformed)?;

    mac_for(secret, student_id)?
        .verify_truncated_left(&sig)
        .map_err(|_| AppError::bad_request("QR code signature does not match"))?;
    Ok(student_id.to_string())
}
