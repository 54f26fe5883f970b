//! Venue HMAC signing (private WS multiplexer: "authenticate
//! (venue-specific HMAC, via `hmac`/`sha2` signing of a canonical
//! payload)").
//!
//! Canonical payload for private WS auth: `"GET/realtime{expires_ms}"`,
//! HMAC-SHA256 over the api secret, hex-encoded. REST requests sign the
//! same way over `"{timestamp}{method}{path}{body}"`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn hmac_hex(secret: &str, payload: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Signature for the private WS `auth` frame. `expires_ms` should be a few
/// seconds in the future (the venue rejects a replayed timestamp).
pub fn sign_ws_auth(api_secret: &str, expires_ms: i64) -> (String, String) {
    let payload = format!("GET/realtime{expires_ms}");
    (payload.clone(), hmac_hex(api_secret, &payload))
}

/// Signature for a REST call.
pub fn sign_rest(api_secret: &str, timestamp_ms: i64, method: &str, path: &str, body: &str) -> String {
    let payload = format!("{timestamp_ms}{method}{path}{body}");
    hmac_hex(api_secret, &payload)
}
