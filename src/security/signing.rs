//! HMAC-SHA256 request signing: canonical JSON serialization and
//! constant-time signature verification.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{GatewayError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Allowed clock skew between client timestamp and server time.
pub const TIMESTAMP_SKEW_MS: i64 = 5 * 60 * 1000;

/// Serialize `value` as JSON with object keys sorted lexicographically
/// at every nesting level. Both client and server must produce the
/// identical byte sequence for the signature to verify.
pub fn stable_stringify(value: &Value) -> String {
    let mut out = String::new();
    write_stable(value, &mut out);
    out
}

fn write_stable(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).unwrap());
                out.push(':');
                write_stable(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_stable(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

/// Compute `HMAC-SHA256(key, "<timestamp>.<stableStringify(payload)>")`
/// and hex-encode the digest.
pub fn sign(signing_key: &[u8], timestamp_ms: i64, payload: &Value) -> String {
    let message = format!("{}.{}", timestamp_ms, stable_stringify(payload));
    let mut mac = HmacSha256::new_from_slice(signing_key).expect("HMAC accepts keys of any length");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a request's `x-timestamp`/`x-signature` headers against the
/// session's signing key and the canonical payload, per 4.7:
/// reject missing headers, reject timestamps outside the skew window,
/// and compare signatures in constant time.
pub fn verify(
    signing_key_hex: &str,
    timestamp_header: Option<&str>,
    signature_header: Option<&str>,
    now_ms: i64,
    payload: &Value,
) -> Result<()> {
    let timestamp_str = timestamp_header.ok_or_else(|| GatewayError::auth_n("missing x-timestamp header"))?;
    let signature = signature_header.ok_or_else(|| GatewayError::auth_n("missing x-signature header"))?;

    let timestamp: i64 = timestamp_str
        .parse()
        .map_err(|_| GatewayError::auth_n("x-timestamp must be milliseconds since epoch"))?;

    if (now_ms - timestamp).abs() > TIMESTAMP_SKEW_MS {
        return Err(GatewayError::auth_n("request timestamp outside the allowed skew window"));
    }

    let signing_key = hex::decode(signing_key_hex)
        .map_err(|_| GatewayError::server("session signing key is not valid hex"))?;
    let expected = sign(&signing_key, timestamp, payload);

    let expected_bytes = expected.as_bytes();
    let actual_bytes = signature.as_bytes();
    let matches = expected_bytes.len() == actual_bytes.len() && bool::from(expected_bytes.ct_eq(actual_bytes));
    if !matches {
        return Err(GatewayError::auth_n("signature verification failed"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stable_stringify_sorts_keys_at_every_depth() {
        let a = json!({"b": 1, "a": {"d": 2, "c": 3}});
        let b = json!({"a": {"c": 3, "d": 2}, "b": 1});
        assert_eq!(stable_stringify(&a), stable_stringify(&b));
        assert_eq!(stable_stringify(&a), r#"{"a":{"c":3,"d":2},"b":1}"#);
    }

    #[test]
    fn stable_stringify_preserves_array_order() {
        assert_eq!(stable_stringify(&json!([3, 1, 2])), "[3,1,2]");
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let key = [7u8; 32];
        let key_hex = hex::encode(key);
        let payload = json!({"sessionId": "S", "query": "SELECT 1"});
        let now = 1_700_000_000_000i64;
        let sig = sign(&key, now, &payload);
        assert!(verify(&key_hex, Some(&now.to_string()), Some(&sig), now, &payload).is_ok());
    }

    #[test]
    fn verify_rejects_modified_payload() {
        let key = [7u8; 32];
        let key_hex = hex::encode(key);
        let payload = json!({"sessionId": "S", "query": "SELECT 1"});
        let now = 1_700_000_000_000i64;
        let sig = sign(&key, now, &payload);
        let tampered = json!({"sessionId": "S", "query": "SELECT 2"});
        assert!(verify(&key_hex, Some(&now.to_string()), Some(&sig), now, &tampered).is_err());
    }

    #[test]
    fn verify_rejects_stale_timestamp() {
        let key = [7u8; 32];
        let key_hex = hex::encode(key);
        let payload = json!({"a": 1});
        let old = 0i64;
        let sig = sign(&key, old, &payload);
        assert!(verify(&key_hex, Some(&old.to_string()), Some(&sig), 10 * 60 * 1000, &payload).is_err());
    }

    #[test]
    fn verify_rejects_missing_headers() {
        let payload = json!({"a": 1});
        assert!(verify("aa", None, Some("sig"), 0, &payload).is_err());
        assert!(verify("aa", Some("0"), None, 0, &payload).is_err());
    }
}
