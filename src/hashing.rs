//! SHA-256 digests for export reports.
//!
//! A job hash identifies an export request independently of JSON key order,
//! so two runs over the same items and configuration can be matched up.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt::Write;

pub fn sha256_hex(data: &[u8]) -> String {
    to_hex(&Sha256::digest(data))
}

/// Compact JSON with object keys sorted at every depth.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let mut value = serde_json::to_value(value)?;
    sort_keys(&mut value);
    serde_json::to_string(&value)
}

fn sort_keys(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = std::mem::take(map).into_iter().collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
            for (key, mut child) in entries {
                sort_keys(&mut child);
                map.insert(key, child);
            }
        }
        Value::Array(children) => children.iter_mut().for_each(sort_keys),
        _ => {}
    }
}

/// Digest over the archive name, canonical items, canonical configuration
/// and engine version, each terminated by a NUL byte.
pub fn compute_job_hash(
    archive_name: &str,
    items: &impl Serialize,
    config: &impl Serialize,
    engine_version: &str,
) -> Result<String, serde_json::Error> {
    let parts = [
        archive_name.to_string(),
        canonical_json(items)?,
        canonical_json(config)?,
        engine_version.to_string(),
    ];

    let mut hasher = Sha256::new();
    for part in &parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    Ok(to_hex(&hasher.finalize()))
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{:02x}", b);
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_keys_are_sorted() {
        let value = json!({"z": 1, "a": 2, "m": {"y": [{"b": 1, "a": 0}], "x": null}});
        assert_eq!(
            canonical_json(&value).unwrap(),
            r#"{"a":2,"m":{"x":null,"y":[{"a":0,"b":1}]},"z":1}"#
        );
    }

    #[test]
    fn test_digest_matches_reference_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(sha256_hex(b"").len(), 64);
    }

    #[test]
    fn test_job_hash_ignores_key_order_but_not_content() {
        let rain = json!([{"title": "Rain", "option": {"b": 1, "a": 2}}]);
        let rain_reordered = json!([{"option": {"a": 2, "b": 1}, "title": "Rain"}]);
        let snow = json!([{"title": "Snow", "option": {"a": 2, "b": 1}}]);
        let config = json!({"canvas": {"width": 1400}});

        let base = compute_job_hash("out.zip", &rain, &config, "1.0.0").unwrap();
        assert_eq!(base, compute_job_hash("out.zip", &rain_reordered, &config, "1.0.0").unwrap());
        assert_ne!(base, compute_job_hash("out.zip", &snow, &config, "1.0.0").unwrap());
        assert_ne!(base, compute_job_hash("out.zip", &rain, &config, "1.0.1").unwrap());
        assert_ne!(base, compute_job_hash("other.zip", &rain, &config, "1.0.0").unwrap());
    }

    #[test]
    fn test_part_boundaries_are_unambiguous() {
        let a = compute_job_hash("ab", &json!(1), &json!(2), "c").unwrap();
        let b = compute_job_hash("a", &json!(1), &json!(2), "bc").unwrap();
        assert_ne!(a, b);
    }
}
