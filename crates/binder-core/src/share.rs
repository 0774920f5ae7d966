//! Compact share codes for passing a single trigger around out of band.
//!
//! A code is `WB1:` followed by the URL-safe base64 (no padding) of the
//! zlib-compressed JSON payload.

use crate::config::{DEFAULT_CATEGORY, SHARE_PREFIX};
use crate::error::{BinderError, Result};
use crate::models::Trigger;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde_json::{json, Map, Value};
use std::io::{Read, Write};

pub type Payload = Map<String, Value>;

pub fn encode(payload: &Payload) -> Result<String> {
    let raw = serde_json::to_vec(payload)?;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(&raw)?;
    let compressed = encoder.finish()?;
    Ok(format!("{}{}", SHARE_PREFIX, URL_SAFE_NO_PAD.encode(compressed)))
}

pub fn decode(code: &str) -> Result<Payload> {
    let code = code.trim();
    let body = code.strip_prefix(SHARE_PREFIX).unwrap_or(code);
    let body = body.trim_end_matches('=');

    let padding = (4 - body.len() % 4) % 4;
    let padded = format!("{}{}", body, "=".repeat(padding));

    let compressed = URL_SAFE
        .decode(padded.as_bytes())
        .map_err(|e| BinderError::MalformedCode(format!("base64: {}", e)))?;

    let mut raw = Vec::new();
    ZlibDecoder::new(compressed.as_slice())
        .read_to_end(&mut raw)
        .map_err(|e| BinderError::MalformedCode(format!("zlib: {}", e)))?;

    let value: Value = serde_json::from_slice(&raw)
        .map_err(|e| BinderError::MalformedCode(format!("json: {}", e)))?;

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(BinderError::MalformedCode(
            "payload is not a mapping".to_string(),
        )),
    }
}

/// Share code for one trigger, wrapped as `{"type": "bind", "bind": {...}}`.
pub fn encode_trigger(trigger: &Trigger) -> Result<String> {
    let mut payload = Payload::new();
    payload.insert("type".to_string(), json!("bind"));
    payload.insert("bind".to_string(), serde_json::to_value(trigger)?);
    encode(&payload)
}

pub fn decode_trigger(code: &str) -> Result<Trigger> {
    let payload = decode(code)?;

    if payload.get("type").and_then(Value::as_str) != Some("bind") {
        return Err(BinderError::MalformedCode("wrong payload type".to_string()));
    }

    let mut bind = match payload.get("bind") {
        Some(Value::Object(bind)) => bind.clone(),
        _ => return Err(BinderError::MalformedCode("bad trigger payload".to_string())),
    };
    bind.entry("category")
        .or_insert_with(|| json!(DEFAULT_CATEGORY));
    bind.entry("favorite").or_insert_with(|| json!(false));

    serde_json::from_value(Value::Object(bind))
        .map_err(|e| BinderError::MalformedCode(format!("trigger: {}", e)))
}
