//! Versioned encoding of store payloads
//!
//! JSON payloads are wrapped in a `{"v": 1, "data": ...}` envelope so a
//! record written by a different schema surfaces as `Error::Decode` instead of
//! a silently misread value. Embeddings are little-endian f32 blobs.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Current payload envelope version
pub const PAYLOAD_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    v: u32,
    data: &'a T,
}

#[derive(Deserialize)]
struct Envelope<T> {
    v: u32,
    data: T,
}

#[derive(Deserialize)]
struct VersionHeader {
    v: Option<u32>,
}

/// Wrap a value in the versioned envelope
pub fn encode_payload<T: Serialize>(record: &'static str, value: &T) -> Result<String> {
    serde_json::to_string(&EnvelopeRef {
        v: PAYLOAD_VERSION,
        data: value,
    })
    .map_err(|e| Error::decode(record, format!("cannot encode payload: {}", e)))
}

/// Unwrap a versioned envelope, rejecting unknown versions
pub fn decode_payload<T: DeserializeOwned>(record: &'static str, raw: &str) -> Result<T> {
    let header: VersionHeader =
        serde_json::from_str(raw).map_err(|e| Error::decode(record, format!("malformed payload: {}", e)))?;

    match header.v {
        Some(PAYLOAD_VERSION) => {}
        Some(other) => {
            return Err(Error::decode(
                record,
                format!("unsupported payload version {}", other),
            ));
        }
        None => return Err(Error::decode(record, "payload has no version")),
    }

    let envelope: Envelope<T> =
        serde_json::from_str(raw).map_err(|e| Error::decode(record, format!("malformed payload: {}", e)))?;
    debug_assert_eq!(envelope.v, PAYLOAD_VERSION);
    Ok(envelope.data)
}

/// Serialize an embedding as little-endian f32 bytes
pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Deserialize an embedding blob, checking it holds exactly `dimension` floats
pub fn decode_embedding(bytes: &[u8], dimension: usize) -> Result<Vec<f32>> {
    if bytes.len() != dimension * 4 {
        return Err(Error::decode(
            "embedding",
            format!(
                "blob holds {} bytes, expected {} for dimension {}",
                bytes.len(),
                dimension * 4,
                dimension
            ),
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Fixed-width RFC3339 timestamp; lexicographic order equals time order
pub fn encode_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_timestamp(record: &'static str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::decode(record, format!("invalid timestamp '{}': {}", raw, e)))
}
