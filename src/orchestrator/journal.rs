//! Journal payload codec for internal store frames.
//!
//! Structured-memory mutations and embedding memos are persisted as frames
//! with reserved kinds so reopen can replay them in order. Payloads are a
//! fixed version prefix followed by a JSON body.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    constants::{JOURNAL_EMBED_PREFIX, JOURNAL_FACT_PREFIX},
    error::{Result, WaxError},
};

/// One structured-memory journal entry (`WAXFACT1`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactJournalRecord {
    pub op: FactJournalOp,
    pub entity: String,
    pub attribute: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactJournalOp {
    Upsert,
    Remove,
}

impl FactJournalRecord {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut bytes = JOURNAL_FACT_PREFIX.to_vec();
        bytes.extend_from_slice(&serde_json::to_vec(self)?);
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let body = strip_prefix(bytes, JOURNAL_FACT_PREFIX, "fact journal")?;
        Ok(serde_json::from_slice(body)?)
    }
}

/// One embedding memo entry (`WAXEM1`): maps a content hash to the frame
/// whose persisted embedding serves that text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedJournalRecord {
    pub content_key: String,
    pub frame_id: u64,
}

impl EmbedJournalRecord {
    #[must_use]
    pub fn new(content_key: [u8; 32], frame_id: u64) -> Self {
        Self {
            content_key: hex_encode(&content_key),
            frame_id,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut bytes = JOURNAL_EMBED_PREFIX.to_vec();
        bytes.extend_from_slice(&serde_json::to_vec(self)?);
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let body = strip_prefix(bytes, JOURNAL_EMBED_PREFIX, "embed journal")?;
        Ok(serde_json::from_slice(body)?)
    }

    pub fn key(&self) -> Result<[u8; 32]> {
        hex_decode(&self.content_key).ok_or(WaxError::DecodeFailed {
            context: "embed journal",
            reason: "content key is not 32 hex bytes".into(),
        })
    }
}

fn strip_prefix<'a>(bytes: &'a [u8], prefix: &[u8], context: &'static str) -> Result<&'a [u8]> {
    bytes
        .strip_prefix(prefix)
        .ok_or(WaxError::DecodeFailed {
            context,
            reason: "missing version prefix".into(),
        })
}

fn hex_encode(bytes: &[u8; 32]) -> String {
    let mut out = String::with_capacity(64);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

fn hex_decode(text: &str) -> Option<[u8; 32]> {
    if text.len() != 64 {
        return None;
    }
    let mut out = [0u8; 32];
    for (i, chunk) in text.as_bytes().chunks(2).enumerate() {
        let hi = (chunk[0] as char).to_digit(16)?;
        let lo = (chunk[1] as char).to_digit(16)?;
        out[i] = (hi * 16 + lo) as u8;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fact_record_roundtrip() {
        let mut metadata = BTreeMap::new();
        metadata.insert("src".to_string(), "edit".to_string());
        let record = FactJournalRecord {
            op: FactJournalOp::Upsert,
            entity: "user:1".into(),
            attribute: "name".into(),
            value: Some("Alice".into()),
            metadata: Some(metadata),
        };
        let bytes = record.encode().expect("encode");
        assert!(bytes.starts_with(b"WAXFACT1"));
        assert_eq!(FactJournalRecord::decode(&bytes).expect("decode"), record);
    }

    #[test]
    fn remove_record_omits_value() {
        let record = FactJournalRecord {
            op: FactJournalOp::Remove,
            entity: "user:1".into(),
            attribute: "name".into(),
            value: None,
            metadata: None,
        };
        let bytes = record.encode().expect("encode");
        assert_eq!(FactJournalRecord::decode(&bytes).expect("decode"), record);
    }

    #[test]
    fn embed_record_roundtrip() {
        let record = EmbedJournalRecord::new([0xA5; 32], 17);
        let bytes = record.encode().expect("encode");
        assert!(bytes.starts_with(b"WAXEM1"));
        let decoded = EmbedJournalRecord::decode(&bytes).expect("decode");
        assert_eq!(decoded.frame_id, 17);
        assert_eq!(decoded.key().expect("key"), [0xA5; 32]);
    }

    #[test]
    fn wrong_prefix_is_rejected() {
        let record = EmbedJournalRecord::new([0u8; 32], 0);
        let bytes = record.encode().expect("encode");
        assert!(FactJournalRecord::decode(&bytes).is_err());
    }
}
