//! Little-endian field codec shared by every hand-rolled on-disk structure.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::error::{Result, WaxError};

/// SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Appends fields to a growing buffer in the canonical little-endian layout.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Length-prefixed byte string (u32 length).
    pub fn put_var_bytes(&mut self, bytes: &[u8]) {
        self.put_u32(u32::try_from(bytes.len()).unwrap_or(u32::MAX));
        self.buf.extend_from_slice(bytes);
    }

    pub fn put_str(&mut self, value: &str) {
        self.put_var_bytes(value.as_bytes());
    }

    /// 0/1 presence tag followed by the encoded value when present.
    pub fn put_opt<T: ?Sized>(&mut self, value: Option<&T>, encode: impl FnOnce(&mut Self, &T)) {
        match value {
            Some(inner) => {
                self.put_u8(1);
                encode(self, inner);
            }
            None => self.put_u8(0),
        }
    }

    pub fn put_opt_u64(&mut self, value: Option<u64>) {
        self.put_opt(value.as_ref(), |w, v| w.put_u64(*v));
    }

    pub fn put_opt_str(&mut self, value: Option<&str>) {
        self.put_opt(value, |w, v| w.put_str(v));
    }

    /// String-keyed string map, count-prefixed, in key order.
    pub fn put_str_map(&mut self, map: &BTreeMap<String, String>) {
        self.put_u32(u32::try_from(map.len()).unwrap_or(u32::MAX));
        for (key, value) in map {
            self.put_str(key);
            self.put_str(value);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

/// Cursor over an encoded structure; every read is bounds-checked and failures
/// carry the decode context string.
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    context: &'static str,
}

impl<'a> ByteReader<'a> {
    #[must_use]
    pub fn new(bytes: &'a [u8], context: &'static str) -> Self {
        Self {
            bytes,
            pos: 0,
            context,
        }
    }

    fn truncated(&self) -> WaxError {
        WaxError::DecodeFailed {
            context: self.context,
            reason: format!("truncated at offset {}", self.pos).into(),
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or_else(|| self.truncated())?;
        let slice = self.bytes.get(self.pos..end).ok_or_else(|| self.truncated())?;
        self.pos = end;
        Ok(slice)
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    pub fn get_f32(&mut self) -> Result<f32> {
        let bytes = self.take(4)?;
        Ok(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn get_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn get_var_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.get_u32()? as usize;
        self.take(len)
    }

    pub fn get_str(&mut self) -> Result<String> {
        let bytes = self.get_var_bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| WaxError::DecodeFailed {
            context: self.context,
            reason: "field is not valid utf-8".into(),
        })
    }

    /// Reads a 0/1 presence tag; any other value is a structural error.
    pub fn get_opt<T>(
        &mut self,
        decode: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<Option<T>> {
        match self.get_u8()? {
            0 => Ok(None),
            1 => Ok(Some(decode(self)?)),
            tag => Err(WaxError::DecodeFailed {
                context: self.context,
                reason: format!("invalid optional tag {tag}").into(),
            }),
        }
    }

    pub fn get_opt_u64(&mut self) -> Result<Option<u64>> {
        self.get_opt(Self::get_u64)
    }

    pub fn get_opt_str(&mut self) -> Result<Option<String>> {
        self.get_opt(Self::get_str)
    }

    pub fn get_str_map(&mut self) -> Result<BTreeMap<String, String>> {
        let count = self.get_u32()? as usize;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let key = self.get_str()?;
            let value = self.get_str()?;
            map.insert(key, value);
        }
        Ok(map)
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    /// Fails unless the cursor consumed the whole input.
    pub fn expect_end(&self) -> Result<()> {
        if self.remaining() == 0 {
            Ok(())
        } else {
            Err(WaxError::DecodeFailed {
                context: self.context,
                reason: format!("{} unexpected trailing bytes", self.remaining()).into(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_scalars_and_options() {
        let mut writer = ByteWriter::new();
        writer.put_u8(7);
        writer.put_u32(0xDEAD_BEEF);
        writer.put_u64(42);
        writer.put_opt_u64(None);
        writer.put_opt_u64(Some(99));
        writer.put_opt_str(Some("kind"));
        let mut map = BTreeMap::new();
        map.insert("lat".to_string(), "48.85".to_string());
        writer.put_str_map(&map);

        let bytes = writer.into_bytes();
        let mut reader = ByteReader::new(&bytes, "test");
        assert_eq!(reader.get_u8().unwrap(), 7);
        assert_eq!(reader.get_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(reader.get_u64().unwrap(), 42);
        assert_eq!(reader.get_opt_u64().unwrap(), None);
        assert_eq!(reader.get_opt_u64().unwrap(), Some(99));
        assert_eq!(reader.get_opt_str().unwrap().as_deref(), Some("kind"));
        assert_eq!(reader.get_str_map().unwrap(), map);
        reader.expect_end().unwrap();
    }

    #[test]
    fn invalid_optional_tag_is_rejected() {
        let bytes = [2u8];
        let mut reader = ByteReader::new(&bytes, "test");
        let err = reader.get_opt_u64().expect_err("tag 2 must fail");
        assert!(matches!(err, WaxError::DecodeFailed { .. }));
    }

    #[test]
    fn truncated_read_is_rejected() {
        let bytes = [1u8, 2];
        let mut reader = ByteReader::new(&bytes, "test");
        assert!(reader.get_u64().is_err());
    }

    #[test]
    fn sha256_matches_known_vector() {
        // SHA-256 of the empty string.
        let digest = sha256(b"");
        assert_eq!(
            digest[..4],
            [0xe3, 0xb0, 0xc4, 0x42],
            "unexpected empty-input digest"
        );
    }
}
