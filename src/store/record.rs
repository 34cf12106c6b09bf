use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

/// Size of the fixed record header: timestamp, key size, value size, each a
/// little-endian u32.
pub const HEADER_SIZE: usize = 12;

/// A single record in the append-only log: a key-value pair or a tombstone.
///
/// A tombstone is encoded with `value_size == 0` and carries no value bytes;
/// on decode its value is `None`. An empty value is therefore
/// indistinguishable from a deletion on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub timestamp: u32,
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
}

impl Record {
    /// Creates a record storing the given value, stamped with the current
    /// wall-clock second.
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        let value = value.into();
        Self {
            timestamp: unix_timestamp(),
            key: key.into(),
            value: if value.is_empty() { None } else { Some(value) },
        }
    }

    /// Creates a tombstone marking the key as deleted.
    pub fn tombstone(key: impl Into<Vec<u8>>) -> Self {
        Self {
            timestamp: unix_timestamp(),
            key: key.into(),
            value: None,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    pub fn value_size(&self) -> u32 {
        self.value.as_ref().map_or(0, |v| v.len() as u32)
    }

    /// Total encoded size of the record in bytes.
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.key.len() + self.value.as_ref().map_or(0, Vec::len)
    }

    /// Serializes the record for writing to a segment file.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.size());
        buf.write_u32::<LittleEndian>(self.timestamp).unwrap();
        buf.write_u32::<LittleEndian>(self.key.len() as u32).unwrap();
        buf.write_u32::<LittleEndian>(self.value_size()).unwrap();
        buf.extend_from_slice(&self.key);
        if let Some(value) = &self.value {
            buf.extend_from_slice(value);
        }
        buf
    }

    /// Deserializes a record from bytes read from a segment file.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::InvalidEntry);
        }

        let mut header = &buf[..HEADER_SIZE];
        let timestamp = header.read_u32::<LittleEndian>()?;
        let key_size = header.read_u32::<LittleEndian>()? as usize;
        let value_size = header.read_u32::<LittleEndian>()? as usize;

        if key_size + value_size != buf.len() - HEADER_SIZE {
            return Err(Error::InvalidEntry);
        }

        let key = buf[HEADER_SIZE..HEADER_SIZE + key_size].to_vec();
        let value = match value_size {
            0 => None,
            _ => Some(buf[HEADER_SIZE + key_size..].to_vec()),
        };

        Ok(Self {
            timestamp,
            key,
            value,
        })
    }
}

/// Seconds since the Unix epoch, truncated to u32.
pub(crate) fn unix_timestamp() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_round_trip() {
        let record = Record::put("user_id", "12345");
        let encoded = record.encode();
        assert_eq!(encoded.len(), record.size());

        let decoded = Record::decode(&encoded).expect("Failed to decode record");
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_encode_decode_tombstone() {
        let record = Record::tombstone("user_id");
        assert!(record.is_tombstone());
        assert_eq!(record.value_size(), 0);

        let encoded = record.encode();
        assert_eq!(encoded.len(), HEADER_SIZE + "user_id".len());

        let decoded = Record::decode(&encoded).expect("Failed to decode tombstone");
        assert_eq!(decoded, record);
        assert!(decoded.is_tombstone());
    }

    #[test]
    fn test_header_layout_is_little_endian() {
        let record = Record {
            timestamp: 0x0102_0304,
            key: b"k".to_vec(),
            value: Some(b"vv".to_vec()),
        };
        let encoded = record.encode();

        assert_eq!(&encoded[0..4], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&encoded[4..8], &[1, 0, 0, 0]);
        assert_eq!(&encoded[8..12], &[2, 0, 0, 0]);
        assert_eq!(&encoded[12..], b"kvv");
    }

    #[test]
    fn test_empty_value_becomes_tombstone() {
        // The format cannot represent an empty value; it collapses into a
        // tombstone.
        let record = Record::put("key", "");
        assert!(record.is_tombstone());
    }

    #[test]
    fn test_decode_short_buffer() {
        assert_eq!(Record::decode(&[]), Err(Error::InvalidEntry));
        assert_eq!(Record::decode(&[0u8; HEADER_SIZE - 1]), Err(Error::InvalidEntry));
    }

    #[test]
    fn test_decode_size_mismatch() {
        let mut encoded = Record::put("key", "value").encode();

        // Trailing garbage makes the sizes disagree with the buffer length.
        encoded.push(0xff);
        assert_eq!(Record::decode(&encoded), Err(Error::InvalidEntry));

        // So does a truncated payload.
        encoded.truncate(encoded.len() - 3);
        assert_eq!(Record::decode(&encoded), Err(Error::InvalidEntry));
    }

    #[test]
    fn test_size_accounts_for_key_and_value() {
        let record = Record::put("abc", "defgh");
        assert_eq!(record.size(), HEADER_SIZE + 3 + 5);

        let tombstone = Record::tombstone("abc");
        assert_eq!(tombstone.size(), HEADER_SIZE + 3);
    }
}
