//! On-disk encoding of the record set.
//!
//! File format: records.bin
//!
//! Header (17 bytes):
//! - magic: [u8; 4] ("PSDB")
//! - version: u8 (1)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of the header fields before it)
//!
//! Entries (repeated):
//! - length: u32 (little-endian, payload bytes)
//! - checksum: u32 (CRC32 of the payload)
//! - payload: JSON object `{id, group, date, text, data, seq, content_hash, embedding}`
//!
//! A header problem is fatal. An entry whose checksum or payload does not
//! verify is skipped so the rest of the file stays available.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::embedding::Embedding;
use crate::error::{EncodingError, StorageError};

/// Record file name inside the store directory
pub const RECORDS_FILE_NAME: &str = "records.bin";

const MAGIC: &[u8; 4] = b"PSDB";

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// magic(4) + version(1) + entry_count(8) + checksum(4)
const HEADER_SIZE: usize = 17;

/// length(4) + checksum(4)
const ENTRY_HEADER_SIZE: usize = 8;

/// Borrowed view of one stored record, used when writing.
#[derive(Debug, Serialize)]
pub struct PersistedRecordRef<'a, T> {
    pub id: &'a str,
    pub group: Option<&'a str>,
    pub date: DateTime<Utc>,
    pub text: &'a str,
    pub data: &'a T,
    pub seq: u64,
    pub content_hash: u64,
    pub embedding: &'a Embedding,
}

/// One stored record as read back from disk.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistedRecord<T> {
    pub id: String,
    pub group: Option<String>,
    pub date: DateTime<Utc>,
    pub text: String,
    pub data: T,
    pub seq: u64,
    pub content_hash: u64,
    pub embedding: Embedding,
}

/// Result of decoding a record file.
#[derive(Debug)]
pub struct LoadedRecords<T> {
    pub records: Vec<PersistedRecord<T>>,
    /// Entries dropped because they failed verification or decoding
    pub skipped: usize,
}

/// Encode `entries` into the record file format.
pub fn encode<'a, T, I>(entries: I) -> Result<Vec<u8>, EncodingError>
where
    T: Serialize + 'a,
    I: ExactSizeIterator<Item = PersistedRecordRef<'a, T>>,
{
    let mut buf = Vec::with_capacity(HEADER_SIZE + entries.len() * 256);

    buf.extend_from_slice(MAGIC);
    buf.push(FORMAT_VERSION);
    buf.extend_from_slice(&(entries.len() as u64).to_le_bytes());
    let checksum = crc32fast::hash(&buf[0..HEADER_SIZE - 4]);
    buf.extend_from_slice(&checksum.to_le_bytes());

    for entry in entries {
        let payload = serde_json::to_vec(&entry)?;
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        buf.extend_from_slice(&payload);
    }

    Ok(buf)
}

/// Decode a record file, skipping entries that do not verify.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<LoadedRecords<T>, StorageError> {
    let entry_count = read_header(bytes)?;

    let mut records = Vec::with_capacity(entry_count.min(1 << 20) as usize);
    let mut skipped = 0;
    let mut offset = HEADER_SIZE;

    for index in 0..entry_count {
        if bytes.len() - offset < ENTRY_HEADER_SIZE {
            log::warn!(
                "record file truncated after {} of {} entries",
                index,
                entry_count
            );
            skipped += (entry_count - index) as usize;
            break;
        }

        let length = read_u32(bytes, offset) as usize;
        let checksum = read_u32(bytes, offset + 4);
        offset += ENTRY_HEADER_SIZE;

        if bytes.len() - offset < length {
            log::warn!(
                "record file truncated inside entry {} of {}",
                index + 1,
                entry_count
            );
            skipped += (entry_count - index) as usize;
            break;
        }

        let payload = &bytes[offset..offset + length];
        offset += length;

        if crc32fast::hash(payload) != checksum {
            log::warn!("skipping entry {}: checksum mismatch", index + 1);
            skipped += 1;
            continue;
        }

        match serde_json::from_slice::<PersistedRecord<T>>(payload) {
            Ok(record) => records.push(record),
            Err(err) => {
                log::warn!("skipping entry {}: {}", index + 1, err);
                skipped += 1;
            }
        }
    }

    if offset < bytes.len() {
        log::warn!(
            "ignoring {} trailing bytes in record file",
            bytes.len() - offset
        );
    }

    Ok(LoadedRecords { records, skipped })
}

/// Validate the header and return the entry count.
fn read_header(bytes: &[u8]) -> Result<u64, StorageError> {
    if bytes.len() < HEADER_SIZE {
        return Err(StorageError::InvalidFormat(format!(
            "file is {} bytes, header needs {}",
            bytes.len(),
            HEADER_SIZE
        )));
    }

    if &bytes[0..4] != MAGIC {
        return Err(StorageError::InvalidFormat(
            "not a passagedb record file".to_string(),
        ));
    }

    let version = bytes[4];
    if version != FORMAT_VERSION {
        return Err(StorageError::VersionMismatch(version, FORMAT_VERSION));
    }

    let stored_checksum = read_u32(bytes, HEADER_SIZE - 4);
    if crc32fast::hash(&bytes[0..HEADER_SIZE - 4]) != stored_checksum {
        return Err(StorageError::ChecksumMismatch);
    }

    let mut count = [0u8; 8];
    count.copy_from_slice(&bytes[5..13]);
    Ok(u64::from_le_bytes(count))
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}
