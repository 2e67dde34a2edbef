//! Framing for history log records.
//!
//! ```text
//! file:   [MAGIC: 4 bytes][VERSION: 1 byte][record]*
//! record: [version: 1 byte][length: 4 bytes LE][JSON: N bytes][crc32: 4 bytes LE]
//! ```

use std::io::{Error as IoError, ErrorKind, Read, Result as IoResult, Write};

use crc32fast::Hasher;
use serde::{de::DeserializeOwned, Serialize};

const CODEC_VERSION: u8 = 1;

/// Records larger than this are treated as corruption.
const MAX_RECORD_SIZE: usize = 16 * 1024 * 1024;

/// Identifies a history log file.
pub const MAGIC: [u8; 4] = *b"ACLH";

/// Length of the file header.
pub const HEADER_LEN: u64 = 5;

fn checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Serializes one record.
pub fn encode<T: Serialize>(value: &T) -> IoResult<Vec<u8>> {
    let data = serde_json::to_vec(value)
        .map_err(|e| IoError::new(ErrorKind::InvalidData, format!("serialization failed: {e}")))?;
    let len = u32::try_from(data.len()).map_err(|_| {
        IoError::new(
            ErrorKind::InvalidData,
            format!("record of {} bytes is too large", data.len()),
        )
    })?;

    let mut out = Vec::with_capacity(data.len() + 9);
    out.push(CODEC_VERSION);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&data);
    out.extend_from_slice(&checksum(&data).to_le_bytes());
    Ok(out)
}

/// Reads one record, returning it with the number of bytes consumed.
///
/// A record cut short by a crash surfaces as `UnexpectedEof`; a damaged one
/// as `InvalidData`.
pub fn decode<T: DeserializeOwned>(reader: &mut impl Read) -> IoResult<(T, u64)> {
    let mut prefix = [0u8; 5];
    reader.read_exact(&mut prefix)?;
    if prefix[0] != CODEC_VERSION {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("unsupported record version {}", prefix[0]),
        ));
    }

    let len = u32::from_le_bytes([prefix[1], prefix[2], prefix[3], prefix[4]]) as usize;
    if len > MAX_RECORD_SIZE {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("record size {len} exceeds maximum {MAX_RECORD_SIZE}"),
        ));
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data)?;
    let mut crc = [0u8; 4];
    reader.read_exact(&mut crc)?;

    let stored = u32::from_le_bytes(crc);
    let computed = checksum(&data);
    if stored != computed {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("CRC mismatch: stored={stored:08x}, computed={computed:08x}"),
        ));
    }

    let value = serde_json::from_slice(&data)
        .map_err(|e| IoError::new(ErrorKind::InvalidData, format!("deserialization failed: {e}")))?;
    Ok((value, (len + 9) as u64))
}

pub fn write_header(writer: &mut impl Write) -> IoResult<()> {
    writer.write_all(&MAGIC)?;
    writer.write_all(&[CODEC_VERSION])
}

/// Validates the file header and returns its version.
pub fn read_header(reader: &mut impl Read) -> IoResult<u8> {
    let mut header = [0u8; 5];
    reader.read_exact(&mut header)?;
    if header[..4] != MAGIC {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            "not a history log (bad magic bytes)",
        ));
    }
    Ok(header[4])
}
