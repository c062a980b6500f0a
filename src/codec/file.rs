//! Fixed file header and checksum footer shared by both files in a
//! (segment, field) pair (spec.md §4.5: "Files carry a fixed header (magic,
//! codec name, version, segment id, suffix) and a footer (checksum)").

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::SegmentId;
use crc32fast::Hasher;
use std::io::Read;
use uuid::Uuid;

pub const MAGIC: [u8; 4] = *b"SEIS";
pub const CODEC_NAME: [u8; 8] = *b"seismicc";
pub const VERSION: u32 = 1;

pub const HEADER_LEN: usize = 4 + 8 + 4 + 16 + 1;
pub const FOOTER_LEN: usize = 4;

/// Distinguishes the two files of a (segment, field) pair so a misplaced
/// file is caught even if header/checksum both happen to validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSuffix {
    TermDictionary = 0,
    Postings = 1,
}

impl FileSuffix {
    fn to_byte(self) -> u8 {
        self as u8
    }

    fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(FileSuffix::TermDictionary),
            1 => Ok(FileSuffix::Postings),
            other => Err(Error::new(
                ErrorKind::Corruption,
                format!("unknown file suffix byte {other}"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FileHeader {
    pub segment_id: SegmentId,
    pub suffix: FileSuffix,
}

impl FileHeader {
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        let mut pos = 0;
        buf[pos..pos + 4].copy_from_slice(&MAGIC);
        pos += 4;
        buf[pos..pos + 8].copy_from_slice(&CODEC_NAME);
        pos += 8;
        buf[pos..pos + 4].copy_from_slice(&VERSION.to_le_bytes());
        pos += 4;
        buf[pos..pos + 16].copy_from_slice(self.segment_id.0.as_bytes());
        pos += 16;
        buf[pos] = self.suffix.to_byte();
        buf
    }

    /// Validates magic and version; a magic mismatch or unknown version is
    /// non-recoverable (spec.md §7, `CorruptionError`/`VersionError`).
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::new(ErrorKind::Corruption, "truncated file header"));
        }
        let mut pos = 0;
        let magic = &bytes[pos..pos + 4];
        pos += 4;
        if magic != MAGIC {
            return Err(Error::new(ErrorKind::Corruption, "bad magic bytes"));
        }
        let codec_name = &bytes[pos..pos + 8];
        pos += 8;
        if codec_name != CODEC_NAME {
            return Err(Error::new(ErrorKind::Corruption, "unrecognized codec name"));
        }
        let version = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap());
        pos += 4;
        if version != VERSION {
            return Err(Error::new(
                ErrorKind::Version,
                format!("unsupported codec version {version}"),
            ));
        }
        let segment_id = SegmentId(Uuid::from_bytes(bytes[pos..pos + 16].try_into().unwrap()));
        pos += 16;
        let suffix = FileSuffix::from_byte(bytes[pos])?;
        Ok(FileHeader { segment_id, suffix })
    }
}

/// Appends a little-endian CRC32 footer over `body` (everything written
/// after the header).
pub fn write_footer(out: &mut Vec<u8>, body: &[u8]) {
    let mut hasher = Hasher::new();
    hasher.update(body);
    out.extend_from_slice(&hasher.finalize().to_le_bytes());
}

/// Validates the trailing checksum against `body`. `file` must be
/// `header || body || footer`.
pub fn verify_footer(body: &[u8], footer: &[u8]) -> Result<()> {
    if footer.len() != FOOTER_LEN {
        return Err(Error::new(ErrorKind::Corruption, "truncated file footer"));
    }
    let mut hasher = Hasher::new();
    hasher.update(body);
    let expected = hasher.finalize();
    let stored = u32::from_le_bytes(footer.try_into().unwrap());
    if expected != stored {
        #[cfg(feature = "logging")]
        log::error!("checksum mismatch: expected {expected:x}, stored {stored:x}");
        return Err(Error::new(
            ErrorKind::Corruption,
            format!("checksum mismatch: expected {expected:x}, stored {stored:x}"),
        ));
    }
    Ok(())
}

/// Reads an entire codec file into memory and splits it into header, body,
/// and footer, validating both header and checksum eagerly (spec.md §4.5:
/// "All reads MUST validate the checksum on open").
pub fn read_and_validate(mut reader: impl Read, expected_suffix: FileSuffix) -> Result<(FileHeader, Vec<u8>)> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    if bytes.len() < HEADER_LEN + FOOTER_LEN {
        return Err(Error::new(ErrorKind::Corruption, "file too short for header+footer"));
    }
    let header = FileHeader::decode(&bytes[..HEADER_LEN])?;
    if header.suffix != expected_suffix {
        return Err(Error::new(ErrorKind::Corruption, "file suffix does not match expected kind"));
    }
    let body_end = bytes.len() - FOOTER_LEN;
    verify_footer(&bytes[HEADER_LEN..body_end], &bytes[body_end..])?;
    let body = bytes[HEADER_LEN..body_end].to_vec();
    Ok((header, body))
}
