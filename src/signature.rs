//! The 32-byte signature header at offset 0.
//!
//! ```text
//! offset 0   magic[6]            37 7A BC AF 27 1C
//! offset 6   version major, minor
//! offset 8   locator_crc  (u32)  CRC-32 of bytes 12..32
//! offset 12  blob_offset  (u64)  relative to offset 32
//! offset 20  blob_size    (u64)
//! offset 28  blob_crc     (u32)
//! ```
//!
//! All integers are little-endian.  Fields are encoded one by one into a
//! byte buffer; nothing here relies on in-memory struct layout.
//!
//! Decoding checks the magic and the major version only.  The locator
//! checksum is left to [`crate::locator`] so that a corrupt locator is
//! reported as an integrity failure rather than a format failure.

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::io::{self, Read, Write};

use crate::checksum::checksum;
use crate::error::{ArchiveError, Result};

pub const SIGNATURE: [u8; 6] = [b'7', b'z', 0xBC, 0xAF, 0x27, 0x1C];
pub const VERSION_MAJOR: u8 = 0;
pub const VERSION_MINOR: u8 = 2;

pub const SIGNATURE_HEADER_SIZE: usize = 32;
pub const LOCATOR_SIZE: usize = 20;
/// Byte offset of the locator record within the signature header.
pub const LOCATOR_OFFSET: usize = SIGNATURE_HEADER_SIZE - LOCATOR_SIZE;

/// Where the metadata blob lives and what its checksum must be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Locator {
    /// Offset of the blob, counted from the end of the signature header.
    pub blob_offset: u64,
    pub blob_size:   u64,
    pub blob_crc:    u32,
}

impl Locator {
    pub fn to_bytes(&self) -> [u8; LOCATOR_SIZE] {
        let mut buf = [0u8; LOCATOR_SIZE];
        LittleEndian::write_u64(&mut buf[0..8], self.blob_offset);
        LittleEndian::write_u64(&mut buf[8..16], self.blob_size);
        LittleEndian::write_u32(&mut buf[16..20], self.blob_crc);
        buf
    }

    pub fn from_bytes(buf: &[u8; LOCATOR_SIZE]) -> Self {
        Self {
            blob_offset: LittleEndian::read_u64(&buf[0..8]),
            blob_size:   LittleEndian::read_u64(&buf[8..16]),
            blob_crc:    LittleEndian::read_u32(&buf[16..20]),
        }
    }

    /// Checksum over the serialized record.
    pub fn checksum(&self) -> u32 {
        checksum(&self.to_bytes())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub magic:         [u8; 6],
    pub version_major: u8,
    pub version_minor: u8,
    pub locator_crc:   u32,
    pub locator:       Locator,
}

impl SignatureHeader {
    /// Header written by a freshly created archive: the locator is zeroed
    /// until the compressor finalizes it.
    pub fn pending() -> Self {
        Self::with_locator(Locator::default())
    }

    /// Header pointing at a finished blob, with the locator checksum filled in.
    pub fn with_locator(locator: Locator) -> Self {
        Self {
            magic:         SIGNATURE,
            version_major: VERSION_MAJOR,
            version_minor: VERSION_MINOR,
            locator_crc:   locator.checksum(),
            locator,
        }
    }

    pub fn to_bytes(&self) -> [u8; SIGNATURE_HEADER_SIZE] {
        let mut buf = [0u8; SIGNATURE_HEADER_SIZE];
        buf[0..6].copy_from_slice(&self.magic);
        buf[6] = self.version_major;
        buf[7] = self.version_minor;
        LittleEndian::write_u32(&mut buf[8..12], self.locator_crc);
        buf[LOCATOR_OFFSET..].copy_from_slice(&self.locator.to_bytes());
        buf
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.to_bytes())
    }

    /// Read exactly [`SIGNATURE_HEADER_SIZE`] bytes and check the magic.
    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let mut buf = [0u8; SIGNATURE_HEADER_SIZE];
        reader.read_exact(&mut buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => ArchiveError::format(format!(
                "stream is shorter than the {SIGNATURE_HEADER_SIZE}-byte signature header"
            )),
            _ => ArchiveError::Io(e),
        })?;
        Self::from_bytes(&buf)
    }

    pub fn from_bytes(buf: &[u8; SIGNATURE_HEADER_SIZE]) -> Result<Self> {
        let mut magic = [0u8; 6];
        magic.copy_from_slice(&buf[0..6]);
        if magic != SIGNATURE {
            return Err(ArchiveError::format(format!(
                "bad signature {}",
                hex::encode(magic)
            )));
        }

        let mut fields = &buf[6..LOCATOR_OFFSET];
        let version_major = fields.read_u8()?;
        let version_minor = fields.read_u8()?;
        if version_major != VERSION_MAJOR {
            return Err(ArchiveError::Unsupported(format!(
                "format version {version_major}.{version_minor}"
            )));
        }
        let locator_crc = fields.read_u32::<LittleEndian>()?;

        let mut locator = [0u8; LOCATOR_SIZE];
        locator.copy_from_slice(&buf[LOCATOR_OFFSET..]);

        Ok(Self {
            magic,
            version_major,
            version_minor,
            locator_crc,
            locator: Locator::from_bytes(&locator),
        })
    }
}
