//! CRC-32 (zlib / ISO-HDLC: reflected 0xEDB88320, init 0xFFFFFFFF, final
//! complement).  The sole integrity oracle for the locator, the header
//! blob and every unpacked stream.

use crate::error::{ArchiveError, ChecksumField, Result};

/// Checksum of `bytes`.  Empty input yields 0.
#[inline]
pub fn checksum(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

/// Fail with [`ArchiveError::Integrity`] naming `field` unless
/// `checksum(bytes) == expected`.
pub fn verify(field: ChecksumField, expected: u32, bytes: &[u8]) -> Result<()> {
    let actual = checksum(bytes);
    if actual != expected {
        return Err(ArchiveError::Integrity { field, expected, actual });
    }
    Ok(())
}
