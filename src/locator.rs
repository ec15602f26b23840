//! Locate and verify the metadata blob.
//!
//! The small fixed-size locator is checked before any variable-length read
//! is attempted, so a corrupt file is rejected without trusting its size
//! fields.  The blob is then checked against its own CRC before anyone
//! parses it.

use std::io::{self, Read, Seek, SeekFrom};

use crate::checksum::verify;
use crate::error::{ArchiveError, ChecksumField, Result};
use crate::signature::SignatureHeader;

/// Read the header blob described by `header.locator`.
///
/// `stream` must be positioned immediately after the signature header: the
/// blob offset is applied as a relative seek from there.
pub fn locate<R: Read + Seek + ?Sized>(stream: &mut R, header: &SignatureHeader) -> Result<Vec<u8>> {
    verify_locator(header)?;
    read_blob(stream, header)
}

/// Check the locator record against its stored checksum.
pub fn verify_locator(header: &SignatureHeader) -> Result<()> {
    verify(ChecksumField::Locator, header.locator_crc, &header.locator.to_bytes())
}

/// Seek to and read the blob, then check it.  The locator itself is trusted
/// here; call [`verify_locator`] first.
pub fn read_blob<R: Read + Seek + ?Sized>(stream: &mut R, header: &SignatureHeader) -> Result<Vec<u8>> {
    let locator = &header.locator;
    let short = || ArchiveError::Truncated { expected: locator.blob_size, actual: 0 };

    let seek = i64::try_from(locator.blob_offset)
        .ok()
        .map(|offset| stream.seek(SeekFrom::Current(offset)));
    match seek {
        Some(Ok(_)) => {}
        // Offsets no stream can address hold no blob.
        None => return Err(short()),
        Some(Err(e)) if e.kind() == io::ErrorKind::InvalidInput => return Err(short()),
        Some(Err(e)) => return Err(e.into()),
    }

    // Read through `take` instead of allocating `blob_size` up front.
    let mut blob = Vec::new();
    (&mut *stream).take(locator.blob_size).read_to_end(&mut blob)?;
    if (blob.len() as u64) < locator.blob_size {
        return Err(ArchiveError::Truncated {
            expected: locator.blob_size,
            actual:   blob.len() as u64,
        });
    }

    verify(ChecksumField::Blob, locator.blob_crc, &blob)?;
    Ok(blob)
}
