//! Folder decoding: packed bytes in the data region → unpacked stream.
//!
//! Used both for entry contents and for compressed headers.  A compressed
//! header points into the archive's own data region, so the decoder always
//! works on the archive stream rather than on the header blob.

use std::io::{Read, Seek, SeekFrom};

use crate::checksum::checksum;
use crate::codec::{get_codec_by_method, CodecError};
use crate::index::{EncodedHeader, Folder};
use crate::signature::SIGNATURE_HEADER_SIZE;

/// Object-safe `Read + Seek`.
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek + ?Sized> ReadSeek for T {}

/// Decodes one output stream of a coding description.
pub trait StreamDecoder {
    fn decode_stream(
        &self,
        archive:      &mut dyn ReadSeek,
        coding:       &EncodedHeader,
        output_index: usize,
    ) -> Result<Vec<u8>, CodecError>;
}

/// Built-in decoder backed by the codec registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct FolderDecoder;

impl StreamDecoder for FolderDecoder {
    fn decode_stream(
        &self,
        archive:      &mut dyn ReadSeek,
        coding:       &EncodedHeader,
        output_index: usize,
    ) -> Result<Vec<u8>, CodecError> {
        let folder = coding.folders.get(output_index).ok_or_else(|| {
            CodecError::Decompression(format!(
                "coding description has no output stream {output_index} ({} folder(s))",
                coding.folders.len()
            ))
        })?;
        decode_folder(archive, folder)
    }
}

/// Read `folder`'s packed bytes and run its coder chain backwards.
///
/// The unpacked size is always checked.  The CRC is checked when the
/// folder records one.
pub fn decode_folder<R: Read + Seek + ?Sized>(archive: &mut R, folder: &Folder) -> Result<Vec<u8>, CodecError> {
    let start = (SIGNATURE_HEADER_SIZE as u64)
        .checked_add(folder.pack_pos)
        .ok_or_else(|| CodecError::Decompression(format!("pack position {} out of range", folder.pack_pos)))?;
    archive.seek(SeekFrom::Start(start))?;

    let mut data = Vec::new();
    (&mut *archive).take(folder.pack_size).read_to_end(&mut data)?;
    if (data.len() as u64) < folder.pack_size {
        return Err(CodecError::Truncated {
            expected: folder.pack_size,
            actual:   data.len() as u64,
        });
    }

    let last = folder.coders.len().saturating_sub(1);
    for (stage, coder) in folder.coders.iter().rev().enumerate() {
        let limit = if stage == last { folder.unpack_size } else { packed_bound(folder.unpack_size) };
        data = get_codec_by_method(coder.method)?.decompress(&data, limit)?;
    }

    if data.len() as u64 != folder.unpack_size {
        return Err(CodecError::SizeMismatch {
            expected: folder.unpack_size,
            actual:   data.len() as u64,
        });
    }
    if let Some(expected) = folder.unpack_crc {
        let actual = checksum(&data);
        if actual != expected {
            return Err(CodecError::ChecksumMismatch { expected, actual });
        }
    }
    Ok(data)
}

/// Upper bound on an intermediate stage of a chain, which holds the packed
/// form of at most `unpack_size` bytes.
fn packed_bound(unpack_size: u64) -> u64 {
    unpack_size.saturating_add(unpack_size / 64).saturating_add(64 * 1024)
}
