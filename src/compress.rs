//! Writing entries into a created archive.
//!
//! Packed streams are appended to the data region one folder at a time.
//! On [`Compressor::finalize`] the index is serialized, optionally packed
//! into the data region itself (leaving only a small encoded header behind),
//! and the signature header at offset 0 is rewritten with the real locator.
//!
//! ```text
//! 0        32                                  32+blob_offset
//! │ sig hdr │ folder 0 │ folder 1 │ … │ [hdr folder] │ header blob │
//! ```

use std::io::{Seek, SeekFrom, Write};

use crate::archive::{ArchiveState, PackOptions};
use crate::checksum::checksum;
use crate::codec::{get_codec, CodecId};
use crate::error::{ArchiveError, Result};
use crate::index::{EncodedHeader, EntryRecord, Folder, PendingHeader};
use crate::signature::{Locator, SignatureHeader, SIGNATURE_HEADER_SIZE};

/// Write-mode header state owned by the archive between compressor calls.
#[derive(Debug)]
pub struct WriteSession {
    pub pending: PendingHeader,
    options:     PackOptions,
    solid:       Option<SolidSession>,
}

/// Files accumulated into one shared folder.
#[derive(Debug)]
struct SolidSession {
    codec:   CodecId,
    buffer:  Vec<u8>,
    /// Indices into `pending.entries` whose folder is set on flush.
    members: Vec<usize>,
}

impl WriteSession {
    pub(crate) fn new(options: PackOptions) -> Self {
        Self { pending: PendingHeader::new(), options, solid: None }
    }

    pub fn options(&self) -> &PackOptions {
        &self.options
    }
}

pub struct Compressor<'a, S: Write + Seek> {
    stream:    &'a mut S,
    session:   &'a mut WriteSession,
    signature: &'a mut Option<SignatureHeader>,
    state:     &'a mut ArchiveState,
}

impl<'a, S: Write + Seek> Compressor<'a, S> {
    pub(crate) fn new(
        stream:    &'a mut S,
        session:   &'a mut WriteSession,
        signature: &'a mut Option<SignatureHeader>,
        state:     &'a mut ArchiveState,
    ) -> Self {
        Self { stream, session, signature, state }
    }

    pub fn add_file(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let codec = self.session.options.default_codec;
        self.add_file_with_codec(name, data, codec)
    }

    /// In a solid session `codec` is ignored; the session's codec applies.
    pub fn add_file_with_codec(&mut self, name: &str, data: &[u8], codec: CodecId) -> Result<()> {
        self.require_pending()?;
        let entry_idx = self.session.pending.entries.len();
        let mut entry = EntryRecord {
            name:   name.to_owned(),
            folder: None,
            offset: 0,
            size:   data.len() as u64,
            crc:    Some(checksum(data)),
        };

        if let Some(solid) = self.session.solid.as_mut() {
            entry.offset = solid.buffer.len() as u64;
            solid.buffer.extend_from_slice(data);
            solid.members.push(entry_idx);
        } else if !data.is_empty() {
            let level = self.session.options.level;
            let folder = self.pack(data, codec, level)?;
            entry.folder = Some(self.session.pending.push_folder(folder));
        }

        self.session.pending.entries.push(entry);
        Ok(())
    }

    /// Start accumulating files into one folder.  Flushes any open session.
    pub fn begin_solid(&mut self, codec: CodecId) -> Result<()> {
        self.end_solid()?;
        self.session.solid = Some(SolidSession { codec, buffer: Vec::new(), members: Vec::new() });
        Ok(())
    }

    /// Pack the solid buffer as a single folder and point its members at it.
    pub fn end_solid(&mut self) -> Result<()> {
        let solid = match self.session.solid.take() {
            Some(s) => s,
            None    => return Ok(()),
        };
        if solid.buffer.is_empty() {
            return Ok(());
        }
        let level = self.session.options.level;
        let folder = self.pack(&solid.buffer, solid.codec, level)?;
        let folder = self.session.pending.push_folder(folder);
        for idx in solid.members {
            self.session.pending.entries[idx].folder = Some(folder);
        }
        Ok(())
    }

    /// Write the header blob and patch the locator.  Must be called once.
    pub fn finalize(&mut self) -> Result<()> {
        self.require_pending()?;
        match self.write_header() {
            Ok(signature) => {
                *self.signature = Some(signature);
                *self.state = ArchiveState::Finalized;
                Ok(())
            }
            Err(e) => {
                *self.state = ArchiveState::Invalid;
                Err(e)
            }
        }
    }

    fn write_header(&mut self) -> Result<SignatureHeader> {
        self.end_solid()?;

        let index_blob = self.session.pending.to_index().to_bytes()
            .map_err(|e| ArchiveError::format(format!("serialize header: {e}")))?;

        let blob = match self.session.options.header_codec {
            Some(codec) => {
                let level = self.session.options.header_level;
                let folder = self.pack(&index_blob, codec, level)?;
                EncodedHeader { folders: vec![folder] }.to_bytes()
                    .map_err(|e| ArchiveError::format(format!("serialize encoded header: {e}")))?
            }
            None => index_blob,
        };

        let blob_offset = self.session.pending.alloc_pack(blob.len() as u64);
        self.seek_data(blob_offset)?;
        self.stream.write_all(&blob)?;

        let signature = SignatureHeader::with_locator(Locator {
            blob_offset,
            blob_size: blob.len() as u64,
            blob_crc:  checksum(&blob),
        });
        self.stream.seek(SeekFrom::Start(0))?;
        signature.write(&mut *self.stream)?;
        self.stream.flush()?;
        Ok(signature)
    }

    /// Compress `data` into the next free range of the data region.
    fn pack(&mut self, data: &[u8], codec: CodecId, level: i32) -> Result<Folder> {
        let packed = get_codec(codec).compress(data, level)?;
        let pack_pos = self.session.pending.alloc_pack(packed.len() as u64);
        self.seek_data(pack_pos)?;
        self.stream.write_all(&packed)?;
        Ok(Folder {
            coders:      vec![codec.into()],
            pack_pos,
            pack_size:   packed.len() as u64,
            unpack_size: data.len() as u64,
            unpack_crc:  Some(checksum(data)),
        })
    }

    fn seek_data(&mut self, pos: u64) -> Result<()> {
        self.stream.seek(SeekFrom::Start(SIGNATURE_HEADER_SIZE as u64 + pos))?;
        Ok(())
    }

    fn require_pending(&self) -> Result<()> {
        if *self.state != ArchiveState::HeaderPending {
            return Err(ArchiveError::Mode("not open for writing"));
        }
        Ok(())
    }
}
