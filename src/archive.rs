//! High-level [`Archive`] handle: the primary embedding surface.
//!
//! ```no_run
//! use szar::archive::{Archive, PackOptions};
//!
//! // Write
//! let mut ar = Archive::create_path("out.szar", PackOptions::default())?;
//! let mut pack = ar.compressor()?;
//! pack.add_file("readme.txt", b"Hello, world!")?;
//! pack.finalize()?;
//!
//! // Read
//! let mut ar = Archive::open_path("out.szar")?;
//! let data = ar.extractor()?.read_file("readme.txt")?;
//! assert_eq!(data, b"Hello, world!");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Lifecycle
//!
//! ```text
//! read:   Unopened ──open──► Valid          (any failure ──► Invalid)
//! write:  Unopened ──create──► HeaderPending ──finalize──► Finalized
//! both:   ──close──► Closed
//! ```
//!
//! `is_valid()` only turns `true` once the signature, the locator, the
//! header blob and, if it is encoded, its decoded form have all been
//! checked and parsed.  A failed open never keeps a partial header.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::codec::CodecId;
use crate::compress::{Compressor, WriteSession};
use crate::error::{ArchiveError, Result};
use crate::extract::Extractor;
use crate::header::HeaderResolver;
use crate::index::{ArchiveIndex, EntryRecord};
use crate::locator::{read_blob, verify_locator};
use crate::observer::ParseEvent;
use crate::signature::SignatureHeader;

/// Default Zstd compression level.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

// ── PackOptions ───────────────────────────────────────────────────────────────

/// Configuration for [`Archive::create`].
#[derive(Debug, Clone)]
pub struct PackOptions {
    pub default_codec: CodecId,
    pub level:         i32,
    /// When set, the header blob is itself packed into the data region with
    /// this codec and replaced by an encoded header.
    pub header_codec:  Option<CodecId>,
    pub header_level:  i32,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            default_codec: CodecId::Zstd,
            level:         DEFAULT_COMPRESSION_LEVEL,
            header_codec:  Some(CodecId::Lzma),
            header_level:  DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

// ── State ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveState {
    Unopened,
    /// Read mode, header resolved.
    Valid,
    /// Write mode, locator not yet written.
    HeaderPending,
    /// Write mode, locator and header blob written.
    Finalized,
    Invalid,
    Closed,
}

enum HeaderState {
    None,
    Resolved(ArchiveIndex),
    Pending(WriteSession),
}

// ── Archive ───────────────────────────────────────────────────────────────────

pub struct Archive<S> {
    stream:    Option<S>,
    state:     ArchiveState,
    signature: Option<SignatureHeader>,
    header:    HeaderState,
}

impl<S> Archive<S> {
    /// Take ownership of `stream`.  Nothing is read or written until
    /// [`open`](Self::open) or [`create`](Self::create).
    pub fn new(stream: S) -> Self {
        Self {
            stream:    Some(stream),
            state:     ArchiveState::Unopened,
            signature: None,
            header:    HeaderState::None,
        }
    }

    pub fn state(&self) -> ArchiveState {
        self.state
    }

    pub fn is_valid(&self) -> bool {
        self.state == ArchiveState::Valid
    }

    pub fn signature_header(&self) -> Option<&SignatureHeader> {
        self.signature.as_ref()
    }

    /// The resolved index.  `None` unless the archive was opened successfully.
    pub fn index(&self) -> Option<&ArchiveIndex> {
        match &self.header {
            HeaderState::Resolved(index) => Some(index),
            _ => None,
        }
    }

    /// Entries of the resolved index, or those added so far in write mode.
    pub fn entries(&self) -> &[EntryRecord] {
        match &self.header {
            HeaderState::Resolved(index)   => &index.entries,
            HeaderState::Pending(session)  => &session.pending.entries,
            HeaderState::None              => &[],
        }
    }

    /// Release the stream.  A second call returns `None` and changes nothing.
    pub fn close(&mut self) -> Option<S> {
        let stream = self.stream.take()?;
        self.state = ArchiveState::Closed;
        self.header = HeaderState::None;
        Some(stream)
    }

    fn require(&self, state: ArchiveState, msg: &'static str) -> Result<()> {
        if self.state != state {
            return Err(ArchiveError::Mode(msg));
        }
        Ok(())
    }
}

impl<S: Read + Seek> Archive<S> {
    pub fn open(&mut self) -> Result<()> {
        self.open_with(&HeaderResolver::default())
    }

    /// Open with a caller-supplied parser, decoder, observer or depth limit.
    pub fn open_with(&mut self, resolver: &HeaderResolver) -> Result<()> {
        self.require(ArchiveState::Unopened, "not in the unopened state")?;
        match self.load(resolver) {
            Ok((signature, index)) => {
                self.signature = Some(signature);
                self.header = HeaderState::Resolved(index);
                self.state = ArchiveState::Valid;
                Ok(())
            }
            Err(e) => {
                self.state = ArchiveState::Invalid;
                Err(e)
            }
        }
    }

    fn load(&mut self, resolver: &HeaderResolver) -> Result<(SignatureHeader, ArchiveIndex)> {
        let stream = self.stream.as_mut().ok_or(ArchiveError::Mode("closed"))?;
        stream.seek(SeekFrom::Start(0))?;

        let signature = SignatureHeader::read(&mut *stream)?;
        resolver.notify(ParseEvent::SignatureRead {
            major: signature.version_major,
            minor: signature.version_minor,
        });

        verify_locator(&signature)?;
        resolver.notify(ParseEvent::LocatorVerified {
            blob_offset: signature.locator.blob_offset,
            blob_size:   signature.locator.blob_size,
        });

        let blob = read_blob(stream, &signature)?;
        resolver.notify(ParseEvent::BlobRead { len: blob.len() });

        let index = resolver.resolve(stream, &blob)?;
        Ok((signature, index))
    }

    /// Reader over the resolved index.  Requires a valid archive.
    pub fn extractor(&mut self) -> Result<Extractor<'_, S>> {
        self.require(ArchiveState::Valid, "not open for reading")?;
        match (&mut self.stream, &self.header) {
            (Some(stream), HeaderState::Resolved(index)) => Ok(Extractor::new(stream, index)),
            _ => Err(ArchiveError::Mode("not open for reading")),
        }
    }
}

impl<S: Write + Seek> Archive<S> {
    /// Write a signature header with a zeroed locator and start an empty
    /// write-mode header.
    pub fn create(&mut self, options: PackOptions) -> Result<()> {
        self.require(ArchiveState::Unopened, "not in the unopened state")?;
        let stream = self.stream.as_mut().ok_or(ArchiveError::Mode("closed"))?;

        let signature = SignatureHeader::pending();
        let written = stream
            .seek(SeekFrom::Start(0))
            .and_then(|_| signature.write(&mut *stream));
        if let Err(e) = written {
            self.state = ArchiveState::Invalid;
            return Err(e.into());
        }

        self.signature = Some(signature);
        self.header = HeaderState::Pending(WriteSession::new(options));
        self.state = ArchiveState::HeaderPending;
        Ok(())
    }

    /// Writer that adds entries and finalizes the header.  Requires a
    /// created, not yet finalized archive.
    pub fn compressor(&mut self) -> Result<Compressor<'_, S>> {
        self.require(ArchiveState::HeaderPending, "not open for writing")?;
        match (&mut self.stream, &mut self.header) {
            (Some(stream), HeaderState::Pending(session)) => Ok(Compressor::new(
                stream,
                session,
                &mut self.signature,
                &mut self.state,
            )),
            _ => Err(ArchiveError::Mode("not open for writing")),
        }
    }
}

impl Archive<File> {
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut ar = Archive::new(File::open(path)?);
        ar.open()?;
        Ok(ar)
    }

    pub fn create_path<P: AsRef<Path>>(path: P, options: PackOptions) -> Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let mut ar = Archive::new(file);
        ar.create(options)?;
        Ok(ar)
    }
}
