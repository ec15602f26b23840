//! Header resolution.
//!
//! A verified blob is either the archive index itself or an encoded header:
//! a coding description whose output stream 0, decoded from the archive's
//! own data region, is another blob.  [`HeaderResolver`] parses, decodes
//! and re-parses in a bounded loop until it holds an [`ArchiveIndex`].
//!
//! ```text
//! blob ──parse──► Structured(index) ─────────────────────────► index
//!            └──► Encoded(coding) ──decode(archive, coding, 0)──► blob'  (repeat, at most max_depth times)
//! ```

use crate::decoder::{FolderDecoder, ReadSeek, StreamDecoder};
use crate::error::{ArchiveError, Result};
use crate::index::{ArchiveIndex, EncodedHeader, PROPERTY_ENCODED_HEADER, PROPERTY_HEADER};
use crate::observer::{LogObserver, ParseEvent, ParseObserver};

/// Number of decode passes allowed by default.  Writers in this crate never
/// nest an encoded header inside another.
pub const DEFAULT_MAX_HEADER_DEPTH: usize = 1;

/// Result of parsing one blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedHeader {
    Structured(ArchiveIndex),
    Encoded(EncodedHeader),
}

/// Turns a header blob into a [`ParsedHeader`].
pub trait MetadataParser {
    fn parse(&self, blob: &[u8]) -> Result<ParsedHeader>;
}

/// Marker byte + JSON body, see [`crate::index`].
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardParser;

impl MetadataParser for StandardParser {
    fn parse(&self, blob: &[u8]) -> Result<ParsedHeader> {
        let (&marker, body) = blob
            .split_first()
            .ok_or_else(|| ArchiveError::format("empty header blob"))?;
        match marker {
            PROPERTY_HEADER => serde_json::from_slice(body)
                .map(ParsedHeader::Structured)
                .map_err(|e| ArchiveError::format(format!("header: {e}"))),
            PROPERTY_ENCODED_HEADER => serde_json::from_slice(body)
                .map(ParsedHeader::Encoded)
                .map_err(|e| ArchiveError::format(format!("encoded header: {e}"))),
            other => Err(ArchiveError::format(format!("unknown header property 0x{other:02x}"))),
        }
    }
}

pub struct HeaderResolver {
    parser:    Box<dyn MetadataParser>,
    decoder:   Box<dyn StreamDecoder>,
    observer:  Box<dyn ParseObserver>,
    max_depth: usize,
}

impl Default for HeaderResolver {
    fn default() -> Self {
        Self {
            parser:    Box::new(StandardParser),
            decoder:   Box::new(FolderDecoder),
            observer:  Box::new(LogObserver),
            max_depth: DEFAULT_MAX_HEADER_DEPTH,
        }
    }
}

impl HeaderResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parser(mut self, parser: impl MetadataParser + 'static) -> Self {
        self.parser = Box::new(parser);
        self
    }

    pub fn with_decoder(mut self, decoder: impl StreamDecoder + 'static) -> Self {
        self.decoder = Box::new(decoder);
        self
    }

    pub fn with_observer(mut self, observer: impl ParseObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// Maximum number of decode passes before giving up with
    /// [`ArchiveError::Unsupported`].
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub(crate) fn notify(&self, event: ParseEvent) {
        self.observer.on_event(&event);
    }

    /// Resolve a verified blob into the archive index.
    ///
    /// `archive` is the archive stream itself; encoded headers reference
    /// packed ranges inside it.  Its position is unspecified afterwards.
    pub fn resolve(&self, archive: &mut dyn ReadSeek, blob: &[u8]) -> Result<ArchiveIndex> {
        let mut parsed = self.parse(blob)?;
        let mut pass = 0;
        loop {
            let coding = match parsed {
                ParsedHeader::Structured(index) => {
                    self.notify(ParseEvent::Resolved {
                        folders: index.folders.len(),
                        entries: index.entries.len(),
                    });
                    return Ok(index);
                }
                ParsedHeader::Encoded(coding) => coding,
            };
            if pass == self.max_depth {
                return Err(ArchiveError::Unsupported(format!(
                    "header still encoded after {pass} decode pass(es)"
                )));
            }
            pass += 1;

            let decoded = self.decoder.decode_stream(archive, &coding, 0)?;
            self.notify(ParseEvent::HeaderDecoded { pass, len: decoded.len() });
            parsed = self.parse(&decoded)?;
        }
    }

    fn parse(&self, blob: &[u8]) -> Result<ParsedHeader> {
        let parsed = self.parser.parse(blob)?;
        self.notify(ParseEvent::HeaderParsed {
            encoded: matches!(parsed, ParsedHeader::Encoded(_)),
        });
        Ok(parsed)
    }
}
