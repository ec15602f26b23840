//! Archive metadata.
//!
//! A header blob is one property marker byte followed by a JSON body:
//!
//! | marker | body |
//! |--------|------|
//! | `0x01` | [`ArchiveIndex`] |
//! | `0x17` | [`EncodedHeader`] |
//!
//! [`ArchiveIndex`] is the read-only resolved index.  [`PendingHeader`] is
//! the write-side accumulator a compressor fills in before it is frozen into
//! an index on finalize.

use serde::{Deserialize, Serialize};

use crate::codec::CodecId;

pub const PROPERTY_HEADER:         u8 = 0x01;
pub const PROPERTY_ENCODED_HEADER: u8 = 0x17;

/// One stage of a folder's coder chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coder {
    pub method: u32,
}

impl From<CodecId> for Coder {
    fn from(id: CodecId) -> Self {
        Coder { method: id.method_id() }
    }
}

/// A packed range of the data region plus the coder chain that unpacks it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    /// Coders in the order they were applied when writing.
    pub coders:      Vec<Coder>,
    /// Offset of the packed bytes, counted from the end of the signature header.
    pub pack_pos:    u64,
    pub pack_size:   u64,
    pub unpack_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unpack_crc:  Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub name:   String,
    /// `None` for empty entries, which own no packed bytes.
    #[serde(default)]
    pub folder: Option<usize>,
    /// Start of this entry inside its folder's unpacked output.
    #[serde(default)]
    pub offset: u64,
    pub size:   u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crc:    Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArchiveIndex {
    #[serde(default)]
    pub folders: Vec<Folder>,
    #[serde(default)]
    pub entries: Vec<EntryRecord>,
}

impl ArchiveIndex {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        with_marker(PROPERTY_HEADER, self)
    }
}

/// Coding description of a compressed header.  Output stream 0 decodes to
/// another header blob.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EncodedHeader {
    pub folders: Vec<Folder>,
}

impl EncodedHeader {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        with_marker(PROPERTY_ENCODED_HEADER, self)
    }
}

fn with_marker<T: Serialize>(marker: u8, body: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut out = vec![marker];
    serde_json::to_writer(&mut out, body)?;
    Ok(out)
}

// ── Write side ────────────────────────────────────────────────────────────────

/// Header under construction.  Tracks where the next packed stream goes.
#[derive(Debug, Clone, Default)]
pub struct PendingHeader {
    pub folders:       Vec<Folder>,
    pub entries:       Vec<EntryRecord>,
    /// Next free offset in the data region, relative to the end of the
    /// signature header.
    pub next_pack_pos: u64,
}

impl PendingHeader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `pack_size` bytes of the data region; returns their position.
    pub fn alloc_pack(&mut self, pack_size: u64) -> u64 {
        let pos = self.next_pack_pos;
        self.next_pack_pos += pack_size;
        pos
    }

    /// Returns the new folder's index.
    pub fn push_folder(&mut self, folder: Folder) -> usize {
        self.folders.push(folder);
        self.folders.len() - 1
    }

    pub fn to_index(&self) -> ArchiveIndex {
        ArchiveIndex {
            folders: self.folders.clone(),
            entries: self.entries.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blobs_carry_their_marker() {
        let idx = ArchiveIndex::default().to_bytes().unwrap();
        assert_eq!(idx[0], PROPERTY_HEADER);
        let enc = EncodedHeader::default().to_bytes().unwrap();
        assert_eq!(enc[0], PROPERTY_ENCODED_HEADER);
    }

    #[test]
    fn pending_header_advances_pack_pos() {
        let mut pending = PendingHeader::new();
        assert_eq!(pending.alloc_pack(10), 0);
        assert_eq!(pending.alloc_pack(5), 10);
        assert_eq!(pending.next_pack_pos, 15);

        let folder = Folder {
            coders:      vec![CodecId::Zstd.into()],
            pack_pos:    10,
            pack_size:   5,
            unpack_size: 40,
            unpack_crc:  None,
        };
        assert_eq!(pending.push_folder(folder.clone()), 0);
        assert_eq!(pending.to_index().folders, vec![folder]);
    }

    #[test]
    fn optional_fields_default_when_absent() {
        let body = br#"{"entries":[{"name":"empty.txt","size":0}]}"#;
        let idx: ArchiveIndex = serde_json::from_slice(body).unwrap();
        assert!(idx.folders.is_empty());
        assert_eq!(idx.entries[0].folder, None);
        assert_eq!(idx.entries[0].crc, None);
        assert_eq!(idx.find("empty.txt"), Some(0));
    }
}
