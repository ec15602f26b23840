pub mod error;
pub mod checksum;
pub mod signature;
pub mod locator;
pub mod codec;
pub mod index;
pub mod decoder;
pub mod observer;
pub mod header;
pub mod archive;
pub mod extract;
pub mod compress;

pub use archive::{Archive, ArchiveState, PackOptions};
pub use codec::{CodecId, get_codec};
pub use error::{ArchiveError, ChecksumField, Result};
pub use header::{HeaderResolver, MetadataParser, ParsedHeader, StandardParser};
pub use index::{ArchiveIndex, EncodedHeader, EntryRecord, Folder};
pub use signature::{Locator, SignatureHeader};
