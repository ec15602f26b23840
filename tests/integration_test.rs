use szar::archive::{Archive, ArchiveState, PackOptions};
use szar::checksum::checksum;
use szar::codec::{get_codec, CodecError, CodecId};
use szar::decoder::{decode_folder, FolderDecoder, ReadSeek, StreamDecoder};
use szar::header::{HeaderResolver, MetadataParser, ParsedHeader, StandardParser};
use szar::index::{Coder, EncodedHeader, Folder};
use szar::locator::locate;
use szar::observer::{ParseEvent, ParseObserver};
use szar::signature::{Locator, SignatureHeader, SIGNATURE, SIGNATURE_HEADER_SIZE};
use szar::{ArchiveError, ChecksumField};
use std::cell::RefCell;
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::rc::Rc;
use tempfile::{tempdir, NamedTempFile};

fn build(options: PackOptions, files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut ar = Archive::new(Cursor::new(Vec::<u8>::new()));
    ar.create(options).unwrap();
    {
        let mut pack = ar.compressor().unwrap();
        for (name, data) in files {
            pack.add_file(name, data).unwrap();
        }
        pack.finalize().unwrap();
    }
    ar.close().unwrap().into_inner()
}

fn sample_files() -> Vec<(&'static str, &'static [u8])> {
    vec![
        ("alpha.txt", &b"Alpha file contents"[..]),
        ("beta.bin",  &b"Beta file contents with different data"[..]),
        ("gamma.txt", &b"Gamma file contents here"[..]),
    ]
}

fn open_bytes(bytes: Vec<u8>) -> (Archive<Cursor<Vec<u8>>>, Result<(), ArchiveError>) {
    let mut ar = Archive::new(Cursor::new(bytes));
    let res = ar.open();
    (ar, res)
}

#[test]
fn test_pack_unpack_roundtrip_on_disk() {
    let temp_file = NamedTempFile::new().unwrap();
    let archive_path = temp_file.path().to_path_buf();
    let files = sample_files();

    {
        let mut ar = Archive::create_path(&archive_path, PackOptions::default()).unwrap();
        let mut pack = ar.compressor().unwrap();
        for (name, data) in &files {
            pack.add_file(name, data).unwrap();
        }
        pack.finalize().unwrap();
    }

    let mut ar = Archive::open_path(&archive_path).unwrap();
    assert!(ar.is_valid());
    assert_eq!(ar.entries().len(), 3);
    let mut ex = ar.extractor().unwrap();
    for (name, data) in &files {
        assert_eq!(ex.read_file(name).unwrap(), *data);
    }
    assert_eq!(ex.test().unwrap(), 3);
}

#[test]
fn test_every_codec_and_header_codec() {
    for codec in CodecId::ALL {
        for header_codec in [None, Some(codec)] {
            let options = PackOptions { default_codec: codec, header_codec, ..PackOptions::default() };
            let (mut ar, res) = open_bytes(build(options, &sample_files()));
            res.unwrap_or_else(|e| panic!("{} / {:?}: {e}", codec.name(), header_codec));
            assert_eq!(ar.extractor().unwrap().read_file("beta.bin").unwrap(), b"Beta file contents with different data");
        }
    }
}

#[test]
fn test_empty_archive_is_valid() {
    let (ar, res) = open_bytes(build(PackOptions::default(), &[]));
    res.unwrap();
    assert!(ar.is_valid());
    assert!(ar.index().unwrap().is_empty());
}

#[test]
fn test_extract_all_to_directory() {
    let dir = tempdir().unwrap();
    let (mut ar, res) = open_bytes(build(PackOptions::default(), &sample_files()));
    res.unwrap();
    ar.extractor().unwrap().extract_all(dir.path()).unwrap();
    for (name, data) in sample_files() {
        assert_eq!(std::fs::read(dir.path().join(name)).unwrap(), data);
    }
}

#[test]
fn test_create_writes_zeroed_locator() {
    let temp_file = NamedTempFile::new().unwrap();
    let mut ar = Archive::create_path(temp_file.path(), PackOptions::default()).unwrap();
    assert_eq!(ar.state(), ArchiveState::HeaderPending);
    drop(ar.close());

    let mut first = [0u8; SIGNATURE_HEADER_SIZE];
    File::open(temp_file.path()).unwrap().read_exact(&mut first).unwrap();
    assert_eq!(&first[0..6], &SIGNATURE);
    assert_eq!(&first[6..8], &[0, 2]);
    assert_eq!(&first[12..32], &[0u8; 20]);
}

#[test]
fn test_bad_magic_fails_before_checksums() {
    let mut bytes = build(PackOptions::default(), &sample_files());
    bytes[0..6].copy_from_slice(b"PK\x03\x04\x00\x00");
    // Break the locator too: the magic must be reported first.
    bytes[20] ^= 0xFF;
    let (ar, res) = open_bytes(bytes);
    assert!(matches!(res, Err(ArchiveError::Format(_))));
    assert!(!ar.is_valid());
}

#[test]
fn test_locator_and_blob_errors_are_distinct() {
    let bytes = build(PackOptions::default(), &sample_files());
    let sb = SignatureHeader::read(&bytes[..]).unwrap();

    let mut locator_broken = bytes.clone();
    locator_broken[12] ^= 0x01;
    let (ar, res) = open_bytes(locator_broken);
    assert!(res.unwrap_err().is_integrity(ChecksumField::Locator));
    assert_eq!(ar.state(), ArchiveState::Invalid);

    let mut blob_broken = bytes;
    let blob_start = SIGNATURE_HEADER_SIZE + sb.locator.blob_offset as usize;
    blob_broken[blob_start] ^= 0x80;
    let (ar, res) = open_bytes(blob_broken);
    assert!(res.unwrap_err().is_integrity(ChecksumField::Blob));
    assert!(ar.index().is_none());
}

#[test]
fn test_truncated_blob() {
    let mut bytes = build(PackOptions::default(), &sample_files());
    bytes.truncate(bytes.len() - 1);
    let (ar, res) = open_bytes(bytes);
    assert!(matches!(res, Err(ArchiveError::Truncated { .. })));
    assert!(!ar.is_valid());
}

#[test]
fn test_short_signature_is_format_error() {
    let (_, res) = open_bytes(SIGNATURE.to_vec());
    assert!(matches!(res, Err(ArchiveError::Format(_))));
}

#[test]
fn test_corrupt_packed_header_is_codec_error() {
    let bytes = build(PackOptions::default(), &sample_files());
    let sb = SignatureHeader::read(&bytes[..]).unwrap();
    let mut cur = Cursor::new(bytes.clone());
    cur.seek(SeekFrom::Start(SIGNATURE_HEADER_SIZE as u64)).unwrap();
    let blob = locate(&mut cur, &sb).unwrap();
    let coding = match StandardParser.parse(&blob).unwrap() {
        ParsedHeader::Encoded(coding) => coding,
        other => panic!("expected encoded header, got {other:?}"),
    };

    // The blob still verifies; the packed header it points at does not.
    let mut bytes = bytes;
    // Skip the 13-byte LZMA properties header and hit the range-coded body.
    let folder = &coding.folders[0];
    let packed_start = SIGNATURE_HEADER_SIZE + folder.pack_pos as usize;
    bytes[packed_start + 13 + (folder.pack_size as usize - 13) / 2] ^= 0xFF;
    let (ar, res) = open_bytes(bytes);
    assert!(matches!(res, Err(ArchiveError::Codec(_))), "{res:?}");
    assert!(!ar.is_valid());
}

#[test]
fn test_encoded_header_cannot_inflate_past_declared_size() {
    // 16 MiB of zeros packs into a few hundred bytes; the folder claims 16.
    let packed = get_codec(CodecId::Zstd).compress(&vec![0u8; 16 << 20], 3).unwrap();
    let coding = EncodedHeader {
        folders: vec![Folder {
            coders:      vec![Coder::from(CodecId::Zstd)],
            pack_pos:    0,
            pack_size:   packed.len() as u64,
            unpack_size: 16,
            unpack_crc:  None,
        }],
    };
    let blob = coding.to_bytes().unwrap();
    let sb = SignatureHeader::with_locator(Locator {
        blob_offset: packed.len() as u64,
        blob_size:   blob.len() as u64,
        blob_crc:    checksum(&blob),
    });
    let mut bytes = sb.to_bytes().to_vec();
    bytes.extend_from_slice(&packed);
    bytes.extend_from_slice(&blob);

    let (ar, res) = open_bytes(bytes);
    match res {
        Err(ArchiveError::Codec(CodecError::SizeMismatch { expected: 16, actual: 17 })) => {}
        other => panic!("expected a bounded size mismatch, got {other:?}"),
    }
    assert_eq!(ar.state(), ArchiveState::Invalid);
}

/// Wraps the real decoder and records every call.
#[derive(Clone, Default)]
struct CountingDecoder {
    calls: Rc<RefCell<Vec<usize>>>,
}

impl StreamDecoder for CountingDecoder {
    fn decode_stream(
        &self,
        archive: &mut dyn ReadSeek,
        coding: &EncodedHeader,
        output_index: usize,
    ) -> Result<Vec<u8>, CodecError> {
        self.calls.borrow_mut().push(output_index);
        FolderDecoder.decode_stream(archive, coding, output_index)
    }
}

#[test]
fn test_encoded_header_decoded_once_and_matches_out_of_band() {
    let bytes = build(PackOptions::default(), &sample_files());

    let decoder = CountingDecoder::default();
    let resolver = HeaderResolver::new().with_decoder(decoder.clone());
    let mut ar = Archive::new(Cursor::new(bytes.clone()));
    ar.open_with(&resolver).unwrap();
    assert_eq!(*decoder.calls.borrow(), vec![0]);

    // Out of band: locate, parse, decode folder 0, parse again.
    let mut cur = Cursor::new(bytes);
    let sb = SignatureHeader::read(&mut cur).unwrap();
    let blob = locate(&mut cur, &sb).unwrap();
    let coding = match StandardParser.parse(&blob).unwrap() {
        ParsedHeader::Encoded(coding) => coding,
        other => panic!("expected encoded header, got {other:?}"),
    };
    let decoded = decode_folder(&mut cur, &coding.folders[0]).unwrap();
    let expected = match StandardParser.parse(&decoded).unwrap() {
        ParsedHeader::Structured(index) => index,
        other => panic!("expected structured header, got {other:?}"),
    };
    assert_eq!(ar.index(), Some(&expected));
}

#[test]
fn test_resolving_same_blob_twice_is_identical() {
    let bytes = build(PackOptions::default(), &sample_files());
    let mut cur = Cursor::new(bytes);
    let sb = SignatureHeader::read(&mut cur).unwrap();
    let blob = locate(&mut cur, &sb).unwrap();

    let resolver = HeaderResolver::new();
    let a = resolver.resolve(&mut cur, &blob).unwrap();
    let b = resolver.resolve(&mut cur, &blob).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.to_bytes().unwrap(), b.to_bytes().unwrap());
}

#[derive(Clone, Default)]
struct Recorder {
    events: Rc<RefCell<Vec<ParseEvent>>>,
}

impl ParseObserver for Recorder {
    fn on_event(&self, event: &ParseEvent) {
        self.events.borrow_mut().push(*event);
    }
}

#[test]
fn test_observer_sees_bootstrap_in_order() {
    let bytes = build(PackOptions::default(), &sample_files());
    let recorder = Recorder::default();
    let mut ar = Archive::new(Cursor::new(bytes));
    ar.open_with(&HeaderResolver::new().with_observer(recorder.clone())).unwrap();

    let events = recorder.events.borrow();
    assert!(matches!(events[0], ParseEvent::SignatureRead { major: 0, minor: 2 }));
    assert!(matches!(events[1], ParseEvent::LocatorVerified { .. }));
    assert!(matches!(events[2], ParseEvent::BlobRead { .. }));
    assert!(matches!(events[3], ParseEvent::HeaderParsed { encoded: true }));
    assert!(matches!(events[4], ParseEvent::HeaderDecoded { pass: 1, .. }));
    assert!(matches!(events[5], ParseEvent::HeaderParsed { encoded: false }));
    assert!(matches!(events[6], ParseEvent::Resolved { folders: 3, entries: 3 }));
}

#[test]
fn test_observer_sees_locator_gate_before_blob_failure() {
    let mut bytes = build(PackOptions::default(), &sample_files());
    let sb = SignatureHeader::read(&bytes[..]).unwrap();
    bytes[SIGNATURE_HEADER_SIZE + sb.locator.blob_offset as usize] ^= 0x01;

    let recorder = Recorder::default();
    let mut ar = Archive::new(Cursor::new(bytes));
    let err = ar.open_with(&HeaderResolver::new().with_observer(recorder.clone())).unwrap_err();
    assert!(err.is_integrity(ChecksumField::Blob), "{err}");

    let events = recorder.events.borrow();
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], ParseEvent::SignatureRead { .. }));
    assert!(matches!(events[1], ParseEvent::LocatorVerified { blob_offset, .. } if blob_offset == sb.locator.blob_offset));
}
