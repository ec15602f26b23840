//! Coder registry keyed by on-disk method id.
//!
//! # Identity rules
//! Every coder in a folder's chain is recorded by its numeric method id.
//! The id is the only identity written to disk; names exist for the CLI and
//! diagnostics.  A reader that does not recognise a method id MUST fail
//! immediately, there is no fallback to another coder.

use std::io::{self, Read, Write};
use thiserror::Error;

// ── Frozen method ids ────────────────────────────────────────────────────────

/// Stored verbatim.
pub const METHOD_COPY:   u32 = 0x00;
pub const METHOD_LZMA:   u32 = 0x03_01_01;
pub const METHOD_ZSTD:   u32 = 0x04_F7_11_01;
pub const METHOD_BROTLI: u32 = 0x04_F7_11_02;
pub const METHOD_LZ4:    u32 = 0x04_F7_11_04;

// ── CodecId enum ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecId {
    Copy,
    Lzma,
    Zstd,
    Brotli,
    Lz4,
}

impl CodecId {
    pub const ALL: [CodecId; 5] = [
        CodecId::Copy, CodecId::Lzma, CodecId::Zstd, CodecId::Brotli, CodecId::Lz4,
    ];

    #[inline]
    pub fn method_id(self) -> u32 {
        match self {
            CodecId::Copy   => METHOD_COPY,
            CodecId::Lzma   => METHOD_LZMA,
            CodecId::Zstd   => METHOD_ZSTD,
            CodecId::Brotli => METHOD_BROTLI,
            CodecId::Lz4    => METHOD_LZ4,
        }
    }

    /// Returns `None` if this build does not know the method.
    pub fn from_method_id(method: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.method_id() == method)
    }

    /// Human-readable name (for diagnostics and the CLI).
    pub fn name(self) -> &'static str {
        match self {
            CodecId::Copy   => "copy",
            CodecId::Lzma   => "lzma",
            CodecId::Zstd   => "zstd",
            CodecId::Brotli => "brotli",
            CodecId::Lz4    => "lz4",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        let s = s.to_lowercase();
        match s.as_str() {
            "none" | "store" => Some(CodecId::Copy),
            _ => Self::ALL.into_iter().find(|c| c.name() == s),
        }
    }
}

/// Display name for a raw method id, including ones this build cannot decode.
pub fn method_name(method: u32) -> String {
    match CodecId::from_method_id(method) {
        Some(id) => id.name().to_owned(),
        None     => format!("unknown:{method:08x}"),
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Decompression error: {0}")]
    Decompression(String),
    /// The method id is not available in this build; decoding MUST NOT continue.
    #[error("Required coder not available (method {method:08x})")]
    UnavailableCodec { method: u32 },
    #[error("Packed stream truncated: expected {expected} bytes, read {actual}")]
    Truncated { expected: u64, actual: u64 },
    #[error("Unpacked size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },
    #[error("Unpacked stream checksum mismatch (stored {expected:08x}, computed {actual:08x})")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Codec trait ──────────────────────────────────────────────────────────────

pub trait Codec {
    fn codec_id(&self) -> CodecId;
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError>;
    /// Decompress at most `limit` bytes.  Output beyond `limit` is never
    /// buffered; it fails with [`CodecError::SizeMismatch`].
    fn decompress(&self, data: &[u8], limit: u64) -> Result<Vec<u8>, CodecError>;
}

/// Drain `reader` into memory, stopping one byte past `limit`.
fn read_limited<R: Read>(reader: R, limit: u64) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    reader
        .take(limit.saturating_add(1))
        .read_to_end(&mut out)
        .map_err(|e| CodecError::Decompression(e.to_string()))?;
    check_limit(out.len() as u64, limit)?;
    Ok(out)
}

fn check_limit(actual: u64, limit: u64) -> Result<(), CodecError> {
    if actual > limit {
        return Err(CodecError::SizeMismatch { expected: limit, actual });
    }
    Ok(())
}

/// Writer that refuses to grow past `limit` bytes.
struct LimitedWriter {
    out:        Vec<u8>,
    limit:      u64,
    overflowed: bool,
}

impl Write for LimitedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.out.len() as u64 + buf.len() as u64 > self.limit {
            self.overflowed = true;
            return Err(io::Error::new(io::ErrorKind::Other, "output limit exceeded"));
        }
        self.out.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ── Built-in codec implementations ──────────────────────────────────────────

pub struct CopyCodec;
impl Codec for CopyCodec {
    fn codec_id(&self) -> CodecId { CodecId::Copy }
    fn compress(&self, data: &[u8], _: i32) -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
    fn decompress(&self, data: &[u8], limit: u64) -> Result<Vec<u8>, CodecError> {
        check_limit(data.len() as u64, limit)?;
        Ok(data.to_vec())
    }
}

pub struct ZstdCodec;
impl Codec for ZstdCodec {
    fn codec_id(&self) -> CodecId { CodecId::Zstd }
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError> {
        zstd::encode_all(data, level).map_err(|e| CodecError::Compression(e.to_string()))
    }
    fn decompress(&self, data: &[u8], limit: u64) -> Result<Vec<u8>, CodecError> {
        let decoder = zstd::stream::read::Decoder::new(data)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        read_limited(decoder, limit)
    }
}

pub struct Lz4Codec;
impl Codec for Lz4Codec {
    fn codec_id(&self) -> CodecId { CodecId::Lz4 }
    fn compress(&self, data: &[u8], _: i32) -> Result<Vec<u8>, CodecError> {
        Ok(lz4_flex::compress_prepend_size(data))
    }
    fn decompress(&self, data: &[u8], limit: u64) -> Result<Vec<u8>, CodecError> {
        // The block format carries its decompressed size up front.
        let declared = data
            .get(0..4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .ok_or_else(|| CodecError::Decompression("lz4 block shorter than its size prefix".into()))?;
        check_limit(u64::from(declared), limit)?;
        lz4_flex::decompress_size_prepended(data)
            .map_err(|e| CodecError::Decompression(e.to_string()))
    }
}

pub struct BrotliCodec;
impl Codec for BrotliCodec {
    fn codec_id(&self) -> CodecId { CodecId::Brotli }
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError> {
        let quality = level.clamp(0, 11) as u32;
        let mut out = Vec::new();
        {
            let mut w = brotli::CompressorWriter::new(&mut out, 4096, quality, 22);
            w.write_all(data).map_err(|e| CodecError::Compression(e.to_string()))?;
        }
        Ok(out)
    }
    fn decompress(&self, data: &[u8], limit: u64) -> Result<Vec<u8>, CodecError> {
        read_limited(brotli::Decompressor::new(data, 4096), limit)
    }
}

pub struct LzmaCodec;
impl Codec for LzmaCodec {
    fn codec_id(&self) -> CodecId { CodecId::Lzma }
    fn compress(&self, data: &[u8], _: i32) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        lzma_rs::lzma_compress(&mut io::Cursor::new(data), &mut out)
            .map_err(|e| CodecError::Compression(e.to_string()))?;
        Ok(out)
    }
    fn decompress(&self, data: &[u8], limit: u64) -> Result<Vec<u8>, CodecError> {
        // The dictionary buffer fills before anything reaches the writer, so
        // it is capped as well.  It never holds more than the output so far.
        let options = lzma_rs::decompress::Options {
            memlimit: Some(usize::try_from(limit).unwrap_or(usize::MAX)),
            ..Default::default()
        };
        let mut out = LimitedWriter { out: Vec::new(), limit, overflowed: false };
        let res = lzma_rs::lzma_decompress_with_options(&mut io::Cursor::new(data), &mut out, &options);
        let over_limit = CodecError::SizeMismatch { expected: limit, actual: limit.saturating_add(1) };
        match res {
            _ if out.overflowed => Err(over_limit),
            Err(lzma_rs::error::Error::LzmaError(msg)) if msg.contains("memory limit") => Err(over_limit),
            Err(e) => Err(CodecError::Decompression(e.to_string())),
            Ok(()) => Ok(out.out),
        }
    }
}

// ── Factory ──────────────────────────────────────────────────────────────────

/// Resolve an on-disk method id to a built-in codec.
pub fn get_codec_by_method(method: u32) -> Result<Box<dyn Codec>, CodecError> {
    CodecId::from_method_id(method)
        .map(get_codec)
        .ok_or(CodecError::UnavailableCodec { method })
}

pub fn get_codec(id: CodecId) -> Box<dyn Codec> {
    match id {
        CodecId::Copy   => Box::new(CopyCodec),
        CodecId::Lzma   => Box::new(LzmaCodec),
        CodecId::Zstd   => Box::new(ZstdCodec),
        CodecId::Brotli => Box::new(BrotliCodec),
        CodecId::Lz4    => Box::new(Lz4Codec),
    }
}
