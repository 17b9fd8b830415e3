//! Optional compression on write, transparent decompression on read.
//! `NONE` is a passthrough; `DEFLATE` pipes bytes through
//! a zlib encoder/decoder. Switching compression on a collection only
//! affects new writes; existing documents are never recompressed.

use std::io::{self, Read};

use flate2::read::{ZlibDecoder, ZlibEncoder};
use flate2::Compression;

use crate::types::CompressionMode;

/// Compress `content` per `mode`, returning the bytes to place in the
/// file store. The caller records `length` (pre-compression) and
/// `storedLength` (the length of the returned bytes) on the document.
pub(crate) fn encode(mode: CompressionMode, content: &[u8]) -> io::Result<Vec<u8>> {
    match mode {
        CompressionMode::None => Ok(content.to_vec()),
        CompressionMode::Deflate => {
            let mut encoder = ZlibEncoder::new(content, Compression::default());
            let mut out = Vec::new();
            encoder.read_to_end(&mut out)?;
            Ok(out)
        }
    }
}

/// Wrap a retrieve stream so reads yield the logical (decompressed)
/// bytes regardless of how the document was stored.
pub(crate) fn decode_reader<'a>(
    mode: CompressionMode,
    inner: Box<dyn Read + 'a>,
) -> Box<dyn Read + 'a> {
    match mode {
        CompressionMode::None => inner,
        CompressionMode::Deflate => Box::new(ZlibDecoder::new(inner)),
    }
}

#[cfg(test)]
#[path = "codec_test.rs"]
mod codec_test;
