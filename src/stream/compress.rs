//! Compression codec
//!
//! gzip is the archive default; the tag is stored per archive so other
//! codecs can be added without touching stored data.

use flate2::read::GzEncoder;
use flate2::write::GzDecoder;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};

/// Per-archive compression tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    #[default]
    Gzip,
    /// Store payloads without compression
    Plain,
}

impl Codec {
    /// Wrap `reader` so its bytes come out compressed (ingest side)
    pub fn compress_reader<'a, R: Read + 'a>(self, reader: R) -> Box<dyn Read + 'a> {
        match self {
            Codec::Gzip => Box::new(GzEncoder::new(reader, flate2::Compression::default())),
            Codec::Plain => Box::new(reader),
        }
    }

    /// Run `f` against a writer that decompresses into `writer` (egress side)
    pub fn decompress_into<W, F, T>(self, writer: W, f: F) -> crate::error::Result<T>
    where
        W: Write,
        F: FnOnce(&mut dyn Write) -> crate::error::Result<T>,
    {
        match self {
            Codec::Gzip => {
                let mut decoder = GzDecoder::new(writer);
                let out = f(&mut decoder)?;
                decoder.finish()?;
                Ok(out)
            }
            Codec::Plain => {
                let mut writer = writer;
                f(&mut writer)
            }
        }
    }
}

/// Compress `reader` into `writer`, returning compressed bytes written
pub fn compress(reader: &mut impl Read, writer: &mut impl Write) -> io::Result<u64> {
    let mut encoder = GzEncoder::new(reader, flate2::Compression::default());
    io::copy(&mut encoder, writer)
}

/// Decompress `reader` into `writer`, returning decompressed bytes written
pub fn decompress(reader: &mut impl Read, writer: &mut impl Write) -> io::Result<u64> {
    let mut decoder = flate2::read::GzDecoder::new(reader);
    io::copy(&mut decoder, writer)
}
