//! zlib framing around the stored payload.
//!
//! Writes wrap the source reader in an encoder at the configured preset; reads
//! wrap the extracted BLOB stream in a decoder when the row says it was
//! compressed. The row flag, not the store configuration, drives decoding.

use std::io::Read;

use flate2::read::{ZlibDecoder, ZlibEncoder};

use db_blobstore_core::config::Compression;

/// Wraps `reader` so that reading from it yields the compressed form.
///
/// Returns the reader unchanged when compression is disabled.
pub fn encoder<'a, R: Read + 'a>(reader: R, compression: Compression) -> Box<dyn Read + 'a> {
    match compression.level() {
        None => Box::new(reader),
        Some(level) => Box::new(ZlibEncoder::new(reader, flate2::Compression::new(level))),
    }
}

/// Wraps `reader` in a zlib decoder iff `compressed` is set.
pub fn decoder<'a, R: Read + 'a>(reader: R, compressed: bool) -> Box<dyn Read + 'a> {
    if compressed {
        Box::new(ZlibDecoder::new(reader))
    } else {
        Box::new(reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        b"Lorem ipsum dolor sit amet, consectetur adipiscing elit. ".repeat(512)
    }

    #[test]
    fn none_is_passthrough() {
        let data = sample();
        let mut out = Vec::new();
        encoder(data.as_slice(), Compression::None)
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn presets_shrink_repetitive_input_and_decode_back() {
        let data = sample();
        for compression in [Compression::Fast, Compression::Default, Compression::Best] {
            let mut packed = Vec::new();
            encoder(data.as_slice(), compression)
                .read_to_end(&mut packed)
                .unwrap();
            assert!(packed.len() < data.len() / 10, "{compression}");

            let mut unpacked = Vec::new();
            decoder(packed.as_slice(), true)
                .read_to_end(&mut unpacked)
                .unwrap();
            assert_eq!(unpacked, data, "{compression}");
        }
    }

    #[test]
    fn decoder_respects_flag() {
        let data = sample();
        let mut out = Vec::new();
        decoder(data.as_slice(), false).read_to_end(&mut out).unwrap();
        assert_eq!(out, data);

        let mut out = Vec::new();
        assert!(decoder(data.as_slice(), true).read_to_end(&mut out).is_err());
    }
}
