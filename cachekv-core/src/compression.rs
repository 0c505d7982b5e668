//! Gzip wrapper around `flate2`, replacing the original's libz-based
//! `GzipCompressor`. Compression failure is not fatal to a write: the
//! caller falls back to storing the raw value (§4.1 "Compressor-failure").

use std::io::Write;

use flate2::write::{GzDecoder, GzEncoder};
use flate2::Compression;

pub fn compress(data: &[u8]) -> Option<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len()), Compression::best());
    encoder.write_all(data).ok()?;
    encoder.finish().ok()
}

pub fn decompress(data: &[u8]) -> Option<Vec<u8>> {
    let mut decoder = GzDecoder::new(Vec::new());
    decoder.write_all(data).ok()?;
    decoder.finish().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_nonempty_input() {
        let original = b"the quick brown fox jumps over the lazy dog".repeat(4);
        let compressed = compress(&original).expect("compress succeeds");
        let decompressed = decompress(&compressed).expect("decompress succeeds");
        assert_eq!(decompressed, original);
    }

    #[test]
    fn shrinks_repetitive_data() {
        let original = vec![b'a'; 4096];
        let compressed = compress(&original).unwrap();
        assert!(compressed.len() < original.len());
    }
}
