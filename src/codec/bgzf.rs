//! BGZF-style payload compression for `.zxnet` containers (spec §4.7.2,
//! §9/§12: flate2-backed, explicitly not byte-for-byte BGZF — no virtual
//! offset seek index, just one gzip member wrapping the whole payload).

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::GraphResult;

/// Compresses `data` at `level` (clamped to 0-9).
pub fn compress(data: &[u8], level: u32) -> GraphResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level.min(9)));
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

pub fn decompress(data: &[u8]) -> GraphResult<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_arbitrary_bytes() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(16);
        let compressed = compress(&data, 6).unwrap();
        assert!(compressed.len() < data.len());
        let back = decompress(&compressed).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn level_is_clamped_not_rejected() {
        let data = b"abc";
        let compressed = compress(data, 255).unwrap();
        assert_eq!(decompress(&compressed).unwrap(), data);
    }
}
