//! §4.3 gzip codec. A thin wrapper over `flate2`'s low-level `Compress`/
//! `Decompress` streams, looping over a fixed scratch buffer until the
//! stream ends — matches the explicit buffer-size/loop contract more closely
//! than the high-level `GzEncoder`/`GzDecoder` readers would.
//!
//! Not wired into the orchestrator's response path: the orchestrator
//! currently advertises `Accept-Encoding: identity` upstream. This module
//! exists as a complete, tested primitive.

use crate::error::GzipError;
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

const CHUNK: usize = 16 * 1024;
const WINDOW_BITS: u8 = 15;

/// Gzip-compresses `input`. Compression never surfaces a data error — the
/// input is trusted — so this returns the bytes directly rather than a
/// `Result`.
pub fn compress(input: &[u8], level: Option<u32>) -> Vec<u8> {
    let mut compressor = Compress::new_gzip(Compression::new(level.unwrap_or(6)), WINDOW_BITS);
    let mut output = Vec::new();
    let mut buf = [0u8; CHUNK];
    let mut consumed = 0usize;

    loop {
        let before_in = compressor.total_in();
        let before_out = compressor.total_out();
        let status = compressor
            .compress(&input[consumed..], &mut buf, FlushCompress::Finish)
            .expect("gzip compression of trusted input cannot fail");
        consumed += (compressor.total_in() - before_in) as usize;
        let produced = (compressor.total_out() - before_out) as usize;
        output.extend_from_slice(&buf[..produced]);
        if status == Status::StreamEnd {
            break;
        }
    }
    output
}

/// Gzip-decompresses `input`, surfacing `GzipError` on malformed or
/// truncated streams.
pub fn decompress(input: &[u8]) -> Result<Vec<u8>, GzipError> {
    let mut decompressor = Decompress::new_gzip(WINDOW_BITS);
    let mut output = Vec::new();
    let mut buf = [0u8; CHUNK];
    let mut consumed = 0usize;

    loop {
        let before_in = decompressor.total_in();
        let before_out = decompressor.total_out();
        let status = decompressor
            .decompress(&input[consumed..], &mut buf, FlushDecompress::None)
            .map_err(|e| GzipError::Decode(e.to_string()))?;
        consumed += (decompressor.total_in() - before_in) as usize;
        let produced = (decompressor.total_out() - before_out) as usize;
        output.extend_from_slice(&buf[..produced]);

        match status {
            Status::StreamEnd => break,
            Status::Ok if produced == 0 && consumed >= input.len() => {
                return Err(GzipError::Decode("truncated gzip stream".into()));
            }
            Status::BufError => {
                return Err(GzipError::Decode("gzip stream corrupt".into()));
            }
            _ => {}
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_small_payload() {
        let input = b"the quick brown fox jumps over the lazy dog";
        let compressed = compress(input, None);
        let decompressed = decompress(&compressed).unwrap();
        assert_eq!(decompressed, input);
    }

    #[test]
    fn roundtrips_payload_larger_than_one_chunk() {
        let input = vec![b'x'; CHUNK * 3 + 17];
        let compressed = compress(&input, Some(9));
        let decompressed = decompress(&compressed).unwrap();
        assert_eq!(decompressed, input);
    }

    #[test]
    fn roundtrips_empty_payload() {
        let compressed = compress(&[], None);
        let decompressed = decompress(&compressed).unwrap();
        assert!(decompressed.is_empty());
    }

    #[test]
    fn rejects_garbage_input() {
        assert!(decompress(b"not a gzip stream").is_err());
    }
}
