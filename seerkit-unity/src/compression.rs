use crate::error::{Result, UnityError};

/// Decompress LZ4 compressed data
pub fn decompress_lz4(compressed: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    let output = lz4_flex::decompress(compressed, expected_size)
        .map_err(|e| UnityError::Decompression(format!("LZ4: {}", e)))?;
    if output.len() != expected_size {
        return Err(UnityError::SizeMismatch {
            expected: expected_size,
            actual: output.len(),
        });
    }
    Ok(output)
}

/// Decompress LZMA compressed data
///
/// Bundle blocks carry the 5-byte LZMA properties followed directly by the
/// raw stream; the 8-byte size field of the standalone .lzma container is
/// absent, so the size comes from the block table instead.
pub fn decompress_lzma(compressed: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    if compressed.len() < 5 {
        return Err(UnityError::Decompression(
            "LZMA data too short (missing properties)".to_string(),
        ));
    }

    let mut cursor = std::io::Cursor::new(compressed);
    let mut output = Vec::with_capacity(expected_size);
    lzma_rs::lzma_decompress_with_options(
        &mut cursor,
        &mut output,
        &lzma_rs::decompress::Options {
            unpacked_size: lzma_rs::decompress::UnpackedSize::UseProvided(Some(
                expected_size as u64,
            )),
            memlimit: None,
            allow_incomplete: false,
        },
    )
    .map_err(|e| UnityError::Decompression(format!("LZMA: {:?}", e)))?;

    if output.len() != expected_size {
        return Err(UnityError::SizeMismatch {
            expected: expected_size,
            actual: output.len(),
        });
    }
    Ok(output)
}

/// Decompress a bundle block or BlocksInfo blob based on its compression type
pub fn decompress_block(
    compressed: &[u8],
    compression_type: u16,
    expected_size: usize,
) -> Result<Vec<u8>> {
    match compression_type {
        0 => {
            // No compression
            if compressed.len() != expected_size {
                return Err(UnityError::SizeMismatch {
                    expected: expected_size,
                    actual: compressed.len(),
                });
            }
            Ok(compressed.to_vec())
        }
        1 => decompress_lzma(compressed, expected_size),
        // LZ4HC shares the LZ4 decoder
        2 | 3 => decompress_lz4(compressed, expected_size),
        other => Err(UnityError::UnsupportedCompression(other)),
    }
}

/// Human-readable name for a compression type
pub fn compression_name(compression_type: u16) -> &'static str {
    match compression_type {
        0 => "None",
        1 => "LZMA",
        2 => "LZ4",
        3 => "LZ4HC",
        4 => "LZHAM",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uncompressed_passthrough() {
        let data = b"Hello, World!";
        let result = decompress_block(data, 0, data.len()).unwrap();
        assert_eq!(result, data);
    }

    #[test]
    fn test_uncompressed_size_mismatch() {
        let data = b"Hello";
        let result = decompress_block(data, 0, 16);
        assert!(matches!(result, Err(UnityError::SizeMismatch { .. })));
    }

    #[test]
    fn test_lz4_roundtrip() {
        let original = b"This is a test string for LZ4 compression. It should compress reasonably well due to repetition. This is a test string for LZ4 compression.";

        let compressed = lz4_flex::compress(original);
        let decompressed = decompress_block(&compressed, 2, original.len()).unwrap();

        assert_eq!(decompressed, original);
    }

    #[test]
    fn test_lz4hc_uses_lz4_decoder() {
        let original = b"LZ4HC blocks decode with the plain LZ4 decoder.";
        let compressed = lz4_flex::compress(original);
        let decompressed = decompress_block(&compressed, 3, original.len()).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn test_lzma_raw_stream_roundtrip() {
        let original: Vec<u8> = (0..512u32).map(|i| (i % 251) as u8).collect();

        // lzma_compress emits props + 8-byte size + stream; blocks carry
        // props + stream, so splice the size field out.
        let mut full = Vec::new();
        lzma_rs::lzma_compress(&mut std::io::Cursor::new(&original), &mut full).unwrap();
        let mut raw = full[..5].to_vec();
        raw.extend_from_slice(&full[13..]);

        let decompressed = decompress_block(&raw, 1, original.len()).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn test_unsupported_compression_type() {
        let data = vec![0u8; 16];
        let result = decompress_block(&data, 4, 16);
        assert!(matches!(
            result,
            Err(UnityError::UnsupportedCompression(4))
        ));
    }
}
