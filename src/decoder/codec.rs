//! Maps a compression id to a streaming decompressor.
//!
//! JPEG (old- and new-style) is not dispatched here: it does not produce a
//! plain sample byte-stream, it paints whole pixels, so it is handled
//! directly by the raster assembler via [`super::jpeg`].

use std::io::Read;

use super::stream::{PackBitsReader, LZWReader};
use crate::tags::CompressionMethod;
use crate::{TiffError, TiffResult, TiffUnsupportedError};

/// Wraps `reader` (already seeked to the start of a chunk's compressed data,
/// bounded to `compressed_length` bytes) in the decompressor appropriate for
/// `method`.
pub fn new_reader<'r, R: Read + 'r>(
    method: CompressionMethod,
    mut reader: R,
    compressed_length: u64,
) -> TiffResult<Box<dyn Read + 'r>> {
    match method {
        CompressionMethod::None => Ok(Box::new(reader.take(compressed_length))),
        #[cfg(feature = "lzw")]
        CompressionMethod::LZW => {
            // Sniff the bit order (§4.4) from the first two bytes without
            // discarding them: modern TIFF LZW packs MSB-first, but a legacy
            // variant packs LSB-first.
            let mut head = [0u8; 2];
            let mut filled = 0usize;
            while filled < head.len() {
                match reader.read(&mut head[filled..])? {
                    0 => break,
                    n => filled += n,
                }
            }
            let bit_order = match head {
                [0x00, b] if filled == 2 && b & 0x80 != 0 => weezl::BitOrder::Lsb,
                _ => weezl::BitOrder::Msb,
            };
            let chained = std::io::Cursor::new(head[..filled].to_vec()).chain(reader);
            Ok(Box::new(LZWReader::new(
                chained,
                compressed_length as usize,
                bit_order,
            )))
        }
        CompressionMethod::PackBits => {
            Ok(Box::new(PackBitsReader::new(reader, compressed_length)))
        }
        #[cfg(feature = "deflate")]
        CompressionMethod::Deflate | CompressionMethod::OldDeflate => {
            Ok(Box::new(flate2::read::ZlibDecoder::new(reader)))
        }
        other => Err(TiffError::UnsupportedError(
            TiffUnsupportedError::UnsupportedCompressionMethod(other),
        )),
    }
}
