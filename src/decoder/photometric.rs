//! Photometric normalization: white-is-zero inversion and palette expansion.
//!
//! `RGB`, `BlackIsZero`, `CMYK` and similar interpretations pass their decoded
//! samples straight through; only `WhiteIsZero` and `RGBPalette` need a
//! transform here. YCbCr is handled separately in [`super::ycbcr`].

use super::DecodingBuffer;

/// Inverts every `stride`-th sample in a row (`max_sample - v`), leaving the
/// other `stride - 1` interleaved samples untouched. `stride` is the number
/// of samples per pixel; pass 1 when there is no extra (e.g. alpha) channel,
/// so that one is never mistaken for part of the photometric data.
pub fn invert_white_is_zero(row: DecodingBuffer<'_>, bits_per_sample: u8, stride: usize) {
    let stride = stride.max(1);
    match row {
        DecodingBuffer::U8(buf) => {
            let max = max_sample_u8(bits_per_sample);
            for v in buf.iter_mut().step_by(stride) {
                *v = max - *v;
            }
        }
        DecodingBuffer::U16(buf) => {
            let max = max_sample_u16(bits_per_sample);
            for v in buf.iter_mut().step_by(stride) {
                *v = max - *v;
            }
        }
        DecodingBuffer::U32(buf) => {
            let max = max_sample_u32(bits_per_sample);
            for v in buf.iter_mut().step_by(stride) {
                *v = max - *v;
            }
        }
    }
}

fn max_sample_u8(bits: u8) -> u8 {
    if bits >= 8 {
        u8::MAX
    } else {
        ((1u16 << bits) - 1) as u8
    }
}

fn max_sample_u16(bits: u8) -> u16 {
    if bits >= 16 {
        u16::MAX
    } else {
        ((1u32 << bits) - 1) as u16
    }
}

fn max_sample_u32(bits: u8) -> u32 {
    if bits >= 32 {
        u32::MAX
    } else {
        (1u32 << bits) - 1
    }
}

/// Expands a row of palette indices into 8-bit RGB triplets.
///
/// `color_map` holds three consecutive runs (all reds, then greens, then
/// blues) of 16-bit entries; each is downscaled to 8 bits by dividing by 256
/// (equivalently, taking the high byte).
pub fn expand_palette(indices: &[u32], color_map: &[u16]) -> Vec<u8> {
    let run_len = color_map.len() / 3;
    let mut out = Vec::with_capacity(indices.len() * 3);
    for &index in indices {
        let i = index as usize;
        out.push((color_map[i] / 256) as u8);
        out.push((color_map[run_len + i] / 256) as u8);
        out.push((color_map[2 * run_len + i] / 256) as u8);
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn inverts_8bit_samples() {
        let mut row = vec![0x00u8, 0xFF, 0xFF, 0x00];
        invert_white_is_zero(DecodingBuffer::U8(&mut row), 8, 1);
        assert_eq!(row, vec![0xFF, 0x00, 0x00, 0xFF]);
    }

    #[test]
    fn inverts_1bit_samples() {
        let mut row = vec![0u8, 1, 1, 0];
        invert_white_is_zero(DecodingBuffer::U8(&mut row), 1, 1);
        assert_eq!(row, vec![1, 0, 0, 1]);
    }

    #[test]
    fn leaves_alpha_channel_untouched() {
        // GrayA: [gray, alpha, gray, alpha]; only the gray channel inverts.
        let mut row = vec![0x00u8, 0x7F, 0xFF, 0x10];
        invert_white_is_zero(DecodingBuffer::U8(&mut row), 8, 2);
        assert_eq!(row, vec![0xFF, 0x7F, 0x00, 0x10]);
    }

    #[test]
    fn expands_palette_index() {
        let color_map = vec![0, 0xFF00, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let rgb = expand_palette(&[1], &color_map);
        assert_eq!(rgb, vec![0xFF, 0x00, 0x00]);
    }
}
