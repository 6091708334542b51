//! Predictor reversal.
//!
//! TIFF's horizontal predictor replaces each sample (after the first `samples`
//! per row, one per band) with its difference from the same-band sample in
//! the previous pixel. Reversing it is a prefix sum with wrapping arithmetic,
//! which is exactly invertible regardless of sample width.

use super::DecodingBuffer;

trait WrappingAdd: Copy {
    fn wrapping_add(self, other: Self) -> Self;
}

impl WrappingAdd for u8 {
    fn wrapping_add(self, other: Self) -> Self {
        u8::wrapping_add(self, other)
    }
}

impl WrappingAdd for u16 {
    fn wrapping_add(self, other: Self) -> Self {
        u16::wrapping_add(self, other)
    }
}

impl WrappingAdd for u32 {
    fn wrapping_add(self, other: Self) -> Self {
        u32::wrapping_add(self, other)
    }
}

fn rev_hpredict_nsamp<T: WrappingAdd>(row: &mut [T], samples: usize) {
    for i in samples..row.len() {
        row[i] = row[i].wrapping_add(row[i - samples]);
    }
}

/// Reverses horizontal differencing in place, one row at a time.
///
/// `samples` is the number of interleaved bands (1 for a single plane under
/// `PlanarConfiguration::Planar`, `samples_per_pixel` under `Chunky`).
pub fn rev_hpredict(row: DecodingBuffer<'_>, samples: usize) {
    match row {
        DecodingBuffer::U8(buf) => rev_hpredict_nsamp(buf, samples),
        DecodingBuffer::U16(buf) => rev_hpredict_nsamp(buf, samples),
        DecodingBuffer::U32(buf) => rev_hpredict_nsamp(buf, samples),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reverses_u8_gradient() {
        // [0,1,2,3,4,5,6,7] predicted with samples=1 becomes [0,1,1,1,1,1,1,1]
        let mut predicted = vec![0u8, 1, 1, 1, 1, 1, 1, 1];
        rev_hpredict(DecodingBuffer::U8(&mut predicted), 1);
        assert_eq!(predicted, vec![0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn reverses_interleaved_rgb() {
        let mut predicted = vec![10u8, 20, 30, 5, 5, 5];
        rev_hpredict(DecodingBuffer::U8(&mut predicted), 3);
        assert_eq!(predicted, vec![10, 20, 30, 15, 25, 35]);
    }

    #[test]
    fn is_noop_when_only_one_pixel_wide() {
        let mut predicted = vec![42u16, 7, 9];
        rev_hpredict(DecodingBuffer::U16(&mut predicted), 3);
        assert_eq!(predicted, vec![42, 7, 9]);
    }
}
