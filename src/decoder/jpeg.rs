//! Embedded JPEG interop: new-style (codec 7, shared tables) and old-style
//! (codec 6, self-contained or synthesized) JFIF handling.

use std::io::{Read, Seek};

use crate::decoder::stream::EndianReader;
use crate::{TiffError, TiffFormatError, TiffResult, TiffUnsupportedError};

/// `JPEGProc` must be 1 (baseline sequential DCT); 14 (lossless) is rejected.
pub fn check_baseline(proc: u16) -> TiffResult<()> {
    if proc != 1 {
        return Err(TiffError::UnsupportedError(
            TiffUnsupportedError::UnsupportedJpegProc(proc),
        ));
    }
    Ok(())
}

/// Splices a shared `JPEGTables` abbreviated stream ahead of one tile's
/// compressed body, producing a single self-contained JFIF stream.
///
/// `tables` is `SOI .. DQT .. DHT .. EOI`; `tile_body` is `SOS ..data.. EOI`
/// (or occasionally `SOI SOS ..data.. EOI`). The EOI is trimmed from the
/// tables and any leading SOI is trimmed from the tile body before
/// concatenation, since only one SOI/EOI pair may appear in the result.
pub fn splice_tables(tables: &[u8], tile_body: &[u8]) -> Vec<u8> {
    let tables = match tables {
        [head @ .., 0xFF, 0xD9] => head,
        other => other,
    };
    let tile_body = match tile_body {
        [0xFF, 0xD8, rest @ ..] => rest,
        other => other,
    };
    let mut out = Vec::with_capacity(tables.len() + tile_body.len());
    out.extend_from_slice(tables);
    out.extend_from_slice(tile_body);
    out
}

/// Reads the old-style quantization tables named by `JPEGQTables`.
///
/// Each table is the canonical 64-byte 8-bit quantization table; the offsets
/// to the next table are only a sanity cross-check, per the fragility of
/// deriving lengths purely from adjacent tag offsets.
pub fn read_q_tables<R: Read + Seek>(
    reader: &mut EndianReader<R>,
    offsets: &[u64],
) -> TiffResult<Vec<[u8; 64]>> {
    let mut tables = Vec::with_capacity(offsets.len());
    for &offset in offsets {
        reader.goto_offset(offset)?;
        let mut buf = [0u8; 64];
        reader.inner().read_exact(&mut buf)?;
        tables.push(buf);
    }
    Ok(tables)
}

/// Reads old-style Huffman tables named by `JPEGDCTables`/`JPEGACTables`.
///
/// Each table is self-describing: 16 bytes of per-length symbol counts
/// followed by that many symbol values, exactly the payload a `DHT` marker
/// carries (minus the leading class/id byte, which the caller supplies).
pub fn read_huffman_tables<R: Read + Seek>(
    reader: &mut EndianReader<R>,
    offsets: &[u64],
) -> TiffResult<Vec<Vec<u8>>> {
    let mut tables = Vec::with_capacity(offsets.len());
    for &offset in offsets {
        reader.goto_offset(offset)?;
        let mut counts = [0u8; 16];
        reader.inner().read_exact(&mut counts)?;
        let total: usize = counts.iter().map(|&c| usize::from(c)).sum();
        let mut values = vec![0u8; total];
        reader.inner().read_exact(&mut values)?;
        let mut table = Vec::with_capacity(16 + total);
        table.extend_from_slice(&counts);
        table.extend_from_slice(&values);
        tables.push(table);
    }
    Ok(tables)
}

fn emit_dqt(out: &mut Vec<u8>, id: u8, table: &[u8; 64]) {
    out.extend_from_slice(&[0xFF, 0xDB]);
    out.extend_from_slice(&(2u16 + 1 + 64).to_be_bytes());
    out.push(id);
    out.extend_from_slice(table);
}

fn emit_dht(out: &mut Vec<u8>, class: u8, id: u8, table: &[u8]) {
    out.extend_from_slice(&[0xFF, 0xC4]);
    out.extend_from_slice(&(2u16 + 1 + table.len() as u16).to_be_bytes());
    out.push((class << 4) | id);
    out.extend_from_slice(table);
}

/// Synthesizes a complete baseline JFIF stream from old-style scattered
/// table data, for one tile. `body` is the tile's compressed scan data
/// (everything between the would-be `SOS` header and the `EOI` marker).
#[allow(clippy::too_many_arguments)]
pub fn synthesize_jfif(
    tile_width: u16,
    tile_height: u16,
    samples_per_pixel: u8,
    q_tables: &[[u8; 64]],
    dc_tables: &[Vec<u8>],
    ac_tables: &[Vec<u8>],
    body: &[u8],
) -> TiffResult<Vec<u8>> {
    if samples_per_pixel == 0 {
        return Err(TiffFormatError::SamplesPerPixelIsZero.into());
    }

    let mut out = Vec::new();
    out.extend_from_slice(&[0xFF, 0xD8]); // SOI

    for (i, q) in q_tables.iter().enumerate() {
        emit_dqt(&mut out, i as u8, q);
    }
    for (i, dc) in dc_tables.iter().enumerate() {
        emit_dht(&mut out, 0, i as u8, dc);
    }
    for (i, ac) in ac_tables.iter().enumerate() {
        emit_dht(&mut out, 1, i as u8, ac);
    }

    // SOF0
    out.extend_from_slice(&[0xFF, 0xC0]);
    out.extend_from_slice(&(8u16 + 3 * u16::from(samples_per_pixel)).to_be_bytes());
    out.push(8); // precision
    out.extend_from_slice(&tile_height.to_be_bytes());
    out.extend_from_slice(&tile_width.to_be_bytes());
    out.push(samples_per_pixel);
    for c in 0..samples_per_pixel {
        out.push(c + 1);
        // TODO: respect YCbCrSubSampling instead of hardcoding 2x2 luma.
        let sampling = if c == 0 { 0x22 } else { 0x11 };
        out.push(sampling);
        let qsel = (c as usize).min(q_tables.len().saturating_sub(1));
        out.push(qsel as u8);
    }

    // SOS
    out.extend_from_slice(&[0xFF, 0xDA]);
    out.extend_from_slice(&(6u16 + 2 * u16::from(samples_per_pixel)).to_be_bytes());
    out.push(samples_per_pixel);
    for c in 0..samples_per_pixel {
        out.push(c + 1);
        let dc_sel = (c as usize).min(dc_tables.len().saturating_sub(1));
        let ac_sel = (c as usize).min(ac_tables.len().saturating_sub(1));
        out.push(((dc_sel as u8) << 4) | ac_sel as u8);
    }
    // Ss, Se, Ah/Al for a baseline scan: full frequency range, no successive
    // approximation.
    out.extend_from_slice(&[0x00, 0x3F, 0x00]);

    out.extend_from_slice(body);
    out.extend_from_slice(&[0xFF, 0xD9]); // EOI

    Ok(out)
}

#[cfg(feature = "jpeg")]
/// Decodes a complete JFIF stream, returning interleaved samples plus the
/// dimensions and band count the stream itself declares.
pub fn decode_jfif(data: &[u8]) -> TiffResult<(Vec<u8>, u16, u16, u8)> {
    use zune_jpeg::JpegDecoder;

    let mut decoder = JpegDecoder::new(data);
    let pixels = decoder.decode()?;
    let (width, height) = decoder
        .dimensions()
        .ok_or_else(|| TiffError::FormatError(TiffFormatError::InvalidTag))?;
    let components = decoder.output_colorspace().num_components();

    Ok((pixels, width as u16, height as u16, components as u8))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn splice_trims_eoi_and_soi() {
        let tables = vec![0xFF, 0xD8, 0xFF, 0xDB, 0x00, 0x01, 0xFF, 0xD9];
        let tile_body = vec![0xFF, 0xD8, 0xFF, 0xDA, 0x00, 0x01, 0xFF, 0xD9];
        let spliced = splice_tables(&tables, &tile_body);
        assert_eq!(
            spliced,
            vec![0xFF, 0xD8, 0xFF, 0xDB, 0x00, 0x01, 0xFF, 0xDA, 0x00, 0x01, 0xFF, 0xD9]
        );
    }

    #[test]
    fn synthesize_emits_expected_sos_trailer() {
        let q = [[0u8; 64]];
        let dc = vec![vec![0u8; 16]];
        let ac = vec![vec![0u8; 16]];
        let jfif = synthesize_jfif(2, 2, 1, &q, &dc, &ac, &[0xAB]).unwrap();
        // find the SOS marker and check the three trailing scan-header bytes
        let sos_pos = jfif
            .windows(2)
            .position(|w| w == [0xFF, 0xDA])
            .expect("SOS marker present");
        let sos_len = u16::from_be_bytes([jfif[sos_pos + 2], jfif[sos_pos + 3]]) as usize;
        let trailer = &jfif[sos_pos + 2 + sos_len - 3..sos_pos + 2 + sos_len];
        assert_eq!(trailer, &[0x00, 0x3F, 0x00]);
    }

    #[test]
    fn rejects_lossless_jpeg_proc() {
        assert!(check_baseline(14).is_err());
        assert!(check_baseline(1).is_ok());
    }
}
