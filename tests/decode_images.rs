//! End-to-end decode scenarios, built from in-memory byte literals rather
//! than fixture files on disk.

use tiff_decode::decoder::{ifd::Value, Decoder, DecodingResult};
use tiff_decode::tags::Tag;
use tiff_decode::ColorType;

use std::io::Cursor;

fn le16(v: u16) -> [u8; 2] {
    v.to_le_bytes()
}
fn le32(v: u32) -> [u8; 4] {
    v.to_le_bytes()
}

/// Assembles a classic little-endian TIFF with one IFD, `entries` written in
/// order, immediately followed by `tail` (out-of-line value/strip data).
/// Offsets embedded in `entries` must be computed by the caller against
/// `8 + 2 + entries.len() * 12 + 4` as the start of `tail`.
fn build_single_ifd_tiff(entries: &[(u16, u16, u32, [u8; 4])], tail: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(b"II");
    buf.extend_from_slice(&le16(42));
    buf.extend_from_slice(&le32(8));

    buf.extend_from_slice(&le16(entries.len() as u16));
    for (tag, ty, count, val) in entries {
        buf.extend_from_slice(&le16(*tag));
        buf.extend_from_slice(&le16(*ty));
        buf.extend_from_slice(&le32(*count));
        buf.extend_from_slice(val);
    }
    buf.extend_from_slice(&le32(0)); // no next IFD
    buf.extend_from_slice(tail);
    buf
}

/// The offset `tail` starts at, for a single-IFD file with this many entries.
fn tail_offset(entry_count: usize) -> u32 {
    8 + 2 + entry_count as u32 * 12 + 4
}

/// Scenario 1: minimal uncompressed grayscale, 2x2, 8bpp, BlackIsZero.
#[test]
fn minimal_uncompressed_grayscale() {
    let pixels = [0x00u8, 0xFF, 0xFF, 0x00];
    let entries: Vec<(u16, u16, u32, [u8; 4])> = vec![
        (256, 4, 1, le32(2)),                        // ImageWidth
        (257, 4, 1, le32(2)),                        // ImageLength
        (258, 3, 1, [8, 0, 0, 0]),                    // BitsPerSample
        (262, 3, 1, [1, 0, 0, 0]),                    // PhotometricInterpretation: BlackIsZero
        (273, 4, 1, le32(tail_offset(6))),            // StripOffsets
        (279, 4, 1, le32(pixels.len() as u32)),       // StripByteCounts
    ];
    let data = build_single_ifd_tiff(&entries, &pixels);

    let mut decoder = Decoder::new(Cursor::new(data)).unwrap();
    assert_eq!(decoder.colortype().unwrap(), ColorType::Gray(8));
    let result = decoder.decode().unwrap();
    assert_eq!(result, DecodingResult::U8(pixels.to_vec()));
}

/// Scenario 2: same raw bytes, photometric = WhiteIsZero -> bitwise complement.
#[test]
fn white_is_zero_inverts_samples() {
    let pixels = [0x00u8, 0xFF, 0xFF, 0x00];
    let entries: Vec<(u16, u16, u32, [u8; 4])> = vec![
        (256, 4, 1, le32(2)),
        (257, 4, 1, le32(2)),
        (258, 3, 1, [8, 0, 0, 0]),
        (262, 3, 1, [0, 0, 0, 0]), // WhiteIsZero
        (273, 4, 1, le32(tail_offset(6))),
        (279, 4, 1, le32(pixels.len() as u32)),
    ];
    let data = build_single_ifd_tiff(&entries, &pixels);

    let mut decoder = Decoder::new(Cursor::new(data)).unwrap();
    let result = decoder.decode().unwrap();
    assert_eq!(
        result,
        DecodingResult::U8(pixels.iter().map(|&b| 0xFF - b).collect())
    );
}

/// Scenario 3: a 3x1 RGB tile, PackBits-compressed as a single literal run.
#[test]
fn packbits_rgb_literal_run() {
    let triplets = [10u8, 20, 30, 10, 20, 30, 10, 20, 30];
    let mut packed = vec![0x08u8]; // n=8 -> literal run of 9 bytes
    packed.extend_from_slice(&triplets);

    let entries: Vec<(u16, u16, u32, [u8; 4])> = vec![
        (256, 4, 1, le32(3)),
        (257, 4, 1, le32(1)),
        (258, 3, 1, [8, 0, 0, 0]),
        (277, 3, 1, [3, 0, 0, 0]), // SamplesPerPixel
        (262, 3, 1, [2, 0, 0, 0]), // RGB
        (259, 3, 1, [0x05, 0x80, 0, 0]), // Compression = 32773 (PackBits)
        (273, 4, 1, le32(tail_offset(8))),
        (279, 4, 1, le32(packed.len() as u32)),
    ];
    let data = build_single_ifd_tiff(&entries, &packed);

    let mut decoder = Decoder::new(Cursor::new(data)).unwrap();
    assert_eq!(decoder.colortype().unwrap(), ColorType::RGB(8));
    let result = decoder.decode().unwrap();
    assert_eq!(result, DecodingResult::U8(triplets.to_vec()));
}

/// Scenario 4: an 8-sample gradient row, horizontally predicted then
/// LZW-packed, decodes back to the original gradient.
#[test]
fn lzw_with_horizontal_predictor() {
    let gradient = [0u8, 1, 2, 3, 4, 5, 6, 7];
    let predicted = [0u8, 1, 1, 1, 1, 1, 1, 1];

    let mut encoded = Vec::new();
    weezl::encode::Encoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
        .into_stream(&mut encoded)
        .encode_all(&predicted)
        .status
        .unwrap();

    let entries: Vec<(u16, u16, u32, [u8; 4])> = vec![
        (256, 4, 1, le32(8)),
        (257, 4, 1, le32(1)),
        (258, 3, 1, [8, 0, 0, 0]),
        (259, 3, 1, [5, 0, 0, 0]), // Compression = LZW
        (262, 3, 1, [1, 0, 0, 0]), // BlackIsZero
        (317, 3, 1, [2, 0, 0, 0]), // Predictor = Horizontal
        (273, 4, 1, le32(tail_offset(8))),
        (279, 4, 1, le32(encoded.len() as u32)),
    ];
    let data = build_single_ifd_tiff(&entries, &encoded);

    let mut decoder = Decoder::new(Cursor::new(data)).unwrap();
    let result = decoder.decode().unwrap();
    assert_eq!(result, DecodingResult::U8(gradient.to_vec()));
}

/// Scenario 5: a 1x1 palette image; index 1 saturates the red channel.
#[test]
fn palette_expansion() {
    // 4 entries per channel (2-bit indices): reds, then greens, then blues.
    let color_map: Vec<u16> = vec![
        0, 0xFF00, 0, 0, // red run
        0, 0, 0, 0, // green run
        0, 0, 0, 0, // blue run
    ];
    let mut color_map_bytes = Vec::new();
    for v in &color_map {
        color_map_bytes.extend_from_slice(&v.to_le_bytes());
    }
    let entry_count = 7;
    let color_map_offset = tail_offset(entry_count);
    let strip_offset = color_map_offset + color_map_bytes.len() as u32;

    let entries: Vec<(u16, u16, u32, [u8; 4])> = vec![
        (256, 4, 1, le32(1)),
        (257, 4, 1, le32(1)),
        (258, 3, 1, [2, 0, 0, 0]), // BitsPerSample = 2
        (262, 3, 1, [3, 0, 0, 0]), // RGBPalette
        (320, 3, 12, le32(color_map_offset)), // ColorMap
        (273, 4, 1, le32(strip_offset)),
        (279, 4, 1, le32(1)),
    ];
    assert_eq!(entries.len(), entry_count);

    let mut tail = color_map_bytes;
    tail.push(0b0100_0000); // index 1 in the top 2 bits
    let data = build_single_ifd_tiff(&entries, &tail);

    let mut decoder = Decoder::new(Cursor::new(data)).unwrap();
    assert_eq!(decoder.colortype().unwrap(), ColorType::RGB(8));
    let result = decoder.decode().unwrap();
    assert_eq!(result, DecodingResult::U8(vec![0xFF, 0x00, 0x00]));
}

/// Scenario 6: a two-IFD file; IFD0 carries full metadata, IFD1 is an
/// EXIF-style thumbnail directory missing `ImageWidth`/`ImageLength`.
#[test]
fn two_ifd_chain_with_missing_dimensions_on_second() {
    let software = b"Adobe Photoshop CS2 Macintosh\0";
    assert_eq!(software.len(), 31);

    let ifd0_entries: Vec<(u16, u16, u32, [u8; 4])> = vec![
        (256, 4, 1, le32(3601)),
        (257, 4, 1, le32(4176)),
        (259, 3, 1, [1, 0, 0, 0]), // Compression = None
        (305, 2, 31, le32(tail_offset(4))), // Software, ASCII, out-of-line
    ];
    let ifd0_size = 2 + ifd0_entries.len() * 12 + 4;
    let software_offset = 8 + ifd0_size as u32;
    let ifd1_offset = software_offset + software.len() as u32;

    let mut buf = Vec::new();
    buf.extend_from_slice(b"II");
    buf.extend_from_slice(&le16(42));
    buf.extend_from_slice(&le32(8));

    buf.extend_from_slice(&le16(ifd0_entries.len() as u16));
    for (tag, ty, count, val) in &ifd0_entries {
        buf.extend_from_slice(&le16(*tag));
        buf.extend_from_slice(&le16(*ty));
        buf.extend_from_slice(&le32(*count));
        buf.extend_from_slice(val);
    }
    buf.extend_from_slice(&le32(ifd1_offset)); // next IFD
    buf.extend_from_slice(software);

    let ifd1_entries: Vec<(u16, u16, u32, [u8; 4])> = vec![
        (259, 3, 1, [6, 0, 0, 0]), // Compression = old-style JPEG
        (513, 4, 1, le32(418)),    // JPEGInterchangeFormat
    ];
    buf.extend_from_slice(&le16(ifd1_entries.len() as u16));
    for (tag, ty, count, val) in &ifd1_entries {
        buf.extend_from_slice(&le16(*tag));
        buf.extend_from_slice(&le16(*ty));
        buf.extend_from_slice(&le32(*count));
        buf.extend_from_slice(val);
    }
    buf.extend_from_slice(&le32(0)); // terminates the chain

    let mut decoder = Decoder::new(Cursor::new(buf)).unwrap();
    assert_eq!(decoder.num_images().unwrap(), 2);
    assert_eq!(decoder.dimensions().unwrap(), (3601, 4176));
    match decoder.get_tag(Tag::Software).unwrap() {
        Value::Ascii(s) => assert_eq!(s, "Adobe Photoshop CS2 Macintosh"),
        other => panic!("expected Ascii, got {:?}", other),
    }

    decoder.next_image().unwrap();
    assert!(decoder.width(1).is_err());
    match decoder.get_tag(Tag::Compression).unwrap() {
        Value::Short(6) => {}
        other => panic!("expected Compression = 6, got {:?}", other),
    }
}

/// Scenario 7: a 2x1 planar GrayA image under WhiteIsZero. The gray plane
/// must invert; the alpha plane, stored as its own strip rather than
/// interleaved, must pass through untouched.
#[test]
fn planar_white_is_zero_preserves_alpha_plane() {
    let gray_row = [0x10u8, 0x20];
    let alpha_row = [0x30u8, 0x40];

    let entry_count = 8;
    let strip_offsets_array_offset = tail_offset(entry_count);
    let gray_offset = strip_offsets_array_offset + 8; // two LONG offsets
    let alpha_offset = gray_offset + gray_row.len() as u32;

    let entries: Vec<(u16, u16, u32, [u8; 4])> = vec![
        (256, 4, 1, le32(2)),      // ImageWidth
        (257, 4, 1, le32(1)),      // ImageLength
        (258, 3, 1, [8, 0, 0, 0]), // BitsPerSample
        (262, 3, 1, [0, 0, 0, 0]), // PhotometricInterpretation: WhiteIsZero
        (277, 3, 1, [2, 0, 0, 0]), // SamplesPerPixel
        (338, 3, 1, [2, 0, 0, 0]), // ExtraSamples: unassociated alpha
        (284, 3, 1, [2, 0, 0, 0]), // PlanarConfiguration: Planar
        (273, 4, 2, le32(strip_offsets_array_offset)), // StripOffsets
    ];
    assert_eq!(entries.len(), entry_count);

    let mut tail = Vec::new();
    tail.extend_from_slice(&le32(gray_offset));
    tail.extend_from_slice(&le32(alpha_offset));
    tail.extend_from_slice(&gray_row);
    tail.extend_from_slice(&alpha_row);
    let data = build_single_ifd_tiff(&entries, &tail);

    let mut decoder = Decoder::new(Cursor::new(data)).unwrap();
    let result = decoder.decode().unwrap();
    assert_eq!(
        result,
        DecodingResult::U8(vec![
            0xFF - gray_row[0],
            alpha_row[0],
            0xFF - gray_row[1],
            alpha_row[1],
        ])
    );
}
