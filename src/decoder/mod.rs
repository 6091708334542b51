//! TIFF decoding: the IFD chain walker and the top-level [`Decoder`].
//!
//! A `Decoder` owns a byte-order-aware reader and a cache of the [`Directory`]
//! chain it has walked so far. Directories are read lazily, one at a time,
//! following each one's `next` pointer, with [`cycles::IfdCycles`] guarding
//! against a chain that loops back on itself.

mod codec;
mod cycles;
pub mod ifd;
mod image;
mod jpeg;
mod photometric;
mod predictor;
pub mod stream;
mod ycbcr;

use std::cell::Cell;
use std::io::{Read, Seek};

use self::cycles::IfdCycles;
use self::ifd::Entry;
use self::image::ImageDescriptor;
use self::stream::{ByteOrder, EndianReader};
use crate::directory::Directory;
use crate::tags::{IfdPointer, Tag, Type};
use crate::{ColorType, TiffError, TiffFormatError, TiffResult, UsageError};

/// Caller-configurable caps against unbounded allocation driven by a
/// maliciously crafted (or merely corrupt) file.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Maximum size, in bytes, of one decoded image's raster.
    pub decoding_buffer_size: usize,
    /// Maximum size, in bytes, of a single out-of-line IFD tag value.
    pub ifd_value_size: usize,
}

impl Limits {
    /// No limits at all. Only appropriate for trusted input.
    pub fn unlimited() -> Self {
        Limits {
            decoding_buffer_size: usize::MAX,
            ifd_value_size: usize::MAX,
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            decoding_buffer_size: 256 * 1024 * 1024,
            ifd_value_size: 16 * 1024 * 1024,
        }
    }
}

/// Whether an image's samples are laid out in strips or tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkType {
    Strip,
    Tile,
}

/// Decoded raster data, one variant per supported transfer type.
///
/// Only unsigned integer sample formats are supported; see
/// [`crate::TiffUnsupportedError::UnsupportedSampleFormat`].
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum DecodingResult {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
}

/// A mutable view over one row of a [`DecodingResult`], for in-place
/// predictor reversal and photometric normalization.
pub enum DecodingBuffer<'a> {
    U8(&'a mut [u8]),
    U16(&'a mut [u16]),
    U32(&'a mut [u32]),
}

fn read_entry<R: Read + Seek>(
    reader: &mut EndianReader<R>,
    warnings: &mut Vec<String>,
) -> TiffResult<Option<(Tag, Entry)>> {
    let tag_raw = reader.read_u16()?;
    let type_raw = reader.read_u16()?;
    let count = reader.read_u32()?;
    let mut offset = [0u8; 4];
    reader.inner().read_exact(&mut offset)?;

    match Type::from_u16(type_raw) {
        Some(type_) => Ok(Some((Tag::from_u16_exhaustive(tag_raw), Entry::new(type_, count, offset)))),
        None => {
            warnings.push(format!(
                "skipping tag {} with unknown field type {}",
                tag_raw, type_raw
            ));
            Ok(None)
        }
    }
}

/// A cursor over a TIFF file's chain of Image File Directories.
///
/// Directories are decoded lazily and cached as they are visited; `R` need
/// only support `Read + Seek`, matching how chunk offsets and out-of-line tag
/// values are scattered throughout the file.
pub struct Decoder<R> {
    reader: EndianReader<R>,
    limits: Limits,
    first_ifd_offset: IfdPointer,
    directories: Vec<Directory>,
    directory_offsets: Vec<IfdPointer>,
    cycles: IfdCycles,
    cursor: usize,
    warnings: Vec<String>,
    cancelled: Cell<bool>,
}

impl<R: Read + Seek> Decoder<R> {
    /// Reads the 8-byte TIFF header and returns a cursor positioned at the
    /// first image.
    pub fn new(mut reader: R) -> TiffResult<Self> {
        let mut bom = [0u8; 2];
        reader.read_exact(&mut bom)?;
        let byte_order = match &bom {
            b"II" => ByteOrder::LittleEndian,
            b"MM" => ByteOrder::BigEndian,
            _ => return Err(TiffFormatError::TiffSignatureInvalid.into()),
        };
        let mut reader = EndianReader::new(reader, byte_order);

        match reader.read_u16()? {
            42 => {}
            // BigTIFF is recognized only far enough to reject it cleanly; its
            // 8-byte offset field and different entry layout are not parsed.
            43 => return Err(TiffFormatError::BigTiffUnsupported.into()),
            _ => return Err(TiffFormatError::TiffSignatureNotFound.into()),
        }
        let first_ifd_offset = IfdPointer(reader.read_u32()?.into());

        Ok(Decoder {
            reader,
            limits: Limits::default(),
            first_ifd_offset,
            directories: Vec::new(),
            directory_offsets: Vec::new(),
            cycles: IfdCycles::new(),
            cursor: 0,
            warnings: Vec::new(),
            cancelled: Cell::new(false),
        })
    }

    /// Overrides the default [`Limits`].
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.reader.byte_order
    }

    fn read_directory(&mut self, offset: u64) -> TiffResult<Directory> {
        self.reader.goto_offset(offset)?;
        let count = self.reader.read_u16()?;
        let mut dir = Directory::new();
        for _ in 0..count {
            if let Some((tag, entry)) = read_entry(&mut self.reader, &mut self.warnings)? {
                dir.insert(tag, entry);
            }
        }
        let next = self.reader.read_u32()?;
        dir.next_ifd = if next == 0 { None } else { Some(IfdPointer(next.into())) };
        Ok(dir)
    }

    /// Loads directories, following `next` pointers, until index `index`
    /// exists or the chain ends. Returns whether it exists.
    fn ensure_loaded_through(&mut self, index: usize) -> TiffResult<bool> {
        while self.directories.len() <= index {
            let offset = match self.directories.last() {
                None => self.first_ifd_offset,
                Some(dir) => match dir.next() {
                    Some(p) => p,
                    None => return Ok(false),
                },
            };
            let dir = self.read_directory(offset.0)?;
            self.cycles.insert_next(offset, dir.next())?;
            self.directories.push(dir);
            self.directory_offsets.push(offset);
        }
        Ok(true)
    }

    fn directory(&mut self, index: usize) -> TiffResult<()> {
        if !self.ensure_loaded_through(index)? {
            return Err(UsageError::InvalidImageIndex(index).into());
        }
        Ok(())
    }

    /// Counts every image in the file, walking the whole IFD chain.
    pub fn num_images(&mut self) -> TiffResult<usize> {
        while self.ensure_loaded_through(self.directories.len())? {}
        Ok(self.directories.len())
    }

    /// Whether an image follows the cursor's current position.
    pub fn more_images(&mut self) -> bool {
        self.ensure_loaded_through(self.cursor + 1).unwrap_or(false)
    }

    /// Advances the cursor to the next image.
    pub fn next_image(&mut self) -> TiffResult<()> {
        self.directory(self.cursor + 1)?;
        self.cursor += 1;
        Ok(())
    }

    pub fn width(&mut self, index: usize) -> TiffResult<u32> {
        self.directory(index)?;
        let limits = self.limits;
        let dir = &self.directories[index];
        dir.require_tag(Tag::ImageWidth, &limits, &mut self.reader)?
            .into_u32()
    }

    pub fn height(&mut self, index: usize) -> TiffResult<u32> {
        self.directory(index)?;
        let limits = self.limits;
        let dir = &self.directories[index];
        dir.require_tag(Tag::ImageLength, &limits, &mut self.reader)?
            .into_u32()
    }

    /// The current image's dimensions.
    pub fn dimensions(&mut self) -> TiffResult<(u32, u32)> {
        Ok((self.width(self.cursor)?, self.height(self.cursor)?))
    }

    /// Looks up an arbitrary tag on the directory at the cursor.
    pub fn find_tag(&mut self, tag: Tag) -> TiffResult<Option<ifd::Value>> {
        self.directory(self.cursor)?;
        let limits = self.limits;
        let dir = &self.directories[self.cursor];
        dir.find_tag(tag, &limits, &mut self.reader)
    }

    /// Like [`Decoder::find_tag`] but fails with `RequiredTagNotFound` when absent.
    pub fn get_tag(&mut self, tag: Tag) -> TiffResult<ifd::Value> {
        self.directory(self.cursor)?;
        let limits = self.limits;
        let dir = &self.directories[self.cursor];
        dir.require_tag(tag, &limits, &mut self.reader)
    }

    /// Follows a sub-IFD tag (e.g. [`Tag::ExifDirectory`], [`Tag::GpsDirectory`],
    /// [`Tag::SubIfd`]) in the directory at the cursor, returning the pointed-to
    /// [`Directory`]. The top-level chain is flattened by [`next_image`][Self::next_image];
    /// sub-IFDs are resolved on demand instead, per the data model's
    /// "preserving sub-IFD references via the entry's value".
    ///
    /// A sub-IFD pointing back at the directory that references it is a
    /// self-referential cycle and is rejected with `CyclicIFD`; the main
    /// chain's cycle detector is not reused here since it is a one-child
    /// (union-find over a single `next` pointer) structure and a directory
    /// may have both a `next` pointer and a sub-IFD pointer.
    pub fn sub_directory(&mut self, tag: Tag) -> TiffResult<Directory> {
        self.directory(self.cursor)?;
        let limits = self.limits;
        let parent_offset = self.directory_offsets[self.cursor];
        let pointer = {
            let dir = &self.directories[self.cursor];
            IfdPointer(dir.require_tag(tag, &limits, &mut self.reader)?.into_u64()?)
        };
        if pointer == parent_offset {
            return Err(TiffFormatError::CycleInOffsets.into());
        }
        self.read_directory(pointer.0)
    }

    fn descriptor_at(&mut self, index: usize) -> TiffResult<ImageDescriptor> {
        self.directory(index)?;
        let limits = self.limits;
        let dir = &self.directories[index];
        ImageDescriptor::from_directory(dir, &limits, &mut self.reader, &mut self.warnings)
    }

    /// The pixel layout as it exists on disk, before photometric
    /// normalization (e.g. `Palette` rather than the expanded `RGB`).
    pub fn raw_image_type(&mut self) -> TiffResult<ColorType> {
        let descriptor = self.descriptor_at(self.cursor)?;
        Ok(descriptor.raw_color_type())
    }

    /// The pixel layout `decode` actually delivers.
    pub fn colortype(&mut self) -> TiffResult<ColorType> {
        let descriptor = self.descriptor_at(self.cursor)?;
        descriptor.destination_color_type()
    }

    /// Decodes the current image's full raster.
    pub fn decode(&mut self) -> TiffResult<DecodingResult> {
        let descriptor = self.descriptor_at(self.cursor)?;
        let limits = self.limits;
        let (result, _color_type) =
            descriptor.decode(&mut self.reader, &limits, &self.cancelled, &mut self.warnings)?;
        Ok(result)
    }

    /// Requests that the in-progress or next `decode` stop early at the next
    /// tile boundary, returning a partial raster rather than an error.
    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Drains and returns the warnings accumulated so far.
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn le_u16(v: u16) -> [u8; 2] {
        v.to_le_bytes()
    }
    fn le_u32(v: u32) -> [u8; 4] {
        v.to_le_bytes()
    }

    /// A minimal little-endian, single-directory, 1x1 uncompressed
    /// WhiteIsZero TIFF with one 8-bit sample.
    fn minimal_tiff() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"II");
        buf.extend_from_slice(&le_u16(42));
        buf.extend_from_slice(&le_u32(8)); // first IFD at offset 8

        let entries: Vec<(u16, u16, u32, [u8; 4])> = vec![
            (256, 4, 1, le_u32(1)),      // ImageWidth = 1
            (257, 4, 1, le_u32(1)),      // ImageLength = 1
            (258, 3, 1, [8, 0, 0, 0]),   // BitsPerSample = 8
            (262, 3, 1, [0, 0, 0, 0]),   // PhotometricInterpretation = WhiteIsZero
            (273, 4, 1, le_u32(86)),     // StripOffsets -> just past the IFD (8 + 2 + 6*12 + 4)
            (279, 4, 1, le_u32(1)),      // StripByteCounts = 1
        ];
        buf.extend_from_slice(&le_u16(entries.len() as u16));
        for (tag, ty, count, val) in &entries {
            buf.extend_from_slice(&le_u16(*tag));
            buf.extend_from_slice(&le_u16(*ty));
            buf.extend_from_slice(&le_u32(*count));
            buf.extend_from_slice(val);
        }
        buf.extend_from_slice(&le_u32(0)); // no next IFD
        buf.push(0x2A); // the single pixel sample
        buf
    }

    #[test]
    fn reads_header_and_single_directory() {
        let data = minimal_tiff();
        let mut decoder = Decoder::new(Cursor::new(data)).unwrap();
        assert_eq!(decoder.num_images().unwrap(), 1);
        assert_eq!(decoder.dimensions().unwrap(), (1, 1));
        assert!(!decoder.more_images());
    }

    #[test]
    fn decodes_minimal_grayscale_pixel() {
        let data = minimal_tiff();
        let mut decoder = Decoder::new(Cursor::new(data)).unwrap();
        let result = decoder.decode().unwrap();
        // WhiteIsZero inverts: stored 0x2A -> delivered 0xFF - 0x2A.
        assert_eq!(result, DecodingResult::U8(vec![0xFF - 0x2A]));
    }

    #[test]
    fn rejects_bad_signature() {
        let data = vec![b'X', b'Y', 0, 0, 0, 0, 0, 0];
        assert!(Decoder::new(Cursor::new(data)).is_err());
    }

    #[test]
    fn follows_sub_ifd_without_touching_the_main_chain() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"II");
        buf.extend_from_slice(&le_u16(42));
        buf.extend_from_slice(&le_u32(8));

        let mut entries: Vec<(u16, u16, u32, [u8; 4])> = vec![
            (256, 4, 1, le_u32(1)),
            (257, 4, 1, le_u32(1)),
            (258, 3, 1, [8, 0, 0, 0]),
            (262, 3, 1, [0, 0, 0, 0]),
            (273, 4, 1, le_u32(0)), // StripOffsets, patched below
            (279, 4, 1, le_u32(1)),
            (0x8769, 4, 1, le_u32(0)), // ExifDirectory, patched below
        ];
        let ifd0_size = 2 + entries.len() * 12 + 4;
        let strip_offset = 8 + ifd0_size as u32;
        let exif_ifd_offset = strip_offset + 1;
        entries[4].3 = le_u32(strip_offset);
        entries[6].3 = le_u32(exif_ifd_offset);

        buf.extend_from_slice(&le_u16(entries.len() as u16));
        for (tag, ty, count, val) in &entries {
            buf.extend_from_slice(&le_u16(*tag));
            buf.extend_from_slice(&le_u16(*ty));
            buf.extend_from_slice(&le_u32(*count));
            buf.extend_from_slice(val);
        }
        buf.extend_from_slice(&le_u32(0)); // no next IFD
        buf.push(0x2A); // the strip's single pixel sample

        // The sub-IFD: one unrecognized-tag SHORT entry, no further nesting.
        let exif_entries: Vec<(u16, u16, u32, [u8; 4])> = vec![(0xA000, 3, 1, [7, 0, 0, 0])];
        buf.extend_from_slice(&le_u16(exif_entries.len() as u16));
        for (tag, ty, count, val) in &exif_entries {
            buf.extend_from_slice(&le_u16(*tag));
            buf.extend_from_slice(&le_u16(*ty));
            buf.extend_from_slice(&le_u32(*count));
            buf.extend_from_slice(val);
        }
        buf.extend_from_slice(&le_u32(0));

        let mut decoder = Decoder::new(Cursor::new(buf)).unwrap();
        assert!(!decoder.more_images());
        let exif = decoder.sub_directory(Tag::ExifDirectory).unwrap();
        assert_eq!(exif.len(), 1);
    }

    #[test]
    fn rejects_bigtiff_magic() {
        let mut data = Vec::new();
        data.extend_from_slice(b"II");
        data.extend_from_slice(&le_u16(43));
        data.extend_from_slice(&[0u8; 4]);
        assert!(Decoder::new(Cursor::new(data)).is_err());
    }
}
