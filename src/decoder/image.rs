//! The raster assembler: strip/tile geometry, the codec/predictor/
//! photometric pipeline, and destination pixel layout selection.
//!
//! This is the component that ties every other decoder submodule together:
//! given one directory's tags it derives an [`ImageDescriptor`], then
//! [`ImageDescriptor::decode`] walks the tile grid in row-major order,
//! seeking to each chunk, running it through the codec registry
//! (`super::codec`), reversing the predictor (`super::predictor`), and
//! normalizing photometric interpretation (`super::photometric`,
//! `super::ycbcr`) before blitting into the destination raster.

use std::cell::Cell;
use std::io::Read;

use crate::decoder::ifd::Value;
use crate::decoder::stream::{ByteOrder, EndianReader};
use crate::decoder::{codec, jpeg, photometric, predictor, ycbcr};
use crate::decoder::{ChunkType, DecodingBuffer, DecodingResult, Limits};
use crate::directory::Directory;
use crate::tags::{
    CompressionMethod, PhotometricInterpretation, PlanarConfiguration, Predictor, SampleFormat,
    Tag,
};
use crate::{ColorType, TiffError, TiffFormatError, TiffResult, TiffUnsupportedError};

/// The unified strip/tile geometry of §4.2: strips are modeled as tiles of
/// width `ImageWidth` and height `RowsPerStrip`.
#[derive(Debug, Clone)]
pub(crate) struct Geometry {
    pub tile_width: u32,
    pub tile_height: u32,
    pub tiles_across: u32,
    pub tiles_down: u32,
    pub offsets: Vec<u64>,
    pub byte_counts: Vec<u64>,
}

impl Geometry {
    fn tiles_per_plane(&self) -> u32 {
        self.tiles_across * self.tiles_down
    }

    /// The valid (unpadded) pixel region covered by tile `index`, within one plane.
    fn tile_rect(&self, index: u32, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let tx = index % self.tiles_across;
        let ty = index / self.tiles_across;
        let col = tx * self.tile_width;
        let row = ty * self.tile_height;
        let cols = self.tile_width.min(width - col);
        let rows = self.tile_height.min(height - row);
        (col, row, cols, rows)
    }

    fn resolve<R: Read + std::io::Seek>(
        dir: &Directory,
        width: u32,
        height: u32,
        limits: &Limits,
        reader: &mut EndianReader<R>,
        warnings: &mut Vec<String>,
    ) -> TiffResult<(Self, ChunkType)> {
        let has_tile_tags = dir.contains(Tag::TileWidth) && dir.contains(Tag::TileOffsets);
        let has_strip_tags = dir.contains(Tag::StripOffsets);

        if has_tile_tags && has_strip_tags {
            warnings.push(
                "both strip and tile tags present; tile tags take precedence".to_string(),
            );
        }

        if has_tile_tags {
            let tile_width = dir.require_tag(Tag::TileWidth, limits, reader)?.into_u32()?;
            let tile_height = dir
                .require_tag(Tag::TileLength, limits, reader)?
                .into_u32()?;
            if tile_width == 0 || tile_height == 0 {
                return Err(TiffFormatError::InvalidDimensions(tile_width, tile_height).into());
            }
            let offsets = dir
                .require_tag(Tag::TileOffsets, limits, reader)?
                .into_u64_vec()?;
            let byte_counts = match dir.find_tag(Tag::TileByteCounts, limits, reader)? {
                Some(v) => v.into_u64_vec()?,
                None => {
                    warnings.push("missing TileByteCounts".to_string());
                    Vec::new()
                }
            };
            let tiles_across = width.div_ceil(tile_width);
            let tiles_down = height.div_ceil(tile_height);
            Ok((
                Geometry {
                    tile_width,
                    tile_height,
                    tiles_across,
                    tiles_down,
                    offsets,
                    byte_counts,
                },
                ChunkType::Tile,
            ))
        } else if has_strip_tags {
            let rows_per_strip = match dir.find_tag(Tag::RowsPerStrip, limits, reader)? {
                Some(v) => v.into_u32()?,
                None => height.max(1),
            }
            .max(1);
            let offsets = dir
                .require_tag(Tag::StripOffsets, limits, reader)?
                .into_u64_vec()?;
            let byte_counts = match dir.find_tag(Tag::StripByteCounts, limits, reader)? {
                Some(v) => v.into_u64_vec()?,
                None => {
                    warnings.push("missing StripByteCounts".to_string());
                    Vec::new()
                }
            };
            let tiles_across = 1;
            let tiles_down = height.div_ceil(rows_per_strip);
            Ok((
                Geometry {
                    tile_width: width,
                    tile_height: rows_per_strip,
                    tiles_across,
                    tiles_down,
                    offsets,
                    byte_counts,
                },
                ChunkType::Strip,
            ))
        } else {
            Err(TiffFormatError::RequiredTagNotFound(Tag::StripOffsets).into())
        }
    }
}

/// Everything the raster assembler needs from one image's directory, derived
/// once up front rather than re-read per tile.
#[derive(Debug)]
pub(crate) struct ImageDescriptor {
    pub width: u32,
    pub height: u32,
    pub bits_per_sample: u8,
    pub samples_per_pixel: u8,
    pub extra_samples: Vec<u16>,
    pub photometric: PhotometricInterpretation,
    pub compression: CompressionMethod,
    pub predictor: Predictor,
    pub planar_config: PlanarConfiguration,
    pub sample_format: SampleFormat,
    pub color_map: Option<Vec<u16>>,
    pub ycbcr_subsampling: (u16, u16),
    pub ycbcr_coefficients: ycbcr::Coefficients,
    pub jpeg_proc: u16,
    pub jpeg_tables: Option<Vec<u8>>,
    pub jpeg_interchange: Option<(u64, Option<u64>)>,
    pub jpeg_old_tables: Option<OldStyleJpegTables>,
    pub chunk_type: ChunkType,
    pub geometry: Geometry,
}

/// Offsets to the scattered per-component tables of an old-style
/// (compression = 6) JPEG image that has no `JPEGInterchangeFormat`.
#[derive(Debug, Clone, Default)]
pub(crate) struct OldStyleJpegTables {
    pub q_offsets: Vec<u64>,
    pub dc_offsets: Vec<u64>,
    pub ac_offsets: Vec<u64>,
}

impl ImageDescriptor {
    pub fn from_directory<R: Read + std::io::Seek>(
        dir: &Directory,
        limits: &Limits,
        reader: &mut EndianReader<R>,
        warnings: &mut Vec<String>,
    ) -> TiffResult<Self> {
        let width = dir.require_tag(Tag::ImageWidth, limits, reader)?.into_u32()?;
        let height = dir
            .require_tag(Tag::ImageLength, limits, reader)?
            .into_u32()?;

        let samples_per_pixel = match dir.find_tag(Tag::SamplesPerPixel, limits, reader)? {
            Some(v) => v.into_u32()?,
            None => 1,
        };
        let samples_per_pixel =
            u8::try_from(samples_per_pixel).map_err(|_| TiffError::IntSizeError)?;
        if samples_per_pixel == 0 {
            return Err(TiffFormatError::SamplesPerPixelIsZero.into());
        }

        let bits_per_sample_vec = match dir.find_tag(Tag::BitsPerSample, limits, reader)? {
            Some(v) => v
                .into_u32_vec()?
                .into_iter()
                .map(|b| u8::try_from(b).map_err(|_| TiffError::IntSizeError))
                .collect::<TiffResult<Vec<u8>>>()?,
            None => vec![1],
        };
        let bits_per_sample = bits_per_sample_vec[0];
        if bits_per_sample_vec.iter().any(|&b| b != bits_per_sample) {
            return Err(
                TiffUnsupportedError::InconsistentBitsPerSample(bits_per_sample_vec).into(),
            );
        }

        let compression = match dir.find_tag(Tag::Compression, limits, reader)? {
            Some(v) => CompressionMethod::from_u16_exhaustive(v.into_u16()?),
            None => CompressionMethod::None,
        };

        let photometric_raw = dir
            .require_tag(Tag::PhotometricInterpretation, limits, reader)?
            .into_u16()?;
        let photometric = PhotometricInterpretation::from_u16(photometric_raw)
            .ok_or(TiffUnsupportedError::UnknownInterpretation)?;

        let predictor = match dir.find_tag(Tag::Predictor, limits, reader)? {
            Some(v) => {
                let raw = v.into_u16()?;
                Predictor::from_u16(raw)
                    .ok_or(TiffFormatError::UnknownPredictor(raw))?
            }
            None => Predictor::None,
        };

        let planar_config = match dir.find_tag(Tag::PlanarConfiguration, limits, reader)? {
            Some(v) => {
                let raw = v.into_u16()?;
                PlanarConfiguration::from_u16(raw)
                    .ok_or(TiffFormatError::UnknownPlanarConfiguration(raw))?
            }
            None => PlanarConfiguration::Chunky,
        };

        let sample_format = match dir.find_tag(Tag::SampleFormat, limits, reader)? {
            Some(v) => {
                let formats = v.into_u16_vec()?;
                let first = SampleFormat::from_u16_exhaustive(formats[0]);
                if formats.iter().any(|&f| f != formats[0]) {
                    return Err(TiffFormatError::InconsistentSizesEncountered.into());
                }
                first
            }
            None => SampleFormat::Uint,
        };
        if sample_format != SampleFormat::Uint {
            return Err(TiffUnsupportedError::UnsupportedSampleFormat.into());
        }

        let extra_samples = match dir.find_tag(Tag::ExtraSamples, limits, reader)? {
            Some(v) => v.into_u16_vec()?,
            None => Vec::new(),
        };

        let color_map = match photometric {
            PhotometricInterpretation::RGBPalette => Some(
                dir.require_tag(Tag::ColorMap, limits, reader)?
                    .into_u16_vec()?,
            ),
            _ => None,
        };

        let ycbcr_subsampling = match dir.find_tag(Tag::YCbCrSubSampling, limits, reader)? {
            Some(v) => {
                let vals = v.into_u16_vec()?;
                (vals[0], *vals.get(1).unwrap_or(&vals[0]))
            }
            None => (2, 2),
        };
        let ycbcr_coefficients = match dir.find_tag(Tag::YCbCrCoefficients, limits, reader)? {
            Some(Value::List(vals)) if vals.len() == 3 => {
                let mut it = vals.into_iter();
                (
                    it.next().unwrap().into_f32()?,
                    it.next().unwrap().into_f32()?,
                    it.next().unwrap().into_f32()?,
                )
            }
            _ => ycbcr::CCIR_601_1,
        };

        let jpeg_proc = match dir.find_tag(Tag::JPEGProc, limits, reader)? {
            Some(v) => v.into_u16()?,
            None => 1,
        };
        let jpeg_tables = if compression == CompressionMethod::ModernJPEG {
            match dir.find_tag(Tag::JPEGTables, limits, reader)? {
                Some(v) => Some(v.into_u8_vec()?),
                None => None,
            }
        } else {
            None
        };
        let jpeg_interchange = if compression == CompressionMethod::JPEG {
            match dir.find_tag(Tag::JPEGInterchangeFormat, limits, reader)? {
                Some(v) => {
                    let offset = v.into_u64()?;
                    let length = dir
                        .find_tag(Tag::JPEGInterchangeFormatLength, limits, reader)?
                        .map(Value::into_u64)
                        .transpose()?;
                    Some((offset, length))
                }
                None => None,
            }
        } else {
            None
        };
        let jpeg_old_tables = if compression == CompressionMethod::JPEG && jpeg_interchange.is_none()
        {
            Some(OldStyleJpegTables {
                q_offsets: match dir.find_tag(Tag::JPEGQTables, limits, reader)? {
                    Some(v) => v.into_u64_vec()?,
                    None => Vec::new(),
                },
                dc_offsets: match dir.find_tag(Tag::JPEGDCTables, limits, reader)? {
                    Some(v) => v.into_u64_vec()?,
                    None => Vec::new(),
                },
                ac_offsets: match dir.find_tag(Tag::JPEGACTables, limits, reader)? {
                    Some(v) => v.into_u64_vec()?,
                    None => Vec::new(),
                },
            })
        } else {
            None
        };

        let (geometry, chunk_type) =
            Geometry::resolve(dir, width, height, limits, reader, warnings)?;

        Ok(Self {
            width,
            height,
            bits_per_sample,
            samples_per_pixel,
            extra_samples,
            photometric,
            compression,
            predictor,
            planar_config,
            sample_format,
            color_map,
            ycbcr_subsampling,
            ycbcr_coefficients,
            jpeg_proc,
            jpeg_tables,
            jpeg_interchange,
            jpeg_old_tables,
            chunk_type,
            geometry,
        })
    }

    /// The destination pixel layout (§4.11), already reflecting photometric
    /// normalization: a palette image normalizes to `RGB(8)`, a YCbCr image
    /// (whether JPEG- or stream-compressed) normalizes to `RGB(8)`.
    pub fn destination_color_type(&self) -> TiffResult<ColorType> {
        let extra = self.extra_samples.first().copied();
        match self.photometric {
            PhotometricInterpretation::WhiteIsZero | PhotometricInterpretation::BlackIsZero => {
                match extra {
                    None => Ok(ColorType::Gray(self.bits_per_sample)),
                    Some(_) => Ok(ColorType::GrayA(self.bits_per_sample)),
                }
            }
            PhotometricInterpretation::RGB => match (self.samples_per_pixel, extra) {
                (3, None) => Ok(ColorType::RGB(self.bits_per_sample)),
                (4, Some(_)) => Ok(ColorType::RGBA(self.bits_per_sample)),
                _ => Err(TiffUnsupportedError::UnsupportedColorType(ColorType::RGB(
                    self.bits_per_sample,
                ))
                .into()),
            },
            PhotometricInterpretation::RGBPalette => Ok(ColorType::RGB(8)),
            PhotometricInterpretation::CMYK => match (self.samples_per_pixel, extra) {
                (4, None) => Ok(ColorType::CMYK(self.bits_per_sample)),
                (5, Some(_)) => Ok(ColorType::CMYKA(self.bits_per_sample)),
                _ => Err(TiffUnsupportedError::UnsupportedColorType(ColorType::CMYK(
                    self.bits_per_sample,
                ))
                .into()),
            },
            PhotometricInterpretation::YCbCr => Ok(ColorType::RGB(8)),
            other => Err(TiffUnsupportedError::UnsupportedPhotometric(other).into()),
        }
    }

    /// The raw, pre-normalization pixel layout, for `Decoder::raw_image_type`.
    pub fn raw_color_type(&self) -> ColorType {
        match self.photometric {
            PhotometricInterpretation::RGBPalette => ColorType::Palette(self.bits_per_sample),
            PhotometricInterpretation::YCbCr => ColorType::YCbCr(self.bits_per_sample),
            _ => self
                .destination_color_type()
                .unwrap_or(ColorType::Gray(self.bits_per_sample)),
        }
    }

    fn row_stride_bytes(&self, cols: u32, bits_per_sample: u32, samples: u32) -> usize {
        ((cols as u64) * samples as u64 * bits_per_sample as u64).div_ceil(8) as usize
    }

    /// Runs the full pipeline (§4.10) and returns the assembled raster plus
    /// the destination color type it was written in.
    pub fn decode<R: Read + std::io::Seek>(
        &self,
        reader: &mut EndianReader<R>,
        limits: &Limits,
        cancelled: &Cell<bool>,
        warnings: &mut Vec<String>,
    ) -> TiffResult<(DecodingResult, ColorType)> {
        if self.predictor == Predictor::FloatingPoint {
            return Err(TiffUnsupportedError::FloatingPointPredictor(
                self.destination_color_type()?,
            )
            .into());
        }

        let dest_color = self.destination_color_type()?;
        let out_samples = dest_color.samples() as usize;
        let out_bits = dest_color.bit_depth();
        let pixel_count = (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|n| n.checked_mul(out_samples))
            .ok_or(TiffError::LimitsExceeded)?;

        if pixel_count * (out_bits as usize).div_ceil(8) > limits.decoding_buffer_size {
            return Err(TiffError::LimitsExceeded);
        }

        let mut result = match out_bits {
            n if n <= 8 => DecodingResult::U8(vec![0u8; pixel_count]),
            n if n <= 16 => DecodingResult::U16(vec![0u16; pixel_count]),
            _ => DecodingResult::U32(vec![0u32; pixel_count]),
        };

        if self.width == 0 || self.height == 0 {
            return Ok((result, dest_color));
        }

        match self.compression {
            CompressionMethod::JPEG => {
                self.decode_old_jpeg(reader, &mut result, out_samples, cancelled)?;
            }
            CompressionMethod::ModernJPEG => {
                self.decode_new_jpeg(reader, &mut result, out_samples, cancelled)?;
            }
            _ if self.photometric == PhotometricInterpretation::YCbCr => {
                self.decode_ycbcr_stream(reader, &mut result, out_samples, cancelled)?;
            }
            _ if self.photometric == PhotometricInterpretation::RGBPalette => {
                self.decode_palette_stream(reader, &mut result, out_samples, cancelled)?;
            }
            _ => {
                self.decode_generic_stream(reader, &mut result, out_samples, cancelled)?;
            }
        }

        let _ = warnings;
        Ok((result, dest_color))
    }

    fn chunk_compressed_length(&self, index: usize, exact: u64) -> Option<u64> {
        if index < self.geometry.byte_counts.len() {
            Some(self.geometry.byte_counts[index])
        } else if self.compression == CompressionMethod::None {
            Some(exact)
        } else {
            None
        }
    }

    /// The generic path: WhiteIsZero / BlackIsZero / RGB / CMYK, any planar
    /// configuration, predictor reversal, bit depths 8/16/32.
    fn decode_generic_stream<R: Read + std::io::Seek>(
        &self,
        reader: &mut EndianReader<R>,
        result: &mut DecodingResult,
        out_samples: usize,
        cancelled: &Cell<bool>,
    ) -> TiffResult<()> {
        let planes = match self.planar_config {
            PlanarConfiguration::Chunky => 1,
            PlanarConfiguration::Planar => self.samples_per_pixel as u32,
        };
        let tiles_per_plane = self.geometry.tiles_per_plane();
        let predictor_samples = match self.planar_config {
            PlanarConfiguration::Chunky => self.samples_per_pixel as usize,
            PlanarConfiguration::Planar => 1,
        };

        for plane in 0..planes {
            // Under `Planar`, each plane holds a single band's samples with no
            // interleaving to skip via stride; an extra-samples (alpha) plane
            // must be left untouched rather than inverted like a photometric
            // channel.
            let plane_is_extra_sample = self.planar_config == PlanarConfiguration::Planar
                && plane >= planes - self.extra_samples.len() as u32;

            for tile in 0..tiles_per_plane {
                if cancelled.get() {
                    return Ok(());
                }
                let chunk_index = (plane * tiles_per_plane + tile) as usize;
                let (col, row, cols, rows) =
                    self.geometry.tile_rect(tile, self.width, self.height);

                let exact = self.row_stride_bytes(
                    self.geometry.tile_width,
                    self.bits_per_sample as u32,
                    predictor_samples as u32,
                ) as u64
                    * self.geometry.tile_height as u64;
                let compressed_len = self.chunk_compressed_length(chunk_index, exact);

                let offset = *self
                    .geometry
                    .offsets
                    .get(chunk_index)
                    .ok_or(TiffFormatError::InconsistentSizesEncountered)?;
                reader.goto_offset(offset)?;

                let codec_reader = codec::new_reader(
                    self.compression,
                    &mut *reader.inner(),
                    compressed_len.unwrap_or(u64::MAX),
                )?;
                let mut sample_reader = EndianReader::new(codec_reader, reader.byte_order);

                // Inversion only ever touches the photometric channels; an
                // interleaved alpha sample (ExtraSamples) must pass through
                // untouched, so skip it via the stride.
                let invert_stride = if self.extra_samples.is_empty() {
                    1
                } else {
                    predictor_samples
                };

                for j in 0..self.geometry.tile_height {
                    let mut row_buf = read_row(
                        &mut sample_reader,
                        (self.geometry.tile_width as usize) * predictor_samples,
                        self.bits_per_sample,
                    )?;

                    if self.predictor == Predictor::Horizontal {
                        predictor::rev_hpredict(row_buf.as_decoding_buffer(), predictor_samples);
                    }

                    if self.photometric == PhotometricInterpretation::WhiteIsZero
                        && !plane_is_extra_sample
                    {
                        photometric::invert_white_is_zero(
                            row_buf.as_decoding_buffer(),
                            self.bits_per_sample,
                            invert_stride,
                        );
                    }

                    if j < rows {
                        self.blit_row(
                            result,
                            &row_buf,
                            col,
                            row + j,
                            cols,
                            out_samples,
                            plane as usize,
                            predictor_samples,
                        );
                    }
                }
            }
        }
        Ok(())
    }

    fn decode_palette_stream<R: Read + std::io::Seek>(
        &self,
        reader: &mut EndianReader<R>,
        result: &mut DecodingResult,
        out_samples: usize,
        cancelled: &Cell<bool>,
    ) -> TiffResult<()> {
        let color_map = self
            .color_map
            .as_ref()
            .ok_or(TiffFormatError::RequiredTagNotFound(Tag::ColorMap))?;
        let tiles = self.geometry.tiles_per_plane();

        for tile in 0..tiles {
            if cancelled.get() {
                return Ok(());
            }
            let (col, row, cols, rows) = self.geometry.tile_rect(tile, self.width, self.height);
            let exact =
                self.row_stride_bytes(self.geometry.tile_width, self.bits_per_sample as u32, 1)
                    as u64
                    * self.geometry.tile_height as u64;
            let compressed_len = self.chunk_compressed_length(tile as usize, exact);
            let offset = *self
                .geometry
                .offsets
                .get(tile as usize)
                .ok_or(TiffFormatError::InconsistentSizesEncountered)?;
            reader.goto_offset(offset)?;
            let codec_reader = codec::new_reader(
                self.compression,
                &mut *reader.inner(),
                compressed_len.unwrap_or(u64::MAX),
            )?;
            let mut sample_reader = EndianReader::new(codec_reader, reader.byte_order);

            for j in 0..self.geometry.tile_height {
                let indices = read_indices(
                    &mut sample_reader,
                    self.geometry.tile_width as usize,
                    self.bits_per_sample,
                )?;
                if j >= rows {
                    continue;
                }
                let rgb = photometric::expand_palette(&indices[..cols as usize], color_map);
                if let DecodingResult::U8(buf) = result {
                    let dst_row = (row + j) as usize;
                    let dst_start = (dst_row * self.width as usize + col as usize) * out_samples;
                    buf[dst_start..dst_start + rgb.len()].copy_from_slice(&rgb);
                }
            }
        }
        Ok(())
    }

    fn decode_ycbcr_stream<R: Read + std::io::Seek>(
        &self,
        reader: &mut EndianReader<R>,
        result: &mut DecodingResult,
        out_samples: usize,
        cancelled: &Cell<bool>,
    ) -> TiffResult<()> {
        let (sh, sv) = self.ycbcr_subsampling;
        let tiles = self.geometry.tiles_per_plane();

        for tile in 0..tiles {
            if cancelled.get() {
                return Ok(());
            }
            let (col, row, cols, rows) = self.geometry.tile_rect(tile, self.width, self.height);

            let blocks_across = (self.geometry.tile_width as usize).div_ceil(sh as usize);
            let blocks_down = (self.geometry.tile_height as usize).div_ceil(sv as usize);
            let exact =
                (blocks_across * blocks_down * (sh as usize * sv as usize + 2)) as u64;
            let compressed_len = self.chunk_compressed_length(tile as usize, exact);
            let offset = *self
                .geometry
                .offsets
                .get(tile as usize)
                .ok_or(TiffFormatError::InconsistentSizesEncountered)?;
            reader.goto_offset(offset)?;
            let mut codec_reader = codec::new_reader(
                self.compression,
                &mut *reader.inner(),
                compressed_len.unwrap_or(u64::MAX),
            )?;

            let mut packed = vec![0u8; exact as usize];
            codec_reader
                .read_exact(&mut packed)
                .map_err(|_| TiffFormatError::UnexpectedCompressedData {
                    actual_bytes: 0,
                    required_bytes: exact as usize,
                })?;

            let rgb = ycbcr::upsample_tile(
                &packed,
                self.geometry.tile_width as usize,
                self.geometry.tile_height as usize,
                (sh, sv),
                self.ycbcr_coefficients,
            );

            if let DecodingResult::U8(buf) = result {
                for j in 0..rows {
                    let src_start = ((j as usize) * self.geometry.tile_width as usize) * 3;
                    let src_row = &rgb[src_start..src_start + cols as usize * 3];
                    let dst_row = (row + j) as usize;
                    let dst_start = (dst_row * self.width as usize + col as usize) * out_samples;
                    buf[dst_start..dst_start + src_row.len()].copy_from_slice(src_row);
                }
            }
        }
        Ok(())
    }

    #[cfg(feature = "jpeg")]
    fn decode_old_jpeg<R: Read + std::io::Seek>(
        &self,
        reader: &mut EndianReader<R>,
        result: &mut DecodingResult,
        out_samples: usize,
        cancelled: &Cell<bool>,
    ) -> TiffResult<()> {
        jpeg::check_baseline(self.jpeg_proc)?;
        if !matches!(
            self.photometric,
            PhotometricInterpretation::YCbCr
                | PhotometricInterpretation::RGB
                | PhotometricInterpretation::BlackIsZero
        ) {
            return Err(TiffUnsupportedError::UnsupportedPhotometric(self.photometric).into());
        }

        // A self-contained JFIF stream (JPEGInterchangeFormat present) covers
        // the whole image in one go, regardless of how many strips/tiles the
        // directory otherwise describes.
        if let Some((offset, length)) = self.jpeg_interchange {
            reader.goto_offset(offset)?;
            let body = read_chunk_body(reader, length)?;
            let (pixels, jw, jh, _components) = jpeg::decode_jfif(&body)?;
            self.blit_jpeg_tile(
                result,
                &pixels,
                jw as usize,
                0,
                0,
                self.width.min(jw as u32),
                self.height.min(jh as u32),
                out_samples,
            );
            return Ok(());
        }

        let tables = self
            .jpeg_old_tables
            .as_ref()
            .ok_or(TiffFormatError::RequiredTagNotFound(Tag::JPEGQTables))?;
        let q_tables = jpeg::read_q_tables(reader, &tables.q_offsets)?;
        let dc_tables = jpeg::read_huffman_tables(reader, &tables.dc_offsets)?;
        let ac_tables = jpeg::read_huffman_tables(reader, &tables.ac_offsets)?;

        let tiles = self.geometry.tiles_per_plane();
        for tile in 0..tiles {
            if cancelled.get() {
                return Ok(());
            }
            let (col, row, cols, rows) = self.geometry.tile_rect(tile, self.width, self.height);
            let offset = self.geometry.offsets[tile as usize];
            let length = self.geometry.byte_counts.get(tile as usize).copied();
            reader.goto_offset(offset)?;
            let body = read_chunk_body(reader, length)?;

            let jfif = jpeg::synthesize_jfif(
                self.geometry.tile_width as u16,
                self.geometry.tile_height as u16,
                self.samples_per_pixel,
                &q_tables,
                &dc_tables,
                &ac_tables,
                &body,
            )?;
            let (pixels, jw, _jh, _components) = jpeg::decode_jfif(&jfif)?;
            self.blit_jpeg_tile(result, &pixels, jw as usize, col, row, cols, rows, out_samples);
        }
        Ok(())
    }

    #[cfg(not(feature = "jpeg"))]
    fn decode_old_jpeg<R: Read + std::io::Seek>(
        &self,
        _reader: &mut EndianReader<R>,
        _result: &mut DecodingResult,
        _out_samples: usize,
        _cancelled: &Cell<bool>,
    ) -> TiffResult<()> {
        Err(TiffUnsupportedError::UnsupportedCompressionMethod(self.compression).into())
    }

    #[cfg(feature = "jpeg")]
    fn decode_new_jpeg<R: Read + std::io::Seek>(
        &self,
        reader: &mut EndianReader<R>,
        result: &mut DecodingResult,
        out_samples: usize,
        cancelled: &Cell<bool>,
    ) -> TiffResult<()> {
        if !matches!(
            self.photometric,
            PhotometricInterpretation::YCbCr
                | PhotometricInterpretation::RGB
                | PhotometricInterpretation::BlackIsZero
        ) {
            return Err(TiffUnsupportedError::UnsupportedPhotometric(self.photometric).into());
        }
        let tables = self.jpeg_tables.as_deref().unwrap_or(&[]);
        let tiles = self.geometry.tiles_per_plane();

        for tile in 0..tiles {
            if cancelled.get() {
                return Ok(());
            }
            let (col, row, cols, rows) = self.geometry.tile_rect(tile, self.width, self.height);
            let offset = self.geometry.offsets[tile as usize];
            let length = self.geometry.byte_counts.get(tile as usize).copied();
            reader.goto_offset(offset)?;
            let body = read_chunk_body(reader, length)?;
            let spliced = jpeg::splice_tables(tables, &body);
            let (pixels, jw, _jh, _components) = jpeg::decode_jfif(&spliced)?;
            self.blit_jpeg_tile(result, &pixels, jw as usize, col, row, cols, rows, out_samples);
        }
        Ok(())
    }

    #[cfg(not(feature = "jpeg"))]
    fn decode_new_jpeg<R: Read + std::io::Seek>(
        &self,
        _reader: &mut EndianReader<R>,
        _result: &mut DecodingResult,
        _out_samples: usize,
        _cancelled: &Cell<bool>,
    ) -> TiffResult<()> {
        Err(TiffUnsupportedError::UnsupportedCompressionMethod(self.compression).into())
    }

    /// Copies a decoded JPEG tile's interleaved samples into the raster,
    /// clipping to the tile's valid (unpadded) region.
    #[cfg(feature = "jpeg")]
    #[allow(clippy::too_many_arguments)]
    fn blit_jpeg_tile(
        &self,
        result: &mut DecodingResult,
        pixels: &[u8],
        src_width: usize,
        col: u32,
        row: u32,
        cols: u32,
        rows: u32,
        out_samples: usize,
    ) {
        if let DecodingResult::U8(buf) = result {
            for j in 0..rows as usize {
                let src_start = j * src_width * out_samples;
                let src = &pixels[src_start..src_start + cols as usize * out_samples];
                let dst_row = row as usize + j;
                let dst_start = (dst_row * self.width as usize + col as usize) * out_samples;
                buf[dst_start..dst_start + src.len()].copy_from_slice(src);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn blit_row(
        &self,
        result: &mut DecodingResult,
        row: &Row,
        col: u32,
        dest_row: u32,
        cols: u32,
        out_samples: usize,
        plane: usize,
        predictor_samples: usize,
    ) {
        let width = self.width as usize;
        let dest_row = dest_row as usize;
        let col = col as usize;
        let cols = cols as usize;

        macro_rules! blit {
            ($variant:ident, $buf:ident) => {
                if let DecodingResult::$variant(buf) = result {
                    for x in 0..cols {
                        for s in 0..predictor_samples {
                            let dst_idx =
                                (dest_row * width + col + x) * out_samples + plane + s;
                            let src_idx = x * predictor_samples + s;
                            buf[dst_idx] = $buf[src_idx];
                        }
                    }
                }
            };
        }

        match row {
            Row::U8(buf) => blit!(U8, buf),
            Row::U16(buf) => blit!(U16, buf),
            Row::U32(buf) => blit!(U32, buf),
        }
    }
}

#[cfg(feature = "jpeg")]
fn read_chunk_body<R: Read + std::io::Seek>(
    reader: &mut EndianReader<R>,
    length: Option<u64>,
) -> TiffResult<Vec<u8>> {
    Ok(match length {
        Some(len) => {
            let mut buf = vec![0u8; len as usize];
            reader.inner().read_exact(&mut buf)?;
            buf
        }
        None => {
            let mut buf = Vec::new();
            reader.inner().read_to_end(&mut buf)?;
            buf
        }
    })
}

enum Row {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl Row {
    fn as_decoding_buffer(&mut self) -> DecodingBuffer<'_> {
        match self {
            Row::U8(buf) => DecodingBuffer::U8(buf),
            Row::U16(buf) => DecodingBuffer::U16(buf),
            Row::U32(buf) => DecodingBuffer::U32(buf),
        }
    }
}

/// Reads `count` samples of `bits_per_sample` width (8/16/32) from the
/// already-decompressed, byte-order-aware stream.
fn read_row<R: Read>(reader: &mut EndianReader<R>, count: usize, bits_per_sample: u8) -> TiffResult<Row> {
    Ok(match bits_per_sample {
        n if n <= 8 => {
            let mut buf = vec![0u8; count];
            reader.inner().read_exact(&mut buf)?;
            Row::U8(buf)
        }
        n if n <= 16 => {
            let mut buf = vec![0u16; count];
            for v in buf.iter_mut() {
                *v = reader.read_u16()?;
            }
            Row::U16(buf)
        }
        _ => {
            let mut buf = vec![0u32; count];
            for v in buf.iter_mut() {
                *v = reader.read_u32()?;
            }
            Row::U32(buf)
        }
    })
}

/// Reads `count` palette indices, unpacking sub-byte (1/2/4-bit) widths
/// MSB-first within each byte.
fn read_indices<R: Read>(
    reader: &mut EndianReader<R>,
    count: usize,
    bits_per_sample: u8,
) -> TiffResult<Vec<u32>> {
    match bits_per_sample {
        8 => {
            let mut buf = vec![0u8; count];
            reader.inner().read_exact(&mut buf)?;
            Ok(buf.into_iter().map(u32::from).collect())
        }
        16 => {
            let mut out = Vec::with_capacity(count);
            for _ in 0..count {
                out.push(u32::from(reader.read_u16()?));
            }
            Ok(out)
        }
        1 | 2 | 4 => {
            let per_byte = 8 / bits_per_sample as usize;
            let packed_len = count.div_ceil(per_byte);
            let mut packed = vec![0u8; packed_len];
            reader.inner().read_exact(&mut packed)?;
            let mask = (1u16 << bits_per_sample) - 1;
            let mut out = Vec::with_capacity(count);
            for i in 0..count {
                let byte = packed[i / per_byte];
                let shift = 8 - bits_per_sample as usize * (i % per_byte + 1);
                out.push(u32::from((byte >> shift) as u16 & mask));
            }
            Ok(out)
        }
        _ => Err(TiffFormatError::InvalidTag.into()),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tags::IfdPointer;
    use std::io::Cursor;

    fn reader_from(bytes: &[u8]) -> EndianReader<Cursor<Vec<u8>>> {
        EndianReader::new(Cursor::new(bytes.to_vec()), ByteOrder::LittleEndian)
    }

    #[test]
    fn geometry_resolves_strips_as_full_width_tiles() {
        let mut dir = Directory::new();
        dir.insert(
            Tag::StripOffsets,
            crate::decoder::ifd::Entry::new(crate::tags::Type::LONG, 1, 8u32.to_le_bytes()),
        );
        let limits = Limits::default();
        let mut reader = reader_from(&[0u8; 16]);
        let mut warnings = Vec::new();
        let (geom, chunk_type) =
            Geometry::resolve(&dir, 4, 10, &limits, &mut reader, &mut warnings).unwrap();
        assert_eq!(chunk_type, ChunkType::Strip);
        assert_eq!(geom.tile_width, 4);
        assert_eq!(geom.tile_height, 10);
        assert_eq!(geom.tiles_across, 1);
        assert_eq!(geom.tiles_down, 1);
        assert!(warnings.is_empty());
    }

    #[test]
    fn tile_rect_clips_edge_tiles() {
        let geom = Geometry {
            tile_width: 4,
            tile_height: 4,
            tiles_across: 2,
            tiles_down: 2,
            offsets: vec![0, 0, 0, 0],
            byte_counts: vec![16, 16, 16, 16],
        };
        // 6x6 image tiled in 4x4 blocks: bottom-right tile is clipped to 2x2.
        let (col, row, cols, rows) = geom.tile_rect(3, 6, 6);
        assert_eq!((col, row, cols, rows), (4, 4, 2, 2));
    }

    #[test]
    fn unpacks_2bit_indices_msb_first() {
        // 0b00_01_10_11 -> indices [0, 1, 2, 3]
        let mut reader = reader_from(&[0b0001_1011]);
        let indices = read_indices(&mut reader, 4, 2).unwrap();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn ifd_pointer_used_in_geometry_tests_is_distinct_type() {
        // Smoke test that IfdPointer remains a distinct newtype used elsewhere
        // in the IFD walker, not accidentally conflated with chunk offsets.
        assert_ne!(IfdPointer(0).0, 1);
    }
}
