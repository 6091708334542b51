use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;
use std::str;
use std::string;
#[cfg(feature = "jpeg")]
use std::sync::Arc;

use crate::decoder::ifd::Value;
use crate::decoder::ChunkType;
use crate::tags::{CompressionMethod, PhotometricInterpretation, PlanarConfiguration, Tag};
use crate::ColorType;

/// Tiff error kinds.
#[derive(Debug)]
pub enum TiffError {
    /// The image is not formatted properly.
    FormatError(TiffFormatError),

    /// The decoder does not support features required by the image.
    UnsupportedError(TiffUnsupportedError),

    /// An I/O error occurred while decoding the image.
    IoError(io::Error),

    /// The limits of the decoder were exceeded.
    LimitsExceeded,

    /// An integer conversion to or from a platform size failed, either due to
    /// limits of the platform size or limits of the format.
    IntSizeError,

    /// The image does not support the requested operation.
    UsageError(UsageError),
}

/// The image is not formatted properly.
///
/// This indicates that the encoder producing the image might behave
/// incorrectly, or that the input file has been corrupted.
///
/// The list of variants may grow to incorporate errors of future features.
/// Matching against this exhaustively is not covered by interface stability
/// guarantees.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum TiffFormatError {
    TiffSignatureNotFound,
    TiffSignatureInvalid,
    BigTiffUnsupported,
    ImageFileDirectoryNotFound,
    InconsistentSizesEncountered,
    UnexpectedCompressedData {
        actual_bytes: usize,
        required_bytes: usize,
    },
    InconsistentStripSamples {
        actual_samples: usize,
        required_samples: usize,
    },
    InvalidDimensions(u32, u32),
    InvalidTag,
    InvalidTagValueType(Tag),
    RequiredTagNotFound(Tag),
    RequiredTagEmpty(Tag),
    UnknownPredictor(u16),
    UnknownPlanarConfiguration(u16),
    ByteExpected(Value),
    UnsignedIntegerExpected(Value),
    SignedIntegerExpected(Value),
    Format(String),
    StripTileTagConflict,
    CycleInOffsets,
    SamplesPerPixelIsZero,
    #[cfg(feature = "jpeg")]
    JpegDecoder(JpegDecoderError),
}

impl fmt::Display for TiffFormatError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        use self::TiffFormatError::*;
        match *self {
            TiffSignatureNotFound => write!(fmt, "TIFF signature not found."),
            TiffSignatureInvalid => write!(fmt, "TIFF signature invalid."),
            BigTiffUnsupported => write!(fmt, "BigTIFF is not supported."),
            ImageFileDirectoryNotFound => write!(fmt, "Image file directory not found."),
            InconsistentSizesEncountered => write!(fmt, "Inconsistent sizes encountered."),
            UnexpectedCompressedData {
                actual_bytes,
                required_bytes,
            } => write!(
                fmt,
                "Decompression returned different amount of bytes than expected: got {}, expected {}.",
                actual_bytes, required_bytes
            ),
            InconsistentStripSamples {
                actual_samples,
                required_samples,
            } => write!(
                fmt,
                "Inconsistent elements in strip: got {}, expected {}.",
                actual_samples, required_samples
            ),
            InvalidDimensions(width, height) => {
                write!(fmt, "Invalid dimensions: {}x{}.", width, height)
            }
            InvalidTag => write!(fmt, "Image contains invalid tag."),
            InvalidTagValueType(ref tag) => {
                write!(fmt, "Tag `{:?}` did not have the expected value type.", tag)
            }
            RequiredTagNotFound(ref tag) => write!(fmt, "Required tag `{:?}` not found.", tag),
            RequiredTagEmpty(ref tag) => write!(fmt, "Required tag `{:?}` was empty.", tag),
            UnknownPredictor(ref predictor) => {
                write!(fmt, "Unknown predictor \u{201c}{}\u{201d} encountered", predictor)
            }
            UnknownPlanarConfiguration(ref planar_config) => write!(
                fmt,
                "Unknown planar configuration \u{201c}{}\u{201d} encountered",
                planar_config
            ),
            ByteExpected(ref val) => write!(fmt, "Expected byte, {:?} found.", val),
            UnsignedIntegerExpected(ref val) => {
                write!(fmt, "Expected unsigned integer, {:?} found.", val)
            }
            SignedIntegerExpected(ref val) => {
                write!(fmt, "Expected signed integer, {:?} found.", val)
            }
            Format(ref val) => write!(fmt, "Invalid format: {}.", val),
            StripTileTagConflict => write!(
                fmt,
                "File should contain either (StripByteCounts and StripOffsets) or (TileByteCounts and TileOffsets), other combination was found."
            ),
            CycleInOffsets => write!(fmt, "File contained a cycle in the list of IFDs"),
            SamplesPerPixelIsZero => write!(fmt, "Samples per pixel is zero"),
            #[cfg(feature = "jpeg")]
            JpegDecoder(ref error) => write!(fmt, "{}", error),
        }
    }
}

/// The decoder does not support features required by the image.
///
/// This only captures known failures for which the standard either does not
/// require support or an implementation has been planned but not yet
/// completed. Some variants may become unused over time and will then get
/// deprecated before being removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum TiffUnsupportedError {
    FloatingPointPredictor(ColorType),
    InconsistentBitsPerSample(Vec<u8>),
    InterpretationWithBits(PhotometricInterpretation, Vec<u8>),
    UnknownInterpretation,
    UnknownCompressionMethod,
    UnsupportedCompressionMethod(CompressionMethod),
    UnsupportedSampleFormat,
    UnsupportedColorType(ColorType),
    UnsupportedPlanarConfig(Option<PlanarConfiguration>),
    UnsupportedPhotometric(PhotometricInterpretation),
    UnsupportedJpegProc(u16),
}

impl fmt::Display for TiffUnsupportedError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        use self::TiffUnsupportedError::*;
        match *self {
            FloatingPointPredictor(color_type) => write!(
                fmt,
                "Floating point predictor for {:?} is unsupported.",
                color_type
            ),
            InconsistentBitsPerSample(ref bits_per_sample) => {
                write!(fmt, "Inconsistent bits per sample: {:?}.", bits_per_sample)
            }
            InterpretationWithBits(ref photometric_interpretation, ref bits_per_sample) => write!(
                fmt,
                "{:?} with {:?} bits per sample is unsupported",
                photometric_interpretation, bits_per_sample
            ),
            UnknownInterpretation => write!(
                fmt,
                "The image is using an unknown photometric interpretation."
            ),
            UnknownCompressionMethod => write!(fmt, "Unknown compression method."),
            UnsupportedCompressionMethod(method) => {
                write!(fmt, "Compression method {:?} is unsupported", method)
            }
            UnsupportedSampleFormat => write!(
                fmt,
                "Only the unsigned integer sample format is supported."
            ),
            UnsupportedColorType(color_type) => {
                write!(fmt, "Color type {:?} is unsupported", color_type)
            }
            UnsupportedPlanarConfig(config) => {
                write!(fmt, "Unsupported planar configuration \u{201c}{:?}\u{201d}.", config)
            }
            UnsupportedPhotometric(interpretation) => write!(
                fmt,
                "Unsupported photometric interpretation \"{:?}\" for the JPEG path.",
                interpretation
            ),
            UnsupportedJpegProc(proc) => {
                write!(fmt, "JPEGProc {} is unsupported, only baseline (1) is.", proc)
            }
        }
    }
}

/// User attempted to use the decoder in a way that is incompatible with a
/// specific image.
///
/// For example: attempting to read a tile from a stripped image.
#[derive(Debug)]
pub enum UsageError {
    InvalidChunkType(ChunkType, ChunkType),
    InvalidChunkIndex(u32),
    InvalidImageIndex(usize),
}

impl fmt::Display for UsageError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use self::UsageError::*;
        match *self {
            InvalidChunkType(expected, actual) => write!(
                fmt,
                "Requested operation is only valid for images with chunk encoding of type: {:?}, got {:?}.",
                expected, actual
            ),
            InvalidChunkIndex(index) => write!(fmt, "Image chunk index ({}) requested.", index),
            InvalidImageIndex(index) => write!(fmt, "Image index ({}) out of range.", index),
        }
    }
}

impl fmt::Display for TiffError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match *self {
            TiffError::FormatError(ref e) => write!(fmt, "Format error: {}", e),
            TiffError::UnsupportedError(ref f) => {
                write!(fmt, "The decoder does not support the image format `{}`", f)
            }
            TiffError::IoError(ref e) => e.fmt(fmt),
            TiffError::LimitsExceeded => write!(fmt, "The decoder limits are exceeded"),
            TiffError::IntSizeError => write!(fmt, "Platform or format size limits exceeded"),
            TiffError::UsageError(ref e) => write!(fmt, "Usage error: {}", e),
        }
    }
}

impl Error for TiffError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match *self {
            TiffError::IoError(ref e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TiffError {
    fn from(err: io::Error) -> TiffError {
        TiffError::IoError(err)
    }
}

impl From<str::Utf8Error> for TiffError {
    fn from(_err: str::Utf8Error) -> TiffError {
        TiffError::FormatError(TiffFormatError::InvalidTag)
    }
}

impl From<string::FromUtf8Error> for TiffError {
    fn from(_err: string::FromUtf8Error) -> TiffError {
        TiffError::FormatError(TiffFormatError::InvalidTag)
    }
}

impl From<TiffFormatError> for TiffError {
    fn from(err: TiffFormatError) -> TiffError {
        TiffError::FormatError(err)
    }
}

impl From<TiffUnsupportedError> for TiffError {
    fn from(err: TiffUnsupportedError) -> TiffError {
        TiffError::UnsupportedError(err)
    }
}

impl From<UsageError> for TiffError {
    fn from(err: UsageError) -> TiffError {
        TiffError::UsageError(err)
    }
}

impl From<std::num::TryFromIntError> for TiffError {
    fn from(_err: std::num::TryFromIntError) -> TiffError {
        TiffError::IntSizeError
    }
}

#[cfg(feature = "lzw")]
impl From<weezl::LzwError> for TiffError {
    fn from(err: weezl::LzwError) -> TiffError {
        match err {
            weezl::LzwError::InvalidCode => TiffError::FormatError(TiffFormatError::Format(
                String::from("LZW compressed data corrupted"),
            )),
        }
    }
}

/// Wraps the JPEG decoder's error type so it can be compared and cloned like
/// the rest of the format-error family.
#[cfg(feature = "jpeg")]
#[derive(Debug, Clone)]
pub struct JpegDecoderError {
    inner: Arc<zune_jpeg::errors::DecodeErrors>,
}

#[cfg(feature = "jpeg")]
impl JpegDecoderError {
    fn new(error: zune_jpeg::errors::DecodeErrors) -> Self {
        Self {
            inner: Arc::new(error),
        }
    }
}

#[cfg(feature = "jpeg")]
impl PartialEq for JpegDecoderError {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(feature = "jpeg")]
impl Display for JpegDecoderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.inner)
    }
}

#[cfg(feature = "jpeg")]
impl From<JpegDecoderError> for TiffError {
    fn from(error: JpegDecoderError) -> Self {
        TiffError::FormatError(TiffFormatError::JpegDecoder(error))
    }
}

#[cfg(feature = "jpeg")]
impl From<zune_jpeg::errors::DecodeErrors> for TiffError {
    fn from(error: zune_jpeg::errors::DecodeErrors) -> Self {
        JpegDecoderError::new(error).into()
    }
}

/// Result of a decoding operation.
pub type TiffResult<T> = Result<T, TiffError>;
