//! Decoding of TIFF images.
//!
//! TIFF (Tagged Image File Format) is a container format holding one or more
//! images ("IFDs"), each with its own pixel encoding, compression, color
//! model and layout (strips or tiles).
//!
//! # Related Links
//! * <https://web.archive.org/web/20210108073850/https://www.adobe.io/open/standards/TIFF.html> - The TIFF specification

pub mod decoder;
mod directory;
mod error;
pub mod tags;

pub use self::directory::Directory;
pub use self::error::{TiffError, TiffFormatError, TiffResult, TiffUnsupportedError, UsageError};

/// An enumeration over supported color types and their bit depths.
#[derive(Copy, PartialEq, Eq, Debug, Clone, Hash)]
#[non_exhaustive]
pub enum ColorType {
    /// Pixel is grayscale.
    Gray(u8),
    /// Pixel contains R, G and B channels.
    RGB(u8),
    /// Pixel is an index into a color palette; the channel width given is
    /// that of the expanded RGB triplet (always 8, per [`Tag::ColorMap`]'s
    /// fixed 16-bit-downscaled-to-8-bit entries).
    ///
    /// [`Tag::ColorMap`]: crate::tags::Tag::ColorMap
    Palette(u8),
    /// Pixel is grayscale with an alpha channel.
    GrayA(u8),
    /// Pixel is RGB with an alpha channel.
    RGBA(u8),
    /// Pixel is CMYK.
    CMYK(u8),
    /// Pixel is CMYK with an alpha channel.
    CMYKA(u8),
    /// Pixel is YCbCr (always stored pre-converted to RGB by this decoder).
    YCbCr(u8),
}

impl ColorType {
    pub fn bit_depth(&self) -> u8 {
        match *self {
            ColorType::Gray(b)
            | ColorType::RGB(b)
            | ColorType::Palette(b)
            | ColorType::GrayA(b)
            | ColorType::RGBA(b)
            | ColorType::CMYK(b)
            | ColorType::CMYKA(b)
            | ColorType::YCbCr(b) => b,
        }
    }

    pub fn samples(&self) -> u8 {
        match *self {
            ColorType::Gray(_) | ColorType::Palette(_) => 1,
            ColorType::GrayA(_) => 2,
            ColorType::RGB(_) | ColorType::YCbCr(_) => 3,
            ColorType::RGBA(_) | ColorType::CMYK(_) => 4,
            ColorType::CMYKA(_) => 5,
        }
    }
}
