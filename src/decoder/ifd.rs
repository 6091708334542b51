//! Typed tag values and raw, not-yet-decoded IFD entries.

use std::io::{Read, Seek};
use std::mem;

use crate::decoder::stream::{ByteOrder, EndianReader};
use crate::decoder::Limits;
use crate::tags::Type;
use crate::{TiffError, TiffFormatError, TiffResult};

use self::Value::{
    Ascii, Byte, Double, Float, Ifd, IfdBig, List, Rational, RationalBig, SRational, SRationalBig,
    Short, Signed, SignedBig, SignedByte, SignedShort, Unsigned, UnsignedBig,
};

/// A decoded tag value.
#[allow(unused_qualifications)]
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Value {
    Byte(u8),
    Short(u16),
    SignedByte(i8),
    SignedShort(i16),
    Signed(i32),
    SignedBig(i64),
    Unsigned(u32),
    UnsignedBig(u64),
    Float(f32),
    Double(f64),
    List(Vec<Value>),
    Rational(u32, u32),
    RationalBig(u64, u64),
    SRational(i32, i32),
    SRationalBig(i64, i64),
    Ascii(String),
    Ifd(u32),
    IfdBig(u64),
    Undefined(u8),
}

impl Value {
    pub fn into_u8(self) -> TiffResult<u8> {
        match self {
            Byte(val) => Ok(val),
            val => Err(TiffError::FormatError(TiffFormatError::ByteExpected(val))),
        }
    }

    pub fn into_u16(self) -> TiffResult<u16> {
        match self {
            Short(val) => Ok(val),
            Unsigned(val) => Ok(u16::try_from(val)?),
            UnsignedBig(val) => Ok(u16::try_from(val)?),
            val => Err(TiffError::FormatError(
                TiffFormatError::UnsignedIntegerExpected(val),
            )),
        }
    }

    pub fn into_u32(self) -> TiffResult<u32> {
        match self {
            Byte(val) => Ok(val.into()),
            Short(val) => Ok(val.into()),
            Unsigned(val) => Ok(val),
            UnsignedBig(val) => Ok(u32::try_from(val)?),
            Ifd(val) => Ok(val),
            IfdBig(val) => Ok(u32::try_from(val)?),
            val => Err(TiffError::FormatError(
                TiffFormatError::UnsignedIntegerExpected(val),
            )),
        }
    }

    pub fn into_u64(self) -> TiffResult<u64> {
        match self {
            Byte(val) => Ok(val.into()),
            Short(val) => Ok(val.into()),
            Unsigned(val) => Ok(val.into()),
            UnsignedBig(val) => Ok(val),
            Ifd(val) => Ok(val.into()),
            IfdBig(val) => Ok(val),
            val => Err(TiffError::FormatError(
                TiffFormatError::UnsignedIntegerExpected(val),
            )),
        }
    }

    pub fn into_f32(self) -> TiffResult<f32> {
        match self {
            Float(val) => Ok(val),
            Rational(num, den) => Ok(num as f32 / den as f32),
            SRational(num, den) => Ok(num as f32 / den as f32),
            RationalBig(num, den) => Ok(num as f32 / den as f32),
            SRationalBig(num, den) => Ok(num as f32 / den as f32),
            val => Err(TiffError::FormatError(
                TiffFormatError::SignedIntegerExpected(val),
            )),
        }
    }

    pub fn into_string(self) -> TiffResult<String> {
        match self {
            Ascii(val) => Ok(val),
            val => Err(TiffError::FormatError(
                TiffFormatError::SignedIntegerExpected(val),
            )),
        }
    }

    /// Widens any integer-like value or list of them into a `Vec<u64>`.
    pub fn into_u64_vec(self) -> TiffResult<Vec<u64>> {
        match self {
            List(vec) => {
                let mut new_vec = Vec::with_capacity(vec.len());
                for v in vec {
                    new_vec.push(v.into_u64()?)
                }
                Ok(new_vec)
            }
            val => Ok(vec![val.into_u64()?]),
        }
    }

    pub fn into_u32_vec(self) -> TiffResult<Vec<u32>> {
        match self {
            List(vec) => {
                let mut new_vec = Vec::with_capacity(vec.len());
                for v in vec {
                    new_vec.push(v.into_u32()?)
                }
                Ok(new_vec)
            }
            val => Ok(vec![val.into_u32()?]),
        }
    }

    pub fn into_u16_vec(self) -> TiffResult<Vec<u16>> {
        match self {
            List(vec) => {
                let mut new_vec = Vec::with_capacity(vec.len());
                for v in vec {
                    new_vec.push(v.into_u16()?)
                }
                Ok(new_vec)
            }
            val => Ok(vec![val.into_u16()?]),
        }
    }

    /// Widens a byte, an undefined opaque byte, or a list of either into a
    /// `Vec<u8>`. Used for `UNDEFINED`-typed tags such as `JPEGTables`.
    pub fn into_u8_vec(self) -> TiffResult<Vec<u8>> {
        fn one(v: Value) -> TiffResult<u8> {
            match v {
                Byte(b) => Ok(b),
                Value::Undefined(b) => Ok(b),
                val => Err(TiffError::FormatError(TiffFormatError::ByteExpected(val))),
            }
        }
        match self {
            List(vec) => vec.into_iter().map(one).collect(),
            val => Ok(vec![one(val)?]),
        }
    }
}

/// Raw, not-yet-decoded entry: either the inline 4-byte value/offset field
/// copied verbatim, or (when the value does not fit) the offset of the value
/// array, stored the same way. Decoding happens lazily in [`Entry::val`]
/// because it may require seeking the shared reader.
#[derive(Clone)]
pub struct Entry {
    type_: Type,
    count: u64,
    offset: Vec<u8>,
    /// Always `false`: this decoder only accepts classic (32-bit offset) TIFF.
    bigtiff: bool,
}

impl ::std::fmt::Debug for Entry {
    fn fmt(&self, fmt: &mut ::std::fmt::Formatter) -> Result<(), ::std::fmt::Error> {
        fmt.write_str(&format!(
            "Entry {{ type_: {:?}, count: {:?}, offset: {:?} }}",
            self.type_, self.count, &self.offset
        ))
    }
}

impl Entry {
    pub fn new(type_: Type, count: u32, offset: [u8; 4]) -> Self {
        Self {
            type_,
            count: count.into(),
            offset: offset.to_vec(),
            bigtiff: false,
        }
    }

    fn r(&self, byte_order: ByteOrder) -> EndianReader<std::io::Cursor<Vec<u8>>> {
        EndianReader::new(std::io::Cursor::new(self.offset.clone()), byte_order)
    }

    /// Decodes this entry's value, following an out-of-line offset if needed.
    pub fn val<R: Read + Seek>(
        &self,
        limits: &Limits,
        reader: &mut EndianReader<R>,
    ) -> TiffResult<Value> {
        let count: usize = self
            .count
            .try_into()
            .map_err(|_| TiffError::LimitsExceeded)?;

        // Case 1: there are no values, return immediately.
        if count == 0 {
            return Ok(List(Vec::new()));
        }

        let bo = reader.byte_order;

        let tag_size: u64 = match self.type_ {
            Type::BYTE | Type::SBYTE | Type::ASCII | Type::UNDEFINED => 1,
            Type::SHORT | Type::SSHORT => 2,
            Type::LONG | Type::SLONG | Type::FLOAT | Type::IFD => 4,
            Type::LONG8
            | Type::SLONG8
            | Type::DOUBLE
            | Type::RATIONAL
            | Type::SRATIONAL
            | Type::IFD8 => 8,
        };

        let value_bytes = self
            .count
            .checked_mul(tag_size)
            .ok_or(TiffError::LimitsExceeded)?;

        // Case 2: there is one value.
        if count == 1 {
            if self.bigtiff && value_bytes > 4 && value_bytes <= 8 {
                return Ok(match self.type_ {
                    Type::LONG8 => UnsignedBig(self.r(bo).read_u64()?),
                    Type::SLONG8 => SignedBig(self.r(bo).read_i64()?),
                    Type::DOUBLE => Double(self.r(bo).read_f64()?),
                    Type::RATIONAL => {
                        let mut r = self.r(bo);
                        Rational(r.read_u32()?, r.read_u32()?)
                    }
                    Type::SRATIONAL => {
                        let mut r = self.r(bo);
                        SRational(r.read_i32()?, r.read_i32()?)
                    }
                    Type::IFD8 => IfdBig(self.r(bo).read_u64()?),
                    _ => unreachable!(),
                });
            }

            return Ok(match self.type_ {
                Type::BYTE => Byte(self.offset[0]),
                Type::SBYTE => SignedByte(self.offset[0] as i8),
                Type::UNDEFINED => Value::Undefined(self.offset[0]),
                Type::SHORT => Short(self.r(bo).read_u16()?),
                Type::SSHORT => SignedShort(self.r(bo).read_i16()?),
                Type::LONG => Unsigned(self.r(bo).read_u32()?),
                Type::SLONG => Signed(self.r(bo).read_i32()?),
                Type::FLOAT => Float(self.r(bo).read_f32()?),
                Type::ASCII => {
                    if self.offset[0] == 0 {
                        Ascii(String::new())
                    } else {
                        return Err(TiffError::FormatError(TiffFormatError::InvalidTag));
                    }
                }
                Type::LONG8 => {
                    reader.goto_offset(self.r(bo).read_u32()?.into())?;
                    UnsignedBig(reader.read_u64()?)
                }
                Type::SLONG8 => {
                    reader.goto_offset(self.r(bo).read_u32()?.into())?;
                    SignedBig(reader.read_i64()?)
                }
                Type::DOUBLE => {
                    reader.goto_offset(self.r(bo).read_u32()?.into())?;
                    Double(reader.read_f64()?)
                }
                Type::RATIONAL => {
                    reader.goto_offset(self.r(bo).read_u32()?.into())?;
                    Rational(reader.read_u32()?, reader.read_u32()?)
                }
                Type::SRATIONAL => {
                    reader.goto_offset(self.r(bo).read_u32()?.into())?;
                    SRational(reader.read_i32()?, reader.read_i32()?)
                }
                Type::IFD => Ifd(self.r(bo).read_u32()?),
                Type::IFD8 => {
                    reader.goto_offset(self.r(bo).read_u32()?.into())?;
                    IfdBig(reader.read_u64()?)
                }
            });
        }

        // Case 3: there is more than one value, but it fits in the offset field.
        if value_bytes <= 4 || (self.bigtiff && value_bytes <= 8) {
            match self.type_ {
                Type::BYTE => {
                    return Ok(List(
                        self.offset[0..count].iter().map(|&b| Byte(b)).collect(),
                    ))
                }
                Type::SBYTE => {
                    return Ok(List(
                        self.offset[0..count]
                            .iter()
                            .map(|&b| SignedByte(b as i8))
                            .collect(),
                    ))
                }
                Type::ASCII => {
                    let buf = &self.offset[..count];
                    if buf.is_ascii() && buf.ends_with(&[0]) {
                        let v = std::str::from_utf8(buf)?;
                        let v = v.trim_matches(char::from(0));
                        return Ok(Ascii(v.into()));
                    }
                    return Err(TiffError::FormatError(TiffFormatError::InvalidTag));
                }
                Type::UNDEFINED => {
                    return Ok(List(
                        self.offset[0..count]
                            .iter()
                            .map(|&b| Value::Undefined(b))
                            .collect(),
                    ));
                }
                Type::SHORT => {
                    let mut r = self.r(bo);
                    let mut v = Vec::with_capacity(count);
                    for _ in 0..count {
                        v.push(Short(r.read_u16()?));
                    }
                    return Ok(List(v));
                }
                Type::SSHORT => {
                    let mut r = self.r(bo);
                    let mut v = Vec::with_capacity(count);
                    for _ in 0..count {
                        v.push(SignedShort(r.read_i16()?));
                    }
                    return Ok(List(v));
                }
                _ => unreachable!(),
            }
        }

        // Case 4: there is more than one value, and it doesn't fit in the offset field.
        let offset = if self.bigtiff {
            self.r(bo).read_u64()?
        } else {
            self.r(bo).read_u32()?.into()
        };
        reader.goto_offset(offset)?;

        if count
            .checked_mul(mem::size_of::<Value>())
            .map(|bytes| bytes > limits.decoding_buffer_size)
            .unwrap_or(true)
        {
            return Err(TiffError::LimitsExceeded);
        }

        match self.type_ {
            Type::BYTE => decode_seq(count, reader, |r| {
                let mut buf = [0u8; 1];
                r.inner().read_exact(&mut buf)?;
                Ok(Byte(buf[0]))
            }),
            Type::SBYTE => decode_seq(count, reader, |r| Ok(SignedByte(r.read_i8()?))),
            Type::SHORT => decode_seq(count, reader, |r| Ok(Short(r.read_u16()?))),
            Type::SSHORT => decode_seq(count, reader, |r| Ok(SignedShort(r.read_i16()?))),
            Type::LONG => decode_seq(count, reader, |r| Ok(Unsigned(r.read_u32()?))),
            Type::SLONG => decode_seq(count, reader, |r| Ok(Signed(r.read_i32()?))),
            Type::FLOAT => decode_seq(count, reader, |r| Ok(Float(r.read_f32()?))),
            Type::DOUBLE => decode_seq(count, reader, |r| Ok(Double(r.read_f64()?))),
            Type::RATIONAL => {
                decode_seq(count, reader, |r| Ok(Rational(r.read_u32()?, r.read_u32()?)))
            }
            Type::SRATIONAL => decode_seq(count, reader, |r| {
                Ok(SRational(r.read_i32()?, r.read_i32()?))
            }),
            Type::LONG8 => decode_seq(count, reader, |r| Ok(UnsignedBig(r.read_u64()?))),
            Type::SLONG8 => decode_seq(count, reader, |r| Ok(SignedBig(r.read_i64()?))),
            Type::IFD => decode_seq(count, reader, |r| Ok(Ifd(r.read_u32()?))),
            Type::IFD8 => decode_seq(count, reader, |r| Ok(IfdBig(r.read_u64()?))),
            Type::UNDEFINED => decode_seq(count, reader, |r| {
                let mut buf = [0u8; 1];
                r.inner().read_exact(&mut buf)?;
                Ok(Value::Undefined(buf[0]))
            }),
            Type::ASCII => {
                let mut out = vec![0; count];
                reader.inner().read_exact(&mut out)?;
                if let Some(first) = out.iter().position(|&b| b == 0) {
                    out.truncate(first);
                }
                Ok(Ascii(String::from_utf8(out)?))
            }
        }
    }
}

#[inline]
fn decode_seq<R, F>(count: usize, reader: &mut EndianReader<R>, decode_one: F) -> TiffResult<Value>
where
    R: Read + Seek,
    F: Fn(&mut EndianReader<R>) -> TiffResult<Value>,
{
    let mut v = Vec::with_capacity(count);
    for _ in 0..count {
        v.push(decode_one(reader)?);
    }
    Ok(List(v))
}
