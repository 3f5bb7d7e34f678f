//! On-disk layout of a VLSV container.
//!
//! ```text
//! 0..8          endianness marker (byte 0), rest reserved and zero
//! 8..16         footer offset, native byte order, patched at close
//! 16..footer    array payloads in completion order
//! footer..EOF   XML footer (see `crate::footer`)
//! ```

use crate::vlsv_error::VlsvError;
use bytemuck::Pod;
use static_assertions::const_assert_eq;
use std::fmt;
use std::str::FromStr;

/// Size of the fixed file header.
pub const HEADER_BYTES: u64 = 16;
/// Byte position of the footer-offset placeholder.
pub const FOOTER_OFFSET_POS: u64 = 8;

const_assert_eq!(HEADER_BYTES, 2 * std::mem::size_of::<u64>() as u64);

/// Byte order recorded in the first header byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    /// Byte order of the running process.
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Endianness::Little => 0,
            Endianness::Big => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Endianness::Little),
            1 => Some(Endianness::Big),
            _ => None,
        }
    }
}

/// Decoded 16-byte header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FileHeader {
    pub endianness: Endianness,
    pub footer_offset: u64,
}

impl FileHeader {
    /// Header as written at open: native endianness, zero placeholder.
    pub fn placeholder() -> Self {
        Self {
            endianness: Endianness::native(),
            footer_offset: 0,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_BYTES as usize] {
        let mut out = [0u8; HEADER_BYTES as usize];
        out[0] = self.endianness.code();
        out[8..16].copy_from_slice(&encode_offset(self.footer_offset, self.endianness));
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, VlsvError> {
        if bytes.len() < HEADER_BYTES as usize {
            return Err(VlsvError::Header(format!(
                "expected {HEADER_BYTES} bytes, got {}",
                bytes.len()
            )));
        }
        let endianness = Endianness::from_code(bytes[0])
            .ok_or_else(|| VlsvError::Header(format!("bad endianness marker {}", bytes[0])))?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[8..16]);
        let footer_offset = match endianness {
            Endianness::Little => u64::from_le_bytes(raw),
            Endianness::Big => u64::from_be_bytes(raw),
        };
        Ok(Self {
            endianness,
            footer_offset,
        })
    }
}

/// Encode a footer offset in the given byte order.
pub fn encode_offset(offset: u64, endianness: Endianness) -> [u8; 8] {
    match endianness {
        Endianness::Little => offset.to_le_bytes(),
        Endianness::Big => offset.to_be_bytes(),
    }
}

// -----------------------------------------------------------------------------
// Datatypes
// -----------------------------------------------------------------------------

/// Primitive datatype tag stored in the footer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Datatype {
    Int,
    Uint,
    Float,
}

impl Datatype {
    pub fn as_str(self) -> &'static str {
        match self {
            Datatype::Int => "int",
            Datatype::Uint => "uint",
            Datatype::Float => "float",
        }
    }

    /// Check that `data_size` is a byte width this datatype exists in.
    pub fn validate_size(self, data_size: u64) -> Result<(), VlsvError> {
        let ok = match self {
            Datatype::Int | Datatype::Uint => matches!(data_size, 1 | 2 | 4 | 8),
            Datatype::Float => matches!(data_size, 4 | 8),
        };
        if ok {
            Ok(())
        } else {
            Err(VlsvError::InvalidDescriptor(format!(
                "{} has no {data_size}-byte variant",
                self.as_str()
            )))
        }
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Datatype {
    type Err = VlsvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "int" => Ok(Datatype::Int),
            "uint" => Ok(Datatype::Uint),
            "float" => Ok(Datatype::Float),
            other => Err(VlsvError::UnknownDatatype(other.to_string())),
        }
    }
}

/// Rust scalar that can be written directly as array payload.
pub trait Primitive: Pod {
    const DATATYPE: Datatype;
    const SIZE: u64 = std::mem::size_of::<Self>() as u64;
}

macro_rules! impl_primitive {
    ($dt:expr => $($t:ty),*) => {
        $(impl Primitive for $t { const DATATYPE: Datatype = $dt; })*
    };
}

impl_primitive!(Datatype::Int => i8, i16, i32, i64);
impl_primitive!(Datatype::Uint => u8, u16, u32, u64);
impl_primitive!(Datatype::Float => f32, f64);

// -----------------------------------------------------------------------------
// Array descriptor
// -----------------------------------------------------------------------------

/// Shape of one rank's contribution to an array.
///
/// `vector_size` and `data_size` must agree across the group; `array_size`
/// is the local element count and may differ per rank.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ArrayDescriptor {
    pub datatype: Datatype,
    pub array_size: u64,
    pub vector_size: u64,
    pub data_size: u64,
}

impl ArrayDescriptor {
    pub fn new(datatype: Datatype, array_size: u64, vector_size: u64, data_size: u64) -> Self {
        Self {
            datatype,
            array_size,
            vector_size,
            data_size,
        }
    }

    /// Descriptor for a slice of `T` holding `array_size * vector_size` scalars.
    pub fn for_primitive<T: Primitive>(array_size: u64, vector_size: u64) -> Self {
        Self::new(T::DATATYPE, array_size, vector_size, T::SIZE)
    }

    pub fn validate(&self) -> Result<(), VlsvError> {
        if self.vector_size == 0 {
            return Err(VlsvError::InvalidDescriptor("vector size is zero".into()));
        }
        self.datatype.validate_size(self.data_size)?;
        if self.vector_size.checked_mul(self.data_size).is_none() {
            return Err(VlsvError::InvalidDescriptor(format!(
                "vectors of {} x {} bytes overflow u64",
                self.vector_size, self.data_size
            )));
        }
        self.local_bytes().map(|_| ())
    }

    /// Bytes per vector element.
    pub fn element_bytes(&self) -> u64 {
        self.vector_size * self.data_size
    }

    /// Bytes this rank contributes, with overflow reported as an error.
    pub fn local_bytes(&self) -> Result<u64, VlsvError> {
        self.array_size
            .checked_mul(self.vector_size)
            .and_then(|n| n.checked_mul(self.data_size))
            .ok_or_else(|| {
                VlsvError::InvalidDescriptor(format!(
                    "{} x {} x {} bytes overflows u64",
                    self.array_size, self.vector_size, self.data_size
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_header_layout() {
        let bytes = FileHeader::placeholder().encode();
        assert_eq!(bytes[0], Endianness::native().code());
        assert!(bytes[1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn header_decodes_patched_offset() {
        let hdr = FileHeader {
            endianness: Endianness::native(),
            footer_offset: 0x1234_5678,
        };
        assert_eq!(FileHeader::decode(&hdr.encode()).unwrap(), hdr);
    }

    #[test]
    fn short_or_bad_header_rejected() {
        assert!(matches!(
            FileHeader::decode(&[0u8; 7]),
            Err(VlsvError::Header(_))
        ));
        let mut bytes = [0u8; 16];
        bytes[0] = 9;
        assert!(FileHeader::decode(&bytes).is_err());
    }

    #[test]
    fn datatype_names() {
        for dt in [Datatype::Int, Datatype::Uint, Datatype::Float] {
            assert_eq!(dt.as_str().parse::<Datatype>().unwrap(), dt);
        }
        assert!(matches!(
            "double".parse::<Datatype>(),
            Err(VlsvError::UnknownDatatype(_))
        ));
    }

    #[test]
    fn primitive_mapping() {
        assert_eq!(<i32 as Primitive>::DATATYPE, Datatype::Int);
        assert_eq!(<u16 as Primitive>::SIZE, 2);
        assert_eq!(<f64 as Primitive>::DATATYPE, Datatype::Float);
        assert_eq!(<f64 as Primitive>::SIZE, 8);
    }

    #[test]
    fn descriptor_validation() {
        assert!(ArrayDescriptor::new(Datatype::Float, 10, 3, 8).validate().is_ok());
        assert!(ArrayDescriptor::new(Datatype::Float, 10, 3, 2).validate().is_err());
        assert!(ArrayDescriptor::new(Datatype::Int, 10, 0, 4).validate().is_err());
        let huge = ArrayDescriptor::new(Datatype::Uint, u64::MAX, 2, 8);
        assert!(matches!(
            huge.local_bytes(),
            Err(VlsvError::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn descriptor_bytes() {
        let d = ArrayDescriptor::for_primitive::<f32>(5, 3);
        assert_eq!(d.element_bytes(), 12);
        assert_eq!(d.local_bytes().unwrap(), 60);
    }

    #[test]
    fn oversized_vectors_rejected_even_when_empty() {
        let d = ArrayDescriptor::new(Datatype::Float, 0, u64::MAX / 4, 8);
        assert!(matches!(d.validate(), Err(VlsvError::InvalidDescriptor(_))));
    }
}
