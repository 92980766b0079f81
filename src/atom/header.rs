// src/atom/header.rs

//! Atom header codec.
//!
//! An ISO-BMFF header is a big-endian `u32` size followed by a four-character
//! tag. A size of `1` means a big-endian `u64` size follows the tag; a size of
//! `0` means the atom runs to the end of its parent (or of the file).

use crate::utils::error::{Mp4Error, Result};
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use std::fmt;

/// A four-character code such as `moov` or `stts`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    #[inline]
    pub const fn new(code: &[u8; 4]) -> Self {
        FourCc(*code)
    }

    /// Big-endian integer value of the code.
    #[inline]
    pub const fn as_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    #[inline]
    pub const fn from_u32(value: u32) -> Self {
        FourCc(value.to_be_bytes())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc({})", self.as_str())
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tags the scanner knows about.
pub mod tags {
    use super::FourCc;

    // 1st level
    pub const FTYP: FourCc = FourCc::new(b"ftyp");
    pub const MDAT: FourCc = FourCc::new(b"mdat");
    pub const MOOV: FourCc = FourCc::new(b"moov");
    pub const FREE: FourCc = FourCc::new(b"free");
    // 2nd level
    pub const MVHD: FourCc = FourCc::new(b"mvhd");
    pub const TRAK: FourCc = FourCc::new(b"trak");
    // 3rd level
    pub const TKHD: FourCc = FourCc::new(b"tkhd");
    pub const MDIA: FourCc = FourCc::new(b"mdia");
    // 4th level
    pub const MDHD: FourCc = FourCc::new(b"mdhd");
    pub const HDLR: FourCc = FourCc::new(b"hdlr");
    pub const MINF: FourCc = FourCc::new(b"minf");
    // 5th level
    pub const STBL: FourCc = FourCc::new(b"stbl");
    // 6th level
    pub const STSD: FourCc = FourCc::new(b"stsd");
    pub const STTS: FourCc = FourCc::new(b"stts");
    pub const STSS: FourCc = FourCc::new(b"stss");
    pub const STSZ: FourCc = FourCc::new(b"stsz");
    pub const STSC: FourCc = FourCc::new(b"stsc");
    pub const STCO: FourCc = FourCc::new(b"stco");
    pub const CO64: FourCc = FourCc::new(b"co64");

    /// Pseudo tag of the root node; never written to disk.
    pub const ROOT: FourCc = FourCc([0; 4]);
}

/// How the size of an atom is encoded in its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeForm {
    /// 32-bit size field.
    Compact,
    /// Size field is `1`, the real size follows as a 64-bit value.
    Extended,
    /// Size field is `0`, the atom extends to the end of its parent.
    ToEnd,
}

/// The header of an atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtomHeader {
    /// Total atom size including the header.
    pub size: u64,
    pub tag: FourCc,
    pub form: SizeForm,
}

impl AtomHeader {
    /// Length of a header with a 32-bit size.
    pub const COMPACT_LEN: u64 = 8;
    /// Length of a header with a 64-bit size.
    pub const EXTENDED_LEN: u64 = 16;

    /// Creates a compact header.
    #[inline]
    pub fn new(tag: FourCc, size: u64) -> Self {
        AtomHeader {
            size,
            tag,
            form: SizeForm::Compact,
        }
    }

    /// Number of bytes the header occupies on disk.
    #[inline]
    pub fn len(&self) -> u64 {
        match self.form {
            SizeForm::Extended => Self::EXTENDED_LEN,
            SizeForm::Compact | SizeForm::ToEnd => Self::COMPACT_LEN,
        }
    }

    /// Bytes following the header.
    #[inline]
    pub fn payload_len(&self) -> u64 {
        self.size.saturating_sub(self.len())
    }

    /// Parses a header whose first 8 bytes are in `head`.
    ///
    /// `large` must carry the following 8 bytes when the size field is `1`.
    /// `offset` is the absolute position of the atom and `limit` the end of
    /// the enclosing range, used to resolve the to-end form.
    pub fn parse(head: &[u8; 8], large: Option<&[u8; 8]>, offset: u64, limit: u64) -> Result<Self> {
        let size_field = BigEndian::read_u32(&head[0..4]);
        let tag = FourCc([head[4], head[5], head[6], head[7]]);

        let header = match size_field {
            0 => AtomHeader {
                size: limit.saturating_sub(offset),
                tag,
                form: SizeForm::ToEnd,
            },
            1 => {
                let large = large.ok_or_else(|| {
                    Mp4Error::Format(format!("'{}' at {}: missing 64-bit size", tag, offset))
                })?;
                AtomHeader {
                    size: BigEndian::read_u64(large),
                    tag,
                    form: SizeForm::Extended,
                }
            }
            size => AtomHeader::new(tag, size as u64),
        };

        if header.size < header.len() {
            return Err(Mp4Error::Format(format!(
                "'{}' at {}: size {} is below the header length {}",
                tag,
                offset,
                header.size,
                header.len()
            )));
        }
        Ok(header)
    }

    /// Returns `true` if the size field of `head` announces a 64-bit size.
    #[inline]
    pub fn needs_large_size(head: &[u8; 8]) -> bool {
        BigEndian::read_u32(&head[0..4]) == 1
    }

    /// Serializes the header in its own size form.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.len() as usize);
        match self.form {
            SizeForm::Compact => {
                let size = u32::try_from(self.size).map_err(|_| {
                    Mp4Error::OutOfRange(format!(
                        "'{}': size {} does not fit a 32-bit header",
                        self.tag, self.size
                    ))
                })?;
                out.write_u32::<BigEndian>(size)?;
                out.extend_from_slice(&self.tag.0);
            }
            SizeForm::Extended => {
                out.write_u32::<BigEndian>(1)?;
                out.extend_from_slice(&self.tag.0);
                out.write_u64::<BigEndian>(self.size)?;
            }
            SizeForm::ToEnd => {
                out.write_u32::<BigEndian>(0)?;
                out.extend_from_slice(&self.tag.0);
            }
        }
        Ok(out)
    }
}
