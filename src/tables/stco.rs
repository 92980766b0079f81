//! Chunk offset tables, `stco` (32-bit) and `co64` (64-bit).

use crate::utils::error::{Mp4Error, Result};
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

/// Width of the offsets stored in the atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetWidth {
    #[default]
    U32,
    U64,
}

impl OffsetWidth {
    #[inline]
    pub fn bytes(self) -> usize {
        match self {
            OffsetWidth::U32 => 4,
            OffsetWidth::U64 => 8,
        }
    }
}

/// Decoded state of an `stco` or `co64` atom.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkOffsetTable {
    pub width: OffsetWidth,
    pub total_chunks: u32,
    offsets: Option<Vec<u64>>,
}

impl ChunkOffsetTable {
    pub const PREFIX_LEN: usize = 8;

    pub fn new(width: OffsetWidth) -> Self {
        ChunkOffsetTable {
            width,
            ..Default::default()
        }
    }

    pub(crate) fn read_counts(&mut self, prefix: &[u8]) -> Result<()> {
        if prefix.len() < Self::PREFIX_LEN {
            return Err(Mp4Error::Format("chunk offsets: truncated header".to_string()));
        }
        self.total_chunks = BigEndian::read_u32(&prefix[4..8]);
        Ok(())
    }

    /// Decodes the absolute chunk offsets.
    pub fn decode(payload: &[u8], width: OffsetWidth) -> Result<Vec<u64>> {
        if payload.len() < Self::PREFIX_LEN {
            return Err(Mp4Error::Format("chunk offsets: truncated header".to_string()));
        }
        let count = BigEndian::read_u32(&payload[4..8]) as usize;
        let body = &payload[Self::PREFIX_LEN..];
        let step = width.bytes();
        if body.len() != count * step {
            return Err(Mp4Error::Format(format!(
                "chunk offsets: {} entries need {} bytes, found {}",
                count,
                count * step,
                body.len()
            )));
        }
        Ok(match width {
            OffsetWidth::U32 => body
                .chunks_exact(4)
                .map(|e| BigEndian::read_u32(e) as u64)
                .collect(),
            OffsetWidth::U64 => body.chunks_exact(8).map(BigEndian::read_u64).collect(),
        })
    }

    pub(crate) fn set_offsets(&mut self, offsets: Vec<u64>) {
        self.total_chunks = offsets.len() as u32;
        self.offsets = Some(offsets);
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.offsets.is_some()
    }

    #[inline]
    pub fn offsets(&self) -> Option<&[u64]> {
        self.offsets.as_deref()
    }

    /// Replaces the offset of the 0-based chunk `ndx`.
    pub fn set_offset(&mut self, ndx: usize, offset: u64) -> Result<()> {
        let offsets = self.loaded_mut()?;
        let total = offsets.len();
        let slot = offsets.get_mut(ndx).ok_or_else(|| {
            Mp4Error::OutOfRange(format!("chunk offsets: chunk {} of {}", ndx, total))
        })?;
        *slot = offset;
        Ok(())
    }

    /// Moves every chunk by `delta` bytes.
    pub fn shift_offsets(&mut self, delta: i64) -> Result<()> {
        let offsets = self.loaded_mut()?;
        for offset in offsets.iter_mut() {
            let current = *offset;
            *offset = current.checked_add_signed(delta).ok_or_else(|| {
                Mp4Error::OutOfRange(format!(
                    "chunk offsets: {} shifted by {} leaves the file",
                    current, delta
                ))
            })?;
        }
        Ok(())
    }

    /// Keeps the first `new_total` chunks.
    pub fn cut_chunks(&mut self, new_total: u32) -> Result<()> {
        let offsets = self.loaded_mut()?;
        if new_total as usize > offsets.len() {
            return Err(Mp4Error::OutOfRange(format!(
                "chunk offsets: cannot cut {} chunks down to {}",
                offsets.len(),
                new_total
            )));
        }
        offsets.truncate(new_total as usize);
        self.total_chunks = new_total;
        Ok(())
    }

    pub(crate) fn encode_payload(&self, version_flags: &[u8]) -> Result<Vec<u8>> {
        let offsets = self
            .offsets
            .as_deref()
            .ok_or_else(|| Mp4Error::IllegalState("chunk offsets: table not loaded".to_string()))?;
        let mut out = Vec::with_capacity(Self::PREFIX_LEN + offsets.len() * self.width.bytes());
        out.extend_from_slice(&version_flags[..4]);
        out.write_u32::<BigEndian>(offsets.len() as u32)?;
        for &offset in offsets {
            match self.width {
                OffsetWidth::U32 => {
                    let narrow = u32::try_from(offset).map_err(|_| {
                        Mp4Error::OutOfRange(format!("stco: offset {} needs co64", offset))
                    })?;
                    out.write_u32::<BigEndian>(narrow)?;
                }
                OffsetWidth::U64 => out.write_u64::<BigEndian>(offset)?,
            }
        }
        Ok(out)
    }

    fn loaded_mut(&mut self) -> Result<&mut Vec<u64>> {
        self.offsets
            .as_mut()
            .ok_or_else(|| Mp4Error::IllegalState("chunk offsets: table not loaded".to_string()))
    }
}
