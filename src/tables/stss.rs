//! Sync-sample (`stss`) table: the 1-based numbers of key samples.

use crate::utils::error::{Mp4Error, Result};
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

/// Decoded state of an `stss` atom.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StssTable {
    /// Entry count as declared in the atom.
    pub total_key_samples: u32,
    /// Number of the last key sample; valid after loading.
    pub last_key_sample_ndx: u32,
    indices: Option<Vec<u32>>,
}

impl StssTable {
    pub const PREFIX_LEN: usize = 8;

    pub(crate) fn read_counts(&mut self, prefix: &[u8]) -> Result<()> {
        if prefix.len() < Self::PREFIX_LEN {
            return Err(Mp4Error::Format("stss: truncated header".to_string()));
        }
        self.total_key_samples = BigEndian::read_u32(&prefix[4..8]);
        Ok(())
    }

    /// Decodes the key sample numbers; they must be non-zero and ascending.
    pub fn decode(payload: &[u8]) -> Result<Vec<u32>> {
        if payload.len() < Self::PREFIX_LEN {
            return Err(Mp4Error::Format("stss: truncated header".to_string()));
        }
        let count = BigEndian::read_u32(&payload[4..8]) as usize;
        let body = &payload[Self::PREFIX_LEN..];
        if body.len() != count * 4 {
            return Err(Mp4Error::Format(format!(
                "stss: {} entries need {} bytes, found {}",
                count,
                count * 4,
                body.len()
            )));
        }

        let indices: Vec<u32> = body.chunks_exact(4).map(BigEndian::read_u32).collect();
        let mut previous = 0u32;
        for &ndx in &indices {
            if ndx <= previous {
                return Err(Mp4Error::InvalidData(format!(
                    "stss: key sample {} follows {}",
                    ndx, previous
                )));
            }
            previous = ndx;
        }
        Ok(indices)
    }

    pub(crate) fn set_indices(&mut self, indices: Vec<u32>) -> u32 {
        self.total_key_samples = indices.len() as u32;
        self.last_key_sample_ndx = indices.last().copied().unwrap_or(0);
        self.indices = Some(indices);
        self.last_key_sample_ndx
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.indices.is_some()
    }

    #[inline]
    pub fn key_sample_indices(&self) -> Option<&[u32]> {
        self.indices.as_deref()
    }

    /// Whether the 1-based sample `number` is a key sample.
    pub fn is_key_sample(&self, number: u32) -> Result<bool> {
        let indices = self.loaded()?;
        Ok(indices.binary_search(&number).is_ok())
    }

    /// Drops key samples numbered above `new_total`.
    pub fn cut_samples(&mut self, new_total: u64) -> Result<()> {
        let indices = self
            .indices
            .as_mut()
            .ok_or_else(|| Mp4Error::IllegalState("stss: table not loaded".to_string()))?;
        indices.retain(|&ndx| (ndx as u64) <= new_total);
        self.total_key_samples = indices.len() as u32;
        self.last_key_sample_ndx = indices.last().copied().unwrap_or(0);
        Ok(())
    }

    pub(crate) fn encode_payload(&self, version_flags: &[u8]) -> Result<Vec<u8>> {
        let indices = self.loaded()?;
        let mut out = Vec::with_capacity(Self::PREFIX_LEN + indices.len() * 4);
        out.extend_from_slice(&version_flags[..4]);
        out.write_u32::<BigEndian>(indices.len() as u32)?;
        for &ndx in indices {
            out.write_u32::<BigEndian>(ndx)?;
        }
        Ok(out)
    }

    fn loaded(&self) -> Result<&[u32]> {
        self.indices
            .as_deref()
            .ok_or_else(|| Mp4Error::IllegalState("stss: table not loaded".to_string()))
    }
}
