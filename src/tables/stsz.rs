//! Sample-size (`stsz`) table.

use crate::utils::error::{Mp4Error, Result};
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

/// Decoded state of an `stsz` atom.
///
/// A non-zero `uniform_sample_bytes` means every sample has that size and no
/// per-sample table is stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StszTable {
    pub uniform_sample_bytes: u32,
    pub total_samples: u32,
    sizes: Option<Vec<u32>>,
}

impl StszTable {
    /// version/flags + uniform size + sample count
    pub const PREFIX_LEN: usize = 12;

    pub(crate) fn read_counts(&mut self, prefix: &[u8]) -> Result<()> {
        if prefix.len() < Self::PREFIX_LEN {
            return Err(Mp4Error::Format("stsz: truncated header".to_string()));
        }
        self.uniform_sample_bytes = BigEndian::read_u32(&prefix[4..8]);
        self.total_samples = BigEndian::read_u32(&prefix[8..12]);
        Ok(())
    }

    /// Decodes the per-sample sizes. Uniform tables decode to an empty list.
    pub fn decode(payload: &[u8]) -> Result<Vec<u32>> {
        if payload.len() < Self::PREFIX_LEN {
            return Err(Mp4Error::Format("stsz: truncated header".to_string()));
        }
        let uniform = BigEndian::read_u32(&payload[4..8]);
        let count = BigEndian::read_u32(&payload[8..12]) as usize;
        let body = &payload[Self::PREFIX_LEN..];
        if uniform != 0 {
            return Ok(Vec::new());
        }
        if body.len() != count * 4 {
            return Err(Mp4Error::Format(format!(
                "stsz: {} samples need {} bytes, found {}",
                count,
                count * 4,
                body.len()
            )));
        }
        Ok(body.chunks_exact(4).map(BigEndian::read_u32).collect())
    }

    pub(crate) fn set_sizes(&mut self, sizes: Vec<u32>) {
        if self.uniform_sample_bytes == 0 {
            self.total_samples = sizes.len() as u32;
        }
        self.sizes = Some(sizes);
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.sizes.is_some()
    }

    #[inline]
    pub fn is_uniform(&self) -> bool {
        self.uniform_sample_bytes != 0
    }

    /// Per-sample sizes; empty for uniform tables.
    #[inline]
    pub fn sample_bytes_table(&self) -> Option<&[u32]> {
        self.sizes.as_deref()
    }

    /// Total bytes of `count` samples starting at the 0-based `start`.
    ///
    /// Non-uniform tables must be loaded first.
    pub fn iterate_sample_bytes(&self, start: u32, count: u32) -> Result<u64> {
        let end = start as u64 + count as u64;
        if end > self.total_samples as u64 {
            return Err(Mp4Error::OutOfRange(format!(
                "stsz: samples {}..{} beyond {}",
                start, end, self.total_samples
            )));
        }
        if self.is_uniform() {
            return Ok(self.uniform_sample_bytes as u64 * count as u64);
        }
        let sizes = self
            .sizes
            .as_deref()
            .ok_or_else(|| Mp4Error::IllegalState("stsz: table not loaded".to_string()))?;
        Ok(sizes[start as usize..end as usize]
            .iter()
            .map(|&s| s as u64)
            .sum())
    }

    /// Keeps the first `new_total` samples.
    pub fn cut_samples(&mut self, new_total: u64) -> Result<()> {
        let sizes = self
            .sizes
            .as_mut()
            .ok_or_else(|| Mp4Error::IllegalState("stsz: table not loaded".to_string()))?;
        if new_total > self.total_samples as u64 {
            return Err(Mp4Error::OutOfRange(format!(
                "stsz: cannot cut {} samples down to {}",
                self.total_samples, new_total
            )));
        }
        sizes.truncate(new_total as usize);
        self.total_samples = new_total as u32;
        Ok(())
    }

    pub(crate) fn encode_payload(&self, version_flags: &[u8]) -> Result<Vec<u8>> {
        let sizes = self
            .sizes
            .as_deref()
            .ok_or_else(|| Mp4Error::IllegalState("stsz: table not loaded".to_string()))?;
        let mut out = Vec::with_capacity(Self::PREFIX_LEN + sizes.len() * 4);
        out.extend_from_slice(&version_flags[..4]);
        out.write_u32::<BigEndian>(self.uniform_sample_bytes)?;
        out.write_u32::<BigEndian>(self.total_samples)?;
        if !self.is_uniform() {
            for &size in sizes {
                out.write_u32::<BigEndian>(size)?;
            }
        }
        Ok(out)
    }
}
