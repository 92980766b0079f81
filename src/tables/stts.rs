//! Time-to-sample (`stts`) table.

use crate::utils::error::{Mp4Error, Result};
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

/// One run of samples sharing a duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleTime {
    pub count: u32,
    pub duration: u32,
}

/// Decoded state of an `stts` atom.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SttsTable {
    /// Entry count as declared in the atom.
    pub total_entries: u32,
    entries: Option<Vec<SampleTime>>,
}

impl SttsTable {
    /// version/flags + entry count
    pub const PREFIX_LEN: usize = 8;
    const ENTRY_LEN: usize = 8;

    pub(crate) fn read_counts(&mut self, prefix: &[u8]) -> Result<()> {
        if prefix.len() < Self::PREFIX_LEN {
            return Err(Mp4Error::Format("stts: truncated header".to_string()));
        }
        self.total_entries = BigEndian::read_u32(&prefix[4..8]);
        Ok(())
    }

    /// Decodes the run-length entries of an `stts` payload.
    pub fn decode(payload: &[u8]) -> Result<Vec<SampleTime>> {
        if payload.len() < Self::PREFIX_LEN {
            return Err(Mp4Error::Format("stts: truncated header".to_string()));
        }
        let count = BigEndian::read_u32(&payload[4..8]) as usize;
        let body = &payload[Self::PREFIX_LEN..];
        if body.len() != count * Self::ENTRY_LEN {
            return Err(Mp4Error::Format(format!(
                "stts: {} entries need {} bytes, found {}",
                count,
                count * Self::ENTRY_LEN,
                body.len()
            )));
        }

        Ok(body
            .chunks_exact(Self::ENTRY_LEN)
            .map(|e| SampleTime {
                count: BigEndian::read_u32(&e[0..4]),
                duration: BigEndian::read_u32(&e[4..8]),
            })
            .collect())
    }

    pub(crate) fn set_entries(&mut self, entries: Vec<SampleTime>) {
        self.total_entries = entries.len() as u32;
        self.entries = Some(entries);
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.entries.is_some()
    }

    /// The run-length entries, once loaded.
    #[inline]
    pub fn entries(&self) -> Option<&[SampleTime]> {
        self.entries.as_deref()
    }

    /// Sum of all run counts. Zero until the table is loaded.
    pub fn count_samples(&self) -> u64 {
        self.entries
            .as_ref()
            .map(|entries| entries.iter().map(|e| e.count as u64).sum())
            .unwrap_or(0)
    }

    /// Sum of all sample durations, in media time scale units.
    pub fn total_duration(&self) -> u64 {
        self.entries
            .as_ref()
            .map(|entries| {
                entries
                    .iter()
                    .map(|e| e.count as u64 * e.duration as u64)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Expands the runs into one duration per sample.
    pub fn sample_durations(&self) -> Result<Vec<u32>> {
        let entries = self.loaded()?;
        let mut durations = Vec::with_capacity(self.count_samples() as usize);
        for entry in entries {
            durations.extend(std::iter::repeat(entry.duration).take(entry.count as usize));
        }
        Ok(durations)
    }

    /// Truncates the runs so that exactly `new_total` samples remain.
    ///
    /// The run holding the last kept sample is split when needed.
    pub fn cut_samples(&mut self, new_total: u64) -> Result<()> {
        let total = self.count_samples();
        let entries = self
            .entries
            .as_mut()
            .ok_or_else(|| Mp4Error::IllegalState("stts: table not loaded".to_string()))?;
        if new_total > total {
            return Err(Mp4Error::OutOfRange(format!(
                "stts: cannot cut {} samples down to {}",
                total, new_total
            )));
        }

        let mut kept = 0u64;
        let mut len = 0usize;
        for entry in entries.iter_mut() {
            if kept == new_total {
                break;
            }
            let left = new_total - kept;
            if (entry.count as u64) > left {
                entry.count = left as u32;
            }
            kept += entry.count as u64;
            len += 1;
        }
        entries.truncate(len);
        self.total_entries = len as u32;
        Ok(())
    }

    /// Serializes the loaded entries behind `version_flags`.
    pub(crate) fn encode_payload(&self, version_flags: &[u8]) -> Result<Vec<u8>> {
        let entries = self.loaded()?;
        let mut out = Vec::with_capacity(Self::PREFIX_LEN + entries.len() * Self::ENTRY_LEN);
        out.extend_from_slice(&version_flags[..4]);
        out.write_u32::<BigEndian>(entries.len() as u32)?;
        for entry in entries {
            out.write_u32::<BigEndian>(entry.count)?;
            out.write_u32::<BigEndian>(entry.duration)?;
        }
        Ok(out)
    }

    fn loaded(&self) -> Result<&[SampleTime]> {
        self.entries
            .as_deref()
            .ok_or_else(|| Mp4Error::IllegalState("stts: table not loaded".to_string()))
    }
}
