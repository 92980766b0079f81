//! Sample-to-chunk (`stsc`) table.
//!
//! On disk each entry names the first chunk of a run of chunks sharing the
//! same sample count. The decoded form also records how many chunks the run
//! covers, derived from the next entry or, for the last entry, from the
//! total number of samples declared by the sample-size table.

use crate::utils::error::{Mp4Error, Result};
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use log::error;

/// One run of chunks with the same number of samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkSamples {
    /// 1-based number of the first chunk of the run.
    pub chunk_ndx: u32,
    pub samples: u32,
    pub desc_ndx: u32,
    /// Number of consecutive chunks in the run.
    pub chunk_cnt: u32,
}

/// Decoded state of an `stsc` atom.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StscTable {
    pub total_entries: u32,
    /// Number of chunks covered by all runs; valid after loading.
    pub total_chunks: u32,
    entries: Option<Vec<ChunkSamples>>,
}

impl StscTable {
    pub const PREFIX_LEN: usize = 8;
    const ENTRY_LEN: usize = 12;

    pub(crate) fn read_counts(&mut self, prefix: &[u8]) -> Result<()> {
        if prefix.len() < Self::PREFIX_LEN {
            return Err(Mp4Error::Format("stsc: truncated header".to_string()));
        }
        self.total_entries = BigEndian::read_u32(&prefix[4..8]);
        Ok(())
    }

    /// Decodes the runs and derives their chunk counts.
    ///
    /// `ref_samples` is the total number of samples the runs must cover.
    pub fn decode(payload: &[u8], ref_samples: u32, silent: bool) -> Result<Vec<ChunkSamples>> {
        let fail = |msg: String| -> Result<Vec<ChunkSamples>> {
            if !silent {
                error!("{}", msg);
            }
            Err(Mp4Error::Format(msg))
        };

        if payload.len() < Self::PREFIX_LEN {
            return fail("stsc: truncated header".to_string());
        }
        let count = BigEndian::read_u32(&payload[4..8]) as usize;
        let body = &payload[Self::PREFIX_LEN..];
        if body.len() != count * Self::ENTRY_LEN {
            return fail(format!(
                "stsc: {} entries need {} bytes, found {}",
                count,
                count * Self::ENTRY_LEN,
                body.len()
            ));
        }

        let mut entries: Vec<ChunkSamples> = body
            .chunks_exact(Self::ENTRY_LEN)
            .map(|e| ChunkSamples {
                chunk_ndx: BigEndian::read_u32(&e[0..4]),
                samples: BigEndian::read_u32(&e[4..8]),
                desc_ndx: BigEndian::read_u32(&e[8..12]),
                chunk_cnt: 0,
            })
            .collect();

        if entries.is_empty() {
            if ref_samples != 0 {
                return fail(format!("stsc: no chunks for {} samples", ref_samples));
            }
            return Ok(entries);
        }
        if entries[0].chunk_ndx != 1 {
            return fail(format!(
                "stsc: first run starts at chunk {}",
                entries[0].chunk_ndx
            ));
        }

        let mut remaining = ref_samples as u64;
        let last = entries.len() - 1;
        for i in 0..last {
            let next = entries[i + 1].chunk_ndx;
            let entry = &mut entries[i];
            if next <= entry.chunk_ndx {
                return fail(format!(
                    "stsc: run at chunk {} is followed by chunk {}",
                    entry.chunk_ndx, next
                ));
            }
            entry.chunk_cnt = next - entry.chunk_ndx;
            let covered = entry.chunk_cnt as u64 * entry.samples as u64;
            if covered > remaining {
                return fail(format!(
                    "stsc: run at chunk {} covers {} samples, only {} left",
                    entry.chunk_ndx, covered, remaining
                ));
            }
            remaining -= covered;
        }

        let tail = &mut entries[last];
        if tail.samples == 0 || remaining == 0 || remaining % tail.samples as u64 != 0 {
            return fail(format!(
                "stsc: {} samples left for a last run of {} samples per chunk",
                remaining, tail.samples
            ));
        }
        tail.chunk_cnt = (remaining / tail.samples as u64) as u32;
        Ok(entries)
    }

    pub(crate) fn set_entries(&mut self, entries: Vec<ChunkSamples>) -> u32 {
        self.total_entries = entries.len() as u32;
        self.total_chunks = entries.iter().map(|e| e.chunk_cnt).sum();
        self.entries = Some(entries);
        self.total_chunks
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.entries.is_some()
    }

    #[inline]
    pub fn chunk_samples_table(&self) -> Option<&[ChunkSamples]> {
        self.entries.as_deref()
    }

    /// Sample count of every chunk, in chunk order.
    pub fn chunk_sample_counts(&self) -> Result<Vec<u32>> {
        let entries = self.loaded()?;
        let mut counts = Vec::with_capacity(self.total_chunks as usize);
        for entry in entries {
            counts.extend(std::iter::repeat(entry.samples).take(entry.chunk_cnt as usize));
        }
        Ok(counts)
    }

    /// Rewrites the runs so they cover exactly `new_total` samples.
    ///
    /// A chunk holding the last kept sample is shortened and becomes a run
    /// of its own.
    pub fn cut_samples(&mut self, new_total: u64) -> Result<()> {
        let entries = self
            .entries
            .as_mut()
            .ok_or_else(|| Mp4Error::IllegalState("stsc: table not loaded".to_string()))?;

        let mut cut = Vec::with_capacity(entries.len() + 1);
        let mut left = new_total;
        for entry in entries.iter() {
            if left == 0 {
                break;
            }
            let run_samples = entry.chunk_cnt as u64 * entry.samples as u64;
            if run_samples <= left {
                cut.push(*entry);
                left -= run_samples;
                continue;
            }

            let full = (left / entry.samples as u64) as u32;
            let partial = (left % entry.samples as u64) as u32;
            if full > 0 {
                cut.push(ChunkSamples {
                    chunk_cnt: full,
                    ..*entry
                });
            }
            if partial > 0 {
                cut.push(ChunkSamples {
                    chunk_ndx: entry.chunk_ndx + full,
                    samples: partial,
                    desc_ndx: entry.desc_ndx,
                    chunk_cnt: 1,
                });
            }
            left = 0;
        }

        if left != 0 {
            return Err(Mp4Error::OutOfRange(format!(
                "stsc: {} samples beyond the chunk runs",
                left
            )));
        }
        *entries = cut;
        self.total_entries = entries.len() as u32;
        self.total_chunks = entries.iter().map(|e| e.chunk_cnt).sum();
        Ok(())
    }

    pub(crate) fn encode_payload(&self, version_flags: &[u8]) -> Result<Vec<u8>> {
        let entries = self.loaded()?;
        let mut out = Vec::with_capacity(Self::PREFIX_LEN + entries.len() * Self::ENTRY_LEN);
        out.extend_from_slice(&version_flags[..4]);
        out.write_u32::<BigEndian>(entries.len() as u32)?;
        for entry in entries {
            out.write_u32::<BigEndian>(entry.chunk_ndx)?;
            out.write_u32::<BigEndian>(entry.samples)?;
            out.write_u32::<BigEndian>(entry.desc_ndx)?;
        }
        Ok(out)
    }

    fn loaded(&self) -> Result<&[ChunkSamples]> {
        self.entries
            .as_deref()
            .ok_or_else(|| Mp4Error::IllegalState("stsc: table not loaded".to_string()))
    }
}
