//! Sample table (`stbl`): loading, cross-checking and editing its tables.
//!
//! The individual table atoms only know their own entries. This module ties
//! them together: sample counts must agree between `stts` and `stsz`, chunk
//! counts between `stsc` and the offset table, and the chunk layout is
//! derived from all three.

use crate::atom::header::tags;
use crate::atom::kind::AtomKind;
use crate::atom::tree::AtomId;
use crate::context::Mp4Context;
use crate::tables::stco::ChunkOffsetTable;
use crate::tables::stsc::StscTable;
use crate::tables::stss::StssTable;
use crate::tables::stsz::StszTable;
use crate::tables::stts::SttsTable;
use crate::tables::track;
use crate::utils::error::{Mp4Error, Result};
use log::{debug, error};

/// A contiguous run of samples in the media data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Chunk {
    /// Index of the `stsc` run the chunk belongs to.
    pub group_ndx: u32,
    pub offset: u64,
    pub total_bytes: u64,
    /// 0-based number of the first sample.
    pub start_sample_ndx: u32,
    pub samples: u32,
}

/// Derived state of an `stbl` atom.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleTableState {
    pub total_chunks: u32,
    pub total_samples: u32,
    /// First byte after the last chunk.
    pub data_end: u64,
    chunks: Option<Vec<Chunk>>,
}

impl SampleTableState {
    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.chunks.is_some()
    }

    #[inline]
    pub fn chunks(&self) -> Option<&[Chunk]> {
        self.chunks.as_deref()
    }

    pub(crate) fn set_chunks(&mut self, chunks: Vec<Chunk>) {
        self.total_chunks = chunks.len() as u32;
        self.total_samples = chunks.iter().map(|c| c.samples).sum();
        self.data_end = chunks
            .iter()
            .map(|c| c.offset + c.total_bytes)
            .max()
            .unwrap_or(0);
        self.chunks = Some(chunks);
    }

    /// The chunk holding the 0-based sample `ndx`.
    pub fn chunk_of_sample(&self, ndx: u32) -> Result<&Chunk> {
        let chunks = self
            .chunks
            .as_deref()
            .ok_or_else(|| Mp4Error::IllegalState("stbl: chunks not loaded".to_string()))?;
        let pos = chunks.partition_point(|c| c.start_sample_ndx <= ndx);
        chunks
            .get(pos.wrapping_sub(1))
            .filter(|c| ndx < c.start_sample_ndx + c.samples)
            .ok_or_else(|| {
                Mp4Error::OutOfRange(format!(
                    "stbl: sample {} of {}",
                    ndx, self.total_samples
                ))
            })
    }
}

/// Builds the chunk layout from loaded `stsc`, offset and `stsz` tables.
pub fn derive_chunks(
    stsc: &StscTable,
    offsets: &ChunkOffsetTable,
    stsz: &StszTable,
) -> Result<Vec<Chunk>> {
    let runs = stsc
        .chunk_samples_table()
        .ok_or_else(|| Mp4Error::IllegalState("stsc: table not loaded".to_string()))?;
    let offsets = offsets
        .offsets()
        .ok_or_else(|| Mp4Error::IllegalState("chunk offsets: table not loaded".to_string()))?;
    if offsets.len() != stsc.total_chunks as usize {
        return Err(Mp4Error::Format(format!(
            "stbl: {} chunk offsets for {} chunks",
            offsets.len(),
            stsc.total_chunks
        )));
    }

    let mut chunks = Vec::with_capacity(offsets.len());
    let mut offsets = offsets.iter();
    let mut start = 0u32;
    for (group, run) in runs.iter().enumerate() {
        for _ in 0..run.chunk_cnt {
            let offset = *offsets.next().ok_or_else(|| {
                Mp4Error::Internal("stbl: chunk offsets exhausted".to_string())
            })?;
            let total_bytes = stsz.iterate_sample_bytes(start, run.samples)?;
            chunks.push(Chunk {
                group_ndx: group as u32,
                offset,
                total_bytes,
                start_sample_ndx: start,
                samples: run.samples,
            });
            start += run.samples;
        }
    }
    Ok(chunks)
}

/// Ids of the table atoms below one `stbl`.
#[derive(Debug, Clone, Copy)]
struct TableIds {
    stts: AtomId,
    stss: Option<AtomId>,
    stsz: AtomId,
    stsc: AtomId,
    stco: AtomId,
}

macro_rules! table_access {
    ($get:ident, $get_mut:ident, $variant:ident, $ty:ty, $what:literal) => {
        #[doc = concat!("The decoded ", $what, " table of atom `id`.")]
        pub fn $get(&self, id: AtomId) -> Result<&$ty> {
            let atom = self.tree.get(id)?;
            match &atom.kind {
                AtomKind::$variant(t) => Ok(t),
                _ => Err(Mp4Error::NotSupported(format!(
                    "'{}' is not an {} table",
                    atom.tag(),
                    $what
                ))),
            }
        }

        pub fn $get_mut(&mut self, id: AtomId) -> Result<&mut $ty> {
            let atom = self.tree.get_mut(id)?;
            let tag = atom.tag();
            match &mut atom.kind {
                AtomKind::$variant(t) => Ok(t),
                _ => Err(Mp4Error::NotSupported(format!(
                    "'{}' is not an {} table",
                    tag, $what
                ))),
            }
        }
    };
}

impl Mp4Context {
    table_access!(stts, stts_mut, TimeToSample, SttsTable, "stts");
    table_access!(stss, stss_mut, SyncSample, StssTable, "stss");
    table_access!(stsz, stsz_mut, SampleSize, StszTable, "stsz");
    table_access!(stsc, stsc_mut, SampleToChunk, StscTable, "stsc");
    table_access!(chunk_offsets, chunk_offsets_mut, ChunkOffset, ChunkOffsetTable, "stco/co64");
    table_access!(sample_table, sample_table_mut, SampleTable, SampleTableState, "stbl");

    /// Loads an `stts` atom and returns its sample count.
    pub fn load_sample_time_table(&mut self, id: AtomId) -> Result<u64> {
        self.stts(id)?;
        self.load_payload(id)?;
        let entries = SttsTable::decode(self.payload_of(id)?)?;
        let table = self.stts_mut(id)?;
        table.set_entries(entries);
        Ok(table.count_samples())
    }

    /// Loads an `stss` atom and returns the number of its last key sample.
    pub fn load_sync_sample_table(&mut self, id: AtomId) -> Result<u32> {
        self.stss(id)?;
        self.load_payload(id)?;
        let indices = StssTable::decode(self.payload_of(id)?)?;
        Ok(self.stss_mut(id)?.set_indices(indices))
    }

    /// Loads an `stsz` atom and returns its sample count.
    pub fn load_sample_bytes_table(&mut self, id: AtomId) -> Result<u32> {
        self.stsz(id)?;
        self.load_payload(id)?;
        let sizes = StszTable::decode(self.payload_of(id)?)?;
        let table = self.stsz_mut(id)?;
        table.set_sizes(sizes);
        Ok(table.total_samples)
    }

    /// Loads an `stsc` atom, checking it covers `ref_samples` samples, and
    /// returns its chunk count.
    pub fn load_chunk_samples_table(
        &mut self,
        id: AtomId,
        ref_samples: u32,
        silent: bool,
    ) -> Result<u32> {
        self.stsc(id)?;
        self.load_payload(id)?;
        let entries = StscTable::decode(self.payload_of(id)?, ref_samples, silent)?;
        Ok(self.stsc_mut(id)?.set_entries(entries))
    }

    /// Loads an `stco` or `co64` atom and returns its chunk count.
    pub fn load_chunk_offset_table(&mut self, id: AtomId) -> Result<u32> {
        let width = self.chunk_offsets(id)?.width;
        self.load_payload(id)?;
        let offsets = ChunkOffsetTable::decode(self.payload_of(id)?, width)?;
        let table = self.chunk_offsets_mut(id)?;
        table.set_offsets(offsets);
        Ok(table.total_chunks)
    }

    /// Loads every table of `stbl`, cross-checks them and derives the chunks.
    ///
    /// The sync-sample table is optional and only loaded with `stss_too`.
    pub fn load_tables(&mut self, stbl: AtomId, stss_too: bool, silent: bool) -> Result<()> {
        let ids = self.table_ids(stbl)?;

        let timed = self.load_sample_time_table(ids.stts)?;
        let sized = self.load_sample_bytes_table(ids.stsz)?;
        if timed != sized as u64 {
            let msg = format!("stbl: stts covers {} samples, stsz {}", timed, sized);
            if !silent {
                error!("{}", msg);
            }
            return Err(Mp4Error::Format(msg));
        }

        if stss_too {
            if let Some(stss) = ids.stss {
                self.load_sync_sample_table(stss)?;
            }
        }

        let grouped = self.load_chunk_samples_table(ids.stsc, sized, silent)?;
        let placed = self.load_chunk_offset_table(ids.stco)?;
        if grouped != placed {
            let msg = format!("stbl: stsc groups {} chunks, offsets list {}", grouped, placed);
            if !silent {
                error!("{}", msg);
            }
            return Err(Mp4Error::Format(msg));
        }

        self.rebuild_chunks(stbl, &ids)?;
        let state = self.sample_table(stbl)?;
        debug!(
            "stbl {}: {} samples in {} chunks, data ends at {}",
            stbl, state.total_samples, state.total_chunks, state.data_end
        );
        Ok(())
    }

    /// Cuts every table of `track` (a `trak`, `mdia`, `minf` or `stbl` id)
    /// down to `new_total` samples and patches the media duration.
    ///
    /// Tables are loaded first when needed. Call `sync_data` and `save`
    /// afterwards to persist the result.
    pub fn cut_track_samples(&mut self, track: AtomId, new_total: u32) -> Result<()> {
        let stbl = self.locate_stbl_atom(track).ok_or_else(|| {
            Mp4Error::Format(format!("atom {} has no sample table", track))
        })?;
        let ids = self.table_ids(stbl)?;
        if !self.sample_table(stbl)?.is_loaded() {
            self.load_tables(stbl, true, self.is_silent())?;
        }
        if let Some(stss) = ids.stss {
            if !self.stss(stss)?.is_loaded() {
                self.load_sync_sample_table(stss)?;
            }
        }

        let n = new_total as u64;
        self.stts_mut(ids.stts)?.cut_samples(n)?;
        self.stsz_mut(ids.stsz)?.cut_samples(n)?;
        if let Some(stss) = ids.stss {
            self.stss_mut(stss)?.cut_samples(n)?;
        }
        let stsc = self.stsc_mut(ids.stsc)?;
        stsc.cut_samples(n)?;
        let chunks = stsc.total_chunks;
        self.chunk_offsets_mut(ids.stco)?.cut_chunks(chunks)?;
        self.rebuild_chunks(stbl, &ids)?;

        let duration = self.stts(ids.stts)?.total_duration();
        if let Some(mdhd) = self.locate_mdhd_atom(track) {
            self.load_payload(mdhd)?;
            let payload = self
                .tree
                .get_mut(mdhd)?
                .payload
                .as_mut()
                .ok_or_else(|| Mp4Error::Internal("mdhd: payload vanished".to_string()))?;
            track::patch_media_duration(payload, duration)?;
        }
        if let Some(trak) = self.track_of(stbl) {
            if let AtomKind::Track(info) = &mut self.tree.get_mut(trak)?.kind {
                info.duration = duration;
            }
        }

        debug!(
            "stbl {}: cut to {} samples, {} chunks, duration {}",
            stbl, new_total, chunks, duration
        );
        Ok(())
    }

    /// Reads the bytes of the 0-based sample `ndx` through the derived chunks.
    pub fn read_sample(&mut self, stbl: AtomId, ndx: u32) -> Result<Vec<u8>> {
        let ids = self.table_ids(stbl)?;
        let chunk = *self.sample_table(stbl)?.chunk_of_sample(ndx)?;
        let stsz = self.stsz(ids.stsz)?;
        let skip = stsz.iterate_sample_bytes(chunk.start_sample_ndx, ndx - chunk.start_sample_ndx)?;
        let len = stsz.iterate_sample_bytes(ndx, 1)?;

        let mut buf = Vec::new();
        buf.try_reserve_exact(len as usize).map_err(|_| {
            Mp4Error::OutOfMemory(format!("sample {} of {} bytes", ndx, len))
        })?;
        buf.resize(len as usize, 0);
        self.read_from(chunk.offset + skip, &mut buf)?;
        Ok(buf)
    }

    fn rebuild_chunks(&mut self, stbl: AtomId, ids: &TableIds) -> Result<()> {
        let chunks = derive_chunks(
            self.stsc(ids.stsc)?,
            self.chunk_offsets(ids.stco)?,
            self.stsz(ids.stsz)?,
        )?;
        self.sample_table_mut(stbl)?.set_chunks(chunks);
        Ok(())
    }

    fn table_ids(&self, stbl: AtomId) -> Result<TableIds> {
        self.sample_table(stbl)?;
        let require = |tag| {
            self.locate_child(stbl, tag).ok_or_else(|| {
                Mp4Error::Format(format!("stbl {}: no '{}' atom", stbl, tag))
            })
        };
        Ok(TableIds {
            stts: require(tags::STTS)?,
            stss: self.locate_child(stbl, tags::STSS),
            stsz: require(tags::STSZ)?,
            stsc: require(tags::STSC)?,
            stco: self
                .locate_child(stbl, tags::STCO)
                .or_else(|| self.locate_child(stbl, tags::CO64))
                .ok_or_else(|| Mp4Error::Format(format!("stbl {}: no chunk offsets", stbl)))?,
        })
    }

    fn payload_of(&self, id: AtomId) -> Result<&[u8]> {
        let atom = self.tree.get(id)?;
        atom.payload().ok_or_else(|| {
            Mp4Error::IllegalState(format!("'{}' payload not loaded", atom.tag()))
        })
    }
}
