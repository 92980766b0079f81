//! Typed behaviour attached to an atom.
//!
//! The tag alone does not decide the kind: a `trak` is only a track inside
//! `moov`, an `stts` only a table inside `stbl`. Everything else is a
//! generic leaf whose bytes pass through untouched.

use crate::atom::header::{FourCc, tags};
use crate::tables::stbl::SampleTableState;
use crate::tables::stco::{ChunkOffsetTable, OffsetWidth};
use crate::tables::stsc::StscTable;
use crate::tables::stss::StssTable;
use crate::tables::stsz::StszTable;
use crate::tables::stts::SttsTable;
use crate::tables::track::TrackInfo;
use crate::utils::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtomKind {
    /// The whole file.
    Root,
    /// Any atom without special handling.
    Generic,
    /// `mdat`; its payload is never loaded into memory.
    MediaData,
    /// `moov`
    Movie { total_tracks: u32 },
    /// `trak`
    Track(TrackInfo),
    /// `mdia`
    Media,
    /// `minf`
    MediaInfo,
    /// `stbl`
    SampleTable(SampleTableState),
    /// `stts`
    TimeToSample(SttsTable),
    /// `stss`
    SyncSample(StssTable),
    /// `stsz`
    SampleSize(StszTable),
    /// `stsc`
    SampleToChunk(StscTable),
    /// `stco` or `co64`
    ChunkOffset(ChunkOffsetTable),
}

impl AtomKind {
    /// Kind of an atom tagged `tag` found inside an atom of kind `parent`.
    pub fn for_child(parent: &AtomKind, tag: FourCc) -> AtomKind {
        match (parent, tag) {
            (AtomKind::Root, tags::MDAT) => AtomKind::MediaData,
            (AtomKind::Root, tags::MOOV) => AtomKind::Movie { total_tracks: 0 },
            (AtomKind::Movie { .. }, tags::TRAK) => AtomKind::Track(TrackInfo::default()),
            (AtomKind::Track(_), tags::MDIA) => AtomKind::Media,
            (AtomKind::Media, tags::MINF) => AtomKind::MediaInfo,
            (AtomKind::MediaInfo, tags::STBL) => AtomKind::SampleTable(SampleTableState::default()),
            (AtomKind::SampleTable(_), tags::STTS) => AtomKind::TimeToSample(SttsTable::default()),
            (AtomKind::SampleTable(_), tags::STSS) => AtomKind::SyncSample(StssTable::default()),
            (AtomKind::SampleTable(_), tags::STSZ) => AtomKind::SampleSize(StszTable::default()),
            (AtomKind::SampleTable(_), tags::STSC) => AtomKind::SampleToChunk(StscTable::default()),
            (AtomKind::SampleTable(_), tags::STCO) => {
                AtomKind::ChunkOffset(ChunkOffsetTable::new(OffsetWidth::U32))
            }
            (AtomKind::SampleTable(_), tags::CO64) => {
                AtomKind::ChunkOffset(ChunkOffsetTable::new(OffsetWidth::U64))
            }
            _ => AtomKind::Generic,
        }
    }

    /// Whether the payload of this kind is a sequence of child atoms.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            AtomKind::Root
                | AtomKind::Movie { .. }
                | AtomKind::Track(_)
                | AtomKind::Media
                | AtomKind::MediaInfo
                | AtomKind::SampleTable(_)
        )
    }

    /// Bytes of payload needed to read a table's counts; `None` for non-tables.
    pub fn table_prefix_len(&self) -> Option<usize> {
        match self {
            AtomKind::TimeToSample(_) => Some(SttsTable::PREFIX_LEN),
            AtomKind::SyncSample(_) => Some(StssTable::PREFIX_LEN),
            AtomKind::SampleSize(_) => Some(StszTable::PREFIX_LEN),
            AtomKind::SampleToChunk(_) => Some(StscTable::PREFIX_LEN),
            AtomKind::ChunkOffset(_) => Some(ChunkOffsetTable::PREFIX_LEN),
            _ => None,
        }
    }

    pub(crate) fn read_counts(&mut self, prefix: &[u8]) -> Result<()> {
        match self {
            AtomKind::TimeToSample(t) => t.read_counts(prefix),
            AtomKind::SyncSample(t) => t.read_counts(prefix),
            AtomKind::SampleSize(t) => t.read_counts(prefix),
            AtomKind::SampleToChunk(t) => t.read_counts(prefix),
            AtomKind::ChunkOffset(t) => t.read_counts(prefix),
            _ => Ok(()),
        }
    }

    /// Whether this is a sample table holding decoded entries.
    pub fn is_table_loaded(&self) -> bool {
        match self {
            AtomKind::TimeToSample(t) => t.is_loaded(),
            AtomKind::SyncSample(t) => t.is_loaded(),
            AtomKind::SampleSize(t) => t.is_loaded(),
            AtomKind::SampleToChunk(t) => t.is_loaded(),
            AtomKind::ChunkOffset(t) => t.is_loaded(),
            _ => false,
        }
    }

    /// Re-serializes decoded entries, or `None` when there is nothing to encode.
    pub(crate) fn encode_table(&self, version_flags: &[u8]) -> Option<Result<Vec<u8>>> {
        if !self.is_table_loaded() {
            return None;
        }
        Some(match self {
            AtomKind::TimeToSample(t) => t.encode_payload(version_flags),
            AtomKind::SyncSample(t) => t.encode_payload(version_flags),
            AtomKind::SampleSize(t) => t.encode_payload(version_flags),
            AtomKind::SampleToChunk(t) => t.encode_payload(version_flags),
            AtomKind::ChunkOffset(t) => t.encode_payload(version_flags),
            _ => return None,
        })
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            AtomKind::Root => "root",
            AtomKind::Generic => "generic",
            AtomKind::MediaData => "media data",
            AtomKind::Movie { .. } => "movie",
            AtomKind::Track(_) => "track",
            AtomKind::Media => "media",
            AtomKind::MediaInfo => "media info",
            AtomKind::SampleTable(_) => "sample table",
            AtomKind::TimeToSample(_) => "time to sample",
            AtomKind::SyncSample(_) => "sync sample",
            AtomKind::SampleSize(_) => "sample size",
            AtomKind::SampleToChunk(_) => "sample to chunk",
            AtomKind::ChunkOffset(_) => "chunk offset",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_depends_on_parent() {
        let movie = AtomKind::for_child(&AtomKind::Root, tags::MOOV);
        assert!(matches!(movie, AtomKind::Movie { total_tracks: 0 }));
        assert!(matches!(AtomKind::for_child(&movie, tags::TRAK), AtomKind::Track(_)));
        assert_eq!(AtomKind::for_child(&AtomKind::Root, tags::TRAK), AtomKind::Generic);
        assert_eq!(AtomKind::for_child(&AtomKind::Root, tags::FTYP), AtomKind::Generic);
        assert_eq!(AtomKind::for_child(&AtomKind::Root, tags::MDAT), AtomKind::MediaData);

        let stbl = AtomKind::SampleTable(SampleTableState::default());
        match AtomKind::for_child(&stbl, tags::CO64) {
            AtomKind::ChunkOffset(t) => assert_eq!(t.width, OffsetWidth::U64),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(AtomKind::for_child(&stbl, tags::STSD), AtomKind::Generic);
        assert_eq!(AtomKind::for_child(&stbl, FourCc::new(b"sgpd")), AtomKind::Generic);
    }

    #[test]
    fn containers_and_tables() {
        assert!(AtomKind::Media.is_container());
        assert!(!AtomKind::MediaData.is_container());
        assert_eq!(
            AtomKind::SampleSize(StszTable::default()).table_prefix_len(),
            Some(12)
        );
        assert_eq!(AtomKind::Generic.table_prefix_len(), None);
        assert!(AtomKind::Generic.encode_table(&[0; 4]).is_none());
    }
}
