//! Lookup helpers over the atom tree.
//!
//! The per-track helpers accept any of `trak`, `mdia`, `minf` or `stbl` and
//! walk down to the wanted atom, so callers can hold on to whichever level
//! they found first.

use crate::atom::header::{FourCc, tags};
use crate::atom::kind::AtomKind;
use crate::atom::tree::AtomId;
use crate::context::Mp4Context;
use crate::tables::track::{TrackInfo, TrackType};

impl Mp4Context {
    /// First direct child of `parent` tagged `tag`.
    pub fn locate_child(&self, parent: AtomId, tag: FourCc) -> Option<AtomId> {
        let atom = self.tree.get(parent).ok()?;
        atom.children
            .iter()
            .copied()
            .find(|&c| self.tree.get(c).map(|a| a.tag() == tag).unwrap_or(false))
    }

    /// Follows `path` from `from`, one child tag per step.
    pub fn locate_path(&self, from: AtomId, path: &[FourCc]) -> Option<AtomId> {
        path.iter()
            .try_fold(from, |at, &tag| self.locate_child(at, tag))
    }

    pub fn locate_mdat_atom(&self) -> Option<AtomId> {
        self.locate_child(self.root(), tags::MDAT)
    }

    pub fn locate_moov_atom(&self) -> Option<AtomId> {
        self.locate_child(self.root(), tags::MOOV)
    }

    pub fn locate_mvhd_atom(&self) -> Option<AtomId> {
        self.locate_path(self.root(), &[tags::MOOV, tags::MVHD])
    }

    /// All `trak` atoms of the movie, in file order.
    pub fn tracks(&self) -> Vec<AtomId> {
        let Some(moov) = self.locate_moov_atom() else {
            return Vec::new();
        };
        self.tree
            .get(moov)
            .map(|m| {
                m.children
                    .iter()
                    .copied()
                    .filter(|&c| self.track_info(c).is_some())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Metadata of a `trak` atom.
    pub fn track_info(&self, trak: AtomId) -> Option<&TrackInfo> {
        match &self.tree.get(trak).ok()?.kind {
            AtomKind::Track(info) => Some(info),
            _ => None,
        }
    }

    /// First track with the given handler type.
    pub fn locate_track_atom(&self, track_type: TrackType) -> Option<AtomId> {
        self.tracks().into_iter().find(|&t| {
            self.track_info(t)
                .map(|info| info.track_type == Some(track_type))
                .unwrap_or(false)
        })
    }

    pub fn locate_video_track_atom(&self) -> Option<AtomId> {
        self.locate_track_atom(TrackType::Video)
    }

    pub fn locate_audio_track_atom(&self) -> Option<AtomId> {
        self.locate_track_atom(TrackType::Sound)
    }

    pub fn locate_metadata_track_atom(&self) -> Option<AtomId> {
        self.locate_track_atom(TrackType::Metadata)
    }

    pub fn locate_tkhd_atom(&self, trak: AtomId) -> Option<AtomId> {
        self.track_of(trak)
            .and_then(|t| self.locate_child(t, tags::TKHD))
    }

    pub fn locate_mdia_atom(&self, id: AtomId) -> Option<AtomId> {
        match self.tree.get(id).ok()?.tag() {
            tags::MDIA => Some(id),
            tags::TRAK => self.locate_child(id, tags::MDIA),
            _ => None,
        }
    }

    pub fn locate_mdhd_atom(&self, id: AtomId) -> Option<AtomId> {
        let mdia = self
            .locate_mdia_atom(id)
            .or_else(|| self.ancestor_tagged(id, tags::MDIA))?;
        self.locate_child(mdia, tags::MDHD)
    }

    pub fn locate_minf_atom(&self, id: AtomId) -> Option<AtomId> {
        match self.tree.get(id).ok()?.tag() {
            tags::MINF => Some(id),
            tags::TRAK | tags::MDIA => self
                .locate_mdia_atom(id)
                .and_then(|mdia| self.locate_child(mdia, tags::MINF)),
            _ => None,
        }
    }

    pub fn locate_stbl_atom(&self, id: AtomId) -> Option<AtomId> {
        match self.tree.get(id).ok()?.tag() {
            tags::STBL => Some(id),
            tags::TRAK | tags::MDIA | tags::MINF => self
                .locate_minf_atom(id)
                .and_then(|minf| self.locate_child(minf, tags::STBL)),
            _ => None,
        }
    }

    pub fn locate_stts_atom(&self, id: AtomId) -> Option<AtomId> {
        self.locate_table(id, tags::STTS)
    }

    pub fn locate_stss_atom(&self, id: AtomId) -> Option<AtomId> {
        self.locate_table(id, tags::STSS)
    }

    pub fn locate_stsz_atom(&self, id: AtomId) -> Option<AtomId> {
        self.locate_table(id, tags::STSZ)
    }

    pub fn locate_stsc_atom(&self, id: AtomId) -> Option<AtomId> {
        self.locate_table(id, tags::STSC)
    }

    /// The `stco` table, or `co64` when the track uses 64-bit offsets.
    pub fn locate_stco_atom(&self, id: AtomId) -> Option<AtomId> {
        self.locate_table(id, tags::STCO)
            .or_else(|| self.locate_table(id, tags::CO64))
    }

    /// The `trak` containing `id`, or `id` itself.
    pub fn track_of(&self, id: AtomId) -> Option<AtomId> {
        self.ancestor_tagged(id, tags::TRAK)
    }

    fn locate_table(&self, id: AtomId, tag: FourCc) -> Option<AtomId> {
        self.locate_stbl_atom(id)
            .and_then(|stbl| self.locate_child(stbl, tag))
    }

    fn ancestor_tagged(&self, id: AtomId, tag: FourCc) -> Option<AtomId> {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let atom = self.tree.get(current).ok()?;
            if atom.tag() == tag {
                return Some(current);
            }
            cursor = atom.parent;
        }
        None
    }
}
