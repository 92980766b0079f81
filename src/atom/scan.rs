// src/atom/scan.rs

//! Builds the atom tree from the file.
//!
//! Scanning reads only headers, the few bytes tables need for their counts
//! and the small atoms tracks are described by. Payloads stay on disk until
//! loaded explicitly.

use crate::atom::header::{AtomHeader, tags};
use crate::atom::kind::AtomKind;
use crate::atom::tree::{Atom, AtomId};
use crate::context::Mp4Context;
use crate::tables::track::{self, TrackInfo};
use crate::utils::error::{Mp4Error, Result};
use crate::utils::options::ContextFlags;
use log::{debug, trace, warn};

/// What `init_atom` has to do for one kind.
enum InitStep {
    Scan,
    ReadCounts(usize),
    Nothing,
}

impl Mp4Context {
    /// Scans the payload of `id` as a sequence of child atoms.
    ///
    /// Every child must fit entirely inside its parent; a trailing fragment
    /// shorter than a header is a format error as well.
    pub fn scan_child_atoms(&mut self, id: AtomId, silent: bool) -> Result<()> {
        let (mut pos, end, parent_kind) = {
            let atom = self.tree.get(id)?;
            (atom.payload_offset(), atom.end(), atom.kind.clone())
        };

        while pos < end {
            let header = match self.read_header(pos, end) {
                Ok(header) => header,
                Err(e) => {
                    if !silent {
                        warn!("scan of atom {} stopped at {}: {}", id, pos, e);
                    }
                    return Err(e);
                }
            };

            let kind = AtomKind::for_child(&parent_kind, header.tag);
            let mut child = Atom::new(pos, header, kind);
            child.source_offset = Some(pos);
            let child_id = self.tree.push(child);
            self.tree.attach(id, child_id, None)?;
            trace!(
                "{:indent$}'{}' at {} size {} ({})",
                "",
                header.tag,
                pos,
                header.size,
                self.tree.get(child_id)?.kind.name(),
                indent = 2 * self.tree.get(child_id)?.level as usize
            );

            self.init_atom(child_id, silent)?;
            pos += header.size;
        }
        Ok(())
    }

    /// Initializes a freshly scanned atom according to its kind.
    ///
    /// Containers scan their children, tables read their entry counts and
    /// tracks gather their metadata once their children are known.
    pub fn init_atom(&mut self, id: AtomId, silent: bool) -> Result<()> {
        let step = {
            let kind = &self.tree.get(id)?.kind;
            if kind.is_container() {
                InitStep::Scan
            } else if let Some(len) = kind.table_prefix_len() {
                InitStep::ReadCounts(len)
            } else {
                InitStep::Nothing
            }
        };

        match step {
            InitStep::Scan => {
                self.scan_child_atoms(id, silent)?;
                self.finish_container(id, silent)
            }
            InitStep::ReadCounts(len) => {
                let (at, available, tag) = {
                    let atom = self.tree.get(id)?;
                    (atom.payload_offset(), atom.payload_len(), atom.tag())
                };
                if available < len as u64 {
                    return Err(Mp4Error::Format(format!(
                        "'{}' at {}: {} payload bytes, table needs {}",
                        tag, at, available, len
                    )));
                }
                let mut prefix = vec![0u8; len];
                self.io.read_from(at, &mut prefix)?;
                self.tree.get_mut(id)?.kind.read_counts(&prefix)
            }
            InitStep::Nothing => Ok(()),
        }
    }

    fn read_header(&mut self, pos: u64, end: u64) -> Result<AtomHeader> {
        if end - pos < AtomHeader::COMPACT_LEN {
            return Err(Mp4Error::Format(format!(
                "{} stray bytes at {}",
                end - pos,
                pos
            )));
        }
        let mut head = [0u8; 8];
        self.io.read_from(pos, &mut head)?;

        let mut wide = [0u8; 8];
        let large = if AtomHeader::needs_large_size(&head) {
            if end - pos < AtomHeader::EXTENDED_LEN {
                return Err(Mp4Error::Format(format!(
                    "64-bit header at {} crosses its parent",
                    pos
                )));
            }
            self.io.read_from(pos + AtomHeader::COMPACT_LEN, &mut wide)?;
            Some(&wide)
        } else {
            None
        };

        let header = AtomHeader::parse(&head, large, pos, end)?;
        if header.size > end - pos {
            return Err(Mp4Error::Format(format!(
                "'{}' at {} of size {} crosses its parent ending at {}",
                header.tag, pos, header.size, end
            )));
        }
        Ok(header)
    }

    fn finish_container(&mut self, id: AtomId, silent: bool) -> Result<()> {
        let kind = self.tree.get(id)?.kind.clone();
        match kind {
            AtomKind::Movie { .. } => {
                let count = self.tracks_below(id)?;
                if let AtomKind::Movie { total_tracks } = &mut self.tree.get_mut(id)?.kind {
                    *total_tracks = count;
                }
                Ok(())
            }
            AtomKind::Track(_) => {
                let info = self.read_track_info(id)?;
                self.check_track_duration(id, &info, silent)?;
                self.tree.get_mut(id)?.kind = AtomKind::Track(info);
                Ok(())
            }
            AtomKind::SampleTable(_) => {
                let samples = match self.locate_child(id, tags::STSZ) {
                    Some(stsz) => self.stsz(stsz)?.total_samples,
                    None => 0,
                };
                let chunks = match self.locate_stco_atom(id) {
                    Some(stco) => self.chunk_offsets(stco)?.total_chunks,
                    None => 0,
                };
                let state = self.sample_table_mut(id)?;
                state.total_samples = samples;
                state.total_chunks = chunks;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn tracks_below(&self, moov: AtomId) -> Result<u32> {
        let children = &self.tree.get(moov)?.children;
        let mut count = 0;
        for &child in children {
            if matches!(self.tree.get(child)?.kind, AtomKind::Track(_)) {
                count += 1;
            }
        }
        Ok(count)
    }

    fn read_track_info(&mut self, trak: AtomId) -> Result<TrackInfo> {
        let mut info = TrackInfo::default();

        if let Some(hdlr) = self.locate_path(trak, &[tags::MDIA, tags::HDLR]) {
            info.track_type = Some(track::parse_handler(&self.peek_payload(hdlr)?)?);
        }
        if let Some(stsd) =
            self.locate_path(trak, &[tags::MDIA, tags::MINF, tags::STBL, tags::STSD])
        {
            info.format = track::parse_sample_format(&self.peek_payload(stsd)?)?;
        }

        let mdhd = self
            .locate_mdhd_atom(trak)
            .ok_or_else(|| Mp4Error::Format(format!("trak {} has no mdhd", trak)))?;
        let (version, time_scale, duration) =
            track::parse_media_header(&self.peek_payload(mdhd)?)?;
        info.mdhd_version = version;
        info.time_scale = time_scale;
        info.duration = duration;
        Ok(info)
    }

    fn check_track_duration(&self, trak: AtomId, info: &TrackInfo, silent: bool) -> Result<()> {
        if info.duration != 0 {
            return Ok(());
        }
        if info.is_metadata()
            && self
                .flags()
                .contains(ContextFlags::ALLOW_DATA_TRACK_DURATION_0)
        {
            debug!("metadata trak {} accepted with zero duration", trak);
            return Ok(());
        }
        let msg = format!(
            "trak {} ({}) has zero media duration",
            trak,
            info.track_type
                .map(|t| t.to_string())
                .unwrap_or_else(|| "no handler".to_string())
        );
        if !silent {
            warn!("{}", msg);
        }
        Err(Mp4Error::InvalidData(msg))
    }

    /// Reads a small payload without keeping it on the atom.
    fn peek_payload(&mut self, id: AtomId) -> Result<Vec<u8>> {
        let (at, len) = {
            let atom = self.tree.get(id)?;
            (atom.payload_offset(), atom.payload_len())
        };
        let mut buf = vec![0u8; len as usize];
        self.io.read_from(at, &mut buf)?;
        Ok(buf)
    }
}
