// src/atom/sync.rs

//! Size recalculation and serialization.
//!
//! Edits happen in memory first. `sync_data` then walks the tree bottom-up,
//! re-encodes loaded tables and lays atoms out back to back; `save` writes
//! the result depth-first.

use crate::atom::header::{AtomHeader, SizeForm};
use crate::atom::kind::AtomKind;
use crate::atom::tree::AtomId;
use crate::context::Mp4Context;
use crate::utils::error::{Mp4Error, Result};
use log::{debug, trace};

impl Mp4Context {
    /// Places `id` at `offset`, recomputes its size from its children or
    /// payload and returns the new size.
    ///
    /// Loaded tables are encoded before anything is relaid out, so on error
    /// the tree is left as it was.
    pub fn sync_data(&mut self, id: AtomId, offset: u64) -> Result<u64> {
        let mut encoded = Vec::new();
        self.encode_loaded_tables(id, &mut encoded)?;
        for (table, payload) in encoded {
            self.tree.get_mut(table)?.payload = Some(payload);
        }
        self.lay_out(id, offset)
    }

    fn encode_loaded_tables(&self, id: AtomId, out: &mut Vec<(AtomId, Vec<u8>)>) -> Result<()> {
        let atom = self.tree.get(id)?;
        if atom.is_container() {
            for &child in &atom.children {
                self.encode_loaded_tables(child, out)?;
            }
            return Ok(());
        }
        if !atom.kind.is_table_loaded() {
            return Ok(());
        }
        let version_flags: [u8; 4] = atom
            .payload
            .as_deref()
            .and_then(|p| p.get(..4))
            .and_then(|vf| vf.try_into().ok())
            .ok_or_else(|| {
                Mp4Error::IllegalState(format!(
                    "'{}' table loaded without its payload",
                    atom.tag()
                ))
            })?;
        if let Some(payload) = atom.kind.encode_table(&version_flags) {
            out.push((id, payload?));
        }
        Ok(())
    }

    fn lay_out(&mut self, id: AtomId, offset: u64) -> Result<u64> {
        let (children, container, header_len) = {
            let atom = self.tree.get(id)?;
            (atom.children.clone(), atom.is_container(), atom.header_len())
        };

        let size = if container {
            let mut pos = offset + header_len;
            let last = children.len().checked_sub(1);
            for (i, child) in children.into_iter().enumerate() {
                if Some(i) != last {
                    self.pin_to_end_size(child)?;
                }
                pos += self.lay_out(child, pos)?;
            }
            pos - offset
        } else {
            let atom = self.tree.get(id)?;
            match &atom.payload {
                Some(payload) => header_len + payload.len() as u64,
                None => atom.size(),
            }
        };

        let atom = self.tree.get_mut(id)?;
        if atom.offset != offset || atom.header.size != size {
            trace!(
                "'{}' {} -> offset {} size {} (was {} / {})",
                atom.tag(),
                id,
                offset,
                size,
                atom.offset,
                atom.header.size
            );
        }
        atom.offset = offset;
        atom.header.size = size;
        Ok(size)
    }

    /// A to-end atom followed by a sibling needs an explicit size field.
    fn pin_to_end_size(&mut self, id: AtomId) -> Result<()> {
        let atom = self.tree.get_mut(id)?;
        if atom.header.form != SizeForm::ToEnd {
            return Ok(());
        }
        if u32::try_from(atom.header.size).is_ok() {
            atom.header.form = SizeForm::Compact;
        } else {
            atom.header.form = SizeForm::Extended;
            atom.header.size += AtomHeader::EXTENDED_LEN - AtomHeader::COMPACT_LEN;
        }
        trace!("'{}' {} no longer runs to the end", atom.tag(), id);
        Ok(())
    }

    /// Writes `id` and everything below it at their synced offsets.
    ///
    /// Leaves are written from their loaded payload. A leaf without one is
    /// only accepted where its bytes already are: media data, whose bytes are
    /// the caller's to move, and atoms that have not moved since scanning.
    /// The whole subtree is checked before the first byte is written.
    pub fn save(&mut self, id: AtomId) -> Result<()> {
        self.check_saveable(id)?;
        self.write_subtree(id)?;
        if matches!(self.tree.get(id)?.kind, AtomKind::Root) {
            debug!(
                "{}: saved tree, {} bytes of atoms",
                self.io.path().display(),
                self.tree.get(id)?.size()
            );
        }
        Ok(())
    }

    fn check_saveable(&self, id: AtomId) -> Result<()> {
        let atom = self.tree.get(id)?;
        if !matches!(atom.kind, AtomKind::Root) {
            atom.header.encode()?;
        }
        if atom.is_container() {
            for &child in &atom.children {
                self.check_saveable(child)?;
            }
            return Ok(());
        }
        if atom.payload.is_none()
            && !matches!(atom.kind, AtomKind::MediaData)
            && atom.source_offset != Some(atom.offset)
        {
            return Err(Mp4Error::IllegalState(format!(
                "'{}' moved to {} without a loaded payload",
                atom.tag(),
                atom.offset
            )));
        }
        Ok(())
    }

    fn write_subtree(&mut self, id: AtomId) -> Result<()> {
        let (children, container, header, offset) = {
            let atom = self.tree.get(id)?;
            let header = match atom.kind {
                AtomKind::Root => None,
                _ => Some(atom.header.encode()?),
            };
            (atom.children.clone(), atom.is_container(), header, atom.offset)
        };

        if let Some(header) = &header {
            self.io.write_at(offset, header)?;
        }

        if container {
            for child in children {
                self.write_subtree(child)?;
            }
        } else {
            let atom = self.tree.get(id)?;
            if let Some(payload) = &atom.payload {
                self.io.write_at(atom.payload_offset(), payload)?;
            }
        }

        self.tree.get_mut(id)?.source_offset = Some(offset);
        Ok(())
    }

    /// Appends `id` and everything below it to `dst` at its cursor and
    /// returns the number of bytes written.
    ///
    /// Leaves without a loaded payload, media data included, are copied
    /// from this file.
    pub fn save_to(&mut self, id: AtomId, dst: &mut Mp4Context) -> Result<u64> {
        let (children, container, header, source, payload_len) = {
            let atom = self.tree.get(id)?;
            let header = match atom.kind {
                AtomKind::Root => Vec::new(),
                _ => atom.header.encode()?,
            };
            let source = atom.source_offset.map(|s| s + atom.header_len());
            (
                atom.children.clone(),
                atom.is_container(),
                header,
                source,
                atom.payload_len(),
            )
        };

        dst.io.write(&header)?;
        let mut written = header.len() as u64;
        if container {
            for child in children {
                written += self.save_to(child, dst)?;
            }
            return Ok(written);
        }

        let atom = self.tree.get(id)?;
        match (&atom.payload, source) {
            (Some(payload), _) => {
                dst.io.write(payload)?;
                written += payload.len() as u64;
            }
            (None, Some(from)) => {
                dst.io.copy_from(&mut self.io, from, payload_len, None)?;
                written += payload_len;
            }
            (None, None) => {
                return Err(Mp4Error::IllegalState(format!(
                    "'{}' has neither a payload nor a place on disk",
                    atom.tag()
                )));
            }
        }
        Ok(written)
    }
}
