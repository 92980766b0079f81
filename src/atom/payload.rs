//! Loading, writing back and resizing atom payloads.

use crate::atom::header::AtomHeader;
use crate::atom::kind::AtomKind;
use crate::atom::tree::AtomId;
use crate::context::Mp4Context;
use crate::utils::error::{Mp4Error, Result};
use byteorder::{BigEndian, ByteOrder};
use log::trace;

impl Mp4Context {
    /// Reads the payload of `id` into an owned buffer on the atom and returns
    /// its length.
    ///
    /// Loading twice is a no-op as long as the buffer still matches the
    /// header. Media data is never loaded.
    pub fn load_payload(&mut self, id: AtomId) -> Result<usize> {
        let (at, len) = {
            let atom = self.tree.get(id)?;
            if matches!(atom.kind, AtomKind::MediaData | AtomKind::Root) {
                return Err(Mp4Error::NotSupported(format!(
                    "'{}' payload is not loaded into memory",
                    atom.tag()
                )));
            }
            if let Some(payload) = &atom.payload {
                if payload.len() as u64 == atom.payload_len() {
                    return Ok(payload.len());
                }
                return Err(Mp4Error::IllegalState(format!(
                    "'{}' holds {} payload bytes, header says {}",
                    atom.tag(),
                    payload.len(),
                    atom.payload_len()
                )));
            }
            (atom.payload_offset(), atom.payload_len())
        };

        let mut buf = Vec::new();
        buf.try_reserve_exact(len as usize)
            .map_err(|_| Mp4Error::OutOfMemory(format!("payload of {} bytes", len)))?;
        buf.resize(len as usize, 0);
        self.io.read_from(at, &mut buf)?;
        trace!("atom {}: loaded {} payload bytes from {}", id, len, at);

        self.tree.get_mut(id)?.payload = Some(buf);
        Ok(len as usize)
    }

    /// Reads the payload of `id` into `buf` without keeping it.
    ///
    /// Works for media data too. Returns the number of bytes read.
    pub fn read_payload_into(&mut self, id: AtomId, buf: &mut [u8]) -> Result<usize> {
        let (at, len) = {
            let atom = self.tree.get(id)?;
            (atom.payload_offset(), atom.payload_len() as usize)
        };
        if buf.len() < len {
            return Err(Mp4Error::NotEnoughSpace(format!(
                "payload of {} bytes, buffer of {}",
                len,
                buf.len()
            )));
        }
        self.io.read_from(at, &mut buf[..len])?;
        Ok(len)
    }

    /// Writes the loaded payload of `id` back to its place in the file.
    pub fn update_payload(&mut self, id: AtomId) -> Result<()> {
        let atom = self.tree.get(id)?;
        let payload = atom.payload.as_deref().ok_or_else(|| {
            Mp4Error::IllegalState(format!("'{}' payload not loaded", atom.tag()))
        })?;
        if payload.len() as u64 != atom.payload_len() {
            return Err(Mp4Error::IllegalState(format!(
                "'{}' holds {} payload bytes, header says {}",
                atom.tag(),
                payload.len(),
                atom.payload_len()
            )));
        }
        self.io.write_at(atom.payload_offset(), payload)
    }

    /// Writes `buf` over the start of the payload range of `id`.
    pub fn write_payload_from(&mut self, id: AtomId, buf: &[u8]) -> Result<()> {
        let atom = self.tree.get(id)?;
        if buf.len() as u64 > atom.payload_len() {
            return Err(Mp4Error::NotEnoughSpace(format!(
                "'{}' has room for {} bytes, got {}",
                atom.tag(),
                atom.payload_len(),
                buf.len()
            )));
        }
        self.io.write_at(atom.payload_offset(), buf)
    }

    /// Loads the payload of every leaf below `id`. Media data is skipped.
    pub fn load_children_payloads(&mut self, id: AtomId) -> Result<()> {
        let (children, leaf) = {
            let atom = self.tree.get(id)?;
            (atom.children.clone(), !atom.is_container())
        };
        if leaf {
            if matches!(self.tree.get(id)?.kind, AtomKind::MediaData) {
                return Ok(());
            }
            return self.load_payload(id).map(|_| ());
        }
        for child in children {
            self.load_children_payloads(child)?;
        }
        Ok(())
    }

    /// Changes the declared size of `id` to `new_size` bytes, header included.
    ///
    /// A loaded payload follows: the prefix is kept and growth is
    /// zero-filled. Nothing is written to disk.
    pub fn resize(&mut self, id: AtomId, new_size: u64) -> Result<()> {
        let atom = self.tree.get_mut(id)?;
        let header_len = atom.header_len();
        if new_size < header_len {
            return Err(Mp4Error::OutOfRange(format!(
                "'{}': size {} is below the header length {}",
                atom.tag(),
                new_size,
                header_len
            )));
        }
        atom.header.size = new_size;
        if let Some(payload) = atom.payload.as_mut() {
            payload.resize((new_size - header_len) as usize, 0);
        }
        Ok(())
    }

    /// Writes a big-endian `u32` at `offset_in_atom` bytes from the start of
    /// `id`, keeping a loaded payload in step.
    pub fn update_int(&mut self, id: AtomId, offset_in_atom: u64, value: u32) -> Result<()> {
        let at = {
            let atom = self.tree.get_mut(id)?;
            if offset_in_atom + 4 > atom.size() {
                return Err(Mp4Error::OutOfRange(format!(
                    "'{}': field at {} beyond size {}",
                    atom.tag(),
                    offset_in_atom,
                    atom.size()
                )));
            }
            let header_len = atom.header_len();
            if offset_in_atom >= header_len {
                if let Some(payload) = atom.payload.as_mut() {
                    let start = (offset_in_atom - header_len) as usize;
                    if let Some(field) = payload.get_mut(start..start + 4) {
                        BigEndian::write_u32(field, value);
                    }
                }
            }
            atom.offset + offset_in_atom
        };
        trace!("atom {}: u32 {} written at {}", id, value, at);
        self.io.write_at(at, &value.to_be_bytes())
    }

    /// Writes the header of `id`, carrying its current size, to disk.
    pub fn update_size(&mut self, id: AtomId) -> Result<()> {
        let atom = self.tree.get(id)?;
        if matches!(atom.kind, AtomKind::Root) {
            return Ok(());
        }
        let header: AtomHeader = atom.header;
        self.io.write_at(atom.offset, &header.encode()?)
    }
}
