// src/context.rs

//! The open file and its atom tree.

use crate::atom::header::{AtomHeader, tags};
use crate::atom::kind::AtomKind;
use crate::atom::tree::{Atom, AtomId, AtomTree};
use crate::io::byte_io::ByteIo;
use crate::utils::error::{Mp4Error, Result};
use crate::utils::options::{ContextFlags, Mp4Options};
use log::{debug, warn};
use std::path::Path;

/// One MP4 file opened for inspection or in-place editing.
///
/// The context owns the file handle and every atom scanned from it. Atom
/// operations take an `AtomId` obtained from this context.
#[derive(Debug)]
pub struct Mp4Context {
    pub(crate) io: ByteIo,
    pub(crate) tree: AtomTree,
    root: AtomId,
    flags: ContextFlags,
    silent: bool,
}

impl Mp4Context {
    /// Opens `path` and scans its atoms with default flags.
    pub fn open<P: AsRef<Path>>(path: P, read_write: bool, silent: bool) -> Result<Self> {
        Self::open_with(path, Mp4Options::new().read_write(read_write).silent(silent))
    }

    /// Opens `path` and scans its atoms with `options`.
    pub fn open_with<P: AsRef<Path>>(path: P, options: &Mp4Options) -> Result<Self> {
        let path = path.as_ref();
        let silent = options.is_silent();
        let io = ByteIo::open(path, options.is_read_write()).map_err(|e| {
            if !silent {
                warn!("cannot open {}: {}", path.display(), e);
            }
            e
        })?;

        let (tree, root) = AtomTree::with_root(io.len());
        let mut ctx = Mp4Context {
            io,
            tree,
            root,
            flags: options.context_flags(),
            silent,
        };
        ctx.init_atom(root, silent)?;

        debug!(
            "{}: {} bytes, {} atoms, {} tracks",
            path.display(),
            ctx.file_size(),
            ctx.tree.len(),
            ctx.tracks().len()
        );
        Ok(ctx)
    }

    /// Creates (or truncates) `path` as a writable file with an empty tree.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let io = ByteIo::create(path)?;
        let (tree, root) = AtomTree::with_root(0);
        Ok(Mp4Context {
            io,
            tree,
            root,
            flags: ContextFlags::empty(),
            silent: false,
        })
    }

    #[inline]
    pub fn root(&self) -> AtomId {
        self.root
    }

    #[inline]
    pub fn flags(&self) -> ContextFlags {
        self.flags
    }

    #[inline]
    pub fn is_silent(&self) -> bool {
        self.silent
    }

    #[inline]
    pub fn path(&self) -> &Path {
        self.io.path()
    }

    pub fn atom(&self, id: AtomId) -> Result<&Atom> {
        self.tree.get(id)
    }

    pub fn atom_mut(&mut self, id: AtomId) -> Result<&mut Atom> {
        self.tree.get_mut(id)
    }

    /// The arena behind this context, for walking it directly.
    pub fn tree(&self) -> &AtomTree {
        &self.tree
    }

    #[inline]
    pub fn file_size(&self) -> u64 {
        self.io.len()
    }

    pub fn seek(&mut self, offset: u64) -> Result<()> {
        self.io.seek(offset)
    }

    /// Reads exactly `buf.len()` bytes at the cursor.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        self.io.read(buf)
    }

    /// Reads at `offset`; the cursor does not move.
    pub fn read_from(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.io.read_from(offset, buf)
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.io.write(buf)
    }

    pub fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.io.write_at(offset, buf)
    }

    /// Copies `total` bytes at `from` in `src` to `to` (or the cursor) here.
    pub fn copy_from(
        &mut self,
        src: &mut Mp4Context,
        from: u64,
        total: u64,
        to: Option<u64>,
    ) -> Result<()> {
        self.io.copy_from(&mut src.io, from, total, to)
    }

    /// Moves `size` bytes from `from` to `to` inside this file; the ranges
    /// may overlap.
    pub fn move_chunk(&mut self, from: u64, to: u64, size: u64) -> Result<()> {
        self.io.copy_within(from, size, to)
    }

    /// Truncates the file after its last top-level atom. Never grows it.
    ///
    /// Returns the resulting file size.
    pub fn repack_file_size(&mut self) -> Result<u64> {
        let mut end = 0;
        for &child in &self.tree.get(self.root)?.children {
            end = end.max(self.tree.get(child)?.end());
        }
        let len = self.io.len();
        if len > end {
            self.io.truncate(end)?;
            self.io.flush()?;
            debug!("{}: repacked from {} to {} bytes", self.path().display(), len, end);
        }
        Ok(self.io.len())
    }

    /// Flushes and closes the file.
    pub fn close(mut self) -> Result<()> {
        self.io.flush()?;
        debug!("{}: closed", self.io.path().display());
        Ok(())
    }

    /// Creates an in-memory `free` atom of `size` bytes under `parent`,
    /// placed before the first child at or after `offset`.
    ///
    /// The payload is zero-filled and loaded, so the atom can be saved
    /// anywhere after the next `sync_data`.
    pub fn new_child_free_atom(&mut self, parent: AtomId, offset: u64, size: u64) -> Result<AtomId> {
        if size < AtomHeader::COMPACT_LEN {
            return Err(Mp4Error::OutOfRange(format!(
                "free atom of {} bytes is smaller than its header",
                size
            )));
        }
        let index = {
            let p = self.tree.get(parent)?;
            let mut index = p.children.len();
            for (i, &child) in p.children.iter().enumerate() {
                if self.tree.get(child)?.offset >= offset {
                    index = i;
                    break;
                }
            }
            index
        };

        let mut atom = Atom::new(offset, AtomHeader::new(tags::FREE, size), AtomKind::Generic);
        atom.payload = Some(vec![0u8; (size - AtomHeader::COMPACT_LEN) as usize]);
        let id = self.tree.push(atom);
        self.tree.attach(parent, id, Some(index))?;
        Ok(id)
    }

    /// Attaches the detached atom `child` under `parent` at `index`.
    pub fn insert_child(&mut self, parent: AtomId, child: AtomId, index: usize) -> Result<()> {
        self.tree.attach(parent, child, Some(index))
    }

    /// Attaches the detached atom `child` as the last child of `parent`.
    pub fn append_child(&mut self, parent: AtomId, child: AtomId) -> Result<()> {
        self.tree.attach(parent, child, None)
    }

    /// Unlinks `id` from its parent. Its subtree stays valid and can be
    /// attached again.
    pub fn detach(&mut self, id: AtomId) -> Result<()> {
        if id == self.root {
            return Err(Mp4Error::IllegalState("the root cannot be detached".to_string()));
        }
        self.tree.detach(id)
    }

    /// Dumps the subtree at `id` to the debug log.
    pub fn log_tree(&self, id: AtomId) -> Result<()> {
        let atom = self.tree.get(id)?;
        debug!(
            "{:indent$}'{}' {} offset {} size {}{}{}",
            "",
            atom.tag(),
            atom.kind().name(),
            atom.offset(),
            atom.size(),
            if atom.has_extended_size() { " (extended)" } else { "" },
            if atom.payload().is_some() { " [loaded]" } else { "" },
            indent = 2 * atom.level() as usize
        );
        for &child in atom.children() {
            self.log_tree(child)?;
        }
        Ok(())
    }
}
