// src/atom/tree.rs

//! Arena holding the atoms of one file.
//!
//! Atoms refer to each other through `AtomId`s; the parent link is an id, so
//! there are no reference cycles and nodes can be detached and re-attached
//! freely. Detached nodes stay in the arena until the context is dropped.

use crate::atom::header::{AtomHeader, FourCc, tags};
use crate::atom::kind::AtomKind;
use crate::utils::error::{Mp4Error, Result};
use std::fmt;

/// Index of an atom inside its context's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtomId(pub(crate) usize);

impl AtomId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for AtomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One atom: header, position, optional payload and typed state.
#[derive(Debug, Clone)]
pub struct Atom {
    pub(crate) parent: Option<AtomId>,
    pub(crate) children: Vec<AtomId>,
    pub(crate) level: u32,
    pub(crate) offset: u64,
    /// Offset the atom had on disk when it was scanned or last saved.
    /// `None` for atoms that only exist in memory.
    pub(crate) source_offset: Option<u64>,
    pub(crate) header: AtomHeader,
    pub(crate) payload: Option<Vec<u8>>,
    pub(crate) kind: AtomKind,
}

impl Atom {
    pub(crate) fn new(offset: u64, header: AtomHeader, kind: AtomKind) -> Self {
        Atom {
            parent: None,
            children: Vec::new(),
            level: 0,
            offset,
            source_offset: None,
            header,
            payload: None,
            kind,
        }
    }

    #[inline]
    pub fn tag(&self) -> FourCc {
        self.header.tag
    }

    /// Total size including the header.
    #[inline]
    pub fn size(&self) -> u64 {
        self.header.size
    }

    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[inline]
    pub fn level(&self) -> u32 {
        self.level
    }

    #[inline]
    pub fn header(&self) -> &AtomHeader {
        &self.header
    }

    #[inline]
    pub fn parent(&self) -> Option<AtomId> {
        self.parent
    }

    #[inline]
    pub fn children(&self) -> &[AtomId] {
        &self.children
    }

    #[inline]
    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    #[inline]
    pub fn payload_mut(&mut self) -> Option<&mut Vec<u8>> {
        self.payload.as_mut()
    }

    #[inline]
    pub fn kind(&self) -> &AtomKind {
        &self.kind
    }

    #[inline]
    pub fn kind_mut(&mut self) -> &mut AtomKind {
        &mut self.kind
    }

    /// True when the size is not a plain 32-bit field: either the 64-bit
    /// form or the runs-to-the-end form.
    #[inline]
    pub fn has_extended_size(&self) -> bool {
        self.header.form != crate::atom::header::SizeForm::Compact
    }

    /// Header bytes on disk. The root has none.
    #[inline]
    pub fn header_len(&self) -> u64 {
        match self.kind {
            AtomKind::Root => 0,
            _ => self.header.len(),
        }
    }

    #[inline]
    pub fn payload_offset(&self) -> u64 {
        self.offset + self.header_len()
    }

    #[inline]
    pub fn payload_len(&self) -> u64 {
        self.header.size.saturating_sub(self.header_len())
    }

    /// First byte after the atom.
    #[inline]
    pub fn end(&self) -> u64 {
        self.offset + self.header.size
    }

    #[inline]
    pub fn is_container(&self) -> bool {
        self.kind.is_container()
    }
}

/// Arena of atoms.
#[derive(Debug, Clone, Default)]
pub struct AtomTree {
    nodes: Vec<Atom>,
}

impl AtomTree {
    /// Creates a tree with a root spanning `file_len` bytes.
    pub fn with_root(file_len: u64) -> (Self, AtomId) {
        let mut tree = AtomTree::default();
        let mut root = Atom::new(0, AtomHeader::new(tags::ROOT, file_len), AtomKind::Root);
        root.source_offset = Some(0);
        let id = tree.push(root);
        (tree, id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn push(&mut self, atom: Atom) -> AtomId {
        self.nodes.push(atom);
        AtomId(self.nodes.len() - 1)
    }

    pub fn get(&self, id: AtomId) -> Result<&Atom> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| Mp4Error::OutOfRange(format!("no atom {}", id)))
    }

    pub fn get_mut(&mut self, id: AtomId) -> Result<&mut Atom> {
        self.nodes
            .get_mut(id.0)
            .ok_or_else(|| Mp4Error::OutOfRange(format!("no atom {}", id)))
    }

    /// Returns `true` if `ancestor` is `id` or one of its parents.
    pub fn is_ancestor(&self, ancestor: AtomId, id: AtomId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.nodes.get(current.0).and_then(|a| a.parent);
        }
        false
    }

    /// Links a detached `child` under `parent` at `index` (or last).
    pub(crate) fn attach(&mut self, parent: AtomId, child: AtomId, index: Option<usize>) -> Result<()> {
        let node = self.get(child)?;
        if matches!(node.kind, AtomKind::Root) {
            return Err(Mp4Error::IllegalState(format!(
                "root atom {} cannot be attached",
                child
            )));
        }
        if node.parent.is_some() {
            return Err(Mp4Error::IllegalState(format!(
                "atom {} is already attached",
                child
            )));
        }
        if self.is_ancestor(child, parent) {
            return Err(Mp4Error::IllegalState(format!(
                "atom {} cannot become a child of its descendant {}",
                child, parent
            )));
        }

        let level = {
            let p = self.get_mut(parent)?;
            if !p.is_container() {
                return Err(Mp4Error::NotSupported(format!(
                    "'{}' cannot hold child atoms",
                    p.tag()
                )));
            }
            let at = index.unwrap_or(p.children.len()).min(p.children.len());
            p.children.insert(at, child);
            p.level + 1
        };

        self.get_mut(child)?.parent = Some(parent);
        self.set_level(child, level)
    }

    /// Unlinks `child` from its parent. The node stays in the arena.
    pub(crate) fn detach(&mut self, child: AtomId) -> Result<()> {
        let parent = self.get(child)?.parent;
        if let Some(parent) = parent {
            self.get_mut(parent)?.children.retain(|&c| c != child);
        }
        self.get_mut(child)?.parent = None;
        self.set_level(child, 0)
    }

    fn set_level(&mut self, id: AtomId, level: u32) -> Result<()> {
        let children = {
            let atom = self.get_mut(id)?;
            atom.level = level;
            atom.children.clone()
        };
        for child in children {
            self.set_level(child, level + 1)?;
        }
        Ok(())
    }
}
