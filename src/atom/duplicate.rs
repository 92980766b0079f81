//! Deep copies of atom subtrees, within one context or across two.

use crate::atom::header::AtomHeader;
use crate::atom::kind::AtomKind;
use crate::atom::tree::{Atom, AtomId};
use crate::context::Mp4Context;
use crate::utils::error::{Mp4Error, Result};
use log::debug;

/// A detached copy of a subtree, independent of any arena.
#[derive(Debug, Clone)]
pub struct AtomSnapshot {
    pub header: AtomHeader,
    pub kind: AtomKind,
    pub payload: Option<Vec<u8>>,
    pub children: Vec<AtomSnapshot>,
}

impl AtomSnapshot {
    /// Number of atoms in the snapshot.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(AtomSnapshot::count).sum::<usize>()
    }
}

impl Mp4Context {
    /// Copies the subtree at `id`, decoded table state included.
    ///
    /// Every leaf must have its payload loaded, except media data which is
    /// copied header-only.
    pub fn snapshot(&self, id: AtomId) -> Result<AtomSnapshot> {
        let atom = self.tree.get(id)?;
        if !atom.is_container()
            && atom.payload.is_none()
            && !matches!(atom.kind, AtomKind::MediaData)
        {
            return Err(Mp4Error::IllegalState(format!(
                "'{}' at {}: payload must be loaded before duplication",
                atom.tag(),
                atom.offset
            )));
        }

        let children = atom
            .children
            .iter()
            .map(|&child| self.snapshot(child))
            .collect::<Result<Vec<_>>>()?;
        Ok(AtomSnapshot {
            header: atom.header,
            kind: atom.kind.clone(),
            payload: atom.payload.clone(),
            children,
        })
    }

    /// Adds `snapshot` to this context, under `parent` when given.
    ///
    /// Imported atoms have no place on disk until the next `sync_data`.
    pub fn import(&mut self, snapshot: AtomSnapshot, parent: Option<AtomId>) -> Result<AtomId> {
        let AtomSnapshot {
            header,
            kind,
            payload,
            children,
        } = snapshot;

        let mut atom = Atom::new(0, header, kind);
        atom.payload = payload;
        let id = self.tree.push(atom);
        for child in children {
            self.import(child, Some(id))?;
        }
        if let Some(parent) = parent {
            self.tree.attach(parent, id, None)?;
        }
        Ok(id)
    }

    /// Deep-copies `id` into `dst`, attaching the copy under `parent`.
    pub fn duplicate(
        &self,
        id: AtomId,
        dst: &mut Mp4Context,
        parent: Option<AtomId>,
    ) -> Result<AtomId> {
        let snapshot = self.snapshot(id)?;
        let count = snapshot.count();
        let copy = dst.import(snapshot, parent)?;
        debug!("duplicated {} atoms from {} as {}", count, id, copy);
        Ok(copy)
    }
}
