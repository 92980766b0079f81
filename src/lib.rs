//! # MP4 Atom Library
//!
//! Reads, inspects and rewrites MP4 (ISO-BMFF) files in place.
//!
//! This library is organized into several modules:
//! - `utils`: error type, open options and small file-level helpers
//! - `io`: random-access byte I/O over one file
//! - `atom`: header codec, the atom arena, scanning, payloads, resync and save
//! - `tables`: sample table codecs (`stts`, `stss`, `stsz`, `stsc`, `stco`/`co64`)
//!   and the track and sample-table logic built on them
//! - `context`: `Mp4Context`, the open file with its atom tree
//!
//! A typical edit opens a context, locates atoms, loads and changes tables,
//! then calls `sync_data(root, 0)`, `save(root)` and `repack_file_size()`.

// Re-export commonly used types at the crate root
pub use atom::header::{AtomHeader, FourCc, SizeForm, tags};
pub use atom::kind::AtomKind;
pub use atom::tree::{Atom, AtomId, AtomTree};
pub use context::Mp4Context;
pub use utils::error::{Mp4Error, Result};
pub use utils::options::{ContextFlags, Mp4Options};

pub mod utils {
    pub mod data_track;
    pub mod error;
    pub mod options;
}

pub mod io {
    pub mod byte_io;
}

pub mod atom {
    pub mod duplicate;
    pub mod header;
    pub mod kind;
    pub mod navigate;
    pub mod payload;
    pub mod scan;
    pub mod sync;
    pub mod tree;
}

pub mod tables {
    pub mod stbl;
    pub mod stco;
    pub mod stsc;
    pub mod stss;
    pub mod stsz;
    pub mod stts;
    pub mod track;
}

pub mod context;
