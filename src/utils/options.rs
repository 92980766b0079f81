//! Per-context configuration.
//!
//! Mirrors the shape of `std::fs::OpenOptions`: build an `Mp4Options`, then
//! call `open` to get an `Mp4Context`.

use crate::context::Mp4Context;
use crate::utils::error::Result;
use bitflags::bitflags;
use std::path::Path;

bitflags! {
    /// Behaviour switches carried by one `Mp4Context`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ContextFlags: u32 {
        /// Accept metadata tracks whose media duration is zero.
        const ALLOW_DATA_TRACK_DURATION_0 = 0x0000_0001;
    }
}

/// Options used to open an MP4 file.
#[derive(Debug, Clone, Default)]
pub struct Mp4Options {
    read_write: bool,
    silent: bool,
    flags: ContextFlags,
}

impl Mp4Options {
    /// Read-only, logging enabled, no flags.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the file for writing as well as reading.
    #[inline]
    pub fn read_write(&mut self, read_write: bool) -> &mut Self {
        self.read_write = read_write;
        self
    }

    /// Suppresses warning and error logs emitted while scanning.
    #[inline]
    pub fn silent(&mut self, silent: bool) -> &mut Self {
        self.silent = silent;
        self
    }

    /// Sets the context flags.
    #[inline]
    pub fn flags(&mut self, flags: ContextFlags) -> &mut Self {
        self.flags = flags;
        self
    }

    #[inline]
    pub fn is_read_write(&self) -> bool {
        self.read_write
    }

    #[inline]
    pub fn is_silent(&self) -> bool {
        self.silent
    }

    #[inline]
    pub fn context_flags(&self) -> ContextFlags {
        self.flags
    }

    /// Opens `path` and scans its atom tree with these options.
    pub fn open<P: AsRef<Path>>(&self, path: P) -> Result<Mp4Context> {
        Mp4Context::open_with(path, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let mut options = Mp4Options::new();
        options
            .read_write(true)
            .silent(true)
            .flags(ContextFlags::ALLOW_DATA_TRACK_DURATION_0);

        assert!(options.is_read_write());
        assert!(options.is_silent());
        assert!(
            options
                .context_flags()
                .contains(ContextFlags::ALLOW_DATA_TRACK_DURATION_0)
        );
    }

    #[test]
    fn defaults_are_read_only() {
        let options = Mp4Options::new();
        assert!(!options.is_read_write());
        assert!(!options.is_silent());
        assert!(options.context_flags().is_empty());
    }
}
