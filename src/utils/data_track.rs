//! Reading text samples from the metadata track of a file.

use crate::context::Mp4Context;
use crate::utils::error::{Mp4Error, Result};
use crate::utils::options::{ContextFlags, Mp4Options};
use log::debug;
use std::path::Path;

/// Returns the `ndx`-th (0-based) sample of the metadata track of `path` as
/// text. Trailing NUL bytes are dropped and invalid UTF-8 is replaced.
pub fn data_track_string<P: AsRef<Path>>(path: P, ndx: u32) -> Result<String> {
    let mut ctx = Mp4Options::new()
        .silent(true)
        .flags(ContextFlags::ALLOW_DATA_TRACK_DURATION_0)
        .open(path.as_ref())?;

    let track = ctx.locate_metadata_track_atom().ok_or_else(|| {
        Mp4Error::NotFound(format!("{}: no metadata track", path.as_ref().display()))
    })?;
    let stbl = ctx
        .locate_stbl_atom(track)
        .ok_or_else(|| Mp4Error::Format(format!("metadata trak {} has no stbl", track)))?;
    ctx.load_tables(stbl, false, true)?;

    let bytes = ctx.read_sample(stbl, ndx)?;
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
    let text = String::from_utf8_lossy(&bytes[..end]).into_owned();
    debug!("{}: data sample {} is {} bytes", ctx.path().display(), ndx, bytes.len());
    ctx.close()?;
    Ok(text)
}
