//! Track metadata gathered from the `hdlr`, `stsd` and `mdhd` atoms of a `trak`.

use crate::atom::header::FourCc;
use crate::utils::error::{Mp4Error, Result};
use byteorder::{BigEndian, ByteOrder};
use std::fmt;

/// Media handler of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackType {
    Video,
    Sound,
    Metadata,
    Other(FourCc),
}

impl TrackType {
    pub fn from_handler(handler: FourCc) -> Self {
        match &handler.0 {
            b"vide" => TrackType::Video,
            b"soun" => TrackType::Sound,
            b"meta" => TrackType::Metadata,
            _ => TrackType::Other(handler),
        }
    }

    pub fn handler(self) -> FourCc {
        match self {
            TrackType::Video => FourCc::new(b"vide"),
            TrackType::Sound => FourCc::new(b"soun"),
            TrackType::Metadata => FourCc::new(b"meta"),
            TrackType::Other(code) => code,
        }
    }
}

impl fmt::Display for TrackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.handler())
    }
}

/// Sample entry format of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackFormat {
    Avc1,
    Sowt,
    Mett,
    Mp4a,
    Other(FourCc),
}

impl TrackFormat {
    pub fn from_code(code: FourCc) -> Self {
        match &code.0 {
            b"avc1" => TrackFormat::Avc1,
            b"sowt" => TrackFormat::Sowt,
            b"mett" => TrackFormat::Mett,
            b"mp4a" => TrackFormat::Mp4a,
            _ => TrackFormat::Other(code),
        }
    }
}

/// What the scanner learned about one track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackInfo {
    /// `None` when the track has no `hdlr` atom.
    pub track_type: Option<TrackType>,
    /// `None` when the track has no sample description.
    pub format: Option<TrackFormat>,
    pub time_scale: u32,
    /// Media duration in `time_scale` units.
    pub duration: u64,
    pub mdhd_version: u8,
}

impl TrackInfo {
    pub fn is_metadata(&self) -> bool {
        self.track_type == Some(TrackType::Metadata)
    }
}

/// Handler type of an `hdlr` payload.
pub fn parse_handler(payload: &[u8]) -> Result<TrackType> {
    if payload.len() < 12 {
        return Err(Mp4Error::Format("hdlr: payload too short".to_string()));
    }
    Ok(TrackType::from_handler(FourCc([
        payload[8], payload[9], payload[10], payload[11],
    ])))
}

/// Format of the first sample entry in an `stsd` payload.
pub fn parse_sample_format(payload: &[u8]) -> Result<Option<TrackFormat>> {
    if payload.len() < 8 {
        return Err(Mp4Error::Format("stsd: payload too short".to_string()));
    }
    if BigEndian::read_u32(&payload[4..8]) == 0 {
        return Ok(None);
    }
    if payload.len() < 16 {
        return Err(Mp4Error::Format("stsd: truncated sample entry".to_string()));
    }
    Ok(Some(TrackFormat::from_code(FourCc([
        payload[12], payload[13], payload[14], payload[15],
    ]))))
}

/// Location of the duration field inside an `mdhd` payload.
fn duration_field(version: u8) -> (usize, usize) {
    if version == 1 { (24, 8) } else { (16, 4) }
}

/// Reads `(version, time_scale, duration)` from an `mdhd` payload.
pub fn parse_media_header(payload: &[u8]) -> Result<(u8, u32, u64)> {
    let version = *payload
        .first()
        .ok_or_else(|| Mp4Error::Format("mdhd: empty payload".to_string()))?;
    let (at, width) = duration_field(version);
    if payload.len() < at + width {
        return Err(Mp4Error::Format(format!(
            "mdhd: version {} payload of {} bytes",
            version,
            payload.len()
        )));
    }
    let time_scale = BigEndian::read_u32(&payload[at - 4..at]);
    let duration = match width {
        8 => BigEndian::read_u64(&payload[at..at + 8]),
        _ => BigEndian::read_u32(&payload[at..at + 4]) as u64,
    };
    Ok((version, time_scale, duration))
}

/// Overwrites the duration field of an `mdhd` payload.
pub fn patch_media_duration(payload: &mut [u8], duration: u64) -> Result<()> {
    let (version, _, _) = parse_media_header(payload)?;
    let (at, width) = duration_field(version);
    if width == 8 {
        BigEndian::write_u64(&mut payload[at..at + 8], duration);
    } else {
        let narrow = u32::try_from(duration).map_err(|_| {
            Mp4Error::OutOfRange(format!("mdhd: duration {} needs version 1", duration))
        })?;
        BigEndian::write_u32(&mut payload[at..at + 4], narrow);
    }
    Ok(())
}
