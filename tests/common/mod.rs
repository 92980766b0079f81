//! Byte-level builder for the MP4 files used by the integration tests.
//!
//! The layout is `ftyp`, `mdat`, `moov` with a video track (20 samples) and a
//! metadata track (3 text samples).

#![allow(dead_code)]

use std::io::Write;
use tempfile::NamedTempFile;

pub const VIDEO_SAMPLES: u32 = 20;
pub const VIDEO_TIMES: [(u32, u32); 2] = [(15, 1000), (5, 2000)];
pub const VIDEO_RUNS: [(u32, u32, u32); 2] = [(1, 4, 1), (4, 8, 1)];
pub const VIDEO_KEYS: [u32; 2] = [1, 11];
pub const META_TEXT: [&str; 3] = ["alpha", "beta", "gamma"];

pub const FTYP_SIZE: u64 = 20;
pub const MDAT_OFFSET: u64 = FTYP_SIZE;

pub fn video_sample_size(i: u32) -> u32 {
    10 + i
}

pub fn video_sample(i: u32) -> Vec<u8> {
    vec![i as u8 + 1; video_sample_size(i) as usize]
}

pub fn be32(v: u32) -> [u8; 4] {
    v.to_be_bytes()
}

/// A leaf atom with a compact header.
pub fn atom(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + payload.len());
    out.extend_from_slice(&be32(8 + payload.len() as u32));
    out.extend_from_slice(tag);
    out.extend_from_slice(payload);
    out
}

/// A leaf atom with a 64-bit size.
pub fn extended_atom(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + payload.len());
    out.extend_from_slice(&be32(1));
    out.extend_from_slice(tag);
    out.extend_from_slice(&(16 + payload.len() as u64).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

pub fn container(tag: &[u8; 4], children: &[Vec<u8>]) -> Vec<u8> {
    atom(tag, &children.concat())
}

fn full_box(entries: &[&[u8]]) -> Vec<u8> {
    let mut p = vec![0, 0, 0, 0];
    p.extend_from_slice(&be32(entries.len() as u32));
    for e in entries {
        p.extend_from_slice(e);
    }
    p
}

pub fn stts(runs: &[(u32, u32)]) -> Vec<u8> {
    let entries: Vec<Vec<u8>> = runs
        .iter()
        .map(|&(c, d)| [be32(c), be32(d)].concat())
        .collect();
    atom(b"stts", &full_box(&entries.iter().map(Vec::as_slice).collect::<Vec<_>>()))
}

pub fn stss(keys: &[u32]) -> Vec<u8> {
    let entries: Vec<[u8; 4]> = keys.iter().map(|&k| be32(k)).collect();
    atom(b"stss", &full_box(&entries.iter().map(|e| &e[..]).collect::<Vec<_>>()))
}

pub fn stsz(sizes: &[u32]) -> Vec<u8> {
    let mut p = vec![0, 0, 0, 0];
    p.extend_from_slice(&be32(0));
    p.extend_from_slice(&be32(sizes.len() as u32));
    for &s in sizes {
        p.extend_from_slice(&be32(s));
    }
    atom(b"stsz", &p)
}

pub fn stsc(runs: &[(u32, u32, u32)]) -> Vec<u8> {
    let entries: Vec<Vec<u8>> = runs
        .iter()
        .map(|&(c, s, d)| [be32(c), be32(s), be32(d)].concat())
        .collect();
    atom(b"stsc", &full_box(&entries.iter().map(Vec::as_slice).collect::<Vec<_>>()))
}

pub fn stco(offsets: &[u32]) -> Vec<u8> {
    let entries: Vec<[u8; 4]> = offsets.iter().map(|&o| be32(o)).collect();
    atom(b"stco", &full_box(&entries.iter().map(|e| &e[..]).collect::<Vec<_>>()))
}

pub fn stsd(format: &[u8; 4]) -> Vec<u8> {
    let mut entry = be32(16).to_vec();
    entry.extend_from_slice(format);
    entry.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 1]);
    atom(b"stsd", &full_box(&[entry.as_slice()]))
}

pub fn mdhd(time_scale: u32, duration: u32) -> Vec<u8> {
    let mut p = vec![0u8; 24];
    p[12..16].copy_from_slice(&be32(time_scale));
    p[16..20].copy_from_slice(&be32(duration));
    atom(b"mdhd", &p)
}

pub fn hdlr(handler: &[u8; 4]) -> Vec<u8> {
    let mut p = vec![0u8; 25];
    p[8..12].copy_from_slice(handler);
    atom(b"hdlr", &p)
}

fn track(handler: &[u8; 4], format: &[u8; 4], duration: u32, tables: Vec<Vec<u8>>) -> Vec<u8> {
    let mut stbl_children = vec![stsd(format)];
    stbl_children.extend(tables);
    container(
        b"trak",
        &[
            atom(b"tkhd", &[0u8; 84]),
            container(
                b"mdia",
                &[
                    mdhd(1000, duration),
                    hdlr(handler),
                    container(b"minf", &[container(b"stbl", &stbl_children)]),
                ],
            ),
        ],
    )
}

/// Offsets of the video chunks and of the metadata samples inside the file.
pub fn layout() -> (Vec<u32>, Vec<u32>) {
    let mut at = (MDAT_OFFSET + 8) as u32;
    let mut video = Vec::new();
    let mut sample = 0;
    for (run, &(first, per_chunk, _)) in VIDEO_RUNS.iter().enumerate() {
        let chunks = match VIDEO_RUNS.get(run + 1) {
            Some(&(next, _, _)) => next - first,
            None => (VIDEO_SAMPLES - sample) / per_chunk,
        };
        for _ in 0..chunks {
            video.push(at);
            for _ in 0..per_chunk {
                at += video_sample_size(sample);
                sample += 1;
            }
        }
    }
    let mut meta = Vec::new();
    for text in META_TEXT {
        meta.push(at);
        at += text.len() as u32;
    }
    (video, meta)
}

pub fn media_data() -> Vec<u8> {
    let mut data: Vec<u8> = (0..VIDEO_SAMPLES).flat_map(video_sample).collect();
    for text in META_TEXT {
        data.extend_from_slice(text.as_bytes());
    }
    data
}

/// The complete test file. `meta_duration` is the `mdhd` duration of the
/// metadata track.
pub fn sample_mp4(meta_duration: u32) -> Vec<u8> {
    let (video_offsets, meta_offsets) = layout();
    let video_total: u32 = VIDEO_TIMES.iter().map(|&(c, d)| c * d).sum();

    let video = track(
        b"vide",
        b"avc1",
        video_total,
        vec![
            stts(&VIDEO_TIMES),
            stss(&VIDEO_KEYS),
            stsz(&(0..VIDEO_SAMPLES).map(video_sample_size).collect::<Vec<_>>()),
            stsc(&VIDEO_RUNS),
            stco(&video_offsets),
        ],
    );
    let meta = track(
        b"meta",
        b"mett",
        meta_duration,
        vec![
            stts(&[(3, 1000)]),
            stsz(&META_TEXT.iter().map(|t| t.len() as u32).collect::<Vec<_>>()),
            stsc(&[(1, 1, 1)]),
            stco(&meta_offsets),
        ],
    );

    let mut ftyp = b"isom".to_vec();
    ftyp.extend_from_slice(&be32(0x200));
    ftyp.extend_from_slice(b"isom");

    [
        atom(b"ftyp", &ftyp),
        atom(b"mdat", &media_data()),
        container(b"moov", &[atom(b"mvhd", &[0u8; 100]), video, meta]),
    ]
    .concat()
}

pub fn write_temp(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(bytes).expect("Failed to write temp file");
    file.flush().expect("Failed to flush temp file");
    file
}
