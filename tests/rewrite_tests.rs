mod common;

use common::*;
use mp4_atoms::tables::track::parse_media_header;
use mp4_atoms::utils::data_track::data_track_string;
use mp4_atoms::{Mp4Context, Mp4Error, tags};

/// Cut the video track to ten samples, save, repack and reopen
#[test]
fn test_cut_track_samples() {
    let original = sample_mp4(3000);
    let file = write_temp(&original);
    {
        let mut ctx = Mp4Context::open(file.path(), true, false).unwrap();
        let root = ctx.root();
        let video = ctx.locate_video_track_atom().unwrap();

        ctx.load_children_payloads(root).unwrap();
        ctx.cut_track_samples(video, 10).expect("Failed to cut samples");
        assert_eq!(ctx.track_info(video).unwrap().duration, 10_000);

        ctx.sync_data(root, 0).unwrap();
        ctx.save(root).unwrap();
        let len = ctx.repack_file_size().unwrap();
        // stts -8, stss -4, stsz -40, stco -4; stsc keeps two runs
        assert_eq!(len, original.len() as u64 - 56);
        ctx.close().unwrap();
    }

    let mut ctx = Mp4Context::open(file.path(), false, false).expect("Failed to reopen");
    let video = ctx.locate_video_track_atom().unwrap();
    assert_eq!(ctx.track_info(video).unwrap().duration, 10_000);
    let stbl = ctx.locate_stbl_atom(video).unwrap();
    ctx.load_tables(stbl, true, false).expect("Cut tables must stay consistent");

    assert_eq!(ctx.sample_table(stbl).unwrap().total_samples, 10);
    let stsc = ctx.stsc(ctx.locate_stsc_atom(video).unwrap()).unwrap();
    assert_eq!(stsc.chunk_sample_counts().unwrap(), vec![4, 4, 2]);
    let stss = ctx.stss(ctx.locate_stss_atom(video).unwrap()).unwrap();
    assert_eq!(stss.key_sample_indices().unwrap(), &[1]);
    let stco = ctx.chunk_offsets(ctx.locate_stco_atom(video).unwrap()).unwrap();
    assert_eq!(stco.total_chunks, 3);

    for i in 0..10 {
        assert_eq!(ctx.read_sample(stbl, i).unwrap(), video_sample(i));
    }

    let mdhd = ctx.locate_mdhd_atom(video).unwrap();
    ctx.load_payload(mdhd).unwrap();
    let (_, time_scale, duration) = parse_media_header(ctx.atom(mdhd).unwrap().payload().unwrap()).unwrap();
    assert_eq!((time_scale, duration), (1000, 10_000));

    // the metadata track sits after the video track and still reads back
    drop(ctx);
    assert_eq!(data_track_string(file.path(), 1).unwrap(), "beta");
}

/// Cutting to every possible length keeps the tables consistent
#[test]
fn test_cut_to_every_length() {
    for n in 0..=VIDEO_SAMPLES {
        let file = write_temp(&sample_mp4(3000));
        let mut ctx = Mp4Context::open(file.path(), true, true).unwrap();
        let video = ctx.locate_video_track_atom().unwrap();
        let stbl = ctx.locate_stbl_atom(video).unwrap();

        ctx.cut_track_samples(stbl, n).unwrap();
        let stts = ctx.stts(ctx.locate_stts_atom(video).unwrap()).unwrap();
        assert_eq!(stts.count_samples(), n as u64, "cut to {}", n);
        let stsz = ctx.stsz(ctx.locate_stsz_atom(video).unwrap()).unwrap();
        assert_eq!(stsz.total_samples, n);
        let state = ctx.sample_table(stbl).unwrap();
        assert_eq!(state.total_samples, n);
        let stsc = ctx.stsc(ctx.locate_stsc_atom(video).unwrap()).unwrap();
        let stco = ctx.chunk_offsets(ctx.locate_stco_atom(video).unwrap()).unwrap();
        assert_eq!(stsc.total_chunks, stco.total_chunks);
    }
}

/// Insert a free atom in front of everything and relocate the media data
#[test]
fn test_insert_free_atom_and_move_media() {
    let original = sample_mp4(3000);
    let file = write_temp(&original);
    {
        let mut ctx = Mp4Context::open(file.path(), true, false).unwrap();
        let root = ctx.root();
        ctx.load_children_payloads(root).unwrap();

        let free = ctx.new_child_free_atom(root, 0, 16).unwrap();
        assert_eq!(ctx.atom(root).unwrap().children()[0], free);

        for track in ctx.tracks() {
            let stco = ctx.locate_stco_atom(track).unwrap();
            ctx.load_chunk_offset_table(stco).unwrap();
            ctx.chunk_offsets_mut(stco).unwrap().shift_offsets(16).unwrap();
        }
        let mdat = ctx.locate_mdat_atom().unwrap();
        let (from, size) = {
            let atom = ctx.atom(mdat).unwrap();
            (atom.offset(), atom.size())
        };
        ctx.move_chunk(from, from + 16, size).unwrap();

        assert_eq!(ctx.sync_data(root, 0).unwrap(), original.len() as u64 + 16);
        assert_eq!(ctx.atom(mdat).unwrap().offset(), from + 16);
        ctx.save(root).unwrap();
        ctx.close().unwrap();
    }

    let ctx = Mp4Context::open(file.path(), false, false).unwrap();
    let root = ctx.root();
    let first = ctx.atom(root).unwrap().children()[0];
    assert_eq!(ctx.atom(first).unwrap().tag(), tags::FREE);
    assert_eq!(ctx.file_size(), original.len() as u64 + 16);
    drop(ctx);

    assert_eq!(data_track_string(file.path(), 0).unwrap(), "alpha");
    assert_eq!(&std::fs::read(file.path()).unwrap()[16..36], &original[..20]);
}

/// A moved leaf needs its payload in memory before it can be saved
#[test]
fn test_save_refuses_unloaded_moved_leaf() {
    let original = sample_mp4(3000);
    let file = write_temp(&original);
    {
        let mut ctx = Mp4Context::open(file.path(), true, true).unwrap();
        let root = ctx.root();
        let moov = ctx.locate_moov_atom().unwrap();

        // grow moov in front of its tracks without loading them
        ctx.new_child_free_atom(moov, 0, 8).unwrap();
        ctx.load_payload(ctx.locate_mvhd_atom().unwrap()).unwrap();
        ctx.sync_data(root, 0).unwrap();
        assert!(matches!(ctx.save(root), Err(Mp4Error::IllegalState(_))));
        ctx.close().unwrap();
    }

    // nothing was written, so the file still scans
    assert_eq!(std::fs::read(file.path()).unwrap(), original);
    let ctx = Mp4Context::open(file.path(), false, true).expect("File must stay intact");
    assert_eq!(ctx.tracks().len(), 2);
}

/// A failing sync leaves offsets, sizes and table payloads untouched
#[test]
fn test_failed_sync_keeps_layout() {
    let file = write_temp(&sample_mp4(3000));
    let mut ctx = Mp4Context::open(file.path(), true, true).unwrap();
    let root = ctx.root();
    let video = ctx.locate_video_track_atom().unwrap();
    let ftyp = ctx.locate_child(root, tags::FTYP).unwrap();
    let stts = ctx.locate_stts_atom(video).unwrap();
    let stco = ctx.locate_stco_atom(video).unwrap();

    ctx.load_children_payloads(root).unwrap();
    ctx.new_child_free_atom(root, 0, 16).unwrap();
    ctx.load_sample_time_table(stts).unwrap();
    ctx.stts_mut(stts).unwrap().cut_samples(10).unwrap();
    ctx.load_chunk_offset_table(stco).unwrap();
    ctx.chunk_offsets_mut(stco).unwrap().set_offset(0, u32::MAX as u64 + 1).unwrap();

    assert!(matches!(ctx.sync_data(root, 0), Err(Mp4Error::OutOfRange(_))));
    assert_eq!(ctx.atom(ftyp).unwrap().offset(), 0);
    assert_eq!(ctx.atom(stts).unwrap().payload().unwrap().len(), 24);
    assert_eq!(ctx.atom(stts).unwrap().size(), 32);

    // once the offset fits again the same tree syncs
    let (offsets, _) = layout();
    ctx.chunk_offsets_mut(stco).unwrap().set_offset(0, offsets[0] as u64).unwrap();
    ctx.sync_data(root, 0).unwrap();
    assert_eq!(ctx.atom(ftyp).unwrap().offset(), 16);
    assert_eq!(ctx.atom(stts).unwrap().payload().unwrap().len(), 16);
}

/// A size-zero atom followed by a new sibling is written with its real size
#[test]
fn test_size_zero_atom_followed_by_sibling() {
    let mut bytes = atom(b"ftyp", b"isom\0\0\0\0");
    bytes.extend_from_slice(&be32(0));
    bytes.extend_from_slice(b"mdat");
    bytes.extend_from_slice(&[7u8; 100]);
    let file = write_temp(&bytes);
    {
        let mut ctx = Mp4Context::open(file.path(), true, false).unwrap();
        let root = ctx.root();
        let mdat = ctx.locate_mdat_atom().unwrap();

        ctx.load_children_payloads(root).unwrap();
        ctx.new_child_free_atom(root, u64::MAX, 16).unwrap();
        assert_eq!(ctx.sync_data(root, 0).unwrap(), bytes.len() as u64 + 16);
        assert!(!ctx.atom(mdat).unwrap().has_extended_size());
        ctx.save(root).unwrap();
        ctx.close().unwrap();
    }

    let mut ctx = Mp4Context::open(file.path(), false, false).expect("Failed to reopen");
    let root = ctx.root();
    let tops: Vec<_> = ctx
        .atom(root)
        .unwrap()
        .children()
        .iter()
        .map(|&c| ctx.atom(c).unwrap().tag())
        .collect();
    assert_eq!(tops, vec![tags::FTYP, tags::MDAT, tags::FREE]);

    let mdat = ctx.locate_mdat_atom().unwrap();
    assert_eq!(ctx.atom(mdat).unwrap().size(), 108);
    let mut buf = [0u8; 100];
    ctx.read_payload_into(mdat, &mut buf).unwrap();
    assert_eq!(buf, [7u8; 100]);
}

/// Deep copy of moov into a new file
#[test]
fn test_duplicate_into_new_file() {
    let original = sample_mp4(3000);
    let file = write_temp(&original);
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("moov_only.mp4");

    let mut src = Mp4Context::open(file.path(), false, false).unwrap();
    let moov = src.locate_moov_atom().unwrap();
    assert!(matches!(
        src.duplicate(moov, &mut Mp4Context::create(&out).unwrap(), None),
        Err(Mp4Error::IllegalState(_))
    ));

    src.load_children_payloads(moov).unwrap();
    let video_stbl = src
        .locate_stbl_atom(src.locate_video_track_atom().unwrap())
        .unwrap();
    src.load_tables(video_stbl, true, false).unwrap();

    let mut dst = Mp4Context::create(&out).unwrap();
    let dst_root = dst.root();
    let copy = src.duplicate(moov, &mut dst, Some(dst_root)).unwrap();
    assert_eq!(dst.atom(copy).unwrap().level(), 1);
    assert_eq!(dst.tracks().len(), 2);

    let copied_stbl = dst
        .locate_stbl_atom(dst.locate_video_track_atom().unwrap())
        .unwrap();
    assert_eq!(
        dst.sample_table(copied_stbl).unwrap().chunks(),
        src.sample_table(video_stbl).unwrap().chunks()
    );

    let moov_offset = src.atom(moov).unwrap().offset() as usize;
    assert_eq!(
        dst.sync_data(dst_root, 0).unwrap(),
        (original.len() - moov_offset) as u64
    );
    dst.save(dst_root).unwrap();
    dst.close().unwrap();

    assert_eq!(std::fs::read(&out).unwrap(), &original[moov_offset..]);
}

/// Duplicating inside one context goes through a snapshot
#[test]
fn test_duplicate_within_context() {
    let file = write_temp(&sample_mp4(3000));
    let mut ctx = Mp4Context::open(file.path(), false, true).unwrap();
    let meta = ctx.locate_metadata_track_atom().unwrap();
    let moov = ctx.locate_moov_atom().unwrap();

    ctx.load_children_payloads(meta).unwrap();
    let snapshot = ctx.snapshot(meta).unwrap();
    assert_eq!(snapshot.count(), 12);
    let copy = ctx.import(snapshot, None).unwrap();
    assert!(ctx.atom(copy).unwrap().parent().is_none());

    ctx.append_child(moov, copy).unwrap();
    assert_eq!(ctx.tracks().len(), 3);
    assert!(matches!(
        ctx.append_child(moov, copy),
        Err(Mp4Error::IllegalState(_))
    ));

    ctx.detach(copy).unwrap();
    assert_eq!(ctx.tracks().len(), 2);
    assert!(matches!(ctx.detach(ctx.root()), Err(Mp4Error::IllegalState(_))));

    // the root never moves under another atom
    assert!(matches!(
        ctx.append_child(copy, ctx.root()),
        Err(Mp4Error::IllegalState(_))
    ));

    // reinserted right after mvhd, in front of the original tracks
    ctx.insert_child(moov, copy, 1).unwrap();
    assert_eq!(ctx.atom(moov).unwrap().children()[1], copy);
    assert_eq!(ctx.tracks()[0], copy);
    ctx.detach(copy).unwrap();

    // an atom cannot move below its own descendant
    let stbl = ctx.locate_stbl_atom(meta).unwrap();
    ctx.detach(moov).unwrap();
    assert!(matches!(
        ctx.append_child(stbl, moov),
        Err(Mp4Error::IllegalState(_))
    ));
    ctx.append_child(ctx.root(), moov).unwrap();
    assert_eq!(ctx.atom(stbl).unwrap().level(), 5);
}

/// Writing the whole tree into another file copies media data from disk
#[test]
fn test_save_to_other_file() {
    let original = sample_mp4(3000);
    let file = write_temp(&original);
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("copy.mp4");

    let mut src = Mp4Context::open(file.path(), false, false).unwrap();
    let mut dst = Mp4Context::create(&out).unwrap();
    let root = src.root();
    let written = src.save_to(root, &mut dst).unwrap();
    assert_eq!(written, original.len() as u64);
    dst.close().unwrap();
    assert_eq!(std::fs::read(&out).unwrap(), original);

    // and the copy can be read back with byte-level helpers
    let mut copy = Mp4Context::open(&out, true, false).unwrap();
    let mut head = [0u8; 8];
    copy.read_from(0, &mut head).unwrap();
    assert_eq!(&head[4..], b"ftyp");
    let mut src_head = [0u8; 8];
    let mut src = Mp4Context::open(file.path(), false, false).unwrap();
    copy.seek(MDAT_OFFSET).unwrap();
    copy.read(&mut head).unwrap();
    src.read_from(MDAT_OFFSET, &mut src_head).unwrap();
    assert_eq!(head, src_head);

    // append the source ftyp once more at the end of the copy
    let end = copy.file_size();
    copy.copy_from(&mut src, 0, FTYP_SIZE, Some(end)).unwrap();
    assert_eq!(copy.file_size(), end + FTYP_SIZE);
    copy.repack_file_size().unwrap();
    assert_eq!(copy.file_size(), end);
}

/// Payload-level edits: resize, update_int, update_size, write_payload_from
#[test]
fn test_payload_edits() {
    let original = sample_mp4(3000);
    let file = write_temp(&original);
    let mut ctx = Mp4Context::open(file.path(), true, false).unwrap();
    let video = ctx.locate_video_track_atom().unwrap();
    let tkhd = ctx.locate_tkhd_atom(video).unwrap();

    assert!(matches!(ctx.update_payload(tkhd), Err(Mp4Error::IllegalState(_))));
    assert_eq!(ctx.load_payload(tkhd).unwrap(), 84);

    ctx.update_int(tkhd, 8 + 4, 0xDEAD_BEEF).unwrap();
    assert_eq!(&ctx.atom(tkhd).unwrap().payload().unwrap()[4..8], &[0xDE, 0xAD, 0xBE, 0xEF]);
    assert!(matches!(ctx.update_int(tkhd, 90, 1), Err(Mp4Error::OutOfRange(_))));

    assert!(matches!(
        ctx.write_payload_from(tkhd, &[0u8; 85]),
        Err(Mp4Error::NotEnoughSpace(_))
    ));
    ctx.write_payload_from(tkhd, &[9u8; 4]).unwrap();

    let offset = ctx.atom(tkhd).unwrap().offset();
    let mut field = [0u8; 8];
    ctx.read_from(offset + 8, &mut field).unwrap();
    assert_eq!(field, [9, 9, 9, 9, 0xDE, 0xAD, 0xBE, 0xEF]);

    ctx.resize(tkhd, 100).unwrap();
    let payload = ctx.atom(tkhd).unwrap().payload().unwrap();
    assert_eq!(payload.len(), 92);
    assert_eq!(&payload[84..], &[0u8; 8]);
    assert!(matches!(ctx.resize(tkhd, 4), Err(Mp4Error::OutOfRange(_))));
    ctx.resize(tkhd, 92).unwrap();
    ctx.update_size(tkhd).unwrap();
    let mut size = [0u8; 4];
    ctx.read_from(offset, &mut size).unwrap();
    assert_eq!(u32::from_be_bytes(size), 92);
}
