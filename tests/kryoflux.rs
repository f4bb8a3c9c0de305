mod common;

use common::*;
use fluxdisk::{Disk, DiskError, Stream, TrackBuffer, TrackRaw, TrackType};

/// Picoseconds per tick of the default KryoFlux sample clock.
const PS_PER_TICK: u64 = 41_619;

fn push_sample(out: &mut Vec<u8>, ticks: u32) -> u32 {
    let mut stream_bytes = 0;
    let mut t = ticks;
    while t >= 0x10000 {
        out.push(0x0B);
        stream_bytes += 1;
        t -= 0x10000;
    }
    if (0x0E..=0xFF).contains(&t) {
        out.push(t as u8);
        stream_bytes += 1;
    }
    else {
        // value16 escape covers both very short and long samples
        out.push(0x0C);
        out.push((t >> 8) as u8);
        out.push(t as u8);
        stream_bytes += 3;
    }
    stream_bytes
}

fn push_index(out: &mut Vec<u8>, stream_pos: u32) {
    out.push(0x0D);
    out.push(0x02);
    out.extend_from_slice(&12u16.to_le_bytes());
    out.extend_from_slice(&stream_pos.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // sample counter
    out.extend_from_slice(&0u32.to_le_bytes()); // index counter
}

/// Render a raw track as a KryoFlux capture: an index record, then flux
/// intervals for the requested number of revolutions.
fn kfx_encode(raw: &TrackRaw, revolutions: usize) -> Vec<u8> {
    let ns_per_cell = 200_000_000u64 / raw.bitlen as u64;
    let mut out = Vec::new();
    push_index(&mut out, 0);

    let mut acc_ns = 0u64;
    for _ in 0..revolutions {
        for i in 0..raw.bitlen {
            acc_ns += ns_per_cell * raw.speed[i] as u64 / 1000;
            if raw.bits.get(i).unwrap() {
                let ticks = (acc_ns * 1000 + PS_PER_TICK / 2) / PS_PER_TICK;
                push_sample(&mut out, ticks as u32);
                acc_ns = 0;
            }
        }
    }
    out
}

#[test]
fn test_capture_decodes_amiga_track() {
    init();
    let adf = Scratch::new("capture_src.adf");
    let dsk = Scratch::new("capture_dst.dsk");
    let capture = Scratch::new("captureset_00.0.raw");
    let base = capture.as_str().strip_suffix("00.0.raw").unwrap().to_string();

    // Materialize a known AmigaDOS track as raw bits...
    let payload: Vec<u8> = (0..11 * 512usize).map(|i| (i * 11 % 256) as u8).collect();
    let mut src = Disk::create(adf.as_str()).unwrap();
    assert!(src.write_track_sectors(0, TrackType::AmigaDos, &payload).unwrap());
    src.close().unwrap();

    let src = Disk::open(adf.as_str(), true).unwrap();
    let mut tbuf = TrackBuffer::new();
    src.read_track_raw(&mut tbuf, 0);
    assert!(!tbuf.raw.is_empty());

    // ...render it as flux and run the capture through the PLL.
    std::fs::write(&capture.path, kfx_encode(&tbuf.raw, 3)).unwrap();

    let mut stream = Stream::open(&base).unwrap();
    stream.select_track(0).unwrap();

    let mut dst = Disk::create(dsk.as_str()).unwrap();
    assert!(dst
        .write_track_raw_from_stream(0, TrackType::AmigaDos, &mut stream)
        .unwrap());

    let decoded = dst.read_track_sectors(0).unwrap();
    assert_eq!(&decoded[..], &payload[..]);
    let ti = &dst.info().tracks[0];
    assert_eq!(ti.valid_sectors.count_valid(ti.nr_sectors), 11);

    dst.close().unwrap();
    src.close().unwrap();
}

#[test]
fn test_out_of_sync_capture_is_fatal() {
    init();
    let dsk = Scratch::new("corrupt_dst.dsk");
    let capture = Scratch::new("corruptset_00.0.raw");
    let base = capture.as_str().strip_suffix("00.0.raw").unwrap().to_string();

    // A couple of samples, then a stream-end record whose position is a
    // lie.
    let mut bytes = Vec::new();
    push_index(&mut bytes, 0);
    let mut pos = 0;
    for _ in 0..64 {
        pos += push_sample(&mut bytes, 96);
    }
    bytes.push(0x0D);
    bytes.push(0x03);
    bytes.extend_from_slice(&8u16.to_le_bytes());
    bytes.extend_from_slice(&(pos + 5).to_le_bytes()); // wrong position
    bytes.extend_from_slice(&0u32.to_le_bytes()); // hw status
    std::fs::write(&capture.path, bytes).unwrap();

    let mut stream = Stream::open(&base).unwrap();
    stream.select_track(0).unwrap();

    let mut dst = Disk::create(dsk.as_str()).unwrap();
    assert!(matches!(
        dst.write_track_raw_from_stream(0, TrackType::AmigaDos, &mut stream),
        Err(DiskError::CorruptCapture(_))
    ));
}

#[test]
fn test_missing_capture_set() {
    init();
    assert!(Stream::open("/nonexistent/captureset_").is_err());
}
