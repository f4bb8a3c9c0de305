mod common;

use common::*;
use fluxdisk::{ContainerFormat, Disk, TrackType};

#[test]
fn test_eadf_round_trip() {
    init();
    let scratch = Scratch::new("roundtrip.eadf");

    let payload: Vec<u8> = (0..11 * 512usize).map(|i| (i * 3 % 256) as u8).collect();

    let mut disk = Disk::create(scratch.as_str()).unwrap();
    assert_eq!(disk.container(), ContainerFormat::Eadf);
    assert!(disk.write_track_sectors(0, TrackType::AmigaDos, &payload).unwrap());
    disk.close().unwrap();

    let disk = Disk::open(scratch.as_str(), true).unwrap();
    assert_eq!(disk.container(), ContainerFormat::Eadf);
    assert_eq!(disk.info().nr_tracks(), 160);
    let ti = &disk.info().tracks[0];
    assert_eq!(ti.track_type, TrackType::AmigaDos);
    assert_eq!(&ti.dat[..], &payload[..]);
    assert_eq!(ti.valid_sectors.count_valid(ti.nr_sectors), 11);
    disk.close().unwrap();
}

#[test]
fn test_eadf_foreign_track_survives_as_raw() {
    init();
    let scratch = Scratch::new("foreign.eadf");

    // A non-Amiga track in an extended ADF is persisted as a raw
    // bitstream and must re-serialize identically from then on.
    let payload = vec![0xC3u8; 9 * 512];
    let mut disk = Disk::create(scratch.as_str()).unwrap();
    assert!(disk.write_track_sectors(2, TrackType::IbmPcDd, &payload).unwrap());
    disk.close().unwrap();
    let first = compute_file_hash(&scratch.path);

    let disk = Disk::open(scratch.as_str(), false).unwrap();
    let ti = &disk.info().tracks[2];
    assert_eq!(ti.track_type, TrackType::RawDd);
    assert!(ti.is_formatted());
    disk.close().unwrap();
    assert_eq!(compute_file_hash(&scratch.path), first);
}
