mod common;

use common::*;
use fluxdisk::{ContainerFormat, Disk};

const ADF_BYTES: usize = 160 * 11 * 512;

#[test]
fn test_adf_identity() {
    init();
    let scratch = Scratch::new("identity.adf");

    // Not a single "NDOS" filler word anywhere: every sector is valid and
    // the file must survive an open/close round trip untouched.
    let mut image = vec![0u8; ADF_BYTES];
    image[0x100] = 0x4E;
    std::fs::write(&scratch.path, &image).unwrap();
    let before = compute_file_hash(&scratch.path);

    let disk = Disk::open(scratch.as_str(), true).unwrap();
    assert_eq!(disk.container(), ContainerFormat::Adf);
    let ti = &disk.info().tracks[0];
    assert_eq!(ti.valid_sectors.count_valid(ti.nr_sectors), 11);
    disk.close().unwrap();
    assert_eq!(compute_file_hash(&scratch.path), before);

    // A writable open/close must also be byte-identical.
    let disk = Disk::open(scratch.as_str(), false).unwrap();
    disk.close().unwrap();
    assert_eq!(compute_file_hash(&scratch.path), before);
}

#[test]
fn test_adf_empty() {
    init();
    let scratch = Scratch::new("empty.adf");

    let image: Vec<u8> = b"NDOS".iter().copied().cycle().take(ADF_BYTES).collect();
    std::fs::write(&scratch.path, &image).unwrap();

    let disk = Disk::open(scratch.as_str(), true).unwrap();
    for ti in &disk.info().tracks {
        assert!(ti.valid_sectors.is_empty());
    }
    disk.close().unwrap();
}

#[test]
fn test_adf_bad_size() {
    init();
    let scratch = Scratch::new("short.adf");
    std::fs::write(&scratch.path, vec![0u8; 12345]).unwrap();
    assert!(Disk::open(scratch.as_str(), true).is_err());
}

#[test]
fn test_adf_redirects_to_eadf() {
    init();
    let scratch = Scratch::new("redirect.adf");

    // A UAE-1ADF image with two unformatted raw tracks. The .adf suffix
    // routes to the ADF driver, whose signature sniff must hand the image
    // to the extended-ADF container.
    let mut image = Vec::new();
    image.extend_from_slice(b"UAE-1ADF");
    image.extend_from_slice(&0u16.to_be_bytes());
    image.extend_from_slice(&2u16.to_be_bytes());
    for _ in 0..2 {
        image.extend_from_slice(&0u16.to_be_bytes()); // reserved
        image.extend_from_slice(&1u16.to_be_bytes()); // raw track
        image.extend_from_slice(&0u32.to_be_bytes()); // len 0: unformatted
        image.extend_from_slice(&0u32.to_be_bytes());
    }
    std::fs::write(&scratch.path, &image).unwrap();

    let disk = Disk::open(scratch.as_str(), true).unwrap();
    assert_eq!(disk.container(), ContainerFormat::Eadf);
    assert_eq!(disk.info().nr_tracks(), 2);
    assert!(!disk.info().tracks[0].is_formatted());
    disk.close().unwrap();
}

#[test]
fn test_adf_create_writes_filler() {
    init();
    let scratch = Scratch::new("create.adf");

    let disk = Disk::create(scratch.as_str()).unwrap();
    disk.close().unwrap();

    let image = std::fs::read(&scratch.path).unwrap();
    assert_eq!(image.len(), ADF_BYTES);
    assert_eq!(&image[..4], b"NDOS");

    // Reading the filler image back yields no valid sectors anywhere.
    let disk = Disk::open(scratch.as_str(), true).unwrap();
    assert!(disk.info().tracks.iter().all(|ti| ti.valid_sectors.is_empty()));
    disk.close().unwrap();
}
