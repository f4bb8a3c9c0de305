mod common;

use common::*;
use fluxdisk::{ContainerFormat, Disk, TrackType};

#[test]
fn test_appleii_dos_order_output() {
    init();
    let scratch = Scratch::new("dos_order.dsk");

    let mut payload = vec![0u8; 16 * 256];
    for sec in 0..16 {
        payload[sec * 256..(sec + 1) * 256].fill(sec as u8);
    }

    let mut disk =
        Disk::create_with_container(scratch.as_str(), ContainerFormat::AppleIIDo).unwrap();
    assert!(disk.write_track_sectors(0, TrackType::AppleII16Sector, &payload).unwrap());
    disk.close().unwrap();

    let image = std::fs::read(&scratch.path).unwrap();
    // Only the one decodable track is written.
    assert_eq!(image.len(), 16 * 256);
    // DOS 3.3 interleave: physical sector 1 lands at logical slot 7.
    assert!(image[7 * 256..8 * 256].iter().all(|&b| b == 1));
    assert!(image[..256].iter().all(|&b| b == 0));
    assert!(image[15 * 256..].iter().all(|&b| b == 15));
}

#[test]
fn test_appleii_logical_order_is_identity() {
    init();
    let scratch = Scratch::new("logical_order.dsk");

    let payload: Vec<u8> = (0..16 * 256usize).map(|i| (i % 256) as u8).collect();
    let mut disk =
        Disk::create_with_container(scratch.as_str(), ContainerFormat::AppleIILogical).unwrap();
    assert!(disk.write_track_sectors(0, TrackType::AppleII16Sector, &payload).unwrap());
    disk.close().unwrap();

    assert_eq!(std::fs::read(&scratch.path).unwrap(), payload);
}
