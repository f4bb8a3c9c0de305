/*
    fluxdisk
    https://github.com/fluxdisk/fluxdisk

    Copyright 2025 fluxdisk project contributors

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the "Software"),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------
*/

//! The native DSK container: the library's own full-fidelity format.
//!
//! Layout, little-endian: a `DSK\0` file header, one record per track
//! (type, flags, valid-sector bitmap, payload length, data bit offset,
//! total bit-cells), the disk's tag records, then the track payloads in
//! ascending track order. Every field of the in-memory model round-trips,
//! including unformatted sentinels; it is the only container that
//! persists tags.

use std::io::{Read, Seek, SeekFrom, Write};

use binrw::{binrw, BinRead, BinWrite};

use crate::{
    diskimage::{Disk, SectorBitmap, TrackInfo},
    handlers::TrackType,
    ContainerFormat, DiskError,
};

pub const DSK_TRACKS: usize = 160;

const DSK_VERSION: u16 = 1;

#[binrw]
#[brw(little, magic = b"DSK\0")]
struct DskHeader {
    version: u16,
    nr_tracks: u16,
    flags: u32,
    nr_tags: u16,
}

#[binrw]
#[brw(little)]
struct DskTrackRecord {
    track_type: u16,
    flags: u16,
    valid_sectors: u64,
    len: u32,
    data_bitoff: u32,
    total_bits: u32,
}

#[binrw]
#[brw(little)]
struct DskTagRecord {
    id: u16,
    len: u16,
    #[br(count = len)]
    data: Vec<u8>,
}

pub(crate) fn init(disk: &mut Disk) {
    disk.di.flags = 0;
    disk.di.tracks = vec![TrackInfo::default(); DSK_TRACKS];
    for ti in &mut disk.di.tracks {
        ti.mark_unformatted();
    }
}

pub(crate) fn open(disk: &mut Disk) -> Result<ContainerFormat, DiskError> {
    disk.file.seek(SeekFrom::Start(0))?;
    let header = DskHeader::read(&mut disk.file).map_err(|_| DiskError::BadSignature)?;
    if header.version != DSK_VERSION {
        log::warn!("DSK file has unsupported version {}", header.version);
        return Err(DiskError::BadSignature);
    }

    let nr_tracks = header.nr_tracks as usize;
    let mut records = Vec::with_capacity(nr_tracks);
    for _ in 0..nr_tracks {
        records.push(DskTrackRecord::read(&mut disk.file)?);
    }

    disk.tags.clear();
    for _ in 0..header.nr_tags {
        let tag = DskTagRecord::read(&mut disk.file)?;
        disk.set_tag(tag.id, tag.data);
    }

    disk.di.flags = header.flags;
    disk.di.tracks = vec![TrackInfo::default(); nr_tracks];
    for (tracknr, rec) in records.iter().enumerate() {
        let Some(track_type) = TrackType::from_repr(rec.track_type) else {
            log::warn!("T{}: unknown track type {}", tracknr, rec.track_type);
            return Err(DiskError::BadSignature);
        };
        let ti = &mut disk.di.tracks[tracknr];
        ti.init(track_type);
        let mut dat = vec![0u8; rec.len as usize];
        disk.file.read_exact(&mut dat)?;
        ti.len = dat.len();
        ti.dat = dat;
        ti.valid_sectors = SectorBitmap::from_u64(rec.valid_sectors);
        ti.data_bitoff = rec.data_bitoff;
        ti.total_bits = rec.total_bits;
    }

    Ok(ContainerFormat::Dsk)
}

pub(crate) fn close(disk: &mut Disk) -> Result<(), DiskError> {
    disk.file.seek(SeekFrom::Start(0))?;
    disk.file.set_len(0)?;

    DskHeader {
        version: DSK_VERSION,
        nr_tracks: disk.di.nr_tracks() as u16,
        flags: disk.di.flags,
        nr_tags: disk.tags.len() as u16,
    }
    .write(&mut disk.file)?;

    for ti in &disk.di.tracks {
        DskTrackRecord {
            track_type: ti.track_type as u16,
            flags: 0,
            valid_sectors: ti.valid_sectors.to_u64(),
            len: ti.len as u32,
            data_bitoff: ti.data_bitoff,
            total_bits: ti.total_bits,
        }
        .write(&mut disk.file)?;
    }

    for tag in &disk.tags {
        DskTagRecord {
            id: tag.id,
            len: tag.data.len() as u16,
            data: tag.data.clone(),
        }
        .write(&mut disk.file)?;
    }

    for ti in &disk.di.tracks {
        disk.file.write_all(&ti.dat[..ti.len])?;
    }
    Ok(())
}
