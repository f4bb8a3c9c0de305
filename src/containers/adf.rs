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

//! The ADF container: 160 tracks of 11 x 512 bytes of AmigaDOS sectors,
//! laid out contiguously. Sectors that were never decoded carry the ASCII
//! filler "NDOS"; a sector is valid iff it is not entirely filler.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::{
    diskimage::{Disk, TrackInfo},
    handlers::TrackType,
    stream::Stream,
    ContainerFormat, DiskError, DEFAULT_BITS_PER_TRACK,
};

pub const ADF_TRACKS: usize = 160;
pub const ADF_TRACK_BYTES: usize = 11 * 512;
pub const ADF_IMAGE_BYTES: u64 = (ADF_TRACKS * ADF_TRACK_BYTES) as u64;

const NDOS: &[u8; 4] = b"NDOS";

pub(crate) fn init_track(ti: &mut TrackInfo) {
    ti.init(TrackType::AmigaDos);
    ti.dat = NDOS.iter().copied().cycle().take(ti.len).collect();
    ti.data_bitoff = 1024;
    ti.total_bits = DEFAULT_BITS_PER_TRACK;
}

pub(crate) fn init(disk: &mut Disk) {
    disk.di.flags = 0;
    disk.di.tracks = vec![TrackInfo::default(); ADF_TRACKS];
    for ti in &mut disk.di.tracks {
        init_track(ti);
    }
}

pub(crate) fn open(disk: &mut Disk) -> Result<ContainerFormat, DiskError> {
    let mut sig = [0u8; 8];
    disk.file.seek(SeekFrom::Start(0))?;
    if disk.file.read_exact(&mut sig).is_ok() && &sig == b"UAE-1ADF" {
        return super::eadf::open(disk);
    }

    let size = disk.file.seek(SeekFrom::End(0))?;
    if size != ADF_IMAGE_BYTES {
        log::warn!("ADF file bad size: {} bytes", size);
        return Err(DiskError::BadSize(size));
    }
    disk.file.seek(SeekFrom::Start(0))?;

    init(disk);
    for ti in &mut disk.di.tracks {
        disk.file.read_exact(&mut ti.dat)?;
        ti.valid_sectors.set_all_invalid();
        for sector in 0..ti.nr_sectors {
            let p = &ti.dat[sector * ti.bytes_per_sector..(sector + 1) * ti.bytes_per_sector];
            if p.chunks_exact(4).any(|chunk| chunk != NDOS) {
                ti.valid_sectors.set_valid(sector);
            }
        }
    }

    Ok(ContainerFormat::Adf)
}

pub(crate) fn close(disk: &mut Disk) -> Result<(), DiskError> {
    disk.file.seek(SeekFrom::Start(0))?;
    disk.file.set_len(0)?;
    for ti in &disk.di.tracks {
        debug_assert_eq!(ti.track_type, TrackType::AmigaDos);
        disk.file.write_all(&ti.dat[..ADF_TRACK_BYTES])?;
    }
    Ok(())
}

pub(crate) fn write_raw(
    disk: &mut Disk,
    tracknr: u32,
    track_type: TrackType,
    stream: &mut Stream,
) -> Result<bool, DiskError> {
    if track_type != TrackType::AmigaDos {
        log::warn!("only AmigaDOS tracks can be written to ADF files");
        return Err(DiskError::IncompatibleTrack("ADF accepts AmigaDOS tracks only"));
    }

    let decoded = super::write_raw_generic(disk, tracknr, track_type, stream)?;
    let ti = &mut disk.di.tracks[tracknr as usize];
    if ti.track_type != TrackType::AmigaDos {
        // Decode failed; an ADF track slot always holds filler instead.
        init_track(ti);
    }
    Ok(decoded)
}
