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

//! The IMG container: a flat dump of IBM-MFM logical sector contents.
//! Exactly four sizes are recognised and map to a track type; the decoded
//! in-memory track grows a trailing IAM marker byte which is stripped
//! again on write-out.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::{
    diskimage::{Disk, TrackInfo},
    handlers::TrackType,
    ContainerFormat, DiskError, DEFAULT_BITS_PER_TRACK,
};

pub const IMG_TRACKS: usize = 160;

pub(crate) fn init(disk: &mut Disk) {
    super::dsk::init(disk);
}

pub(crate) fn open(disk: &mut Disk) -> Result<ContainerFormat, DiskError> {
    let size = disk.file.seek(SeekFrom::End(0))?;
    let track_type = match size {
        s if s == (IMG_TRACKS * 512 * 9) as u64 => TrackType::IbmPcDd,
        s if s == (IMG_TRACKS * 512 * 18) as u64 => TrackType::IbmPcHd,
        s if s == (IMG_TRACKS * 512 * 36) as u64 => TrackType::IbmPcEd,
        s if s == (IMG_TRACKS * 256 * 32) as u64 => TrackType::SiemensIsdxHd,
        _ => {
            log::warn!("IMG file bad size: {} bytes", size);
            return Err(DiskError::BadSize(size));
        }
    };
    disk.file.seek(SeekFrom::Start(0))?;

    disk.di.tracks = vec![TrackInfo::default(); IMG_TRACKS];
    for ti in &mut disk.di.tracks {
        ti.init(track_type);
        ti.valid_sectors.set_all_valid(ti.nr_sectors);
        ti.dat = vec![0u8; ti.len];
        ti.data_bitoff = 80 * 16; // IAM offset
        ti.total_bits = DEFAULT_BITS_PER_TRACK;
        if track_type == TrackType::IbmPcHd || track_type == TrackType::SiemensIsdxHd {
            ti.total_bits *= 2;
        }
        else if track_type == TrackType::IbmPcEd {
            ti.total_bits *= 4;
        }
        disk.file.read_exact(&mut ti.dat)?;
        ti.dat.push(1); // IAM marker
        ti.len += 1;
    }

    Ok(ContainerFormat::Img)
}

pub(crate) fn close(disk: &mut Disk) -> Result<(), DiskError> {
    disk.file.seek(SeekFrom::Start(0))?;
    disk.file.set_len(0)?;
    for (tracknr, ti) in disk.di.tracks.iter().enumerate() {
        if ti.len == 0 {
            log::warn!("T{}: unformatted track not written to IMG file", tracknr);
            continue;
        }
        disk.file.write_all(&ti.dat[..ti.len - 1])?;
    }
    Ok(())
}
