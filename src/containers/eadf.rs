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

//! The extended ADF (`UAE-1ADF`) container.
//!
//! An 8-byte signature and a track count, then one 12-byte header per
//! track: type 0 is a plain 11 x 512 AmigaDOS sector dump, type 1 a raw
//! MFM bitstream with an explicit bit length. Payloads follow the header
//! table in track order. Tracks that are not cleanly AmigaDOS survive a
//! round trip as raw bitstreams.

use std::io::{Read, Seek, SeekFrom, Write};

use binrw::{binrw, BinRead, BinWrite};

use crate::{
    diskimage::{Disk, TrackInfo},
    handlers::TrackType,
    trackbuf::TrackBuffer,
    ContainerFormat, DiskError,
};

use super::adf::ADF_TRACK_BYTES;

pub const EADF_SIG: &[u8; 8] = b"UAE-1ADF";

const TRKTYPE_AMIGADOS: u16 = 0;
const TRKTYPE_RAW: u16 = 1;

/// Raw tracks longer than this are taken to be high density.
const HD_BIT_THRESHOLD: u32 = 150_000;

#[binrw]
#[brw(big, magic = b"UAE-1ADF")]
struct EadfHeader {
    reserved: u16,
    nr_tracks: u16,
}

#[binrw]
#[brw(big)]
struct EadfTrackHeader {
    reserved: u16,
    track_type: u16,
    len: u32,
    bitlen: u32,
}

pub(crate) fn open(disk: &mut Disk) -> Result<ContainerFormat, DiskError> {
    disk.file.seek(SeekFrom::Start(0))?;
    let header = EadfHeader::read(&mut disk.file).map_err(|_| DiskError::BadSignature)?;

    let nr_tracks = header.nr_tracks as usize;
    let mut track_headers = Vec::with_capacity(nr_tracks);
    for _ in 0..nr_tracks {
        track_headers.push(EadfTrackHeader::read(&mut disk.file)?);
    }

    disk.di.tracks = vec![TrackInfo::default(); nr_tracks];
    for (tracknr, th) in track_headers.iter().enumerate() {
        let ti = &mut disk.di.tracks[tracknr];
        match th.track_type {
            TRKTYPE_AMIGADOS => {
                super::adf::init_track(ti);
                if th.len as usize != ADF_TRACK_BYTES {
                    log::warn!("T{}: bad AmigaDOS dump length {}", tracknr, th.len);
                    return Err(DiskError::BadSize(th.len as u64));
                }
                disk.file.read_exact(&mut ti.dat)?;
                ti.valid_sectors.set_all_invalid();
                for sector in 0..ti.nr_sectors {
                    let p = &ti.dat
                        [sector * ti.bytes_per_sector..(sector + 1) * ti.bytes_per_sector];
                    if p.chunks_exact(4).any(|chunk| chunk != b"NDOS") {
                        ti.valid_sectors.set_valid(sector);
                    }
                }
            }
            TRKTYPE_RAW if th.len == 0 => ti.mark_unformatted(),
            TRKTYPE_RAW => {
                let track_type = if th.bitlen > HD_BIT_THRESHOLD {
                    TrackType::RawHd
                }
                else {
                    TrackType::RawDd
                };
                ti.init(track_type);
                let mut dat = vec![0u8; th.len as usize];
                disk.file.read_exact(&mut dat)?;
                ti.len = dat.len();
                ti.dat = dat;
                ti.total_bits = th.bitlen;
            }
            t => {
                log::warn!("T{}: unknown extended-ADF track type {}", tracknr, t);
                return Err(DiskError::BadSignature);
            }
        }
    }

    Ok(ContainerFormat::Eadf)
}

pub(crate) fn close(disk: &mut Disk) -> Result<(), DiskError> {
    // Serialize every track before touching the file.
    let mut entries: Vec<(EadfTrackHeader, Vec<u8>)> = Vec::with_capacity(disk.di.nr_tracks());
    let mut tbuf = TrackBuffer::new();
    for (tracknr, ti) in disk.di.tracks.iter().enumerate() {
        if ti.track_type == TrackType::AmigaDos {
            entries.push((
                EadfTrackHeader {
                    reserved: 0,
                    track_type: TRKTYPE_AMIGADOS,
                    len: ADF_TRACK_BYTES as u32,
                    bitlen: 0,
                },
                ti.dat[..ADF_TRACK_BYTES].to_vec(),
            ));
        }
        else if !ti.is_formatted() {
            entries.push((
                EadfTrackHeader {
                    reserved: 0,
                    track_type: TRKTYPE_RAW,
                    len: 0,
                    bitlen: 0,
                },
                Vec::new(),
            ));
        }
        else {
            disk.read_track_raw(&mut tbuf, tracknr as u32);
            let bytes = tbuf.raw.to_bytes();
            entries.push((
                EadfTrackHeader {
                    reserved: 0,
                    track_type: TRKTYPE_RAW,
                    len: bytes.len() as u32,
                    bitlen: tbuf.raw.bitlen as u32,
                },
                bytes,
            ));
        }
    }

    disk.file.seek(SeekFrom::Start(0))?;
    disk.file.set_len(0)?;
    EadfHeader {
        reserved: 0,
        nr_tracks: entries.len() as u16,
    }
    .write(&mut disk.file)?;
    for (th, _) in &entries {
        th.write(&mut disk.file)?;
    }
    for (_, bytes) in &entries {
        disk.file.write_all(bytes)?;
    }
    Ok(())
}
