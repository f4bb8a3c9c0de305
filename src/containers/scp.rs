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

//! The SuperCard Pro flux writer.
//!
//! Each formatted track is rendered as one revolution of 16-bit big-endian
//! flux durations at the 25ns base resolution, derived from the raw buffer
//! and its speed map. Reading captures is the stream layer's job; this
//! container only writes.

use std::io::{Seek, SeekFrom, Write};

use binrw::{binrw, BinWrite};

use crate::{diskimage::Disk, trackbuf::TrackBuffer, DiskError};

/// Base capture resolution in nanoseconds.
pub const SCP_BASE_RES_NS: u64 = 25;
pub const SCP_TRACK_COUNT: usize = 168;

const SCP_FB_INDEX: u8 = 0b0000_0001;
const SCP_FB_TPI: u8 = 0b0000_0010;

#[binrw]
#[brw(little, magic = b"SCP")]
struct ScpFileHeader {
    version: u8,
    disk_type: u8,
    revolutions: u8,
    start_track: u8,
    end_track: u8,
    flags: u8,
    bit_cell_width: u8,
    heads: u8,
    resolution: u8,
    checksum: u32,
}

#[binrw]
#[brw(little, magic = b"TRK")]
struct ScpTrackHeader {
    track_number: u8,
}

#[binrw]
#[brw(little)]
struct ScpTrackRevolution {
    index_time: u32,
    length: u32,
    data_offset: u32,
}

/// Render one track's flux durations in 25ns ticks. A set bit flushes the
/// accumulated cell time; 0x0000 encodes a 65536-tick overflow.
fn track_flux(tbuf: &TrackBuffer) -> (Vec<u16>, u32) {
    let raw = &tbuf.raw;
    let ns_per_cell = 200_000_000u64 / raw.bitlen as u64;
    let mut samples = Vec::new();
    let mut acc_ns: u64 = 0;
    let mut total_ns: u64 = 0;

    for i in 0..raw.bitlen {
        let cell_ns = ns_per_cell * raw.speed[i] as u64 / 1000;
        acc_ns += cell_ns;
        total_ns += cell_ns;
        if raw.bits.get(i).unwrap_or(false) {
            let mut ticks = acc_ns / SCP_BASE_RES_NS;
            while ticks > 0xFFFF {
                samples.push(0);
                ticks -= 0x10000;
            }
            samples.push(ticks as u16);
            acc_ns = 0;
        }
    }

    (samples, (total_ns / SCP_BASE_RES_NS) as u32)
}

pub(crate) fn close(disk: &mut Disk) -> Result<(), DiskError> {
    let nr_tracks = disk.di.nr_tracks().min(SCP_TRACK_COUNT);

    // Render all formatted tracks up front.
    let mut rendered: Vec<Option<(Vec<u16>, u32)>> = Vec::with_capacity(nr_tracks);
    let mut tbuf = TrackBuffer::new();
    let mut end_track = 0u8;
    for tracknr in 0..nr_tracks {
        disk.read_track_raw(&mut tbuf, tracknr as u32);
        if tbuf.raw.is_empty() {
            rendered.push(None);
            continue;
        }
        end_track = tracknr as u8;
        rendered.push(Some(track_flux(&tbuf)));
    }

    let header_len = 0x10u32;
    let table_len = (SCP_TRACK_COUNT * 4) as u32;
    let mut offsets = [0u32; SCP_TRACK_COUNT];
    let mut body: Vec<u8> = Vec::new();

    for (tracknr, entry) in rendered.iter().enumerate() {
        let Some((samples, index_time)) = entry else {
            continue;
        };
        let track_off = header_len + table_len + body.len() as u32;
        offsets[tracknr] = track_off;

        let mut cursor = std::io::Cursor::new(Vec::new());
        ScpTrackHeader {
            track_number: tracknr as u8,
        }
        .write(&mut cursor)?;
        ScpTrackRevolution {
            index_time: *index_time,
            length: samples.len() as u32,
            // Offset of the flux data relative to the track header.
            data_offset: 4 + 12,
        }
        .write(&mut cursor)?;
        let mut chunk = cursor.into_inner();
        for s in samples {
            chunk.extend_from_slice(&s.to_be_bytes());
        }
        body.extend_from_slice(&chunk);
    }

    let mut table = Vec::with_capacity(table_len as usize);
    for off in offsets {
        table.extend_from_slice(&off.to_le_bytes());
    }

    // Checksum covers everything after the file header.
    let checksum = table
        .iter()
        .chain(body.iter())
        .fold(0u32, |acc, &b| acc.wrapping_add(b as u32));

    disk.file.seek(SeekFrom::Start(0))?;
    disk.file.set_len(0)?;
    ScpFileHeader {
        version: 0x22,
        disk_type: 0x80,
        revolutions: 1,
        start_track: 0,
        end_track,
        flags: SCP_FB_INDEX | SCP_FB_TPI,
        bit_cell_width: 0,
        heads: 0,
        resolution: 0,
        checksum,
    }
    .write(&mut disk.file)?;
    disk.file.write_all(&table)?;
    disk.file.write_all(&body)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{trackbuf::BitcellEncoding, SPEED_AVG};

    #[test]
    fn flux_durations_follow_the_speed_map() {
        let mut tbuf = TrackBuffer::new();
        tbuf.init(0, 100_000);
        // One-bits at nominal speed: every MFM 0xFF data bit is a flux
        // transition two cells apart... emit raw pattern 10 repeated.
        for _ in 0..16 {
            tbuf.bits(SPEED_AVG, BitcellEncoding::Raw, 2, 0b10);
        }
        // Long cells: doubled speed values stretch the duration. Two
        // stretched pairs so the second is flushed entirely at 2x.
        tbuf.bits(2 * SPEED_AVG, BitcellEncoding::Raw, 2, 0b10);
        tbuf.bits(2 * SPEED_AVG, BitcellEncoding::Raw, 2, 0b10);

        let (samples, _index) = track_flux(&tbuf);
        let ns_per_cell = 200_000_000u64 / 100_000;
        let nominal = 2 * ns_per_cell / SCP_BASE_RES_NS;
        // First transition flushes a single leading cell, ignore it; the
        // steady-state pairs are two nominal cells each.
        assert!(samples.len() > 3);
        assert_eq!(samples[1] as u64, nominal);
        assert_eq!(samples[2] as u64, nominal);
        assert!(samples.iter().any(|&s| s as u64 == 2 * nominal));
    }
}
