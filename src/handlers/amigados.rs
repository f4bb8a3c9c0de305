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

//! The AmigaDOS trackdisk handler.
//!
//! Amiga tracks are MFM encoded and carry eleven back-to-back 512-byte
//! sectors with no inter-sector gaps. Data words are stored with their odd
//! and even bits in separate blocks which must be recombined on read. Each
//! sector is:
//!
//! ```text
//!   00 00                 pre-sync gap bytes
//!   44 89 44 89           sync (0xA1 with a missing clock bit, twice)
//!   info long             0xFF, track, sector, sectors-to-gap (even/odd)
//!   16 label bytes        (even/odd)
//!   header checksum       over info + label (even/odd)
//!   data checksum         (even/odd)
//!   512 data bytes        (even/odd)
//! ```
//!
//! Good documentation on the format can be found at:
//! <http://lclevy.free.fr/adflib/adf_info.html>

use crate::{
    diskimage::TrackInfo,
    stream::Stream,
    trackbuf::{BitcellEncoding, TrackBuffer},
    util::{amigados_checksum, mfm_decode_even_odd, mfm_decode_even_odd_bytes},
    SPEED_AVG,
};

use super::{TrackDensity, TrackHandler};

/// Two 0xA1 sync marks with the clock bit of bit 5 suppressed.
pub const AMIGADOS_SYNC: u32 = 0x4489_4489;

const SECTOR_PAYLOAD: usize = 512;
const LABEL_BYTES: usize = 16;

pub static AMIGADOS_HANDLER: TrackHandler = TrackHandler {
    density: TrackDensity::Double,
    bytes_per_sector: SECTOR_PAYLOAD,
    nr_sectors: 11,
    typename: "AmigaDOS",
    write_raw: Some(write_raw),
    read_raw: Some(read_raw),
    read_sectors: Some(read_sectors),
    write_sectors: Some(write_sectors),
};

fn write_raw(ti: &mut TrackInfo, tracknr: u32, s: &mut Stream) -> Option<Vec<u8>> {
    let mut block = vec![0u8; ti.len];
    let mut nr_valid = 0usize;

    while nr_valid != ti.nr_sectors {
        if s.next_bit().is_none() {
            break;
        }
        if s.word != AMIGADOS_SYNC {
            continue;
        }
        let sync_start = s.index_offset().wrapping_sub(32);

        let Some(even) = s.next_bits(32) else { break };
        let Some(odd) = s.next_bits(32) else { break };
        let info = mfm_decode_even_odd(even, odd);
        let format = (info >> 24) as u8;
        let track = (info >> 16) as u8;
        let sector = (info >> 8) as u8;

        if format != 0xFF {
            log::warn!("T{}: unknown sector format byte {:02x}", tracknr, format);
            continue;
        }
        if track as u32 != tracknr {
            log::warn!("T{}: unexpected track value {:02x}", tracknr, track);
            continue;
        }
        if sector as usize >= ti.nr_sectors {
            log::warn!("T{}: sector out of range: {:02x}", tracknr, sector);
            continue;
        }

        let mut raw_label = [0u8; 2 * LABEL_BYTES];
        if s.next_bytes(&mut raw_label).is_none() {
            break;
        }
        let mut label = [0u8; LABEL_BYTES];
        mfm_decode_even_odd_bytes(&raw_label[..LABEL_BYTES], &raw_label[LABEL_BYTES..], &mut label);

        let Some(even) = s.next_bits(32) else { break };
        let Some(odd) = s.next_bits(32) else { break };
        let hdr_csum = mfm_decode_even_odd(even, odd);

        let mut hdr = [0u8; 4 + LABEL_BYTES];
        hdr[..4].copy_from_slice(&info.to_be_bytes());
        hdr[4..].copy_from_slice(&label);
        if amigados_checksum(&hdr) != hdr_csum {
            log::warn!("T{}: bad header checksum for sec={:02x}", tracknr, sector);
            continue;
        }

        let Some(even) = s.next_bits(32) else { break };
        let Some(odd) = s.next_bits(32) else { break };
        let dat_csum = mfm_decode_even_odd(even, odd);

        let mut raw_dat = [0u8; 2 * SECTOR_PAYLOAD];
        if s.next_bytes(&mut raw_dat).is_none() {
            break;
        }
        let mut dat = [0u8; SECTOR_PAYLOAD];
        mfm_decode_even_odd_bytes(&raw_dat[..SECTOR_PAYLOAD], &raw_dat[SECTOR_PAYLOAD..], &mut dat);

        if amigados_checksum(&dat) != dat_csum {
            log::warn!("T{}: bad data checksum for sec={:02x}", tracknr, sector);
            continue;
        }

        // First-writer-wins: an already-valid sector is never overwritten.
        if !ti.valid_sectors.is_valid(sector as usize) {
            let off = sector as usize * SECTOR_PAYLOAD;
            block[off..off + SECTOR_PAYLOAD].copy_from_slice(&dat);
            ti.valid_sectors.set_valid(sector as usize);
            nr_valid += 1;
            if sector == 0 {
                // Sync was preceded by the two-byte pre-sync gap.
                ti.data_bitoff = sync_start.wrapping_sub(32);
            }
        }
    }

    if nr_valid == 0 {
        return None;
    }
    Some(block)
}

fn read_raw(ti: &TrackInfo, tracknr: u32, tbuf: &mut TrackBuffer) {
    for sec in 0..ti.nr_sectors {
        let dat = &ti.dat[sec * SECTOR_PAYLOAD..(sec + 1) * SECTOR_PAYLOAD];

        tbuf.gap(SPEED_AVG, 16);
        tbuf.bits(SPEED_AVG, BitcellEncoding::Raw, 32, AMIGADOS_SYNC);

        let info =
            0xFF00_0000 | (tracknr << 16) | ((sec as u32) << 8) | (ti.nr_sectors - sec) as u32;
        tbuf.bits(SPEED_AVG, BitcellEncoding::MfmEvenOdd, 32, info);

        let label = [0u8; LABEL_BYTES];
        tbuf.bytes(SPEED_AVG, BitcellEncoding::MfmEvenOdd, &label);

        let mut hdr = [0u8; 4 + LABEL_BYTES];
        hdr[..4].copy_from_slice(&info.to_be_bytes());
        tbuf.bits(SPEED_AVG, BitcellEncoding::MfmEvenOdd, 32, amigados_checksum(&hdr));
        tbuf.bits(SPEED_AVG, BitcellEncoding::MfmEvenOdd, 32, amigados_checksum(dat));
        tbuf.bytes(SPEED_AVG, BitcellEncoding::MfmEvenOdd, dat);
    }
}

fn read_sectors(ti: &TrackInfo, _tracknr: u32) -> Vec<u8> {
    ti.dat[..ti.len].to_vec()
}

fn write_sectors(ti: &mut TrackInfo, tracknr: u32, data: &[u8]) -> Option<Vec<u8>> {
    if data.len() != ti.len {
        log::warn!("T{}: bad sector buffer length {} (expected {})", tracknr, data.len(), ti.len);
        return None;
    }
    ti.valid_sectors.set_all_valid(ti.nr_sectors);
    Some(data.to_vec())
}
