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

//! IBM System-34 style MFM handlers, as supported by the uPD765A, Intel
//! 8272 and nearly every other FDC chip.
//!
//! ```text
//!   Index Address Mark (IAM):        0xC2 0xC2 0xC2 0xFC
//!   ID Address Mark (IDAM):          0xA1 0xA1 0xA1 0xFE c h r n crc16
//!   Data Address Mark (DAM):         0xA1 0xA1 0xA1 0xFB <data> crc16
//!   Deleted Data Address Mark:       as DAM with 0xFB -> 0xF8
//! ```
//!
//! 0xC2 and 0xA1 are sync marks with one clock bit forced to zero, hence
//! 0xC2 -> 0x5224 and 0xA1 -> 0x4489 on the wire. The decoded track payload
//! carries one trailing marker byte recording whether an IAM was seen, so a
//! re-encode can reproduce it.

use crate::{
    diskimage::TrackInfo,
    stream::Stream,
    trackbuf::{BitcellEncoding, TrackBuffer},
    util::{crc16_ccitt_byte, mfm_decode_word, CRC_CCITT_INITIAL},
    SPEED_AVG,
};

use super::{TrackDensity, TrackHandler};

pub const IDAM_SYNC: u32 = 0x4489_4489;
pub const IAM_SYNC: u32 = 0x5224_5224;

const GAP_BYTE: u8 = 0x4E;
const SYNC_LEN: usize = 12;
const GAP1: usize = 50;
const GAP2: usize = 22;

/// Cells to scan past a validated IDAM before giving up on its DAM.
const DAM_SCAN_CELLS: usize = 1000;

struct IbmParams {
    nr_sectors: usize,
    bytes_per_sector: usize,
    size_code: u8,
    gap3: usize,
    has_iam: bool,
}

const DD_PARAMS: IbmParams = IbmParams {
    nr_sectors: 9,
    bytes_per_sector: 512,
    size_code: 2,
    gap3: 84,
    has_iam: true,
};

const HD_PARAMS: IbmParams = IbmParams {
    nr_sectors: 18,
    bytes_per_sector: 512,
    size_code: 2,
    gap3: 108,
    has_iam: true,
};

const ED_PARAMS: IbmParams = IbmParams {
    nr_sectors: 36,
    bytes_per_sector: 512,
    size_code: 2,
    gap3: 83,
    has_iam: true,
};

const ISDX_PARAMS: IbmParams = IbmParams {
    nr_sectors: 32,
    bytes_per_sector: 256,
    size_code: 1,
    gap3: 40,
    has_iam: false,
};

pub static IBM_PC_DD_HANDLER: TrackHandler = TrackHandler {
    density: TrackDensity::Double,
    bytes_per_sector: 512,
    nr_sectors: 9,
    typename: "IBM-PC DD (720kB)",
    write_raw: Some(|ti, nr, s| write_raw(ti, nr, s, &DD_PARAMS)),
    read_raw: Some(|ti, nr, t| read_raw(ti, nr, t, &DD_PARAMS)),
    read_sectors: Some(read_sectors),
    write_sectors: Some(|ti, nr, d| write_sectors(ti, nr, d, &DD_PARAMS)),
};

pub static IBM_PC_HD_HANDLER: TrackHandler = TrackHandler {
    density: TrackDensity::High,
    bytes_per_sector: 512,
    nr_sectors: 18,
    typename: "IBM-PC HD (1.44MB)",
    write_raw: Some(|ti, nr, s| write_raw(ti, nr, s, &HD_PARAMS)),
    read_raw: Some(|ti, nr, t| read_raw(ti, nr, t, &HD_PARAMS)),
    read_sectors: Some(read_sectors),
    write_sectors: Some(|ti, nr, d| write_sectors(ti, nr, d, &HD_PARAMS)),
};

pub static IBM_PC_ED_HANDLER: TrackHandler = TrackHandler {
    density: TrackDensity::Extra,
    bytes_per_sector: 512,
    nr_sectors: 36,
    typename: "IBM-PC ED (2.88MB)",
    write_raw: Some(|ti, nr, s| write_raw(ti, nr, s, &ED_PARAMS)),
    read_raw: Some(|ti, nr, t| read_raw(ti, nr, t, &ED_PARAMS)),
    read_sectors: Some(read_sectors),
    write_sectors: Some(|ti, nr, d| write_sectors(ti, nr, d, &ED_PARAMS)),
};

pub static SIEMENS_ISDX_HD_HANDLER: TrackHandler = TrackHandler {
    density: TrackDensity::High,
    bytes_per_sector: 256,
    nr_sectors: 32,
    typename: "Siemens ISDX HD",
    write_raw: Some(|ti, nr, s| write_raw(ti, nr, s, &ISDX_PARAMS)),
    read_raw: Some(|ti, nr, t| read_raw(ti, nr, t, &ISDX_PARAMS)),
    read_sectors: Some(read_sectors),
    write_sectors: Some(|ti, nr, d| write_sectors(ti, nr, d, &ISDX_PARAMS)),
};

/// Read `out.len()` MFM-decoded bytes, 16 cells each.
fn next_mfm_bytes(s: &mut Stream, out: &mut [u8]) -> Option<()> {
    for b in out.iter_mut() {
        let w = s.next_bits(16)?;
        *b = (mfm_decode_word(w & 0xFFFF) & 0xFF) as u8;
    }
    Some(())
}

/// Consume trailing 0x4489/0x5224 sync words and return the decoded mark
/// byte that follows them.
fn next_mark(s: &mut Stream, sync: u32) -> Option<u8> {
    let mut w = s.next_bits(16)? & 0xFFFF;
    while w == (sync & 0xFFFF) {
        w = s.next_bits(16)? & 0xFFFF;
    }
    Some((mfm_decode_word(w) & 0xFF) as u8)
}

fn marker_crc(mark: u8) -> u16 {
    let mut crc = CRC_CCITT_INITIAL;
    for _ in 0..3 {
        crc = crc16_ccitt_byte(0xA1, crc);
    }
    crc16_ccitt_byte(mark, crc)
}

fn write_raw(
    ti: &mut TrackInfo,
    tracknr: u32,
    s: &mut Stream,
    p: &IbmParams,
) -> Option<Vec<u8>> {
    let mut block = vec![0u8; p.nr_sectors * p.bytes_per_sector + 1];
    let mut nr_valid = 0usize;

    'scan: while nr_valid != p.nr_sectors {
        if s.next_bit().is_none() {
            break;
        }

        if p.has_iam && s.word == IAM_SYNC {
            let sync_start = s.index_offset().wrapping_sub(32);
            let Some(mark) = next_mark(s, IAM_SYNC) else { break };
            if mark == 0xFC {
                block[p.nr_sectors * p.bytes_per_sector] = 1;
                if ti.data_bitoff == 0 {
                    ti.data_bitoff = sync_start.wrapping_sub((SYNC_LEN * 16) as u32);
                }
            }
            continue;
        }

        if s.word != IDAM_SYNC {
            continue;
        }
        let sync_start = s.index_offset().wrapping_sub(32);
        let Some(mark) = next_mark(s, IDAM_SYNC) else { break };
        if mark != 0xFE {
            // An orphan DAM; only addressed data is of interest.
            continue;
        }

        let mut id = [0u8; 6];
        if next_mfm_bytes(s, &mut id).is_none() {
            break;
        }
        let mut crc = marker_crc(0xFE);
        for &b in &id {
            crc = crc16_ccitt_byte(b, crc);
        }
        if crc != 0 {
            log::warn!("T{}: bad IDAM CRC", tracknr);
            continue;
        }

        let (c, h, r, n) = (id[0], id[1], id[2], id[3]);
        if r == 0 || r as usize > p.nr_sectors {
            log::warn!("T{}: sector id out of range: {:02x}", tracknr, r);
            continue;
        }
        if n != p.size_code {
            log::warn!("T{}: unexpected sector size code {:02x}", tracknr, n);
            continue;
        }
        if c as u32 != tracknr >> 1 || h as u32 != tracknr & 1 {
            log::warn!("T{}: unexpected chs {:02x}/{:02x}/{:02x}", tracknr, c, h, r);
        }

        let mut found = false;
        for _ in 0..DAM_SCAN_CELLS {
            if s.next_bit().is_none() {
                break 'scan;
            }
            if s.word == IDAM_SYNC {
                found = true;
                break;
            }
        }
        if !found {
            log::warn!("T{}: no DAM for sector {:02x}", tracknr, r);
            continue;
        }
        let Some(mark) = next_mark(s, IDAM_SYNC) else { break };
        if mark != 0xFB && mark != 0xF8 {
            log::warn!("T{}: unexpected mark {:02x} after sector {:02x}", tracknr, mark, r);
            continue;
        }

        let mut dat = vec![0u8; p.bytes_per_sector + 2];
        if next_mfm_bytes(s, &mut dat).is_none() {
            break;
        }
        let mut crc = marker_crc(mark);
        for &b in &dat {
            crc = crc16_ccitt_byte(b, crc);
        }
        if crc != 0 {
            log::warn!("T{}: bad data CRC for sector {:02x}", tracknr, r);
            continue;
        }

        let sec = (r - 1) as usize;
        if !ti.valid_sectors.is_valid(sec) {
            let off = sec * p.bytes_per_sector;
            block[off..off + p.bytes_per_sector].copy_from_slice(&dat[..p.bytes_per_sector]);
            ti.valid_sectors.set_valid(sec);
            nr_valid += 1;
            if ti.data_bitoff == 0 {
                ti.data_bitoff = sync_start.wrapping_sub((SYNC_LEN * 16) as u32);
            }
        }
    }

    if nr_valid == 0 {
        return None;
    }
    Some(block)
}

fn gap(tbuf: &mut TrackBuffer, n: usize) {
    for _ in 0..n {
        tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, GAP_BYTE as u32);
    }
}

fn sync(tbuf: &mut TrackBuffer) {
    for _ in 0..SYNC_LEN {
        tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, 0x00);
    }
}

fn read_raw(ti: &TrackInfo, tracknr: u32, tbuf: &mut TrackBuffer, p: &IbmParams) {
    let iam = p.has_iam && ti.dat[ti.len - 1] != 0;
    if iam {
        sync(tbuf);
        tbuf.bits(SPEED_AVG, BitcellEncoding::Raw, 32, IAM_SYNC);
        tbuf.bits(SPEED_AVG, BitcellEncoding::Raw, 16, IAM_SYNC & 0xFFFF);
        tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, 0xFC);
        gap(tbuf, GAP1);
    }

    for sec in 0..p.nr_sectors {
        sync(tbuf);
        tbuf.start_crc();
        tbuf.bits(SPEED_AVG, BitcellEncoding::Raw, 32, IDAM_SYNC);
        tbuf.bits(SPEED_AVG, BitcellEncoding::Raw, 16, IDAM_SYNC & 0xFFFF);
        tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, 0xFE);
        tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, tracknr >> 1);
        tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, tracknr & 1);
        tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, sec as u32 + 1);
        tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, p.size_code as u32);
        tbuf.emit_crc16(SPEED_AVG);
        gap(tbuf, GAP2);

        sync(tbuf);
        tbuf.start_crc();
        tbuf.bits(SPEED_AVG, BitcellEncoding::Raw, 32, IDAM_SYNC);
        tbuf.bits(SPEED_AVG, BitcellEncoding::Raw, 16, IDAM_SYNC & 0xFFFF);
        tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, 0xFB);
        let off = sec * p.bytes_per_sector;
        tbuf.bytes(SPEED_AVG, BitcellEncoding::Mfm, &ti.dat[off..off + p.bytes_per_sector]);
        tbuf.emit_crc16(SPEED_AVG);
        gap(tbuf, p.gap3);
    }
}

fn read_sectors(ti: &TrackInfo, _tracknr: u32) -> Vec<u8> {
    // Strip the trailing IAM marker byte.
    ti.dat[..ti.len - 1].to_vec()
}

fn write_sectors(
    ti: &mut TrackInfo,
    tracknr: u32,
    data: &[u8],
    p: &IbmParams,
) -> Option<Vec<u8>> {
    if data.len() != p.nr_sectors * p.bytes_per_sector {
        log::warn!("T{}: bad sector buffer length {} (expected {})", tracknr, data.len(), ti.len);
        return None;
    }
    let mut block = data.to_vec();
    block.push(p.has_iam as u8);
    ti.valid_sectors.set_all_valid(ti.nr_sectors);
    Some(block)
}
