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

//! Apple II sector-dump writers.
//!
//! The three orderings share one close path: each decodable track's
//! sector view is permuted through a 16-entry translation table and
//! appended. Physical sector *i* lands at logical slot `table[i]`.

use std::io::{Seek, SeekFrom, Write};

use crate::{diskimage::Disk, DiskError};

pub const SECTOR_TRANSLATE_LOGICAL: [usize; 16] =
    [0x0, 0x1, 0x2, 0x3, 0x4, 0x5, 0x6, 0x7, 0x8, 0x9, 0xA, 0xB, 0xC, 0xD, 0xE, 0xF];

pub const SECTOR_TRANSLATE_DOS: [usize; 16] =
    [0x0, 0x7, 0xE, 0x6, 0xD, 0x5, 0xC, 0x4, 0xB, 0x3, 0xA, 0x2, 0x9, 0x1, 0x8, 0xF];

pub const SECTOR_TRANSLATE_PRODOS: [usize; 16] =
    [0x0, 0x8, 0x1, 0x9, 0x2, 0xA, 0x3, 0xB, 0x4, 0xC, 0x5, 0xD, 0x6, 0xE, 0x7, 0xF];

/// Permute physical sectors into the container's logical order. Only
/// 16-sector tracks are permuted; anything else passes through.
pub(crate) fn sector_translate(secdata: &[u8], table: &[usize; 16]) -> Vec<u8> {
    if secdata.len() != 16 * 256 {
        return secdata.to_vec();
    }
    let mut out = vec![0u8; secdata.len()];
    for (i, &slot) in table.iter().enumerate() {
        out[slot * 256..(slot + 1) * 256].copy_from_slice(&secdata[i * 256..(i + 1) * 256]);
    }
    out
}

pub(crate) fn close(disk: &mut Disk, table: &[usize; 16]) -> Result<(), DiskError> {
    disk.file.seek(SeekFrom::Start(0))?;
    disk.file.set_len(0)?;

    for tracknr in 0..disk.di.nr_tracks() as u32 {
        let Ok(sectors) = disk.read_track_sectors(tracknr) else {
            continue;
        };
        let translated = sector_translate(&sectors, table);
        disk.file.write_all(&translated)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dos_order_permutation() {
        let mut data = vec![0u8; 16 * 256];
        for i in 0..16 {
            data[i * 256..(i + 1) * 256].fill(i as u8);
        }
        let out = sector_translate(&data, &SECTOR_TRANSLATE_DOS);
        // Physical sector 1 lands at logical slot 7.
        assert!(out[7 * 256..8 * 256].iter().all(|&b| b == 1));
        // Physical sector 15 stays in place.
        assert!(out[15 * 256..].iter().all(|&b| b == 15));
        // Identity table is a no-op.
        assert_eq!(sector_translate(&data, &SECTOR_TRANSLATE_LOGICAL), data);
    }

    #[test]
    fn prodos_order_permutation() {
        let mut data = vec![0u8; 16 * 256];
        for i in 0..16 {
            data[i * 256..(i + 1) * 256].fill(i as u8);
        }
        let out = sector_translate(&data, &SECTOR_TRANSLATE_PRODOS);
        assert!(out[8 * 256..9 * 256].iter().all(|&b| b == 1));
        assert!(out[1 * 256..2 * 256].iter().all(|&b| b == 2));
    }
}
