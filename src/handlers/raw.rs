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

//! Opaque raw-bitstream tracks.
//!
//! These carry a track bit-for-bit with no sector structure: `dat` holds the
//! packed cells and `total_bits` their count. The extended-ADF container
//! uses them for tracks that are not (or not cleanly) AmigaDOS.

use crate::{
    diskimage::TrackInfo,
    stream::Stream,
    trackbuf::{BitcellEncoding, TrackBuffer},
    SPEED_AVG,
};

use super::{TrackDensity, TrackHandler};

pub static RAW_DD_HANDLER: TrackHandler = TrackHandler {
    density: TrackDensity::Double,
    bytes_per_sector: 0,
    nr_sectors: 0,
    typename: "Raw bitstream (DD)",
    write_raw: Some(write_raw),
    read_raw: Some(read_raw),
    read_sectors: None,
    write_sectors: None,
};

pub static RAW_HD_HANDLER: TrackHandler = TrackHandler {
    density: TrackDensity::High,
    bytes_per_sector: 0,
    nr_sectors: 0,
    typename: "Raw bitstream (HD)",
    write_raw: Some(write_raw),
    read_raw: Some(read_raw),
    read_sectors: None,
    write_sectors: None,
};

fn write_raw(ti: &mut TrackInfo, _tracknr: u32, s: &mut Stream) -> Option<Vec<u8>> {
    let total = ti.total_bits as usize;
    if total == 0 {
        return None;
    }
    let mut out = vec![0u8; total.div_ceil(8)];
    for i in 0..total {
        if s.next_bit()? {
            out[i >> 3] |= 0x80 >> (i & 7);
        }
    }
    Some(out)
}

fn read_raw(ti: &TrackInfo, _tracknr: u32, tbuf: &mut TrackBuffer) {
    let total = ti.total_bits as usize;
    let full = (total / 8).min(ti.len);
    tbuf.bytes(SPEED_AVG, BitcellEncoding::Raw, &ti.dat[..full]);
    let rem = (total % 8) as u32;
    if rem > 0 && full < ti.len {
        tbuf.bits(SPEED_AVG, BitcellEncoding::Raw, rem, (ti.dat[full] >> (8 - rem)) as u32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{diskimage::TrackInfo, handlers::TrackType};

    #[test]
    fn raw_track_replays_verbatim() {
        let mut ti = TrackInfo::default();
        ti.init(TrackType::RawDd);
        ti.dat = (0..1250u32).map(|i| (i * 89 % 256) as u8).collect();
        ti.len = ti.dat.len();
        ti.total_bits = (ti.len * 8 - 3) as u32;

        let mut tbuf = TrackBuffer::new();
        tbuf.init(0, ti.total_bits);
        read_raw(&ti, 0, &mut tbuf);
        // Full buffer: no splice required.
        assert_eq!(tbuf.pos(), tbuf.start());

        let mut out = TrackInfo::default();
        out.init(TrackType::RawDd);
        out.total_bits = ti.total_bits;
        let mut s = Stream::soft(&tbuf.raw);
        s.reset();
        let dat = write_raw(&mut out, 0, &mut s).unwrap();

        // All full bytes and the leading bits of the tail byte agree.
        assert_eq!(&dat[..ti.len - 1], &ti.dat[..ti.len - 1]);
        assert_eq!(dat[ti.len - 1] & 0xF8, ti.dat[ti.len - 1] & 0xF8);
    }
}
