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

//! The raw-track buffer and its write-side cursor.
//!
//! [`TrackRaw`] is the raw-bit representation of one revolution: a circular
//! MSB-first bit array plus a per-cell speed map (1000 = nominal), which
//! allows intentional long/short cells to be represented for copy
//! protection. [`TrackBuffer`] is the emitter handlers write through: it
//! tracks the cursor, the previous data bit for the MFM clock rule, a
//! running CRC-16-CCITT, and a PRNG for weak bits, and synthesizes the
//! write splice when a handler leaves part of the revolution unwritten.

use bit_vec::BitVec;

use crate::{
    random::{rnd16, TBUF_PRNG_INIT},
    util::crc16_ccitt_bit,
    SPEED_AVG,
};

/// The raw-bit representation of one track revolution.
#[derive(Clone)]
pub struct TrackRaw {
    /// `bitlen` bit-cells, MSB-first within each underlying byte.
    pub bits: BitVec,
    /// Per-cell speed relative to nominal (1000 = nominal).
    pub speed: Vec<u16>,
    pub bitlen: usize,
    /// Set when a handler emitted randomized (weak) cells.
    pub has_weak_bits: bool,
}

impl Default for TrackRaw {
    fn default() -> Self {
        TrackRaw {
            bits: BitVec::new(),
            speed: Vec::new(),
            bitlen: 0,
            has_weak_bits: false,
        }
    }
}

impl TrackRaw {
    pub fn is_empty(&self) -> bool {
        self.bitlen == 0
    }

    /// The bit array packed MSB-first into bytes, ⌈bitlen/8⌉ of them.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.bits.to_bytes()
    }
}

/// How a value is laid down as bit-cells.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BitcellEncoding {
    /// Each data bit is preceded by its clock bit.
    Mfm,
    /// Only the odd-numbered source bits, packed then MFM encoded.
    MfmEven,
    /// Only the even-numbered source bits, packed then MFM encoded.
    MfmOdd,
    /// The even half followed by the odd half.
    MfmEvenOdd,
    /// The odd half followed by the even half.
    MfmOddEven,
    /// Bits pass through unmodified; the CRC sees only the data half of
    /// each clock/data cell pair.
    Raw,
}

type EmitOverride = fn(&mut TrackBuffer, u16, u32);

/// Write-side cursor over a [`TrackRaw`].
pub struct TrackBuffer {
    pub raw: TrackRaw,
    start: usize,
    pos: usize,
    prev_data_bit: bool,
    crc16: u16,
    prng_seed: u32,
    disable_auto_sector_split: bool,
    /// Handler override for gap emission.
    pub gap_override: Option<EmitOverride>,
    /// Handler override for weak-cell emission.
    pub weak_override: Option<EmitOverride>,
}

impl Default for TrackBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackBuffer {
    pub fn new() -> Self {
        TrackBuffer {
            raw: TrackRaw::default(),
            start: 0,
            pos: 0,
            prev_data_bit: false,
            crc16: 0,
            prng_seed: TBUF_PRNG_INIT,
            disable_auto_sector_split: false,
            gap_override: None,
            weak_override: None,
        }
    }

    /// Release the current raw buffer. The PRNG seed is deliberately kept so
    /// that weak bits vary across successive reads of the same buffer.
    pub fn purge(&mut self) {
        self.raw = TrackRaw::default();
    }

    /// Start a fresh revolution of `bitlen` cells with the cursor at
    /// `bitstart`.
    pub fn init(&mut self, bitstart: u32, bitlen: u32) {
        let bitlen = bitlen as usize;
        self.start = bitstart as usize % bitlen.max(1);
        self.pos = self.start;
        self.prev_data_bit = false;
        self.crc16 = 0;
        self.disable_auto_sector_split = false;
        self.gap_override = None;
        self.weak_override = None;
        self.raw = TrackRaw {
            bits: BitVec::from_elem(bitlen, false),
            speed: vec![0u16; bitlen],
            bitlen,
            has_weak_bits: false,
        };
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn crc(&self) -> u16 {
        self.crc16
    }

    fn append_bit(&mut self, speed: u16, value: bool) {
        self.raw.bits.set(self.pos, value);
        self.raw.speed[self.pos] = speed;
        self.pos += 1;
        if self.pos >= self.raw.bitlen {
            self.pos = 0;
        }
    }

    /// Emit one data bit in the given encoding; MFM interposes the clock
    /// cell. Does not touch the CRC.
    fn cell(&mut self, speed: u16, enc: BitcellEncoding, dat: bool) {
        if enc == BitcellEncoding::Mfm {
            let clk = !(self.prev_data_bit | dat);
            self.append_bit(speed, clk);
        }
        self.append_bit(speed, dat);
        self.prev_data_bit = dat;
    }

    /// Emit the `nbits` most significant of the low `nbits` bits of `x`,
    /// MSB first, in the given encoding, updating the running CRC.
    pub fn bits(&mut self, speed: u16, enc: BitcellEncoding, nbits: u32, x: u32) {
        let mut enc = enc;
        let mut nbits = nbits;
        let mut x = x;

        if enc == BitcellEncoding::MfmEvenOdd {
            self.bits(speed, BitcellEncoding::MfmEven, nbits, x);
            enc = BitcellEncoding::MfmOdd;
        }
        else if enc == BitcellEncoding::MfmOddEven {
            self.bits(speed, BitcellEncoding::MfmOdd, nbits, x);
            enc = BitcellEncoding::MfmEven;
        }

        if enc == BitcellEncoding::MfmEven || enc == BitcellEncoding::MfmOdd {
            let mut y: u32 = 0;
            if enc == BitcellEncoding::MfmEven {
                x >>= 1;
            }
            nbits >>= 1;
            for i in 0..nbits {
                y |= (x >> i) & (1u32 << i);
            }
            x = y;
            enc = BitcellEncoding::Mfm;
        }

        for i in (0..nbits).rev() {
            let b = (x >> i) & 1 != 0;
            if enc != BitcellEncoding::Raw || (i & 1) == 0 {
                self.crc16 = crc16_ccitt_bit(b, self.crc16);
            }
            self.cell(speed, enc, b);
        }
    }

    /// Emit each byte of `data` via [`TrackBuffer::bits`].
    pub fn bytes(&mut self, speed: u16, enc: BitcellEncoding, data: &[u8]) {
        if enc == BitcellEncoding::MfmEvenOdd {
            self.bytes(speed, BitcellEncoding::MfmEven, data);
            self.bytes(speed, BitcellEncoding::MfmOdd, data);
            return;
        }
        if enc == BitcellEncoding::MfmOddEven {
            self.bytes(speed, BitcellEncoding::MfmOdd, data);
            self.bytes(speed, BitcellEncoding::MfmEven, data);
            return;
        }
        for &b in data {
            self.bits(speed, enc, 8, b as u32);
        }
    }

    /// Emit `nbits` gap data bits (MFM zeroes unless overridden).
    pub fn gap(&mut self, speed: u16, nbits: u32) {
        if let Some(f) = self.gap_override {
            f(self, speed, nbits);
            return;
        }
        for _ in 0..nbits {
            self.cell(speed, BitcellEncoding::Mfm, false);
        }
    }

    /// Emit `nbits` random data bits and mark the track as carrying weak
    /// cells.
    pub fn weak(&mut self, speed: u16, nbits: u32) {
        self.raw.has_weak_bits = true;
        if let Some(f) = self.weak_override {
            f(self, speed, nbits);
            return;
        }
        for _ in 0..nbits {
            let b = self.rnd16() & 1 != 0;
            self.cell(speed, BitcellEncoding::Mfm, b);
        }
    }

    /// Re-seed the running CRC at a sync point.
    pub fn start_crc(&mut self) {
        self.crc16 = crate::util::CRC_CCITT_INITIAL;
    }

    /// Emit the current CRC as 16 MFM data bits.
    pub fn emit_crc16(&mut self, speed: u16) {
        let crc = self.crc16;
        self.bits(speed, BitcellEncoding::Mfm, 16, crc as u32);
    }

    pub fn disable_auto_sector_split(&mut self) {
        self.disable_auto_sector_split = true;
    }

    pub fn auto_sector_split(&self) -> bool {
        !self.disable_auto_sector_split
    }

    pub fn rnd16(&mut self) -> u16 {
        rnd16(&mut self.prng_seed)
    }

    /// Fill the unwritten arc with the write splice: forward-fill half the
    /// gap with MFM zeroes, lay down five raw zero cells (an MFM-illegal
    /// string a drive will resync past), then reverse-fill the remainder
    /// with alternating bits at nominal speed.
    pub(crate) fn finalise(&mut self) {
        if self.raw.is_empty() || self.start == self.pos {
            return; // handler completely filled the buffer
        }

        let bitlen = self.raw.bitlen;
        let gap = (self.start + bitlen - self.pos) % bitlen;
        // Halve the gap, then halve again to count data bits only.
        let mut nr_bits = gap / 4;
        while nr_bits > 0 {
            self.bits(SPEED_AVG, BitcellEncoding::Mfm, 1, 0);
            nr_bits -= 1;
        }

        self.bits(SPEED_AVG, BitcellEncoding::Raw, 5, 0);

        let mut pos = self.start;
        let mut b = false;
        loop {
            pos = if pos == 0 { bitlen - 1 } else { pos - 1 };
            self.raw.bits.set(pos, b);
            self.raw.speed[pos] = SPEED_AVG;
            b = !b;
            if pos == self.pos {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::{mfm_clock_bit, CRC_CCITT_INITIAL};

    fn max_zero_runs(raw: &TrackRaw) -> Vec<(usize, usize)> {
        // Maximal circular runs of zero cells as (start, len).
        let mut runs = Vec::new();
        let mut i = 0;
        while i < raw.bitlen {
            if raw.bits.get(i).unwrap() {
                i += 1;
                continue;
            }
            let start = i;
            let mut len = 0;
            while len < raw.bitlen && !raw.bits.get((start + len) % raw.bitlen).unwrap() {
                len += 1;
            }
            runs.push((start, len));
            i = start + len;
        }
        runs
    }

    #[test]
    fn mfm_emission_obeys_clock_rule() {
        let mut tbuf = TrackBuffer::new();
        tbuf.init(0, 4096);
        tbuf.bytes(SPEED_AVG, BitcellEncoding::Mfm, &[0x00, 0xFF, 0x4E, 0xA1, 0x12]);

        let mut prev = false;
        for i in 0..(5 * 16) {
            let clock = tbuf.raw.bits.get(2 * i).unwrap();
            let data = tbuf.raw.bits.get(2 * i + 1).unwrap();
            assert_eq!(clock, mfm_clock_bit(prev, data), "cell pair {}", i);
            prev = data;
        }
    }

    #[test]
    fn even_odd_split_recombines() {
        let mut tbuf = TrackBuffer::new();
        tbuf.init(0, 1024);
        let x = 0xDEAD_BEEFu32;
        tbuf.bits(SPEED_AVG, BitcellEncoding::MfmEvenOdd, 32, x);

        let mut words = [0u32; 2];
        for (w, word) in words.iter_mut().enumerate() {
            for i in 0..32 {
                *word = (*word << 1) | tbuf.raw.bits.get(w * 32 + i).unwrap() as u32;
            }
        }
        assert_eq!(crate::util::mfm_decode_even_odd(words[0], words[1]), x);
    }

    #[test]
    fn raw_crc_covers_data_half_only() {
        // Raw emission of a pre-encoded MFM word must leave the CRC as if
        // the decoded byte had been emitted as MFM.
        let mut a = TrackBuffer::new();
        a.init(0, 256);
        a.start_crc();
        a.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, 0x4E);

        let mut b = TrackBuffer::new();
        b.init(0, 256);
        b.start_crc();
        b.bits(SPEED_AVG, BitcellEncoding::Raw, 16, crate::util::mfm_encode_word(0x004E) & 0xFFFF);

        assert_eq!(a.crc(), b.crc());
        assert_eq!(a.crc(), crate::util::crc16_ccitt(&[0x4E], CRC_CCITT_INITIAL));
    }

    #[test]
    fn splice_is_the_only_illegal_run() {
        let mut tbuf = TrackBuffer::new();
        tbuf.init(100, 2000);
        // Partial fill, leaving a large unwritten arc.
        for _ in 0..64 {
            tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, 0x55);
        }
        tbuf.finalise();

        // MFM never produces more than three zero cells in a row, so the
        // splice must be the single clock-violating run. Neighbouring legal
        // zero cells may extend it by one on either side.
        let illegal: Vec<(usize, usize)> =
            max_zero_runs(&tbuf.raw).into_iter().filter(|(_, len)| *len >= 4).collect();
        assert_eq!(illegal.len(), 1, "write splice must be the only illegal run");
        assert!((5..=7).contains(&illegal[0].1));
    }

    #[test]
    fn full_buffer_needs_no_splice() {
        let mut tbuf = TrackBuffer::new();
        tbuf.init(0, 16 * 16);
        for _ in 0..16 {
            tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, 0x4E);
        }
        assert_eq!(tbuf.pos(), tbuf.start());
        let before = tbuf.raw.to_bytes();
        tbuf.finalise();
        assert_eq!(tbuf.raw.to_bytes(), before);
    }

    #[test]
    fn weak_cells_flag_and_vary() {
        let mut tbuf = TrackBuffer::new();
        tbuf.init(0, 4096);
        tbuf.weak(SPEED_AVG, 256);
        assert!(tbuf.raw.has_weak_bits);
        let first = tbuf.raw.to_bytes();

        // Re-initialising the same buffer keeps the PRNG state, so the next
        // weak fill differs.
        tbuf.init(0, 4096);
        tbuf.weak(SPEED_AVG, 256);
        assert!(tbuf.raw.to_bytes() != first);
    }
}
