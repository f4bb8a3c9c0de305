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

//! The soft source: replays an in-memory bits+speed pair. Used to push a
//! raw buffer back through a handler's decoder.

use crate::trackbuf::TrackRaw;

use super::SourceBit;

pub(crate) struct SoftStream {
    raw: TrackRaw,
    pos: usize,
    ns_per_cell: u32,
}

impl SoftStream {
    pub(crate) fn new(raw: &TrackRaw) -> SoftStream {
        let ns_per_cell = if raw.bitlen > 0 {
            200_000_000 / raw.bitlen as u32
        }
        else {
            0
        };
        SoftStream {
            raw: raw.clone(),
            pos: 0,
            ns_per_cell,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.pos = 0;
    }

    pub(crate) fn next_bit(&mut self) -> SourceBit {
        let mut index = false;
        if self.pos >= self.raw.bitlen {
            self.pos = 0;
            index = true;
        }
        let bit = self.raw.bits.get(self.pos).unwrap_or(false);
        let latency = (self.ns_per_cell as u64 * self.raw.speed[self.pos] as u64) / 1000;
        self.pos += 1;
        SourceBit {
            bit,
            latency,
            index,
        }
    }
}
