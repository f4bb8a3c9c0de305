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

//! The image-replay source: converts an already-open disk image into stream
//! form by lazily materializing each track through its handler's encoder
//! and replaying the resulting raw buffer.

use crate::{diskimage::Disk, trackbuf::TrackBuffer, DiskError};

use super::SourceBit;

pub struct ImageStream {
    disk: Disk,
    tbuf: TrackBuffer,
    track: Option<u32>,
    pos: usize,
    ns_per_cell: u32,
}

impl ImageStream {
    pub(crate) fn open(path: &str) -> Result<ImageStream, DiskError> {
        let disk = Disk::open(path, true)?;
        Ok(ImageStream {
            disk,
            tbuf: TrackBuffer::new(),
            track: None,
            pos: 0,
            ns_per_cell: 0,
        })
    }

    pub(crate) fn select_track(&mut self, tracknr: u32) -> Result<(), DiskError> {
        if self.track == Some(tracknr) && !self.tbuf.raw.is_empty() {
            return Ok(());
        }
        self.track = None;
        self.disk.read_track_raw(&mut self.tbuf, tracknr);
        if self.tbuf.raw.is_empty() {
            return Err(DiskError::EmptyTrack(tracknr));
        }
        // One revolution always spans 200ms of media time.
        self.ns_per_cell = 200_000_000 / self.tbuf.raw.bitlen as u32;
        self.track = Some(tracknr);
        Ok(())
    }

    pub(crate) fn reset(&mut self) {
        self.reroll_weak_bits();
        self.pos = 0;
    }

    /// A track with weak cells reads differently on every revolution;
    /// re-materialize it so the buffer's PRNG advances.
    fn reroll_weak_bits(&mut self) {
        if !self.tbuf.raw.has_weak_bits {
            return;
        }
        let Some(tracknr) = self.track else { return };
        self.track = None;
        if self.select_track(tracknr).is_err() {
            // The track decoded once already; it cannot vanish.
            unreachable!("weak-bit reroll failed for track {}", tracknr);
        }
    }

    pub(crate) fn next_bit(&mut self) -> SourceBit {
        let mut index = false;
        if self.pos >= self.tbuf.raw.bitlen {
            self.reroll_weak_bits();
            self.pos = 0;
            index = true;
        }
        let bit = self.tbuf.raw.bits.get(self.pos).unwrap_or(false);
        let latency =
            (self.ns_per_cell as u64 * self.tbuf.raw.speed[self.pos] as u64) / 1000;
        self.pos += 1;
        SourceBit {
            bit,
            latency,
            index,
        }
    }
}
