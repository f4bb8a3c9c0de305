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

//! The flux stream abstraction.
//!
//! A [`Stream`] yields a lazy, restartable sequence of bit-cells from one of
//! a small closed set of sources: a KryoFlux hardware capture run through a
//! software PLL, a replay of a track from an already-open disk image, or a
//! replay of an in-memory raw buffer. The facade maintains the 32-bit shift
//! register consumers scan for sync words, the running latency in
//! nanoseconds, and the bit offset since the last index pulse.

pub mod image;
pub mod kryoflux;
pub(crate) mod soft;

use crate::{containers::ContainerFormat, trackbuf::TrackRaw, DiskError};

/// Clock recovery behaviour of the capture-variant PLL.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum PllMode {
    /// The clock is pinned to its centre value.
    Fixed,
    /// The clock tracks phase mismatch and the timing window snaps to each
    /// flux transition.
    #[default]
    Variable,
    /// As `Variable`, but half the residual flux is carried into the next
    /// cell rather than snapping the window.
    Authentic,
}

/// One decoded bit-cell handed up by a source.
pub(crate) struct SourceBit {
    pub bit: bool,
    /// Nanoseconds consumed producing this cell.
    pub latency: u64,
    /// The index pulse fired at this cell; it restarts the revolution.
    pub index: bool,
}

enum StreamSource {
    Kryoflux(kryoflux::KfxStream),
    Image(Box<image::ImageStream>),
    Soft(soft::SoftStream),
}

/// Streams replaying a finite image are circular and would otherwise never
/// end; decoders are cut off after this many revolutions.
const MAX_REVOLUTIONS: u32 = 8;

pub struct Stream {
    source: StreamSource,
    /// Shift register of the most recent 32 bits, newest in bit 0.
    pub word: u32,
    latency: u64,
    index_offset: u32,
    nr_index: u32,
}

impl Stream {
    /// Open a bit source. A KryoFlux capture set is probed first
    /// (`<name>00.0.raw`, then `<name>/00.0.raw`); otherwise the file
    /// suffix routes to an image-replay source.
    pub fn open(path: &str) -> Result<Stream, DiskError> {
        if kryoflux::probe(path) {
            return Ok(Stream::wrap(StreamSource::Kryoflux(kryoflux::KfxStream::open(path)?)));
        }
        if ContainerFormat::from_suffix(path).is_ok() {
            return Ok(Stream::wrap(StreamSource::Image(Box::new(image::ImageStream::open(
                path,
            )?))));
        }
        Err(DiskError::UnknownSuffix(path.to_string()))
    }

    /// Replay an in-memory raw buffer.
    pub(crate) fn soft(raw: &TrackRaw) -> Stream {
        Stream::wrap(StreamSource::Soft(soft::SoftStream::new(raw)))
    }

    fn wrap(source: StreamSource) -> Stream {
        Stream {
            source,
            word: 0,
            latency: 0,
            index_offset: 0,
            nr_index: 0,
        }
    }

    pub fn select_track(&mut self, tracknr: u32) -> Result<(), DiskError> {
        match &mut self.source {
            StreamSource::Kryoflux(k) => k.select_track(tracknr),
            StreamSource::Image(i) => i.select_track(tracknr),
            StreamSource::Soft(_) => Ok(()),
        }
    }

    /// Rewind to the start of the selected track and clear derived state.
    pub fn reset(&mut self) {
        match &mut self.source {
            StreamSource::Kryoflux(k) => k.reset(),
            StreamSource::Image(i) => i.reset(),
            StreamSource::Soft(s) => s.reset(),
        }
        self.word = 0;
        self.latency = 0;
        self.index_offset = 0;
        self.nr_index = 0;
    }

    /// Set the expected bit-cell width. Only meaningful for the capture
    /// variant, whose PLL centres on it.
    pub fn set_density(&mut self, ns_per_cell: u32) {
        if let StreamSource::Kryoflux(k) = &mut self.source {
            k.set_density(ns_per_cell);
        }
    }

    pub fn set_pll_mode(&mut self, mode: PllMode) {
        if let StreamSource::Kryoflux(k) = &mut self.source {
            k.set_pll_mode(mode);
        }
    }

    /// Nanoseconds of media time consumed so far.
    pub fn latency(&self) -> u64 {
        self.latency
    }

    /// Bits consumed since the last index pulse.
    pub fn index_offset(&self) -> u32 {
        self.index_offset
    }

    /// A fatal defect detected by the source (e.g. an out-of-sync capture
    /// record), surfaced after the stream reports end-of-stream.
    pub(crate) fn take_error(&mut self) -> Option<DiskError> {
        match &mut self.source {
            StreamSource::Kryoflux(k) => k.take_error(),
            _ => None,
        }
    }

    /// Pull the next bit-cell, or `None` at end-of-stream.
    pub fn next_bit(&mut self) -> Option<bool> {
        if self.nr_index >= MAX_REVOLUTIONS {
            return None;
        }
        let sb = match &mut self.source {
            StreamSource::Kryoflux(k) => k.next_bit()?,
            StreamSource::Image(i) => i.next_bit(),
            StreamSource::Soft(s) => s.next_bit(),
        };
        if sb.index {
            self.nr_index += 1;
            self.index_offset = 0;
        }
        self.index_offset += 1;
        self.word = (self.word << 1) | sb.bit as u32;
        self.latency += sb.latency;
        Some(sb.bit)
    }

    /// Shift `n` further bits into the register and return it.
    pub fn next_bits(&mut self, n: u32) -> Option<u32> {
        for _ in 0..n {
            self.next_bit()?;
        }
        Some(self.word)
    }

    /// Fill `buf` with raw stream bytes, eight cells each.
    pub fn next_bytes(&mut self, buf: &mut [u8]) -> Option<()> {
        for b in buf.iter_mut() {
            self.next_bits(8)?;
            *b = (self.word & 0xFF) as u8;
        }
        Some(())
    }

    /// Consume bits until the next index pulse.
    pub fn next_index(&mut self) -> Option<()> {
        let target = self.nr_index + 1;
        while self.nr_index < target {
            self.next_bit()?;
        }
        Some(())
    }
}
