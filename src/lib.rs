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

//! # fluxdisk
//!
//! fluxdisk is a Rust library for reading, identifying and rewriting floppy
//! disk images across multiple container formats (whole-disk files) and track
//! formats (per-track on-disk encodings: AmigaDOS MFM, IBM PC MFM, Apple II
//! 6-and-2 GCR, and friends).
//!
//! The core of the library is a three-layer decode/encode pipeline:
//!
//! 1. A flux [`stream`] abstraction yielding an effectively infinite sequence
//!    of bit-cells from diverse sources - a KryoFlux hardware capture run
//!    through a software phase-locked loop, or a synthesized replay of an
//!    already-open image.
//! 2. A raw-track buffer and encoding toolkit ([`trackbuf`]) that marshals
//!    MFM and GCR bit patterns (with CRC-16-CCITT and format-specific
//!    checksums) and lays out a complete revolution including the write
//!    splice.
//! 3. A per-format track [`handlers`] registry that parses raw bits into
//!    validated sectors and writes sectors back out as raw bits, feeding a
//!    [`containers`] driver that persists one whole-disk format.
//!
//! The main interface is the [`Disk`] type: open an image with
//! [`Disk::open`], inspect or rewrite its tracks, and persist it with
//! [`Disk::close`].

pub mod containers;
pub mod diskimage;
pub mod handlers;
mod random;
pub mod stream;
pub mod trackbuf;
pub mod util;

use thiserror::Error;

/// Nominal bit-cells in one revolution of a double-density track.
/// Higher densities scale this by the ratio of cell widths.
pub const DEFAULT_BITS_PER_TRACK: u32 = 100_150;

/// Nominal per-cell speed value; `TrackRaw::speed` entries are expressed
/// relative to this (1000 = nominal).
pub const SPEED_AVG: u16 = 1000;

/// `total_bits` sentinel marking a track as unformatted/weak. Interpreted as
/// a negative value: any `total_bits` that is not a positive `i32` means no
/// raw buffer exists for the track.
pub const TRK_WEAK: u32 = 0xFFFF_FFFF;

/// Fixed width of the per-track valid-sector bitmap.
pub const MAX_SECTORS: usize = 64;

#[derive(Debug, Error)]
pub enum DiskError {
    #[error("an I/O error occurred reading or writing the disk image: {0}")]
    Io(String),
    #[error("unknown file suffix: {0}")]
    UnknownSuffix(String),
    #[error("disk image has bad size: {0} bytes")]
    BadSize(u64),
    #[error("bad or missing image signature")]
    BadSignature,
    #[error("operation not supported by this container")]
    Unsupported,
    #[error("container rejected track type: {0}")]
    IncompatibleTrack(&'static str),
    #[error("flux capture is corrupt: {0}")]
    CorruptCapture(String),
    #[error("track number {0} is out of range")]
    TrackRange(u32),
    #[error("track {0} has no raw representation")]
    EmptyTrack(u32),
    #[error("disk image was opened read-only")]
    ReadOnly,
}

impl From<std::io::Error> for DiskError {
    fn from(err: std::io::Error) -> Self {
        DiskError::Io(err.to_string())
    }
}

impl From<binrw::Error> for DiskError {
    fn from(err: binrw::Error) -> Self {
        DiskError::Io(err.to_string())
    }
}

pub use crate::{
    containers::ContainerFormat,
    diskimage::{Disk, DiskInfo, DiskTag, SectorBitmap, TrackInfo},
    handlers::{TrackDensity, TrackType},
    stream::{PllMode, Stream},
    trackbuf::{BitcellEncoding, TrackBuffer, TrackRaw},
};
