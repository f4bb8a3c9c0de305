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

//! Whole-image container drivers.
//!
//! A container maps an on-disk byte layout to and from the in-memory
//! [`DiskInfo`](crate::diskimage::DiskInfo). The set is fixed and selected
//! by file suffix; a driver's `open` sniffs the content and may redirect to
//! a sibling driver (an ADF open that finds the `UAE-1ADF` signature
//! returns the extended-ADF container).

pub mod adf;
pub mod appleii;
pub mod dsk;
pub mod eadf;
pub mod img;
pub mod ipf;
pub mod scp;

use bitflags::bitflags;
use strum::{EnumIter, IntoStaticStr};

use crate::{
    diskimage::Disk,
    handlers::{handler, TrackType},
    stream::Stream,
    DiskError, DEFAULT_BITS_PER_TRACK,
};

bitflags! {
    /// What a container driver can do.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct ContainerCaps: u32 {
        const OPEN      = 1 << 0;
        const CLOSE     = 1 << 1;
        const WRITE_RAW = 1 << 2;
        const SECTORS   = 1 << 3;
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ContainerFormat {
    Adf,
    Eadf,
    Dsk,
    Img,
    Ipf,
    Scp,
    AppleIILogical,
    AppleIIDo,
    AppleIIPo,
}

impl ContainerFormat {
    /// Route a file name to its container by the suffix after the final
    /// dot. The Apple II orderings are not suffix-routed; they are chosen
    /// explicitly at create time.
    pub fn from_suffix(name: &str) -> Result<ContainerFormat, DiskError> {
        let suffix = name.rsplit('.').next().unwrap_or("");
        match suffix {
            "adf" => Ok(ContainerFormat::Adf),
            "eadf" => Ok(ContainerFormat::Eadf),
            "dsk" => Ok(ContainerFormat::Dsk),
            "img" => Ok(ContainerFormat::Img),
            "ipf" => Ok(ContainerFormat::Ipf),
            "scp" => Ok(ContainerFormat::Scp),
            _ => {
                log::warn!(
                    "unknown file suffix: {} (valid suffixes: .adf,.eadf,.dsk,.img,.ipf,.scp)",
                    name
                );
                Err(DiskError::UnknownSuffix(name.to_string()))
            }
        }
    }

    pub fn caps(self) -> ContainerCaps {
        use ContainerFormat::*;
        match self {
            Adf | Eadf => ContainerCaps::OPEN | ContainerCaps::CLOSE | ContainerCaps::WRITE_RAW,
            Dsk => ContainerCaps::all(),
            Img => {
                ContainerCaps::OPEN
                    | ContainerCaps::CLOSE
                    | ContainerCaps::WRITE_RAW
                    | ContainerCaps::SECTORS
            }
            Ipf => ContainerCaps::empty(),
            Scp => ContainerCaps::CLOSE | ContainerCaps::WRITE_RAW,
            AppleIILogical | AppleIIDo | AppleIIPo => {
                ContainerCaps::CLOSE | ContainerCaps::WRITE_RAW | ContainerCaps::SECTORS
            }
        }
    }

    /// Materialize empty tracks at the container's canonical geometry.
    pub(crate) fn init(self, disk: &mut Disk) {
        use ContainerFormat::*;
        match self {
            Adf | Eadf => adf::init(disk),
            Dsk | Ipf | Scp | AppleIILogical | AppleIIDo | AppleIIPo => dsk::init(disk),
            Img => img::init(disk),
        }
    }

    /// Sniff and load the image, returning the container that actually
    /// owns it.
    pub(crate) fn open(self, disk: &mut Disk) -> Result<ContainerFormat, DiskError> {
        use ContainerFormat::*;
        match self {
            Adf => adf::open(disk),
            Eadf => eadf::open(disk),
            Dsk => dsk::open(disk),
            Img => img::open(disk),
            Ipf => ipf::open(disk),
            Scp | AppleIILogical | AppleIIDo | AppleIIPo => Err(DiskError::Unsupported),
        }
    }

    /// Truncate and re-serialize the image.
    pub(crate) fn close(self, disk: &mut Disk) -> Result<(), DiskError> {
        use ContainerFormat::*;
        match self {
            Adf => adf::close(disk),
            Eadf => eadf::close(disk),
            Dsk => dsk::close(disk),
            Img => img::close(disk),
            Ipf => Err(DiskError::Unsupported),
            Scp => scp::close(disk),
            AppleIILogical => appleii::close(disk, &appleii::SECTOR_TRANSLATE_LOGICAL),
            AppleIIDo => appleii::close(disk, &appleii::SECTOR_TRANSLATE_DOS),
            AppleIIPo => appleii::close(disk, &appleii::SECTOR_TRANSLATE_PRODOS),
        }
    }

    /// Decode a stream into a track of the given type.
    pub(crate) fn write_raw(
        self,
        disk: &mut Disk,
        tracknr: u32,
        track_type: TrackType,
        stream: &mut Stream,
    ) -> Result<bool, DiskError> {
        if !self.caps().contains(ContainerCaps::WRITE_RAW) {
            return Err(DiskError::Unsupported);
        }
        match self {
            ContainerFormat::Adf => adf::write_raw(disk, tracknr, track_type, stream),
            _ => write_raw_generic(disk, tracknr, track_type, stream),
        }
    }
}

/// The shared decode path: reset the stream to the index, hand it to the
/// handler, commit the decoded payload or mark the track unformatted.
pub(crate) fn write_raw_generic(
    disk: &mut Disk,
    tracknr: u32,
    track_type: TrackType,
    stream: &mut Stream,
) -> Result<bool, DiskError> {
    let ti = disk
        .di
        .tracks
        .get_mut(tracknr as usize)
        .ok_or(DiskError::TrackRange(tracknr))?;

    ti.init(track_type);
    let h = handler(track_type);
    let Some(decode) = h.write_raw else {
        ti.mark_unformatted();
        return Err(DiskError::Unsupported);
    };

    let ns_per_cell = h.density.ns_per_cell();
    ti.total_bits = DEFAULT_BITS_PER_TRACK * 2000 / ns_per_cell;

    stream.set_density(ns_per_cell);
    stream.reset();
    if stream.next_index().is_none() {
        if let Some(err) = stream.take_error() {
            return Err(err);
        }
        ti.mark_unformatted();
        return Ok(false);
    }

    let dat = decode(ti, tracknr, stream);
    if let Some(err) = stream.take_error() {
        return Err(err);
    }
    match dat {
        Some(dat) => {
            ti.len = dat.len();
            ti.dat = dat;
            Ok(true)
        }
        None => {
            log::warn!("T{}: no sectors decoded, leaving track unformatted", tracknr);
            ti.mark_unformatted();
            Ok(false)
        }
    }
}
