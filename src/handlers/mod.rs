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

//! The track-handler registry.
//!
//! Every supported on-disk track format has one [`TrackHandler`] entry
//! providing its geometry metadata and the decode (`write_raw`: stream in,
//! sectors out) and encode (`read_raw`: sectors in, raw bits out) entry
//! points, plus optional logical-sector accessors. The registry is a fixed,
//! read-only table; [`handler`] dispatches on [`TrackType`].

pub mod amigados;
pub mod appleii;
pub mod ibm_pc;
pub mod raw;

use strum::{EnumIter, FromRepr, IntoStaticStr};

use crate::{diskimage::TrackInfo, stream::Stream, trackbuf::TrackBuffer};

/// Discriminator into the handler registry.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, EnumIter, FromRepr, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[repr(u16)]
pub enum TrackType {
    #[default]
    Unformatted,
    AmigaDos,
    IbmPcDd,
    IbmPcHd,
    IbmPcEd,
    SiemensIsdxHd,
    RawDd,
    RawHd,
    AppleII16Sector,
    AppleII13Sector,
}

impl TrackType {
    /// The short identifier name, e.g. `amiga_dos`.
    pub fn id_name(&self) -> &'static str {
        self.into()
    }
}

/// Recording density of a track; determines the nominal bit-cell width.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TrackDensity {
    Single,
    Double,
    High,
    Extra,
}

impl TrackDensity {
    /// Nominal nanoseconds per bit-cell.
    pub fn ns_per_cell(self) -> u32 {
        match self {
            TrackDensity::Single => 4000,
            TrackDensity::Double => 2000,
            TrackDensity::High => 1000,
            TrackDensity::Extra => 500,
        }
    }
}

/// Decode: consume raw bits from a stream, produce the track's decoded
/// payload, or `None` if not a single sector could be recovered.
pub type WriteRawFn = fn(&mut TrackInfo, u32, &mut Stream) -> Option<Vec<u8>>;
/// Encode: lay the track's decoded payload out as raw bits.
pub type ReadRawFn = fn(&TrackInfo, u32, &mut TrackBuffer);
/// Produce the sector-oriented view of the decoded payload.
pub type ReadSectorsFn = fn(&TrackInfo, u32) -> Vec<u8>;
/// Accept a sector-oriented payload, producing the decoded track buffer.
pub type WriteSectorsFn = fn(&mut TrackInfo, u32, &[u8]) -> Option<Vec<u8>>;

pub struct TrackHandler {
    pub density: TrackDensity,
    pub bytes_per_sector: usize,
    pub nr_sectors: usize,
    pub typename: &'static str,
    pub write_raw: Option<WriteRawFn>,
    pub read_raw: Option<ReadRawFn>,
    pub read_sectors: Option<ReadSectorsFn>,
    pub write_sectors: Option<WriteSectorsFn>,
}

static UNFORMATTED_HANDLER: TrackHandler = TrackHandler {
    density: TrackDensity::Double,
    bytes_per_sector: 0,
    nr_sectors: 0,
    typename: "Unformatted",
    write_raw: None,
    read_raw: None,
    read_sectors: None,
    write_sectors: None,
};

/// Look up the handler for a track type. The table is process-wide constant
/// data; handlers never change at runtime.
pub fn handler(t: TrackType) -> &'static TrackHandler {
    match t {
        TrackType::Unformatted => &UNFORMATTED_HANDLER,
        TrackType::AmigaDos => &amigados::AMIGADOS_HANDLER,
        TrackType::IbmPcDd => &ibm_pc::IBM_PC_DD_HANDLER,
        TrackType::IbmPcHd => &ibm_pc::IBM_PC_HD_HANDLER,
        TrackType::IbmPcEd => &ibm_pc::IBM_PC_ED_HANDLER,
        TrackType::SiemensIsdxHd => &ibm_pc::SIEMENS_ISDX_HD_HANDLER,
        TrackType::RawDd => &raw::RAW_DD_HANDLER,
        TrackType::RawHd => &raw::RAW_HD_HANDLER,
        TrackType::AppleII16Sector => &appleii::APPLEII_16SECTOR_HANDLER,
        TrackType::AppleII13Sector => &appleii::APPLEII_13SECTOR_HANDLER,
    }
}
