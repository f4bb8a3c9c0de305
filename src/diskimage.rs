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

//! The in-memory disk model and its lifecycle.
//!
//! A [`Disk`] owns a backing file, its container driver, a fixed array of
//! [`TrackInfo`] records and an ordered list of opaque tags. Track-level
//! operations route through the handler registry: `read_track_raw`
//! materializes a track as raw bits, `write_track_raw_from_stream` runs a
//! stream through a handler's decoder and commits the result.

use std::fs::{File, OpenOptions};

use crate::{
    containers::{ContainerCaps, ContainerFormat},
    handlers::{handler, TrackType},
    stream::Stream,
    trackbuf::{TrackBuffer, TrackRaw},
    DiskError, MAX_SECTORS, TRK_WEAK,
};

/// Per-track bitmap of successfully decoded sectors. Bit *i* is MSB-first
/// within each byte: bit `(!i & 7)` of byte `i >> 3`.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct SectorBitmap {
    map: [u8; MAX_SECTORS / 8],
}

impl SectorBitmap {
    pub fn is_valid(&self, sector: usize) -> bool {
        assert!(sector < MAX_SECTORS);
        (self.map[sector >> 3] >> (!sector & 7)) & 1 != 0
    }

    pub fn set_valid(&mut self, sector: usize) {
        assert!(sector < MAX_SECTORS);
        self.map[sector >> 3] |= 1u8 << (!sector & 7);
    }

    pub fn set_invalid(&mut self, sector: usize) {
        assert!(sector < MAX_SECTORS);
        self.map[sector >> 3] &= !(1u8 << (!sector & 7));
    }

    pub fn set_all_invalid(&mut self) {
        self.map = [0; MAX_SECTORS / 8];
    }

    pub fn set_all_valid(&mut self, nr_sectors: usize) {
        self.set_all_invalid();
        for sector in 0..nr_sectors {
            self.set_valid(sector);
        }
    }

    pub fn count_valid(&self, nr_sectors: usize) -> usize {
        (0..nr_sectors).filter(|&s| self.is_valid(s)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.map.iter().all(|&b| b == 0)
    }

    pub fn to_u64(&self) -> u64 {
        u64::from_be_bytes(self.map)
    }

    pub fn from_u64(bits: u64) -> SectorBitmap {
        SectorBitmap {
            map: bits.to_be_bytes(),
        }
    }
}

impl std::fmt::Debug for SectorBitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SectorBitmap({:016x})", self.to_u64())
    }
}

/// One physical track of the disk.
#[derive(Clone, Debug, Default)]
pub struct TrackInfo {
    pub track_type: TrackType,
    /// Decoded payload; layout is handler-defined, commonly
    /// `nr_sectors * bytes_per_sector` plus fixed tails.
    pub dat: Vec<u8>,
    /// Current meaningful length of `dat`.
    pub len: usize,
    pub nr_sectors: usize,
    pub bytes_per_sector: usize,
    pub valid_sectors: SectorBitmap,
    /// Raw-bit offset of meaningful data, measured from the index pulse.
    pub data_bitoff: u32,
    /// Bit-cells per revolution; non-positive (as `i32`) marks the track
    /// unformatted/weak.
    pub total_bits: u32,
}

impl TrackInfo {
    /// Reset the record to a fresh instance of `track_type`, with geometry
    /// taken from the handler registry.
    pub fn init(&mut self, track_type: TrackType) {
        let h = handler(track_type);
        assert!(h.nr_sectors <= MAX_SECTORS);
        *self = TrackInfo {
            track_type,
            dat: Vec::new(),
            len: h.bytes_per_sector * h.nr_sectors,
            nr_sectors: h.nr_sectors,
            bytes_per_sector: h.bytes_per_sector,
            valid_sectors: SectorBitmap::default(),
            data_bitoff: 0,
            total_bits: 0,
        };
    }

    /// Human description of the track format.
    pub fn typename(&self) -> &'static str {
        handler(self.track_type).typename
    }

    pub fn is_formatted(&self) -> bool {
        self.total_bits as i32 > 0
    }

    pub(crate) fn mark_unformatted(&mut self) {
        self.init(TrackType::Unformatted);
        self.total_bits = TRK_WEAK;
    }
}

#[derive(Default)]
pub struct DiskInfo {
    pub tracks: Vec<TrackInfo>,
    /// Reserved.
    pub flags: u32,
}

impl DiskInfo {
    pub fn nr_tracks(&self) -> usize {
        self.tracks.len()
    }
}

/// An opaque 16-bit-id blob attached to a disk. Tags are kept ordered by
/// id and unique by id with replacement semantics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiskTag {
    pub id: u16,
    pub data: Vec<u8>,
}

pub struct Disk {
    pub(crate) file: File,
    pub(crate) read_only: bool,
    pub(crate) container: ContainerFormat,
    pub(crate) di: DiskInfo,
    pub(crate) tags: Vec<DiskTag>,
}

impl Disk {
    /// Create a new image at `path`, with the container selected by file
    /// suffix and materialized at its canonical empty geometry.
    pub fn create(path: &str) -> Result<Disk, DiskError> {
        Disk::create_with_container(path, ContainerFormat::from_suffix(path)?)
    }

    /// Create a new image with an explicitly chosen container (required
    /// for the Apple II orderings, which share the plain `.dsk` suffix).
    pub fn create_with_container(
        path: &str,
        container: ContainerFormat,
    ) -> Result<Disk, DiskError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let mut disk = Disk {
            file,
            read_only: false,
            container,
            di: DiskInfo::default(),
            tags: Vec::new(),
        };
        container.init(&mut disk);
        Ok(disk)
    }

    /// Open an existing image. The container is selected by suffix; its
    /// `open` sniffs the content and may redirect to a sibling driver.
    pub fn open(path: &str, read_only: bool) -> Result<Disk, DiskError> {
        let container = ContainerFormat::from_suffix(path)?;
        let file = if read_only {
            OpenOptions::new().read(true).open(path)?
        }
        else {
            OpenOptions::new().read(true).write(true).open(path)?
        };
        let mut disk = Disk {
            file,
            read_only,
            container,
            di: DiskInfo::default(),
            tags: Vec::new(),
        };
        disk.container = container.open(&mut disk)?;
        log::debug!(
            "opened {} as {} container ({} tracks)",
            path,
            <&'static str>::from(disk.container),
            disk.di.nr_tracks()
        );
        Ok(disk)
    }

    /// Persist and drop the disk. Read-only disks are dropped untouched.
    pub fn close(mut self) -> Result<(), DiskError> {
        if self.read_only {
            return Ok(());
        }
        if !self.container.caps().contains(ContainerCaps::CLOSE) {
            return Err(DiskError::Unsupported);
        }
        let container = self.container;
        container.close(&mut self)
    }

    pub fn info(&self) -> &DiskInfo {
        &self.di
    }

    pub fn container(&self) -> ContainerFormat {
        self.container
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Attach a tag, replacing any existing tag with the same id.
    pub fn set_tag(&mut self, id: u16, data: Vec<u8>) {
        match self.tags.binary_search_by_key(&id, |t| t.id) {
            Ok(i) => self.tags[i].data = data,
            Err(i) => self.tags.insert(i, DiskTag { id, data }),
        }
    }

    pub fn tag_by_id(&self, id: u16) -> Option<&DiskTag> {
        self.tags.iter().find(|t| t.id == id)
    }

    pub fn tag_by_index(&self, idx: usize) -> Option<&DiskTag> {
        self.tags.get(idx)
    }

    /// Materialize a track as raw bits in `buf`. An unformatted or
    /// out-of-range track leaves the buffer empty.
    pub fn read_track_raw(&self, buf: &mut TrackBuffer, tracknr: u32) {
        buf.purge();
        let Some(ti) = self.di.tracks.get(tracknr as usize) else {
            return;
        };
        if !ti.is_formatted() {
            return;
        }
        buf.init(ti.data_bitoff, ti.total_bits);
        if let Some(read_raw) = handler(ti.track_type).read_raw {
            read_raw(ti, tracknr, buf);
        }
        buf.finalise();
    }

    /// Run `stream` through the decoder for `track_type` and commit the
    /// result. Returns `Ok(true)` if the track decoded, `Ok(false)` if it
    /// was left unformatted.
    pub fn write_track_raw_from_stream(
        &mut self,
        tracknr: u32,
        track_type: TrackType,
        stream: &mut Stream,
    ) -> Result<bool, DiskError> {
        if self.read_only {
            return Err(DiskError::ReadOnly);
        }
        let container = self.container;
        container.write_raw(self, tracknr, track_type, stream)
    }

    /// As [`Disk::write_track_raw_from_stream`], replaying an in-memory
    /// raw buffer.
    pub fn write_track_raw(
        &mut self,
        raw: &TrackRaw,
        tracknr: u32,
        track_type: TrackType,
    ) -> Result<bool, DiskError> {
        if raw.is_empty() {
            return Err(DiskError::EmptyTrack(tracknr));
        }
        let mut stream = Stream::soft(raw);
        self.write_track_raw_from_stream(tracknr, track_type, &mut stream)
    }

    /// The sector-oriented view of a decoded track.
    pub fn read_track_sectors(&self, tracknr: u32) -> Result<Vec<u8>, DiskError> {
        let ti = self
            .di
            .tracks
            .get(tracknr as usize)
            .ok_or(DiskError::TrackRange(tracknr))?;
        let read_sectors =
            handler(ti.track_type).read_sectors.ok_or(DiskError::Unsupported)?;
        Ok(read_sectors(ti, tracknr))
    }

    /// Reformat a track from a sector-oriented payload. On rejection the
    /// track is reset to unformatted and `Ok(false)` is returned.
    pub fn write_track_sectors(
        &mut self,
        tracknr: u32,
        track_type: TrackType,
        data: &[u8],
    ) -> Result<bool, DiskError> {
        if self.read_only {
            return Err(DiskError::ReadOnly);
        }
        let ti = self
            .di
            .tracks
            .get_mut(tracknr as usize)
            .ok_or(DiskError::TrackRange(tracknr))?;

        ti.init(track_type);
        let h = handler(track_type);
        let Some(write_sectors) = h.write_sectors else {
            ti.mark_unformatted();
            return Err(DiskError::Unsupported);
        };

        let ns_per_cell = h.density.ns_per_cell();
        ti.total_bits = crate::DEFAULT_BITS_PER_TRACK * 2000 / ns_per_cell;

        match write_sectors(ti, tracknr, data) {
            Some(dat) => {
                ti.len = dat.len();
                ti.dat = dat;
                Ok(true)
            }
            None => {
                ti.mark_unformatted();
                Ok(false)
            }
        }
    }

    pub fn mark_track_unformatted(&mut self, tracknr: u32) -> Result<(), DiskError> {
        let ti = self
            .di
            .tracks
            .get_mut(tracknr as usize)
            .ok_or(DiskError::TrackRange(tracknr))?;
        ti.mark_unformatted();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmap_bit_order() {
        let mut map = SectorBitmap::default();
        map.set_valid(0);
        assert_eq!(map.to_u64() >> 56, 0x80);
        map.set_valid(7);
        assert_eq!(map.to_u64() >> 56, 0x81);
        map.set_valid(8);
        assert_eq!((map.to_u64() >> 48) & 0xFF, 0x80);
    }

    #[test]
    fn bitmap_set_all_then_invalidate_one() {
        let nr = 11;
        let mut map = SectorBitmap::default();
        map.set_all_valid(nr);
        assert_eq!(map.count_valid(nr), nr);
        map.set_invalid(4);
        assert_eq!(map.count_valid(nr), nr - 1);
        assert!(!map.is_valid(4));
        // Bits outside [0, nr_sectors) stay clear.
        assert_eq!(map.count_valid(MAX_SECTORS), nr - 1);
    }

    #[test]
    fn bitmap_u64_round_trip() {
        let mut map = SectorBitmap::default();
        map.set_valid(3);
        map.set_valid(17);
        map.set_valid(63);
        let restored = SectorBitmap::from_u64(map.to_u64());
        assert_eq!(restored, map);
    }

    #[test]
    fn track_init_invariants() {
        let mut ti = TrackInfo::default();
        ti.init(TrackType::AmigaDos);
        assert_eq!(ti.len, ti.nr_sectors * ti.bytes_per_sector);
        assert!(!ti.is_formatted());
        ti.total_bits = crate::DEFAULT_BITS_PER_TRACK;
        assert!(ti.is_formatted());
        ti.mark_unformatted();
        assert_eq!(ti.track_type, TrackType::Unformatted);
        assert!(!ti.is_formatted());
        assert_eq!(ti.total_bits, TRK_WEAK);
    }

    #[test]
    fn tags_are_ordered_and_replaced() {
        // A tag list needs no backing file; use a scratch disk.
        let path = std::env::temp_dir().join("fluxdisk_tags_test.adf");
        let mut disk = Disk::create(path.to_str().unwrap()).unwrap();
        disk.set_tag(30, vec![3]);
        disk.set_tag(10, vec![1]);
        disk.set_tag(20, vec![2]);
        disk.set_tag(10, vec![9]);
        assert_eq!(disk.tag_by_index(0).unwrap().id, 10);
        assert_eq!(disk.tag_by_index(0).unwrap().data, vec![9]);
        assert_eq!(disk.tag_by_index(1).unwrap().id, 20);
        assert_eq!(disk.tag_by_index(2).unwrap().id, 30);
        assert!(disk.tag_by_id(40).is_none());
        drop(disk);
        let _ = std::fs::remove_file(path);
    }
}
