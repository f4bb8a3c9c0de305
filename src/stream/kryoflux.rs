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

//! The KryoFlux STREAM capture source.
//!
//! A capture set is one `.raw` file per track side, named
//! `<basename><TT>.<H>.raw`, holding a byte stream of flux samples
//! interleaved with out-of-band records. Flux intervals in sampler ticks
//! are converted to nanoseconds and run through a software phase-locked
//! loop that recovers bit-cells from the jittery interval sequence.

use std::path::Path;

use regex::Regex;

use crate::DiskError;

use super::{PllMode, SourceBit};

pub const KFX_MCK: f64 = ((18_432_000.0 * 73.0) / 14.0) / 2.0;
pub const KFX_SCK: f64 = KFX_MCK / 2.0;
pub const KFX_ICK: f64 = KFX_MCK / 16.0;

/// Default bit-cell width: 2000ns = 2us, a double-density disk.
const CLOCK_CENTRE: i32 = 2000;
/// The PLL clock may stray this far (percent) from its centre.
const CLOCK_MAX_ADJ: i32 = 10;

const NO_INDEX: u32 = u32::MAX;

fn clock_min(centre: i32) -> i32 {
    centre * (100 - CLOCK_MAX_ADJ) / 100
}

fn clock_max(centre: i32) -> i32 {
    centre * (100 + CLOCK_MAX_ADJ) / 100
}

/// Picoseconds per sampler tick for a given sample clock.
fn ps_per_tick(sck: f64) -> u32 {
    (1.0e12 / sck) as u32
}

pub(crate) struct KfxStream {
    basename: String,
    track: Option<u32>,

    /// Raw capture bytes of the selected track.
    dat: Vec<u8>,
    /// Current parse position in `dat`.
    dat_idx: usize,
    /// Current index into non-OOB stream data.
    stream_idx: u32,
    /// Stream index at which the next index pulse falls.
    pub(crate) index_pos: u32,
    index_pending: bool,

    /// Nanoseconds to the next flux reversal.
    flux: i32,
    clock: i32,
    clock_centre: i32,
    clocked_zeros: u32,
    pll_mode: PllMode,

    ps_per_tick: u32,
    error: Option<DiskError>,
}

/// A capture set exists if the track-0 side-0 file is found beside or
/// below `name`.
pub fn probe(name: &str) -> bool {
    Path::new(&format!("{}00.0.raw", name)).exists()
        || Path::new(&format!("{}/00.0.raw", name)).exists()
}

impl KfxStream {
    pub(crate) fn open(name: &str) -> Result<KfxStream, DiskError> {
        let basename = if Path::new(&format!("{}00.0.raw", name)).exists() {
            name.to_string()
        }
        else if Path::new(&format!("{}/00.0.raw", name)).exists() {
            format!("{}/", name)
        }
        else {
            return Err(DiskError::Io(format!("no capture set at {}", name)));
        };

        Ok(KfxStream {
            basename,
            track: None,
            dat: Vec::new(),
            dat_idx: 0,
            stream_idx: 0,
            index_pos: NO_INDEX,
            index_pending: false,
            flux: 0,
            clock: CLOCK_CENTRE,
            clock_centre: CLOCK_CENTRE,
            clocked_zeros: 0,
            pll_mode: PllMode::default(),
            ps_per_tick: ps_per_tick(KFX_SCK),
            error: None,
        })
    }

    pub(crate) fn set_density(&mut self, ns_per_cell: u32) {
        self.clock = ns_per_cell as i32;
        self.clock_centre = ns_per_cell as i32;
    }

    pub(crate) fn set_pll_mode(&mut self, mode: PllMode) {
        self.pll_mode = mode;
    }

    pub(crate) fn take_error(&mut self) -> Option<DiskError> {
        self.error.take()
    }

    pub(crate) fn select_track(&mut self, tracknr: u32) -> Result<(), DiskError> {
        if self.track == Some(tracknr) && !self.dat.is_empty() {
            return Ok(());
        }
        self.track = None;
        let trackname = format!("{}{:02}.{}.raw", self.basename, tracknr >> 1, tracknr & 1);
        self.dat = std::fs::read(&trackname)
            .map_err(|e| DiskError::Io(format!("{}: {}", trackname, e)))?;
        self.track = Some(tracknr);
        log::debug!("selected track {} ({} capture bytes)", tracknr, self.dat.len());
        Ok(())
    }

    pub(crate) fn reset(&mut self) {
        self.dat_idx = 0;
        self.stream_idx = 0;
        self.index_pos = NO_INDEX;
        self.index_pending = false;
        self.flux = 0;
        self.clocked_zeros = 0;
        self.clock = self.clock_centre;
    }

    fn read_u16(&self, idx: usize) -> u32 {
        if idx + 2 > self.dat.len() {
            return 0;
        }
        ((self.dat[idx + 1] as u32) << 8) | self.dat[idx] as u32
    }

    fn read_u32(&self, idx: usize) -> u32 {
        (self.read_u16(idx + 2) << 16) | self.read_u16(idx)
    }

    /// Pull the next flux interval, in sampler ticks. Out-of-band records
    /// are consumed in passing; positional assertions in stream-read and
    /// stream-end records are fatal for the capture.
    pub(crate) fn next_flux(&mut self) -> Option<u32> {
        if self.error.is_some() {
            return None;
        }
        if self.stream_idx >= self.index_pos {
            log::debug!("index pulse at stream index {}", self.stream_idx);
            self.index_pos = NO_INDEX;
            self.index_pending = true;
        }

        let mut i = self.dat_idx;
        let mut val: u32 = 0;
        let mut done = false;

        while !done && i < self.dat.len() {
            let op = self.dat[i];
            match op {
                0x00..=0x07 | 0x0C => {
                    let sample_at = if op == 0x0C { i + 1 } else { i };
                    if sample_at + 2 > self.dat.len() {
                        i = self.dat.len();
                        break;
                    }
                    val += ((self.dat[sample_at] as u32) << 8) + self.dat[sample_at + 1] as u32;
                    let adv = sample_at + 2 - i;
                    i += adv;
                    self.stream_idx += adv as u32;
                    done = true;
                }
                0x08 => {
                    // nop1
                    i += 1;
                    self.stream_idx += 1;
                }
                0x09 => {
                    // nop2
                    i += 2;
                    self.stream_idx += 2;
                }
                0x0A => {
                    // nop3
                    i += 3;
                    self.stream_idx += 3;
                }
                0x0B => {
                    // overflow16
                    val += 0x10000;
                    i += 1;
                    self.stream_idx += 1;
                }
                0x0D => {
                    // Out-of-band record; does not advance the stream index.
                    if i + 4 > self.dat.len() {
                        i = self.dat.len();
                        break;
                    }
                    let subtype = self.dat[i + 1];
                    let sz = self.read_u16(i + 2) as usize;
                    i += 4;
                    let pos = self.read_u32(i);
                    match subtype {
                        0x01 | 0x03 => {
                            // stream read / stream end
                            if pos != self.stream_idx {
                                self.error = Some(DiskError::CorruptCapture(format!(
                                    "out-of-sync record: position {} at stream index {}",
                                    pos, self.stream_idx
                                )));
                                return None;
                            }
                        }
                        0x02 => {
                            // index: schedule a revolution restart
                            self.index_pos = pos;
                        }
                        0x04 => {
                            // info string; may carry the sampler clocks
                            let end = (i + sz).min(self.dat.len());
                            let payload = self.dat[i..end].to_vec();
                            self.parse_info(&payload);
                        }
                        _ => {}
                    }
                    i += sz;
                }
                _ => {
                    // 1-byte sample
                    val += op as u32;
                    i += 1;
                    self.stream_idx += 1;
                    done = true;
                }
            }
        }

        self.dat_idx = i;
        if !done {
            return None;
        }
        Some(val)
    }

    fn parse_info(&mut self, payload: &[u8]) {
        let text: String = payload
            .iter()
            .take_while(|&&b| b != 0)
            .filter(|b| b.is_ascii())
            .map(|&b| b as char)
            .collect();
        // ex: 'sck=24027428.5714285, ick=3003428.5714285625'
        let re = Regex::new(r"sck=(\d+\.?\d*), ick=(\d+\.?\d*)").unwrap();
        if let Some(caps) = re.captures(&text) {
            if let Some(sck) = caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok()) {
                log::debug!("capture sample clock {}", sck);
                self.ps_per_tick = ps_per_tick(sck);
            }
            if let Some(ick) = caps.get(2).and_then(|m| m.as_str().parse::<f64>().ok()) {
                log::trace!("capture index clock {}", ick);
            }
        }
    }

    /// Recover one bit-cell from the flux interval sequence.
    pub(crate) fn next_bit(&mut self) -> Option<SourceBit> {
        let mut latency: u64 = 0;

        while self.flux < self.clock / 2 {
            let flux = self.next_flux()?;
            self.flux += ((flux as u64 * self.ps_per_tick as u64) / 1000) as i32;
            self.clocked_zeros = 0;
        }
        let index = std::mem::take(&mut self.index_pending);

        latency += self.clock as u64;
        self.flux -= self.clock;

        if self.flux >= self.clock / 2 {
            self.clocked_zeros += 1;
            return Some(SourceBit {
                bit: false,
                latency,
                index,
            });
        }

        if self.pll_mode != PllMode::Fixed {
            // PLL: adjust clock frequency according to phase mismatch.
            if (1..=3).contains(&self.clocked_zeros) {
                // In sync: adjust base clock by 10% of phase mismatch.
                let diff = self.flux / (self.clocked_zeros as i32 + 1);
                self.clock += diff / 10;
            }
            else {
                // Out of sync: adjust base clock towards centre.
                self.clock += (self.clock_centre - self.clock) / 10;
            }
            self.clock = self.clock.clamp(clock_min(self.clock_centre), clock_max(self.clock_centre));
        }
        else {
            self.clock = self.clock_centre;
        }

        // Authentic mode does not snap the timing window to the transition.
        let new_flux = if self.pll_mode == PllMode::Authentic {
            self.flux / 2
        }
        else {
            0
        };
        latency += (self.flux - new_flux) as u64;
        self.flux = new_flux;

        Some(SourceBit {
            bit: true,
            latency,
            index,
        })
    }
}
