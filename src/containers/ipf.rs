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

//! The IPF suffix.
//!
//! The suffix is recognised so routing matches the rest of the family, but
//! native CAPS/SPS decoding is not part of this library; the driver reports
//! the image as unsupported.

use std::io::{Read, Seek, SeekFrom};

use crate::{diskimage::Disk, ContainerFormat, DiskError};

pub(crate) fn open(disk: &mut Disk) -> Result<ContainerFormat, DiskError> {
    let mut sig = [0u8; 4];
    disk.file.seek(SeekFrom::Start(0))?;
    if disk.file.read_exact(&mut sig).is_ok() && &sig == b"CAPS" {
        log::warn!("IPF images require the CAPS library and are not supported");
    }
    else {
        log::warn!("not an IPF image (missing CAPS signature)");
    }
    Err(DiskError::Unsupported)
}
