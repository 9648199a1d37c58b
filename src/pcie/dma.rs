// This file is part of m2sdr, a userspace driver for the LiteX M2SDR PCIe software-defined radio.
//
// Copyright 2025 Canonical Ltd.
//
// SPDX-License-Identifier: GPL-3.0-only
//
// m2sdr is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License version 3, as published by the Free Software Foundation.
//
// m2sdr is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranties of MERCHANTABILITY, SATISFACTORY QUALITY, or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with this program.  If not, see http://www.gnu.org/licenses/.

use crate::error::M2sdrError;
use crate::pcie::DmaRegion;
use crate::types::Direction;
use log::{trace, warn};
use std::fs::File;
use std::os::fd::AsRawFd;
use std::ptr::NonNull;

/// A kernel DMA ring mapped with `mmap(2)`. Unmapped on drop.
#[derive(Debug)]
pub struct MappedRegion {
    ptr: NonNull<u8>,
    len: usize,
    direction: Direction,
}

// SAFETY: the mapping is process-wide memory owned exclusively by this value.
unsafe impl Send for MappedRegion {}

impl MappedRegion {
    /// Map `len` bytes of `file` at `offset`, shared and read/write.
    pub(crate) fn map(
        file: &File,
        direction: Direction,
        offset: u64,
        len: usize,
    ) -> Result<MappedRegion, M2sdrError> {
        if len == 0 {
            return Err(M2sdrError::Argument(format!(
                "Refusing to map an empty {direction} DMA region"
            )));
        }
        let offset = libc::off_t::try_from(offset).map_err(|_| {
            M2sdrError::Argument(format!("{direction} DMA offset {offset:#x} is out of range"))
        })?;
        trace!("Mapping {len} bytes of {direction} DMA at offset {offset:#x}");
        // SAFETY: a fresh shared mapping of the device fd; the kernel validates offset and length.
        let addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                offset,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(M2sdrError::Mmap {
                direction,
                e: std::io::Error::last_os_error(),
            });
        }
        let ptr = NonNull::new(addr.cast::<u8>()).ok_or_else(|| {
            M2sdrError::Internal(format!("mmap returned a null {direction} DMA region"))
        })?;
        Ok(MappedRegion {
            ptr,
            len,
            direction,
        })
    }

    fn check_range(&self, offset: usize, len: usize) {
        assert!(
            offset.checked_add(len).is_some_and(|end| end <= self.len),
            "{} DMA access {offset}+{len} outside of {} byte region",
            self.direction,
            self.len
        );
    }
}

impl DmaRegion for MappedRegion {
    fn len(&self) -> usize {
        self.len
    }

    fn with_slice<T>(&self, offset: usize, len: usize, f: impl FnOnce(&[u8]) -> T) -> T {
        self.check_range(offset, len);
        // SAFETY: range checked above, the mapping lives as long as `self`.
        let slice = unsafe { std::slice::from_raw_parts(self.ptr.as_ptr().add(offset), len) };
        f(slice)
    }

    fn with_slice_mut<T>(
        &mut self,
        offset: usize,
        len: usize,
        f: impl FnOnce(&mut [u8]) -> T,
    ) -> T {
        self.check_range(offset, len);
        // SAFETY: range checked above, `&mut self` guarantees exclusive access from this process.
        let slice =
            unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr().add(offset), len) };
        f(slice)
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        trace!("Unmapping {} bytes of {} DMA", self.len, self.direction);
        // SAFETY: `ptr`/`len` are exactly what mmap returned and nothing else unmaps them.
        let ret = unsafe { libc::munmap(self.ptr.as_ptr().cast(), self.len) };
        if ret != 0 {
            warn!(
                "munmap of {} DMA region failed: {}",
                self.direction,
                std::io::Error::last_os_error()
            );
        }
    }
}
