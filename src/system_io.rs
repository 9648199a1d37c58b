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

//! Error Wrapping File System I/O Helpers
//!
//! Thin wrappers around the handful of file operations the driver performs outside of the
//! ioctl interface, with trace logging and conversion to [`M2sdrError`] that keeps the path in
//! the error message.
//!
//! Includes: device node open, file read and readiness polling.
//!
//! # Examples
//!
//! ```rust,no_run
//! # use m2sdr::system_io::{fs_open_device, fs_read};
//! # use std::path::Path;
//!
//! # fn example() -> Result<(), m2sdr::error::M2sdrError> {
//! let device = fs_open_device(Path::new("/dev/m2sdr0"))?;
//! let config = fs_read(Path::new("/etc/m2sdr/config.toml"))?;
//! # Ok(())
//! # }
//! ```

use crate::error::M2sdrError;
use log::trace;
use std::fs::{File, OpenOptions};
use std::io::Read;
use std::os::fd::AsRawFd;
use std::path::Path;
use std::time::Duration;

/// Read the contents of a file to a String.
///
/// # Returns: `Result<String, M2sdrError>`
/// * `Ok(String)` - The complete contents of the file
/// * `Err(M2sdrError::IORead)` - If the file cannot be read (doesn't exist, permissions, etc.)
pub fn fs_read(file_path: &Path) -> Result<String, M2sdrError> {
    trace!("Attempting to read from {file_path:?}");
    let mut buf: String = String::new();
    let result = OpenOptions::new()
        .read(true)
        .open(file_path)
        .and_then(|mut f| f.read_to_string(&mut buf));

    match result {
        Ok(_) => {
            trace!("Reading done");
            Ok(buf)
        }
        Err(e) => Err(M2sdrError::IORead {
            file: file_path.into(),
            e,
        }),
    }
}

/// Open a LitePCIe character device for read/write access.
///
/// The returned [`File`] is the device handle every ioctl and mmap goes through; it is closed
/// when dropped.
///
/// # Returns: `Result<File, M2sdrError>`
/// * `Ok(File)` - The opened device node
/// * `Err(M2sdrError::DeviceOpen)` - The node does not exist or cannot be opened read/write
pub fn fs_open_device(device_path: &Path) -> Result<File, M2sdrError> {
    trace!("Attempting to open device node {device_path:?}");
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(device_path)
        .map_err(|e| M2sdrError::DeviceOpen {
            file: device_path.into(),
            e,
        })
}

/// Wait until `file` reports readiness for `events` (`libc::POLLIN` / `libc::POLLOUT`).
///
/// # Returns: `Result<bool, M2sdrError>`
/// * `Ok(true)` - The descriptor became ready before the timeout
/// * `Ok(false)` - The timeout expired
/// * `Err(M2sdrError::Ioctl)` - `poll(2)` itself failed
pub fn fs_poll(file: &File, events: libc::c_short, timeout: Duration) -> Result<bool, M2sdrError> {
    let mut pfd = libc::pollfd {
        fd: file.as_raw_fd(),
        events,
        revents: 0,
    };
    let timeout_ms = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);
    trace!("Polling fd {} for {events:#x} with {timeout_ms}ms timeout", pfd.fd);
    // SAFETY: `pfd` is a valid pollfd for the duration of the call and nfds is 1.
    let ret = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    match ret {
        r if r < 0 => Err(M2sdrError::Ioctl {
            request: "poll",
            e: std::io::Error::last_os_error(),
        }),
        0 => Ok(false),
        _ => Ok(pfd.revents & events != 0),
    }
}
