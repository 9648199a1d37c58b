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

//! Error type shared by every layer of the driver.
//!
//! Each variant's message starts with `M2sdrError::<Variant>:` so that callers which only see
//! the rendered string (logs, the CLI) can still tell the failure class apart.

use crate::types::Direction;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum M2sdrError {
    #[error("M2sdrError::Argument: {0}")]
    Argument(String),
    #[error("M2sdrError::DeviceOpen: Failed to open device node {file:?}: {e}")]
    DeviceOpen { file: PathBuf, e: std::io::Error },
    #[error("M2sdrError::IORead: An IO error occurred when reading from {file:?}: {e}")]
    IORead { file: PathBuf, e: std::io::Error },
    #[error("M2sdrError::Ioctl: {request} failed: {e}")]
    Ioctl {
        request: &'static str,
        e: std::io::Error,
    },
    #[error("M2sdrError::Mmap: Failed to map the {direction} DMA region: {e}")]
    Mmap {
        direction: Direction,
        e: std::io::Error,
    },
    #[error("M2sdrError::Rfic: {op} returned {code}")]
    Rfic { op: &'static str, code: i32 },
    #[error("M2sdrError::Spi: {0}")]
    Spi(String),
    #[error("M2sdrError::Stream: {0}")]
    Stream(String),
    #[error("M2sdrError::Timeout: No {direction} DMA buffer became ready within {timeout:?}")]
    Timeout {
        direction: Direction,
        timeout: Duration,
    },
    #[error("M2sdrError::Overflow: Receiver fell behind, dropped {dropped} DMA buffers")]
    Overflow { dropped: i64 },
    #[error("M2sdrError::Underflow: Transmit DMA ran dry")]
    Underflow,
    #[error("M2sdrError::TomlDe: Failed to parse config {toml_string:?}: {e}")]
    TomlDe {
        toml_string: String,
        e: toml::de::Error,
    },
    #[error("M2sdrError::Internal: An Internal error occurred: {0}")]
    Internal(String),
}
