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

//! PCIe kernel-interface abstraction.
//!
//! The board is reached through the LitePCIe character device: 32-bit CSR access, a pair of
//! DMA engines with kernel-allocated ring buffers mapped into userspace, and a handful of
//! control ioctls. [`PcieLink`] captures that contract so the rest of the driver does not care
//! whether it talks to [`LitePcie`] or to the in-memory [`SimulatedPcie`].
//!
//! # Direction naming
//!
//! LitePCIe names DMA engines from the FPGA's point of view: the *writer* moves samples from
//! the FPGA into host memory (RX) and the *reader* moves samples from host memory to the FPGA
//! (TX). This module only speaks in terms of [`Direction`].

pub mod csr;
pub mod dma;
pub mod litepcie;
pub mod simulated;

pub use dma::MappedRegion;
pub use litepcie::{LitePcie, LitePcieWaiter};
pub use simulated::{SimulatedPcie, SimulatedPcieProbe, SimulatedWaiter};

use crate::error::M2sdrError;
use crate::types::Direction;
use std::time::Duration;

/// Geometry of the kernel DMA rings, as reported once by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaInfo {
    pub tx_buf_offset: u64,
    pub tx_buf_size: u64,
    pub tx_buf_count: u64,
    pub rx_buf_offset: u64,
    pub rx_buf_size: u64,
    pub rx_buf_count: u64,
}

impl DmaInfo {
    /// `mmap` offset of the ring for `direction`.
    pub fn offset(&self, direction: Direction) -> u64 {
        match direction {
            Direction::Rx => self.rx_buf_offset,
            Direction::Tx => self.tx_buf_offset,
        }
    }

    pub fn buf_size(&self, direction: Direction) -> usize {
        match direction {
            Direction::Rx => self.rx_buf_size as usize,
            Direction::Tx => self.tx_buf_size as usize,
        }
    }

    pub fn buf_count(&self, direction: Direction) -> usize {
        match direction {
            Direction::Rx => self.rx_buf_count as usize,
            Direction::Tx => self.tx_buf_count as usize,
        }
    }

    /// Total size in bytes of the ring for `direction`.
    pub fn region_len(&self, direction: Direction) -> usize {
        self.buf_size(direction) * self.buf_count(direction)
    }
}

/// Buffer counters of a DMA engine.
///
/// Both counters only ever increase; a buffer index is the count modulo the ring length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DmaCounts {
    /// Buffers completed by the engine.
    pub hw_count: i64,
    /// Buffers the host has published back to the kernel.
    pub sw_count: i64,
}

/// A DMA ring mapped into the process.
///
/// Dropping the region unmaps it.
pub trait DmaRegion: Send {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `f` on `len` bytes starting at `offset`.
    ///
    /// Panics if the range is outside the region; callers derive ranges from [`DmaInfo`].
    fn with_slice<T>(&self, offset: usize, len: usize, f: impl FnOnce(&[u8]) -> T) -> T;

    fn with_slice_mut<T>(
        &mut self,
        offset: usize,
        len: usize,
        f: impl FnOnce(&mut [u8]) -> T,
    ) -> T;
}

/// Access to a LitePCIe board.
pub trait PcieLink: Send {
    type Region: DmaRegion;
    type Waiter: DmaWait;

    /// Read a 32-bit CSR.
    fn readl(&mut self, addr: u32) -> Result<u32, M2sdrError>;

    /// Write a 32-bit CSR.
    fn writel(&mut self, addr: u32, value: u32) -> Result<(), M2sdrError>;

    /// Query the DMA ring geometry.
    fn dma_info(&mut self) -> Result<DmaInfo, M2sdrError>;

    /// Take exclusive ownership of the DMA engine for `direction`.
    ///
    /// Fails if another process holds it.
    fn request_dma(&mut self, direction: Direction) -> Result<(), M2sdrError>;

    fn release_dma(&mut self, direction: Direction) -> Result<(), M2sdrError>;

    /// Enable or disable the DMA engine and return its counters.
    ///
    /// LitePCIe has no separate "read counters" call; polling the counters is done by
    /// re-asserting the current enable state.
    fn dma_engine(
        &mut self,
        direction: Direction,
        enable: bool,
    ) -> Result<DmaCounts, M2sdrError>;

    /// Publish the host position in the ring.
    fn update_sw_count(&mut self, direction: Direction, sw_count: i64) -> Result<(), M2sdrError>;

    /// Route the TX DMA stream straight back into the RX DMA stream inside the FPGA.
    fn set_dma_loopback(&mut self, enable: bool) -> Result<(), M2sdrError>;

    /// Map the ring for `direction` described by `info`.
    fn map_dma(
        &mut self,
        direction: Direction,
        info: &DmaInfo,
    ) -> Result<Self::Region, M2sdrError>;

    /// A handle that waits for DMA progress without borrowing the link, so the caller can
    /// give up its lock on the link while it waits.
    fn waiter(&self) -> Self::Waiter;
}

/// Waits for DMA progress.
///
/// Obtained from [`PcieLink::waiter`] and used without holding the link, so register access
/// from other threads keeps going while a stream sleeps.
pub trait DmaWait: Send {
    /// Block until the engine for `direction` has made progress or `timeout` expires.
    ///
    /// # Returns: `Result<bool, M2sdrError>`
    /// * `Ok(true)` - The engine signalled progress
    /// * `Ok(false)` - The timeout expired
    fn wait_dma(&self, direction: Direction, timeout: Duration) -> Result<bool, M2sdrError>;
}
