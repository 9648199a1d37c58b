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

//! AD9361 RF transceiver control.
//!
//! The calibration-heavy chip driver lives outside this crate and is reached through
//! [`RfTransceiver`]. The chip driver talks to the silicon over SPI; instead of handing it a
//! process-wide file descriptor, every call receives the [`SpiTransport`] of the board it acts
//! on, so several boards can be driven from one process.

pub mod simulated;
pub mod spi;

pub use simulated::SimulatedTransceiver;
pub use spi::CsrSpi;

use crate::error::M2sdrError;
use crate::types::{Direction, GainControlMode};

/// Byte-level SPI access to the transceiver.
pub trait SpiTransport {
    /// Shift out `tx` then clock in `rx.len()` bytes.
    ///
    /// Only the two transfer shapes used by the AD9361 register interface are supported:
    /// * a 2 byte instruction followed by a 1 byte read,
    /// * a 2 byte instruction plus 1 data byte with nothing to read.
    ///
    /// # Returns: `Result<(), M2sdrError>`
    /// * `Ok(())` - Transfer completed and `rx` is filled
    /// * `Err(M2sdrError::Spi)` - Unsupported transfer shape or the SPI master did not complete
    fn spi_write_then_read(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), M2sdrError>;

    fn read_reg(&mut self, addr: u16) -> Result<u8, M2sdrError> {
        let [hi, lo] = (addr & 0x3ff).to_be_bytes();
        let mut rx = [0u8; 1];
        self.spi_write_then_read(&[hi, lo], &mut rx)?;
        Ok(rx[0])
    }

    fn write_reg(&mut self, addr: u16, value: u8) -> Result<(), M2sdrError> {
        let [hi, lo] = (0x8000 | (addr & 0x3ff)).to_be_bytes();
        self.spi_write_then_read(&[hi, lo, value], &mut [])
    }
}

/// Chip-control operations the driver needs from the transceiver library.
///
/// Channel arguments are already validated by the caller. Frequencies and rates are in hertz,
/// attenuation in millidecibels, gain in decibels and temperature in millidegrees Celsius.
pub trait RfTransceiver: Send {
    /// Bring up the chip. With `full` false the chip is assumed to be configured already and
    /// only the handle state is rebuilt.
    fn initialize(&mut self, spi: &mut dyn SpiTransport, full: bool) -> Result<(), M2sdrError>;

    fn lo_frequency(
        &mut self,
        spi: &mut dyn SpiTransport,
        direction: Direction,
    ) -> Result<u64, M2sdrError>;
    fn set_lo_frequency(
        &mut self,
        spi: &mut dyn SpiTransport,
        direction: Direction,
        hz: u64,
    ) -> Result<(), M2sdrError>;

    fn sampling_frequency(
        &mut self,
        spi: &mut dyn SpiTransport,
        direction: Direction,
    ) -> Result<u32, M2sdrError>;
    fn set_sampling_frequency(
        &mut self,
        spi: &mut dyn SpiTransport,
        direction: Direction,
        hz: u32,
    ) -> Result<(), M2sdrError>;

    fn rf_bandwidth(
        &mut self,
        spi: &mut dyn SpiTransport,
        direction: Direction,
    ) -> Result<u32, M2sdrError>;
    fn set_rf_bandwidth(
        &mut self,
        spi: &mut dyn SpiTransport,
        direction: Direction,
        hz: u32,
    ) -> Result<(), M2sdrError>;

    fn tx_attenuation(
        &mut self,
        spi: &mut dyn SpiTransport,
        channel: usize,
    ) -> Result<u32, M2sdrError>;
    fn set_tx_attenuation(
        &mut self,
        spi: &mut dyn SpiTransport,
        channel: usize,
        mdb: u32,
    ) -> Result<(), M2sdrError>;

    fn rx_rf_gain(&mut self, spi: &mut dyn SpiTransport, channel: usize) -> Result<i32, M2sdrError>;
    fn set_rx_rf_gain(
        &mut self,
        spi: &mut dyn SpiTransport,
        channel: usize,
        db: i32,
    ) -> Result<(), M2sdrError>;

    fn rx_gain_control_mode(
        &mut self,
        spi: &mut dyn SpiTransport,
        channel: usize,
    ) -> Result<GainControlMode, M2sdrError>;
    fn set_rx_gain_control_mode(
        &mut self,
        spi: &mut dyn SpiTransport,
        channel: usize,
        mode: GainControlMode,
    ) -> Result<(), M2sdrError>;

    fn temperature(&mut self, spi: &mut dyn SpiTransport) -> Result<i32, M2sdrError>;
}

/// Register writes that let the AD9361 run at 122.88 MS/s.
///
/// Overclocks the converters and widens the analog filters; written after every sample rate
/// change when oversampling is enabled.
pub const OVERSAMPLING_SEQUENCE: &[(u16, u8)] = &[
    // general oversampling control
    (0x003, 0x54),
    // TX enable, filter control and baseband filter
    (0x002, 0xc0),
    (0x0c2, 0x9f),
    (0x0c3, 0x9f),
    (0x0c4, 0x9f),
    (0x0c5, 0x9f),
    (0x0c6, 0x9f),
    (0x0c7, 0x00),
    (0x0c8, 0x00),
    (0x0c9, 0x00),
    // RX path
    (0x1e0, 0xbf),
    (0x1e4, 0xff),
    (0x1f2, 0xff),
    // Miller and baseband filter capacitors
    (0x1e7, 0x00),
    (0x1e8, 0x00),
    (0x1e9, 0x00),
    (0x1ea, 0x00),
    (0x1eb, 0x00),
    (0x1ec, 0x00),
    (0x1ed, 0x00),
    (0x1ee, 0x00),
    (0x1ef, 0x00),
    (0x1e0, 0xbf),
    // BIST and data port test config
    (0x3f6, 0x03),
];

pub fn write_oversampling_sequence(spi: &mut dyn SpiTransport) -> Result<(), M2sdrError> {
    for &(addr, value) in OVERSAMPLING_SEQUENCE {
        spi.write_reg(addr, value)?;
    }
    Ok(())
}
