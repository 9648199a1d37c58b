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

//! Behavioural model of the AD9361 chip-control library.
//!
//! Only the chip identification goes over SPI; every tunable is kept in memory and checked
//! against the limits of the real part, failing with `-EINVAL` like the library does.

use crate::error::M2sdrError;
use crate::rfic::{RfTransceiver, SpiTransport};
use crate::types::{Direction, GainControlMode};
use log::{debug, info};

const EINVAL: i32 = -22;
const ENODEV: i32 = -19;

pub const REG_PRODUCT_ID: u16 = 0x037;
pub const PRODUCT_ID_AD9361: u8 = 0x0a;

const RX_LO_RANGE: (u64, u64) = (70_000_000, 6_000_000_000);
const TX_LO_RANGE: (u64, u64) = (47_000_000, 6_000_000_000);
const MIN_SAMPLING_FREQ: u32 = 25_000_000 / 96;
const MAX_SAMPLING_FREQ: u32 = 61_440_000;
const MAX_OVERSAMPLED_FREQ: u32 = 122_880_000;
const RF_BANDWIDTH_RANGE: (u32, u32) = (200_000, 56_000_000);
const MAX_TX_ATTENUATION: u32 = 89_750;
const MAX_RX_GAIN: i32 = 73;

#[derive(Debug, Clone, Copy)]
struct PathState {
    lo: u64,
    sampling: u32,
    bandwidth: u32,
}

#[derive(Debug)]
pub struct SimulatedTransceiver {
    oversampling: bool,
    initialized: bool,
    rx: PathState,
    tx: PathState,
    tx_attenuation: [u32; 2],
    rx_gain: [i32; 2],
    gain_mode: [GainControlMode; 2],
    temperature: i32,
}

impl SimulatedTransceiver {
    /// `oversampling` raises the sampling frequency limit to 122.88 MHz.
    pub fn new(oversampling: bool) -> SimulatedTransceiver {
        let path = PathState {
            lo: 2_400_000_000,
            sampling: 30_720_000,
            bandwidth: 18_000_000,
        };
        SimulatedTransceiver {
            oversampling,
            initialized: false,
            rx: path,
            tx: path,
            tx_attenuation: [10_000; 2],
            rx_gain: [0; 2],
            gain_mode: [GainControlMode::Manual; 2],
            temperature: 35_000,
        }
    }

    /// Die temperature reported by [`RfTransceiver::temperature`], in m°C.
    pub fn set_temperature(&mut self, millicelsius: i32) {
        self.temperature = millicelsius;
    }

    fn path(&mut self, direction: Direction) -> &mut PathState {
        match direction {
            Direction::Rx => &mut self.rx,
            Direction::Tx => &mut self.tx,
        }
    }

    fn ensure_initialized(&self, op: &'static str) -> Result<(), M2sdrError> {
        if !self.initialized {
            return Err(M2sdrError::Rfic { op, code: ENODEV });
        }
        Ok(())
    }
}

impl Default for SimulatedTransceiver {
    fn default() -> Self {
        SimulatedTransceiver::new(false)
    }
}

fn check<T: PartialOrd>(op: &'static str, value: T, min: T, max: T) -> Result<(), M2sdrError> {
    if value < min || value > max {
        return Err(M2sdrError::Rfic { op, code: EINVAL });
    }
    Ok(())
}

impl RfTransceiver for SimulatedTransceiver {
    fn initialize(&mut self, spi: &mut dyn SpiTransport, full: bool) -> Result<(), M2sdrError> {
        let product = spi.read_reg(REG_PRODUCT_ID)?;
        if product & 0xf8 != PRODUCT_ID_AD9361 & 0xf8 {
            return Err(M2sdrError::Rfic {
                op: "ad9361_init",
                code: ENODEV,
            });
        }
        info!(
            "AD9361 rev {} found, {} initialization",
            product & 0x07,
            if full { "full" } else { "handle-only" }
        );
        self.initialized = true;
        Ok(())
    }

    fn lo_frequency(
        &mut self,
        _spi: &mut dyn SpiTransport,
        direction: Direction,
    ) -> Result<u64, M2sdrError> {
        self.ensure_initialized("ad9361_get_lo_freq")?;
        Ok(self.path(direction).lo)
    }

    fn set_lo_frequency(
        &mut self,
        _spi: &mut dyn SpiTransport,
        direction: Direction,
        hz: u64,
    ) -> Result<(), M2sdrError> {
        self.ensure_initialized("ad9361_set_lo_freq")?;
        let (min, max) = match direction {
            Direction::Rx => RX_LO_RANGE,
            Direction::Tx => TX_LO_RANGE,
        };
        check("ad9361_set_lo_freq", hz, min, max)?;
        debug!("{direction} LO tuned to {hz} Hz");
        self.path(direction).lo = hz;
        Ok(())
    }

    fn sampling_frequency(
        &mut self,
        _spi: &mut dyn SpiTransport,
        direction: Direction,
    ) -> Result<u32, M2sdrError> {
        self.ensure_initialized("ad9361_get_sampling_freq")?;
        Ok(self.path(direction).sampling)
    }

    fn set_sampling_frequency(
        &mut self,
        _spi: &mut dyn SpiTransport,
        _direction: Direction,
        hz: u32,
    ) -> Result<(), M2sdrError> {
        self.ensure_initialized("ad9361_set_sampling_freq")?;
        let max = if self.oversampling {
            MAX_OVERSAMPLED_FREQ
        } else {
            MAX_SAMPLING_FREQ
        };
        check("ad9361_set_sampling_freq", hz, MIN_SAMPLING_FREQ, max)?;
        // RX and TX share the baseband PLL.
        self.rx.sampling = hz;
        self.tx.sampling = hz;
        Ok(())
    }

    fn rf_bandwidth(
        &mut self,
        _spi: &mut dyn SpiTransport,
        direction: Direction,
    ) -> Result<u32, M2sdrError> {
        self.ensure_initialized("ad9361_get_rf_bandwidth")?;
        Ok(self.path(direction).bandwidth)
    }

    fn set_rf_bandwidth(
        &mut self,
        _spi: &mut dyn SpiTransport,
        direction: Direction,
        hz: u32,
    ) -> Result<(), M2sdrError> {
        self.ensure_initialized("ad9361_set_rf_bandwidth")?;
        // The library silently clamps to what the analog filters can do.
        self.path(direction).bandwidth = hz.clamp(RF_BANDWIDTH_RANGE.0, RF_BANDWIDTH_RANGE.1);
        Ok(())
    }

    fn tx_attenuation(
        &mut self,
        _spi: &mut dyn SpiTransport,
        channel: usize,
    ) -> Result<u32, M2sdrError> {
        self.ensure_initialized("ad9361_get_tx_attenuation")?;
        Ok(self.tx_attenuation[channel])
    }

    fn set_tx_attenuation(
        &mut self,
        _spi: &mut dyn SpiTransport,
        channel: usize,
        mdb: u32,
    ) -> Result<(), M2sdrError> {
        self.ensure_initialized("ad9361_set_tx_attenuation")?;
        check("ad9361_set_tx_attenuation", mdb, 0, MAX_TX_ATTENUATION)?;
        self.tx_attenuation[channel] = mdb;
        Ok(())
    }

    fn rx_rf_gain(
        &mut self,
        _spi: &mut dyn SpiTransport,
        channel: usize,
    ) -> Result<i32, M2sdrError> {
        self.ensure_initialized("ad9361_get_rx_rf_gain")?;
        Ok(self.rx_gain[channel])
    }

    fn set_rx_rf_gain(
        &mut self,
        _spi: &mut dyn SpiTransport,
        channel: usize,
        db: i32,
    ) -> Result<(), M2sdrError> {
        self.ensure_initialized("ad9361_set_rx_rf_gain")?;
        check("ad9361_set_rx_rf_gain", db, 0, MAX_RX_GAIN)?;
        self.rx_gain[channel] = db;
        Ok(())
    }

    fn rx_gain_control_mode(
        &mut self,
        _spi: &mut dyn SpiTransport,
        channel: usize,
    ) -> Result<GainControlMode, M2sdrError> {
        self.ensure_initialized("ad9361_get_rx_gain_control_mode")?;
        Ok(self.gain_mode[channel])
    }

    fn set_rx_gain_control_mode(
        &mut self,
        _spi: &mut dyn SpiTransport,
        channel: usize,
        mode: GainControlMode,
    ) -> Result<(), M2sdrError> {
        self.ensure_initialized("ad9361_set_rx_gain_control_mode")?;
        self.gain_mode[channel] = mode;
        Ok(())
    }

    fn temperature(&mut self, _spi: &mut dyn SpiTransport) -> Result<i32, M2sdrError> {
        self.ensure_initialized("ad9361_get_temp")?;
        Ok(self.temperature)
    }
}
