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

//! Radio settings: antennas, gains, frequencies, sample rates, bandwidths and clocking.
//!
//! Every setter records the value in a [`SettingsCache`] and forwards it to the transceiver
//! while holding the device lock. Values the transceiver can report (gain, RF frequency,
//! bandwidth, sample rate) are read back live; the others come from the cache.

use crate::device::{M2sdrDevice, NUM_CHANNELS, check_channel};
use crate::error::M2sdrError;
use crate::pcie::PcieLink;
use crate::rfic::{RfTransceiver, write_oversampling_sequence};
use crate::types::{ClockSource, Direction, GainControlMode, Range, StreamFormat};
use log::{debug, warn};
use num_complex::Complex64;
use std::collections::HashMap;

pub const RX_ANTENNA: &str = "A_BALANCED";
pub const TX_ANTENNA: &str = "A";
pub const GAIN_ELEMENT: &str = "PGA";

/// Tunable elements: the LO and a cache-only baseband offset.
pub const FREQUENCY_RF: &str = "RF";
pub const FREQUENCY_BB: &str = "BB";

pub const DEFAULT_SAMPLE_RATE: f64 = 30.72e6;
pub const DEFAULT_BANDWIDTH: f64 = 30.72e6;
pub const DEFAULT_BB_FREQUENCY: f64 = 1e6;

const MIN_SAMPLE_RATE: f64 = 25e6 / 96.0;
const MAX_SAMPLE_RATE: f64 = 61.44e6;
const MAX_OVERSAMPLED_RATE: f64 = 122.88e6;

/// Values last requested for one channel. `None` means never set.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSettings {
    pub antenna: Option<String>,
    pub frequencies: HashMap<String, f64>,
    pub gain: Option<f64>,
    pub bandwidth: Option<f64>,
    pub sample_rate: Option<f64>,
    pub iq_balance: Complex64,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        ChannelSettings {
            antenna: None,
            frequencies: HashMap::new(),
            gain: None,
            bandwidth: None,
            sample_rate: None,
            iq_balance: Complex64::new(1.0, 0.0),
        }
    }
}

/// Last applied value of every setting, per direction and channel.
#[derive(Debug)]
pub(crate) struct SettingsCache {
    channels: HashMap<(Direction, usize), ChannelSettings>,
    pub(crate) clock_source: ClockSource,
}

impl Default for SettingsCache {
    fn default() -> Self {
        let mut channels = HashMap::new();
        for direction in [Direction::Rx, Direction::Tx] {
            for channel in 0..NUM_CHANNELS {
                channels.insert((direction, channel), ChannelSettings::default());
            }
        }
        SettingsCache {
            channels,
            clock_source: ClockSource::Internal,
        }
    }
}

impl SettingsCache {
    pub(crate) fn channel(&mut self, direction: Direction, channel: usize) -> &mut ChannelSettings {
        self.channels.entry((direction, channel)).or_default()
    }
}

pub fn list_antennas(direction: Direction) -> Vec<String> {
    match direction {
        Direction::Rx => vec![RX_ANTENNA.to_string()],
        Direction::Tx => vec![TX_ANTENNA.to_string()],
    }
}

fn check_frequency_name(name: &str) -> Result<(), M2sdrError> {
    if name != FREQUENCY_RF && name != FREQUENCY_BB {
        return Err(M2sdrError::Argument(format!(
            "Unknown frequency element '{name}', expected {FREQUENCY_RF} or {FREQUENCY_BB}"
        )));
    }
    Ok(())
}

fn check_gain_name(name: &str) -> Result<(), M2sdrError> {
    if name != GAIN_ELEMENT {
        return Err(M2sdrError::Argument(format!(
            "Unknown gain element '{name}', expected {GAIN_ELEMENT}"
        )));
    }
    Ok(())
}

impl<P: PcieLink, R: RfTransceiver> M2sdrDevice<P, R> {
    /// Defaults applied after a full initialization so every getter has something to return.
    pub(crate) fn apply_defaults(&self) -> Result<(), M2sdrError> {
        for channel in 0..NUM_CHANNELS {
            self.set_sample_rate(Direction::Tx, channel, DEFAULT_SAMPLE_RATE)?;
            self.set_sample_rate(Direction::Rx, channel, DEFAULT_SAMPLE_RATE)?;
        }
        self.set_clock_source(ClockSource::Internal.as_str())?;
        for channel in 0..NUM_CHANNELS {
            self.set_antenna(Direction::Rx, channel, RX_ANTENNA)?;
            self.set_antenna(Direction::Tx, channel, TX_ANTENNA)?;
            self.set_named_frequency(Direction::Rx, channel, FREQUENCY_BB, DEFAULT_BB_FREQUENCY)?;
            self.set_named_frequency(Direction::Tx, channel, FREQUENCY_BB, DEFAULT_BB_FREQUENCY)?;
            self.set_bandwidth(Direction::Rx, channel, DEFAULT_BANDWIDTH)?;
            self.set_bandwidth(Direction::Tx, channel, DEFAULT_BANDWIDTH)?;
            self.set_gain(Direction::Rx, channel, 0.0)?;
            self.set_iq_balance(Direction::Rx, channel, Complex64::new(1.0, 0.0))?;
            self.set_iq_balance(Direction::Tx, channel, Complex64::new(1.0, 0.0))?;
        }
        Ok(())
    }

    /// Snapshot of the cached settings of one channel, as requested rather than as applied.
    pub fn cached_settings(
        &self,
        direction: Direction,
        channel: usize,
    ) -> Result<ChannelSettings, M2sdrError> {
        check_channel(channel)?;
        Ok(self.lock()?.settings.channel(direction, channel).clone())
    }

    // Antennas

    pub fn list_antennas(
        &self,
        direction: Direction,
        channel: usize,
    ) -> Result<Vec<String>, M2sdrError> {
        check_channel(channel)?;
        Ok(list_antennas(direction))
    }

    pub fn set_antenna(
        &self,
        direction: Direction,
        channel: usize,
        name: &str,
    ) -> Result<(), M2sdrError> {
        check_channel(channel)?;
        if !list_antennas(direction).iter().any(|a| a == name) {
            return Err(M2sdrError::Argument(format!(
                "Unknown {direction} antenna '{name}'"
            )));
        }
        debug!("set_antenna({direction}, ch{channel}, {name})");
        self.lock()?.settings.channel(direction, channel).antenna = Some(name.to_string());
        Ok(())
    }

    pub fn get_antenna(&self, direction: Direction, channel: usize) -> Result<String, M2sdrError> {
        check_channel(channel)?;
        self.lock()?
            .settings
            .channel(direction, channel)
            .antenna
            .clone()
            .ok_or_else(|| {
                M2sdrError::Argument(format!("No antenna selected for {direction} ch{channel}"))
            })
    }

    // Frontend corrections

    pub fn has_dc_offset_mode(&self, _direction: Direction, _channel: usize) -> bool {
        false
    }

    pub fn has_iq_balance(&self, _direction: Direction, _channel: usize) -> bool {
        true
    }

    /// Cached only; the correction is not applied by the transceiver.
    pub fn set_iq_balance(
        &self,
        direction: Direction,
        channel: usize,
        balance: Complex64,
    ) -> Result<(), M2sdrError> {
        check_channel(channel)?;
        debug!("set_iq_balance({direction}, ch{channel}, {balance})");
        self.lock()?.settings.channel(direction, channel).iq_balance = balance;
        Ok(())
    }

    pub fn get_iq_balance(
        &self,
        direction: Direction,
        channel: usize,
    ) -> Result<Complex64, M2sdrError> {
        check_channel(channel)?;
        Ok(self.lock()?.settings.channel(direction, channel).iq_balance)
    }

    // Gain

    pub fn list_gains(&self, _direction: Direction, _channel: usize) -> Vec<String> {
        vec![GAIN_ELEMENT.to_string()]
    }

    /// Only the receiver has an automatic gain control loop.
    pub fn has_gain_mode(&self, direction: Direction, _channel: usize) -> bool {
        direction == Direction::Rx
    }

    pub fn set_gain_mode(
        &self,
        direction: Direction,
        channel: usize,
        automatic: bool,
    ) -> Result<(), M2sdrError> {
        check_channel(channel)?;
        if direction == Direction::Tx {
            return Ok(());
        }
        let mode = if automatic {
            GainControlMode::SlowAttack
        } else {
            GainControlMode::Manual
        };
        debug!("set_gain_mode({direction}, ch{channel}, {mode:?})");
        self.lock()?
            .with_rfic(|rfic, spi| rfic.set_rx_gain_control_mode(spi, channel, mode))
    }

    pub fn get_gain_mode(&self, direction: Direction, channel: usize) -> Result<bool, M2sdrError> {
        check_channel(channel)?;
        if direction == Direction::Tx {
            return Ok(false);
        }
        let mode = self
            .lock()?
            .with_rfic(|rfic, spi| rfic.rx_gain_control_mode(spi, channel))?;
        Ok(mode != GainControlMode::Manual)
    }

    pub fn gain_range(&self, direction: Direction, _channel: usize) -> Range {
        match direction {
            Direction::Tx => Range::new(-89.0, 0.0),
            Direction::Rx => Range::new(0.0, 73.0),
        }
    }

    /// Set the overall gain in dB.
    ///
    /// TX gain is applied as attenuation, so it is zero or negative. Values outside
    /// [`gain_range`](Self::gain_range) are clamped.
    pub fn set_gain(
        &self,
        direction: Direction,
        channel: usize,
        value: f64,
    ) -> Result<(), M2sdrError> {
        check_channel(channel)?;
        debug!("set_gain({direction}, ch{channel}, {value} dB)");
        let range = self.gain_range(direction, channel);
        let value = if range.contains(value) {
            value
        } else {
            let clamped = range.clamp(value);
            warn!("{direction} gain {value} dB is outside of {range:?}, using {clamped} dB");
            clamped
        };
        let mut state = self.lock()?;
        state.settings.channel(direction, channel).gain = Some(value);
        match direction {
            Direction::Tx => {
                let atten = (-value * 1000.0) as u32;
                state.with_rfic(|rfic, spi| rfic.set_tx_attenuation(spi, channel, atten))
            }
            Direction::Rx => {
                state.with_rfic(|rfic, spi| rfic.set_rx_rf_gain(spi, channel, value as i32))
            }
        }
    }

    pub fn set_named_gain(
        &self,
        direction: Direction,
        channel: usize,
        name: &str,
        value: f64,
    ) -> Result<(), M2sdrError> {
        check_gain_name(name)?;
        self.set_gain(direction, channel, value)
    }

    pub fn get_gain(&self, direction: Direction, channel: usize) -> Result<f64, M2sdrError> {
        check_channel(channel)?;
        let mut state = self.lock()?;
        match direction {
            Direction::Tx => {
                let atten = state.with_rfic(|rfic, spi| rfic.tx_attenuation(spi, channel))?;
                Ok(-(atten as f64) / 1000.0)
            }
            Direction::Rx => {
                let gain = state.with_rfic(|rfic, spi| rfic.rx_rf_gain(spi, channel))?;
                Ok(gain as f64)
            }
        }
    }

    pub fn get_named_gain(
        &self,
        direction: Direction,
        channel: usize,
        name: &str,
    ) -> Result<f64, M2sdrError> {
        check_gain_name(name)?;
        self.get_gain(direction, channel)
    }

    // Frequency

    pub fn list_frequencies(&self, _direction: Direction, _channel: usize) -> Vec<String> {
        vec![FREQUENCY_RF.to_string(), FREQUENCY_BB.to_string()]
    }

    pub fn frequency_range(
        &self,
        direction: Direction,
        _channel: usize,
        name: &str,
    ) -> Result<Range, M2sdrError> {
        check_frequency_name(name)?;
        if name == FREQUENCY_BB {
            return Ok(Range::new(0.0, 0.0));
        }
        Ok(match direction {
            Direction::Tx => Range::new(47e6, 6e9),
            Direction::Rx => Range::new(70e6, 6e9),
        })
    }

    /// Tune the LO.
    pub fn set_frequency(
        &self,
        direction: Direction,
        channel: usize,
        hz: f64,
    ) -> Result<(), M2sdrError> {
        self.set_named_frequency(direction, channel, FREQUENCY_RF, hz)
    }

    pub fn set_named_frequency(
        &self,
        direction: Direction,
        channel: usize,
        name: &str,
        hz: f64,
    ) -> Result<(), M2sdrError> {
        check_channel(channel)?;
        check_frequency_name(name)?;
        debug!("set_frequency({direction}, ch{channel}, {name}, {} MHz)", hz / 1e6);
        let mut state = self.lock()?;
        state
            .settings
            .channel(direction, channel)
            .frequencies
            .insert(name.to_string(), hz);
        if name == FREQUENCY_RF {
            state.with_rfic(|rfic, spi| rfic.set_lo_frequency(spi, direction, hz as u64))?;
        }
        Ok(())
    }

    pub fn get_frequency(&self, direction: Direction, channel: usize) -> Result<f64, M2sdrError> {
        self.get_named_frequency(direction, channel, FREQUENCY_RF)
    }

    /// `RF` is read from the LO; `BB` is the cached value, 0 when never set.
    pub fn get_named_frequency(
        &self,
        direction: Direction,
        channel: usize,
        name: &str,
    ) -> Result<f64, M2sdrError> {
        check_channel(channel)?;
        check_frequency_name(name)?;
        let mut state = self.lock()?;
        if name == FREQUENCY_RF {
            let lo = state.with_rfic(|rfic, spi| rfic.lo_frequency(spi, direction))?;
            return Ok(lo as f64);
        }
        Ok(state
            .settings
            .channel(direction, channel)
            .frequencies
            .get(name)
            .copied()
            .unwrap_or(0.0))
    }

    // Sample rate

    /// Program the sample rate seen by the host.
    ///
    /// The transceiver runs at `rate / rate_multiplier`. The sample mode is re-applied
    /// afterwards since the gateware format register follows rate changes.
    pub fn set_sample_rate(
        &self,
        direction: Direction,
        channel: usize,
        rate: f64,
    ) -> Result<(), M2sdrError> {
        check_channel(channel)?;
        debug!("set_sample_rate({direction}, ch{channel}, {} MHz)", rate / 1e6);
        let mut state = self.lock()?;
        let multiplier = state.config.rate_multiplier.max(1);
        let chip_rate = (rate as u32) / multiplier;
        state.with_rfic(|rfic, spi| rfic.set_sampling_frequency(spi, direction, chip_rate))?;
        if state.config.oversampling {
            state.with_rfic(|_, spi| write_oversampling_sequence(spi))?;
        }
        state.settings.channel(direction, channel).sample_rate = Some(rate);
        state.apply_sample_mode()
    }

    pub fn get_sample_rate(&self, direction: Direction, channel: usize) -> Result<f64, M2sdrError> {
        check_channel(channel)?;
        let mut state = self.lock()?;
        let multiplier = state.config.rate_multiplier.max(1);
        let chip_rate = state.with_rfic(|rfic, spi| rfic.sampling_frequency(spi, direction))?;
        Ok(multiplier as f64 * chip_rate as f64)
    }

    pub fn list_sample_rates(
        &self,
        _direction: Direction,
        _channel: usize,
    ) -> Result<Vec<f64>, M2sdrError> {
        let mut rates = vec![
            MIN_SAMPLE_RATE,
            1.0e6,
            2.5e6,
            5.0e6,
            10.0e6,
            20.0e6,
            30.72e6,
            MAX_SAMPLE_RATE,
        ];
        if self.lock()?.config.oversampling {
            rates.push(MAX_OVERSAMPLED_RATE);
        }
        Ok(rates)
    }

    pub fn sample_rate_range(
        &self,
        _direction: Direction,
        _channel: usize,
    ) -> Result<Range, M2sdrError> {
        let max = if self.lock()?.config.oversampling {
            MAX_OVERSAMPLED_RATE
        } else {
            MAX_SAMPLE_RATE
        };
        Ok(Range::new(MIN_SAMPLE_RATE, max))
    }

    // Bandwidth

    /// A bandwidth of 0 leaves the current setting untouched.
    pub fn set_bandwidth(
        &self,
        direction: Direction,
        channel: usize,
        hz: f64,
    ) -> Result<(), M2sdrError> {
        check_channel(channel)?;
        if hz == 0.0 {
            return Ok(());
        }
        debug!("set_bandwidth({direction}, ch{channel}, {} MHz)", hz / 1e6);
        let mut state = self.lock()?;
        state.settings.channel(direction, channel).bandwidth = Some(hz);
        state.with_rfic(|rfic, spi| rfic.set_rf_bandwidth(spi, direction, hz as u32))
    }

    pub fn get_bandwidth(&self, direction: Direction, channel: usize) -> Result<f64, M2sdrError> {
        check_channel(channel)?;
        let bw = self
            .lock()?
            .with_rfic(|rfic, spi| rfic.rf_bandwidth(spi, direction))?;
        Ok(bw as f64)
    }

    pub fn bandwidth_range(&self, _direction: Direction, _channel: usize) -> Range {
        Range::new(0.2e6, 56.0e6)
    }

    // Clocking

    pub fn list_clock_sources(&self) -> Vec<String> {
        ClockSource::ALL.iter().map(|c| c.as_str().to_string()).collect()
    }

    /// Record the reference of the clock synthesizer. The Si5351 itself is programmed over I2C
    /// outside of this driver, so only the selection is kept.
    pub fn set_clock_source(&self, name: &str) -> Result<(), M2sdrError> {
        let source: ClockSource = name.parse()?;
        debug!("set_clock_source({name})");
        self.lock()?.settings.clock_source = source;
        Ok(())
    }

    pub fn get_clock_source(&self) -> Result<String, M2sdrError> {
        Ok(self.lock()?.settings.clock_source.as_str().to_string())
    }

    // Stream formats

    pub fn stream_formats(&self, _direction: Direction, _channel: usize) -> Vec<String> {
        [StreamFormat::Cf32, StreamFormat::Cs16]
            .iter()
            .map(|f| f.as_str().to_string())
            .collect()
    }

    /// The wire format as a host format, with the full-scale value the CF32 conversion
    /// divides by.
    pub fn native_stream_format(
        &self,
        _direction: Direction,
        _channel: usize,
    ) -> Result<(StreamFormat, f64), M2sdrError> {
        let full_scale = self.lock()?.mode.scaling();
        Ok((StreamFormat::Cs16, full_scale as f64))
    }
}
