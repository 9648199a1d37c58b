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

//! Small value types used across the driver API.

use crate::error::M2sdrError;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Stream direction as seen from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Rx,
    Tx,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Rx => write!(f, "Rx"),
            Direction::Tx => write!(f, "Tx"),
        }
    }
}

/// An inclusive numeric range with an optional step (0.0 means continuous).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub minimum: f64,
    pub maximum: f64,
    pub step: f64,
}

impl Range {
    pub const fn new(minimum: f64, maximum: f64) -> Range {
        Range {
            minimum,
            maximum,
            step: 0.0,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.minimum && value <= self.maximum
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.minimum, self.maximum)
    }
}

/// Packing of I/Q samples on the PCIe link.
///
/// This is a configuration-time choice; the gateware format register is written at
/// construction and re-applied whenever the sample rate changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// 12-bit samples carried in 16-bit little-endian words.
    #[default]
    Sc16,
    /// 8-bit samples.
    Sc8,
}

impl SampleFormat {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::Sc16 => 2,
            SampleFormat::Sc8 => 1,
        }
    }

    pub fn bytes_per_complex(&self) -> usize {
        2 * self.bytes_per_sample()
    }

    /// Full-scale value used to map wire integers to `[-1.0, 1.0]`.
    pub fn scaling(&self) -> f32 {
        match self {
            SampleFormat::Sc16 => 2047.0,
            SampleFormat::Sc8 => 128.0,
        }
    }

    /// Value expected by the gateware format CSR.
    pub fn format_register(&self) -> u32 {
        match self {
            SampleFormat::Sc16 => 0,
            SampleFormat::Sc8 => 1,
        }
    }
}

/// Host-side sample format of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    /// Complex `f32` scaled to `[-1.0, 1.0]`.
    Cf32,
    /// Complex `i16`, unscaled wire values.
    Cs16,
}

impl StreamFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamFormat::Cf32 => "CF32",
            StreamFormat::Cs16 => "CS16",
        }
    }
}

impl FromStr for StreamFormat {
    type Err = M2sdrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CF32" => Ok(StreamFormat::Cf32),
            "CS16" => Ok(StreamFormat::Cs16),
            _ => Err(M2sdrError::Argument(format!(
                "Unsupported stream format '{s}'. Supported formats are CF32 and CS16"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSource {
    Internal,
    External,
}

impl ClockSource {
    pub const ALL: [ClockSource; 2] = [ClockSource::Internal, ClockSource::External];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClockSource::Internal => "internal",
            ClockSource::External => "external",
        }
    }
}

impl FromStr for ClockSource {
    type Err = M2sdrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "internal" => Ok(ClockSource::Internal),
            "external" => Ok(ClockSource::External),
            _ => Err(M2sdrError::Argument(format!("Unknown clock source '{s}'"))),
        }
    }
}

/// Receive gain control loop of the transceiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainControlMode {
    Manual,
    FastAttack,
    SlowAttack,
    Hybrid,
}
