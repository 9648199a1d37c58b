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

//! Userspace driver for the LiteX M2SDR, a PCIe software-defined radio built around an FPGA
//! and an AD9361 RF transceiver.
//!
//! ```text
//! M2sdrDevice ──┬── PcieLink ────── LitePcie (/dev/m2sdrN) | SimulatedPcie
//!               │      └── CsrSpi ── RfTransceiver (AD9361 chip driver)
//!               ├── settings cache
//!               └── DmaStream (RX) / DmaStream (TX)
//! ```
//!
//! A typical receive session:
//!
//! ```no_run
//! use m2sdr::{
//!     DeviceArgs, Direction, DriverConfig, M2sdrDevice, SimulatedTransceiver, StreamFormat,
//! };
//! use num_complex::Complex32;
//! use std::path::PathBuf;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), m2sdr::M2sdrError> {
//! let args = DeviceArgs { path: PathBuf::from("/dev/m2sdr0"), bypass_init: false };
//! let device = M2sdrDevice::open(&args, DriverConfig::load(), SimulatedTransceiver::default())?;
//! device.set_sample_rate(Direction::Rx, 0, 30.72e6)?;
//! device.set_frequency(Direction::Rx, 0, 2.4e9)?;
//!
//! let rx = device.setup_stream(Direction::Rx, StreamFormat::Cf32, &[0])?;
//! device.activate_stream(&rx)?;
//! let mut samples = vec![Complex32::default(); device.stream_mtu(&rx)?];
//! let n = device.read_stream(&rx, &mut [&mut samples[..]], Duration::from_millis(100))?;
//! println!("received {n} samples");
//! device.close_stream(rx)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod pcie;
pub mod rfic;
pub mod stream;
pub mod system_io;
pub mod types;

pub use config::DriverConfig;
pub use device::sensors::{Sensor, SensorInfo, SensorType};
pub use device::{DeviceArgs, M2sdrDevice, NUM_CHANNELS};
pub use error::M2sdrError;
pub use pcie::{DmaWait, LitePcie, PcieLink, SimulatedPcie, SimulatedPcieProbe};
pub use rfic::{RfTransceiver, SimulatedTransceiver, SpiTransport};
pub use stream::convert::HostSample;
pub use stream::{StreamHandle, StreamStatus};
pub use types::{ClockSource, Direction, GainControlMode, Range, SampleFormat, StreamFormat};
