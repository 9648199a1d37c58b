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


use m2sdr::{DriverConfig, M2sdrDevice, SimulatedPcie, SimulatedPcieProbe, SimulatedTransceiver};
use rstest::*;

/// 64 byte buffers: an MTU of 8 samples in sc16 mode, 16 in sc8 mode.
pub const BUF_SIZE: usize = 64;
pub const BUF_COUNT: usize = 8;

pub type SimDevice = M2sdrDevice<SimulatedPcie, SimulatedTransceiver>;

/// A device on a simulated link, plus a probe into the link.
pub struct TestBoard {
    pub device: SimDevice,
    pub probe: SimulatedPcieProbe,
}

pub fn board_with(config: DriverConfig) -> TestBoard {
    let link = SimulatedPcie::new(BUF_SIZE, BUF_COUNT, config.csr);
    let probe = link.probe();
    let rfic = SimulatedTransceiver::new(config.oversampling);
    let device = M2sdrDevice::new(link, rfic, config).expect("simulated board initializes");
    TestBoard { device, probe }
}

#[fixture]
pub fn board() -> TestBoard {
    let _ = env_logger::builder().is_test(true).try_init();
    board_with(DriverConfig::default())
}
