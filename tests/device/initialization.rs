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

use crate::common::test_functions::compare_result;
use crate::common::{BUF_COUNT, BUF_SIZE, TestBoard, board, board_with};
use googletest::prelude::*;
use m2sdr::pcie::csr::CsrMap;
use m2sdr::rfic::simulated::REG_PRODUCT_ID;
use m2sdr::{
    DeviceArgs, Direction, DriverConfig, M2sdrDevice, SampleFormat, SimulatedPcie,
    SimulatedTransceiver,
};
use rstest::*;
use std::collections::HashMap;

#[gtest]
#[rstest]
fn full_init_releases_the_transceiver_from_reset(board: TestBoard) {
    let csr = CsrMap::default();
    // RST_N | ENABLE | TXNRX
    expect_that!(board.probe.register(csr.ad9361_config), eq(0x13));
    expect_that!(board.probe.register(csr.pcie_dma0_synchronizer_bypass), eq(1));
    expect_that!(board.probe.register(csr.ad9361_format), eq(0));
}

#[gtest]
#[rstest]
fn full_init_applies_defaults(board: TestBoard) {
    let device = &board.device;
    for channel in 0..2 {
        compare_result(&device.get_antenna(Direction::Rx, channel), &Ok("A_BALANCED".to_string()));
        compare_result(&device.get_antenna(Direction::Tx, channel), &Ok("A".to_string()));
        compare_result(&device.get_sample_rate(Direction::Rx, channel), &Ok(30.72e6));
        compare_result(&device.get_bandwidth(Direction::Tx, channel), &Ok(30.72e6));
        compare_result(
            &device.get_named_frequency(Direction::Rx, channel, "BB"),
            &Ok(1e6),
        );
        compare_result(&device.get_gain(Direction::Rx, channel), &Ok(0.0));
    }
    compare_result(&device.get_clock_source(), &Ok("internal".to_string()));
}

#[gtest]
fn bypass_init_leaves_the_board_alone() {
    let config = DriverConfig {
        bypass_init: true,
        ..DriverConfig::default()
    };
    let board = board_with(config);
    expect_that!(board.probe.register(CsrMap::default().ad9361_config), eq(0));
    expect_that!(board.probe.spi_writes(), is_empty());
    // Nothing was applied, so the cache has no antenna to report.
    compare_result(
        &board.device.get_antenna(Direction::Rx, 0),
        &Err("M2sdrError::Argument"),
    );
}

#[gtest]
fn sc8_mode_is_programmed_at_construction() {
    let config = DriverConfig {
        sample_format: SampleFormat::Sc8,
        ..DriverConfig::default()
    };
    let board = board_with(config);
    expect_that!(board.probe.register(CsrMap::default().ad9361_format), eq(1));
}

#[gtest]
#[rstest]
#[case::wrong_product_id(false, "ad9361_init returned -19")]
#[case::stuck_spi_master(true, "M2sdrError::Spi")]
fn transceiver_failures_abort_construction(#[case] stuck: bool, #[case] signature: &str) {
    let link = SimulatedPcie::new(BUF_SIZE, BUF_COUNT, CsrMap::default());
    let probe = link.probe();
    probe.set_spi_register(REG_PRODUCT_ID, 0x00);
    probe.set_spi_stuck(stuck);
    let res = M2sdrDevice::new(link, SimulatedTransceiver::default(), DriverConfig::default());
    expect_that!(
        res.map(|_| ()),
        err(displays_as(contains_substring(signature)))
    );
}

#[gtest]
fn oversampling_reprograms_the_transceiver_after_rate_changes() {
    let config = DriverConfig {
        oversampling: true,
        ..DriverConfig::default()
    };
    let board = board_with(config);
    let writes = board.probe.spi_writes();
    expect_that!(writes.first(), eq(Some(&(0x003u16, 0x54u8))));
    expect_that!(writes.last(), eq(Some(&(0x3f6u16, 0x03u8))));

    compare_result(
        &board.device.set_sample_rate(Direction::Rx, 0, 122.88e6),
        &Ok(()),
    );
    compare_result(&board.device.get_sample_rate(Direction::Tx, 0), &Ok(122.88e6));
}

#[gtest]
fn open_fails_on_a_missing_device_node() {
    let kwargs = HashMap::from([("path".to_string(), "/dev/m2sdr-does-not-exist".to_string())]);
    let args = DeviceArgs::from_kwargs(&kwargs).expect("path is given");
    let res = M2sdrDevice::open(&args, DriverConfig::default(), SimulatedTransceiver::default());
    expect_that!(
        res.map(|_| ()),
        err(displays_as(contains_substring("M2sdrError::DeviceOpen")))
    );
}
