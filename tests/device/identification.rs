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
use crate::common::{TestBoard, board};
use googletest::prelude::*;
use m2sdr::Direction;
use m2sdr::pcie::csr::CsrMap;
use m2sdr::pcie::simulated::SIM_IDENTIFIER;
use rstest::*;

#[gtest]
#[rstest]
fn keys_and_channels(board: TestBoard) {
    let device = &board.device;
    expect_that!(device.driver_key(), eq("LiteX-M2SDR"));
    expect_that!(device.hardware_key(), eq("R01"));
    expect_that!(device.num_channels(Direction::Rx), eq(2));
    expect_that!(device.num_channels(Direction::Tx), eq(2));
    expect_that!(device.full_duplex(Direction::Tx, 1), eq(true));
}

#[gtest]
#[rstest]
fn serial_is_the_fpga_dna(board: TestBoard) {
    compare_result(&board.device.serial(), &Ok("402c1b8d5a0c85".to_string()));
}

#[gtest]
#[rstest]
fn identification_stops_at_the_terminator(board: TestBoard) {
    compare_result(
        &board.device.fpga_identification(),
        &Ok(SIM_IDENTIFIER.to_string()),
    );
}

#[gtest]
#[rstest]
fn hardware_info_collects_identification(board: TestBoard) {
    let info = board.device.hardware_info().expect("simulated board answers");
    expect_that!(info.get("serial").map(String::as_str), eq(Some("402c1b8d5a0c85")));
    expect_that!(
        info.get("identification").map(String::as_str),
        eq(Some(SIM_IDENTIFIER))
    );
    expect_that!(info.get("device_path").map(String::as_str), eq(Some("/dev/m2sdr0")));
}

#[gtest]
#[rstest]
fn registers_are_read_and_written(board: TestBoard) {
    let scratch = CsrMap::default().ctrl_scratch;
    compare_result(&board.device.read_register(scratch), &Ok(0x1234_5678));
    compare_result(&board.device.write_register(scratch, 0xdead_beef), &Ok(()));
    compare_result(&board.device.read_register(scratch), &Ok(0xdead_beef));
    expect_that!(board.probe.register(scratch), eq(0xdead_beef));
}
