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
use crate::common::{TestBoard, board, board_with};
use googletest::prelude::*;
use m2sdr::{DriverConfig, SensorType};
use rstest::*;

#[gtest]
#[rstest]
fn all_sensors_are_listed_with_xadc(board: TestBoard) {
    compare_result(
        &board.device.list_sensors(),
        &Ok(vec![
            "fpga_temp".to_string(),
            "fpga_vccint".to_string(),
            "fpga_vccaux".to_string(),
            "fpga_vccbram".to_string(),
            "ad9361_temp".to_string(),
        ]),
    );
}

#[gtest]
fn fpga_sensors_need_the_xadc() {
    let board = board_with(DriverConfig {
        xadc: false,
        ..DriverConfig::default()
    });
    compare_result(
        &board.device.list_sensors(),
        &Ok(vec!["ad9361_temp".to_string()]),
    );
    compare_result(
        &board.device.read_sensor("fpga_temp"),
        &Err("Sensor fpga_temp: unknown device"),
    );
}

#[gtest]
#[rstest]
#[case::fpga_temp("fpga_temp", Ok("52.908044".to_string()))]
#[case::vccint("fpga_vccint", Ok("0.999756".to_string()))]
#[case::vccaux("fpga_vccaux", Ok("1.799561".to_string()))]
#[case::vccbram("fpga_vccbram", Ok("0.999756".to_string()))]
#[case::ad9361_temp("ad9361_temp", Ok("35".to_string()))]
#[case::unknown_key("temperature", Err("Sensor temperature: unknown key"))]
#[case::unknown_device("cpu_temp", Err("Sensor cpu_temp: unknown device"))]
#[case::unknown_sensor("ad9361_vcc", Err("Sensor ad9361_vcc: unknown sensor"))]
fn read_sensor(board: TestBoard, #[case] key: &str, #[case] expected: Result<String, &str>) {
    compare_result(&board.device.read_sensor(key), &expected);
}

#[gtest]
#[rstest]
fn sensor_info_describes_the_metric(board: TestBoard) {
    let info = board
        .device
        .sensor_info("fpga_vccaux")
        .expect("fpga_vccaux exists");
    expect_that!(info.key, eq("vccaux"));
    expect_that!(info.units, eq("V"));
    expect_that!(info.kind, eq(SensorType::Float));
    compare_result(
        &board.device.sensor_info("ad9361_gain").map(|i| i.key),
        &Err("unknown sensor"),
    );
}
