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
use m2sdr::pcie::csr::{block, csr_addr};
use m2sdr::{Direction, DriverConfig, Range, SampleFormat, StreamFormat};
use num_complex::Complex64;
use rstest::*;

#[gtest]
#[rstest]
#[case::tx_attenuation(Direction::Tx, -10.5, -10.5)]
#[case::tx_no_attenuation(Direction::Tx, 0.0, 0.0)]
#[case::tx_positive_is_clamped(Direction::Tx, 5.0, 0.0)]
#[case::tx_too_low_is_clamped(Direction::Tx, -100.0, -89.0)]
#[case::rx_gain(Direction::Rx, 42.0, 42.0)]
#[case::rx_fraction_truncated(Direction::Rx, 12.9, 12.0)]
#[case::rx_too_high_is_clamped(Direction::Rx, 80.0, 73.0)]
fn gain_round_trips(
    board: TestBoard,
    #[case] direction: Direction,
    #[case] value: f64,
    #[case] expected: f64,
) {
    compare_result(&board.device.set_gain(direction, 1, value), &Ok(()));
    compare_result(&board.device.get_gain(direction, 1), &Ok(expected));
    compare_result(&board.device.get_named_gain(direction, 1, "PGA"), &Ok(expected));
}

#[gtest]
#[rstest]
fn unknown_gain_element_is_rejected(board: TestBoard) {
    compare_result(
        &board.device.set_named_gain(Direction::Rx, 0, "LNA", 3.0),
        &Err("M2sdrError::Argument"),
    );
}

#[gtest]
#[rstest]
fn gain_mode_only_exists_on_rx(board: TestBoard) {
    let device = &board.device;
    expect_that!(device.has_gain_mode(Direction::Rx, 0), eq(true));
    expect_that!(device.has_gain_mode(Direction::Tx, 0), eq(false));
    compare_result(&device.set_gain_mode(Direction::Rx, 0, true), &Ok(()));
    compare_result(&device.get_gain_mode(Direction::Rx, 0), &Ok(true));
    compare_result(&device.get_gain_mode(Direction::Rx, 1), &Ok(false));
    compare_result(&device.set_gain_mode(Direction::Tx, 0, true), &Ok(()));
    compare_result(&device.get_gain_mode(Direction::Tx, 0), &Ok(false));
}

#[gtest]
#[rstest]
#[case::rx_lo(Direction::Rx, "RF", 915e6, Ok(915e6))]
#[case::tx_lo(Direction::Tx, "RF", 5.8e9, Ok(5.8e9))]
#[case::rx_below_range(Direction::Rx, "RF", 50e6, Err("ad9361_set_lo_freq returned -22"))]
#[case::baseband(Direction::Tx, "BB", 2.5e6, Ok(2.5e6))]
#[case::unknown_element(Direction::Rx, "IF", 10e6, Err("M2sdrError::Argument"))]
fn named_frequencies(
    board: TestBoard,
    #[case] direction: Direction,
    #[case] name: &str,
    #[case] hz: f64,
    #[case] expected: Result<f64, &str>,
) {
    let set = board.device.set_named_frequency(direction, 0, name, hz);
    match expected {
        Ok(_) => compare_result(&set, &Ok(())),
        Err(signature) => compare_result(&set, &Err(signature)),
    }
    if expected.is_ok() {
        compare_result(&board.device.get_named_frequency(direction, 0, name), &expected);
    }
}

#[gtest]
#[rstest]
fn unset_baseband_frequency_reads_zero() {
    let config = DriverConfig {
        bypass_init: true,
        ..DriverConfig::default()
    };
    let board = board_with(config);
    compare_result(
        &board.device.get_named_frequency(Direction::Rx, 1, "BB"),
        &Ok(0.0),
    );
}

#[gtest]
#[rstest]
fn frequency_ranges(board: TestBoard) {
    let device = &board.device;
    compare_result(
        &device.frequency_range(Direction::Rx, 0, "RF"),
        &Ok(Range::new(70e6, 6e9)),
    );
    compare_result(
        &device.frequency_range(Direction::Tx, 0, "RF"),
        &Ok(Range::new(47e6, 6e9)),
    );
    compare_result(
        &device.frequency_range(Direction::Tx, 0, "BB"),
        &Ok(Range::new(0.0, 0.0)),
    );
    expect_that!(device.list_frequencies(Direction::Rx, 0), elements_are![eq("RF"), eq("BB")]);
}

#[gtest]
#[rstest]
fn sample_rate_is_shared_between_directions(board: TestBoard) {
    compare_result(&board.device.set_sample_rate(Direction::Rx, 0, 10e6), &Ok(()));
    compare_result(&board.device.get_sample_rate(Direction::Tx, 1), &Ok(10e6));
    compare_result(
        &board.device.set_sample_rate(Direction::Rx, 0, 100e6),
        &Err("ad9361_set_sampling_freq returned -22"),
    );
}

#[gtest]
fn rate_multiplier_scales_the_transceiver_rate() {
    let config = DriverConfig {
        rate_multiplier: 2,
        ..DriverConfig::default()
    };
    let board = board_with(config);
    // 100 MS/s at the host is 50 MS/s at the transceiver, inside its limit.
    compare_result(&board.device.set_sample_rate(Direction::Rx, 0, 100e6), &Ok(()));
    compare_result(&board.device.get_sample_rate(Direction::Rx, 0), &Ok(100e6));
}

#[gtest]
#[rstest]
fn sample_rate_range_follows_oversampling(board: TestBoard) {
    compare_result(
        &board.device.sample_rate_range(Direction::Rx, 0),
        &Ok(Range::new(25e6 / 96.0, 61.44e6)),
    );
    let oversampled = board_with(DriverConfig {
        oversampling: true,
        ..DriverConfig::default()
    });
    compare_result(
        &oversampled.device.sample_rate_range(Direction::Rx, 0),
        &Ok(Range::new(25e6 / 96.0, 122.88e6)),
    );
}

#[gtest]
#[rstest]
#[case::in_range(10e6, 10e6)]
#[case::clamped_low(100e3, 200e3)]
#[case::clamped_high(60e6, 56e6)]
fn bandwidth_round_trips(board: TestBoard, #[case] hz: f64, #[case] expected: f64) {
    compare_result(&board.device.set_bandwidth(Direction::Rx, 1, hz), &Ok(()));
    compare_result(&board.device.get_bandwidth(Direction::Rx, 1), &Ok(expected));
}

#[gtest]
#[rstest]
fn zero_bandwidth_keeps_the_current_one(board: TestBoard) {
    compare_result(&board.device.set_bandwidth(Direction::Tx, 0, 5e6), &Ok(()));
    compare_result(&board.device.set_bandwidth(Direction::Tx, 0, 0.0), &Ok(()));
    compare_result(&board.device.get_bandwidth(Direction::Tx, 0), &Ok(5e6));
}

#[gtest]
#[rstest]
#[case::rx_default(Direction::Rx, "A_BALANCED", Ok(()))]
#[case::tx_default(Direction::Tx, "A", Ok(()))]
#[case::tx_rx_antenna(Direction::Tx, "A_BALANCED", Err("M2sdrError::Argument"))]
fn antennas(
    board: TestBoard,
    #[case] direction: Direction,
    #[case] name: &str,
    #[case] expected: Result<(), &str>,
) {
    compare_result(&board.device.set_antenna(direction, 0, name), &expected);
}

#[gtest]
#[rstest]
fn iq_balance_is_cached(board: TestBoard) {
    let balance = Complex64::new(0.98, -0.01);
    expect_that!(board.device.has_iq_balance(Direction::Tx, 0), eq(true));
    expect_that!(board.device.has_dc_offset_mode(Direction::Rx, 0), eq(false));
    compare_result(&board.device.set_iq_balance(Direction::Tx, 1, balance), &Ok(()));
    compare_result(&board.device.get_iq_balance(Direction::Tx, 1), &Ok(balance));
    compare_result(
        &board.device.get_iq_balance(Direction::Rx, 1),
        &Ok(Complex64::new(1.0, 0.0)),
    );
}

#[gtest]
#[rstest]
fn clock_source_is_cached_without_touching_the_gateware(board: TestBoard) {
    let timestamp = csr_addr(block::TIMESTAMP, 0);
    let si5351 = csr_addr(block::SI5351_I2C, 0);
    expect_that!(
        board.device.list_clock_sources(),
        elements_are![eq("internal"), eq("external")]
    );
    compare_result(&board.device.set_clock_source("external"), &Ok(()));
    compare_result(&board.device.get_clock_source(), &Ok("external".to_string()));
    expect_that!(board.probe.register(timestamp), eq(0));
    expect_that!(board.probe.register(si5351), eq(0));
    compare_result(&board.device.set_clock_source("internal"), &Ok(()));
    compare_result(&board.device.set_clock_source("gps"), &Err("M2sdrError::Argument"));
    compare_result(&board.device.get_clock_source(), &Ok("internal".to_string()));
}

#[gtest]
#[rstest]
fn invalid_channels_are_rejected(board: TestBoard) {
    compare_result(&board.device.set_gain(Direction::Rx, 2, 0.0), &Err("Channel 2 does not exist"));
    compare_result(&board.device.get_frequency(Direction::Tx, 5), &Err("M2sdrError::Argument"));
}

#[gtest]
#[rstest]
#[case::sc16(SampleFormat::Sc16, 2047.0)]
#[case::sc8(SampleFormat::Sc8, 128.0)]
fn stream_formats(#[case] sample_format: SampleFormat, #[case] full_scale: f64) {
    let board = board_with(DriverConfig {
        sample_format,
        ..DriverConfig::default()
    });
    expect_that!(
        board.device.stream_formats(Direction::Rx, 0),
        elements_are![eq("CF32"), eq("CS16")]
    );
    // Same value the CF32 conversion divides by.
    expect_that!(full_scale, eq(sample_format.scaling() as f64));
    compare_result(
        &board.device.native_stream_format(Direction::Rx, 0),
        &Ok((StreamFormat::Cs16, full_scale)),
    );
}

#[gtest]
#[rstest]
fn cached_settings_hold_requested_values(board: TestBoard) {
    compare_result(&board.device.set_gain(Direction::Tx, 0, -3.0), &Ok(()));
    let cached = board
        .device
        .cached_settings(Direction::Tx, 0)
        .expect("channel 0 exists");
    expect_that!(cached.gain, eq(Some(-3.0)));
    expect_that!(cached.antenna, eq(&Some("A".to_string())));
    expect_that!(cached.sample_rate, eq(Some(30.72e6)));
}
