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
use m2sdr::pcie::{DmaCounts, DmaInfo};
use m2sdr::{
    Direction, DmaWait, DriverConfig, M2sdrDevice, M2sdrError, PcieLink, SampleFormat,
    SimulatedPcie, SimulatedTransceiver, StreamFormat, StreamStatus,
};
use num_complex::{Complex, Complex32};
use rstest::*;
use std::thread;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_millis(10);
const MTU: usize = 8;

fn zeros() -> Vec<Complex<i16>> {
    vec![Complex::default(); MTU]
}

#[gtest]
#[rstest]
fn one_stream_per_direction(board: TestBoard) {
    let device = &board.device;
    let rx = device
        .setup_stream(Direction::Rx, StreamFormat::Cf32, &[0])
        .expect("rx DMA is free");
    expect_that!(board.probe.dma_locked(Direction::Rx), eq(true));
    expect_that!(board.probe.live_mappings(), eq(1));
    compare_result(
        &device.setup_stream(Direction::Rx, StreamFormat::Cs16, &[1]),
        &Err("M2sdrError::Stream"),
    );
    let tx = device
        .setup_stream(Direction::Tx, StreamFormat::Cf32, &[0, 1])
        .expect("tx DMA is free");
    expect_that!(board.probe.live_mappings(), eq(2));

    compare_result(&device.close_stream(rx), &Ok(()));
    expect_that!(board.probe.dma_locked(Direction::Rx), eq(false));
    expect_that!(board.probe.dma_locked(Direction::Tx), eq(true));
    expect_that!(board.probe.live_mappings(), eq(1));
    compare_result(&device.close_stream(tx), &Ok(()));
    expect_that!(board.probe.live_mappings(), eq(0));
}

#[gtest]
#[rstest]
#[case::out_of_range(&[2], "Channel 2 does not exist")]
#[case::duplicate(&[1, 1], "Channel 1 requested twice")]
fn invalid_channel_selection(
    board: TestBoard,
    #[case] channels: &[usize],
    #[case] signature: &str,
) {
    let res = board
        .device
        .setup_stream(Direction::Tx, StreamFormat::Cs16, channels)
        .map(|h| h.direction());
    compare_result(&res, &Err(signature));
    expect_that!(board.probe.dma_locked(Direction::Tx), eq(false));
}

#[gtest]
#[rstest]
fn failed_mapping_gives_the_dma_lock_back(board: TestBoard) {
    board.probe.set_fail_map(true);
    let res = board
        .device
        .setup_stream(Direction::Rx, StreamFormat::Cs16, &[0])
        .map(|h| h.direction());
    compare_result(&res, &Err("M2sdrError::Mmap"));
    expect_that!(board.probe.dma_locked(Direction::Rx), eq(false));

    board.probe.set_fail_map(false);
    let res = board
        .device
        .setup_stream(Direction::Rx, StreamFormat::Cs16, &[0])
        .map(|h| h.direction());
    compare_result(&res, &Ok(Direction::Rx));
}

#[gtest]
#[rstest]
fn mtu_follows_the_sample_mode(board: TestBoard) {
    let rx = board
        .device
        .setup_stream(Direction::Rx, StreamFormat::Cs16, &[])
        .expect("rx DMA is free");
    compare_result(&board.device.stream_mtu(&rx), &Ok(MTU));

    let sc8 = board_with(DriverConfig {
        sample_format: SampleFormat::Sc8,
        ..DriverConfig::default()
    });
    let rx = sc8
        .device
        .setup_stream(Direction::Rx, StreamFormat::Cs16, &[])
        .expect("rx DMA is free");
    compare_result(&sc8.device.stream_mtu(&rx), &Ok(2 * MTU));
}

#[gtest]
#[rstest]
fn reading_needs_an_active_stream(board: TestBoard) {
    let rx = board
        .device
        .setup_stream(Direction::Rx, StreamFormat::Cs16, &[0])
        .expect("rx DMA is free");
    let mut ch0 = zeros();
    compare_result(
        &board.device.read_stream(&rx, &mut [&mut ch0[..]], TIMEOUT),
        &Err("Rx stream is not active"),
    );
    compare_result(&board.device.activate_stream(&rx), &Ok(()));
    compare_result(&board.device.is_stream_active(&rx), &Ok(true));
    expect_that!(board.probe.dma_enabled(Direction::Rx), eq(true));
    compare_result(&board.device.deactivate_stream(&rx), &Ok(()));
    expect_that!(board.probe.dma_enabled(Direction::Rx), eq(false));
}

#[gtest]
#[rstest]
fn both_channels_are_deinterleaved(board: TestBoard) {
    let rx = board
        .device
        .setup_stream(Direction::Rx, StreamFormat::Cs16, &[0, 1])
        .expect("rx DMA is free");
    board.device.activate_stream(&rx).expect("engine starts");
    let (mut ch0, mut ch1) = (zeros(), zeros());
    compare_result(
        &board.device.read_stream(&rx, &mut [&mut ch0[..], &mut ch1[..]], TIMEOUT),
        &Ok(MTU),
    );
    expect_that!(ch0[3], eq(Complex::new(3, -3)));
    expect_that!(ch1[3], eq(Complex::new(-3, 3)));

    // The next buffer continues the ramp.
    compare_result(
        &board.device.read_stream(&rx, &mut [&mut ch0[..], &mut ch1[..]], TIMEOUT),
        &Ok(MTU),
    );
    expect_that!(ch0[0], eq(Complex::new(8, -8)));
}

#[gtest]
#[rstest]
fn cf32_samples_are_scaled(board: TestBoard) {
    let rx = board
        .device
        .setup_stream(Direction::Rx, StreamFormat::Cf32, &[1])
        .expect("rx DMA is free");
    board.device.activate_stream(&rx).expect("engine starts");
    let mut ch1 = vec![Complex32::default(); MTU];
    compare_result(
        &board.device.read_stream(&rx, &mut [&mut ch1[..]], TIMEOUT),
        &Ok(MTU),
    );
    expect_that!(ch1[2].re, near(-2.0 / 2047.0, 1e-6));
    expect_that!(ch1[2].im, near(2.0 / 2047.0, 1e-6));
}

#[gtest]
#[rstest]
fn stream_misuse_is_rejected(board: TestBoard) {
    let rx = board
        .device
        .setup_stream(Direction::Rx, StreamFormat::Cf32, &[0])
        .expect("rx DMA is free");
    board.device.activate_stream(&rx).expect("engine starts");
    let mut ch0 = zeros();
    compare_result(
        &board.device.read_stream(&rx, &mut [&mut ch0[..]], TIMEOUT),
        &Err("set up for CF32, not CS16"),
    );
    let ch = zeros();
    compare_result(
        &board.device.write_stream(&rx, &[&ch[..]], false, TIMEOUT),
        &Err("needs a Tx stream"),
    );
}

#[gtest]
#[rstest]
fn falling_behind_drops_buffers(board: TestBoard) {
    let rx = board
        .device
        .setup_stream(Direction::Rx, StreamFormat::Cs16, &[0])
        .expect("rx DMA is free");
    board.device.activate_stream(&rx).expect("engine starts");
    // More than half of the 8 buffer ring fills up before the host looks.
    board.probe.set_rx_burst(5);
    let mut ch0 = zeros();
    compare_result(
        &board.device.read_stream(&rx, &mut [&mut ch0[..]], TIMEOUT),
        &Err("dropped 5 DMA buffers"),
    );
    compare_result(
        &board.device.stream_status(&rx),
        &Ok(StreamStatus {
            overflows: 1,
            dropped_buffers: 5,
            underflows: 0,
        }),
    );
    compare_result(&board.device.read_stream_status(&rx), &Err("M2sdrError::Overflow"));
    compare_result(&board.device.read_stream_status(&rx), &Ok(()));

    // Reading resumes right after the dropped buffers.
    board.probe.set_rx_burst(1);
    compare_result(
        &board.device.read_stream(&rx, &mut [&mut ch0[..]], TIMEOUT),
        &Ok(MTU),
    );
    expect_that!(ch0[0], eq(Complex::new(5 * MTU as i16, -5 * MTU as i16)));
}

#[gtest]
#[rstest]
fn empty_ring_times_out(board: TestBoard) {
    let rx = board
        .device
        .setup_stream(Direction::Rx, StreamFormat::Cs16, &[0])
        .expect("rx DMA is free");
    board.device.activate_stream(&rx).expect("engine starts");
    board.probe.set_rx_burst(0);
    let mut ch0 = zeros();
    compare_result(
        &board.device.read_stream(&rx, &mut [&mut ch0[..]], TIMEOUT),
        &Err("No Rx DMA buffer became ready"),
    );
}

#[gtest]
#[rstest]
fn transmit_reaches_the_engine(board: TestBoard) {
    let tx = board
        .device
        .setup_stream(Direction::Tx, StreamFormat::Cs16, &[0, 1])
        .expect("tx DMA is free");
    board.device.activate_stream(&tx).expect("engine starts");
    let ch0: Vec<Complex<i16>> = (1..=MTU as i16).map(|k| Complex::new(k, -k)).collect();
    let ch1: Vec<Complex<i16>> = (0..MTU as i16).map(|k| Complex::new(100 + k, 0)).collect();

    compare_result(
        &board.device.write_stream(&tx, &[&ch0[..], &ch1[..]], false, TIMEOUT),
        &Ok(MTU),
    );
    // A short burst: the tail of the second buffer is zero-padded.
    compare_result(
        &board.device.write_stream(&tx, &[&ch0[..3], &ch1[..3]], true, TIMEOUT),
        &Ok(3),
    );
    expect_that!(board.probe.dma_counts(Direction::Tx).sw_count, eq(2));

    // The first buffer was consumed while the second one was acquired.
    let transmitted = board.probe.transmitted();
    expect_that!(transmitted.len(), eq(64));
    expect_that!(
        transmitted[..8].to_vec(),
        eq(&vec![1, 0, 0xff, 0xff, 100, 0, 0, 0])
    );
}

#[gtest]
#[rstest]
fn drained_ring_reports_an_underflow(board: TestBoard) {
    let tx = board
        .device
        .setup_stream(Direction::Tx, StreamFormat::Cs16, &[0])
        .expect("tx DMA is free");
    board.device.activate_stream(&tx).expect("engine starts");
    let ch0 = zeros();
    for _ in 0..2 {
        compare_result(
            &board.device.write_stream(&tx, &[&ch0[..]], false, TIMEOUT),
            &Ok(MTU),
        );
    }
    compare_result(
        &board.device.stream_status(&tx).map(|s| s.underflows),
        &Ok(1),
    );
    compare_result(&board.device.read_stream_status(&tx), &Err("M2sdrError::Underflow"));
    compare_result(&board.device.read_stream_status(&tx), &Ok(()));
}

#[gtest]
#[rstest]
fn ending_bursts_leaves_no_underflow(board: TestBoard) {
    let device = &board.device;
    let tx = device
        .setup_stream(Direction::Tx, StreamFormat::Cs16, &[0])
        .expect("tx DMA is free");
    device.activate_stream(&tx).expect("engine starts");
    let ch0 = zeros();
    // The engine drains the ring between the two bursts.
    for _ in 0..2 {
        compare_result(
            &device.write_stream(&tx, &[&ch0[..]], true, TIMEOUT),
            &Ok(MTU),
        );
    }
    // A restarted engine begins with an empty ring too.
    device.deactivate_stream(&tx).expect("engine stops");
    device.activate_stream(&tx).expect("engine restarts");
    compare_result(
        &device.write_stream(&tx, &[&ch0[..]], false, TIMEOUT),
        &Ok(MTU),
    );
    compare_result(&device.stream_status(&tx).map(|s| s.underflows), &Ok(0));
    compare_result(&device.read_stream_status(&tx), &Ok(()));
}

#[gtest]
#[rstest]
fn full_ring_accepts_a_partial_write_then_times_out(board: TestBoard) {
    let tx = board
        .device
        .setup_stream(Direction::Tx, StreamFormat::Cs16, &[0])
        .expect("tx DMA is free");
    board.device.activate_stream(&tx).expect("engine starts");
    board.probe.set_tx_burst(0);
    let ch0 = vec![Complex::new(1i16, 1i16); (BUF_COUNT + 1) * MTU];
    compare_result(
        &board.device.write_stream(&tx, &[&ch0[..]], false, TIMEOUT),
        &Ok(BUF_COUNT * MTU),
    );
    compare_result(
        &board.device.write_stream(&tx, &[&ch0[..MTU]], false, TIMEOUT),
        &Err("No Tx DMA buffer became ready"),
    );
}

#[gtest]
#[rstest]
fn loopback_returns_what_was_sent(board: TestBoard) {
    let device = &board.device;
    compare_result(&device.set_dma_loopback(true), &Ok(()));
    expect_that!(board.probe.loopback(), eq(true));
    let tx = device
        .setup_stream(Direction::Tx, StreamFormat::Cs16, &[0, 1])
        .expect("tx DMA is free");
    let rx = device
        .setup_stream(Direction::Rx, StreamFormat::Cs16, &[0, 1])
        .expect("rx DMA is free");
    device.activate_stream(&rx).expect("rx engine starts");
    device.activate_stream(&tx).expect("tx engine starts");

    let sent0: Vec<Complex<i16>> = (0..3 * MTU as i16).map(|k| Complex::new(k, 7)).collect();
    let sent1: Vec<Complex<i16>> = (0..3 * MTU as i16).map(|k| Complex::new(-7, -k)).collect();
    compare_result(
        &device.write_stream(&tx, &[&sent0[..], &sent1[..]], false, TIMEOUT),
        &Ok(3 * MTU),
    );

    let (mut ch0, mut ch1) = (zeros(), zeros());
    for buffer in 0..2 {
        compare_result(
            &device.read_stream(&rx, &mut [&mut ch0[..], &mut ch1[..]], TIMEOUT),
            &Ok(MTU),
        );
        let sent = buffer * MTU..(buffer + 1) * MTU;
        expect_that!(ch0.as_slice(), eq(&sent0[sent.clone()]));
        expect_that!(ch1.as_slice(), eq(&sent1[sent]));
    }
}

#[gtest]
#[rstest]
fn direct_rx_buffers(board: TestBoard) {
    let device = &board.device;
    let rx = device
        .setup_stream(Direction::Rx, StreamFormat::Cs16, &[0, 1])
        .expect("rx DMA is free");
    device.activate_stream(&rx).expect("engine starts");
    compare_result(&device.num_direct_access_buffers(&rx), &Ok(BUF_COUNT));

    compare_result(&device.acquire_read_buffer(&rx, TIMEOUT), &Ok(0));
    compare_result(
        &device.acquire_read_buffer(&rx, TIMEOUT),
        &Err("Rx buffer 0 is still held"),
    );
    compare_result(&device.release_read_buffer(&rx, 0), &Ok(()));

    compare_result(&device.acquire_read_buffer(&rx, TIMEOUT), &Ok(1));
    // Frame 0 of buffer 1: ch0 = (8, -8), ch1 = (-8, 8).
    compare_result(
        &device.read_buffer(&rx, 1, |bytes| bytes[..8].to_vec()),
        &Ok(vec![8, 0, 0xf8, 0xff, 0xf8, 0xff, 8, 0]),
    );
    compare_result(
        &device.read_buffer(&rx, 0, |bytes| bytes.len()),
        &Err("Rx buffer 0 is not held"),
    );
    compare_result(
        &device.acquire_write_buffer(&rx, TIMEOUT),
        &Err("needs a Tx stream"),
    );
    compare_result(&device.release_read_buffer(&rx, 1), &Ok(()));
    expect_that!(board.probe.dma_counts(Direction::Rx).sw_count, eq(2));
}

#[gtest]
#[rstest]
fn direct_tx_buffers(board: TestBoard) {
    let device = &board.device;
    let tx = device
        .setup_stream(Direction::Tx, StreamFormat::Cs16, &[0])
        .expect("tx DMA is free");
    device.activate_stream(&tx).expect("engine starts");
    let index = device
        .acquire_write_buffer(&tx, TIMEOUT)
        .expect("ring is empty");
    compare_result(
        &device.write_buffer(&tx, index, |bytes| {
            bytes.fill(0x11);
            bytes.len()
        }),
        &Ok(64),
    );
    compare_result(&device.release_write_buffer(&tx, index), &Ok(()));
    expect_that!(board.probe.dma_counts(Direction::Tx).sw_count, eq(1));

    // The next acquisition lets the engine pick the buffer up.
    let index = device
        .acquire_write_buffer(&tx, TIMEOUT)
        .expect("ring has room");
    expect_that!(index, eq(1));
    expect_that!(board.probe.transmitted(), each(eq(&0x11)));
}

#[gtest]
#[rstest]
fn dropping_the_device_closes_open_streams(board: TestBoard) {
    let TestBoard { device, probe } = board;
    let rx = device
        .setup_stream(Direction::Rx, StreamFormat::Cs16, &[0])
        .expect("rx DMA is free");
    let tx = device
        .setup_stream(Direction::Tx, StreamFormat::Cs16, &[0])
        .expect("tx DMA is free");
    device.activate_stream(&rx).expect("rx engine starts");
    device.activate_stream(&tx).expect("tx engine starts");

    drop(device);
    for direction in [Direction::Rx, Direction::Tx] {
        expect_that!(probe.dma_enabled(direction), eq(false));
        expect_that!(probe.dma_locked(direction), eq(false));
    }
    expect_that!(probe.live_mappings(), eq(0));
}

/// A board whose DMA interrupt never fires: waiting always lasts the whole timeout.
struct StalledLink(SimulatedPcie);

struct SleepingWaiter;

impl DmaWait for SleepingWaiter {
    fn wait_dma(&self, _direction: Direction, timeout: Duration) -> Result<bool, M2sdrError> {
        thread::sleep(timeout);
        Ok(false)
    }
}

impl PcieLink for StalledLink {
    type Region = <SimulatedPcie as PcieLink>::Region;
    type Waiter = SleepingWaiter;

    fn readl(&mut self, addr: u32) -> Result<u32, M2sdrError> {
        self.0.readl(addr)
    }

    fn writel(&mut self, addr: u32, value: u32) -> Result<(), M2sdrError> {
        self.0.writel(addr, value)
    }

    fn dma_info(&mut self) -> Result<DmaInfo, M2sdrError> {
        self.0.dma_info()
    }

    fn request_dma(&mut self, direction: Direction) -> Result<(), M2sdrError> {
        self.0.request_dma(direction)
    }

    fn release_dma(&mut self, direction: Direction) -> Result<(), M2sdrError> {
        self.0.release_dma(direction)
    }

    fn dma_engine(
        &mut self,
        direction: Direction,
        enable: bool,
    ) -> Result<DmaCounts, M2sdrError> {
        self.0.dma_engine(direction, enable)
    }

    fn update_sw_count(&mut self, direction: Direction, sw_count: i64) -> Result<(), M2sdrError> {
        self.0.update_sw_count(direction, sw_count)
    }

    fn set_dma_loopback(&mut self, enable: bool) -> Result<(), M2sdrError> {
        self.0.set_dma_loopback(enable)
    }

    fn map_dma(
        &mut self,
        direction: Direction,
        info: &DmaInfo,
    ) -> Result<Self::Region, M2sdrError> {
        self.0.map_dma(direction, info)
    }

    fn waiter(&self) -> SleepingWaiter {
        SleepingWaiter
    }
}

#[gtest]
fn settings_stay_usable_while_a_read_waits() {
    let config = DriverConfig::default();
    let link = StalledLink(SimulatedPcie::new(BUF_SIZE, BUF_COUNT, config.csr));
    let rfic = SimulatedTransceiver::new(config.oversampling);
    let device = M2sdrDevice::new(link, rfic, config).expect("simulated board initializes");
    // Loopback with nothing transmitted: the RX engine never fills a buffer.
    device.set_dma_loopback(true).expect("loopback is a CSR write");
    let rx = device
        .setup_stream(Direction::Rx, StreamFormat::Cs16, &[0])
        .expect("rx DMA is free");
    device.activate_stream(&rx).expect("engine starts");

    let wait = Duration::from_millis(500);
    thread::scope(|s| {
        let reader = s.spawn(|| {
            let mut ch0 = zeros();
            device.read_stream(&rx, &mut [&mut ch0[..]], wait)
        });
        thread::sleep(Duration::from_millis(50));
        let start = Instant::now();
        compare_result(&device.set_gain(Direction::Rx, 0, 20.0), &Ok(()));
        compare_result(&device.get_gain(Direction::Rx, 0), &Ok(20.0));
        expect_that!(start.elapsed(), lt(Duration::from_millis(250)));
        compare_result(
            &reader.join().expect("reader does not panic"),
            &Err("No Rx DMA buffer became ready"),
        );
    });
}
