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

//! DMA loopback self-test: TX samples are routed back into the RX DMA inside the FPGA, so
//! whatever is written must be read back unchanged.

use crate::Device;
use log::{debug, warn};
use m2sdr::{Direction, M2sdrError, PcieLink, StreamFormat, StreamHandle};
use num_complex::Complex;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_millis(500);

/// Test pattern of buffer `buffer`, kept within 8 bits so it survives both sample modes.
fn pattern(buffer: usize, mtu: usize) -> (Vec<Complex<i16>>, Vec<Complex<i16>>) {
    (0..mtu)
        .map(|k| {
            let v = ((buffer * mtu + k) % 256) as i16;
            let (i, q) = (v - 128, 127 - v);
            (Complex::new(i, q), Complex::new(q, i))
        })
        .unzip()
}

fn read_exact<P: PcieLink>(
    device: &Device<P>,
    rx: &StreamHandle,
    ch0: &mut [Complex<i16>],
    ch1: &mut [Complex<i16>],
) -> Result<(), M2sdrError> {
    let mut received = 0;
    while received < ch0.len() {
        received += device.read_stream(
            rx,
            &mut [&mut ch0[received..], &mut ch1[received..]],
            TIMEOUT,
        )?;
    }
    Ok(())
}

fn run_pattern<P: PcieLink>(
    device: &Device<P>,
    tx: &StreamHandle,
    rx: &StreamHandle,
    buffers: usize,
) -> Result<usize, M2sdrError> {
    device.activate_stream(rx)?;
    device.activate_stream(tx)?;
    let mtu = device.stream_mtu(tx)?;

    // One extra buffer: submitting it lets the engine consume the one before.
    for buffer in 0..=buffers {
        let (ch0, ch1) = pattern(buffer, mtu);
        let mut sent = 0;
        while sent < mtu {
            sent += device.write_stream(tx, &[&ch0[sent..], &ch1[sent..]], false, TIMEOUT)?;
        }
    }

    let mut errors = 0;
    let mut ch0 = vec![Complex::default(); mtu];
    let mut ch1 = vec![Complex::default(); mtu];
    for buffer in 0..buffers {
        read_exact(device, rx, &mut ch0, &mut ch1)?;
        let (expected0, expected1) = pattern(buffer, mtu);
        let mismatches = ch0
            .iter()
            .zip(&expected0)
            .chain(ch1.iter().zip(&expected1))
            .filter(|(got, want)| got != want)
            .count();
        if mismatches > 0 {
            warn!("Buffer {buffer}: {mismatches} samples differ");
        }
        debug!("Buffer {buffer} checked");
        errors += mismatches;
    }
    Ok(errors)
}

pub fn loopback_handler<P: PcieLink>(
    device: &Device<P>,
    buffers: usize,
) -> Result<String, M2sdrError> {
    device.set_dma_loopback(true)?;
    let tx = device.setup_stream(Direction::Tx, StreamFormat::Cs16, &[0, 1])?;
    let rx = match device.setup_stream(Direction::Rx, StreamFormat::Cs16, &[0, 1]) {
        Ok(rx) => rx,
        Err(e) => {
            device.close_stream(tx)?;
            return Err(e);
        }
    };
    let mtu = device.stream_mtu(&tx)?;
    let result = run_pattern(device, &tx, &rx, buffers);

    let closed = device.close_stream(rx).and(device.close_stream(tx));
    device.set_dma_loopback(false)?;
    let errors = result?;
    closed?;

    let samples = buffers * mtu;
    if errors > 0 {
        return Err(M2sdrError::Stream(format!(
            "Loopback corrupted {errors} of {} samples",
            2 * samples
        )));
    }
    Ok(format!(
        "Loopback OK: {buffers} buffers, {samples} samples per channel"
    ))
}
