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

use crate::Device;
use clap::Args;
use log::{info, warn};
use m2sdr::{Direction, M2sdrError, PcieLink, StreamFormat};
use num_complex::Complex32;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct CaptureArgs {
    #[arg(long, default_value_t = 0)]
    channel: usize,
    /// Number of complex samples to receive
    #[arg(long, default_value_t = 16384)]
    samples: usize,
    /// Sample rate in samples per second
    #[arg(long, default_value_t = 30.72e6)]
    rate: f64,
    /// LO frequency in Hz
    #[arg(long, default_value_t = 2.4e9)]
    frequency: f64,
    /// Receive gain in dB
    #[arg(long, default_value_t = 0.0)]
    gain: f64,
    #[arg(long = "timeout-ms", default_value_t = 100)]
    timeout_ms: u64,
    #[arg(
        long,
        help = "Write the samples to this file as interleaved little-endian f32 I/Q"
    )]
    output: Option<PathBuf>,
}

/// Mean power in dB relative to full scale.
fn mean_power_dbfs(samples: &[Complex32]) -> f64 {
    if samples.is_empty() {
        return f64::NEG_INFINITY;
    }
    let power: f64 = samples.iter().map(|s| s.norm_sqr() as f64).sum();
    10.0 * (power / samples.len() as f64).log10()
}

fn to_le_bytes(samples: &[Complex32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|s| [s.re.to_le_bytes(), s.im.to_le_bytes()])
        .flatten()
        .collect()
}

fn receive<P: PcieLink>(
    device: &Device<P>,
    args: &CaptureArgs,
    samples: &mut [Complex32],
) -> Result<(), M2sdrError> {
    let rx = device.setup_stream(Direction::Rx, StreamFormat::Cf32, &[args.channel])?;
    device.activate_stream(&rx)?;
    let timeout = Duration::from_millis(args.timeout_ms);
    let mut received = 0;
    let result = loop {
        if received == samples.len() {
            break Ok(());
        }
        match device.read_stream(&rx, &mut [&mut samples[received..]], timeout) {
            Ok(n) => received += n,
            Err(M2sdrError::Overflow { dropped }) => {
                warn!("Overflow after {received} samples, {dropped} buffers lost")
            }
            Err(e) => break Err(e),
        }
    };
    let closed = device.close_stream(rx);
    result.and(closed)
}

pub fn capture_handler<P: PcieLink>(
    device: &Device<P>,
    args: &CaptureArgs,
) -> Result<String, M2sdrError> {
    device.set_sample_rate(Direction::Rx, args.channel, args.rate)?;
    device.set_frequency(Direction::Rx, args.channel, args.frequency)?;
    device.set_gain(Direction::Rx, args.channel, args.gain)?;

    let mut samples = vec![Complex32::default(); args.samples];
    receive(device, args, &mut samples)?;
    info!("Captured {} samples on RX ch{}", samples.len(), args.channel);

    if let Some(path) = &args.output {
        std::fs::write(path, to_le_bytes(&samples)).map_err(|e| {
            M2sdrError::Internal(format!("Failed to write samples to {path:?}: {e}"))
        })?;
    }
    Ok(format!(
        "Captured {} samples on RX ch{} at {:.3} MS/s, mean power {:.1} dBFS",
        samples.len(),
        args.channel,
        device.get_sample_rate(Direction::Rx, args.channel)? / 1e6,
        mean_power_dbfs(&samples)
    ))
}
