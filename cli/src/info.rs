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
use m2sdr::{Direction, M2sdrError, PcieLink};

/// one line per channel: `dir | ch | freq | rate | bw | gain`
fn channel_line<P: PcieLink>(
    device: &Device<P>,
    direction: Direction,
    channel: usize,
) -> Result<String, M2sdrError> {
    Ok(format!(
        "{direction} | {channel} | {:.3} | {:.3} | {:.3} | {:.2}",
        device.get_frequency(direction, channel)? / 1e6,
        device.get_sample_rate(direction, channel)? / 1e6,
        device.get_bandwidth(direction, channel)? / 1e6,
        device.get_gain(direction, channel)?,
    ))
}

/// gets identification and per channel settings and returns an ascii table as String
pub fn info_handler<P: PcieLink>(device: &Device<P>) -> Result<String, M2sdrError> {
    let mut ret_string = String::from("---- DEVICE ----\n");
    ret_string += &format!(
        "driver: {}\nhardware: {}\n",
        device.driver_key(),
        device.hardware_key()
    );
    for (key, value) in device.hardware_info()? {
        ret_string += &format!("{key}: {value}\n");
    }
    ret_string += &format!("clock source: {}\n", device.get_clock_source()?);

    ret_string += "\n---- CHANNELS ----\n";
    ret_string += "| dir | ch | freq [MHz] | rate [MS/s] | bw [MHz] | gain [dB] |\n";
    for direction in [Direction::Rx, Direction::Tx] {
        for channel in 0..device.num_channels(direction) {
            ret_string += &channel_line(device, direction, channel)?;
            ret_string.push('\n');
        }
    }
    Ok(ret_string)
}
