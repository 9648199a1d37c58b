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
use m2sdr::{M2sdrError, PcieLink};

fn sensor_line<P: PcieLink>(device: &Device<P>, key: &str) -> Result<String, M2sdrError> {
    let info = device.sensor_info(key)?;
    let value = device.read_sensor(key)?;
    Ok(format!("{key}: {value} {} ({})", info.units, info.description))
}

/// Reads `key`, or every sensor the board has when no key is given.
pub fn sensor_handler<P: PcieLink>(
    device: &Device<P>,
    key: Option<&str>,
) -> Result<String, M2sdrError> {
    match key {
        Some(key) => sensor_line(device, key),
        None => {
            let lines = device
                .list_sensors()?
                .iter()
                .map(|key| sensor_line(device, key))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(lines.join("\n"))
        }
    }
}
