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

//! Board sensors.
//!
//! Keys are `<device>_<metric>`: `fpga_temp`, `fpga_vccint`, `fpga_vccaux`, `fpga_vccbram`
//! (XADC, only when present in the gateware) and `ad9361_temp`.

use crate::device::M2sdrDevice;
use crate::error::M2sdrError;
use crate::pcie::PcieLink;
use crate::rfic::RfTransceiver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensor {
    FpgaTemp,
    FpgaVccint,
    FpgaVccaux,
    FpgaVccbram,
    Ad9361Temp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorType {
    Float,
}

/// Description of a sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorInfo {
    /// The metric part of the sensor key.
    pub key: String,
    pub value: String,
    pub units: String,
    pub description: String,
    pub kind: SensorType,
}

const XADC_SENSORS: [&str; 4] = ["fpga_temp", "fpga_vccint", "fpga_vccaux", "fpga_vccbram"];
const RFIC_SENSORS: [&str; 1] = ["ad9361_temp"];

impl Sensor {
    /// Look up `key`, considering the XADC sensors only if `xadc` is set.
    pub fn from_key(key: &str, xadc: bool) -> Result<Sensor, M2sdrError> {
        let (device, metric) = key
            .split_once('_')
            .ok_or_else(|| M2sdrError::Argument(format!("Sensor {key}: unknown key")))?;
        match device {
            "fpga" if xadc => match metric {
                "temp" => Ok(Sensor::FpgaTemp),
                "vccint" => Ok(Sensor::FpgaVccint),
                "vccaux" => Ok(Sensor::FpgaVccaux),
                "vccbram" => Ok(Sensor::FpgaVccbram),
                _ => Err(M2sdrError::Argument(format!("Sensor {key}: unknown sensor"))),
            },
            "ad9361" => match metric {
                "temp" => Ok(Sensor::Ad9361Temp),
                _ => Err(M2sdrError::Argument(format!("Sensor {key}: unknown sensor"))),
            },
            _ => Err(M2sdrError::Argument(format!("Sensor {key}: unknown device"))),
        }
    }

    pub fn info(&self) -> SensorInfo {
        let (key, units, description) = match self {
            Sensor::FpgaTemp => ("temp", "°C", "FPGA temperature"),
            Sensor::FpgaVccint => ("vccint", "V", "FPGA internal supply voltage"),
            Sensor::FpgaVccaux => ("vccaux", "V", "FPGA auxiliary supply voltage"),
            Sensor::FpgaVccbram => ("vccbram", "V", "FPGA block RAM supply voltage"),
            Sensor::Ad9361Temp => ("temp", "°C", "AD9361 temperature"),
        };
        SensorInfo {
            key: key.to_string(),
            value: "0.0".to_string(),
            units: units.to_string(),
            description: description.to_string(),
            kind: SensorType::Float,
        }
    }
}

pub fn xadc_temperature(raw: u32) -> f64 {
    raw as f64 * 503.975 / 4096.0 - 273.15
}

pub fn xadc_voltage(raw: u32) -> f64 {
    raw as f64 / 4096.0 * 3.0
}

impl<P: PcieLink, R: RfTransceiver> M2sdrDevice<P, R> {
    pub fn list_sensors(&self) -> Result<Vec<String>, M2sdrError> {
        let xadc = self.lock()?.config.xadc;
        let xadc_sensors = if xadc { &XADC_SENSORS[..] } else { &[] };
        Ok(xadc_sensors
            .iter()
            .chain(RFIC_SENSORS.iter())
            .map(|s| s.to_string())
            .collect())
    }

    pub fn sensor_info(&self, key: &str) -> Result<SensorInfo, M2sdrError> {
        let xadc = self.lock()?.config.xadc;
        Ok(Sensor::from_key(key, xadc)?.info())
    }

    /// Read a sensor, formatted with six decimals for XADC values and as an integer for the
    /// transceiver temperature.
    pub fn read_sensor(&self, key: &str) -> Result<String, M2sdrError> {
        let mut state = self.lock()?;
        let csr = state.config.csr;
        let sensor = Sensor::from_key(key, state.config.xadc)?;
        let value = match sensor {
            Sensor::FpgaTemp => {
                let raw = state.link.readl(csr.xadc_temperature)?;
                format!("{:.6}", xadc_temperature(raw))
            }
            Sensor::FpgaVccint | Sensor::FpgaVccaux | Sensor::FpgaVccbram => {
                let addr = match sensor {
                    Sensor::FpgaVccint => csr.xadc_vccint,
                    Sensor::FpgaVccaux => csr.xadc_vccaux,
                    _ => csr.xadc_vccbram,
                };
                format!("{:.6}", xadc_voltage(state.link.readl(addr)?))
            }
            Sensor::Ad9361Temp => {
                let millicelsius = state.with_rfic(|rfic, spi| rfic.temperature(spi))?;
                (millicelsius / 1000).to_string()
            }
        };
        Ok(value)
    }
}
