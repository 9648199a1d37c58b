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

//! TOML config file format.
//!
//! ```toml
//! [device]
//! path = "/dev/m2sdr0"
//! bypass_init = false
//!
//! [streaming]
//! sample_format = "sc16"   # or "sc8"
//! rate_multiplier = 1
//! oversampling = false
//!
//! [board]
//! xadc = true
//!
//! [csr]
//! ad9361_format = 0xc00c
//! ```
//!
//! Every field is optional. Missing fields fall through to the next config layer.

use crate::config::{DEFAULT_DEVICE_PATH, DEFAULT_RATE_MULTIPLIER, DriverConfig};
use crate::error::M2sdrError;
use crate::pcie::csr::CsrMap;
use crate::system_io::fs_read;
use crate::types::SampleFormat;
use log::{trace, warn};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// This is the top level struct which holds all sections
#[derive(Debug, Default, Deserialize)]
pub(crate) struct TomlConfig {
    device: Option<DeviceSection>,
    streaming: Option<StreamingSection>,
    board: Option<BoardSection>,
    csr: Option<CsrSection>,
}

#[derive(Debug, Default, Deserialize)]
struct DeviceSection {
    path: Option<String>,
    bypass_init: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamingSection {
    sample_format: Option<SampleFormat>,
    rate_multiplier: Option<u32>,
    oversampling: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct BoardSection {
    xadc: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct CsrSection {
    ctrl_scratch: Option<u32>,
    dna_id: Option<u32>,
    xadc_temperature: Option<u32>,
    xadc_vccint: Option<u32>,
    xadc_vccaux: Option<u32>,
    xadc_vccbram: Option<u32>,
    identifier_mem: Option<u32>,
    ad9361_config: Option<u32>,
    ad9361_format: Option<u32>,
    ad9361_spi_control: Option<u32>,
    ad9361_spi_status: Option<u32>,
    ad9361_spi_mosi: Option<u32>,
    ad9361_spi_miso: Option<u32>,
    pcie_dma0_synchronizer_bypass: Option<u32>,
}

impl DeviceSection {
    fn merge(self, fallback: DeviceSection) -> DeviceSection {
        DeviceSection {
            path: self.path.or(fallback.path),
            bypass_init: self.bypass_init.or(fallback.bypass_init),
        }
    }
}

impl StreamingSection {
    fn merge(self, fallback: StreamingSection) -> StreamingSection {
        StreamingSection {
            sample_format: self.sample_format.or(fallback.sample_format),
            rate_multiplier: self.rate_multiplier.or(fallback.rate_multiplier),
            oversampling: self.oversampling.or(fallback.oversampling),
        }
    }
}

impl BoardSection {
    fn merge(self, fallback: BoardSection) -> BoardSection {
        BoardSection {
            xadc: self.xadc.or(fallback.xadc),
        }
    }
}

impl CsrSection {
    fn merge(self, fallback: CsrSection) -> CsrSection {
        CsrSection {
            ctrl_scratch: self.ctrl_scratch.or(fallback.ctrl_scratch),
            dna_id: self.dna_id.or(fallback.dna_id),
            xadc_temperature: self.xadc_temperature.or(fallback.xadc_temperature),
            xadc_vccint: self.xadc_vccint.or(fallback.xadc_vccint),
            xadc_vccaux: self.xadc_vccaux.or(fallback.xadc_vccaux),
            xadc_vccbram: self.xadc_vccbram.or(fallback.xadc_vccbram),
            identifier_mem: self.identifier_mem.or(fallback.identifier_mem),
            ad9361_config: self.ad9361_config.or(fallback.ad9361_config),
            ad9361_format: self.ad9361_format.or(fallback.ad9361_format),
            ad9361_spi_control: self.ad9361_spi_control.or(fallback.ad9361_spi_control),
            ad9361_spi_status: self.ad9361_spi_status.or(fallback.ad9361_spi_status),
            ad9361_spi_mosi: self.ad9361_spi_mosi.or(fallback.ad9361_spi_mosi),
            ad9361_spi_miso: self.ad9361_spi_miso.or(fallback.ad9361_spi_miso),
            pcie_dma0_synchronizer_bypass: self
                .pcie_dma0_synchronizer_bypass
                .or(fallback.pcie_dma0_synchronizer_bypass),
        }
    }

    fn into_csr_map(self) -> CsrMap {
        let d = CsrMap::default();
        CsrMap {
            ctrl_scratch: self.ctrl_scratch.unwrap_or(d.ctrl_scratch),
            dna_id: self.dna_id.unwrap_or(d.dna_id),
            xadc_temperature: self.xadc_temperature.unwrap_or(d.xadc_temperature),
            xadc_vccint: self.xadc_vccint.unwrap_or(d.xadc_vccint),
            xadc_vccaux: self.xadc_vccaux.unwrap_or(d.xadc_vccaux),
            xadc_vccbram: self.xadc_vccbram.unwrap_or(d.xadc_vccbram),
            identifier_mem: self.identifier_mem.unwrap_or(d.identifier_mem),
            ad9361_config: self.ad9361_config.unwrap_or(d.ad9361_config),
            ad9361_format: self.ad9361_format.unwrap_or(d.ad9361_format),
            ad9361_spi_control: self.ad9361_spi_control.unwrap_or(d.ad9361_spi_control),
            ad9361_spi_status: self.ad9361_spi_status.unwrap_or(d.ad9361_spi_status),
            ad9361_spi_mosi: self.ad9361_spi_mosi.unwrap_or(d.ad9361_spi_mosi),
            ad9361_spi_miso: self.ad9361_spi_miso.unwrap_or(d.ad9361_spi_miso),
            pcie_dma0_synchronizer_bypass: self
                .pcie_dma0_synchronizer_bypass
                .unwrap_or(d.pcie_dma0_synchronizer_bypass),
        }
    }
}

fn merge_section<T: Default>(
    preferred: Option<T>,
    fallback: Option<T>,
    merge: fn(T, T) -> T,
) -> Option<T> {
    match (preferred, fallback) {
        (Some(p), Some(f)) => Some(merge(p, f)),
        (p, f) => p.or(f),
    }
}

impl TomlConfig {
    /// Field-by-field merge where values from `self` win over `fallback`.
    pub(crate) fn merge(self, fallback: TomlConfig) -> TomlConfig {
        TomlConfig {
            device: merge_section(self.device, fallback.device, DeviceSection::merge),
            streaming: merge_section(self.streaming, fallback.streaming, StreamingSection::merge),
            board: merge_section(self.board, fallback.board, BoardSection::merge),
            csr: merge_section(self.csr, fallback.csr, CsrSection::merge),
        }
    }

    pub(crate) fn into_driver_config(self) -> DriverConfig {
        let device = self.device.unwrap_or_default();
        let streaming = self.streaming.unwrap_or_default();
        let board = self.board.unwrap_or_default();
        let rate_multiplier = match streaming.rate_multiplier {
            Some(0) => {
                warn!("rate_multiplier must be at least 1. Using hardcoded value.");
                DEFAULT_RATE_MULTIPLIER
            }
            Some(m) => m,
            None => {
                trace!("No rate_multiplier provided. Using hardcoded value.");
                DEFAULT_RATE_MULTIPLIER
            }
        };
        DriverConfig {
            device_path: PathBuf::from(device.path.unwrap_or_else(|| {
                trace!("No device path provided. Using hardcoded value.");
                DEFAULT_DEVICE_PATH.to_string()
            })),
            bypass_init: device.bypass_init.unwrap_or(false),
            sample_format: streaming.sample_format.unwrap_or_default(),
            rate_multiplier,
            oversampling: streaming.oversampling.unwrap_or(false),
            xadc: board.xadc.unwrap_or(true),
            csr: self.csr.unwrap_or_default().into_csr_map(),
        }
    }
}

pub(crate) fn toml_str_to_config(toml_string: &str) -> Result<TomlConfig, M2sdrError> {
    toml::from_str(toml_string).map_err(|e| M2sdrError::TomlDe {
        toml_string: toml_string.into(),
        e,
    })
}

pub(crate) fn config_from_file(file_path: &Path) -> Result<TomlConfig, M2sdrError> {
    if !file_path.is_file() {
        return Err(M2sdrError::Internal(format!(
            "Config file not found in {file_path:?}"
        )));
    }
    toml_str_to_config(&fs_read(file_path)?)
}
