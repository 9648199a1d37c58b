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

//! Driver configuration.
//!
//! Hardcoded defaults live here. They can be overridden by a vendor config file
//! (`/usr/lib/m2sdr/config.toml`), which in turn is overridden by the user config file
//! (`/etc/m2sdr/config.toml`). See [`config_files`] for the file format.

pub mod config_files;

use crate::config::config_files::{TomlConfig, config_from_file};
use crate::pcie::csr::CsrMap;
use crate::types::SampleFormat;
use log::{trace, warn};
use std::path::{Path, PathBuf};

/// The device node created by the LitePCIe kernel driver for the first board.
pub static DEFAULT_DEVICE_PATH: &str = "/dev/m2sdr0";

/// Config shipped by the distribution package.
pub static VENDOR_CONFIG_PATH: &str = "/usr/lib/m2sdr/config.toml";

/// Config edited by the administrator; wins over the vendor config.
pub static USER_CONFIG_PATH: &str = "/etc/m2sdr/config.toml";

/// Ratio between the sample rate seen by the host and the one programmed into the transceiver.
pub const DEFAULT_RATE_MULTIPLIER: u32 = 1;

/// Fully resolved driver configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverConfig {
    pub device_path: PathBuf,
    /// Skip clock and transceiver initialization, keeping whatever state the board is in.
    pub bypass_init: bool,
    pub sample_format: SampleFormat,
    pub rate_multiplier: u32,
    /// Program the transceiver oversampling registers after each sample rate change.
    pub oversampling: bool,
    /// Whether the gateware includes the XADC block (enables the `fpga_*` sensors).
    pub xadc: bool,
    pub csr: CsrMap,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            device_path: PathBuf::from(DEFAULT_DEVICE_PATH),
            bypass_init: false,
            sample_format: SampleFormat::default(),
            rate_multiplier: DEFAULT_RATE_MULTIPLIER,
            oversampling: false,
            xadc: true,
            csr: CsrMap::default(),
        }
    }
}

impl DriverConfig {
    /// User config overrides vendor config and vendor config overrides hardcoded defaults.
    pub fn load() -> DriverConfig {
        DriverConfig::load_from(Path::new(VENDOR_CONFIG_PATH), Path::new(USER_CONFIG_PATH))
    }

    pub fn load_from(vendor_path: &Path, user_path: &Path) -> DriverConfig {
        let vendor_config = config_from_file(vendor_path).unwrap_or_else(|e| {
            warn!("Using hardcoded values for vendor config because loading config failed: {e}");
            TomlConfig::default()
        });
        let user_config = config_from_file(user_path).unwrap_or_else(|e| {
            warn!("Using hardcoded values for user config because loading config failed: {e}");
            TomlConfig::default()
        });
        trace!("Merging user_config: {user_config:?} with vendor_config {vendor_config:?}");
        let merged = user_config.merge(vendor_config);
        let ret = merged.into_driver_config();
        trace!("Resulting config: {ret:?}");
        ret
    }
}
