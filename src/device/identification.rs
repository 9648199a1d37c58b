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

use crate::device::{M2sdrDevice, NUM_CHANNELS};
use crate::error::M2sdrError;
use crate::pcie::PcieLink;
use crate::pcie::csr::IDENTIFIER_MEM_LEN;
use crate::rfic::RfTransceiver;
use crate::types::Direction;
use log::trace;
use std::collections::BTreeMap;

pub const DRIVER_KEY: &str = "LiteX-M2SDR";
pub const HARDWARE_KEY: &str = "R01";

impl<P: PcieLink, R: RfTransceiver> M2sdrDevice<P, R> {
    pub fn driver_key(&self) -> &'static str {
        DRIVER_KEY
    }

    pub fn hardware_key(&self) -> &'static str {
        HARDWARE_KEY
    }

    pub fn num_channels(&self, _direction: Direction) -> usize {
        NUM_CHANNELS
    }

    pub fn full_duplex(&self, _direction: Direction, _channel: usize) -> bool {
        true
    }

    /// The FPGA DNA as hex, unique per board.
    pub fn serial(&self) -> Result<String, M2sdrError> {
        let mut state = self.lock()?;
        let addr = state.config.csr.dna_id;
        let high = state.link.readl(addr)? as u64;
        let low = state.link.readl(addr + 4)? as u64;
        Ok(format!("{:x}", (high << 32) | low))
    }

    /// The identification string baked into the gateware.
    pub fn fpga_identification(&self) -> Result<String, M2sdrError> {
        let mut state = self.lock()?;
        let base = state.config.csr.identifier_mem;
        let mut identifier = String::new();
        for i in 0..IDENTIFIER_MEM_LEN {
            let c = state.link.readl(base + 4 * i)? as u8;
            if c == 0 {
                break;
            }
            identifier.push(c as char);
        }
        trace!("FPGA identification: {identifier}");
        Ok(identifier)
    }

    /// Key/value summary of the board.
    pub fn hardware_info(&self) -> Result<BTreeMap<String, String>, M2sdrError> {
        let mut info = BTreeMap::new();
        info.insert("serial".to_string(), self.serial()?);
        info.insert("identification".to_string(), self.fpga_identification()?);
        info.insert(
            "device_path".to_string(),
            self.lock()?.config.device_path.display().to_string(),
        );
        Ok(info)
    }

    /// Read a 32-bit gateware CSR.
    pub fn read_register(&self, addr: u32) -> Result<u32, M2sdrError> {
        self.lock()?.link.readl(addr)
    }

    pub fn write_register(&self, addr: u32, value: u32) -> Result<(), M2sdrError> {
        self.lock()?.link.writel(addr, value)
    }
}
