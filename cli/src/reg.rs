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
use clap::Subcommand;
use log::info;
use m2sdr::{M2sdrError, PcieLink};

#[derive(Subcommand, Debug)]
pub enum RegCommands {
    /// Read a 32-bit register
    Read {
        #[arg(value_parser = parse_u32)]
        addr: u32,
    },
    /// Write a 32-bit register
    Write {
        #[arg(value_parser = parse_u32)]
        addr: u32,
        #[arg(value_parser = parse_u32)]
        value: u32,
    },
}

/// Accepts decimal or `0x` prefixed hex.
fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("'{s}' is not a 32-bit value: {e}"))
}

pub fn reg_handler<P: PcieLink>(
    device: &Device<P>,
    command: &RegCommands,
) -> Result<String, M2sdrError> {
    match *command {
        RegCommands::Read { addr } => {
            let value = device.read_register(addr)?;
            Ok(format!("{addr:#06x}: {value:#010x}"))
        }
        RegCommands::Write { addr, value } => {
            info!("Writing {value:#010x} to register {addr:#06x}");
            device.write_register(addr, value)?;
            Ok(format!("{addr:#06x} <- {value:#010x}"))
        }
    }
}
