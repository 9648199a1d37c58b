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

//! Gateware control/status register addresses.
//!
//! LiteX gives every CSR block its own 0x800 byte page, indexed by the `csr_map` of the SoC,
//! and lays out the registers of a block as consecutive 32-bit words in creation order. The
//! defaults below follow the stock M2SDR build; other gateware can override any address in the
//! `[csr]` section of the config file.

/// Size of one CSR block.
pub const CSR_PAGE: u32 = 0x800;

/// Block indices of the stock `csr_map`.
pub mod block {
    pub const CTRL: u32 = 0;
    /// Not pinned by the `csr_map`; LiteX allocates the first free slot. Slot 3 stays free
    /// because `flash` is listed twice and keeps slot 6.
    pub const IDENTIFIER_MEM: u32 = 3;
    pub const XADC: u32 = 4;
    pub const DNA: u32 = 5;
    pub const PCIE_DMA0: u32 = 12;
    pub const SI5351_I2C: u32 = 20;
    pub const TIMESTAMP: u32 = 22;
    pub const AD9361: u32 = 24;
}

/// Byte address of 32-bit word `word` of CSR block `block`.
pub const fn csr_addr(block: u32, word: u32) -> u32 {
    block * CSR_PAGE + 4 * word
}

/// Byte addresses of the CSRs the driver touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsrMap {
    pub ctrl_scratch: u32,
    /// Two consecutive words: DNA high then DNA low.
    pub dna_id: u32,
    pub xadc_temperature: u32,
    pub xadc_vccint: u32,
    pub xadc_vccaux: u32,
    pub xadc_vccbram: u32,
    /// One character per 32-bit word, zero terminated.
    pub identifier_mem: u32,
    /// Bit 0 releases the transceiver reset (active low).
    pub ad9361_config: u32,
    /// The `bitmode` register: 0 for 16-bit, 1 for 8-bit samples.
    pub ad9361_format: u32,
    pub ad9361_spi_control: u32,
    pub ad9361_spi_status: u32,
    pub ad9361_spi_mosi: u32,
    pub ad9361_spi_miso: u32,
    pub pcie_dma0_synchronizer_bypass: u32,
}

impl Default for CsrMap {
    fn default() -> Self {
        CsrMap {
            // reset, scratch, bus_errors
            ctrl_scratch: csr_addr(block::CTRL, 1),
            dna_id: csr_addr(block::DNA, 0),
            xadc_temperature: csr_addr(block::XADC, 0),
            xadc_vccint: csr_addr(block::XADC, 1),
            xadc_vccaux: csr_addr(block::XADC, 2),
            xadc_vccbram: csr_addr(block::XADC, 3),
            identifier_mem: csr_addr(block::IDENTIFIER_MEM, 0),
            // config, ctrl, stat, bitmode, then the SPI master
            ad9361_config: csr_addr(block::AD9361, 0),
            ad9361_format: csr_addr(block::AD9361, 3),
            ad9361_spi_control: csr_addr(block::AD9361, 4),
            ad9361_spi_status: csr_addr(block::AD9361, 5),
            ad9361_spi_mosi: csr_addr(block::AD9361, 6),
            ad9361_spi_miso: csr_addr(block::AD9361, 7),
            // writer (enable + 7 table words), reader (same), loopback enable, then the
            // synchronizer
            pcie_dma0_synchronizer_bypass: csr_addr(block::PCIE_DMA0, 17),
        }
    }
}

/// Length of the identifier memory in characters.
pub const IDENTIFIER_MEM_LEN: u32 = 256;

/// Control register layout of the LiteX SPI master.
pub mod spi {
    pub const START: u32 = 1 << 0;
    pub const LENGTH_SHIFT: u32 = 8;
    pub const DONE: u32 = 1 << 0;
}
