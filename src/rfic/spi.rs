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

use crate::error::M2sdrError;
use crate::pcie::PcieLink;
use crate::pcie::csr::{CsrMap, spi};
use crate::rfic::SpiTransport;
use log::trace;
use std::time::Duration;

/// Every AD9361 register access is a 24-bit frame: 16-bit instruction then one data byte.
const SPI_FRAME_BITS: u32 = 24;

/// How many times the status register is read before a transfer is declared stuck.
const SPI_DONE_RETRIES: u32 = 1000;

/// The AD9361 SPI master of the gateware, driven through CSRs of one board.
pub struct CsrSpi<'a, P: PcieLink> {
    link: &'a mut P,
    csr: &'a CsrMap,
}

impl<'a, P: PcieLink> CsrSpi<'a, P> {
    pub fn new(link: &'a mut P, csr: &'a CsrMap) -> CsrSpi<'a, P> {
        CsrSpi { link, csr }
    }

    fn transfer(&mut self, mosi: u32) -> Result<u32, M2sdrError> {
        self.link.writel(self.csr.ad9361_spi_mosi, mosi)?;
        self.link.writel(
            self.csr.ad9361_spi_control,
            (SPI_FRAME_BITS << spi::LENGTH_SHIFT) | spi::START,
        )?;
        for attempt in 0..SPI_DONE_RETRIES {
            if self.link.readl(self.csr.ad9361_spi_status)? & spi::DONE != 0 {
                return self.link.readl(self.csr.ad9361_spi_miso);
            }
            if attempt > 10 {
                std::thread::sleep(Duration::from_micros(1));
            }
        }
        Err(M2sdrError::Spi(format!(
            "SPI master did not complete transfer {mosi:#08x} after {SPI_DONE_RETRIES} polls"
        )))
    }
}

impl<P: PcieLink> SpiTransport for CsrSpi<'_, P> {
    fn spi_write_then_read(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), M2sdrError> {
        match (tx, rx.len()) {
            ([hi, lo], 1) => {
                let cmd = u16::from_be_bytes([*hi, *lo]) & 0x7fff;
                let miso = self.transfer((cmd as u32) << 8)?;
                rx[0] = (miso & 0xff) as u8;
                trace!("AD9361 SPI read {:#05x} = {:#04x}", cmd & 0x3ff, rx[0]);
                Ok(())
            }
            ([hi, lo, data], 0) => {
                let cmd = u16::from_be_bytes([*hi, *lo]) | 0x8000;
                trace!("AD9361 SPI write {:#05x} = {data:#04x}", cmd & 0x3ff);
                self.transfer(((cmd as u32) << 8) | *data as u32)?;
                Ok(())
            }
            _ => Err(M2sdrError::Spi(format!(
                "Unsupported SPI transfer n_tx={} n_rx={}",
                tx.len(),
                rx.len()
            ))),
        }
    }
}
