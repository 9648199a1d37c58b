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

//! The M2SDR device.
//!
//! [`M2sdrDevice`] owns the PCIe link, the transceiver handle, the settings cache and the two
//! stream slots behind one mutex. All methods take `&self`, so a device can be shared between
//! a control thread and streaming threads; calls are serialized, except that a stream call
//! waiting for DMA progress does so with the mutex released.
//!
//! The API is split over submodules by concern:
//! * [`identification`] - driver/hardware keys, channels, serial number, registers
//! * [`settings`] - antennas, gains, frequencies, sample rates, bandwidths, clocking
//! * [`sensors`] - XADC and transceiver sensors
//! * [`streaming`] - stream lifecycle, sample I/O and direct buffer access

pub mod identification;
pub mod sensors;
pub mod settings;
pub mod streaming;

use crate::config::DriverConfig;
use crate::device::settings::SettingsCache;
use crate::error::M2sdrError;
use crate::pcie::{DmaInfo, LitePcie, PcieLink};
use crate::rfic::{CsrSpi, RfTransceiver, SpiTransport};
use crate::stream::DmaStream;
use crate::types::{Direction, SampleFormat};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Number of RX and of TX channels.
pub const NUM_CHANNELS: usize = 2;

/// Fields of the AD9361 config CSR.
mod ad9361_config {
    pub const RST_N: u32 = 1 << 0;
    pub const ENABLE: u32 = 1 << 1;
    pub const TXNRX: u32 = 1 << 4;
}

/// Construction arguments, usually coming from a `key=value` device string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceArgs {
    pub path: PathBuf,
    pub bypass_init: bool,
}

impl DeviceArgs {
    /// Parse `path` (required) and `bypass_init` (optional; present means bypass unless the
    /// value starts with `'0'`, so an empty value bypasses too).
    pub fn from_kwargs(kwargs: &HashMap<String, String>) -> Result<DeviceArgs, M2sdrError> {
        let path = kwargs.get("path").ok_or_else(|| {
            M2sdrError::Argument("No LitePCIe device path given, expected a 'path' argument".into())
        })?;
        let bypass_init = kwargs
            .get("bypass_init")
            .is_some_and(|v| !v.starts_with('0'));
        Ok(DeviceArgs {
            path: PathBuf::from(path),
            bypass_init,
        })
    }

    pub fn from_config(config: &DriverConfig) -> DeviceArgs {
        DeviceArgs {
            path: config.device_path.clone(),
            bypass_init: config.bypass_init,
        }
    }
}

pub(crate) struct DeviceState<P: PcieLink, R: RfTransceiver> {
    pub(crate) link: P,
    pub(crate) rfic: R,
    pub(crate) config: DriverConfig,
    pub(crate) dma_info: DmaInfo,
    pub(crate) mode: SampleFormat,
    pub(crate) settings: SettingsCache,
    pub(crate) rx: Option<DmaStream<P::Region>>,
    pub(crate) tx: Option<DmaStream<P::Region>>,
    pub(crate) next_stream_id: u64,
}

impl<P: PcieLink, R: RfTransceiver> DeviceState<P, R> {
    /// Run `f` against the transceiver with the SPI master of this board as its context.
    pub(crate) fn with_rfic<T>(
        &mut self,
        f: impl FnOnce(&mut R, &mut dyn SpiTransport) -> Result<T, M2sdrError>,
    ) -> Result<T, M2sdrError> {
        let mut spi = CsrSpi::new(&mut self.link, &self.config.csr);
        f(&mut self.rfic, &mut spi)
    }

    pub(crate) fn stream_slot(
        &mut self,
        direction: Direction,
    ) -> &mut Option<DmaStream<P::Region>> {
        match direction {
            Direction::Rx => &mut self.rx,
            Direction::Tx => &mut self.tx,
        }
    }

    /// Program the gateware sample format and propagate it to open streams.
    pub(crate) fn apply_sample_mode(&mut self) -> Result<(), M2sdrError> {
        self.mode = self.config.sample_format;
        self.link
            .writel(self.config.csr.ad9361_format, self.mode.format_register())?;
        for stream in [&mut self.rx, &mut self.tx].into_iter().flatten() {
            stream.set_sample_mode(self.mode);
        }
        Ok(())
    }
}

pub struct M2sdrDevice<P: PcieLink, R: RfTransceiver> {
    state: Mutex<DeviceState<P, R>>,
}

impl<R: RfTransceiver> M2sdrDevice<LitePcie, R> {
    /// Open the board at `args.path`. `args` wins over the device section of `config`.
    pub fn open(
        args: &DeviceArgs,
        mut config: DriverConfig,
        rfic: R,
    ) -> Result<M2sdrDevice<LitePcie, R>, M2sdrError> {
        config.device_path = args.path.clone();
        config.bypass_init = args.bypass_init;
        let link = LitePcie::open(&args.path)?;
        M2sdrDevice::new(link, rfic, config)
    }
}

impl<P: PcieLink, R: RfTransceiver> M2sdrDevice<P, R> {
    /// Bring up the board behind `link`.
    ///
    /// Unless `config.bypass_init` is set this releases the transceiver from reset, fully
    /// initializes it and applies default settings on both channels. Any failure drops `link`
    /// and `rfic`; no partially initialized device is returned.
    pub fn new(
        mut link: P,
        mut rfic: R,
        config: DriverConfig,
    ) -> Result<M2sdrDevice<P, R>, M2sdrError> {
        info!("Initializing M2SDR on {:?}", config.device_path);
        let csr = config.csr;
        let do_init = !config.bypass_init;

        link.writel(csr.ad9361_format, config.sample_format.format_register())?;
        link.writel(csr.pcie_dma0_synchronizer_bypass, 1)?;

        if do_init {
            // The Si5351 is programmed by the gateware's I2C sequencer; only the transceiver
            // needs a reset pulse from here.
            debug!("Releasing AD9361 from reset");
            link.writel(csr.ad9361_config, 0)?;
            std::thread::sleep(Duration::from_millis(1));
            link.writel(
                csr.ad9361_config,
                ad9361_config::RST_N | ad9361_config::ENABLE | ad9361_config::TXNRX,
            )?;
            std::thread::sleep(Duration::from_millis(1));
        } else {
            info!("Bypassing initialization, keeping the current board state");
        }

        rfic.initialize(&mut CsrSpi::new(&mut link, &csr), do_init)?;
        let dma_info = link.dma_info()?;

        let device = M2sdrDevice {
            state: Mutex::new(DeviceState {
                link,
                rfic,
                mode: config.sample_format,
                config,
                dma_info,
                settings: SettingsCache::default(),
                rx: None,
                tx: None,
                next_stream_id: 0,
            }),
        };
        if do_init {
            device.apply_defaults()?;
        }
        info!("M2SDR initialization complete, serial {}", device.serial()?);
        Ok(device)
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, DeviceState<P, R>>, M2sdrError> {
        self.state
            .lock()
            .map_err(|_| M2sdrError::Internal("M2SDR device lock is poisoned".into()))
    }

    /// The configuration the device was built with.
    pub fn config(&self) -> Result<DriverConfig, M2sdrError> {
        Ok(self.lock()?.config.clone())
    }

    /// Route the TX DMA stream back into the RX DMA stream inside the FPGA.
    pub fn set_dma_loopback(&self, enable: bool) -> Result<(), M2sdrError> {
        debug!("set_dma_loopback({enable})");
        self.lock()?.link.set_dma_loopback(enable)
    }
}

pub(crate) fn check_channel(channel: usize) -> Result<(), M2sdrError> {
    if channel >= NUM_CHANNELS {
        return Err(M2sdrError::Argument(format!(
            "Channel {channel} does not exist, the M2SDR has {NUM_CHANNELS} channels"
        )));
    }
    Ok(())
}

impl<P: PcieLink, R: RfTransceiver> Drop for M2sdrDevice<P, R> {
    fn drop(&mut self) {
        info!("Power down and cleanup");
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        for direction in [Direction::Rx, Direction::Tx] {
            let Some(stream) = state.stream_slot(direction).take() else {
                continue;
            };
            if let Err(e) = stream.close(&mut state.link) {
                warn!("Closing the {direction} stream during cleanup failed: {e}");
            }
        }
    }
}
