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

//! [`PcieLink`] over the LitePCIe kernel driver.
//!
//! The ioctl structures mirror `litepcie.h` from the kernel module and must stay `repr(C)`.

use crate::error::M2sdrError;
use crate::pcie::dma::MappedRegion;
use crate::pcie::{DmaCounts, DmaInfo, DmaWait, PcieLink};
use crate::system_io::{fs_open_device, fs_poll};
use crate::types::Direction;
use log::{debug, trace};
use std::fs::File;
use std::mem::size_of;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[repr(C)]
#[derive(Debug, Default)]
struct IoctlReg {
    addr: u32,
    val: u32,
    is_write: u8,
}

#[repr(C)]
#[derive(Debug, Default)]
struct IoctlDma {
    loopback_enable: u8,
}

/// Shared by the writer (RX) and reader (TX) engine ioctls.
#[repr(C)]
#[derive(Debug, Default)]
struct IoctlDmaEngine {
    enable: u8,
    hw_count: i64,
    sw_count: i64,
}

#[repr(C)]
#[derive(Debug, Default)]
struct IoctlMmapDmaInfo {
    dma_tx_buf_offset: u64,
    dma_tx_buf_size: u64,
    dma_tx_buf_count: u64,
    dma_rx_buf_offset: u64,
    dma_rx_buf_size: u64,
    dma_rx_buf_count: u64,
}

#[repr(C)]
#[derive(Debug, Default)]
struct IoctlMmapDmaUpdate {
    sw_count: i64,
}

#[repr(C)]
#[derive(Debug, Default)]
struct IoctlLock {
    dma_reader_request: u8,
    dma_writer_request: u8,
    dma_reader_release: u8,
    dma_writer_release: u8,
    dma_reader_status: u8,
    dma_writer_status: u8,
}

const IOC_WRITE: u64 = 1;
const IOC_READ: u64 = 2;
const LITEPCIE_IOCTL: u64 = b'S' as u64;

const fn ioc(dir: u64, nr: u64, size: usize) -> u64 {
    (dir << 30) | ((size as u64) << 16) | (LITEPCIE_IOCTL << 8) | nr
}

const IOCTL_REG: u64 = ioc(IOC_READ | IOC_WRITE, 0, size_of::<IoctlReg>());
const IOCTL_DMA: u64 = ioc(IOC_WRITE, 20, size_of::<IoctlDma>());
const IOCTL_DMA_WRITER: u64 = ioc(IOC_READ | IOC_WRITE, 21, size_of::<IoctlDmaEngine>());
const IOCTL_DMA_READER: u64 = ioc(IOC_READ | IOC_WRITE, 22, size_of::<IoctlDmaEngine>());
const IOCTL_MMAP_DMA_INFO: u64 = ioc(IOC_READ, 24, size_of::<IoctlMmapDmaInfo>());
const IOCTL_MMAP_DMA_WRITER_UPDATE: u64 = ioc(IOC_WRITE, 25, size_of::<IoctlMmapDmaUpdate>());
const IOCTL_MMAP_DMA_READER_UPDATE: u64 = ioc(IOC_WRITE, 26, size_of::<IoctlMmapDmaUpdate>());
const IOCTL_LOCK: u64 = ioc(IOC_READ | IOC_WRITE, 27, size_of::<IoctlLock>());

/// An open LitePCIe device node.
#[derive(Debug)]
pub struct LitePcie {
    file: Arc<File>,
    path: PathBuf,
}

/// Polls a shared descriptor of the device node for DMA progress.
#[derive(Debug, Clone)]
pub struct LitePcieWaiter {
    file: Arc<File>,
}

impl DmaWait for LitePcieWaiter {
    fn wait_dma(&self, direction: Direction, timeout: Duration) -> Result<bool, M2sdrError> {
        let events = match direction {
            Direction::Rx => libc::POLLIN,
            Direction::Tx => libc::POLLOUT,
        };
        fs_poll(&self.file, events, timeout)
    }
}

impl LitePcie {
    /// Open the device node at `path`. The descriptor is closed when the value is dropped.
    pub fn open(path: &Path) -> Result<LitePcie, M2sdrError> {
        let file = fs_open_device(path)?;
        debug!("Opened LitePCIe device {path:?}");
        Ok(LitePcie {
            file: Arc::new(file),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ioctl<T>(&self, name: &'static str, request: u64, arg: &mut T) -> Result<(), M2sdrError> {
        trace!("ioctl {name} on {:?}", self.path);
        // SAFETY: `request` encodes size_of::<T>() and `arg` is a valid repr(C) value of that type.
        let ret = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                request as _,
                arg as *mut T as *mut libc::c_void,
            )
        };
        if ret < 0 {
            return Err(M2sdrError::Ioctl {
                request: name,
                e: std::io::Error::last_os_error(),
            });
        }
        Ok(())
    }
}

impl PcieLink for LitePcie {
    type Region = MappedRegion;
    type Waiter = LitePcieWaiter;

    fn readl(&mut self, addr: u32) -> Result<u32, M2sdrError> {
        let mut reg = IoctlReg {
            addr,
            is_write: 0,
            ..Default::default()
        };
        self.ioctl("LITEPCIE_IOCTL_REG", IOCTL_REG, &mut reg)?;
        trace!("readl({addr:#x}) = {:#x}", reg.val);
        Ok(reg.val)
    }

    fn writel(&mut self, addr: u32, value: u32) -> Result<(), M2sdrError> {
        trace!("writel({addr:#x}, {value:#x})");
        let mut reg = IoctlReg {
            addr,
            val: value,
            is_write: 1,
        };
        self.ioctl("LITEPCIE_IOCTL_REG", IOCTL_REG, &mut reg)
    }

    fn dma_info(&mut self) -> Result<DmaInfo, M2sdrError> {
        let mut info = IoctlMmapDmaInfo::default();
        self.ioctl("LITEPCIE_IOCTL_MMAP_DMA_INFO", IOCTL_MMAP_DMA_INFO, &mut info)?;
        let info = DmaInfo {
            tx_buf_offset: info.dma_tx_buf_offset,
            tx_buf_size: info.dma_tx_buf_size,
            tx_buf_count: info.dma_tx_buf_count,
            rx_buf_offset: info.dma_rx_buf_offset,
            rx_buf_size: info.dma_rx_buf_size,
            rx_buf_count: info.dma_rx_buf_count,
        };
        debug!("DMA info: {info:?}");
        Ok(info)
    }

    fn request_dma(&mut self, direction: Direction) -> Result<(), M2sdrError> {
        let mut lock = IoctlLock::default();
        match direction {
            Direction::Rx => lock.dma_writer_request = 1,
            Direction::Tx => lock.dma_reader_request = 1,
        }
        self.ioctl("LITEPCIE_IOCTL_LOCK", IOCTL_LOCK, &mut lock)?;
        let granted = match direction {
            Direction::Rx => lock.dma_writer_status,
            Direction::Tx => lock.dma_reader_status,
        };
        if granted == 0 {
            return Err(M2sdrError::Stream(format!(
                "{direction} DMA engine of {:?} is in use by another process",
                self.path
            )));
        }
        Ok(())
    }

    fn release_dma(&mut self, direction: Direction) -> Result<(), M2sdrError> {
        let mut lock = IoctlLock::default();
        match direction {
            Direction::Rx => lock.dma_writer_release = 1,
            Direction::Tx => lock.dma_reader_release = 1,
        }
        self.ioctl("LITEPCIE_IOCTL_LOCK", IOCTL_LOCK, &mut lock)
    }

    fn dma_engine(
        &mut self,
        direction: Direction,
        enable: bool,
    ) -> Result<DmaCounts, M2sdrError> {
        let mut engine = IoctlDmaEngine {
            enable: enable as u8,
            ..Default::default()
        };
        match direction {
            Direction::Rx => {
                self.ioctl("LITEPCIE_IOCTL_DMA_WRITER", IOCTL_DMA_WRITER, &mut engine)?
            }
            Direction::Tx => {
                self.ioctl("LITEPCIE_IOCTL_DMA_READER", IOCTL_DMA_READER, &mut engine)?
            }
        }
        Ok(DmaCounts {
            hw_count: engine.hw_count,
            sw_count: engine.sw_count,
        })
    }

    fn update_sw_count(&mut self, direction: Direction, sw_count: i64) -> Result<(), M2sdrError> {
        let mut update = IoctlMmapDmaUpdate { sw_count };
        match direction {
            Direction::Rx => self.ioctl(
                "LITEPCIE_IOCTL_MMAP_DMA_WRITER_UPDATE",
                IOCTL_MMAP_DMA_WRITER_UPDATE,
                &mut update,
            ),
            Direction::Tx => self.ioctl(
                "LITEPCIE_IOCTL_MMAP_DMA_READER_UPDATE",
                IOCTL_MMAP_DMA_READER_UPDATE,
                &mut update,
            ),
        }
    }

    fn set_dma_loopback(&mut self, enable: bool) -> Result<(), M2sdrError> {
        debug!("Setting DMA loopback to {enable}");
        let mut dma = IoctlDma {
            loopback_enable: enable as u8,
        };
        self.ioctl("LITEPCIE_IOCTL_DMA", IOCTL_DMA, &mut dma)
    }

    fn map_dma(
        &mut self,
        direction: Direction,
        info: &DmaInfo,
    ) -> Result<MappedRegion, M2sdrError> {
        MappedRegion::map(
            &self.file,
            direction,
            info.offset(direction),
            info.region_len(direction),
        )
    }

    fn waiter(&self) -> LitePcieWaiter {
        LitePcieWaiter {
            file: Arc::clone(&self.file),
        }
    }
}
