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

//! In-memory model of an M2SDR board behind LitePCIe.
//!
//! Useful for running the driver without hardware. The model keeps a CSR file, answers the
//! AD9361 SPI master from a 1024-entry register file that reports an AD9361 product ID, and
//! runs both DMA engines against heap-backed rings:
//!
//! * every counter poll of an already running RX engine completes `rx_burst` buffers, filled
//!   with a ramp or, with loopback enabled, with buffers previously consumed by the TX engine;
//! * every counter poll of an already running TX engine consumes up to `tx_burst` published
//!   buffers.
//!
//! A [`SimulatedPcieProbe`] shares the model state so callers can inspect and steer it after
//! the link has been moved into a device.

use crate::error::M2sdrError;
use crate::pcie::csr::{CsrMap, IDENTIFIER_MEM_LEN, spi};
use crate::pcie::{DmaCounts, DmaInfo, DmaRegion, DmaWait, PcieLink};
use crate::rfic::simulated::{PRODUCT_ID_AD9361, REG_PRODUCT_ID};
use crate::types::Direction;
use log::trace;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub const SIM_IDENTIFIER: &str = "LiteX-M2SDR simulated gateware";
pub const SIM_DNA: (u32, u32) = (0x0040_2c1b, 0x8d5a_0c85);
/// Raw XADC readings: roughly 52.9 °C, 1.0 V, 1.8 V, 1.0 V.
pub const SIM_XADC: [u32; 4] = [2650, 1365, 2457, 1365];

#[derive(Debug, Default, Clone, Copy)]
struct SimEngine {
    locked: bool,
    enabled: bool,
    hw_count: i64,
    sw_count: i64,
}

#[derive(Debug)]
struct SimState {
    csr: CsrMap,
    registers: HashMap<u32, u32>,
    spi_registers: [u8; 1024],
    spi_writes: Vec<(u16, u8)>,
    spi_stuck: bool,
    info: DmaInfo,
    rx: SimEngine,
    tx: SimEngine,
    rx_mem: Arc<Mutex<Vec<u8>>>,
    tx_mem: Arc<Mutex<Vec<u8>>>,
    rx_burst: i64,
    tx_burst: i64,
    loopback: bool,
    loopback_queue: VecDeque<Vec<u8>>,
    transmitted: Vec<u8>,
    ramp: u32,
    live_mappings: usize,
    fail_map: bool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimState {
    fn engine(&mut self, direction: Direction) -> &mut SimEngine {
        match direction {
            Direction::Rx => &mut self.rx,
            Direction::Tx => &mut self.tx,
        }
    }

    fn sc8(&self) -> bool {
        self.registers.get(&self.csr.ad9361_format).copied() == Some(1)
    }

    fn write_register(&mut self, addr: u32, value: u32) {
        self.registers.insert(addr, value);
        if addr == self.csr.ad9361_spi_control && value & spi::START != 0 {
            self.run_spi_transfer(value);
        }
    }

    fn run_spi_transfer(&mut self, control: u32) {
        self.registers.insert(self.csr.ad9361_spi_status, 0);
        if self.spi_stuck {
            return;
        }
        let length = (control >> spi::LENGTH_SHIFT) & 0xff;
        let mosi = self
            .registers
            .get(&self.csr.ad9361_spi_mosi)
            .copied()
            .unwrap_or(0);
        if length == 24 {
            let cmd = (mosi >> 8) & 0xffff;
            let addr = (cmd & 0x3ff) as u16;
            if cmd & 0x8000 != 0 {
                let data = (mosi & 0xff) as u8;
                trace!("simulated SPI write {addr:#05x} = {data:#04x}");
                self.spi_registers[addr as usize] = data;
                self.spi_writes.push((addr, data));
            } else {
                let data = self.spi_registers[addr as usize];
                self.registers.insert(self.csr.ad9361_spi_miso, data as u32);
            }
        }
        self.registers.insert(self.csr.ad9361_spi_status, spi::DONE);
    }

    fn fill_ramp(&mut self, buf: &mut [u8]) {
        // Frames carry both channels: ch0 = (v, -v), ch1 = (-v, v).
        if self.sc8() {
            for frame in buf.chunks_exact_mut(4) {
                let v = (self.ramp % 100) as i8;
                frame.copy_from_slice(&[v as u8, (-v) as u8, (-v) as u8, v as u8]);
                self.ramp = self.ramp.wrapping_add(1);
            }
        } else {
            for frame in buf.chunks_exact_mut(8) {
                let v = (self.ramp % 1024) as i16;
                frame[0..2].copy_from_slice(&v.to_le_bytes());
                frame[2..4].copy_from_slice(&(-v).to_le_bytes());
                frame[4..6].copy_from_slice(&(-v).to_le_bytes());
                frame[6..8].copy_from_slice(&v.to_le_bytes());
                self.ramp = self.ramp.wrapping_add(1);
            }
        }
    }

    fn run_rx(&mut self) {
        let size = self.info.buf_size(Direction::Rx);
        let count = self.info.buf_count(Direction::Rx) as i64;
        for _ in 0..self.rx_burst {
            let payload = if self.loopback {
                match self.loopback_queue.pop_front() {
                    Some(buf) => buf,
                    None => break,
                }
            } else {
                let mut buf = vec![0u8; size];
                self.fill_ramp(&mut buf);
                buf
            };
            let start = (self.rx.hw_count % count) as usize * size;
            let mut mem = lock(&self.rx_mem);
            let len = payload.len().min(size);
            mem[start..start + len].copy_from_slice(&payload[..len]);
            drop(mem);
            self.rx.hw_count += 1;
        }
    }

    fn run_tx(&mut self) {
        let size = self.info.buf_size(Direction::Tx);
        let count = self.info.buf_count(Direction::Tx) as i64;
        let pending = (self.tx.sw_count - self.tx.hw_count).min(self.tx_burst);
        for _ in 0..pending {
            let start = (self.tx.hw_count % count) as usize * size;
            let buf = lock(&self.tx_mem)[start..start + size].to_vec();
            self.transmitted.extend_from_slice(&buf);
            if self.loopback {
                self.loopback_queue.push_back(buf);
            }
            self.tx.hw_count += 1;
        }
    }
}

/// Heap-backed stand-in for a mapped DMA ring.
#[derive(Debug)]
pub struct SimulatedRegion {
    mem: Arc<Mutex<Vec<u8>>>,
    state: Arc<Mutex<SimState>>,
}

impl DmaRegion for SimulatedRegion {
    fn len(&self) -> usize {
        lock(&self.mem).len()
    }

    fn with_slice<T>(&self, offset: usize, len: usize, f: impl FnOnce(&[u8]) -> T) -> T {
        let mem = lock(&self.mem);
        f(&mem[offset..offset + len])
    }

    fn with_slice_mut<T>(
        &mut self,
        offset: usize,
        len: usize,
        f: impl FnOnce(&mut [u8]) -> T,
    ) -> T {
        let mut mem = lock(&self.mem);
        f(&mut mem[offset..offset + len])
    }
}

impl Drop for SimulatedRegion {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        state.live_mappings = state.live_mappings.saturating_sub(1);
    }
}

/// A [`PcieLink`] backed by [`SimState`].
#[derive(Debug)]
pub struct SimulatedPcie {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedPcie {
    /// A board with `buf_count` DMA buffers of `buf_size` bytes per direction.
    pub fn new(buf_size: usize, buf_count: usize, csr: CsrMap) -> SimulatedPcie {
        let region_len = buf_size * buf_count;
        let info = DmaInfo {
            tx_buf_offset: 0,
            tx_buf_size: buf_size as u64,
            tx_buf_count: buf_count as u64,
            rx_buf_offset: region_len as u64,
            rx_buf_size: buf_size as u64,
            rx_buf_count: buf_count as u64,
        };
        let mut registers = HashMap::new();
        registers.insert(csr.ctrl_scratch, 0x1234_5678);
        registers.insert(csr.dna_id, SIM_DNA.0);
        registers.insert(csr.dna_id + 4, SIM_DNA.1);
        registers.insert(csr.xadc_temperature, SIM_XADC[0]);
        registers.insert(csr.xadc_vccint, SIM_XADC[1]);
        registers.insert(csr.xadc_vccaux, SIM_XADC[2]);
        registers.insert(csr.xadc_vccbram, SIM_XADC[3]);
        for (i, c) in SIM_IDENTIFIER
            .bytes()
            .take(IDENTIFIER_MEM_LEN as usize - 1)
            .enumerate()
        {
            registers.insert(csr.identifier_mem + 4 * i as u32, c as u32);
        }
        let mut spi_registers = [0u8; 1024];
        spi_registers[REG_PRODUCT_ID as usize] = PRODUCT_ID_AD9361;
        let state = SimState {
            csr,
            registers,
            spi_registers,
            spi_writes: Vec::new(),
            spi_stuck: false,
            info,
            rx: SimEngine::default(),
            tx: SimEngine::default(),
            rx_mem: Arc::new(Mutex::new(vec![0; region_len])),
            tx_mem: Arc::new(Mutex::new(vec![0; region_len])),
            rx_burst: 1,
            tx_burst: 1,
            loopback: false,
            loopback_queue: VecDeque::new(),
            transmitted: Vec::new(),
            ramp: 0,
            live_mappings: 0,
            fail_map: false,
        };
        SimulatedPcie {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn probe(&self) -> SimulatedPcieProbe {
        SimulatedPcieProbe {
            state: Arc::clone(&self.state),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        lock(&self.state)
    }
}

impl Default for SimulatedPcie {
    fn default() -> Self {
        SimulatedPcie::new(8192, 32, CsrMap::default())
    }
}

impl PcieLink for SimulatedPcie {
    type Region = SimulatedRegion;
    type Waiter = SimulatedWaiter;

    fn readl(&mut self, addr: u32) -> Result<u32, M2sdrError> {
        Ok(self.state().registers.get(&addr).copied().unwrap_or(0))
    }

    fn writel(&mut self, addr: u32, value: u32) -> Result<(), M2sdrError> {
        self.state().write_register(addr, value);
        Ok(())
    }

    fn dma_info(&mut self) -> Result<DmaInfo, M2sdrError> {
        Ok(self.state().info)
    }

    fn request_dma(&mut self, direction: Direction) -> Result<(), M2sdrError> {
        let mut state = self.state();
        let engine = state.engine(direction);
        if engine.locked {
            return Err(M2sdrError::Stream(format!(
                "{direction} DMA engine is in use by another process"
            )));
        }
        engine.locked = true;
        Ok(())
    }

    fn release_dma(&mut self, direction: Direction) -> Result<(), M2sdrError> {
        self.state().engine(direction).locked = false;
        Ok(())
    }

    fn dma_engine(
        &mut self,
        direction: Direction,
        enable: bool,
    ) -> Result<DmaCounts, M2sdrError> {
        let mut state = self.state();
        let running = std::mem::replace(&mut state.engine(direction).enabled, enable);
        if enable && running {
            match direction {
                Direction::Rx => state.run_rx(),
                Direction::Tx => state.run_tx(),
            }
        }
        let engine = *state.engine(direction);
        Ok(DmaCounts {
            hw_count: engine.hw_count,
            sw_count: engine.sw_count,
        })
    }

    fn update_sw_count(&mut self, direction: Direction, sw_count: i64) -> Result<(), M2sdrError> {
        self.state().engine(direction).sw_count = sw_count;
        Ok(())
    }

    fn set_dma_loopback(&mut self, enable: bool) -> Result<(), M2sdrError> {
        let mut state = self.state();
        state.loopback = enable;
        if !enable {
            state.loopback_queue.clear();
        }
        Ok(())
    }

    fn map_dma(
        &mut self,
        direction: Direction,
        _info: &DmaInfo,
    ) -> Result<SimulatedRegion, M2sdrError> {
        let mut state = self.state();
        if state.fail_map {
            return Err(M2sdrError::Mmap {
                direction,
                e: std::io::Error::from_raw_os_error(libc::ENOMEM),
            });
        }
        state.live_mappings += 1;
        let mem = match direction {
            Direction::Rx => Arc::clone(&state.rx_mem),
            Direction::Tx => Arc::clone(&state.tx_mem),
        };
        Ok(SimulatedRegion {
            mem,
            state: Arc::clone(&self.state),
        })
    }

    fn waiter(&self) -> SimulatedWaiter {
        SimulatedWaiter {
            state: Arc::clone(&self.state),
        }
    }
}

/// Answers immediately whether the next counter poll would make progress.
#[derive(Debug, Clone)]
pub struct SimulatedWaiter {
    state: Arc<Mutex<SimState>>,
}

impl DmaWait for SimulatedWaiter {
    fn wait_dma(&self, direction: Direction, _timeout: Duration) -> Result<bool, M2sdrError> {
        let state = lock(&self.state);
        Ok(match direction {
            Direction::Rx => {
                state.rx.enabled
                    && state.rx_burst > 0
                    && (!state.loopback || !state.loopback_queue.is_empty())
            }
            Direction::Tx => {
                state.tx.enabled && state.tx_burst > 0 && state.tx.sw_count > state.tx.hw_count
            }
        })
    }
}

/// Shared view into a [`SimulatedPcie`] for inspection and fault injection.
#[derive(Debug, Clone)]
pub struct SimulatedPcieProbe {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedPcieProbe {
    fn state(&self) -> MutexGuard<'_, SimState> {
        lock(&self.state)
    }

    pub fn register(&self, addr: u32) -> u32 {
        self.state().registers.get(&addr).copied().unwrap_or(0)
    }

    pub fn set_register(&self, addr: u32, value: u32) {
        self.state().registers.insert(addr, value);
    }

    pub fn spi_register(&self, addr: u16) -> u8 {
        self.state().spi_registers[(addr & 0x3ff) as usize]
    }

    pub fn set_spi_register(&self, addr: u16, value: u8) {
        self.state().spi_registers[(addr & 0x3ff) as usize] = value;
    }

    /// Every SPI register write in order.
    pub fn spi_writes(&self) -> Vec<(u16, u8)> {
        self.state().spi_writes.clone()
    }

    /// Keep the SPI master busy forever.
    pub fn set_spi_stuck(&self, stuck: bool) {
        self.state().spi_stuck = stuck;
    }

    pub fn dma_enabled(&self, direction: Direction) -> bool {
        self.state().engine(direction).enabled
    }

    pub fn dma_locked(&self, direction: Direction) -> bool {
        self.state().engine(direction).locked
    }

    pub fn dma_counts(&self, direction: Direction) -> DmaCounts {
        let mut state = self.state();
        let engine = state.engine(direction);
        DmaCounts {
            hw_count: engine.hw_count,
            sw_count: engine.sw_count,
        }
    }

    pub fn loopback(&self) -> bool {
        self.state().loopback
    }

    /// Number of DMA regions currently mapped.
    pub fn live_mappings(&self) -> usize {
        self.state().live_mappings
    }

    pub fn set_rx_burst(&self, buffers: i64) {
        self.state().rx_burst = buffers;
    }

    pub fn set_tx_burst(&self, buffers: i64) {
        self.state().tx_burst = buffers;
    }

    pub fn set_fail_map(&self, fail: bool) {
        self.state().fail_map = fail;
    }

    /// Raw bytes of every buffer the TX engine has consumed so far.
    pub fn transmitted(&self) -> Vec<u8> {
        self.state().transmitted.clone()
    }
}
