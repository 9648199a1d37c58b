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

//! DMA stream state and the sample data path.
//!
//! A [`DmaStream`] exists between `setup_stream` and `close_stream` of one direction. It owns
//! the mapped ring, so unmapping happens when the stream is dropped; [`DmaStream::close`] makes
//! sure the engine is stopped and the DMA lock released before that.
//!
//! Samples move one DMA buffer at a time. A buffer that is only partly consumed by
//! [`DmaStream::read`] or partly filled by [`DmaStream::write`] is remembered in a cursor and
//! continued by the next call.

pub mod convert;
pub mod ring;

use crate::error::M2sdrError;
use crate::pcie::{DmaInfo, DmaRegion, PcieLink};
use crate::stream::convert::{HostSample, decode, encode, frame_size};
use crate::stream::ring::DmaRing;
use crate::types::{Direction, SampleFormat, StreamFormat};
use log::{debug, info, trace, warn};

/// Opaque token for an open stream, returned by `setup_stream`.
#[derive(Debug, PartialEq, Eq)]
pub struct StreamHandle {
    pub(crate) direction: Direction,
    pub(crate) id: u64,
}

impl StreamHandle {
    pub fn direction(&self) -> Direction {
        self.direction
    }
}

/// Error counters of a stream since it was set up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStatus {
    pub overflows: u64,
    /// RX buffers thrown away while recovering from overflows.
    pub dropped_buffers: u64,
    pub underflows: u64,
}

#[derive(Debug, Clone, Copy)]
struct Cursor {
    index: usize,
    frame: usize,
}

#[derive(Debug)]
pub(crate) struct DmaStream<R: DmaRegion> {
    pub(crate) id: u64,
    direction: Direction,
    region: R,
    ring: DmaRing,
    format: StreamFormat,
    channels: Vec<usize>,
    mode: SampleFormat,
    active: bool,
    cursor: Option<Cursor>,
    direct: Option<usize>,
    /// TX: buffers were submitted since the last `end_burst`.
    burst_open: bool,
    status: StreamStatus,
    reported: StreamStatus,
}

impl<R: DmaRegion> DmaStream<R> {
    pub(crate) fn new(
        id: u64,
        direction: Direction,
        region: R,
        info: &DmaInfo,
        format: StreamFormat,
        channels: Vec<usize>,
        mode: SampleFormat,
    ) -> DmaStream<R> {
        DmaStream {
            id,
            direction,
            region,
            ring: DmaRing::new(info.buf_size(direction), info.buf_count(direction)),
            format,
            channels,
            mode,
            active: false,
            cursor: None,
            direct: None,
            burst_open: false,
            status: StreamStatus::default(),
            reported: StreamStatus::default(),
        }
    }

    pub(crate) fn direction(&self) -> Direction {
        self.direction
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn status(&self) -> StreamStatus {
        self.status
    }

    pub(crate) fn num_buffers(&self) -> usize {
        self.ring.buf_count()
    }

    /// Samples per channel in one DMA buffer.
    pub(crate) fn mtu(&self) -> usize {
        self.ring.buf_size() / frame_size(self.mode)
    }

    /// Follows sample rate changes that re-derive the sample mode.
    pub(crate) fn set_sample_mode(&mut self, mode: SampleFormat) {
        self.mode = mode;
    }

    fn buffer_range(&self, index: usize) -> (usize, usize) {
        (self.ring.offset(index), self.ring.buf_size())
    }

    pub(crate) fn activate<P: PcieLink>(&mut self, link: &mut P) -> Result<(), M2sdrError> {
        if self.active {
            return Ok(());
        }
        let counts = link.dma_engine(self.direction, true)?;
        self.ring.resync(counts.hw_count);
        link.update_sw_count(self.direction, self.ring.user_count())?;
        self.cursor = None;
        self.direct = None;
        self.burst_open = false;
        self.active = true;
        info!(
            "{} stream activated at buffer {}",
            self.direction,
            self.ring.user_count()
        );
        Ok(())
    }

    pub(crate) fn deactivate<P: PcieLink>(&mut self, link: &mut P) -> Result<(), M2sdrError> {
        if !self.active {
            return Ok(());
        }
        if self.direction == Direction::Tx {
            self.flush(link)?;
        }
        link.dma_engine(self.direction, false)?;
        self.active = false;
        self.cursor = None;
        self.direct = None;
        self.burst_open = false;
        info!("{} stream deactivated", self.direction);
        Ok(())
    }

    /// Stop the engine if needed and give the DMA lock back. The mapping goes away with `self`.
    pub(crate) fn close<P: PcieLink>(mut self, link: &mut P) -> Result<(), M2sdrError> {
        let deactivated = self.deactivate(link);
        if let Err(e) = &deactivated {
            warn!("Failed to stop the {} DMA engine: {e}", self.direction);
            // Still try to stop the engine before the ring is unmapped.
            let _ = link.dma_engine(self.direction, false);
        }
        let released = link.release_dma(self.direction);
        if let Err(e) = &released {
            warn!("Failed to release the {} DMA lock: {e}", self.direction);
        }
        debug!("Unmapping {} DMA region", self.direction);
        drop(self);
        deactivated.and(released)
    }

    fn ensure_active(&self) -> Result<(), M2sdrError> {
        if !self.active {
            return Err(M2sdrError::Stream(format!(
                "{} stream is not active",
                self.direction
            )));
        }
        Ok(())
    }

    /// `None` while the engine has not filled a buffer yet.
    fn try_acquire_rx<P: PcieLink>(&mut self, link: &mut P) -> Result<Option<usize>, M2sdrError> {
        self.ensure_active()?;
        self.ring.sync(link.dma_engine(Direction::Rx, true)?.hw_count);
        if self.ring.pending() == 0 {
            return Ok(None);
        }
        if self.ring.overflowed() {
            let dropped = self.ring.pending();
            self.ring.resync(self.ring.hw_count());
            link.update_sw_count(Direction::Rx, self.ring.user_count())?;
            self.status.overflows += 1;
            self.status.dropped_buffers += dropped as u64;
            warn!("RX overflow, dropped {dropped} DMA buffers");
            return Err(M2sdrError::Overflow { dropped });
        }
        let index = self.ring.advance();
        trace!("RX buffer {index} acquired");
        Ok(Some(index))
    }

    /// `None` while every buffer is waiting for the engine.
    fn try_acquire_tx<P: PcieLink>(&mut self, link: &mut P) -> Result<Option<usize>, M2sdrError> {
        self.ensure_active()?;
        self.ring.sync(link.dma_engine(Direction::Tx, true)?.hw_count);
        // Running dry between bursts is expected.
        if self.burst_open && self.ring.drained() {
            self.status.underflows += 1;
            warn!("TX underflow, the DMA engine ran out of buffers");
        }
        if self.ring.full() {
            return Ok(None);
        }
        let index = self.ring.advance();
        trace!("TX buffer {index} acquired");
        Ok(Some(index))
    }

    /// Hand the buffer most recently acquired back to the kernel.
    fn release<P: PcieLink>(&mut self, link: &mut P) -> Result<(), M2sdrError> {
        link.update_sw_count(self.direction, self.ring.user_count())?;
        if self.direction == Direction::Tx {
            self.burst_open = true;
        }
        Ok(())
    }

    fn check_buffers(&self, format: StreamFormat, count: usize) -> Result<(), M2sdrError> {
        if format != self.format {
            return Err(M2sdrError::Argument(format!(
                "{} stream was set up for {}, not {}",
                self.direction,
                self.format.as_str(),
                format.as_str()
            )));
        }
        if count != self.channels.len() {
            return Err(M2sdrError::Argument(format!(
                "Expected {} buffers, one per channel, got {count}",
                self.channels.len()
            )));
        }
        if let Some(index) = self.direct {
            return Err(M2sdrError::Stream(format!(
                "{} buffer {index} is held through direct access",
                self.direction
            )));
        }
        Ok(())
    }

    /// Fill one buffer per channel with at most one MTU of samples, possibly less than
    /// requested. Never blocks: `None` means no DMA buffer is ready yet.
    pub(crate) fn read<S: HostSample, P: PcieLink>(
        &mut self,
        link: &mut P,
        buffs: &mut [&mut [S]],
    ) -> Result<Option<usize>, M2sdrError> {
        self.check_buffers(S::FORMAT, buffs.len())?;
        let wanted = buffs.iter().map(|b| b.len()).min().unwrap_or(0);
        if wanted == 0 {
            return Ok(Some(0));
        }
        let cursor = match self.cursor {
            Some(cursor) => cursor,
            None => match self.try_acquire_rx(link)? {
                Some(index) => Cursor { index, frame: 0 },
                None => return Ok(None),
            },
        };
        let mtu = self.mtu();
        let n = wanted.min(mtu - cursor.frame);
        let (offset, len) = self.buffer_range(cursor.index);
        let mode = self.mode;
        let channels = &self.channels;
        self.region.with_slice(offset, len, |wire| {
            for (buff, &channel) in buffs.iter_mut().zip(channels) {
                decode(mode, wire, cursor.frame, channel, &mut buff[..n]);
            }
        });
        if cursor.frame + n == mtu {
            self.cursor = None;
            self.release(link)?;
        } else {
            self.cursor = Some(Cursor {
                index: cursor.index,
                frame: cursor.frame + n,
            });
        }
        Ok(Some(n))
    }

    /// Write one buffer per channel until the input runs out or the ring is full. Returns the
    /// number of samples per channel accepted. Never blocks.
    ///
    /// `end_burst` zero-pads and submits a trailing partial buffer, but only once the whole
    /// input has been accepted; otherwise the burst continues with the next call.
    pub(crate) fn write<S: HostSample, P: PcieLink>(
        &mut self,
        link: &mut P,
        buffs: &[&[S]],
        end_burst: bool,
    ) -> Result<usize, M2sdrError> {
        self.check_buffers(S::FORMAT, buffs.len())?;
        let wanted = buffs.iter().map(|b| b.len()).min().unwrap_or(0);
        let mtu = self.mtu();
        let mut written = 0;
        while written < wanted {
            let cursor = match self.cursor {
                Some(cursor) => cursor,
                None => match self.try_acquire_tx(link)? {
                    Some(index) => Cursor { index, frame: 0 },
                    None => break,
                },
            };
            let n = (wanted - written).min(mtu - cursor.frame);
            let (offset, len) = self.buffer_range(cursor.index);
            let mode = self.mode;
            let channels = &self.channels;
            self.region.with_slice_mut(offset, len, |wire| {
                for (buff, &channel) in buffs.iter().zip(channels) {
                    encode(mode, &buff[written..written + n], wire, cursor.frame, channel);
                }
            });
            written += n;
            if cursor.frame + n == mtu {
                self.cursor = None;
                self.release(link)?;
            } else {
                self.cursor = Some(Cursor {
                    index: cursor.index,
                    frame: cursor.frame + n,
                });
            }
        }
        if end_burst && written == wanted {
            self.flush(link)?;
            self.burst_open = false;
        }
        Ok(written)
    }

    /// Submit a partly filled TX buffer, zero-padding the rest.
    fn flush<P: PcieLink>(&mut self, link: &mut P) -> Result<(), M2sdrError> {
        let Some(cursor) = self.cursor.take() else {
            return Ok(());
        };
        let (offset, len) = self.buffer_range(cursor.index);
        let used = cursor.frame * frame_size(self.mode);
        self.region
            .with_slice_mut(offset, len, |wire| wire[used..].fill(0));
        trace!(
            "TX buffer {} flushed with {} of {} samples",
            cursor.index,
            cursor.frame,
            self.mtu()
        );
        self.release(link)
    }

    /// Take the next buffer for direct access, `None` if none is available yet.
    pub(crate) fn acquire_direct<P: PcieLink>(
        &mut self,
        link: &mut P,
    ) -> Result<Option<usize>, M2sdrError> {
        if let Some(index) = self.direct {
            return Err(M2sdrError::Stream(format!(
                "{} buffer {index} is still held",
                self.direction
            )));
        }
        if self.cursor.is_some() {
            return Err(M2sdrError::Stream(format!(
                "{} stream has a partly converted buffer",
                self.direction
            )));
        }
        let acquired = match self.direction {
            Direction::Rx => self.try_acquire_rx(link)?,
            Direction::Tx => self.try_acquire_tx(link)?,
        };
        self.direct = acquired;
        Ok(acquired)
    }

    pub(crate) fn release_direct<P: PcieLink>(
        &mut self,
        link: &mut P,
        index: usize,
    ) -> Result<(), M2sdrError> {
        if self.direct != Some(index) {
            return Err(M2sdrError::Argument(format!(
                "{} buffer {index} is not held",
                self.direction
            )));
        }
        self.direct = None;
        self.release(link)
    }

    pub(crate) fn with_direct<T>(
        &mut self,
        index: usize,
        f: impl FnOnce(&mut [u8]) -> T,
    ) -> Result<T, M2sdrError> {
        if self.direct != Some(index) {
            return Err(M2sdrError::Argument(format!(
                "{} buffer {index} is not held",
                self.direction
            )));
        }
        let (offset, len) = self.buffer_range(index);
        Ok(self.region.with_slice_mut(offset, len, f))
    }

    /// Report overflow or underflow events that happened since the last call.
    pub(crate) fn take_event(&mut self) -> Result<(), M2sdrError> {
        let status = self.status;
        let reported = std::mem::replace(&mut self.reported, status);
        if status.overflows > reported.overflows {
            return Err(M2sdrError::Overflow {
                dropped: (status.dropped_buffers - reported.dropped_buffers) as i64,
            });
        }
        if status.underflows > reported.underflows {
            return Err(M2sdrError::Underflow);
        }
        Ok(())
    }
}
