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

//! Streaming API.
//!
//! At most one stream per direction. A stream goes through
//! `setup_stream` → (`activate_stream` → I/O → `deactivate_stream`)* → `close_stream`.
//! Dropping the device closes whatever is still open.

use crate::device::{M2sdrDevice, NUM_CHANNELS, check_channel};
use crate::error::M2sdrError;
use crate::pcie::{DmaWait, PcieLink};
use crate::rfic::RfTransceiver;
use crate::stream::convert::HostSample;
use crate::stream::{DmaStream, StreamHandle, StreamStatus};
use crate::types::{Direction, StreamFormat};
use log::{info, warn};
use std::time::Duration;

impl<P: PcieLink, R: RfTransceiver> M2sdrDevice<P, R> {
    fn with_stream<T>(
        &self,
        handle: &StreamHandle,
        f: impl FnOnce(&mut DmaStream<P::Region>, &mut P) -> Result<T, M2sdrError>,
    ) -> Result<T, M2sdrError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let slot = match handle.direction {
            Direction::Rx => &mut state.rx,
            Direction::Tx => &mut state.tx,
        };
        let stream = slot
            .as_mut()
            .filter(|s| s.id == handle.id)
            .ok_or_else(|| {
                M2sdrError::Argument(format!("{} stream handle is not open", handle.direction))
            })?;
        f(stream, &mut state.link)
    }

    /// Run `attempt` on the stream until it yields a value. In between, wait for the engine
    /// with the device unlocked so settings and the other direction stay usable.
    fn with_stream_blocking<T>(
        &self,
        handle: &StreamHandle,
        timeout: Duration,
        mut attempt: impl FnMut(&mut DmaStream<P::Region>, &mut P) -> Result<Option<T>, M2sdrError>,
    ) -> Result<T, M2sdrError> {
        if let Some(done) = self.with_stream(handle, &mut attempt)? {
            return Ok(done);
        }
        let waiter = self.lock()?.link.waiter();
        waiter.wait_dma(handle.direction, timeout)?;
        self.with_stream(handle, &mut attempt)?
            .ok_or(M2sdrError::Timeout {
                direction: handle.direction,
                timeout,
            })
    }

    /// Open the DMA stream of `direction`.
    ///
    /// `channels` defaults to `[0]` when empty. Takes the kernel DMA lock and maps the ring;
    /// the lock is given back if mapping fails.
    pub fn setup_stream(
        &self,
        direction: Direction,
        format: StreamFormat,
        channels: &[usize],
    ) -> Result<StreamHandle, M2sdrError> {
        let channels = if channels.is_empty() {
            vec![0]
        } else {
            channels.to_vec()
        };
        for (i, &channel) in channels.iter().enumerate() {
            check_channel(channel)?;
            if channels[..i].contains(&channel) {
                return Err(M2sdrError::Argument(format!(
                    "Channel {channel} requested twice"
                )));
            }
        }
        debug_assert!(channels.len() <= NUM_CHANNELS);

        let mut guard = self.lock()?;
        let state = &mut *guard;
        if state.stream_slot(direction).is_some() {
            return Err(M2sdrError::Stream(format!(
                "{direction} stream is already set up"
            )));
        }
        state.link.request_dma(direction)?;
        let region = match state.link.map_dma(direction, &state.dma_info) {
            Ok(region) => region,
            Err(e) => {
                if let Err(release) = state.link.release_dma(direction) {
                    warn!("Failed to release the {direction} DMA lock: {release}");
                }
                return Err(e);
            }
        };
        let id = state.next_stream_id;
        state.next_stream_id += 1;
        let stream = DmaStream::new(
            id,
            direction,
            region,
            &state.dma_info,
            format,
            channels,
            state.mode,
        );
        info!(
            "{direction} stream set up: {} buffers, {} samples, MTU {}",
            stream.num_buffers(),
            format.as_str(),
            stream.mtu()
        );
        *state.stream_slot(direction) = Some(stream);
        Ok(StreamHandle { direction, id })
    }

    /// Deactivate if needed, release the DMA lock and unmap the ring.
    pub fn close_stream(&self, handle: StreamHandle) -> Result<(), M2sdrError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let slot = state.stream_slot(handle.direction);
        if !slot.as_ref().is_some_and(|s| s.id == handle.id) {
            return Err(M2sdrError::Argument(format!(
                "{} stream handle is not open",
                handle.direction
            )));
        }
        let Some(stream) = slot.take() else {
            return Ok(());
        };
        info!("Closing {} stream", stream.direction());
        stream.close(&mut state.link)
    }

    pub fn activate_stream(&self, handle: &StreamHandle) -> Result<(), M2sdrError> {
        self.with_stream(handle, |stream, link| stream.activate(link))
    }

    pub fn deactivate_stream(&self, handle: &StreamHandle) -> Result<(), M2sdrError> {
        self.with_stream(handle, |stream, link| stream.deactivate(link))
    }

    pub fn is_stream_active(&self, handle: &StreamHandle) -> Result<bool, M2sdrError> {
        self.with_stream(handle, |stream, _| Ok(stream.is_active()))
    }

    /// Samples per channel carried by one DMA buffer.
    pub fn stream_mtu(&self, handle: &StreamHandle) -> Result<usize, M2sdrError> {
        self.with_stream(handle, |stream, _| Ok(stream.mtu()))
    }

    /// Read up to one MTU of samples into one buffer per selected channel.
    ///
    /// # Returns: `Result<usize, M2sdrError>`
    /// * `Ok(usize)` - Samples per channel written to `buffs`
    /// * `Err(M2sdrError::Timeout)` - No DMA buffer arrived within `timeout`
    /// * `Err(M2sdrError::Overflow)` - The reader fell behind; pending buffers were dropped and
    ///   the next call continues with fresh data
    pub fn read_stream<S: HostSample>(
        &self,
        handle: &StreamHandle,
        buffs: &mut [&mut [S]],
        timeout: Duration,
    ) -> Result<usize, M2sdrError> {
        check_direction(handle, Direction::Rx)?;
        self.with_stream_blocking(handle, timeout, |stream, link| {
            stream.read(link, &mut *buffs)
        })
    }

    /// Write samples from one buffer per selected channel.
    ///
    /// Full DMA buffers are submitted as they fill up. With `end_burst` a trailing partial
    /// buffer is zero-padded and submitted too. If the ring stays full for `timeout`, returns
    /// what was accepted so far; the burst is then still open.
    pub fn write_stream<S: HostSample>(
        &self,
        handle: &StreamHandle,
        buffs: &[&[S]],
        end_burst: bool,
        timeout: Duration,
    ) -> Result<usize, M2sdrError> {
        check_direction(handle, Direction::Tx)?;
        let wanted = buffs.iter().map(|b| b.len()).min().unwrap_or(0);
        let mut written = 0;
        let mut retried = false;
        self.with_stream_blocking(handle, timeout, |stream, link| {
            let rest: Vec<&[S]> = buffs.iter().map(|b| &b[written..]).collect();
            written += stream.write(link, &rest, end_burst)?;
            let done = written == wanted || (retried && written > 0);
            retried = true;
            Ok(done.then_some(written))
        })
    }

    pub fn stream_status(&self, handle: &StreamHandle) -> Result<StreamStatus, M2sdrError> {
        self.with_stream(handle, |stream, _| Ok(stream.status()))
    }

    /// Report an overflow or underflow that happened since the last call, once.
    pub fn read_stream_status(&self, handle: &StreamHandle) -> Result<(), M2sdrError> {
        self.with_stream(handle, |stream, _| stream.take_event())
    }

    // Direct buffer access

    pub fn num_direct_access_buffers(&self, handle: &StreamHandle) -> Result<usize, M2sdrError> {
        self.with_stream(handle, |stream, _| Ok(stream.num_buffers()))
    }

    /// Take the next filled RX buffer. Returns its index; the bytes are available through
    /// [`read_buffer`](Self::read_buffer) until [`release_read_buffer`](Self::release_read_buffer).
    pub fn acquire_read_buffer(
        &self,
        handle: &StreamHandle,
        timeout: Duration,
    ) -> Result<usize, M2sdrError> {
        check_direction(handle, Direction::Rx)?;
        self.with_stream_blocking(handle, timeout, |stream, link| stream.acquire_direct(link))
    }

    pub fn read_buffer<T>(
        &self,
        handle: &StreamHandle,
        index: usize,
        f: impl FnOnce(&[u8]) -> T,
    ) -> Result<T, M2sdrError> {
        check_direction(handle, Direction::Rx)?;
        self.with_stream(handle, |stream, _| stream.with_direct(index, |buf| f(buf)))
    }

    pub fn release_read_buffer(
        &self,
        handle: &StreamHandle,
        index: usize,
    ) -> Result<(), M2sdrError> {
        check_direction(handle, Direction::Rx)?;
        self.with_stream(handle, |stream, link| stream.release_direct(link, index))
    }

    /// Take the next free TX buffer. Fill it through [`write_buffer`](Self::write_buffer) and
    /// submit it with [`release_write_buffer`](Self::release_write_buffer).
    pub fn acquire_write_buffer(
        &self,
        handle: &StreamHandle,
        timeout: Duration,
    ) -> Result<usize, M2sdrError> {
        check_direction(handle, Direction::Tx)?;
        self.with_stream_blocking(handle, timeout, |stream, link| stream.acquire_direct(link))
    }

    pub fn write_buffer<T>(
        &self,
        handle: &StreamHandle,
        index: usize,
        f: impl FnOnce(&mut [u8]) -> T,
    ) -> Result<T, M2sdrError> {
        check_direction(handle, Direction::Tx)?;
        self.with_stream(handle, |stream, _| stream.with_direct(index, f))
    }

    pub fn release_write_buffer(
        &self,
        handle: &StreamHandle,
        index: usize,
    ) -> Result<(), M2sdrError> {
        check_direction(handle, Direction::Tx)?;
        self.with_stream(handle, |stream, link| stream.release_direct(link, index))
    }
}

fn check_direction(handle: &StreamHandle, expected: Direction) -> Result<(), M2sdrError> {
    if handle.direction != expected {
        return Err(M2sdrError::Argument(format!(
            "Operation needs a {expected} stream, got a {} stream",
            handle.direction
        )));
    }
    Ok(())
}
