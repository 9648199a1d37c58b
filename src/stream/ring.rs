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

//! Counter arithmetic of a LitePCIe DMA ring.
//!
//! The kernel and the host each keep a monotonically increasing buffer counter. For RX the
//! engine count leads and the host follows; for TX the host count leads and the engine follows.
//! Buffer `n` lives at index `n % buf_count`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaRing {
    buf_size: usize,
    buf_count: usize,
    /// Buffers handed out to the host so far.
    user_count: i64,
    /// Last engine count seen.
    hw_count: i64,
}

impl DmaRing {
    pub fn new(buf_size: usize, buf_count: usize) -> DmaRing {
        DmaRing {
            buf_size,
            buf_count,
            user_count: 0,
            hw_count: 0,
        }
    }

    pub fn buf_size(&self) -> usize {
        self.buf_size
    }

    pub fn buf_count(&self) -> usize {
        self.buf_count
    }

    pub fn user_count(&self) -> i64 {
        self.user_count
    }

    pub fn hw_count(&self) -> i64 {
        self.hw_count
    }

    /// Record a fresh engine count.
    pub fn sync(&mut self, hw_count: i64) {
        self.hw_count = hw_count;
    }

    /// Forget everything in flight and line the host count up with the engine.
    pub fn resync(&mut self, hw_count: i64) {
        self.hw_count = hw_count;
        self.user_count = hw_count;
    }

    /// RX: buffers filled by the engine and not yet handed out.
    pub fn pending(&self) -> i64 {
        self.hw_count - self.user_count
    }

    /// RX: the host is more than half a ring behind and the engine may be overwriting data.
    pub fn overflowed(&self) -> bool {
        self.pending() > (self.buf_count / 2) as i64
    }

    /// TX: buffers handed out that the engine has not consumed yet.
    pub fn in_flight(&self) -> i64 {
        self.user_count - self.hw_count
    }

    /// TX: every buffer is waiting for the engine.
    pub fn full(&self) -> bool {
        self.in_flight() >= self.buf_count as i64
    }

    /// TX: the engine consumed every buffer ever submitted.
    pub fn drained(&self) -> bool {
        self.user_count == self.hw_count && self.user_count > 0
    }

    /// Hand out the next buffer and return its index.
    pub fn advance(&mut self) -> usize {
        let index = self.index_of(self.user_count);
        self.user_count += 1;
        index
    }

    pub fn index_of(&self, count: i64) -> usize {
        count.rem_euclid(self.buf_count as i64) as usize
    }

    /// Byte offset of buffer `index` inside the mapped region.
    pub fn offset(&self, index: usize) -> usize {
        index * self.buf_size
    }
}
