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

//! Conversion between host sample buffers and the DMA wire format.
//!
//! A wire frame always carries both channels, `[ch0 I, ch0 Q, ch1 I, ch1 Q]`, each component
//! a little-endian `i16` (16-bit mode) or an `i8` (8-bit mode).

use crate::types::{SampleFormat, StreamFormat};
use num_complex::{Complex, Complex32};

/// Channels carried by every wire frame.
pub const WIRE_CHANNELS: usize = 2;

pub fn frame_size(mode: SampleFormat) -> usize {
    mode.bytes_per_complex() * WIRE_CHANNELS
}

/// A host-side sample type a stream can be opened with.
pub trait HostSample: Copy + Default + Send + 'static {
    const FORMAT: StreamFormat;

    fn from_wire(i: i16, q: i16, scale: f32) -> Self;

    /// Saturates to the range of `mode`.
    fn to_wire(self, scale: f32, mode: SampleFormat) -> (i16, i16);
}

fn saturate(value: f32, mode: SampleFormat) -> i16 {
    let v = value.round();
    match mode {
        SampleFormat::Sc16 => v.clamp(i16::MIN as f32, i16::MAX as f32) as i16,
        SampleFormat::Sc8 => v.clamp(i8::MIN as f32, i8::MAX as f32) as i16,
    }
}

impl HostSample for Complex32 {
    const FORMAT: StreamFormat = StreamFormat::Cf32;

    fn from_wire(i: i16, q: i16, scale: f32) -> Self {
        Complex32::new(i as f32 / scale, q as f32 / scale)
    }

    fn to_wire(self, scale: f32, mode: SampleFormat) -> (i16, i16) {
        (saturate(self.re * scale, mode), saturate(self.im * scale, mode))
    }
}

impl HostSample for Complex<i16> {
    const FORMAT: StreamFormat = StreamFormat::Cs16;

    fn from_wire(i: i16, q: i16, _scale: f32) -> Self {
        Complex::new(i, q)
    }

    fn to_wire(self, _scale: f32, mode: SampleFormat) -> (i16, i16) {
        match mode {
            SampleFormat::Sc16 => (self.re, self.im),
            SampleFormat::Sc8 => (
                self.re.clamp(i8::MIN as i16, i8::MAX as i16),
                self.im.clamp(i8::MIN as i16, i8::MAX as i16),
            ),
        }
    }
}

fn component_offset(mode: SampleFormat, frame: usize, channel: usize) -> usize {
    frame * frame_size(mode) + channel * mode.bytes_per_complex()
}

pub fn read_component_pair(
    mode: SampleFormat,
    wire: &[u8],
    frame: usize,
    channel: usize,
) -> (i16, i16) {
    let at = component_offset(mode, frame, channel);
    match mode {
        SampleFormat::Sc16 => (
            i16::from_le_bytes([wire[at], wire[at + 1]]),
            i16::from_le_bytes([wire[at + 2], wire[at + 3]]),
        ),
        SampleFormat::Sc8 => (wire[at] as i8 as i16, wire[at + 1] as i8 as i16),
    }
}

pub fn write_component_pair(
    mode: SampleFormat,
    wire: &mut [u8],
    frame: usize,
    channel: usize,
    (i, q): (i16, i16),
) {
    let at = component_offset(mode, frame, channel);
    match mode {
        SampleFormat::Sc16 => {
            wire[at..at + 2].copy_from_slice(&i.to_le_bytes());
            wire[at + 2..at + 4].copy_from_slice(&q.to_le_bytes());
        }
        SampleFormat::Sc8 => {
            wire[at] = i as i8 as u8;
            wire[at + 1] = q as i8 as u8;
        }
    }
}

/// Decode `out.len()` samples of `channel` starting at wire frame `first_frame`.
pub fn decode<S: HostSample>(
    mode: SampleFormat,
    wire: &[u8],
    first_frame: usize,
    channel: usize,
    out: &mut [S],
) {
    let scale = mode.scaling();
    for (n, sample) in out.iter_mut().enumerate() {
        let (i, q) = read_component_pair(mode, wire, first_frame + n, channel);
        *sample = S::from_wire(i, q, scale);
    }
}

/// Encode `input` into `channel` of the wire frames starting at `first_frame`.
pub fn encode<S: HostSample>(
    mode: SampleFormat,
    input: &[S],
    wire: &mut [u8],
    first_frame: usize,
    channel: usize,
) {
    let scale = mode.scaling();
    for (n, sample) in input.iter().enumerate() {
        write_component_pair(mode, wire, first_frame + n, channel, sample.to_wire(scale, mode));
    }
}
