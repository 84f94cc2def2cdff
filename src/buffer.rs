// SPDX-License-Identifier: Apache-2.0

//! Statically sized sample storage.
use heapless::Vec;

/// Samples per channel in a timed capture, and the longest wave table the generators accept
pub const BUFFERSIZE: usize = 1000;

/// One channel of a timed capture. Overwritten in place by every `m1`.
pub type SampleBuffer = [u16; BUFFERSIZE];

/// One period of a generator waveform, in DAC codes
pub type WaveTable = Vec<u16, BUFFERSIZE>;

/// Capture buffers for both oscilloscope inputs. Index `i` of `a` and `b` come from the same
/// timer tick.
pub struct CaptureBuffers {
    /// First capture input
    pub a: SampleBuffer,
    /// Second capture input
    pub b: SampleBuffer,
}

impl CaptureBuffers {
    /// Zeroed buffers
    pub const fn new() -> Self {
        Self {
            a: [0u16; BUFFERSIZE],
            b: [0u16; BUFFERSIZE],
        }
    }

    /// Both buffers, mutably, for a capture
    pub fn split_mut(&mut self) -> (&mut SampleBuffer, &mut SampleBuffer) {
        (&mut self.a, &mut self.b)
    }
}

impl Default for CaptureBuffers {
    fn default() -> Self {
        Self::new()
    }
}
