//! Oscilloscope acquisition: timer-clocked dual capture and averaged DC reads.
use fugit::{HertzU32, MillisDurationU32};

use crate::{
    buffer::{CaptureBuffers, BUFFERSIZE},
    components::InputChannel,
    error::HardwareError,
    logger::{debug, trace},
};

/// Single-shot reads averaged by `m2`
pub const AVERAGE_READS: u32 = 10;

/// Slack added to the nominal capture time before a capture is abandoned
pub const CAPTURE_MARGIN_MS: u32 = 500;

/// Two ADC inputs that can be sampled together on one timer, plus single-shot DC reads.
pub trait DualAdc {
    /// One unclocked conversion of the DC input of `channel`
    fn read_single(&mut self, channel: InputChannel) -> Result<u16, HardwareError>;

    /// Fill `a` and `b` with one simultaneous sample pair per tick of a timer running at
    /// `sample_rate`. Blocks until both are full, or fails with
    /// [`HardwareError::CaptureTimeout`] once `timeout` has passed.
    fn capture_dual(
        &mut self,
        sample_rate: HertzU32,
        a: &mut [u16],
        b: &mut [u16],
        timeout: MillisDurationU32,
    ) -> Result<(), HardwareError>;
}

/// Time allowed for a [`BUFFERSIZE`]-sample capture at `sample_rate_hz`
pub fn capture_timeout(sample_rate_hz: u32) -> MillisDurationU32 {
    let nominal_ms = (BUFFERSIZE as u64 * 1000).div_ceil(sample_rate_hz.max(1) as u64);
    let total = nominal_ms.saturating_add(CAPTURE_MARGIN_MS as u64);
    MillisDurationU32::from_ticks(u32::try_from(total).unwrap_or(u32::MAX))
}

/// Capture both inputs into `buffers` at `sample_rate_hz`
pub fn capture<A: DualAdc>(
    adc: &mut A,
    sample_rate_hz: u32,
    buffers: &mut CaptureBuffers,
) -> Result<(), HardwareError> {
    if sample_rate_hz == 0 {
        return Err(HardwareError::TimerRate(0));
    }
    let timeout = capture_timeout(sample_rate_hz);
    debug!(
        "Capturing {} sample pairs at {} Hz, timeout {} ms",
        BUFFERSIZE,
        sample_rate_hz,
        timeout.to_millis()
    );
    let (a, b) = buffers.split_mut();
    adc.capture_dual(HertzU32::from_raw(sample_rate_hz), a, b, timeout)
}

/// Mean of `samples` single-shot reads of each DC input, truncated.
///
/// Reads alternate between the channels so both see the same drift.
pub fn averaged_read<A: DualAdc>(adc: &mut A, samples: u32) -> Result<(u16, u16), HardwareError> {
    let samples = samples.max(1);
    let (mut sum_a, mut sum_b) = (0u32, 0u32);
    for _ in 0..samples {
        sum_a += adc.read_single(InputChannel::Ch1)? as u32;
        sum_b += adc.read_single(InputChannel::Ch2)? as u32;
    }
    let averages = ((sum_a / samples) as u16, (sum_b / samples) as u16);
    trace!("DC averages {} {}", averages.0, averages.1);
    Ok(averages)
}
