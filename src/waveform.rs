//! Arbitrary waveform generator: wave table synthesis and hand-off to timed DAC output.
//!
//! Levels are in the DAC domain of 0–330 (tens of millivolts over a 3.3 V span) and are
//! scaled to 12-bit codes with [`DAC_SCALE`]. Out-of-range levels are not clamped: a level
//! above 330 produces a code above 4095, and a negative level saturates to 0 in the cast.
use core::f64::consts::PI;

use fugit::HertzU32;

use crate::{
    buffer::{WaveTable, BUFFERSIZE},
    error::HardwareError,
    logger::{debug, trace, warn},
};

/// DAC codes per level unit
pub const DAC_SCALE: f64 = 4095.0 / 330.0;

/// Waveform generator output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputChannel {
    /// W1
    W1,
    /// W2
    W2,
}

impl OutputChannel {
    /// Position in per-channel arrays
    pub const fn index(self) -> usize {
        match self {
            OutputChannel::W1 => 0,
            OutputChannel::W2 => 1,
        }
    }

    /// The generator that is not `self`
    pub const fn other(self) -> Self {
        match self {
            OutputChannel::W1 => OutputChannel::W2,
            OutputChannel::W2 => OutputChannel::W1,
        }
    }
}

/// Shape of one generator period
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaveShape {
    /// `00`
    #[default]
    Sine,
    /// `01`
    Cosine,
    /// `10`
    Triangle,
    /// `11`
    Sawtooth,
    /// Any other code: the generator is left as it is
    None,
}

impl WaveShape {
    /// Decode the host shape field, read as a decimal integer
    pub const fn from_code(code: i32) -> Self {
        match code {
            0 => WaveShape::Sine,
            1 => WaveShape::Cosine,
            10 => WaveShape::Triangle,
            11 => WaveShape::Sawtooth,
            _ => WaveShape::None,
        }
    }
}

/// Per-generator conversion from host units to DAC levels. Fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Calibration {
    /// Host amplitude units per level unit
    pub gain_scale: f64,
    /// Output level at zero host offset, in level units (10 mV)
    pub dc_bias: f64,
}

impl Calibration {
    /// Bench calibration of generator W1
    pub const W1: Self = Self {
        gain_scale: 10.8,
        dc_bias: 179.3,
    };
    /// Bench calibration of generator W2
    pub const W2: Self = Self {
        gain_scale: 10.8,
        dc_bias: 179.5,
    };

    /// Peak amplitude in level units
    pub fn amplitude(&self, amplitude_raw: i32) -> f64 {
        amplitude_raw as f64 / self.gain_scale
    }

    /// Centre level in level units. Host offsets are in millivolts and inverted by the
    /// output stage.
    pub fn offset(&self, offset_raw: i32) -> f64 {
        -(offset_raw as f64) / 10.0 + self.dc_bias
    }
}

/// Settings of one generator, in host units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WaveformState {
    /// Shape of one period
    pub shape: WaveShape,
    /// Wave table length, `2..=BUFFERSIZE`, even for [`WaveShape::Triangle`]
    pub sample_count: u16,
    /// Output frequency
    pub frequency_hz: u32,
    /// Peak amplitude, host units. Zero selects a static DC output.
    pub amplitude_raw: i32,
    /// Centre offset, host units
    pub offset_raw: i32,
}

impl Default for WaveformState {
    /// Power-on state: a static output at the calibrated DC bias
    fn default() -> Self {
        Self {
            shape: WaveShape::Sine,
            sample_count: 64,
            frequency_hz: 1000,
            amplitude_raw: 0,
            offset_raw: 0,
        }
    }
}

/// DAC code for a level. Truncates toward zero; saturates outside `0..=u16::MAX`.
pub fn dac_code(level: f64) -> u16 {
    (DAC_SCALE * level) as u16
}

/// Level of sample `index` of a `count`-sample period
pub fn sample_level(shape: WaveShape, amplitude: f64, offset: f64, index: usize, count: usize) -> f64 {
    let i = index as f64;
    let n = count as f64;
    match shape {
        WaveShape::Sine => offset + amplitude * libm::sin(2.0 * PI * i / n),
        WaveShape::Cosine => offset + amplitude * libm::cos(2.0 * PI * i / n),
        WaveShape::Sawtooth => offset - amplitude * (1.0 - 2.0 * i / n),
        WaveShape::Triangle if index < count / 2 => offset - amplitude * (1.0 - 4.0 * i / n),
        WaveShape::Triangle => offset + amplitude * (1.0 - 4.0 * (-0.5 + i / n)),
        WaveShape::None => offset,
    }
}

/// Result of [`synthesize`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Synthesis {
    /// Zero amplitude: hold this code, no sample clock
    Dc(u16),
    /// The wave table was filled for circular playback
    Timed,
    /// [`WaveShape::None`] with a non-zero amplitude: leave the output alone
    Held,
}

/// Fill `table` with one period of `shape`, or pick the static DC code when `amplitude` is 0.
pub fn synthesize(
    shape: WaveShape,
    amplitude: f64,
    offset: f64,
    sample_count: usize,
    table: &mut WaveTable,
) -> Synthesis {
    table.clear();
    if amplitude == 0.0 {
        return Synthesis::Dc(dac_code(offset));
    }
    if shape == WaveShape::None {
        return Synthesis::Held;
    }
    let count = sample_count.min(BUFFERSIZE);
    for index in 0..count {
        let code = dac_code(sample_level(shape, amplitude, offset, index, count));
        // `count` is bounded by the table capacity
        let _ = table.push(code);
    }
    Synthesis::Timed
}

/// Two DAC outputs, each able to hold a static level or loop a table on its own sample clock.
pub trait WaveOutput {
    /// Stop any playback on `channel` and hold `code`
    fn write_level(&mut self, channel: OutputChannel, code: u16) -> Result<(), HardwareError>;

    /// Loop `samples` on `channel` at `sample_rate`, replacing whatever the channel was doing.
    ///
    /// Playback continues without further calls until the channel is rewritten.
    fn play_circular(
        &mut self,
        channel: OutputChannel,
        samples: &[u16],
        sample_rate: HertzU32,
    ) -> Result<(), HardwareError>;
}

/// Synthesize `state` and arm the output for `channel`
pub fn emit<D: WaveOutput>(
    dac: &mut D,
    channel: OutputChannel,
    state: &WaveformState,
    calibration: &Calibration,
    table: &mut WaveTable,
) -> Result<(), HardwareError> {
    let amplitude = calibration.amplitude(state.amplitude_raw);
    let offset = calibration.offset(state.offset_raw);
    match synthesize(
        state.shape,
        amplitude,
        offset,
        state.sample_count as usize,
        table,
    ) {
        Synthesis::Dc(code) => {
            debug!("{:?}: static output, code {}", channel, code);
            dac.write_level(channel, code)
        }
        Synthesis::Held => {
            warn!("{:?}: no waveform shape selected, output unchanged", channel);
            Ok(())
        }
        Synthesis::Timed => {
            let rate = (state.frequency_hz as u64) * (table.len() as u64);
            let rate = u32::try_from(rate).map_err(|_| HardwareError::TimerRate(rate))?;
            if rate == 0 {
                return Err(HardwareError::TimerRate(0));
            }
            trace!("{:?}: {} samples at {} Hz", channel, table.len(), rate);
            dac.play_circular(channel, table.as_slice(), HertzU32::from_raw(rate))
        }
    }
}
