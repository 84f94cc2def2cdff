//! Host command lines.
//!
//! Every line starts with a two character tag followed by fixed-width decimal fields with no
//! separators. Column layouts, counted from the start of the line:
//!
//! | Tag | Columns |
//! |---|---|
//! | `m1` | rate `2..8`, CH1 coupling `8`, gain `9..12`, offset `12..15`, CH2 coupling `15`, gain `16..19`, offset `19..22` |
//! | `m2` | none |
//! | `s1`, `s2` | shape `2..4`, samples `4..7`, frequency `7..14`, amplitude `14..18`, offset `18..` |
//! | `dz` | supply centivolts `2..6` |
use core::{ops::Range, str::FromStr};

use crate::{
    buffer::BUFFERSIZE,
    components::{ChannelConfig, Coupling},
    error::ParseError,
    waveform::{OutputChannel, WaveShape, WaveformState},
};

/// Length of an `m1` line
pub const CAPTURE_LINE_LEN: usize = 22;
/// Shortest `s1`/`s2` line: the offset field needs at least one character
pub const GENERATOR_LINE_LEN: usize = 19;
/// Length of a `dz` line
pub const SUPPLY_LINE_LEN: usize = 6;

/// A parsed host command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// `m1`: configure both front end channels, capture both inputs, stream both buffers
    Capture {
        /// Capture timer rate
        sample_rate_hz: u32,
        /// Front end settings for CH1 and CH2
        inputs: [ChannelConfig; 2],
    },
    /// `m2`: averaged DC read of both inputs
    DcRead,
    /// `s1`/`s2`: reconfigure one generator
    Generator {
        /// Generator being changed
        channel: OutputChannel,
        /// New settings
        waveform: WaveformState,
    },
    /// `dz`: set the dual supply
    Supply {
        /// Rail voltage in hundredths of a volt
        centivolts: u16,
    },
}

impl Command {
    /// Host tag of this command
    pub fn tag(&self) -> &'static str {
        match self {
            Command::Capture { .. } => "m1",
            Command::DcRead => "m2",
            Command::Generator {
                channel: OutputChannel::W1,
                ..
            } => "s1",
            Command::Generator {
                channel: OutputChannel::W2,
                ..
            } => "s2",
            Command::Supply { .. } => "dz",
        }
    }
}

/// Fixed-width view over one command line
struct Fields<'a> {
    line: &'a str,
}

impl<'a> Fields<'a> {
    fn new(line: &'a str, tag: &'static str, needed: usize) -> Result<Self, ParseError> {
        if line.len() < needed {
            return Err(ParseError::TooShort {
                tag,
                needed,
                got: line.len(),
            });
        }
        Ok(Self { line })
    }

    fn int<T: FromStr>(&self, columns: Range<usize>, name: &'static str) -> Result<T, ParseError> {
        self.line
            .get(columns)
            .ok_or(ParseError::InvalidField(name))?
            .trim()
            .parse()
            .map_err(|_| ParseError::InvalidField(name))
    }

    fn rest<T: FromStr>(&self, start: usize, name: &'static str) -> Result<T, ParseError> {
        self.int(start..self.line.len(), name)
    }

    /// Potentiometer code: three digits, but only a byte is sent
    fn pot_code(&self, columns: Range<usize>, name: &'static str) -> Result<u8, ParseError> {
        let code: u16 = self.int(columns, name)?;
        u8::try_from(code).map_err(|_| ParseError::OutOfRange(name))
    }

    fn channel(&self, start: usize) -> Result<ChannelConfig, ParseError> {
        let coupling: u8 = self.int(start..start + 1, "coupling")?;
        Ok(ChannelConfig {
            coupling: Coupling::from_code(coupling),
            gain_code: self.pot_code(start + 1..start + 4, "gain")?,
            offset_code: self.pot_code(start + 4..start + 7, "offset")?,
        })
    }

    fn waveform(&self) -> Result<WaveformState, ParseError> {
        let shape = WaveShape::from_code(self.int(2..4, "shape")?);
        let sample_count: u16 = self.int(4..7, "samples")?;
        if !(2..=BUFFERSIZE).contains(&(sample_count as usize))
            || (shape == WaveShape::Triangle && sample_count % 2 != 0)
        {
            return Err(ParseError::OutOfRange("samples"));
        }
        Ok(WaveformState {
            shape,
            sample_count,
            frequency_hz: self.int(7..14, "frequency")?,
            amplitude_raw: self.int(14..18, "amplitude")?,
            offset_raw: self.rest(18, "offset")?,
        })
    }
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        if !line.is_ascii() {
            return Err(ParseError::NotAscii);
        }
        match line.get(..2) {
            Some("m1") => {
                let fields = Fields::new(line, "m1", CAPTURE_LINE_LEN)?;
                Ok(Command::Capture {
                    sample_rate_hz: fields.int(2..8, "rate")?,
                    inputs: [fields.channel(8)?, fields.channel(15)?],
                })
            }
            Some("m2") => Ok(Command::DcRead),
            Some("s1") => Ok(Command::Generator {
                channel: OutputChannel::W1,
                waveform: Fields::new(line, "s1", GENERATOR_LINE_LEN)?.waveform()?,
            }),
            Some("s2") => Ok(Command::Generator {
                channel: OutputChannel::W2,
                waveform: Fields::new(line, "s2", GENERATOR_LINE_LEN)?.waveform()?,
            }),
            Some("dz") => {
                let fields = Fields::new(line, "dz", SUPPLY_LINE_LEN)?;
                Ok(Command::Supply {
                    centivolts: fields.int(2..6, "supply")?,
                })
            }
            _ => Err(ParseError::UnknownTag),
        }
    }
}
