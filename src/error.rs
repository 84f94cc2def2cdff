//! Error types for command parsing and hardware access

use thiserror::Error;

/// A host command line that could not be turned into a [`Command`](crate::command::Command).
///
/// These are logged and dropped by the dispatcher. The host never sees them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseError {
    /// Line did not fit in the line buffer and was discarded up to its newline
    #[error("line longer than {0} bytes")]
    LineTooLong(usize),
    /// Line contains bytes outside of ASCII
    #[error("line is not ASCII")]
    NotAscii,
    /// First two characters are not a known command tag
    #[error("unknown command tag")]
    UnknownTag,
    /// Line is shorter than the fixed-width layout of its command
    #[error("`{tag}` needs at least {needed} characters, got {got}")]
    TooShort {
        /// Command tag
        tag: &'static str,
        /// Minimum line length for this tag
        needed: usize,
        /// Length received
        got: usize,
    },
    /// Field is not an integer
    #[error("field `{0}` is not an integer")]
    InvalidField(&'static str),
    /// Field is an integer, but not one the instrument can hold
    #[error("field `{0}` is out of range")]
    OutOfRange(&'static str),
}

/// Failure reported by a pin, bus or converter while handling a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HardwareError {
    /// Chip select or coupling line could not be driven
    #[error("pin error: {0:?}")]
    Pin(embedded_hal::digital::ErrorKind),
    /// Potentiometer bus transfer failed
    #[error("SPI error: {0:?}")]
    Spi(embedded_hal::spi::ErrorKind),
    /// Host link read or write failed
    #[error("host link error: {0:?}")]
    Link(embedded_io::ErrorKind),
    /// No timer setting reaches the requested rate
    #[error("timer cannot run at {0} Hz")]
    TimerRate(u64),
    /// DAC refused the output
    #[error("DAC error")]
    Dac,
    /// ADC conversion failed
    #[error("ADC error")]
    Adc,
    /// Timed capture did not fill its buffers before the deadline
    #[error("capture did not complete within {0} ms")]
    CaptureTimeout(u32),
}

/// Anything that can stop a single command from completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    /// Malformed line
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Hardware failure while executing
    #[error(transparent)]
    Hardware(#[from] HardwareError),
}

/// Reduce a pin driver error to its kind
pub(crate) fn pin_error<E: embedded_hal::digital::Error>(err: E) -> HardwareError {
    HardwareError::Pin(err.kind())
}

/// Reduce an SPI driver error to its kind
pub(crate) fn spi_error<E: embedded_hal::spi::Error>(err: E) -> HardwareError {
    HardwareError::Spi(err.kind())
}

/// Reduce a serial link error to its kind
pub(crate) fn link_error<E: embedded_io::Error>(err: E) -> HardwareError {
    HardwareError::Link(err.kind())
}
