//! Analog front end and dual supply, both set through SPI digital potentiometers.
use embedded_hal::{
    digital::{OutputPin, PinState},
    spi::SpiBus,
};

use crate::{
    error::{pin_error, spi_error, HardwareError},
    logger::{debug, trace},
};

/// Command byte that loads the wiper register of a potentiometer
pub const POT_WRITE_CMD: u8 = 0x11;

/// Oscilloscope input channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InputChannel {
    /// CH1
    Ch1,
    /// CH2
    Ch2,
}

impl InputChannel {
    /// Both channels, in the order the front end is configured
    pub const ALL: [InputChannel; 2] = [InputChannel::Ch1, InputChannel::Ch2];

    /// Position in per-channel arrays
    pub const fn index(self) -> usize {
        match self {
            InputChannel::Ch1 => 0,
            InputChannel::Ch2 => 1,
        }
    }
}

/// Input conditioning selected by the two coupling lines of a channel
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Coupling {
    /// Direct, `00`
    #[default]
    Dc,
    /// Attenuated, `01`
    Att,
    /// AC coupled, `10`
    Ac,
    /// Grounded, `11`
    Gnd,
}

impl Coupling {
    /// Decode a host coupling digit. Only the low two bits are wired, so `5` selects
    /// [`Coupling::Att`].
    pub const fn from_code(code: u8) -> Self {
        match code & 0b11 {
            0b00 => Coupling::Dc,
            0b01 => Coupling::Att,
            0b10 => Coupling::Ac,
            _ => Coupling::Gnd,
        }
    }

    /// Two-bit select code
    pub const fn code(self) -> u8 {
        match self {
            Coupling::Dc => 0b00,
            Coupling::Att => 0b01,
            Coupling::Ac => 0b10,
            Coupling::Gnd => 0b11,
        }
    }

    /// Levels for (line A, line B). Line A carries bit 0.
    pub fn line_states(self) -> (PinState, PinState) {
        let code = self.code();
        (
            PinState::from(code & 0b01 != 0),
            PinState::from(code & 0b10 != 0),
        )
    }
}

/// Front end settings of one input channel
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelConfig {
    /// Coupling select
    pub coupling: Coupling,
    /// Gain potentiometer code
    pub gain_code: u8,
    /// Offset potentiometer code
    pub offset_code: u8,
}

/// Write one code to a potentiometer. The code is latched when `select` returns high.
pub fn write_pot<SPI, CS>(spi: &mut SPI, select: &mut CS, code: u8) -> Result<(), HardwareError>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
{
    select.set_low().map_err(pin_error)?;
    spi.write(&[POT_WRITE_CMD, code]).map_err(spi_error)?;
    spi.flush().map_err(spi_error)?;
    select.set_high().map_err(pin_error)
}

/// Select lines of one input channel
pub struct FrontEndPins<P> {
    /// Coupling bit 0
    pub coupling_a: P,
    /// Coupling bit 1
    pub coupling_b: P,
    /// Chip select of the gain potentiometer
    pub gain_select: P,
    /// Chip select of the offset potentiometer
    pub offset_select: P,
}

/// Buffer amplifiers and coupling relays in front of the two capture inputs.
///
/// Both channels share one SPI bus; each potentiometer has its own chip select.
pub struct AnalogFrontEnd<SPI, P> {
    spi: SPI,
    channels: [FrontEndPins<P>; 2],
}

impl<SPI, P> AnalogFrontEnd<SPI, P>
where
    SPI: SpiBus<u8>,
    P: OutputPin,
{
    /// Take ownership of the bus and the select lines of both channels
    pub fn new(spi: SPI, ch1: FrontEndPins<P>, ch2: FrontEndPins<P>) -> Self {
        Self {
            spi,
            channels: [ch1, ch2],
        }
    }

    /// Apply coupling, then gain, then offset to `channel`.
    ///
    /// The gain transaction is latched before the offset select line goes low.
    pub fn configure_channel(
        &mut self,
        channel: InputChannel,
        config: &ChannelConfig,
    ) -> Result<(), HardwareError> {
        debug!(
            "Front end {:?}: coupling {:?}, gain {}, offset {}",
            channel, config.coupling, config.gain_code, config.offset_code
        );
        let pins = &mut self.channels[channel.index()];
        let (line_a, line_b) = config.coupling.line_states();
        pins.coupling_a.set_state(line_a).map_err(pin_error)?;
        pins.coupling_b.set_state(line_b).map_err(pin_error)?;

        write_pot(&mut self.spi, &mut pins.gain_select, config.gain_code)?;
        write_pot(&mut self.spi, &mut pins.offset_select, config.offset_code)
    }

    /// Configure CH1 then CH2
    pub fn configure(&mut self, configs: &[ChannelConfig; 2]) -> Result<(), HardwareError> {
        for channel in InputChannel::ALL {
            self.configure_channel(channel, &configs[channel.index()])?;
        }
        Ok(())
    }
}

/// Potentiometer code for a supply rail of `volts`.
///
/// `volts` must be non-zero. Results outside `0..=255` saturate in the cast.
pub fn supply_code(volts: f64) -> u8 {
    (312.0 - 1020.0 / volts) as u8
}

/// Adjustable dual DC supply, on its own SPI bus
pub struct DualSupply<SPI, P> {
    spi: SPI,
    select: P,
    code: Option<u8>,
}

impl<SPI, P> DualSupply<SPI, P>
where
    SPI: SpiBus<u8>,
    P: OutputPin,
{
    /// Supply is left unprogrammed until [`DualSupply::set_voltage`]
    pub fn new(spi: SPI, select: P) -> Self {
        Self {
            spi,
            select,
            code: None,
        }
    }

    /// Program the supply rails to `volts` and return the code written
    pub fn set_voltage(&mut self, volts: f64) -> Result<u8, HardwareError> {
        let code = supply_code(volts);
        trace!("Supply code {} for {} V", code, volts);
        write_pot(&mut self.spi, &mut self.select, code)?;
        self.code = Some(code);
        Ok(code)
    }

    /// Last code written, if any
    pub fn code(&self) -> Option<u8> {
        self.code
    }
}
