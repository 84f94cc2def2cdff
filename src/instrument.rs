//! Command dispatcher and the session state it owns.
use embedded_hal::{digital::OutputPin, spi::SpiBus};
use embedded_io::{Read, Write};

use crate::{
    buffer::{CaptureBuffers, WaveTable},
    command::Command,
    components::{AnalogFrontEnd, ChannelConfig, DualSupply},
    error::{CommandError, HardwareError},
    link::{write_samples, LineReader},
    logger::{debug, info, warn},
    sampling::{averaged_read, capture, DualAdc, AVERAGE_READS},
    waveform::{emit, Calibration, OutputChannel, WaveOutput, WaveformState},
};

/// Supply rail voltage programmed at power on
pub const DEFAULT_SUPPLY_VOLTS: f64 = 5.5;

/// Everything the host has configured since power on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Session {
    /// Front end settings from the last `m1`
    pub inputs: [ChannelConfig; 2],
    /// Generator settings, W1 then W2
    pub generators: [WaveformState; 2],
    /// Calibration of W1 and W2
    pub calibration: [Calibration; 2],
    /// Supply potentiometer code last written
    pub supply_code: Option<u8>,
}

impl Session {
    /// Power-on session with the given generator calibration
    pub fn new(calibration: [Calibration; 2]) -> Self {
        Self {
            inputs: [ChannelConfig::default(); 2],
            generators: [WaveformState::default(); 2],
            calibration,
            supply_code: None,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new([Calibration::W1, Calibration::W2])
    }
}

/// Hardware handles the dispatcher drives
pub struct Peripherals<FS, SS, P, D, A> {
    /// Input amplifiers and coupling select
    pub front_end: AnalogFrontEnd<FS, P>,
    /// Dual DC supply
    pub supply: DualSupply<SS, P>,
    /// Generator outputs
    pub dac: D,
    /// Capture and DC inputs
    pub adc: A,
}

/// Oscilloscope and waveform generator, driven one host line at a time.
///
/// Commands run to completion before the next line is read, so every timer and buffer is
/// owned by at most one command.
pub struct Instrument<'b, FS, SS, P, D, A> {
    hw: Peripherals<FS, SS, P, D, A>,
    session: Session,
    buffers: &'b mut CaptureBuffers,
    table: WaveTable,
}

impl<'b, FS, SS, P, D, A> Instrument<'b, FS, SS, P, D, A>
where
    FS: SpiBus<u8>,
    SS: SpiBus<u8>,
    P: OutputPin,
    D: WaveOutput,
    A: DualAdc,
{
    /// Wrap the hardware. Nothing is written until [`Instrument::power_on`].
    pub fn new(
        hw: Peripherals<FS, SS, P, D, A>,
        calibration: [Calibration; 2],
        buffers: &'b mut CaptureBuffers,
    ) -> Self {
        Self {
            hw,
            session: Session::new(calibration),
            buffers,
            table: WaveTable::new(),
        }
    }

    /// Current session state
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Most recent capture
    pub fn buffers(&self) -> &CaptureBuffers {
        &*self.buffers
    }

    /// Hardware handles, mainly for inspection
    pub fn peripherals(&self) -> &Peripherals<FS, SS, P, D, A> {
        &self.hw
    }

    /// Program the default supply voltage and bring both generators to their bias level
    pub fn power_on(&mut self) -> Result<(), HardwareError> {
        info!("Power on: supply {} V", DEFAULT_SUPPLY_VOLTS);
        self.set_supply(DEFAULT_SUPPLY_VOLTS)?;
        self.arm_generator(OutputChannel::W1)?;
        self.arm_generator(OutputChannel::W2)
    }

    /// Serve host commands until the link closes.
    ///
    /// Malformed lines and failed commands are logged and dropped; the host gets no reply.
    /// A failed link read or write ends the loop with the link error.
    pub fn serve<L: Read + Write>(&mut self, link: &mut L) -> Result<(), HardwareError> {
        let mut reader = LineReader::new();
        loop {
            match reader.read_line(link) {
                Ok(Some(line)) => match self.handle_line(line, link) {
                    Ok(()) => {}
                    Err(CommandError::Hardware(err @ HardwareError::Link(_))) => return Err(err),
                    Err(err) => warn!("Command dropped: {:?}", err),
                },
                Ok(None) => {
                    info!("Host link closed");
                    return Ok(());
                }
                Err(CommandError::Hardware(err)) => return Err(err),
                Err(err) => warn!("Line dropped: {:?}", err),
            }
        }
    }

    /// Parse and execute one command line
    pub fn handle_line<W: Write>(&mut self, line: &str, link: &mut W) -> Result<(), CommandError> {
        let command: Command = line.parse()?;
        self.execute(command, link)?;
        Ok(())
    }

    /// Execute one command, streaming any response to `link`
    pub fn execute<W: Write>(&mut self, command: Command, link: &mut W) -> Result<(), HardwareError> {
        debug!("Executing {}", command.tag());
        match command {
            Command::Capture {
                sample_rate_hz,
                inputs,
            } => {
                self.hw.front_end.configure(&inputs)?;
                self.session.inputs = inputs;
                capture(&mut self.hw.adc, sample_rate_hz, &mut *self.buffers)?;
                write_samples(link, &self.buffers.a)?;
                write_samples(link, &self.buffers.b)
            }
            Command::DcRead => {
                let (a, b) = averaged_read(&mut self.hw.adc, AVERAGE_READS)?;
                write_samples(link, &[a])?;
                write_samples(link, &[b])
            }
            Command::Generator { channel, waveform } => {
                let previous =
                    core::mem::replace(&mut self.session.generators[channel.index()], waveform);
                // Re-arm both generators: touching one timer while the other runs upsets it
                let armed = self.arm_generator(channel);
                if armed.is_err() {
                    self.session.generators[channel.index()] = previous;
                }
                let partner = self.arm_generator(channel.other());
                armed.and(partner)
            }
            Command::Supply { centivolts } => self.set_supply(centivolts as f64 / 100.0),
        }
    }

    fn arm_generator(&mut self, channel: OutputChannel) -> Result<(), HardwareError> {
        emit(
            &mut self.hw.dac,
            channel,
            &self.session.generators[channel.index()],
            &self.session.calibration[channel.index()],
            &mut self.table,
        )
    }

    fn set_supply(&mut self, volts: f64) -> Result<(), HardwareError> {
        let code = self.hw.supply.set_voltage(volts)?;
        self.session.supply_code = Some(code);
        Ok(())
    }
}
