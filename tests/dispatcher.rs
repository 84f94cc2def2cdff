//! Drives the whole instrument through a recording fake board.
use std::{cell::RefCell, convert::Infallible, rc::Rc};

use embedded_hal::{digital::OutputPin, spi::SpiBus};
use fugit::{HertzU32, MillisDurationU32};
use vscope_firmware::{
    buffer::CaptureBuffers,
    components::{AnalogFrontEnd, Coupling, DualSupply, FrontEndPins, InputChannel},
    error::{CommandError, HardwareError, ParseError},
    instrument::{Instrument, Peripherals},
    sampling::DualAdc,
    waveform::{dac_code, Calibration, OutputChannel, WaveOutput, WaveShape},
};

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Pin(&'static str, bool),
    Spi(&'static str, Vec<u8>),
    Level(OutputChannel, u16),
    Play(OutputChannel, usize, u32),
    Capture(u32),
}

type Log = Rc<RefCell<Vec<Event>>>;

struct FakePin {
    name: &'static str,
    log: Log,
}

impl embedded_hal::digital::ErrorType for FakePin {
    type Error = Infallible;
}

impl OutputPin for FakePin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.log.borrow_mut().push(Event::Pin(self.name, false));
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.log.borrow_mut().push(Event::Pin(self.name, true));
        Ok(())
    }
}

struct FakeSpi {
    name: &'static str,
    log: Log,
}

impl embedded_hal::spi::ErrorType for FakeSpi {
    type Error = Infallible;
}

impl SpiBus<u8> for FakeSpi {
    fn read(&mut self, _words: &mut [u8]) -> Result<(), Self::Error> {
        Ok(())
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        self.log
            .borrow_mut()
            .push(Event::Spi(self.name, words.to_vec()));
        Ok(())
    }

    fn transfer(&mut self, _read: &mut [u8], _write: &[u8]) -> Result<(), Self::Error> {
        Ok(())
    }

    fn transfer_in_place(&mut self, _words: &mut [u8]) -> Result<(), Self::Error> {
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

struct FakeDac {
    log: Log,
}

impl WaveOutput for FakeDac {
    fn write_level(&mut self, channel: OutputChannel, code: u16) -> Result<(), HardwareError> {
        self.log.borrow_mut().push(Event::Level(channel, code));
        Ok(())
    }

    fn play_circular(
        &mut self,
        channel: OutputChannel,
        samples: &[u16],
        sample_rate: HertzU32,
    ) -> Result<(), HardwareError> {
        self.log
            .borrow_mut()
            .push(Event::Play(channel, samples.len(), sample_rate.to_Hz()));
        Ok(())
    }
}

struct FakeAdc {
    log: Log,
    dc: [u16; 2],
    stalled: bool,
}

impl DualAdc for FakeAdc {
    fn read_single(&mut self, channel: InputChannel) -> Result<u16, HardwareError> {
        Ok(self.dc[channel.index()])
    }

    fn capture_dual(
        &mut self,
        sample_rate: HertzU32,
        a: &mut [u16],
        b: &mut [u16],
        timeout: MillisDurationU32,
    ) -> Result<(), HardwareError> {
        self.log.borrow_mut().push(Event::Capture(sample_rate.to_Hz()));
        if self.stalled {
            return Err(HardwareError::CaptureTimeout(timeout.to_millis()));
        }
        for (i, (x, y)) in a.iter_mut().zip(b.iter_mut()).enumerate() {
            *x = i as u16;
            *y = 1000 + i as u16;
        }
        Ok(())
    }
}

/// Host side of the serial link
struct Host {
    input: &'static [u8],
    output: Vec<u8>,
}

impl embedded_io::ErrorType for Host {
    type Error = Infallible;
}

impl embedded_io::Read for Host {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        embedded_io::Read::read(&mut self.input, buf)
    }
}

impl embedded_io::Write for Host {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.output.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

type Bench<'b> = Instrument<'b, FakeSpi, FakeSpi, FakePin, FakeDac, FakeAdc>;

fn pins(log: &Log, names: [&'static str; 4]) -> FrontEndPins<FakePin> {
    let pin = |name| FakePin {
        name,
        log: log.clone(),
    };
    FrontEndPins {
        coupling_a: pin(names[0]),
        coupling_b: pin(names[1]),
        gain_select: pin(names[2]),
        offset_select: pin(names[3]),
    }
}

fn bench(buffers: &mut CaptureBuffers) -> (Bench<'_>, Log) {
    bench_with_adc(buffers, false)
}

fn bench_with_adc(buffers: &mut CaptureBuffers, stalled: bool) -> (Bench<'_>, Log) {
    let log = Log::default();
    let hw = Peripherals {
        front_end: AnalogFrontEnd::new(
            FakeSpi {
                name: "front end",
                log: log.clone(),
            },
            pins(&log, ["c1a", "c1b", "g1", "o1"]),
            pins(&log, ["c2a", "c2b", "g2", "o2"]),
        ),
        supply: DualSupply::new(
            FakeSpi {
                name: "supply",
                log: log.clone(),
            },
            FakePin {
                name: "dz",
                log: log.clone(),
            },
        ),
        dac: FakeDac { log: log.clone() },
        adc: FakeAdc {
            log: log.clone(),
            dc: [1234, 567],
            stalled,
        },
    };
    let instrument = Instrument::new(hw, [Calibration::W1, Calibration::W2], buffers);
    (instrument, log)
}

fn take(log: &Log) -> Vec<Event> {
    log.borrow_mut().drain(..).collect()
}

fn pot(bus: &'static str, select: &'static str, code: u8) -> [Event; 3] {
    [
        Event::Pin(select, false),
        Event::Spi(bus, vec![0x11, code]),
        Event::Pin(select, true),
    ]
}

#[test]
fn power_on_sets_supply_and_bias_levels() {
    let mut buffers = CaptureBuffers::new();
    let (mut instrument, log) = bench(&mut buffers);
    instrument.power_on().unwrap();

    let mut expected = pot("supply", "dz", 126).to_vec();
    expected.push(Event::Level(OutputChannel::W1, 2224));
    expected.push(Event::Level(OutputChannel::W2, 2227));
    assert_eq!(take(&log), expected);
    assert_eq!(instrument.session().supply_code, Some(126));
}

#[test]
fn capture_configures_front_end_then_streams_both_channels() {
    let mut buffers = CaptureBuffers::new();
    let (mut instrument, log) = bench(&mut buffers);
    let mut out = Vec::new();
    instrument
        .handle_line("m101000021000501200060", &mut out)
        .unwrap();

    let mut expected = vec![Event::Pin("c1a", false), Event::Pin("c1b", true)];
    expected.extend(pot("front end", "g1", 100));
    expected.extend(pot("front end", "o1", 50));
    expected.extend([Event::Pin("c2a", true), Event::Pin("c2b", false)]);
    expected.extend(pot("front end", "g2", 200));
    expected.extend(pot("front end", "o2", 60));
    expected.push(Event::Capture(10_000));
    assert_eq!(take(&log), expected);

    assert_eq!(out.len(), 4000);
    assert_eq!(&out[..4], &[0, 0, 1, 0]);
    assert_eq!(&out[2000..2002], &1000u16.to_le_bytes());
    assert_eq!(&out[3998..], &1999u16.to_le_bytes());
    assert_eq!(instrument.buffers().b[999], 1999);

    let inputs = instrument.session().inputs;
    assert_eq!(inputs[0].coupling, Coupling::Ac);
    assert_eq!(inputs[1].coupling, Coupling::Att);
}

#[test]
fn dc_read_streams_two_averages() {
    let mut buffers = CaptureBuffers::new();
    let (mut instrument, log) = bench(&mut buffers);
    let mut out = Vec::new();
    instrument.handle_line("m2", &mut out).unwrap();

    assert_eq!(out, [1234u16.to_le_bytes(), 567u16.to_le_bytes()].concat());
    assert!(take(&log).is_empty());
}

#[test]
fn generator_change_rearms_both_channels_changed_first() {
    let mut buffers = CaptureBuffers::new();
    let (mut instrument, log) = bench(&mut buffers);
    let mut out = Vec::new();

    instrument
        .handle_line("s100064000100001080", &mut out)
        .unwrap();
    assert_eq!(
        take(&log),
        vec![
            Event::Play(OutputChannel::W1, 64, 64_000),
            Event::Level(OutputChannel::W2, 2227),
        ]
    );

    instrument
        .handle_line("s21110000000500216-100", &mut out)
        .unwrap();
    assert_eq!(
        take(&log),
        vec![
            Event::Play(OutputChannel::W2, 100, 5_000),
            Event::Play(OutputChannel::W1, 64, 64_000),
        ]
    );
    assert!(out.is_empty());

    let generators = instrument.session().generators;
    assert_eq!(generators[1].shape, WaveShape::Sawtooth);
    assert_eq!(generators[1].offset_raw, -100);
}

#[test]
fn generator_without_shape_is_held_but_partner_rearmed() {
    let mut buffers = CaptureBuffers::new();
    let (mut instrument, log) = bench(&mut buffers);
    instrument
        .handle_line("s242064000100001080", &mut Vec::new())
        .unwrap();
    assert_eq!(take(&log), vec![Event::Level(OutputChannel::W1, 2224)]);
}

#[test]
fn generator_zero_amplitude_holds_offset() {
    let mut buffers = CaptureBuffers::new();
    let (mut instrument, log) = bench(&mut buffers);
    instrument
        .handle_line("s11006400010000000-500", &mut Vec::new())
        .unwrap();
    let events = take(&log);
    assert_eq!(events[0], Event::Level(OutputChannel::W1, 2845));
    assert_eq!(dac_code(Calibration::W1.offset(-500)), 2845);
}

#[test]
fn supply_command_uses_centivolts() {
    let mut buffers = CaptureBuffers::new();
    let (mut instrument, log) = bench(&mut buffers);
    instrument.handle_line("dz1000", &mut Vec::new()).unwrap();
    assert_eq!(take(&log), pot("supply", "dz", 210).to_vec());
    assert_eq!(instrument.session().supply_code, Some(210));
    assert_eq!(instrument.peripherals().supply.code(), Some(210));
}

#[test]
fn short_capture_line_is_rejected_without_touching_hardware() {
    let mut buffers = CaptureBuffers::new();
    let (mut instrument, log) = bench(&mut buffers);
    assert!(matches!(
        instrument.handle_line("m101000021000501200", &mut Vec::new()),
        Err(CommandError::Parse(ParseError::TooShort { tag: "m1", .. }))
    ));
    assert!(take(&log).is_empty());
}

#[test]
fn serve_recovers_from_malformed_and_failed_commands() {
    let mut buffers = CaptureBuffers::new();
    let (mut instrument, log) = bench(&mut buffers);
    let mut host = Host {
        input: b"m10100002100\nzz\nm2\xff\nm1abcdef210005012000060\nm2\n",
        output: Vec::new(),
    };
    instrument.serve(&mut host).unwrap();

    assert_eq!(host.output.len(), 4);
    assert!(take(&log).is_empty());
}

#[test]
fn serve_continues_after_capture_timeout() {
    let mut buffers = CaptureBuffers::new();
    let (mut instrument, log) = bench_with_adc(&mut buffers, true);
    let mut host = Host {
        input: b"m100010000000000000000\r\ndz0550\r\n",
        output: Vec::new(),
    };
    instrument.serve(&mut host).unwrap();

    assert!(host.output.is_empty());
    let events = take(&log);
    assert!(events.contains(&Event::Capture(100)));
    assert_eq!(&events[events.len() - 3..], &pot("supply", "dz", 126));
}

#[test]
fn sample_rate_and_wave_parameters_reach_the_generator() {
    let mut buffers = CaptureBuffers::new();
    let (mut instrument, log) = bench(&mut buffers);
    instrument
        .handle_line("s100064001000020000100500", &mut Vec::new())
        .unwrap();
    assert_eq!(take(&log)[0], Event::Play(OutputChannel::W1, 64, 640_000));
}

#[test]
fn generator_rate_overflow_is_reported() {
    let mut buffers = CaptureBuffers::new();
    let (mut instrument, log) = bench(&mut buffers);
    assert!(matches!(
        instrument.handle_line("s10099999999990108000", &mut Vec::new()),
        Err(CommandError::Hardware(HardwareError::TimerRate(9_989_999_001)))
    ));
    // The partner is still re-armed
    assert_eq!(take(&log), vec![Event::Level(OutputChannel::W2, 2227)]);
}

#[test]
fn rejected_generator_keeps_previous_settings() {
    let mut buffers = CaptureBuffers::new();
    let (mut instrument, log) = bench(&mut buffers);
    instrument
        .handle_line("s100064000100001080", &mut Vec::new())
        .unwrap();
    let before = instrument.session().generators[0];
    take(&log);

    assert!(instrument
        .handle_line("s10099999999990108000", &mut Vec::new())
        .is_err());
    assert_eq!(instrument.session().generators[0], before);
    take(&log);

    instrument
        .handle_line("s21110000000500216-100", &mut Vec::new())
        .unwrap();
    assert_eq!(
        take(&log),
        vec![
            Event::Play(OutputChannel::W2, 100, 5_000),
            Event::Play(OutputChannel::W1, 64, 64_000),
        ]
    );
}

/// Link whose reads always fail
struct BrokenLink;

impl embedded_io::ErrorType for BrokenLink {
    type Error = embedded_io::ErrorKind;
}

impl embedded_io::Read for BrokenLink {
    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> {
        Err(embedded_io::ErrorKind::BrokenPipe)
    }
}

impl embedded_io::Write for BrokenLink {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[test]
fn serve_returns_link_failures() {
    let mut buffers = CaptureBuffers::new();
    let (mut instrument, _log) = bench(&mut buffers);
    assert_eq!(
        instrument.serve(&mut BrokenLink),
        Err(HardwareError::Link(embedded_io::ErrorKind::BrokenPipe))
    );
}
