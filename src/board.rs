// SPDX-License-Identifier: Apache-2.0

//! RP2040 converters: PWM outputs stepped by timer alarms, and the on-chip ADC.
//!
//! The RP2040 has no DAC, so each generator drives one PWM channel with `top` set to the full
//! DAC scale. An RC filter on the board turns the duty into a level.
use defmt::warn;
use embedded_hal::pwm::SetDutyCycle;
use embedded_hal_0_2::adc::OneShot;
use rp2040_hal::{
    adc::AdcPin,
    fugit::{HertzU32, MicrosDurationU32, MillisDurationU32},
    gpio::{
        bank0::{Gpio26, Gpio27, Gpio28, Gpio29},
        FunctionSioInput, Pin, PullNone,
    },
    pwm::{FreeRunning, Pwm4, Slice},
    timer::{Alarm, Alarm0, Alarm1},
    Adc, Timer,
};
use vscope_firmware::{
    buffer::WaveTable,
    components::InputChannel,
    error::HardwareError,
    sampling::DualAdc,
    waveform::{OutputChannel, WaveOutput},
};

use crate::interrupt::DAC;

/// PWM counter wrap. Duty codes map 1:1 onto DAC codes.
pub const PWM_TOP: u16 = 4095;
/// Fastest table playback the alarm interrupts keep up with
pub const MAX_PLAYBACK_HZ: u32 = 250_000;
/// ADC conversion clock
pub const ADC_CLOCK_HZ: u32 = 48_000_000;
/// ADC clocks per conversion. The FIFO cannot be paced faster.
const ADC_CYCLES_PER_SAMPLE: u64 = 96;

/// ADC input pin on the bank 0 GPIO `I`
pub type AnalogIn<I> = AdcPin<Pin<I, FunctionSioInput, PullNone>>;

/// Circular playback state of one generator
#[derive(Default)]
pub struct Playback {
    table: WaveTable,
    index: usize,
    period_us: u32,
    remainder: u32,
    rate_hz: u32,
    carry: u32,
}

impl Playback {
    fn stop<A: Alarm>(&mut self, alarm: &mut A) {
        let _ = alarm.cancel();
        alarm.disable_interrupt();
        alarm.clear_interrupt();
        self.table.clear();
        self.index = 0;
    }

    /// Load `samples` and schedule the second one. Returns the first code to write now.
    fn start<A: Alarm>(
        &mut self,
        alarm: &mut A,
        samples: &[u16],
        rate: HertzU32,
    ) -> Result<u16, HardwareError> {
        let rate_hz = rate.to_Hz();
        if rate_hz == 0 || rate_hz > MAX_PLAYBACK_HZ {
            return Err(HardwareError::TimerRate(rate_hz as u64));
        }
        let first = *samples.first().ok_or(HardwareError::Dac)?;

        self.stop(alarm);
        self.table
            .extend_from_slice(samples)
            .map_err(|_| HardwareError::Dac)?;
        self.period_us = 1_000_000 / rate_hz;
        self.remainder = 1_000_000 % rate_hz;
        self.rate_hz = rate_hz;
        self.carry = 0;
        self.index = 1 % self.table.len();

        alarm.enable_interrupt();
        let period = self.next_period();
        alarm
            .schedule(period)
            .map_err(|_| HardwareError::TimerRate(rate_hz as u64))?;
        Ok(first)
    }

    /// Whole microseconds until the next sample; the fractional part is carried over
    fn next_period(&mut self) -> MicrosDurationU32 {
        self.carry += self.remainder;
        let mut period = self.period_us;
        if self.carry >= self.rate_hz {
            self.carry -= self.rate_hz;
            period += 1;
        }
        MicrosDurationU32::from_ticks(period)
    }

    /// Alarm fired: return the code for this tick and schedule the next one
    fn advance<A: Alarm>(&mut self, alarm: &mut A) -> Option<u16> {
        alarm.clear_interrupt();
        let code = *self.table.get(self.index)?;
        self.index = (self.index + 1) % self.table.len();
        let period = self.next_period();
        if alarm.schedule(period).is_err() {
            warn!("Playback alarm not rescheduled, output holds at {}", code);
        }
        Some(code)
    }
}

/// PWM slice and alarms behind both generators, shared with the alarm interrupts
pub struct DacOutputs {
    pwm: Slice<Pwm4, FreeRunning>,
    alarm_w1: Alarm0,
    alarm_w2: Alarm1,
    playback: [Playback; 2],
}

impl DacOutputs {
    /// Take an enabled slice whose channel A drives W1 and channel B drives W2
    pub fn new(mut pwm: Slice<Pwm4, FreeRunning>, alarm_w1: Alarm0, alarm_w2: Alarm1) -> Self {
        pwm.set_top(PWM_TOP);
        Self {
            pwm,
            alarm_w1,
            alarm_w2,
            playback: Default::default(),
        }
    }

    fn set_duty(&mut self, channel: OutputChannel, code: u16) {
        let duty = code.min(PWM_TOP);
        let _ = match channel {
            OutputChannel::W1 => self.pwm.channel_a.set_duty_cycle(duty),
            OutputChannel::W2 => self.pwm.channel_b.set_duty_cycle(duty),
        };
    }

    fn stop(&mut self, channel: OutputChannel) {
        match channel {
            OutputChannel::W1 => self.playback[0].stop(&mut self.alarm_w1),
            OutputChannel::W2 => self.playback[1].stop(&mut self.alarm_w2),
        }
    }

    fn start(
        &mut self,
        channel: OutputChannel,
        samples: &[u16],
        rate: HertzU32,
    ) -> Result<(), HardwareError> {
        let first = match channel {
            OutputChannel::W1 => self.playback[0].start(&mut self.alarm_w1, samples, rate),
            OutputChannel::W2 => self.playback[1].start(&mut self.alarm_w2, samples, rate),
        }?;
        self.set_duty(channel, first);
        Ok(())
    }

    /// Step `channel` to its next sample. Called from the alarm interrupt.
    pub fn advance(&mut self, channel: OutputChannel) {
        let code = match channel {
            OutputChannel::W1 => self.playback[0].advance(&mut self.alarm_w1),
            OutputChannel::W2 => self.playback[1].advance(&mut self.alarm_w2),
        };
        if let Some(code) = code {
            self.set_duty(channel, code);
        }
    }
}

/// Handle on the generator outputs held in [`DAC`]
pub struct PwmDac;

impl PwmDac {
    fn with_outputs<R>(
        f: impl FnOnce(&mut DacOutputs) -> Result<R, HardwareError>,
    ) -> Result<R, HardwareError> {
        critical_section::with(|cs| {
            let mut outputs = DAC.borrow_ref_mut(cs);
            f(outputs.as_mut().ok_or(HardwareError::Dac)?)
        })
    }
}

impl WaveOutput for PwmDac {
    fn write_level(&mut self, channel: OutputChannel, code: u16) -> Result<(), HardwareError> {
        Self::with_outputs(|outputs| {
            outputs.stop(channel);
            outputs.set_duty(channel, code);
            Ok(())
        })
    }

    fn play_circular(
        &mut self,
        channel: OutputChannel,
        samples: &[u16],
        sample_rate: HertzU32,
    ) -> Result<(), HardwareError> {
        Self::with_outputs(|outputs| outputs.start(channel, samples, sample_rate))
    }
}

/// FIFO clock divider `(int, frac)` giving `rate_hz` round-robin sample pairs per second
fn fifo_divider(rate_hz: u32) -> Option<(u16, u8)> {
    if rate_hz == 0 {
        return None;
    }
    // Conversion period in 1/256 ADC clocks; two conversions per pair
    let period = (ADC_CLOCK_HZ as u64 * 256) / (2 * rate_hz as u64);
    if period < ADC_CYCLES_PER_SAMPLE * 256 {
        return None;
    }
    // The ADC waits 1 + int + frac/256 clocks between conversions
    let divider = period - 256;
    let int = u16::try_from(divider >> 8).ok()?;
    Some((int, (divider & 0xFF) as u8))
}

/// One blocking conversion of `pin`
fn one_shot<PIN>(adc: &mut Adc, pin: &mut PIN) -> Result<u16, HardwareError>
where
    Adc: OneShot<Adc, u16, PIN>,
{
    nb::block!(adc.read(pin)).map_err(|_| HardwareError::Adc)
}

/// On-chip ADC: capture inputs on GPIO26/27, DC inputs on GPIO28/29
pub struct BoardAdc {
    adc: Adc,
    capture: (AnalogIn<Gpio26>, AnalogIn<Gpio27>),
    dc: (AnalogIn<Gpio28>, AnalogIn<Gpio29>),
    timer: Timer,
}

impl BoardAdc {
    /// Take the ADC, its four inputs and a timer handle for deadlines
    pub fn new(
        adc: Adc,
        capture: (AnalogIn<Gpio26>, AnalogIn<Gpio27>),
        dc: (AnalogIn<Gpio28>, AnalogIn<Gpio29>),
        timer: Timer,
    ) -> Self {
        Self {
            adc,
            capture,
            dc,
            timer,
        }
    }

    fn now_us(&self) -> u64 {
        self.timer.get_counter().ticks()
    }

    fn deadline(&self, timeout: MillisDurationU32) -> u64 {
        self.now_us() + timeout.ticks() as u64 * 1000
    }

    /// Conversions paced by the ADC itself, alternating between the two inputs
    fn capture_fifo(
        &mut self,
        (int, frac): (u16, u8),
        a: &mut [u16],
        b: &mut [u16],
        timeout: MillisDurationU32,
    ) -> Result<(), HardwareError> {
        let timer = self.timer;
        let deadline = self.deadline(timeout);
        let mut fifo = self
            .adc
            .build_fifo()
            .clock_divider(int, frac)
            .set_channel(&mut self.capture.0)
            .round_robin((&self.capture.0, &self.capture.1))
            .start();
        for (x, y) in a.iter_mut().zip(b.iter_mut()) {
            while fifo.len() < 2 {
                if timer.get_counter().ticks() > deadline {
                    fifo.stop();
                    return Err(HardwareError::CaptureTimeout(timeout.ticks()));
                }
            }
            *x = fifo.read();
            *y = fifo.read();
        }
        fifo.stop();
        Ok(())
    }

    /// Single conversions paced by the timer, for rates too slow for the FIFO divider
    fn capture_paced(
        &mut self,
        rate_hz: u32,
        a: &mut [u16],
        b: &mut [u16],
        timeout: MillisDurationU32,
    ) -> Result<(), HardwareError> {
        let deadline = self.deadline(timeout);
        let start = self.now_us();
        for (i, (x, y)) in a.iter_mut().zip(b.iter_mut()).enumerate() {
            let due = start + (i as u64 * 1_000_000) / rate_hz as u64;
            while self.now_us() < due {
                if self.now_us() > deadline {
                    return Err(HardwareError::CaptureTimeout(timeout.ticks()));
                }
            }
            *x = one_shot(&mut self.adc, &mut self.capture.0)?;
            *y = one_shot(&mut self.adc, &mut self.capture.1)?;
        }
        Ok(())
    }
}

impl DualAdc for BoardAdc {
    fn read_single(&mut self, channel: InputChannel) -> Result<u16, HardwareError> {
        match channel {
            InputChannel::Ch1 => one_shot(&mut self.adc, &mut self.dc.0),
            InputChannel::Ch2 => one_shot(&mut self.adc, &mut self.dc.1),
        }
    }

    fn capture_dual(
        &mut self,
        sample_rate: HertzU32,
        a: &mut [u16],
        b: &mut [u16],
        timeout: MillisDurationU32,
    ) -> Result<(), HardwareError> {
        let rate_hz = sample_rate.to_Hz();
        if rate_hz == 0 {
            return Err(HardwareError::TimerRate(0));
        }
        match fifo_divider(rate_hz) {
            Some(divider) => self.capture_fifo(divider, a, b, timeout),
            None if rate_hz > ADC_CLOCK_HZ / (2 * ADC_CYCLES_PER_SAMPLE as u32) => {
                Err(HardwareError::TimerRate(rate_hz as u64))
            }
            None => self.capture_paced(rate_hz, a, b, timeout),
        }
    }
}
