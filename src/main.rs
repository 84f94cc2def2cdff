//! Bench oscilloscope and waveform generator firmware for the RP2040.
#![no_std]
#![no_main]
#![doc(html_playground_url = "https://play.rust-lang.org/")]
#![warn(missing_docs)]

use defmt::{error, info};
#[allow(unused_imports)]
use defmt_rtt as _;
#[allow(unused_imports)]
use panic_probe as _;
use rp2040_hal::{
    adc::AdcPin,
    clocks::init_clocks_and_plls,
    entry,
    fugit::RateExtU32,
    gpio::{DynPinId, FunctionSioOutput, FunctionSpi, FunctionUart, Pin, Pins, PullDown},
    pac,
    prelude::*,
    pwm::Slices,
    spi::Spi,
    uart::{DataBits, StopBits, UartConfig, UartPeripheral},
    Adc, Sio, Timer, Watchdog,
};
use vscope_firmware::{
    buffer::CaptureBuffers,
    components::{AnalogFrontEnd, DualSupply, FrontEndPins},
    instrument::{Instrument, Peripherals},
    waveform::Calibration,
};

use crate::{
    board::{BoardAdc, DacOutputs, PwmDac},
    interrupt::DAC,
};

mod board;
mod interrupt;

/// Second-stage bootloader, from [rp2040-boot2](https://docs.rs/rp2040-boot2)
#[link_section = ".boot2"]
#[used]
pub static BOOT2: [u8; 256] = rp2040_boot2::BOOT_LOADER_W25Q080;
/// External high-speed crystal on the pico board is 12Mhz
pub const XOSC_FREQ_HZ: u32 = 12_000_000;
/// Host link baud rate
pub const HOST_BAUD: u32 = 115_200;
/// Potentiometer bus clock
pub const POT_SPI_HZ: u32 = 1_000_000;

/// Select and coupling lines share one pin type
type SelectPin = Pin<DynPinId, FunctionSioOutput, PullDown>;

/// Main operation loop
#[entry]
fn main() -> ! {
    info!("Instrument startup");
    let mut pac = pac::Peripherals::take().unwrap();
    let mut watchdog = Watchdog::new(pac.WATCHDOG);
    let sio = Sio::new(pac.SIO);

    let clocks = init_clocks_and_plls(
        XOSC_FREQ_HZ,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    )
    .ok()
    .unwrap();
    let pins = Pins::new(
        pac.IO_BANK0,
        pac.PADS_BANK0,
        sio.gpio_bank0,
        &mut pac.RESETS,
    );

    // Host link on UART0
    let uart_pins = (
        pins.gpio0.into_function::<FunctionUart>(),
        pins.gpio1.into_function::<FunctionUart>(),
    );
    let mut host = UartPeripheral::new(pac.UART0, uart_pins, &mut pac.RESETS)
        .enable(
            UartConfig::new(HOST_BAUD.Hz(), DataBits::Eight, None, StopBits::One),
            clocks.peripheral_clock.freq(),
        )
        .unwrap();

    // Front end pots on SPI0, supply pot on SPI1
    let front_end_spi = Spi::<_, _, _, 8>::new(
        pac.SPI0,
        (
            pins.gpio19.into_function::<FunctionSpi>(),
            pins.gpio18.into_function::<FunctionSpi>(),
        ),
    )
    .init(
        &mut pac.RESETS,
        clocks.peripheral_clock.freq(),
        POT_SPI_HZ.Hz(),
        embedded_hal::spi::MODE_0,
    );
    let supply_spi = Spi::<_, _, _, 8>::new(
        pac.SPI1,
        (
            pins.gpio11.into_function::<FunctionSpi>(),
            pins.gpio10.into_function::<FunctionSpi>(),
        ),
    )
    .init(
        &mut pac.RESETS,
        clocks.peripheral_clock.freq(),
        POT_SPI_HZ.Hz(),
        embedded_hal::spi::MODE_0,
    );

    let ch1: FrontEndPins<SelectPin> = FrontEndPins {
        coupling_a: pins.gpio2.into_push_pull_output().into_dyn_pin(),
        coupling_b: pins.gpio3.into_push_pull_output().into_dyn_pin(),
        gain_select: pins.gpio4.into_push_pull_output().into_dyn_pin(),
        offset_select: pins.gpio5.into_push_pull_output().into_dyn_pin(),
    };
    let ch2: FrontEndPins<SelectPin> = FrontEndPins {
        coupling_a: pins.gpio6.into_push_pull_output().into_dyn_pin(),
        coupling_b: pins.gpio7.into_push_pull_output().into_dyn_pin(),
        gain_select: pins.gpio12.into_push_pull_output().into_dyn_pin(),
        offset_select: pins.gpio13.into_push_pull_output().into_dyn_pin(),
    };
    let supply_select: SelectPin = pins.gpio14.into_push_pull_output().into_dyn_pin();

    // Generators: PWM slice 4 stepped by timer alarms 0 and 1
    let mut timer = Timer::new(pac.TIMER, &mut pac.RESETS, &clocks);
    let mut pwm_slices = Slices::new(pac.PWM, &mut pac.RESETS);
    pwm_slices.pwm4.enable();
    pwm_slices.pwm4.channel_a.output_to(pins.gpio8);
    pwm_slices.pwm4.channel_b.output_to(pins.gpio9);
    let outputs = DacOutputs::new(
        pwm_slices.pwm4,
        timer.alarm_0().unwrap(),
        timer.alarm_1().unwrap(),
    );
    critical_section::with(|cs| DAC.replace(cs, Some(outputs)));

    // Capture inputs on GPIO26/27, DC inputs on GPIO28/29
    let adc = BoardAdc::new(
        Adc::new(pac.ADC, &mut pac.RESETS),
        (
            AdcPin::new(pins.gpio26.into_floating_input()).unwrap(),
            AdcPin::new(pins.gpio27.into_floating_input()).unwrap(),
        ),
        (
            AdcPin::new(pins.gpio28.into_floating_input()).unwrap(),
            AdcPin::new(pins.gpio29.into_floating_input()).unwrap(),
        ),
        timer,
    );

    let buffers = cortex_m::singleton!(: CaptureBuffers = CaptureBuffers::new()).unwrap();
    let mut instrument = Instrument::new(
        Peripherals {
            front_end: AnalogFrontEnd::new(front_end_spi, ch1, ch2),
            supply: DualSupply::new(supply_spi, supply_select),
            dac: PwmDac,
            adc,
        },
        [Calibration::W1, Calibration::W2],
        buffers,
    );

    unsafe {
        pac::NVIC::unmask(pac::Interrupt::TIMER_IRQ_0);
        pac::NVIC::unmask(pac::Interrupt::TIMER_IRQ_1);
    }
    if let Err(err) = instrument.power_on() {
        error!("Power on failed: {}", err);
    }

    info!("Serving host on UART0");
    loop {
        if let Err(err) = instrument.serve(&mut host) {
            error!("Host link: {}", err);
        }
    }
}
