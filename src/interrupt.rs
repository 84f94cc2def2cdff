//! Interrupt handlers, plus static [`Mutex`].

use core::cell::RefCell;
use critical_section::Mutex;
use rp2040_hal::pac::interrupt;
use vscope_firmware::waveform::OutputChannel;

use crate::board::DacOutputs;

/// Generator outputs, stepped by the alarm interrupts
pub static DAC: Mutex<RefCell<Option<DacOutputs>>> = Mutex::new(RefCell::new(None));

/// Alarm 0: next W1 sample
#[interrupt]
fn TIMER_IRQ_0() {
    critical_section::with(|cs| {
        if let Some(outputs) = DAC.borrow_ref_mut(cs).as_mut() {
            outputs.advance(OutputChannel::W1);
        }
    });
}

/// Alarm 1: next W2 sample
#[interrupt]
fn TIMER_IRQ_1() {
    critical_section::with(|cs| {
        if let Some(outputs) = DAC.borrow_ref_mut(cs).as_mut() {
            outputs.advance(OutputChannel::W2);
        }
    });
}
