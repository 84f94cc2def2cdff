//! Firmware core for a benchtop instrument combining a two-channel oscilloscope with a
//! two-channel arbitrary waveform generator, driven by a host application over a serial link.
//!
//! The host sends one newline-terminated ASCII command at a time (see [`command`]). Each
//! command configures hardware and, for the oscilloscope commands, streams raw 16-bit samples
//! back before the next line is read:
//!
//! - `m1`: set both input front ends, capture [`BUFFERSIZE`](buffer::BUFFERSIZE) sample pairs on
//!   one timer, stream CH1 then CH2
//! - `m2`: average 10 single-shot reads per channel, stream both averages
//! - `s1` / `s2`: change one generator, then re-arm both
//! - `dz`: set the dual supply rails
//!
//! Malformed or failed commands are logged and dropped; the host receives nothing.
//!
//! The core is hardware-agnostic. Pins and potentiometer buses are [`embedded_hal`] traits,
//! the host link is [`embedded_io`], and the converters sit behind
//! [`WaveOutput`](waveform::WaveOutput) and [`DualAdc`](sampling::DualAdc). The RP2040 binary
//! in this crate implements them for the bench board.
//!
//! ## Crate features
//!
//! - `defmt`: log through [`defmt`](https://docs.rs/defmt) instead of the `log` facade.
//! - `rp2040`: RP2040 board support and the `vscope_firmware` binary. Implies `defmt`.
//!
//! ## Demo
//!
//! ```ignore
//! use vscope_firmware::{
//!     buffer::CaptureBuffers,
//!     components::{AnalogFrontEnd, DualSupply},
//!     instrument::{Instrument, Peripherals},
//!     waveform::Calibration,
//! };
//!
//! let mut buffers = CaptureBuffers::new();
//! let mut instrument = Instrument::new(
//!     Peripherals {
//!         front_end: AnalogFrontEnd::new(front_end_spi, ch1_pins, ch2_pins),
//!         supply: DualSupply::new(supply_spi, supply_select),
//!         dac,
//!         adc,
//!     },
//!     [Calibration::W1, Calibration::W2],
//!     &mut buffers,
//! );
//! instrument.power_on()?;
//! instrument.serve(&mut uart)?;
//! ```

// Copyright 2024 VScope firmware contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), feature(doc_auto_cfg), feature(doc_cfg_hide))]

pub mod buffer;
pub mod command;
pub mod components;
pub mod error;
pub mod instrument;
pub mod link;
mod logger;
pub mod sampling;
pub mod waveform;

pub use error::{CommandError, HardwareError, ParseError};
pub use instrument::{Instrument, Peripherals, Session};
