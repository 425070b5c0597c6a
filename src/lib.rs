//! # AS7265x Spectral Triad + TCA9548A Multiplexer Driver
//!
//! A platform-agnostic Rust driver for the AMS AS7265x 18-channel spectral
//! sensor triad and the TCA9548A I2C multiplexer that fans it out, built on
//! the [`embedded-hal`] blocking traits.
//!
//! The AS7265x exposes only three physical registers (STATUS, WRITE, READ).
//! Configuration and measurement data live in *virtual* registers that are
//! reached through a byte-wide mailbox handshake. This crate implements that
//! handshake with bounded polling and retried transfers, and builds on it:
//!
//! - Sub-device selection (NIR / VIS / UV) with read-back verification
//! - Raw 16-bit and calibrated IEEE-754 spectrum reads, reordered into
//!   ascending wavelength order (410 nm ... 940 nm)
//! - Integration time, gain and bank mode configuration
//! - A two-state exposure policy for under- and over-exposed readings
//! - Multiplexer channel control with ground-truth read-back
//! - [`SensorArray`]: one sensor address repeated on several mux channels,
//!   with the whole select → read sequence held under one `&mut` borrow
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use as7265x_mux::{As7265x, Tca9548a};
//! use core::cell::RefCell;
//! use embedded_hal_bus::i2c::RefCellDevice;
//!
//! # fn main() {
//! # let i2c = embedded_hal_mock::eh1::i2c::Mock::new(&[]);
//! # let delay = embedded_hal_mock::eh1::delay::NoopDelay;
//! let bus = RefCell::new(i2c);
//! let mut mux = Tca9548a::new(RefCellDevice::new(&bus));
//! let mut sensor = As7265x::new(RefCellDevice::new(&bus), delay);
//!
//! mux.select_channel(3).unwrap();
//! sensor.init().unwrap();
//! sensor.configure(49, 3, 3).unwrap();
//!
//! let spectrum = sensor.read_calibrated_spectrum().unwrap();
//! for (nm, value) in spectrum.iter() {
//!     // ...
//! #   let _ = (nm, value);
//! }
//! # }
//! ```
//!
//! ## Sharing the bus
//!
//! Both drivers own their bus handle. To put them on one physical bus use
//! the device wrappers from [`embedded-hal-bus`] (`RefCellDevice` in a single
//! context, `MutexDevice` or `CriticalSectionDevice` otherwise). Those only
//! make *single transfers* atomic; the multi-transfer sequences of this
//! driver must be serialised by the caller, which is what [`SensorArray`]
//! does.
//!
//! ## Logging
//!
//! The driver is silent by default. Enable `defmt-03` or `log` to get trace
//! output of retries, timeouts and configuration changes.
//!
//! [`embedded-hal`]: https://crates.io/crates/embedded-hal
//! [`embedded-hal-bus`]: https://crates.io/crates/embedded-hal-bus

#![no_std]
#![deny(missing_docs)]

#[cfg(test)]
extern crate std;

#[macro_use]
mod fmt;

mod array;
mod exposure;
mod mux;
pub mod registers;
mod sensor;
mod settings;
mod spectrum;

#[cfg(test)]
mod fake;

use core::fmt as core_fmt;

pub use array::SensorArray;
pub use exposure::{Exposure, ExposurePolicy};
pub use mux::{ChannelSet, Tca9548a};
pub use sensor::{As7265x, Status, Timing};
pub use settings::{cycles_to_ms, ms_to_cycles, Gain, Mode, SensorSettings, CYCLE_MS};
pub use spectrum::{
    decode_calibrated, reorder, CalibratedSpectrum, Color, RawChannels, RawSpectrum, SubDevice,
    REORDER, SPECTRUM_CHANNELS, WAVELENGTHS_NM,
};

/// Step of a virtual register transaction that waits on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Phase {
    /// Waiting for TX_VALID to clear before sending the register address
    AwaitingTxReady,
    /// Waiting for TX_VALID to clear before sending the value of a write
    AwaitingTxReadyAgain,
    /// Waiting for RX_VALID after sending the address of a read
    AwaitingRxValid,
    /// Waiting for the data-ready bit of a one-shot measurement
    AwaitingDataReady,
}

impl core_fmt::Display for Phase {
    fn fmt(&self, f: &mut core_fmt::Formatter<'_>) -> core_fmt::Result {
        match self {
            Phase::AwaitingTxReady | Phase::AwaitingTxReadyAgain => {
                f.write_str("TX_VALID did not clear")
            }
            Phase::AwaitingRxValid => f.write_str("RX_VALID was not set"),
            Phase::AwaitingDataReady => f.write_str("measurement data never became ready"),
        }
    }
}

/// All possible errors in this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Error<E> {
    /// Single I2C transfer failed (multiplexer traffic is not retried)
    I2c(E),
    /// A retried physical transfer failed on every attempt
    TransactionFailed {
        /// Number of attempts made
        attempts: u8,
        /// Error of the last attempt
        source: E,
    },
    /// Multiplexer channel outside 0..=7
    InvalidChannel(u8),
    /// Configuration value out of range
    InvalidParameter(&'static str),
    /// A status poll exceeded its attempt bound
    Timeout(Phase),
    /// Device selector read back a different sub-device than was written
    DeviceSelection {
        /// Selector value written
        expected: u8,
        /// Selector value read back
        found: u8,
    },
    /// READY bit never came up
    DeviceNotReady,
    /// Device type register does not identify an AS7265x
    UnexpectedDevice {
        /// Expected device type
        expected: u8,
        /// Device type found
        found: u8,
    },
    /// Multiplexer control register does not hold the mask just written
    ChannelVerification {
        /// Mask written
        expected: u8,
        /// Mask read back
        found: u8,
    },
}

impl<E: core_fmt::Debug> core_fmt::Display for Error<E> {
    fn fmt(&self, f: &mut core_fmt::Formatter<'_>) -> core_fmt::Result {
        match self {
            Error::I2c(e) => write!(f, "I2C error: {e:?}"),
            Error::TransactionFailed { attempts, source } => {
                write!(f, "I2C transfer failed after {attempts} attempts: {source:?}")
            }
            Error::InvalidChannel(channel) => write!(f, "invalid multiplexer channel {channel}"),
            Error::InvalidParameter(what) => write!(f, "invalid parameter: {what}"),
            Error::Timeout(phase) => write!(f, "timeout: {phase}"),
            Error::DeviceSelection { expected, found } => write!(
                f,
                "device selection mismatch: wrote {expected:#04x}, read back {found:#04x}"
            ),
            Error::DeviceNotReady => f.write_str("device not ready"),
            Error::UnexpectedDevice { expected, found } => write!(
                f,
                "unexpected device type {found:#04x} (expected {expected:#04x})"
            ),
            Error::ChannelVerification { expected, found } => write!(
                f,
                "multiplexer holds {found:#010b}, expected {expected:#010b}"
            ),
        }
    }
}
