//! Integration time, gain and bank mode

use embedded_hal::{delay::DelayNs, i2c::I2c};

use crate::registers::{config, virt, LED_INDICATOR};
use crate::sensor::As7265x;
use crate::spectrum::SubDevice;
use crate::{Error, Phase};

/// Length of one integration cycle in milliseconds
pub const CYCLE_MS: f32 = 2.8;

/// Analog gain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[repr(u8)]
pub enum Gain {
    /// 1x
    X1 = 0b00,
    /// 3.7x
    X3_7 = 0b01,
    /// 16x
    X16 = 0b10,
    /// 64x
    X64 = 0b11,
}

impl Gain {
    /// Decode the 2-bit register field
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Gain::X1),
            1 => Some(Gain::X3_7),
            2 => Some(Gain::X16),
            3 => Some(Gain::X64),
            _ => None,
        }
    }

    /// Amplification factor
    pub fn multiplier(self) -> f32 {
        match self {
            Gain::X1 => 1.0,
            Gain::X3_7 => 3.7,
            Gain::X16 => 16.0,
            Gain::X64 => 64.0,
        }
    }
}

/// Bank / measurement mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[repr(u8)]
pub enum Mode {
    /// Continuous, first four channels of each sub-device
    Bank0 = 0b00,
    /// Continuous, last four channels of each sub-device
    Bank1 = 0b01,
    /// Continuous, all six channels
    Continuous = 0b10,
    /// Single measurement of all six channels, then idle
    OneShot = 0b11,
}

impl Mode {
    /// Decode the 2-bit register field
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Mode::Bank0),
            1 => Some(Mode::Bank1),
            2 => Some(Mode::Continuous),
            3 => Some(Mode::OneShot),
            _ => None,
        }
    }
}

/// Settings applied by [`As7265x::configure`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct SensorSettings {
    /// Integration time in 2.8 ms cycles, 1..=255
    pub integration_time: u8,
    /// Analog gain
    pub gain: Gain,
    /// Bank mode
    pub mode: Mode,
}

impl Default for SensorSettings {
    /// Power-on defaults of the reference firmware: 49 cycles, 64x, one-shot
    fn default() -> Self {
        Self {
            integration_time: 49,
            gain: Gain::X64,
            mode: Mode::OneShot,
        }
    }
}

impl SensorSettings {
    /// Validate raw values the way [`As7265x::configure`] does
    pub fn new<E>(integration_time: u16, gain: u8, mode: u8) -> Result<Self, Error<E>> {
        let integration_time = u8::try_from(integration_time)
            .ok()
            .filter(|&t| t >= 1)
            .ok_or(Error::InvalidParameter("integration time must be 1..=255"))?;
        let gain = Gain::from_bits(gain).ok_or(Error::InvalidParameter("gain must be 0..=3"))?;
        let mode = Mode::from_bits(mode).ok_or(Error::InvalidParameter("mode must be 0..=3"))?;
        Ok(Self {
            integration_time,
            gain,
            mode,
        })
    }

    /// Integration time in milliseconds
    pub fn integration_ms(&self) -> f32 {
        cycles_to_ms(self.integration_time)
    }
}

/// Integration cycles to milliseconds
pub fn cycles_to_ms(cycles: u8) -> f32 {
    f32::from(cycles) * CYCLE_MS
}

/// Milliseconds to the nearest integration cycle count.
///
/// Returns `None` if the result falls outside 1..=255.
pub fn ms_to_cycles(ms: f32) -> Option<u8> {
    let cycles = libm::roundf(ms / CYCLE_MS);
    if (1.0..=255.0).contains(&cycles) {
        Some(cycles as u8)
    } else {
        None
    }
}

impl<I2C, E, D> As7265x<I2C, D>
where
    I2C: I2c<Error = E>,
    D: DelayNs,
{
    /// Apply integration time (1..=255 cycles), gain (0..=3) and mode (0..=3).
    ///
    /// Values are validated before any bus traffic. The device must report
    /// READY; integration time is committed before gain and mode.
    pub fn configure(&mut self, integration_time: u16, gain: u8, mode: u8) -> Result<(), Error<E>> {
        let settings = SensorSettings::new(integration_time, gain, mode)?;
        self.apply_settings(settings)
    }

    /// Apply already validated settings
    pub fn apply_settings(&mut self, settings: SensorSettings) -> Result<(), Error<E>> {
        if !self.verify_ready_state() {
            return Err(Error::DeviceNotReady);
        }

        self.write_virtual(virt::INTEGRATION_TIME, settings.integration_time)?;

        let value = self.read_virtual(virt::CONFIG)?;
        let value = (value & config::GAIN_KEEP_MASK) | ((settings.gain as u8) << config::GAIN_SHIFT);
        self.write_virtual(virt::CONFIG, value)?;

        let value = (value & config::MODE_KEEP_MASK) | ((settings.mode as u8) << config::MODE_SHIFT);
        self.write_virtual(virt::CONFIG, value)?;

        debug!(
            "AS7265x configured: {} cycles, gain {}, mode {}",
            settings.integration_time,
            settings.gain as u8,
            settings.mode as u8
        );
        self.settings = Some(settings);
        Ok(())
    }

    /// Start a one-shot measurement and wait for its data.
    ///
    /// Waits two integration periods, then polls the data-ready bit with the
    /// usual poll bound.
    pub fn take_one_shot(&mut self) -> Result<(), Error<E>> {
        let value = self.read_virtual(virt::CONFIG)?;
        let value = (value & config::MODE_KEEP_MASK) | ((Mode::OneShot as u8) << config::MODE_SHIFT);
        self.write_virtual(virt::CONFIG, value)?;
        if let Some(settings) = self.settings.as_mut() {
            settings.mode = Mode::OneShot;
        }

        let integration = self.settings.unwrap_or_default().integration_ms();
        self.delay.delay_us((2.0 * integration * 1000.0) as u32);

        self.poll_until(Phase::AwaitingDataReady, |sensor| {
            Ok(sensor.read_virtual(virt::CONFIG)? & config::DATA_READY != 0)
        })
    }

    /// Switch the indicator LED of one sub-device
    pub fn set_indicator_led(&mut self, device: SubDevice, on: bool) -> Result<(), Error<E>> {
        self.select_device(device)?;
        let value = self.read_virtual(virt::LED_CONFIG)?;
        let value = if on {
            value | LED_INDICATOR
        } else {
            value & !LED_INDICATOR
        };
        self.write_virtual(virt::LED_CONFIG, value)
    }
}
