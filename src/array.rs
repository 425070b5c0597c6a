//! Several identical sensors behind one multiplexer

use embedded_hal::{delay::DelayNs, i2c::I2c};

use crate::exposure::ExposurePolicy;
use crate::mux::{ChannelSet, Tca9548a};
use crate::registers::MUX_CHANNELS;
use crate::sensor::As7265x;
use crate::settings::SensorSettings;
use crate::spectrum::{CalibratedSpectrum, RawSpectrum};
use crate::Error;

/// AS7265x sensors sharing one address, each on its own multiplexer channel.
///
/// A single [`As7265x`] driver serves every channel. Each operation selects
/// the channel, confirms it by reading the control register back and then
/// runs the whole sensor sequence while `self` is mutably borrowed, so no
/// other channel switch can land in the middle of a read. Share the array
/// between threads by putting it behind a mutex, not by sharing the bus.
///
/// The settings last applied on each channel are kept by the array and
/// handed to the driver while that channel is selected.
///
/// If an operation fails part-way the bus state is unknown; re-initialise
/// the affected sensor before trusting it again.
pub struct SensorArray<MI, SI, D> {
    mux: Tca9548a<MI>,
    sensor: As7265x<SI, D>,
    settings: [Option<SensorSettings>; MUX_CHANNELS as usize],
}

impl<MI, SI, D, E> SensorArray<MI, SI, D>
where
    MI: I2c<Error = E>,
    SI: I2c<Error = E>,
    D: DelayNs,
{
    /// Combine a multiplexer and a sensor driver on the same bus
    pub fn new(mux: Tca9548a<MI>, sensor: As7265x<SI, D>) -> Self {
        Self {
            mux,
            sensor,
            settings: [None; MUX_CHANNELS as usize],
        }
    }

    /// Run `f` against the sensor on `channel`
    pub fn with_channel<R, F>(&mut self, channel: u8, f: F) -> Result<R, Error<E>>
    where
        F: FnOnce(&mut As7265x<SI, D>) -> Result<R, Error<E>>,
    {
        let expected = ChannelSet::single(channel).ok_or(Error::InvalidChannel(channel))?;
        self.mux.select_channel(channel)?;
        let found = self.mux.active_channels()?;
        if found != expected {
            warn!(
                "mux channel {} not active, control register {:#x}",
                channel,
                found.bits()
            );
            return Err(Error::ChannelVerification {
                expected: expected.bits(),
                found: found.bits(),
            });
        }
        // Different physical sensor: the sub-device cache belongs to another channel
        let slot = usize::from(channel);
        self.sensor.selected = None;
        self.sensor.settings = self.settings[slot];
        let result = f(&mut self.sensor);
        self.settings[slot] = self.sensor.settings;
        result
    }

    /// Initialise the sensor on `channel`
    pub fn init(&mut self, channel: u8) -> Result<(), Error<E>> {
        self.with_channel(channel, |sensor| sensor.init())
    }

    /// Configure the sensor on `channel`, see [`As7265x::configure`]
    pub fn configure(
        &mut self,
        channel: u8,
        integration_time: u16,
        gain: u8,
        mode: u8,
    ) -> Result<(), Error<E>> {
        self.with_channel(channel, |sensor| {
            sensor.configure(integration_time, gain, mode)
        })
    }

    /// Apply the exposure `policy` to the sensor on `channel`, see
    /// [`As7265x::adjust_sensor_settings`]
    pub fn adjust_exposure(
        &mut self,
        channel: u8,
        policy: &ExposurePolicy,
    ) -> Result<Option<SensorSettings>, Error<E>> {
        self.with_channel(channel, |sensor| sensor.adjust_sensor_settings(policy))
    }

    /// Settings last applied to the sensor on `channel`
    pub fn settings(&self, channel: u8) -> Option<SensorSettings> {
        self.settings.get(usize::from(channel)).copied().flatten()
    }

    /// Calibrated spectrum of the sensor on `channel`
    pub fn read_calibrated(&mut self, channel: u8) -> Result<CalibratedSpectrum, Error<E>> {
        self.with_channel(channel, |sensor| sensor.read_calibrated_spectrum())
    }

    /// Raw spectrum of the sensor on `channel`
    pub fn read_raw(&mut self, channel: u8) -> Result<RawSpectrum, Error<E>> {
        self.with_channel(channel, |sensor| sensor.read_raw_spectrum())
    }

    /// Disconnect every channel
    pub fn disable_all(&mut self) -> Result<(), Error<E>> {
        self.mux.disable_all()
    }

    /// The multiplexer driver
    pub fn mux(&mut self) -> &mut Tca9548a<MI> {
        &mut self.mux
    }

    /// Split back into the two drivers
    pub fn release(self) -> (Tca9548a<MI>, As7265x<SI, D>) {
        (self.mux, self.sensor)
    }
}
