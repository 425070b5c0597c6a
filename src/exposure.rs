//! Two-state exposure control
//!
//! The policy only looks at the peak raw count of a spectrum: below the low
//! threshold the sensor is raised to at least its boosted exposure, above the
//! high threshold it is lowered to at most its reduced exposure. Each field
//! only ever moves in the direction the reading calls for. There is no
//! continuous feedback.

use embedded_hal::{delay::DelayNs, i2c::I2c};

use crate::sensor::As7265x;
use crate::settings::{Gain, SensorSettings};
use crate::spectrum::RawSpectrum;
use crate::Error;

/// Integration time and gain of one exposure state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Exposure {
    /// Integration time in 2.8 ms cycles
    pub integration_time: u8,
    /// Analog gain
    pub gain: Gain,
}

/// Thresholds and target states of the exposure policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct ExposurePolicy {
    /// Peak count below which the spectrum counts as under-exposed
    pub low_threshold: u16,
    /// Peak count above which the spectrum counts as saturated
    pub high_threshold: u16,
    /// Floor applied when under-exposed
    pub boosted: Exposure,
    /// Ceiling applied when saturated
    pub reduced: Exposure,
}

impl Default for ExposurePolicy {
    fn default() -> Self {
        Self {
            low_threshold: 100,
            high_threshold: 2000,
            boosted: Exposure {
                integration_time: 200,
                gain: Gain::X16,
            },
            reduced: Exposure {
                integration_time: 50,
                gain: Gain::X1,
            },
        }
    }
}

impl ExposurePolicy {
    /// Settings to switch to after observing `spectrum` under `current`.
    ///
    /// Under-exposure raises integration time and gain to at least
    /// `boosted`, saturation lowers them to at most `reduced`. A field that
    /// is already past the target is left alone.
    ///
    /// `None` if the peak is within bounds or nothing would change. The bank
    /// mode is never changed.
    pub fn evaluate(
        &self,
        spectrum: &RawSpectrum,
        current: SensorSettings,
    ) -> Option<SensorSettings> {
        let peak = spectrum.max();
        let next = if peak < self.low_threshold {
            SensorSettings {
                integration_time: current.integration_time.max(self.boosted.integration_time),
                gain: current.gain.max(self.boosted.gain),
                mode: current.mode,
            }
        } else if peak > self.high_threshold {
            SensorSettings {
                integration_time: current.integration_time.min(self.reduced.integration_time),
                gain: current.gain.min(self.reduced.gain),
                mode: current.mode,
            }
        } else {
            return None;
        };
        (next != current).then_some(next)
    }
}

impl<I2C, E, D> As7265x<I2C, D>
where
    I2C: I2c<Error = E>,
    D: DelayNs,
{
    /// Read the raw spectrum and move to the exposure `policy` asks for.
    ///
    /// Returns the settings that were applied, or `None` if nothing changed.
    /// An unconfigured sensor is assumed to run [`SensorSettings::default`].
    pub fn adjust_sensor_settings(
        &mut self,
        policy: &ExposurePolicy,
    ) -> Result<Option<SensorSettings>, Error<E>> {
        let spectrum = self.read_raw_spectrum()?;
        let current = self.settings.unwrap_or_default();
        let Some(next) = policy.evaluate(&spectrum, current) else {
            return Ok(None);
        };
        debug!(
            "exposure: peak {} -> {} cycles, gain {}",
            spectrum.max(),
            next.integration_time,
            next.gain as u8
        );
        self.apply_settings(next)?;
        Ok(Some(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeBus, FakeSensor};
    use crate::registers::virt;
    use crate::settings::Mode;
    use crate::spectrum::{RawChannels, SubDevice};
    use embedded_hal_mock::eh1::delay::NoopDelay;

    fn spectrum_with_peak(peak: u16) -> RawSpectrum {
        RawSpectrum {
            vis: RawChannels {
                green: peak,
                ..RawChannels::default()
            },
            ..RawSpectrum::default()
        }
    }

    fn current() -> SensorSettings {
        SensorSettings {
            integration_time: 100,
            gain: Gain::X3_7,
            mode: Mode::Continuous,
        }
    }

    #[test]
    fn dark_spectrum_boosts_exposure() {
        let policy = ExposurePolicy::default();
        let next = policy.evaluate(&spectrum_with_peak(99), current()).unwrap();
        assert!(next.integration_time > current().integration_time);
        assert!(next.gain > current().gain);
        assert_eq!(next.mode, Mode::Continuous);
    }

    #[test]
    fn saturated_spectrum_reduces_exposure() {
        let policy = ExposurePolicy::default();
        let next = policy.evaluate(&spectrum_with_peak(2001), current()).unwrap();
        assert!(next.integration_time < current().integration_time);
        assert!(next.gain < current().gain);
    }

    #[test]
    fn in_range_or_already_applied_is_left_alone() {
        let policy = ExposurePolicy::default();
        assert_eq!(policy.evaluate(&spectrum_with_peak(100), current()), None);
        assert_eq!(policy.evaluate(&spectrum_with_peak(2000), current()), None);

        let boosted = policy.evaluate(&spectrum_with_peak(0), current()).unwrap();
        assert_eq!(policy.evaluate(&spectrum_with_peak(0), boosted), None);
    }

    #[test]
    fn dark_reading_never_lowers_default_gain() {
        let policy = ExposurePolicy::default();
        let start = SensorSettings::default();
        let next = policy.evaluate(&spectrum_with_peak(10), start).unwrap();
        assert_eq!(next.integration_time, 200);
        assert_eq!(next.gain, Gain::X64);
        assert_eq!(next.mode, start.mode);
    }

    #[test]
    fn saturated_reading_never_lengthens_short_integration() {
        let policy = ExposurePolicy::default();
        let start = SensorSettings {
            integration_time: 10,
            gain: Gain::X16,
            mode: Mode::Continuous,
        };
        let next = policy.evaluate(&spectrum_with_peak(5000), start).unwrap();
        assert_eq!(next.integration_time, 10);
        assert_eq!(next.gain, Gain::X1);

        let floor = SensorSettings {
            gain: Gain::X1,
            ..start
        };
        assert_eq!(policy.evaluate(&spectrum_with_peak(5000), floor), None);
    }

    #[test]
    fn adjustment_moves_each_field_the_right_way() {
        let policy = ExposurePolicy::default();
        for integration_time in [1, 10, 49, 50, 100, 200, 255] {
            for gain in [Gain::X1, Gain::X3_7, Gain::X16, Gain::X64] {
                let start = SensorSettings {
                    integration_time,
                    gain,
                    mode: Mode::Bank1,
                };
                if let Some(next) = policy.evaluate(&spectrum_with_peak(0), start) {
                    assert!(next.integration_time >= start.integration_time);
                    assert!(next.gain >= start.gain);
                }
                if let Some(next) = policy.evaluate(&spectrum_with_peak(u16::MAX), start) {
                    assert!(next.integration_time <= start.integration_time);
                    assert!(next.gain <= start.gain);
                }
            }
        }
    }

    #[test]
    fn adjust_applies_policy_to_device() {
        let mut sensor = FakeSensor::new();
        sensor.load_raw(SubDevice::Nir, [5000, 0, 0, 0, 0, 0]);
        let mut bus = FakeBus::direct(sensor);
        {
            let mut driver = As7265x::new(&mut bus, NoopDelay);
            driver.configure(100, 2, 2).unwrap();
            let applied = driver
                .adjust_sensor_settings(&ExposurePolicy::default())
                .unwrap()
                .unwrap();
            assert_eq!(applied.integration_time, 50);
            assert_eq!(applied.gain, Gain::X1);
            assert_eq!(driver.settings(), Some(applied));

            assert_eq!(
                driver
                    .adjust_sensor_settings(&ExposurePolicy::default())
                    .unwrap(),
                None
            );
        }
        assert_eq!(
            bus.sensor().common[virt::INTEGRATION_TIME as usize],
            50
        );
    }
}
