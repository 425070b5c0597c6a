//! AS7265x driver core: physical transfers and the virtual register handshake

use embedded_hal::{delay::DelayNs, i2c::I2c};

use crate::registers::{config, physical, status, virt, DEVICE_TYPE, SENSOR_ADDRESS, WRITE_FLAG};
use crate::settings::SensorSettings;
use crate::spectrum::SubDevice;
use crate::{Error, Phase};

/// Delays and attempt bounds of the protocol.
///
/// Attempt counts of zero are treated as one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Timing {
    /// Delay between two status polls
    pub poll_interval_ms: u32,
    /// Status polls before a handshake step times out
    pub poll_attempts: u8,
    /// Attempts per physical register transfer
    pub transfer_attempts: u8,
    /// Delay between two attempts of a physical transfer
    pub transfer_retry_ms: u32,
    /// READY polls in [`As7265x::verify_ready_state`]
    pub ready_attempts: u8,
    /// Delay between two READY polls
    pub ready_interval_ms: u32,
    /// Settle time after a soft reset
    pub reset_settle_ms: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            poll_attempts: 5,
            transfer_attempts: 3,
            transfer_retry_ms: 50,
            ready_attempts: 5,
            ready_interval_ms: 2000,
            reset_settle_ms: 5000,
        }
    }
}

/// Snapshot of the physical status register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Status(pub u8);

impl Status {
    /// Write buffer still holds an unconsumed byte
    pub const fn tx_busy(self) -> bool {
        self.0 & status::TX_VALID != 0
    }

    /// Read buffer holds a byte for the host
    pub const fn rx_valid(self) -> bool {
        self.0 & status::RX_VALID != 0
    }

    /// Device has completed its boot sequence
    pub const fn ready(self) -> bool {
        self.0 & status::READY != 0
    }
}

/// AS7265x spectral triad driver
///
/// Every virtual register access is a strictly sequential sequence of
/// physical transfers. The driver takes `&mut self` for all of them, so a
/// single instance can never interleave two transactions.
pub struct As7265x<I2C, D> {
    pub(crate) i2c: I2C,
    pub(crate) delay: D,
    pub(crate) address: u8,
    pub(crate) timing: Timing,
    pub(crate) selected: Option<SubDevice>,
    pub(crate) settings: Option<SensorSettings>,
}

impl<I2C, E, D> As7265x<I2C, D>
where
    I2C: I2c<Error = E>,
    D: DelayNs,
{
    /// Create a driver for a sensor at the default address 0x49
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self::with_address(i2c, delay, SENSOR_ADDRESS)
    }

    /// Create a driver for a sensor at `address`
    pub fn with_address(i2c: I2C, delay: D, address: u8) -> Self {
        Self {
            i2c,
            delay,
            address,
            timing: Timing::default(),
            selected: None,
            settings: None,
        }
    }

    /// Replace the protocol timing
    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    /// I2C address of the sensor
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Protocol timing in use
    pub fn timing(&self) -> Timing {
        self.timing
    }

    /// Sub-device most recently selected and verified
    pub fn selected_device(&self) -> Option<SubDevice> {
        self.selected
    }

    /// Settings most recently applied with [`As7265x::configure`]
    pub fn settings(&self) -> Option<SensorSettings> {
        self.settings
    }

    /// Destroy the driver and return the I2C interface
    pub fn destroy(self) -> I2C {
        self.i2c
    }

    /// Probe the sensor, wait for READY and check the device type
    pub fn init(&mut self) -> Result<(), Error<E>> {
        self.read_status()?;
        if !self.verify_ready_state() {
            return Err(Error::DeviceNotReady);
        }
        let found = self.read_virtual(virt::HW_VERSION_HIGH)?;
        if found != DEVICE_TYPE {
            return Err(Error::UnexpectedDevice {
                expected: DEVICE_TYPE,
                found,
            });
        }
        debug!("AS7265x at {:#x} ready", self.address);
        Ok(())
    }

    /// Hardware version: device type in the high byte, revision in the low byte
    pub fn hardware_version(&mut self) -> Result<u16, Error<E>> {
        self.read_virtual_u16(virt::HW_VERSION_HIGH, virt::HW_VERSION_LOW)
    }

    /// Firmware version
    pub fn firmware_version(&mut self) -> Result<u16, Error<E>> {
        self.read_virtual_u16(virt::FW_VERSION_HIGH, virt::FW_VERSION_LOW)
    }

    /// Issue a soft reset and wait for the device to settle.
    ///
    /// All device-side configuration is lost; the cached selection and
    /// settings are cleared.
    pub fn soft_reset(&mut self) -> Result<(), Error<E>> {
        let value = self.read_virtual(virt::CONFIG)?;
        self.write_virtual(virt::CONFIG, value | config::RESET)?;
        self.selected = None;
        self.settings = None;
        debug!("AS7265x soft reset, settling {} ms", self.timing.reset_settle_ms);
        self.delay.delay_ms(self.timing.reset_settle_ms);
        Ok(())
    }

    /// [`As7265x::soft_reset`] followed by [`As7265x::verify_ready_state`]
    pub fn reset_and_verify(&mut self) -> Result<(), Error<E>> {
        self.soft_reset()?;
        if self.verify_ready_state() {
            Ok(())
        } else {
            Err(Error::DeviceNotReady)
        }
    }

    /// Poll the READY bit with the configured bound.
    ///
    /// Returns false if it never came up. Transfer failures count as a
    /// not-ready poll.
    pub fn verify_ready_state(&mut self) -> bool {
        let attempts = self.timing.ready_attempts.max(1);
        for attempt in 1..=attempts {
            match self.read_status() {
                Ok(status) if status.ready() => return true,
                Ok(_) => trace!("READY poll {}/{}: not ready", attempt, attempts),
                Err(_) => trace!("READY poll {}/{}: transfer failed", attempt, attempts),
            }
            if attempt < attempts {
                self.delay.delay_ms(self.timing.ready_interval_ms);
            }
        }
        warn!("AS7265x at {:#x} not ready", self.address);
        false
    }

    /// Write a virtual register.
    ///
    /// Waits for TX_VALID to clear, sends the address with [`WRITE_FLAG`],
    /// waits again and sends the value.
    pub fn write_virtual(&mut self, register: u8, value: u8) -> Result<(), Error<E>> {
        self.wait_for_status(Phase::AwaitingTxReady, |status| !status.tx_busy())?;
        self.physical_write(physical::WRITE, register | WRITE_FLAG)?;
        self.wait_for_status(Phase::AwaitingTxReadyAgain, |status| !status.tx_busy())?;
        self.physical_write(physical::WRITE, value)
    }

    /// Read a virtual register.
    ///
    /// A byte left in the read buffer by an earlier, abandoned transaction is
    /// drained first so it cannot be mistaken for the answer.
    pub fn read_virtual(&mut self, register: u8) -> Result<u8, Error<E>> {
        if self.read_status()?.rx_valid() {
            let stale = self.physical_read(physical::READ)?;
            trace!("drained stale RX byte {:#x}", stale);
        }
        self.wait_for_status(Phase::AwaitingTxReady, |status| !status.tx_busy())?;
        self.physical_write(physical::WRITE, register)?;
        self.wait_for_status(Phase::AwaitingRxValid, Status::rx_valid)?;
        self.physical_read(physical::READ)
    }

    /// Read the physical status register
    pub fn read_status(&mut self) -> Result<Status, Error<E>> {
        self.physical_read(physical::STATUS).map(Status)
    }

    /// Read one physical register, retrying transport failures
    pub fn physical_read(&mut self, register: u8) -> Result<u8, Error<E>> {
        self.with_retry(|i2c, address| {
            let mut buf = [0u8; 1];
            i2c.write_read(address, &[register], &mut buf)?;
            Ok(buf[0])
        })
    }

    /// Write one physical register, retrying transport failures
    pub fn physical_write(&mut self, register: u8, value: u8) -> Result<(), Error<E>> {
        self.with_retry(|i2c, address| i2c.write(address, &[register, value]))
    }

    pub(crate) fn read_virtual_u16(&mut self, high: u8, low: u8) -> Result<u16, Error<E>> {
        let high = self.read_virtual(high)?;
        let low = self.read_virtual(low)?;
        Ok(u16::from_be_bytes([high, low]))
    }

    /// Run `done` up to `poll_attempts` times, `poll_interval_ms` apart,
    /// until it reports true. Exhausting the bound is `Timeout(phase)`.
    pub(crate) fn poll_until(
        &mut self,
        phase: Phase,
        mut done: impl FnMut(&mut Self) -> Result<bool, Error<E>>,
    ) -> Result<(), Error<E>> {
        let attempts = self.timing.poll_attempts.max(1);
        for attempt in 1..=attempts {
            if done(&mut *self)? {
                return Ok(());
            }
            if attempt < attempts {
                self.delay.delay_ms(self.timing.poll_interval_ms);
            }
        }
        warn!("AS7265x poll timed out after {} attempts: {}", attempts, phase);
        Err(Error::Timeout(phase))
    }

    fn wait_for_status(&mut self, phase: Phase, ready: fn(Status) -> bool) -> Result<(), Error<E>> {
        self.poll_until(phase, |sensor| sensor.read_status().map(ready))
    }

    fn with_retry<T>(
        &mut self,
        mut transfer: impl FnMut(&mut I2C, u8) -> Result<T, E>,
    ) -> Result<T, Error<E>> {
        let attempts = self.timing.transfer_attempts.max(1);
        let mut attempt = 1;
        loop {
            match transfer(&mut self.i2c, self.address) {
                Ok(value) => return Ok(value),
                Err(source) if attempt >= attempts => {
                    warn!("I2C transfer failed after {} attempts", attempt);
                    return Err(Error::TransactionFailed {
                        attempts: attempt,
                        source,
                    });
                }
                Err(_) => {
                    trace!("I2C transfer attempt {} failed, retrying", attempt);
                    self.delay.delay_ms(self.timing.transfer_retry_ms);
                    attempt += 1;
                }
            }
        }
    }
}
