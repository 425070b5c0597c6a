//! TCA9548A 1-to-8 I2C multiplexer

use core::fmt;

use embedded_hal::i2c::I2c;

use crate::registers::{MUX_ADDRESS, MUX_CHANNELS};
use crate::Error;

/// Set of multiplexer channels, stored as the control register bitmask
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct ChannelSet(u8);

impl ChannelSet {
    /// No channel connected
    pub const EMPTY: Self = Self(0);

    /// Set from a raw control register value
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Control register value
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Set containing only `channel`
    pub fn single(channel: u8) -> Option<Self> {
        (channel < MUX_CHANNELS).then(|| Self(1 << channel))
    }

    /// Whether `channel` is in the set
    pub fn contains(self, channel: u8) -> bool {
        channel < MUX_CHANNELS && self.0 & (1 << channel) != 0
    }

    /// Add `channel`. Returns false if it is out of range.
    pub fn insert(&mut self, channel: u8) -> bool {
        if channel >= MUX_CHANNELS {
            return false;
        }
        self.0 |= 1 << channel;
        true
    }

    /// Remove `channel` if present
    pub fn remove(&mut self, channel: u8) {
        if channel < MUX_CHANNELS {
            self.0 &= !(1 << channel);
        }
    }

    /// True if no channel is connected
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of channels in the set
    pub const fn len(self) -> u32 {
        self.0.count_ones()
    }

    /// Channels in ascending order
    pub fn iter(self) -> impl Iterator<Item = u8> {
        (0..MUX_CHANNELS).filter(move |&c| self.0 & (1 << c) != 0)
    }
}

impl fmt::Debug for ChannelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// TCA9548A driver
///
/// The control register is the device's only register: a write sets the
/// channel mask, a read returns it. The driver remembers the last mask it
/// wrote, but [`Tca9548a::active_channels`] is the only ground truth.
pub struct Tca9548a<I2C> {
    i2c: I2C,
    address: u8,
    presumed: Option<ChannelSet>,
}

impl<I2C, E> Tca9548a<I2C>
where
    I2C: I2c<Error = E>,
{
    /// Create a driver for a multiplexer at the default address 0x70
    pub fn new(i2c: I2C) -> Self {
        Self::with_address(i2c, MUX_ADDRESS)
    }

    /// Create a driver for a multiplexer at `address` (0x70..=0x77)
    pub fn with_address(i2c: I2C, address: u8) -> Self {
        Self {
            i2c,
            address,
            presumed: None,
        }
    }

    /// I2C address of the multiplexer
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Connect exactly one channel
    pub fn select_channel(&mut self, channel: u8) -> Result<(), Error<E>> {
        let set = ChannelSet::single(channel).ok_or(Error::InvalidChannel(channel))?;
        self.write_mask(set)
    }

    /// Connect every channel in `channels` at once.
    ///
    /// All channels are validated before anything is written.
    pub fn select_channels<C>(&mut self, channels: C) -> Result<(), Error<E>>
    where
        C: IntoIterator<Item = u8>,
    {
        let mut set = ChannelSet::EMPTY;
        for channel in channels {
            if !set.insert(channel) {
                return Err(Error::InvalidChannel(channel));
            }
        }
        self.write_mask(set)
    }

    /// Disconnect all channels
    pub fn disable_all(&mut self) -> Result<(), Error<E>> {
        self.write_mask(ChannelSet::EMPTY)
    }

    /// Disconnect one channel, leaving the others as the hardware reports them.
    ///
    /// The hardware has no per-channel disable, so this reads the control
    /// register, clears the bit and writes the whole mask back.
    pub fn disable_channel(&mut self, channel: u8) -> Result<(), Error<E>> {
        if channel >= MUX_CHANNELS {
            return Err(Error::InvalidChannel(channel));
        }
        let mut set = self.active_channels()?;
        set.remove(channel);
        self.write_mask(set)
    }

    /// Read the control register back
    pub fn active_channels(&mut self) -> Result<ChannelSet, Error<E>> {
        let mut buf = [0u8; 1];
        self.i2c.read(self.address, &mut buf).map_err(Error::I2c)?;
        Ok(ChannelSet::from_bits(buf[0]))
    }

    /// Mask most recently written by this driver, `None` before the first write.
    ///
    /// Other bus masters or a mux reset invalidate this; use
    /// [`Tca9548a::active_channels`] when it matters.
    pub fn presumed_channels(&self) -> Option<ChannelSet> {
        self.presumed
    }

    /// Destroy the driver and return the I2C interface
    pub fn destroy(self) -> I2C {
        self.i2c
    }

    fn write_mask(&mut self, set: ChannelSet) -> Result<(), Error<E>> {
        trace!("mux {:#x}: mask {:#b}", self.address, set.bits());
        match self.i2c.write(self.address, &[set.bits()]) {
            Ok(()) => {
                self.presumed = Some(set);
                Ok(())
            }
            Err(e) => {
                // Unknown what the device latched
                self.presumed = None;
                Err(Error::I2c(e))
            }
        }
    }
}
