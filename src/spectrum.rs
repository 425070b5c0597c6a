//! Sub-device selection and spectrum reads

use embedded_hal::{delay::DelayNs, i2c::I2c};

use crate::registers::{virt, CAL_WIDTH, CHANNELS_PER_DEVICE, DEV_SELECT_MASK, RAW_WIDTH};
use crate::sensor::As7265x;
use crate::Error;

/// Channels across the three sub-devices
pub const SPECTRUM_CHANNELS: usize = 18;

/// Band centres in ascending order, in nanometres
pub const WAVELENGTHS_NM: [u16; SPECTRUM_CHANNELS] = [
    410, 435, 460, 485, 510, 535, 560, 585, 610, 645, 680, 705, 730, 760, 810, 860, 900, 940,
];

/// Hardware position feeding each wavelength-ordered output slot.
///
/// Hardware order is UV (A..F), VIS (G, H, I, J, K, L), NIR (R, S, T, U, V, W),
/// six channels each in register order. `output[i] = hardware[REORDER[i]]`.
pub const REORDER: [usize; SPECTRUM_CHANNELS] =
    [0, 1, 2, 3, 4, 5, 6, 7, 12, 8, 13, 9, 14, 15, 16, 17, 10, 11];

/// Internal sensor die of the AS7265x
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[repr(u8)]
pub enum SubDevice {
    /// AS72651, master die: 610 - 860 nm
    Nir = 0b00,
    /// AS72652: 560 - 940 nm
    Vis = 0b01,
    /// AS72653: 410 - 535 nm
    Uv = 0b10,
}

impl SubDevice {
    /// Order in which the calibrated spectrum is read, matching [`REORDER`]
    pub const READ_ORDER: [SubDevice; 3] = [SubDevice::Uv, SubDevice::Vis, SubDevice::Nir];

    /// Selector register value
    pub const fn bits(self) -> u8 {
        self as u8
    }
}

/// Colour name of each of the six channel registers, in register order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Color {
    /// Channel register 0
    Violet,
    /// Channel register 1
    Blue,
    /// Channel register 2
    Green,
    /// Channel register 3
    Yellow,
    /// Channel register 4
    Orange,
    /// Channel register 5
    Red,
}

impl Color {
    /// All colours in register order
    pub const ALL: [Color; CHANNELS_PER_DEVICE] = [
        Color::Violet,
        Color::Blue,
        Color::Green,
        Color::Yellow,
        Color::Orange,
        Color::Red,
    ];
}

/// Raw 16-bit counts of one sub-device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct RawChannels {
    /// Violet channel
    pub violet: u16,
    /// Blue channel
    pub blue: u16,
    /// Green channel
    pub green: u16,
    /// Yellow channel
    pub yellow: u16,
    /// Orange channel
    pub orange: u16,
    /// Red channel
    pub red: u16,
}

impl RawChannels {
    /// Build from values in register order
    pub fn from_registers(values: [u16; CHANNELS_PER_DEVICE]) -> Self {
        let [violet, blue, green, yellow, orange, red] = values;
        Self {
            violet,
            blue,
            green,
            yellow,
            orange,
            red,
        }
    }

    /// Values in register order
    pub fn to_registers(self) -> [u16; CHANNELS_PER_DEVICE] {
        [
            self.violet,
            self.blue,
            self.green,
            self.yellow,
            self.orange,
            self.red,
        ]
    }

    /// Count of one colour
    pub fn get(&self, color: Color) -> u16 {
        match color {
            Color::Violet => self.violet,
            Color::Blue => self.blue,
            Color::Green => self.green,
            Color::Yellow => self.yellow,
            Color::Orange => self.orange,
            Color::Red => self.red,
        }
    }

    /// Highest count
    pub fn max(&self) -> u16 {
        self.to_registers().into_iter().max().unwrap_or(0)
    }
}

/// Raw counts of all three sub-devices
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct RawSpectrum {
    /// NIR die
    pub nir: RawChannels,
    /// VIS die
    pub vis: RawChannels,
    /// UV die
    pub uv: RawChannels,
}

impl RawSpectrum {
    /// Counts of one sub-device
    pub fn device(&self, device: SubDevice) -> &RawChannels {
        match device {
            SubDevice::Nir => &self.nir,
            SubDevice::Vis => &self.vis,
            SubDevice::Uv => &self.uv,
        }
    }

    fn device_mut(&mut self, device: SubDevice) -> &mut RawChannels {
        match device {
            SubDevice::Nir => &mut self.nir,
            SubDevice::Vis => &mut self.vis,
            SubDevice::Uv => &mut self.uv,
        }
    }

    /// Highest count over all 18 channels
    pub fn max(&self) -> u16 {
        self.nir.max().max(self.vis.max()).max(self.uv.max())
    }
}

/// Calibrated intensities in ascending wavelength order
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct CalibratedSpectrum {
    /// Always [`WAVELENGTHS_NM`]
    pub wavelengths: [u16; SPECTRUM_CHANNELS],
    /// Intensity per wavelength
    pub values: [f32; SPECTRUM_CHANNELS],
}

impl CalibratedSpectrum {
    /// Wrap values that are already in wavelength order
    pub fn from_ordered(values: [f32; SPECTRUM_CHANNELS]) -> Self {
        Self {
            wavelengths: WAVELENGTHS_NM,
            values,
        }
    }

    /// `(wavelength, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (u16, f32)> + '_ {
        self.wavelengths.iter().copied().zip(self.values.iter().copied())
    }

    /// Value at `nm`, if that is one of the band centres
    pub fn at(&self, nm: u16) -> Option<f32> {
        self.iter().find(|&(w, _)| w == nm).map(|(_, v)| v)
    }
}

/// Decode one calibrated channel register (big-endian IEEE-754 single)
pub fn decode_calibrated(bytes: [u8; 4]) -> f32 {
    f32::from_be_bytes(bytes)
}

/// Permute values from hardware order into wavelength order
pub fn reorder<T: Copy>(hardware: &[T; SPECTRUM_CHANNELS]) -> [T; SPECTRUM_CHANNELS] {
    core::array::from_fn(|i| hardware[REORDER[i]])
}

impl<I2C, E, D> As7265x<I2C, D>
where
    I2C: I2c<Error = E>,
    D: DelayNs,
{
    /// Route channel registers to `device` and verify the selector.
    ///
    /// On a mismatch the cached selection is dropped; nothing may be read
    /// until a selection succeeds.
    pub fn select_device(&mut self, device: SubDevice) -> Result<(), Error<E>> {
        self.selected = None;
        self.write_virtual(virt::DEV_SELECT, device.bits())?;
        let found = self.read_virtual(virt::DEV_SELECT)? & DEV_SELECT_MASK;
        if found != device.bits() {
            warn!(
                "device select mismatch: wrote {}, read back {}",
                device.bits(),
                found
            );
            return Err(Error::DeviceSelection {
                expected: device.bits(),
                found,
            });
        }
        self.selected = Some(device);
        Ok(())
    }

    /// Select `device` and read its six raw channels
    pub fn read_raw_channels(&mut self, device: SubDevice) -> Result<RawChannels, Error<E>> {
        self.select_device(device)?;
        let mut values = [0u16; CHANNELS_PER_DEVICE];
        for (i, value) in values.iter_mut().enumerate() {
            let register = virt::RAW_BASE + i as u8 * RAW_WIDTH;
            *value = self.read_virtual_u16(register, register + 1)?;
        }
        Ok(RawChannels::from_registers(values))
    }

    /// Raw counts of all three sub-devices.
    ///
    /// Any failure aborts the whole read.
    pub fn read_raw_spectrum(&mut self) -> Result<RawSpectrum, Error<E>> {
        let mut spectrum = RawSpectrum::default();
        for device in SubDevice::READ_ORDER {
            *spectrum.device_mut(device) = self.read_raw_channels(device)?;
        }
        Ok(spectrum)
    }

    /// Select `device` and read its six calibrated channels in register order
    pub fn read_calibrated_channels(
        &mut self,
        device: SubDevice,
    ) -> Result<[f32; CHANNELS_PER_DEVICE], Error<E>> {
        self.select_device(device)?;
        let mut values = [0f32; CHANNELS_PER_DEVICE];
        for (i, value) in values.iter_mut().enumerate() {
            let base = virt::CAL_BASE + i as u8 * CAL_WIDTH;
            let mut bytes = [0u8; 4];
            for (offset, byte) in (0u8..).zip(bytes.iter_mut()) {
                *byte = self.read_virtual(base + offset)?;
            }
            *value = decode_calibrated(bytes);
        }
        Ok(values)
    }

    /// All 18 calibrated channels in ascending wavelength order.
    ///
    /// Any failure aborts the whole read; retry the full spectrum, not
    /// individual channels.
    pub fn read_calibrated_spectrum(&mut self) -> Result<CalibratedSpectrum, Error<E>> {
        let mut hardware = [0f32; SPECTRUM_CHANNELS];
        for (chunk, device) in hardware
            .chunks_exact_mut(CHANNELS_PER_DEVICE)
            .zip(SubDevice::READ_ORDER)
        {
            chunk.copy_from_slice(&self.read_calibrated_channels(device)?);
        }
        Ok(CalibratedSpectrum::from_ordered(reorder(&hardware)))
    }
}
