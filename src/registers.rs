//! Register map for the TCA9548A multiplexer and the AS7265x spectral triad

/// Default I2C address of the TCA9548A multiplexer (A0..A2 tied low)
pub const MUX_ADDRESS: u8 = 0x70;

/// I2C address of the AS7265x master device
pub const SENSOR_ADDRESS: u8 = 0x49;

/// Number of downstream channels on the multiplexer
pub const MUX_CHANNELS: u8 = 8;

/// Physical registers of the AS7265x I2C slave interface.
///
/// Everything else on the device is reached through these three.
pub mod physical {
    /// Status register (read only)
    pub const STATUS: u8 = 0x00;
    /// Write mailbox: virtual register address, then value
    pub const WRITE: u8 = 0x01;
    /// Read mailbox
    pub const READ: u8 = 0x02;
}

/// Bits of the physical status register
pub mod status {
    /// Read buffer holds a byte for the host
    pub const RX_VALID: u8 = 0x01;
    /// Write buffer is still busy with the previous byte
    pub const TX_VALID: u8 = 0x02;
    /// Device finished its boot sequence
    pub const READY: u8 = 0x08;
}

/// Set on the byte written to [`physical::WRITE`] when it carries the
/// address of a virtual register that is about to be written.
pub const WRITE_FLAG: u8 = 0x80;

/// Virtual registers
pub mod virt {
    /// Device type
    pub const HW_VERSION_HIGH: u8 = 0x00;
    /// Hardware revision
    pub const HW_VERSION_LOW: u8 = 0x01;
    /// Firmware version, high byte
    pub const FW_VERSION_HIGH: u8 = 0x02;
    /// Firmware version, low byte
    pub const FW_VERSION_LOW: u8 = 0x03;
    /// Gain, bank mode, data-ready and reset bits
    pub const CONFIG: u8 = 0x04;
    /// Integration time in 2.8 ms cycles
    pub const INTEGRATION_TIME: u8 = 0x05;
    /// Die temperature of the selected sub-device, in °C
    pub const DEVICE_TEMP: u8 = 0x06;
    /// Indicator and illumination LED control
    pub const LED_CONFIG: u8 = 0x07;
    /// First of six big-endian 16-bit raw channel registers
    pub const RAW_BASE: u8 = 0x08;
    /// First of six big-endian IEEE-754 calibrated channel registers
    pub const CAL_BASE: u8 = 0x14;
    /// Sub-device selector
    pub const DEV_SELECT: u8 = 0x4F;
}

/// Fields of [`virt::CONFIG`]
pub mod config {
    /// Soft reset
    pub const RESET: u8 = 0b1000_0000;
    /// Bits kept when the gain field is rewritten
    pub const GAIN_KEEP_MASK: u8 = 0b1100_1111;
    /// Position of the 2-bit gain field
    pub const GAIN_SHIFT: u8 = 4;
    /// Bits kept when the bank mode field is rewritten
    pub const MODE_KEEP_MASK: u8 = 0b1111_0011;
    /// Position of the 2-bit bank mode field
    pub const MODE_SHIFT: u8 = 2;
    /// Set by the device once a measurement is available
    pub const DATA_READY: u8 = 0b0000_0010;
}

/// Indicator LED enable bit of [`virt::LED_CONFIG`]
pub const LED_INDICATOR: u8 = 0b0000_0001;

/// Selector bits of [`virt::DEV_SELECT`]. The upper bits report which
/// slave dies were detected and are not part of the selection.
pub const DEV_SELECT_MASK: u8 = 0b0000_0011;

/// Value of [`virt::HW_VERSION_HIGH`] on an AS7265x
pub const DEVICE_TYPE: u8 = 0x40;

/// Channel registers per sub-device
pub const CHANNELS_PER_DEVICE: usize = 6;

/// Bytes per raw channel register
pub const RAW_WIDTH: u8 = 2;

/// Bytes per calibrated channel register
pub const CAL_WIDTH: u8 = 4;
