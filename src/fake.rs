//! Behavioural fakes of the AS7265x, the TCA9548A and a clock for tests

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{
    ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation, SevenBitAddress,
};
use std::vec::Vec;

use crate::registers::{config, physical, status, virt, MUX_ADDRESS, SENSOR_ADDRESS, WRITE_FLAG};
use crate::spectrum::SubDevice;

/// Per-die registers live in this address window
const DEVICE_WINDOW: core::ops::Range<u8> = virt::DEVICE_TEMP..0x2C;

/// One AS7265x
pub(crate) struct FakeSensor {
    pub common: [u8; 256],
    pub per_device: [[u8; 256]; 3],
    pub selected: u8,
    pub ready: bool,
    /// Status polls that report TX_VALID after each mailbox write
    pub busy_polls: u8,
    pub stuck_tx: bool,
    /// Value the device selector reads back instead of the selection
    pub select_readback: Option<u8>,
    pub data_ready_on_one_shot: bool,
    /// Transactions to fail outright
    pub fail_transfers: u32,
    /// Fail every transaction after this many have succeeded
    pub fail_after: Option<u32>,

    pub transfers: u32,
    pub resets: u32,
    pub virtual_writes: Vec<(u8, u8)>,
    pub virtual_reads: Vec<u8>,

    pointer: u8,
    pending_write: Option<u8>,
    rx: Option<u8>,
    busy: u8,
}

impl FakeSensor {
    pub fn new() -> Self {
        let mut common = [0u8; 256];
        common[virt::HW_VERSION_HIGH as usize] = 0x40;
        common[virt::HW_VERSION_LOW as usize] = 0x41;
        common[virt::FW_VERSION_HIGH as usize] = 0x0C;
        common[virt::FW_VERSION_LOW as usize] = 0x12;
        Self {
            common,
            per_device: [[0u8; 256]; 3],
            selected: 0,
            ready: true,
            busy_polls: 0,
            stuck_tx: false,
            select_readback: None,
            data_ready_on_one_shot: true,
            fail_transfers: 0,
            fail_after: None,
            transfers: 0,
            resets: 0,
            virtual_writes: Vec::new(),
            virtual_reads: Vec::new(),
            pointer: 0,
            pending_write: None,
            rx: None,
            busy: 0,
        }
    }

    pub fn device_register(&self, device: SubDevice, register: u8) -> u8 {
        self.per_device[device as usize][register as usize]
    }

    pub fn load_raw(&mut self, device: SubDevice, values: [u16; 6]) {
        let regs = &mut self.per_device[device as usize];
        for (i, value) in values.iter().enumerate() {
            let base = virt::RAW_BASE as usize + i * 2;
            regs[base..base + 2].copy_from_slice(&value.to_be_bytes());
        }
    }

    pub fn load_calibrated(&mut self, device: SubDevice, values: [f32; 6]) {
        let regs = &mut self.per_device[device as usize];
        for (i, value) in values.iter().enumerate() {
            let base = virt::CAL_BASE as usize + i * 4;
            regs[base..base + 4].copy_from_slice(&value.to_be_bytes());
        }
    }

    fn status(&mut self) -> u8 {
        let mut value = 0;
        if self.ready {
            value |= status::READY;
        }
        if self.rx.is_some() {
            value |= status::RX_VALID;
        }
        if self.stuck_tx || self.busy > 0 {
            self.busy = self.busy.saturating_sub(1);
            value |= status::TX_VALID;
        }
        value
    }

    fn read_physical(&mut self, register: u8) -> u8 {
        match register {
            physical::STATUS => self.status(),
            physical::READ => self.rx.take().unwrap_or(0),
            _ => 0,
        }
    }

    fn write_physical(&mut self, register: u8, value: u8) {
        if register != physical::WRITE {
            return;
        }
        self.busy = self.busy_polls;
        if let Some(address) = self.pending_write.take() {
            self.write_virtual(address, value);
        } else if value & WRITE_FLAG != 0 {
            self.pending_write = Some(value & !WRITE_FLAG);
        } else {
            self.virtual_reads.push(value);
            self.rx = Some(self.read_virtual(value));
        }
    }

    fn read_virtual(&self, register: u8) -> u8 {
        if register == virt::DEV_SELECT {
            return self.select_readback.unwrap_or(self.selected | 0b0011_0000);
        }
        if DEVICE_WINDOW.contains(&register) {
            return self.per_device[self.selected as usize % 3][register as usize];
        }
        self.common[register as usize]
    }

    fn write_virtual(&mut self, register: u8, value: u8) {
        self.virtual_writes.push((register, value));
        if register == virt::DEV_SELECT {
            self.selected = value & 0b11;
        } else if register == virt::CONFIG {
            if value & config::RESET != 0 {
                self.resets += 1;
                self.common[virt::CONFIG as usize] = 0;
                return;
            }
            let mut value = value;
            if (value >> config::MODE_SHIFT) & 0b11 == 0b11 && self.data_ready_on_one_shot {
                value |= config::DATA_READY;
            }
            self.common[register as usize] = value;
        } else if DEVICE_WINDOW.contains(&register) {
            self.per_device[self.selected as usize % 3][register as usize] = value;
        } else {
            self.common[register as usize] = value;
        }
    }

    fn transaction(&mut self, operations: &mut [Operation<'_>]) -> Result<(), ErrorKind> {
        if self.fail_transfers > 0 {
            self.fail_transfers -= 1;
            self.transfers += 1;
            return Err(ErrorKind::Other);
        }
        if self.fail_after.is_some_and(|limit| self.transfers >= limit) {
            self.transfers += 1;
            return Err(ErrorKind::Other);
        }
        self.transfers += 1;
        for operation in operations {
            match operation {
                Operation::Write(bytes) => match **bytes {
                    [register] => self.pointer = register,
                    [register, value] => self.write_physical(register, value),
                    _ => return Err(ErrorKind::Other),
                },
                Operation::Read(buf) => {
                    for byte in buf.iter_mut() {
                        *byte = self.read_physical(self.pointer);
                    }
                }
            }
        }
        Ok(())
    }
}

/// A bus carrying a TCA9548A and AS7265x sensors on its channels, or a
/// single sensor wired directly
pub(crate) struct FakeBus {
    pub mux_mask: u8,
    /// Control register ignores writes and reports this
    pub stuck_mask: Option<u8>,
    direct: bool,
    sensors: Vec<(u8, FakeSensor)>,
}

impl FakeBus {
    pub fn direct(sensor: FakeSensor) -> Self {
        Self {
            mux_mask: 0,
            stuck_mask: None,
            direct: true,
            sensors: std::vec![(0, sensor)],
        }
    }

    pub fn muxed() -> Self {
        Self {
            mux_mask: 0,
            stuck_mask: None,
            direct: false,
            sensors: Vec::new(),
        }
    }

    pub fn attach(&mut self, channel: u8, sensor: FakeSensor) {
        self.sensors.push((channel, sensor));
    }

    pub fn sensor(&self) -> &FakeSensor {
        &self.sensors[0].1
    }

    pub fn sensor_mut(&mut self) -> &mut FakeSensor {
        &mut self.sensors[0].1
    }

    fn routed_sensor(&mut self) -> Option<&mut FakeSensor> {
        if self.direct {
            return self.sensors.first_mut().map(|(_, s)| s);
        }
        let mask = self.mux_mask;
        let mut reachable = self
            .sensors
            .iter_mut()
            .filter(|(channel, _)| mask & (1 << channel) != 0);
        match (reachable.next(), reachable.next()) {
            (Some((_, sensor)), None) => Some(sensor),
            _ => None,
        }
    }
}

impl ErrorType for FakeBus {
    type Error = ErrorKind;
}

impl I2c<SevenBitAddress> for FakeBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let nack = ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address);
        match address {
            MUX_ADDRESS if !self.direct => {
                for operation in operations {
                    match operation {
                        Operation::Write(bytes) => {
                            let &[mask] = &**bytes else {
                                return Err(ErrorKind::Other);
                            };
                            self.mux_mask = self.stuck_mask.unwrap_or(mask);
                        }
                        Operation::Read(buf) => buf.fill(self.mux_mask),
                    }
                }
                Ok(())
            }
            SENSOR_ADDRESS => self
                .routed_sensor()
                .ok_or(nack)?
                .transaction(operations),
            _ => Err(nack),
        }
    }
}

/// Clock that only records the time it was asked to wait
#[derive(Default)]
pub(crate) struct Clock {
    pub elapsed_ns: u64,
    pub calls: u32,
}

impl Clock {
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ns / 1_000_000
    }
}

impl DelayNs for Clock {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns += u64::from(ns);
        self.calls += 1;
    }

    fn delay_us(&mut self, us: u32) {
        self.elapsed_ns += u64::from(us) * 1_000;
        self.calls += 1;
    }

    fn delay_ms(&mut self, ms: u32) {
        self.elapsed_ns += u64::from(ms) * 1_000_000;
        self.calls += 1;
    }
}
