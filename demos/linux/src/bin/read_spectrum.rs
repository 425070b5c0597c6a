//! Calibrated spectrum reading example
//!
//! This example demonstrates how to:
//! - Share one I2C bus between the TCA9548A and an AS7265x
//! - Initialize and configure the sensor
//! - Read the 18-channel calibrated spectrum
//! - Let the exposure policy correct gain and integration time

use std::cell::RefCell;

use as7265x_mux::{As7265x, ExposurePolicy, Tca9548a};
use embedded_hal_bus::i2c::RefCellDevice;

// This example uses linux-embedded-hal for demonstration
// Replace with your platform's I2C implementation
use linux_embedded_hal::{Delay, I2cdev};

const CHANNEL: u8 = 0;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let bus = RefCell::new(I2cdev::new("/dev/i2c-1")?);
    let mut mux = Tca9548a::new(RefCellDevice::new(&bus));
    let mut sensor = As7265x::new(RefCellDevice::new(&bus), Delay);
    let policy = ExposurePolicy::default();

    mux.select_channel(CHANNEL).map_err(|e| e.to_string())?;
    let active = mux.active_channels().map_err(|e| e.to_string())?;
    log::info!("mux control register: {:?}", active);

    sensor.init().map_err(|e| e.to_string())?;
    let hw = sensor.hardware_version().map_err(|e| e.to_string())?;
    let fw = sensor.firmware_version().map_err(|e| e.to_string())?;
    println!("AS7265x hardware 0x{hw:04X}, firmware 0x{fw:04X}");

    // 49 cycles (~137 ms), 16x gain, continuous all-channel mode
    sensor.configure(49, 2, 2).map_err(|e| e.to_string())?;

    loop {
        std::thread::sleep(std::time::Duration::from_millis(500));

        match sensor.adjust_sensor_settings(&policy) {
            Ok(Some(settings)) => {
                println!(
                    "exposure changed: {} cycles, gain {:?}",
                    settings.integration_time, settings.gain
                );
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                eprintln!("exposure check failed: {e}");
                continue;
            }
        }

        match sensor.read_calibrated_spectrum() {
            Ok(spectrum) => {
                for (nm, value) in spectrum.iter() {
                    print!("{nm}:{value:.1} ");
                }
                println!();
            }
            Err(e) => {
                // The whole read is retried on the next pass
                eprintln!("spectrum read failed: {e}");
            }
        }
    }
}
