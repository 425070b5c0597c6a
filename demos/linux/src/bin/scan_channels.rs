//! Multiple sensors behind one multiplexer
//!
//! Every AS7265x answers on 0x49, so each sits on its own TCA9548A channel.
//! `SensorArray` switches channels and reads the spectrum as one unit.

use std::cell::RefCell;

use as7265x_mux::{As7265x, Error, SensorArray, Tca9548a};
use embedded_hal_bus::i2c::RefCellDevice;
use linux_embedded_hal::{Delay, I2cdev};

const CHANNELS: [u8; 3] = [0, 1, 2];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let bus = RefCell::new(I2cdev::new("/dev/i2c-1")?);
    let mut array = SensorArray::new(
        Tca9548a::new(RefCellDevice::new(&bus)),
        As7265x::new(RefCellDevice::new(&bus), Delay),
    );

    for channel in CHANNELS {
        match array.init(channel).and_then(|()| array.configure(channel, 49, 2, 2)) {
            Ok(()) => println!("channel {channel}: ready"),
            Err(Error::ChannelVerification { expected, found }) => {
                eprintln!("channel {channel}: mux holds {found:#010b}, wanted {expected:#010b}");
            }
            Err(e) => eprintln!("channel {channel}: {e}"),
        }
    }

    loop {
        for channel in CHANNELS {
            match array.read_calibrated(channel) {
                Ok(spectrum) => {
                    let peak = spectrum
                        .iter()
                        .max_by(|a, b| a.1.total_cmp(&b.1))
                        .unwrap_or((0, 0.0));
                    println!("channel {channel}: peak {:.1} at {} nm", peak.1, peak.0);
                }
                Err(e) => eprintln!("channel {channel}: read failed: {e}"),
            }
        }
        array.disable_all().map_err(|e| e.to_string())?;
        std::thread::sleep(std::time::Duration::from_secs(1));
    }
}
