// Register-file I2C bus used when no hardware is attached

use std::collections::HashMap;
use std::convert::Infallible;

use embedded_hal::i2c::{ErrorType, I2c, Operation, SevenBitAddress};
use tracing::trace;

/// Every address answers; writes land in a 256-byte register file per device
/// with auto-increment, reads return what was last written.
#[derive(Debug, Default)]
pub struct SimulatedI2c {
    devices: HashMap<u8, [u8; 256]>,
    pointers: HashMap<u8, u8>,
}

impl SimulatedI2c {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a device register
    pub fn register(&self, address: u8, register: u8) -> u8 {
        self.devices
            .get(&address)
            .map_or(0, |regs| regs[usize::from(register)])
    }
}

impl ErrorType for SimulatedI2c {
    type Error = Infallible;
}

impl I2c<SevenBitAddress> for SimulatedI2c {
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        for operation in operations {
            let regs = self.devices.entry(address).or_insert([0; 256]);
            let pointer = self.pointers.entry(address).or_insert(0);
            match operation {
                Operation::Write(bytes) => {
                    let Some((&register, data)) = bytes.split_first() else {
                        continue;
                    };
                    *pointer = register;
                    for &byte in data {
                        regs[usize::from(*pointer)] = byte;
                        *pointer = pointer.wrapping_add(1);
                    }
                    trace!("sim write 0x{:02X}: reg=0x{:02X} data={:02X?}", address, register, data);
                }
                Operation::Read(buffer) => {
                    for byte in buffer.iter_mut() {
                        *byte = regs[usize::from(*pointer)];
                        *pointer = pointer.wrapping_add(1);
                    }
                    trace!("sim read 0x{:02X}: {:02X?}", address, buffer);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::motor::{BusConfig, Drv8830Bus};

    #[test]
    fn test_write_then_read_back() {
        let mut i2c = SimulatedI2c::new();
        i2c.write(0x60, &[0x00, 0xFE]).unwrap();
        let mut buf = [0u8; 1];
        i2c.write_read(0x60, &[0x00], &mut buf).unwrap();
        assert_eq!(buf[0], 0xFE);
        assert_eq!(i2c.register(0x61, 0x00), 0);
    }

    #[test]
    fn test_simulated_bus_runs_full_lifecycle() {
        let adapter = Mutex::new(SimulatedI2c::new());
        let bus = Drv8830Bus::new(&adapter, BusConfig::default());
        assert!(bus.on_start());
        let word = bus
            .with_manager(|manager, i2c| manager.motor(1).unwrap().drive(i2c, -12))
            .unwrap()
            .unwrap();
        assert_eq!(word.bits(), (12 << 2) | 0b01);
        assert_eq!(adapter.lock().unwrap().register(0x60, 0x00), word.bits());

        // Stopping leaves the motor in standby
        bus.on_stop();
        assert!(!bus.is_started());
        assert_eq!(adapter.lock().unwrap().register(0x60, 0x00), 0x00);
    }
}
