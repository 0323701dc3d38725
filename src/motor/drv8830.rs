// DRV8830 register codec and single-chip driver
//
// The chip exposes two registers:
// - 0x00 CONTROL: [VSET5..VSET0 | IN2 | IN1], magnitude in bits 7:2, mode in bits 1:0
// - 0x01 FAULT:   latched fault flags, cleared by writing CLEAR (bit 7)

use embedded_hal::i2c::I2c;
use tracing::debug;

use super::error::{i2c_error, Result};

/// Register addresses
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    Control = 0x00,
    Fault = 0x01,
}

/// Value written to the fault register to clear latched flags
pub const FAULT_CLEAR: u8 = 0x80;

/// Largest magnitude the 6-bit VSET field can carry
pub const MAX_MAGNITUDE: u8 = 63;

/// Bridge mode held in bits 1:0 of the control register
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeMode {
    Standby = 0b00,
    Reverse = 0b01,
    Forward = 0b10,
    Brake = 0b11,
}

/// Packed control register value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlWord(u8);

impl ControlWord {
    /// Outputs hi-Z, motor coasts
    pub const STANDBY: Self = Self(BridgeMode::Standby as u8);
    /// Both outputs driven high
    pub const BRAKE: Self = Self(BridgeMode::Brake as u8);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn magnitude(self) -> u8 {
        self.0 >> 2
    }

    pub fn mode(self) -> BridgeMode {
        match self.0 & 0b11 {
            0b00 => BridgeMode::Standby,
            0b01 => BridgeMode::Reverse,
            0b10 => BridgeMode::Forward,
            _ => BridgeMode::Brake,
        }
    }
}

/// Encode a signed speed into a control word
///
/// The magnitude saturates at `MAX_MAGNITUDE`. Zero and positive speeds map to
/// forward mode, negative speeds to reverse.
pub fn encode_drive(speed: i16) -> ControlWord {
    let magnitude = speed.unsigned_abs().min(MAX_MAGNITUDE as u16) as u8;
    let mode = if speed < 0 {
        BridgeMode::Reverse
    } else {
        BridgeMode::Forward
    };
    ControlWord((magnitude << 2) | mode as u8)
}

/// Decoded fault register
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultStatus(u8);

impl FaultStatus {
    const FAULT: u8 = 1 << 0;
    const OCP: u8 = 1 << 1;
    const UVLO: u8 = 1 << 2;
    const OTS: u8 = 1 << 3;
    const ILIMIT: u8 = 1 << 4;

    pub fn bits(self) -> u8 {
        self.0
    }

    /// No fault flag latched
    pub fn is_clear(self) -> bool {
        self.0 & (Self::FAULT | Self::OCP | Self::UVLO | Self::OTS | Self::ILIMIT) == 0
    }

    pub fn fault(self) -> bool {
        self.0 & Self::FAULT != 0
    }

    pub fn over_current(self) -> bool {
        self.0 & Self::OCP != 0
    }

    pub fn under_voltage(self) -> bool {
        self.0 & Self::UVLO != 0
    }

    pub fn over_temperature(self) -> bool {
        self.0 & Self::OTS != 0
    }

    pub fn current_limit(self) -> bool {
        self.0 & Self::ILIMIT != 0
    }
}

pub fn decode_fault(raw: u8) -> FaultStatus {
    FaultStatus(raw)
}

/// One DRV8830 chip on the bus
///
/// Holds only the device address; the caller lends the bus for each
/// operation and is expected to hold the acquisition guard while doing so.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Drv8830 {
    address: u8,
}

impl Drv8830 {
    pub fn new(address: u8) -> Self {
        Self { address }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    fn write_register<I: I2c>(&self, i2c: &mut I, register: Register, value: u8) -> Result<()> {
        debug!(
            "Write to drv8830 0x{:02X}: reg={:?}, value=0x{:02X}",
            self.address, register, value
        );
        i2c.write(self.address, &[register as u8, value])
            .map_err(|e| i2c_error(self.address, e))
    }

    fn read_register<I: I2c>(&self, i2c: &mut I, register: Register) -> Result<u8> {
        let mut buf = [0u8; 1];
        i2c.write_read(self.address, &[register as u8], &mut buf)
            .map_err(|e| i2c_error(self.address, e))?;
        Ok(buf[0])
    }

    /// Clear latched faults, then write the encoded speed
    pub fn drive<I: I2c>(&self, i2c: &mut I, speed: i16) -> Result<ControlWord> {
        self.write_register(i2c, Register::Fault, FAULT_CLEAR)?;
        let word = encode_drive(speed);
        self.write_register(i2c, Register::Control, word.bits())?;
        Ok(word)
    }

    pub fn stop<I: I2c>(&self, i2c: &mut I) -> Result<()> {
        self.write_register(i2c, Register::Control, ControlWord::STANDBY.bits())
    }

    pub fn brake<I: I2c>(&self, i2c: &mut I) -> Result<()> {
        self.write_register(i2c, Register::Control, ControlWord::BRAKE.bits())
    }

    /// Read the fault register and clear it straight after
    pub fn get_fault<I: I2c>(&self, i2c: &mut I) -> Result<FaultStatus> {
        let raw = self.read_register(i2c, Register::Fault)?;
        self.write_register(i2c, Register::Fault, FAULT_CLEAR)?;
        Ok(decode_fault(raw))
    }
}
