// Error type shared by the DRV8830 driver, the PWM controller and the bus manager

use embedded_hal::i2c::ErrorKind;

/// Errors raised by the motor hardware layer
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("I2C transaction with device 0x{address:02X} failed: {kind:?}")]
    I2c { address: u8, kind: ErrorKind },

    #[error("PWM pin must be between 0 and 15 inclusive, got {0}")]
    InvalidPin(i32),

    #[error("PWM value must be between 0 and 4096 inclusive, got {0}")]
    InvalidPwmValue(i32),

    #[error("Channel {0} is outside the valid range")]
    InvalidChannel(u8),

    #[error("PWM controller at 0x{0:02X} rejected the request")]
    PwmRejected(u8),
}

pub type Result<T> = std::result::Result<T, DriverError>;

/// Map a bus-specific I2C error into a `DriverError` for `address`
pub(crate) fn i2c_error<E: embedded_hal::i2c::Error>(address: u8, e: E) -> DriverError {
    DriverError::I2c {
        address,
        kind: e.kind(),
    }
}
