// Motor control module for DRV8830 boards
//
// Provides:
// - DRV8830 register codec and single-chip driver
// - PCA9685 PWM controller (pwm-pca9685) used for steppers and LEDs
// - Bus manager with lazily created motor/stepper/LED channels
// - Acquisition guard serializing every bus transaction

mod bus;
pub mod drv8830;
mod error;
pub mod guard;
mod manager;
pub mod pca9685;
pub mod sim;
pub mod stepper;

pub use bus::{BusState, Drv8830Bus, SharedI2c};
pub use drv8830::{decode_fault, encode_drive, ControlWord, Drv8830, FaultStatus};
pub use error::{DriverError, Result};
pub use guard::{AcquisitionGuard, GuardStats};
pub use manager::{
    BusConfig, BusManager, ChannelState, Direction, MotorChannel, DEFAULT_FREQUENCY_HZ,
    DEFAULT_MOTOR_BASE, DEFAULT_PWM_ADDRESS, MAX_SPEED, MOTOR_CHANNELS, STEPPER_CHANNELS,
};
pub use pca9685::PwmController;
pub use sim::SimulatedI2c;
pub use stepper::{Led, LedChannel, StepDirection, Stepper, StepperChannel};
