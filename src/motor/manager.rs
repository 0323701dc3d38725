// Bus manager: one PWM controller plus the motor, stepper and LED channels
// hanging off the same I2C bus
//
// Channels are created on first request and cached for the manager's lifetime.
// Nothing here locks; callers hold the acquisition guard and lend the bus.

use std::collections::BTreeMap;

use embedded_hal::i2c::I2c;
use tracing::{debug, info};

use super::drv8830::{ControlWord, Drv8830, FaultStatus};
use super::error::{DriverError, Result};
use super::pca9685::{self, checked_duty, PwmController, PWM_CHANNELS};
use super::stepper::{Led, LedChannel, Stepper, StepperChannel, StepperPins};

/// Default PWM controller address
pub const DEFAULT_PWM_ADDRESS: u8 = 0x40;
/// Default PWM frequency in Hz
pub const DEFAULT_FREQUENCY_HZ: u16 = 1600;
/// First DRV8830 address; channel n defaults to `DEFAULT_MOTOR_BASE + n - 1`
pub const DEFAULT_MOTOR_BASE: u8 = 0x60;

/// Motor channel numbers are 1..=MOTOR_CHANNELS
pub const MOTOR_CHANNELS: u8 = 4;
/// Stepper port numbers are 1..=STEPPER_CHANNELS
pub const STEPPER_CHANNELS: u8 = 2;
/// Largest speed magnitude accepted by a motor channel
pub const MAX_SPEED: u8 = 255;

/// Physical bus configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    pub address: u8,
    pub frequency_hz: u16,
    /// DRV8830 addresses, index 0 is motor channel 1
    pub motor_addresses: Vec<u8>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_PWM_ADDRESS,
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            motor_addresses: vec![DEFAULT_MOTOR_BASE, DEFAULT_MOTOR_BASE + 1],
        }
    }
}

impl BusConfig {
    /// DRV8830 address for motor channel `number` (1-based)
    pub fn motor_address(&self, number: u8) -> u8 {
        let index = usize::from(number.saturating_sub(1));
        self.motor_addresses
            .get(index)
            .copied()
            .unwrap_or(DEFAULT_MOTOR_BASE.wrapping_add(number.saturating_sub(1)))
    }
}

/// Requested motor direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
    Release,
}

/// Last state written to a motor channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChannelState {
    #[default]
    Released,
    Forward,
    Backward,
    Braked,
}

/// One logical DC motor backed by a DRV8830
#[derive(Debug, Clone)]
pub struct MotorChannel {
    number: u8,
    driver: Drv8830,
    speed: i16,
    state: ChannelState,
    max_speed: u8,
}

impl MotorChannel {
    fn new(number: u8, driver: Drv8830) -> Self {
        Self {
            number,
            driver,
            speed: 0,
            state: ChannelState::Released,
            max_speed: MAX_SPEED,
        }
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn address(&self) -> u8 {
        self.driver.address()
    }

    /// Signed speed last driven (or recorded while released)
    pub fn speed(&self) -> i16 {
        self.speed
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn max_speed(&self) -> u8 {
        self.max_speed
    }

    pub fn set_max_speed(&mut self, max_speed: u8) {
        self.max_speed = max_speed;
    }

    fn clamp(&self, speed: i16) -> i16 {
        let limit = i16::from(self.max_speed);
        speed.clamp(-limit, limit)
    }

    /// Drive at a signed speed, clamped to `max_speed`
    pub fn drive<I: I2c>(&mut self, i2c: &mut I, speed: i16) -> Result<ControlWord> {
        let speed = self.clamp(speed);
        let word = self.driver.drive(i2c, speed)?;
        debug!(
            "Motor {} driven at {} (control 0x{:02X})",
            self.number,
            speed,
            word.bits()
        );
        self.speed = speed;
        self.state = if speed < 0 {
            ChannelState::Backward
        } else {
            ChannelState::Forward
        };
        Ok(word)
    }

    /// Run in a direction at `magnitude`; `Release` puts the bridge in standby
    pub fn run<I: I2c>(&mut self, i2c: &mut I, direction: Direction, magnitude: u8) -> Result<()> {
        let magnitude = i16::from(magnitude);
        match direction {
            Direction::Forward => self.drive(i2c, magnitude).map(|_| ()),
            Direction::Backward => self.drive(i2c, -magnitude).map(|_| ()),
            Direction::Release => self.stop(i2c),
        }
    }

    /// Change the speed magnitude, keeping the current direction
    ///
    /// A stopped or braked motor only records the new magnitude.
    pub fn set_speed<I: I2c>(&mut self, i2c: &mut I, magnitude: u8) -> Result<()> {
        let magnitude = self.clamp(i16::from(magnitude));
        match self.state {
            ChannelState::Forward => self.drive(i2c, magnitude).map(|_| ()),
            ChannelState::Backward => self.drive(i2c, -magnitude).map(|_| ()),
            ChannelState::Released | ChannelState::Braked => {
                self.speed = magnitude;
                Ok(())
            }
        }
    }

    pub fn stop<I: I2c>(&mut self, i2c: &mut I) -> Result<()> {
        self.driver.stop(i2c)?;
        self.state = ChannelState::Released;
        Ok(())
    }

    pub fn brake<I: I2c>(&mut self, i2c: &mut I) -> Result<()> {
        self.driver.brake(i2c)?;
        self.state = ChannelState::Braked;
        Ok(())
    }

    pub fn get_fault<I: I2c>(&mut self, i2c: &mut I) -> Result<FaultStatus> {
        self.driver.get_fault(i2c)
    }
}

/// Owner of the PWM controller and the channel caches
///
/// `B` is the controller's own handle to the bus; motor channels are driven
/// through whatever handle the caller lends.
#[derive(Debug)]
pub struct BusManager<B> {
    config: BusConfig,
    pwm: PwmController<B>,
    motors: BTreeMap<u8, MotorChannel>,
    steppers: BTreeMap<u8, StepperChannel>,
    leds: BTreeMap<u8, LedChannel>,
}

impl<B: I2c> BusManager<B> {
    /// Initialize the PWM controller; on error nothing is kept
    pub fn new(pwm_bus: B, config: BusConfig) -> Result<Self> {
        let pwm = PwmController::init(pwm_bus, config.address, config.frequency_hz)?;
        info!(
            "Bus manager ready: pwm=0x{:02X}, prescale={}, motors={:02X?}",
            config.address,
            pwm.prescale(),
            config.motor_addresses
        );
        Ok(Self {
            config,
            pwm,
            motors: BTreeMap::new(),
            steppers: BTreeMap::new(),
            leds: BTreeMap::new(),
        })
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// General-call reset of every PWM controller on the bus
    pub fn software_reset<I: I2c>(&self, i2c: &mut I) -> Result<()> {
        pca9685::software_reset(i2c)
    }

    /// Set one PWM output with `off = 4096 - on`; out-of-range input is an error
    pub fn set_pwm(&mut self, pin: i32, value_on: i32) -> Result<()> {
        let (pin, on, off) = checked_duty(pin, value_on)?;
        self.pwm.set_pwm(pin, on, off)
    }

    /// Motor channel `number`, created on first use; `None` outside 1..=4
    pub fn motor(&mut self, number: u8) -> Option<&mut MotorChannel> {
        if !(1..=MOTOR_CHANNELS).contains(&number) {
            return None;
        }
        if !self.motors.contains_key(&number) {
            let address = self.config.motor_address(number);
            debug!("Creating motor channel {} at 0x{:02X}", number, address);
            self.motors
                .insert(number, MotorChannel::new(number, Drv8830::new(address)));
        }
        self.motors.get_mut(&number)
    }

    /// Like `motor`, but reports an invalid number as an error
    pub fn try_motor(&mut self, number: u8) -> Result<&mut MotorChannel> {
        self.motor(number)
            .ok_or(DriverError::InvalidChannel(number))
    }

    /// Stepper port `number`, created on first use; `None` outside 1..=2
    pub fn stepper(&mut self, number: u8) -> Option<Stepper<'_, B>> {
        if !self.steppers.contains_key(&number) {
            let pins = StepperPins::for_port(number)?;
            self.steppers
                .insert(number, StepperChannel::new(number, pins));
        }
        let channel = self.steppers.get_mut(&number)?;
        Some(Stepper::new(channel, &mut self.pwm))
    }

    /// LED on PWM output `pin`, created on first use; `None` outside 0..=15
    pub fn led(&mut self, pin: u8) -> Option<Led<'_, B>> {
        if pin >= PWM_CHANNELS {
            return None;
        }
        let channel = self.leds.entry(pin).or_insert_with(|| LedChannel::new(pin));
        Some(Led::new(channel, &mut self.pwm))
    }

    /// Motor channels created so far
    pub fn motors(&self) -> impl Iterator<Item = &MotorChannel> {
        self.motors.values()
    }

    pub fn motors_mut(&mut self) -> impl Iterator<Item = &mut MotorChannel> {
        self.motors.values_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTrans};

    use crate::motor::pca9685::tests::{init_transactions, PWM_ADDR};

    /// The manager gets a clone of the mock; both share one expectation queue
    fn manager(i2c: &I2cMock, config: BusConfig) -> BusManager<I2cMock> {
        BusManager::new(i2c.clone(), config).unwrap()
    }

    #[test]
    fn test_motor_address_fallback() {
        let config = BusConfig::default();
        assert_eq!(config.motor_address(1), 0x60);
        assert_eq!(config.motor_address(2), 0x61);
        // Beyond the configured list, the chip's address strapping order is assumed
        assert_eq!(config.motor_address(3), 0x62);
        assert_eq!(config.motor_address(4), 0x63);
    }

    #[test]
    fn test_channel_range_checked() {
        let mut i2c = I2cMock::new(&init_transactions(PWM_ADDR, 3));
        let mut manager = manager(&i2c, BusConfig::default());

        assert!(manager.motor(0).is_none());
        assert!(manager.motor(5).is_none());
        assert_eq!(
            manager.try_motor(9).unwrap_err(),
            DriverError::InvalidChannel(9)
        );
        assert!(manager.stepper(3).is_none());
        assert!(manager.led(16).is_none());
        assert_eq!(manager.motors().count(), 0);

        assert_eq!(manager.motor(2).unwrap().address(), 0x61);
        assert_eq!(manager.stepper(1).unwrap().number(), 1);
        assert_eq!(manager.led(15).unwrap().pin(), 15);
        assert_eq!(manager.motors().count(), 1);
        i2c.done();
    }

    #[test]
    fn test_channel_is_cached() {
        let mut expectations = init_transactions(PWM_ADDR, 3);
        expectations.push(I2cTrans::write(0x60, vec![0x01, 0x80]));
        expectations.push(I2cTrans::write(0x60, vec![0x00, (40 << 2) | 0b10]));
        let mut i2c = I2cMock::new(&expectations);
        let mut manager = manager(&i2c, BusConfig::default());

        manager.motor(1).unwrap().drive(&mut i2c, 40).unwrap();
        let motor = manager.motor(1).unwrap();
        assert_eq!(motor.speed(), 40);
        assert_eq!(motor.state(), ChannelState::Forward);
        i2c.done();
    }

    #[test]
    fn test_set_pwm_on_plus_off() {
        let mut expectations = init_transactions(PWM_ADDR, 3);
        expectations.push(I2cTrans::write(
            PWM_ADDR,
            vec![0x06 + 4 * 3, 0xE8, 0x03, 0x18, 0x0C],
        ));
        let mut i2c = I2cMock::new(&expectations);
        let mut manager = manager(&i2c, BusConfig::default());

        // 1000 on, 3096 off
        manager.set_pwm(3, 1000).unwrap();
        i2c.done();
    }

    #[test]
    fn test_set_pwm_rejects_without_bus_write() {
        let mut i2c = I2cMock::new(&init_transactions(PWM_ADDR, 3));
        let mut manager = manager(&i2c, BusConfig::default());

        assert_eq!(manager.set_pwm(16, 100), Err(DriverError::InvalidPin(16)));
        assert_eq!(manager.set_pwm(-1, 100), Err(DriverError::InvalidPin(-1)));
        assert_eq!(
            manager.set_pwm(0, 4097),
            Err(DriverError::InvalidPwmValue(4097))
        );
        assert_eq!(
            manager.set_pwm(0, -1),
            Err(DriverError::InvalidPwmValue(-1))
        );
        assert_eq!(
            manager.led(2).unwrap().set_level(-5),
            Err(DriverError::InvalidPwmValue(-5))
        );
        // No transactions beyond init
        i2c.done();
    }

    #[test]
    fn test_init_failure_returns_error() {
        let expectations = [I2cTrans::write(PWM_ADDR, vec![0x00, 0x01]).with_error(ErrorKind::Other)];
        let mut i2c = I2cMock::new(&expectations);

        let result = BusManager::new(i2c.clone(), BusConfig::default());
        assert!(matches!(
            result,
            Err(DriverError::I2c {
                address: PWM_ADDR,
                ..
            })
        ));
        i2c.done();
    }

    #[test]
    fn test_run_and_set_speed() {
        let mut expectations = init_transactions(PWM_ADDR, 3);
        // set_speed while released only records, then run(Backward) at 30
        expectations.push(I2cTrans::write(0x61, vec![0x01, 0x80]));
        expectations.push(I2cTrans::write(0x61, vec![0x00, (30 << 2) | 0b01]));
        // set_speed(10) keeps reverse
        expectations.push(I2cTrans::write(0x61, vec![0x01, 0x80]));
        expectations.push(I2cTrans::write(0x61, vec![0x00, (10 << 2) | 0b01]));
        // run(Release)
        expectations.push(I2cTrans::write(0x61, vec![0x00, 0x00]));
        // brake
        expectations.push(I2cTrans::write(0x61, vec![0x00, 0x03]));
        let mut i2c = I2cMock::new(&expectations);
        let mut manager = manager(&i2c, BusConfig::default());

        let motor = manager.motor(2).unwrap();
        motor.set_speed(&mut i2c, 30).unwrap();
        assert_eq!(motor.state(), ChannelState::Released);
        motor.run(&mut i2c, Direction::Backward, 30).unwrap();
        assert_eq!(motor.speed(), -30);
        motor.set_speed(&mut i2c, 10).unwrap();
        assert_eq!(motor.speed(), -10);
        motor.run(&mut i2c, Direction::Release, 0).unwrap();
        assert_eq!(motor.state(), ChannelState::Released);
        motor.brake(&mut i2c).unwrap();
        assert_eq!(motor.state(), ChannelState::Braked);
        i2c.done();
    }

    #[test]
    fn test_max_speed_clamp() {
        let mut expectations = init_transactions(PWM_ADDR, 3);
        expectations.push(I2cTrans::write(0x60, vec![0x01, 0x80]));
        expectations.push(I2cTrans::write(0x60, vec![0x00, (20 << 2) | 0b01]));
        let mut i2c = I2cMock::new(&expectations);
        let mut manager = manager(&i2c, BusConfig::default());

        let motor = manager.motor(1).unwrap();
        motor.set_max_speed(20);
        motor.drive(&mut i2c, -200).unwrap();
        assert_eq!(motor.speed(), -20);
        i2c.done();
    }
}
