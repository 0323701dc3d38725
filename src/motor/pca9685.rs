// PCA9685 16-channel PWM controller
//
// Register access goes through `pwm_pca9685::Pca9685`. Kept local:
// - prescale math for a frequency in Hz
// - ON/OFF validation for a pin (`off = 4096 - on`)
// - the general-call software reset, which addresses every chip on the bus

use std::fmt;

use embedded_hal::i2c::I2c;
use pwm_pca9685::{Address, Channel, Error as PwmError, Pca9685};
use tracing::{debug, info};

use super::error::{i2c_error, DriverError, Result};

/// Internal oscillator frequency
const OSCILLATOR_HZ: f64 = 25_000_000.0;

/// Steps in one PWM period; an `on` value of 4096 means full on
pub const PWM_RESOLUTION: u16 = 4096;

/// Number of PWM outputs
pub const PWM_CHANNELS: u8 = 16;

/// I2C general call address, used for software reset
const GENERAL_CALL_ADDRESS: u8 = 0x00;
const SWRST: u8 = 0x06;

const OUTPUTS: [Channel; PWM_CHANNELS as usize] = [
    Channel::C0,
    Channel::C1,
    Channel::C2,
    Channel::C3,
    Channel::C4,
    Channel::C5,
    Channel::C6,
    Channel::C7,
    Channel::C8,
    Channel::C9,
    Channel::C10,
    Channel::C11,
    Channel::C12,
    Channel::C13,
    Channel::C14,
    Channel::C15,
];

/// Compute the prescale register value for a PWM frequency in Hz
pub fn prescale_for(frequency_hz: u16) -> u8 {
    let value = OSCILLATOR_HZ / f64::from(PWM_RESOLUTION) / f64::from(frequency_hz) - 1.0;
    // Hardware minimum prescale is 3
    (value.round() as i64).clamp(3, 255) as u8
}

/// Validate a pin and ON count, returning `(pin, on, off)` with `on + off == 4096`
///
/// Out-of-range input is rejected rather than clamped.
pub fn checked_duty(pin: i32, value_on: i32) -> Result<(u8, u16, u16)> {
    if !(0..i32::from(PWM_CHANNELS)).contains(&pin) {
        return Err(DriverError::InvalidPin(pin));
    }
    if !(0..=i32::from(PWM_RESOLUTION)).contains(&value_on) {
        return Err(DriverError::InvalidPwmValue(value_on));
    }
    let on = value_on as u16;
    Ok((pin as u8, on, PWM_RESOLUTION - on))
}

/// Reset every PCA9685 on the bus to power-on defaults
pub fn software_reset<I: I2c>(i2c: &mut I) -> Result<()> {
    info!("Software reset of PWM controllers");
    i2c.write(GENERAL_CALL_ADDRESS, &[SWRST])
        .map_err(|e| i2c_error(GENERAL_CALL_ADDRESS, e))
}

fn pwm_error<E: embedded_hal::i2c::Error>(address: u8, e: PwmError<E>) -> DriverError {
    match e {
        PwmError::I2C(e) => i2c_error(address, e),
        _ => DriverError::PwmRejected(address),
    }
}

fn output(pin: u8) -> Result<Channel> {
    OUTPUTS
        .get(usize::from(pin))
        .copied()
        .ok_or(DriverError::InvalidPin(i32::from(pin)))
}

/// PWM controller owning its own handle to the bus
pub struct PwmController<I2C> {
    address: u8,
    prescale: u8,
    device: Pca9685<I2C>,
}

impl<I2C> fmt::Debug for PwmController<I2C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PwmController")
            .field("address", &self.address)
            .field("prescale", &self.prescale)
            .finish_non_exhaustive()
    }
}

impl<I2C: I2c> PwmController<I2C> {
    /// Wake the oscillator, program the prescaler for `frequency_hz` and turn
    /// every output off
    pub fn init(i2c: I2C, address: u8, frequency_hz: u16) -> Result<Self> {
        info!(
            "Initializing PWM controller at 0x{:02X} ({} Hz)",
            address, frequency_hz
        );
        let device = Pca9685::new(i2c, Address::from(address)).map_err(|e| pwm_error(address, e))?;
        let mut pwm = Self {
            address,
            prescale: 0,
            device,
        };

        pwm.device.enable().map_err(|e| pwm_error(address, e))?;
        pwm.set_frequency(frequency_hz)?;
        pwm.device
            .set_channel_on_off(Channel::All, 0, 0)
            .map_err(|e| pwm_error(address, e))?;
        Ok(pwm)
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn prescale(&self) -> u8 {
        self.prescale
    }

    pub fn set_frequency(&mut self, frequency_hz: u16) -> Result<()> {
        let prescale = prescale_for(frequency_hz);
        let address = self.address;
        debug!("Set pwm 0x{:02X} prescale {}", address, prescale);
        self.device
            .set_prescale(prescale)
            .map_err(|e| pwm_error(address, e))?;
        self.prescale = prescale;
        Ok(())
    }

    /// Write ON and OFF counts for one output
    ///
    /// `on == 4096` switches the output fully on, `off == 4096` fully off;
    /// anything else is one combined ON/OFF write.
    pub fn set_pwm(&mut self, pin: u8, on: u16, off: u16) -> Result<()> {
        let channel = output(pin)?;
        let address = self.address;
        debug!(
            "Set pwm 0x{:02X} channel {}: on={}, off={}",
            address, pin, on, off
        );

        if on >= PWM_RESOLUTION {
            // Full-off wins over full-on, so clear OFF first
            self.device
                .set_channel_on_off(channel, 0, 0)
                .map_err(|e| pwm_error(address, e))?;
            self.device
                .set_channel_full_on(channel, 0)
                .map_err(|e| pwm_error(address, e))
        } else if off >= PWM_RESOLUTION {
            self.device
                .set_channel_full_off(channel)
                .map_err(|e| pwm_error(address, e))
        } else {
            self.device
                .set_channel_on_off(channel, on, off)
                .map_err(|e| pwm_error(address, e))
        }
    }
}
