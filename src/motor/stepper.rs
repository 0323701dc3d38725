// Stepper and LED sub-drivers on the PWM controller outputs
//
// Channels keep only their own state; the manager lends its controller through
// the `Stepper` and `Led` views.

use embedded_hal::i2c::I2c;
use tracing::debug;

use super::error::Result;
use super::pca9685::{checked_duty, PwmController, PWM_RESOLUTION};

/// Output pins wired to one stepper's H-bridge pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepperPins {
    pub pwm_a: u8,
    pub ain1: u8,
    pub ain2: u8,
    pub pwm_b: u8,
    pub bin1: u8,
    pub bin2: u8,
}

impl StepperPins {
    /// Board wiring for stepper ports 1 and 2
    pub fn for_port(port: u8) -> Option<Self> {
        match port {
            1 => Some(Self {
                pwm_a: 8,
                ain2: 9,
                ain1: 10,
                pwm_b: 13,
                bin2: 12,
                bin1: 11,
            }),
            2 => Some(Self {
                pwm_a: 2,
                ain2: 3,
                ain1: 4,
                pwm_b: 7,
                bin2: 6,
                bin1: 5,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDirection {
    Forward,
    Backward,
}

/// Coil polarity for each full-step phase: (coil A positive, coil B positive)
const FULL_STEP_PHASES: [(bool, bool); 4] = [(true, true), (false, true), (false, false), (true, false)];

fn set_pin<I: I2c>(pwm: &mut PwmController<I>, pin: u8, high: bool) -> Result<()> {
    if high {
        pwm.set_pwm(pin, PWM_RESOLUTION, 0)
    } else {
        pwm.set_pwm(pin, 0, PWM_RESOLUTION)
    }
}

/// Two-coil stepper driven in full-step, double-coil mode
#[derive(Debug, Clone)]
pub struct StepperChannel {
    number: u8,
    pins: StepperPins,
    phase: usize,
    position: i64,
}

impl StepperChannel {
    pub(crate) fn new(number: u8, pins: StepperPins) -> Self {
        Self {
            number,
            pins,
            phase: 0,
            position: 0,
        }
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    /// Steps taken since the channel was created, forward positive
    pub fn position(&self) -> i64 {
        self.position
    }

    /// Advance one full step
    pub fn step<I: I2c>(&mut self, pwm: &mut PwmController<I>, direction: StepDirection) -> Result<()> {
        let phase = match direction {
            StepDirection::Forward => (self.phase + 1) % FULL_STEP_PHASES.len(),
            StepDirection::Backward => (self.phase + FULL_STEP_PHASES.len() - 1) % FULL_STEP_PHASES.len(),
        };
        let (a_positive, b_positive) = FULL_STEP_PHASES[phase];
        debug!("Stepper {} -> phase {}", self.number, phase);

        let pins = self.pins;
        set_pin(pwm, pins.pwm_a, true)?;
        set_pin(pwm, pins.pwm_b, true)?;
        set_pin(pwm, pins.ain1, a_positive)?;
        set_pin(pwm, pins.ain2, !a_positive)?;
        set_pin(pwm, pins.bin1, b_positive)?;
        set_pin(pwm, pins.bin2, !b_positive)?;

        self.phase = phase;
        self.position += match direction {
            StepDirection::Forward => 1,
            StepDirection::Backward => -1,
        };
        Ok(())
    }

    /// De-energize both coils
    pub fn release<I: I2c>(&mut self, pwm: &mut PwmController<I>) -> Result<()> {
        let pins = self.pins;
        for pin in [pins.ain1, pins.ain2, pins.bin1, pins.bin2] {
            set_pin(pwm, pin, false)?;
        }
        Ok(())
    }
}

/// Single PWM output used as a dimmable LED
#[derive(Debug, Clone)]
pub struct LedChannel {
    pin: u8,
    level: u16,
}

impl LedChannel {
    pub(crate) fn new(pin: u8) -> Self {
        Self { pin, level: 0 }
    }

    pub fn pin(&self) -> u8 {
        self.pin
    }

    /// Last level written, 0..=4096
    pub fn level(&self) -> u16 {
        self.level
    }

    /// Set brightness as an ON count; rejected outside 0..=4096
    pub fn set_level<I: I2c>(&mut self, pwm: &mut PwmController<I>, level: i32) -> Result<()> {
        let (pin, on, off) = checked_duty(i32::from(self.pin), level)?;
        pwm.set_pwm(pin, on, off)?;
        self.level = on;
        Ok(())
    }
}

/// A stepper channel together with the controller driving it
pub struct Stepper<'a, I2C> {
    channel: &'a mut StepperChannel,
    pwm: &'a mut PwmController<I2C>,
}

impl<'a, I2C: I2c> Stepper<'a, I2C> {
    pub(crate) fn new(channel: &'a mut StepperChannel, pwm: &'a mut PwmController<I2C>) -> Self {
        Self { channel, pwm }
    }

    pub fn number(&self) -> u8 {
        self.channel.number()
    }

    pub fn position(&self) -> i64 {
        self.channel.position()
    }

    pub fn step(&mut self, direction: StepDirection) -> Result<()> {
        self.channel.step(&mut *self.pwm, direction)
    }

    pub fn release(&mut self) -> Result<()> {
        self.channel.release(&mut *self.pwm)
    }
}

/// An LED channel together with the controller driving it
pub struct Led<'a, I2C> {
    channel: &'a mut LedChannel,
    pwm: &'a mut PwmController<I2C>,
}

impl<'a, I2C: I2c> Led<'a, I2C> {
    pub(crate) fn new(channel: &'a mut LedChannel, pwm: &'a mut PwmController<I2C>) -> Self {
        Self { channel, pwm }
    }

    pub fn pin(&self) -> u8 {
        self.channel.pin()
    }

    pub fn level(&self) -> u16 {
        self.channel.level()
    }

    pub fn set_level(&mut self, level: i32) -> Result<()> {
        self.channel.set_level(&mut *self.pwm, level)
    }
}
