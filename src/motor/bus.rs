// Bus lifecycle: the I2C adapter, the (optional) bus manager behind one
// acquisition guard, and the start/stop hooks the host calls
//
// The adapter sits in a `Mutex` owned by the caller. The motor path and the
// PWM controller each hold their own `MutexDevice` onto it.

use std::sync::Mutex;

use embedded_hal::i2c::I2c;
use embedded_hal_bus::i2c::MutexDevice;
use tracing::{error, info, warn};

use super::guard::{AcquisitionGuard, GuardStats};
use super::manager::{BusConfig, BusManager};

/// Handle onto the shared adapter
pub type SharedI2c<'a, I2C> = MutexDevice<'a, I2C>;

/// Everything reachable only while holding the bus
pub struct BusState<'a, I2C> {
    pub i2c: SharedI2c<'a, I2C>,
    pub manager: Option<BusManager<SharedI2c<'a, I2C>>>,
}

/// Shared DRV8830 bus, usually held in an `Arc` by every component using it
pub struct Drv8830Bus<'a, I2C> {
    config: BusConfig,
    adapter: &'a Mutex<I2C>,
    state: AcquisitionGuard<BusState<'a, I2C>>,
}

impl<'a, I2C: I2c> Drv8830Bus<'a, I2C> {
    pub fn new(adapter: &'a Mutex<I2C>, config: BusConfig) -> Self {
        Self {
            config,
            adapter,
            state: AcquisitionGuard::new(BusState {
                i2c: MutexDevice::new(adapter),
                manager: None,
            }),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Build the bus manager. Failure is logged and leaves the bus without a
    /// manager; every later motor command is then a no-op.
    pub fn on_start(&self) -> bool {
        info!("Starting drv8830 bus at 0x{:02X}", self.config.address);
        let mut held = self.state.acquire();

        match BusManager::new(MutexDevice::new(self.adapter), self.config.clone()) {
            Ok(created) => {
                held.manager = Some(created);
                true
            }
            Err(e) => {
                error!("Failed to initialise drv8830 board: {}", e);
                held.manager = None;
                false
            }
        }
    }

    /// Put every motor in standby, reset the PWM controller and drop the
    /// manager. Never fails; safe to call repeatedly or after a failed start.
    pub fn on_stop(&self) {
        let mut held = self.state.acquire();
        let BusState { i2c, manager } = &mut *held;

        let Some(mut current) = manager.take() else {
            return;
        };
        info!("Stopping drv8830 bus at 0x{:02X}", self.config.address);
        for motor in current.motors_mut() {
            if let Err(e) = motor.stop(i2c) {
                warn!("Failed to stop motor {} while stopping drv8830 board: {}", motor.number(), e);
            }
        }
        if let Err(e) = current.software_reset(i2c) {
            warn!("Software reset failed while stopping drv8830 board: {}", e);
        }
    }

    pub fn is_started(&self) -> bool {
        self.state.with(|state| state.manager.is_some())
    }

    /// Run `f` against the manager while holding the bus.
    /// Returns `None` without touching hardware if the bus is not started.
    pub fn with_manager<R>(
        &self,
        f: impl FnOnce(&mut BusManager<SharedI2c<'a, I2C>>, &mut SharedI2c<'a, I2C>) -> R,
    ) -> Option<R> {
        let mut held = self.state.acquire();
        let BusState { i2c, manager } = &mut *held;
        manager.as_mut().map(|manager| f(manager, i2c))
    }

    pub fn guard_stats(&self) -> GuardStats {
        self.state.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTrans};

    use crate::motor::pca9685::tests::{init_transactions, PWM_ADDR};

    #[test]
    fn test_start_stop_cycle() {
        let mut expectations = init_transactions(PWM_ADDR, 3);
        expectations.push(I2cTrans::write(0x00, vec![0x06]));
        let mock = I2cMock::new(&expectations);
        let mut handle = mock.clone();
        let adapter = Mutex::new(mock);

        let bus = Drv8830Bus::new(&adapter, BusConfig::default());
        assert!(!bus.is_started());
        assert!(bus.on_start());
        assert!(bus.is_started());
        bus.on_stop();
        assert!(!bus.is_started());

        // Second stop does not touch the bus
        bus.on_stop();
        assert!(bus.guard_stats().is_balanced());
        handle.done();
    }

    #[test]
    fn test_stop_puts_driven_motors_in_standby_before_reset() {
        let mut expectations = init_transactions(PWM_ADDR, 3);
        expectations.extend([
            I2cTrans::write(0x60, vec![0x01, 0x80]),
            I2cTrans::write(0x60, vec![0x00, (30 << 2) | 0b10]),
            I2cTrans::write(0x61, vec![0x01, 0x80]),
            I2cTrans::write(0x61, vec![0x00, (12 << 2) | 0b01]),
            // Standby for each channel in use, then the general-call reset
            I2cTrans::write(0x60, vec![0x00, 0x00]),
            I2cTrans::write(0x61, vec![0x00, 0x00]),
            I2cTrans::write(0x00, vec![0x06]),
        ]);
        let mock = I2cMock::new(&expectations);
        let mut handle = mock.clone();
        let adapter = Mutex::new(mock);

        let bus = Drv8830Bus::new(&adapter, BusConfig::default());
        assert!(bus.on_start());
        bus.with_manager(|manager, i2c| {
            manager.motor(1).unwrap().drive(i2c, 30).unwrap();
            manager.motor(2).unwrap().drive(i2c, -12).unwrap();
        })
        .unwrap();
        bus.on_stop();
        assert!(!bus.is_started());
        handle.done();
    }

    #[test]
    fn test_failed_standby_still_resets() {
        let mut expectations = init_transactions(PWM_ADDR, 3);
        expectations.extend([
            I2cTrans::write(0x60, vec![0x01, 0x80]),
            I2cTrans::write(0x60, vec![0x00, (5 << 2) | 0b10]),
            I2cTrans::write(0x60, vec![0x00, 0x00]).with_error(ErrorKind::Other),
            I2cTrans::write(0x00, vec![0x06]),
        ]);
        let mock = I2cMock::new(&expectations);
        let mut handle = mock.clone();
        let adapter = Mutex::new(mock);

        let bus = Drv8830Bus::new(&adapter, BusConfig::default());
        assert!(bus.on_start());
        bus.with_manager(|manager, i2c| manager.motor(1).unwrap().drive(i2c, 5).map(|_| ()))
            .unwrap()
            .unwrap();
        bus.on_stop();
        assert!(!bus.is_started());
        handle.done();
    }

    #[test]
    fn test_failed_start_leaves_no_manager() {
        let expectations = [I2cTrans::write(PWM_ADDR, vec![0x00, 0x01]).with_error(ErrorKind::NoAcknowledge(
            embedded_hal::i2c::NoAcknowledgeSource::Address,
        ))];
        let mock = I2cMock::new(&expectations);
        let mut handle = mock.clone();
        let adapter = Mutex::new(mock);

        let bus = Drv8830Bus::new(&adapter, BusConfig::default());
        assert!(!bus.on_start());
        assert!(!bus.is_started());
        assert_eq!(bus.with_manager(|_, _| ()), None);

        // Stop after a failed start is a no-op
        bus.on_stop();
        assert!(bus.guard_stats().is_balanced());
        handle.done();
    }

    #[test]
    fn test_failed_reset_still_stops() {
        let mut expectations = init_transactions(PWM_ADDR, 3);
        expectations.push(I2cTrans::write(0x00, vec![0x06]).with_error(ErrorKind::Other));
        let mock = I2cMock::new(&expectations);
        let mut handle = mock.clone();
        let adapter = Mutex::new(mock);

        let bus = Drv8830Bus::new(&adapter, BusConfig::default());
        assert!(bus.on_start());
        bus.on_stop();
        assert!(!bus.is_started());
        handle.done();
    }
}
