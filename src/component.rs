// Motor component: maps host requests (node, index, value) onto motor channels
//
// Hardware errors stop here. Each request reports a `Dispatch` outcome and
// failures are logged; nothing is propagated to the host's protocol layer.

use std::sync::Arc;

use embedded_hal::i2c::I2c;
use tracing::{debug, error, info, warn};

use crate::config::MotorConfig;
use crate::messages::{Action, MotorCommand, MotorRequest, MotorState};
use crate::motor::{self, Direction, Drv8830Bus, FaultStatus, MotorChannel, SharedI2c, MAX_SPEED};

/// What happened to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Recorded, and any bus writes it needed succeeded
    Applied,
    /// Nothing to do: wrong node, unknown index, no channel configured, bus not started
    Ignored,
    /// A bus transaction failed; the motor is left as it was
    Failed,
}

/// Values the host stores for one logical motor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotorValues {
    pub num: Option<u8>,
    /// Requested magnitude, before the 6-bit hardware cap
    pub speed: i16,
    pub max_speed: u8,
    pub action: Option<Action>,
}

impl Default for MotorValues {
    fn default() -> Self {
        Self {
            num: None,
            speed: 0,
            max_speed: MAX_SPEED,
            action: None,
        }
    }
}

impl From<&MotorConfig> for MotorValues {
    fn from(config: &MotorConfig) -> Self {
        Self {
            num: config.channel,
            max_speed: config.max_speed,
            ..Self::default()
        }
    }
}

pub struct MotorComponent<'a, I2C> {
    node: String,
    bus: Arc<Drv8830Bus<'a, I2C>>,
    values: Vec<MotorValues>,
}

impl<'a, I2C: I2c> MotorComponent<'a, I2C> {
    pub fn new(node: impl Into<String>, bus: Arc<Drv8830Bus<'a, I2C>>, motors: &[MotorConfig]) -> Self {
        Self {
            node: node.into(),
            bus,
            values: motors.iter().map(MotorValues::from).collect(),
        }
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn bus(&self) -> &Arc<Drv8830Bus<'a, I2C>> {
        &self.bus
    }

    pub fn values(&self, index: usize) -> Option<&MotorValues> {
        self.values.get(index)
    }

    pub fn motor_count(&self) -> usize {
        self.values.len()
    }

    pub fn on_start(&self) -> bool {
        self.bus.on_start()
    }

    /// Stop the bus; every motor that had an action is recorded as released
    pub fn on_stop(&mut self) {
        self.bus.on_stop();
        for values in &mut self.values {
            if values.action.is_some() {
                values.action = Some(Action::Release);
            }
        }
    }

    /// Configure the board channel for a logical motor; `None` disables it
    pub fn set_channel(&mut self, index: usize, channel: Option<u8>) {
        if let Some(values) = self.values.get_mut(index) {
            values.num = channel;
        }
    }

    pub fn set_max_speed(&mut self, index: usize, max_speed: u8) {
        if let Some(values) = self.values.get_mut(index) {
            values.max_speed = max_speed;
        }
    }

    fn lookup(&mut self, node: &str, index: usize) -> Option<&mut MotorValues> {
        if node != self.node {
            debug!("Ignoring request for node '{}' (this is '{}')", node, self.node);
            return None;
        }
        let count = self.values.len();
        let values = self.values.get_mut(index);
        if values.is_none() {
            warn!("Ignoring request for motor {} ({} configured)", index, count);
        }
        values
    }

    /// Run `op` on the channel configured for `values`, under the bus guard
    fn with_channel<R>(
        &self,
        index: usize,
        values: &MotorValues,
        op: impl FnOnce(&mut MotorChannel, &mut SharedI2c<'a, I2C>) -> motor::Result<R>,
    ) -> Result<R, Dispatch> {
        let Some(num) = values.num else {
            debug!("Motor {} has no channel configured", index);
            return Err(Dispatch::Ignored);
        };
        let max_speed = values.max_speed;

        let outcome = self.bus.with_manager(|manager, i2c| {
            let Some(channel) = manager.motor(num) else {
                warn!("Motor {}: channel {} out of range", index, num);
                return Err(Dispatch::Ignored);
            };
            channel.set_max_speed(max_speed);
            op(channel, i2c).map_err(|e| {
                error!("Motor {} (channel {}): {}", index, num, e);
                Dispatch::Failed
            })
        });

        outcome.unwrap_or_else(|| {
            warn!("Motor {}: bus not started", index);
            Err(Dispatch::Ignored)
        })
    }

    fn applied<R>(result: Result<R, Dispatch>) -> Dispatch {
        result.map_or_else(|dispatch| dispatch, |_| Dispatch::Applied)
    }

    /// Drive at a signed speed; the sign selects forward or backward
    pub fn set_drive(&mut self, node: &str, index: usize, speed: i32) -> Dispatch {
        let Some(values) = self.lookup(node, index) else {
            return Dispatch::Ignored;
        };
        let limit = i32::from(values.max_speed);
        let speed = speed.clamp(-limit, limit) as i16;
        values.speed = speed.abs();
        values.action = Some(if speed < 0 {
            Action::Backward
        } else {
            Action::Forward
        });
        let values = values.clone();

        Self::applied(self.with_channel(index, &values, |channel, i2c| {
            channel.drive(i2c, speed)
        }))
    }

    /// Change speed magnitude, keeping the recorded direction
    ///
    /// A motor that is not running forward or backward only records the value.
    pub fn set_speed(&mut self, node: &str, index: usize, speed: i32) -> Dispatch {
        let Some(values) = self.lookup(node, index) else {
            return Dispatch::Ignored;
        };
        let magnitude = speed.unsigned_abs().min(u32::from(values.max_speed)) as u8;
        values.speed = i16::from(magnitude);
        let direction = match values.action {
            Some(Action::Forward) => Direction::Forward,
            Some(Action::Backward) => Direction::Backward,
            _ => {
                debug!("Motor {} not running, speed {} recorded", index, magnitude);
                return Dispatch::Applied;
            }
        };
        let values = values.clone();

        Self::applied(self.with_channel(index, &values, |channel, i2c| {
            channel.run(i2c, direction, magnitude)
        }))
    }

    pub fn set_action(&mut self, node: &str, index: usize, action: Action) -> Dispatch {
        let Some(values) = self.lookup(node, index) else {
            return Dispatch::Ignored;
        };
        values.action = Some(action);
        let values = values.clone();
        debug!("Motor {} action {}", index, action);
        let magnitude = values.speed.unsigned_abs().min(u16::from(MAX_SPEED)) as u8;

        Self::applied(self.with_channel(index, &values, |channel, i2c| match action {
            Action::Forward => channel.run(i2c, Direction::Forward, magnitude),
            Action::Backward => channel.run(i2c, Direction::Backward, magnitude),
            Action::Release => channel.run(i2c, Direction::Release, magnitude),
            Action::Brake => channel.brake(i2c),
        }))
    }

    pub fn set_stop(&mut self, node: &str, index: usize) -> Dispatch {
        let Some(values) = self.lookup(node, index) else {
            return Dispatch::Ignored;
        };
        values.action = Some(Action::Release);
        let values = values.clone();

        Self::applied(self.with_channel(index, &values, |channel, i2c| channel.stop(i2c)))
    }

    pub fn set_brake(&mut self, node: &str, index: usize) -> Dispatch {
        let Some(values) = self.lookup(node, index) else {
            return Dispatch::Ignored;
        };
        values.action = Some(Action::Brake);
        let values = values.clone();

        Self::applied(self.with_channel(index, &values, |channel, i2c| channel.brake(i2c)))
    }

    /// Read and clear the fault register of a motor
    pub fn get_fault(&mut self, node: &str, index: usize) -> Option<FaultStatus> {
        let values = self.lookup(node, index)?.clone();
        let status = self
            .with_channel(index, &values, |channel, i2c| channel.get_fault(i2c))
            .ok()?;
        if !status.is_clear() {
            warn!("Motor {} reported fault 0x{:02X}", index, status.bits());
        }
        Some(status)
    }

    /// Speed as seen by the host: signed by the last action, 0 unless running.
    /// Reads stored values only.
    pub fn get_current_speed(&self, node: &str, index: usize) -> i16 {
        if node != self.node {
            return 0;
        }
        self.values.get(index).map_or(0, current_speed)
    }

    /// Apply a host command; fault reads go through `get_fault`
    pub fn handle(&mut self, command: &MotorCommand) -> Dispatch {
        let MotorCommand {
            node,
            index,
            request,
        } = command;
        debug!(
            "Handling {:?} ({}) for motor {}",
            request,
            request.command_class().description(),
            index
        );
        match *request {
            MotorRequest::Drive(speed) => self.set_drive(node, *index, speed),
            MotorRequest::Speed(speed) => self.set_speed(node, *index, speed),
            MotorRequest::Stop => self.set_stop(node, *index),
            MotorRequest::Brake => self.set_brake(node, *index),
            MotorRequest::Action(action) => self.set_action(node, *index, action),
            MotorRequest::Fault => match self.get_fault(node, *index) {
                Some(_) => Dispatch::Applied,
                None => Dispatch::Ignored,
            },
        }
    }

    /// Snapshot of every logical motor
    pub fn states(&self) -> Vec<MotorState> {
        self.values
            .iter()
            .enumerate()
            .map(|(index, values)| MotorState {
                index,
                channel: values.num,
                speed: values.speed,
                current_speed: current_speed(values),
                action: values.action,
            })
            .collect()
    }

    /// Stop every configured motor, e.g. before shutting down
    pub fn stop_all(&mut self) {
        info!("Stopping all motors");
        let node = self.node.clone();
        for index in 0..self.values.len() {
            self.set_stop(&node, index);
        }
    }
}

fn current_speed(values: &MotorValues) -> i16 {
    match values.action {
        Some(Action::Forward) => values.speed,
        Some(Action::Backward) => -values.speed,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::motor::{BusConfig, SimulatedI2c};

    fn component(adapter: &Mutex<SimulatedI2c>) -> MotorComponent<'_, SimulatedI2c> {
        let bus = Arc::new(Drv8830Bus::new(adapter, BusConfig::default()));
        MotorComponent::new("node", bus, &vec![MotorConfig::default(); 2])
    }

    fn control(adapter: &Mutex<SimulatedI2c>, address: u8) -> u8 {
        adapter.lock().unwrap().register(address, 0x00)
    }

    #[test]
    fn test_current_speed_follows_action() {
        let adapter = Mutex::new(SimulatedI2c::new());
        let mut component = component(&adapter);
        for speed in 0..=255i16 {
            component.values[0].speed = speed;
            component.values[0].action = Some(Action::Forward);
            assert_eq!(component.get_current_speed("node", 0), speed);
            component.values[0].action = Some(Action::Backward);
            assert_eq!(component.get_current_speed("node", 0), -speed);
            component.values[0].action = Some(Action::Release);
            assert_eq!(component.get_current_speed("node", 0), 0);
            component.values[0].action = None;
            assert_eq!(component.get_current_speed("node", 0), 0);
        }
        assert_eq!(component.get_current_speed("other", 0), 0);
        assert_eq!(component.get_current_speed("node", 7), 0);
    }

    #[test]
    fn test_unset_channel_is_noop() {
        let adapter = Mutex::new(SimulatedI2c::new());
        let mut component = component(&adapter);
        assert!(component.on_start());
        let before = component.bus().guard_stats();

        assert_eq!(component.set_drive("node", 0, 50), Dispatch::Ignored);
        // Speed is still recorded
        assert_eq!(component.values(0).unwrap().speed, 50);
        assert_eq!(component.bus().guard_stats(), before);
    }

    #[test]
    fn test_wrong_node_and_index_ignored() {
        let adapter = Mutex::new(SimulatedI2c::new());
        let mut component = component(&adapter);
        component.set_channel(0, Some(1));
        assert!(component.on_start());

        assert_eq!(component.set_drive("other", 0, 50), Dispatch::Ignored);
        assert_eq!(component.values(0).unwrap().speed, 0);
        assert_eq!(component.set_drive("node", 5, 50), Dispatch::Ignored);
        assert_eq!(component.get_fault("node", 5), None);
    }

    #[test]
    fn test_out_of_range_channel_ignored() {
        let adapter = Mutex::new(SimulatedI2c::new());
        let mut component = component(&adapter);
        component.set_channel(0, Some(9));
        assert!(component.on_start());
        assert_eq!(component.set_drive("node", 0, 50), Dispatch::Ignored);
        assert!(component.bus().guard_stats().is_balanced());
    }

    #[test]
    fn test_not_started_is_noop() {
        let adapter = Mutex::new(SimulatedI2c::new());
        let mut component = component(&adapter);
        component.set_channel(0, Some(1));
        assert_eq!(component.set_stop("node", 0), Dispatch::Ignored);
        assert_eq!(component.get_fault("node", 0), None);
    }

    #[test]
    fn test_drive_clamps_to_max_speed() {
        let adapter = Mutex::new(SimulatedI2c::new());
        let mut component = component(&adapter);
        component.set_channel(1, Some(2));
        component.set_max_speed(1, 40);
        assert!(component.on_start());

        assert_eq!(component.set_drive("node", 1, -300), Dispatch::Applied);
        assert_eq!(component.values(1).unwrap().speed, 40);
        assert_eq!(component.get_current_speed("node", 1), -40);
    }

    #[test]
    fn test_states_snapshot() {
        let adapter = Mutex::new(SimulatedI2c::new());
        let mut component = component(&adapter);
        component.set_channel(0, Some(1));
        assert!(component.on_start());
        component.set_drive("node", 0, -20);

        let states = component.states();
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].channel, Some(1));
        assert_eq!(states[0].current_speed, -20);
        assert_eq!(states[1].action, None);

        component.stop_all();
        assert_eq!(component.get_current_speed("node", 0), 0);
    }

    #[test]
    fn test_stop_releases_recorded_action() {
        let adapter = Mutex::new(SimulatedI2c::new());
        let mut component = component(&adapter);
        component.set_channel(0, Some(1));
        assert!(component.on_start());

        assert_eq!(component.set_drive("node", 0, 30), Dispatch::Applied);
        assert_eq!(control(&adapter, 0x60), (30 << 2) | 0b10);

        component.on_stop();
        assert_eq!(control(&adapter, 0x60), 0x00);
        assert_eq!(component.get_current_speed("node", 0), 0);
        assert_eq!(component.values(0).unwrap().action, Some(Action::Release));
        // Never-commanded motors keep no action
        assert_eq!(component.values(1).unwrap().action, None);
    }

    #[test]
    fn test_speed_after_restart_waits_for_action() {
        let adapter = Mutex::new(SimulatedI2c::new());
        let mut component = component(&adapter);
        component.set_channel(0, Some(1));
        assert!(component.on_start());
        assert_eq!(component.set_drive("node", 0, 30), Dispatch::Applied);

        component.on_stop();
        assert!(component.on_start());

        // Released after the restart: only recorded, the chip stays in standby
        assert_eq!(component.set_speed("node", 0, 40), Dispatch::Applied);
        assert_eq!(component.get_current_speed("node", 0), 0);
        assert_eq!(control(&adapter, 0x60), 0x00);

        assert_eq!(component.set_action("node", 0, Action::Forward), Dispatch::Applied);
        assert_eq!(component.get_current_speed("node", 0), 40);
        assert_eq!(control(&adapter, 0x60), (40 << 2) | 0b10);
    }

    #[test]
    fn test_speed_follows_recorded_direction() {
        let adapter = Mutex::new(SimulatedI2c::new());
        let mut component = component(&adapter);
        component.set_channel(1, Some(2));
        assert!(component.on_start());

        assert_eq!(component.set_drive("node", 1, -10), Dispatch::Applied);
        assert_eq!(component.set_speed("node", 1, 25), Dispatch::Applied);
        assert_eq!(component.get_current_speed("node", 1), -25);
        assert_eq!(control(&adapter, 0x61), (25 << 2) | 0b01);
    }
}
