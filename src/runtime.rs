// Host loop: drains zenoh commands into the motor component at LOOP_HZ and
// publishes motor state and bus health every tick
// Ctrl-C stops every motor and resets the board before exiting

use std::sync::{Arc, Mutex};
use std::time::Duration;

use embedded_hal::i2c::I2c;
use tokio::time::interval;
use tracing::{info, warn};

use crate::component::{Dispatch, MotorComponent};
use crate::config::{
    RuntimeConfig, LOOP_HZ, TOPIC_CMD_MOTOR, TOPIC_FAULT, TOPIC_HEALTH, TOPIC_STATE_MOTOR,
};
use crate::messages::{FaultReport, MotorCommand, MotorRequest, RuntimeHealth};
use crate::motor::Drv8830Bus;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub struct Runtime<'a, I2C> {
    component: MotorComponent<'a, I2C>,
    health: RuntimeHealth,
}

impl<'a, I2C: I2c> Runtime<'a, I2C> {
    pub fn new(component: MotorComponent<'a, I2C>) -> Self {
        Self {
            component,
            health: RuntimeHealth::BusUnavailable, // Unavailable until started
        }
    }

    pub fn component(&self) -> &MotorComponent<'a, I2C> {
        &self.component
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    /// Start the bus; a failed start is logged and the runtime keeps going
    pub fn start(&mut self) {
        if !self.component.on_start() {
            warn!("drv8830 board unavailable, motor commands will be ignored");
        }
        self.update_health();
    }

    /// Process incoming command; fault reads produce a report
    pub fn on_command(&mut self, cmd: MotorCommand) -> Option<FaultReport> {
        info!("Received command: {:?}", &cmd);
        if cmd.request == MotorRequest::Fault {
            return self
                .component
                .get_fault(&cmd.node, cmd.index)
                .map(|status| FaultReport::new(cmd.index, status));
        }
        if self.component.handle(&cmd) == Dispatch::Failed {
            warn!("Command for motor {} failed on the bus", cmd.index);
        }
        None
    }

    fn update_health(&mut self) -> RuntimeHealth {
        let health = if self.component.bus().is_started() {
            RuntimeHealth::Ok
        } else {
            RuntimeHealth::BusUnavailable
        };
        if health != self.health {
            info!("Health changed: {:?} -> {:?}", self.health, health);
        }
        self.health = health;
        health
    }

    /// Stop motors and reset the board
    pub fn shutdown(&mut self) {
        self.component.on_stop();
        self.update_health();
    }
}

pub async fn run<I2C: I2c>(config: RuntimeConfig, i2c: I2C) -> Result<(), BoxError> {
    let adapter = Mutex::new(i2c);
    let bus = Arc::new(Drv8830Bus::new(&adapter, config.bus_config()?));
    let mut runtime = Runtime::new(MotorComponent::new(
        config.node.clone(),
        bus,
        &config.motors,
    ));
    runtime.start();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    let result = serve(&session, &mut runtime).await;
    runtime.shutdown();
    session.close().await?;
    result
}

async fn serve<I2C: I2c>(session: &zenoh::Session, runtime: &mut Runtime<'_, I2C>) -> Result<(), BoxError> {
    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_MOTOR).await?;
    let pub_state = session.declare_publisher(TOPIC_STATE_MOTOR).await?;
    let pub_fault = session.declare_publisher(TOPIC_FAULT).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        "Runtime started: {}Hz loop, node '{}', {} motor(s)",
        LOOP_HZ,
        runtime.component().node(),
        runtime.component().motor_count()
    );
    info!("Subscribed to: {}", TOPIC_CMD_MOTOR);
    info!(
        "Publishing to: {}, {}, {}",
        TOPIC_STATE_MOTOR, TOPIC_FAULT, TOPIC_HEALTH
    );

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut shutdown => {
                info!("Shutdown requested");
                return Ok(());
            }
        }

        // 1. Drain all pending commands (non-blocking), in arrival order
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<MotorCommand>(&payload) {
                Ok(cmd) => {
                    if let Some(report) = runtime.on_command(cmd) {
                        pub_fault.put(serde_json::to_string(&report)?).await?;
                    }
                }
                Err(e) => {
                    warn!("Failed to parse command: {}", e);
                }
            }
        }

        // 2. Publish motor state
        let states_json = serde_json::to_string(&runtime.component().states())?;
        pub_state.put(states_json).await?;

        // 3. Publish health
        let health_json = serde_json::to_string(&runtime.update_health())?;
        pub_health.put(health_json).await?;
    }
}
