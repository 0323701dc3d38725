// Topics, defaults and the runtime configuration file
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::motor::{BusConfig, DEFAULT_FREQUENCY_HZ, DEFAULT_PWM_ADDRESS, MAX_SPEED};

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Zenoh topics
pub const TOPIC_CMD_MOTOR: &str = "drv8830/cmd/motor"; // commands
pub const TOPIC_STATE_MOTOR: &str = "drv8830/state/motor"; // per-motor state
pub const TOPIC_FAULT: &str = "drv8830/state/fault"; // fault reads
pub const TOPIC_HEALTH: &str = "drv8830/state/health"; // health status

// I2C adapter the board is attached to
pub const I2C_DEVICE: &str = "/dev/i2c-1";

// Node identifier commands must address
pub const NODE_ID: &str = "drv8830";

// Pipe-separated DRV8830 addresses, motor channel 1 first
pub const MOTOR_ADDRESSES: &str = "0x60|0x61";

// Enable hardware motor control (set to false for simulation/testing)
pub const MOTOR_ENABLED: bool = true;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid I2C address '{0}'")]
    InvalidAddress(String),

    #[error("Motor address list is empty")]
    EmptyAddressList,
}

/// Per logical motor settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorConfig {
    /// Channel 1..=4 on the board; unset means commands for this motor are ignored
    pub channel: Option<u8>,
    pub max_speed: u8,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            channel: None,
            max_speed: MAX_SPEED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub node: String,
    pub i2c_device: String,
    pub address: u8,
    pub frequency_hz: u16,
    pub motor_addresses: String,
    pub motors: Vec<MotorConfig>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            node: NODE_ID.to_string(),
            i2c_device: I2C_DEVICE.to_string(),
            address: DEFAULT_PWM_ADDRESS,
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            motor_addresses: MOTOR_ADDRESSES.to_string(),
            motors: vec![
                MotorConfig {
                    channel: Some(1),
                    ..MotorConfig::default()
                },
                MotorConfig {
                    channel: Some(2),
                    ..MotorConfig::default()
                },
            ],
        }
    }
}

impl RuntimeConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn bus_config(&self) -> Result<BusConfig, ConfigError> {
        Ok(BusConfig {
            address: self.address,
            frequency_hz: self.frequency_hz,
            motor_addresses: parse_address_list(&self.motor_addresses)?,
        })
    }
}

/// Parse a 7-bit I2C address written as hex (`0x60`) or decimal (`96`)
pub fn parse_address(text: &str) -> Result<u8, ConfigError> {
    let trimmed = text.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => trimmed.parse::<u8>(),
    };
    match parsed {
        Ok(address) if address <= 0x7F => Ok(address),
        _ => Err(ConfigError::InvalidAddress(trimmed.to_string())),
    }
}

/// Parse `"0x60|0x61"` into addresses, in channel order
pub fn parse_address_list(text: &str) -> Result<Vec<u8>, ConfigError> {
    let addresses = text
        .split('|')
        .filter(|part| !part.trim().is_empty())
        .map(parse_address)
        .collect::<Result<Vec<_>, _>>()?;
    if addresses.is_empty() {
        return Err(ConfigError::EmptyAddressList);
    }
    Ok(addresses)
}
