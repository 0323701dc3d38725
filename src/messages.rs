// Define message types exchanged with the host framework

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::commands::CommandClass;
use crate::motor::FaultStatus;

/// Direction/action state recorded for a logical motor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Forward,
    Backward,
    Release,
    Brake,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Forward => "forward",
            Action::Backward => "backward",
            Action::Release => "release",
            Action::Brake => "brake",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Unknown action '{0}'")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forward" => Ok(Action::Forward),
            "backward" => Ok(Action::Backward),
            "release" => Ok(Action::Release),
            "brake" => Ok(Action::Brake),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

// Request from host -> component, e.g. {"command": "drive", "value": -120}
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "value", rename_all = "snake_case")]
pub enum MotorRequest {
    Drive(i32),
    Speed(i32),
    Stop,
    Brake,
    Action(Action),
    Fault,
}

impl MotorRequest {
    /// Command class the host files this request under
    pub fn command_class(&self) -> CommandClass {
        match self {
            MotorRequest::Speed(_) => CommandClass::SwitchMultilevel,
            _ => CommandClass::Motor,
        }
    }
}

// Addressed command: which node and which logical motor on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotorCommand {
    pub node: String,
    pub index: usize,
    pub request: MotorRequest,
}

// State published per logical motor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotorState {
    pub index: usize,
    pub channel: Option<u8>,
    pub speed: i16,
    pub current_speed: i16,
    pub action: Option<Action>,
}

// Result of a fault register read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultReport {
    pub index: usize,
    pub raw: u8,
    pub fault: bool,
    pub over_current: bool,
    pub under_voltage: bool,
    pub over_temperature: bool,
    pub current_limit: bool,
}

impl FaultReport {
    pub fn new(index: usize, status: FaultStatus) -> Self {
        Self {
            index,
            raw: status.bits(),
            fault: status.fault(),
            over_current: status.over_current(),
            under_voltage: status.under_voltage(),
            over_temperature: status.over_temperature(),
            current_limit: status.current_limit(),
        }
    }
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    BusUnavailable,
}
