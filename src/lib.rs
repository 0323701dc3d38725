// DRV8830 motor runtime
//
// - motor: register codec, PWM controller, bus manager and acquisition guard
// - component: host-facing motor component
// - runtime: zenoh host loop

pub mod commands;
pub mod component;
pub mod config;
pub mod messages;
pub mod motor;
pub mod runtime;
