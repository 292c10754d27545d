//! Operator-console link layer for driving a remote robot over UDP.
//!
//! - [`protocol`] - wire frames and checksums
//! - [`joystick`] - controller channel values and input scaling
//! - [`link`] - connection state machine, timers and receive dispatch
//! - [`config`] - TOML configuration
//! - [`console`] - operator commands for the `robotlink` binary

pub mod config;
pub mod console;
pub mod joystick;
pub mod link;
pub mod protocol;
