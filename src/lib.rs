//! SublimeTools - async process execution and Node/nvm environment discovery.

pub mod config;
pub mod display;
pub mod events;
pub mod exec;
pub mod node;
pub mod probe;
