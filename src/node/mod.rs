//! Node/nvm environment resolution.

pub mod commands;
mod env;
mod error;
mod resolver;

pub use env::*;
pub use error::*;
pub use resolver::*;
