//! Configuration module.

mod loader;
mod platform;
mod settings;
mod types;

pub use loader::*;
pub use platform::*;
pub use settings::*;
pub use types::*;
