//! Process execution facade: listeners, spawning, and node helpers.

mod error;
mod js;
mod listener;
mod process;

pub use error::*;
pub use js::*;
pub use listener::*;
pub use process::*;
