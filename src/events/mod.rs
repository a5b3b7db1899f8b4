//! Event emitter primitive shared by process listeners.

mod emitter;

pub use emitter::*;
