//! Name-keyed callback registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Error returned by an event callback.
///
/// Returning this from a callback stops delivery of the current emission to
/// any callbacks registered after it.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Listener callback failed: {message}")]
pub struct CallbackError {
    message: String,
}

impl CallbackError {
    /// Create a callback error with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The message the callback reported.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A shared, invocable event callback.
///
/// Identity is the allocation behind the `Arc`: registering the same
/// `Callback` twice produces two entries, and `off` removes both.
pub type Callback<A> = Arc<dyn Fn(&A) -> Result<(), CallbackError> + Send + Sync>;

/// Wrap a closure as a [`Callback`].
pub fn callback<A, F>(f: F) -> Callback<A>
where
    F: Fn(&A) -> Result<(), CallbackError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Registry mapping event names to ordered callback lists.
///
/// Clones share the same registry.
pub struct EventEmitter<A> {
    handlers: Arc<Mutex<HashMap<String, Vec<Callback<A>>>>>,
}

impl<A> EventEmitter<A> {
    /// Create an empty emitter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Append `callback` to the list for `event`.
    ///
    /// # Panics
    ///
    /// Panics if the internal `Mutex` is poisoned.
    pub fn on(&self, event: &str, callback: Callback<A>) {
        self.handlers
            .lock()
            .expect("Mutex poisoned")
            .entry(event.to_string())
            .or_default()
            .push(callback);
    }

    /// Remove every registration of `callback` under `event`.
    ///
    /// # Panics
    ///
    /// Panics if the internal `Mutex` is poisoned.
    pub fn off(&self, event: &str, callback: &Callback<A>) {
        let mut handlers = self.handlers.lock().expect("Mutex poisoned");
        if let Some(list) = handlers.get_mut(event) {
            list.retain(|registered| !Arc::ptr_eq(registered, callback));
            if list.is_empty() {
                handlers.remove(event);
            }
        }
    }

    /// Remove all callbacks for `event`.
    ///
    /// # Panics
    ///
    /// Panics if the internal `Mutex` is poisoned.
    pub fn remove_all(&self, event: &str) {
        self.handlers.lock().expect("Mutex poisoned").remove(event);
    }

    /// Number of callbacks registered for `event`.
    ///
    /// # Panics
    ///
    /// Panics if the internal `Mutex` is poisoned.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.handlers
            .lock()
            .expect("Mutex poisoned")
            .get(event)
            .map_or(0, Vec::len)
    }

    /// Invoke every callback for `event` in registration order.
    ///
    /// The registry lock is released before callbacks run, so a callback may
    /// register or remove callbacks; such changes apply to the next emission.
    ///
    /// # Errors
    ///
    /// Returns the first callback error. Callbacks after the failing one are
    /// not invoked for this emission.
    ///
    /// # Panics
    ///
    /// Panics if the internal `Mutex` is poisoned.
    pub fn emit(&self, event: &str, args: &A) -> Result<(), CallbackError> {
        let snapshot: Vec<Callback<A>> = self
            .handlers
            .lock()
            .expect("Mutex poisoned")
            .get(event)
            .cloned()
            .unwrap_or_default();

        for cb in &snapshot {
            cb(args)?;
        }
        Ok(())
    }
}

impl<A> Clone for EventEmitter<A> {
    fn clone(&self) -> Self {
        Self {
            handlers: Arc::clone(&self.handlers),
        }
    }
}

impl<A> Default for EventEmitter<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for EventEmitter<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let events: Vec<String> = self
            .handlers
            .lock()
            .map(|h| h.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("EventEmitter")
            .field("events", &events)
            .finish()
    }
}
