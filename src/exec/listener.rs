//! Listener that bridges process output to the event emitter.
//!
//! A [`ProcessListener`] receives the raw data/finish callbacks from a
//! running process, re-emits them as `"data"` and `"finish"` events, and
//! keeps the full transcript plus an elapsed-time measurement.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::events::{callback, Callback, CallbackError, EventEmitter};

/// Event name for output chunks.
pub const DATA_EVENT: &str = "data";

/// Event name for process completion.
pub const FINISH_EVENT: &str = "finish";

/// Payload delivered with `"data"` and `"finish"` events.
///
/// For `"data"` the bytes are the chunk just read; for `"finish"` they are
/// the whole transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEvent {
    /// OS process id, when known.
    pub pid: Option<u32>,
    /// Chunk or transcript bytes.
    pub bytes: Vec<u8>,
}

impl ProcessEvent {
    /// Create an event payload.
    #[must_use]
    pub fn new(pid: Option<u32>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            pid,
            bytes: bytes.into(),
        }
    }

    /// Bytes decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Typed handler attached to a listener.
///
/// Both methods default to doing nothing.
pub trait ProcessHandler: Send + Sync {
    /// Called for every output chunk.
    ///
    /// # Errors
    ///
    /// An error stops delivery to callbacks registered after this handler.
    fn handle_data(&self, _event: &ProcessEvent) -> Result<(), CallbackError> {
        Ok(())
    }

    /// Called once with the full transcript when the process finishes.
    ///
    /// # Errors
    ///
    /// An error stops delivery to callbacks registered after this handler.
    fn handle_finish(&self, _event: &ProcessEvent) -> Result<(), CallbackError> {
        Ok(())
    }
}

#[derive(Debug)]
struct ListenerState {
    transcript: Vec<u8>,
    finished: bool,
    started: Instant,
    stopped: Option<Instant>,
}

/// Accumulating listener for a single process run.
///
/// Clones share the same subscriptions and transcript, so a caller can keep
/// a clone while the execution task owns another.
#[derive(Debug, Clone)]
pub struct ProcessListener {
    emitter: EventEmitter<ProcessEvent>,
    state: Arc<Mutex<ListenerState>>,
}

impl ProcessListener {
    /// Create a listener with no subscriptions.
    #[must_use]
    pub fn new() -> Self {
        Self {
            emitter: EventEmitter::new(),
            state: Arc::new(Mutex::new(ListenerState {
                transcript: Vec::new(),
                finished: false,
                started: Instant::now(),
                stopped: None,
            })),
        }
    }

    /// Create a listener whose first subscriptions forward to `handler`.
    #[must_use]
    pub fn with_handler<H>(handler: Arc<H>) -> Self
    where
        H: ProcessHandler + 'static,
    {
        let listener = Self::new();
        let on_data = Arc::clone(&handler);
        listener
            .emitter
            .on(DATA_EVENT, callback(move |ev: &ProcessEvent| on_data.handle_data(ev)));
        listener
            .emitter
            .on(FINISH_EVENT, callback(move |ev: &ProcessEvent| handler.handle_finish(ev)));
        listener
    }

    /// The underlying emitter, for `on`/`off` with arbitrary event names.
    #[must_use]
    pub fn emitter(&self) -> &EventEmitter<ProcessEvent> {
        &self.emitter
    }

    /// Subscribe to output chunks. Returns the registered callback so it can
    /// later be passed to `off`.
    pub fn on_data<F>(&self, f: F) -> Callback<ProcessEvent>
    where
        F: Fn(&ProcessEvent) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        let cb = callback(f);
        self.emitter.on(DATA_EVENT, Arc::clone(&cb));
        cb
    }

    /// Subscribe to completion. Returns the registered callback.
    pub fn on_finish<F>(&self, f: F) -> Callback<ProcessEvent>
    where
        F: Fn(&ProcessEvent) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        let cb = callback(f);
        self.emitter.on(FINISH_EVENT, Arc::clone(&cb));
        cb
    }

    /// Deliver an output chunk: emit `"data"`, then append to the transcript.
    ///
    /// The chunk is appended even when a callback fails.
    ///
    /// # Errors
    ///
    /// Returns the first callback error from the emission.
    ///
    /// # Panics
    ///
    /// Panics if the internal `Mutex` is poisoned.
    pub fn handle_data(&self, pid: Option<u32>, chunk: &[u8]) -> Result<(), CallbackError> {
        let event = ProcessEvent::new(pid, chunk);
        let result = self.emitter.emit(DATA_EVENT, &event);
        self.state
            .lock()
            .expect("Mutex poisoned")
            .transcript
            .extend_from_slice(chunk);
        result
    }

    /// Deliver completion: mark the listener finished, stop the timer, then
    /// emit `"finish"` with the transcript.
    ///
    /// Only the first call has any effect, including across clones.
    ///
    /// # Errors
    ///
    /// Returns the first callback error from the emission.
    ///
    /// # Panics
    ///
    /// Panics if the internal `Mutex` is poisoned.
    pub fn handle_finished(&self, pid: Option<u32>) -> Result<(), CallbackError> {
        let transcript = {
            let mut state = self.state.lock().expect("Mutex poisoned");
            if state.finished {
                tracing::debug!(?pid, "Ignoring repeated finish");
                return Ok(());
            }
            state.finished = true;
            state.stopped = Some(Instant::now());
            state.transcript.clone()
        };

        self.emitter
            .emit(FINISH_EVENT, &ProcessEvent::new(pid, transcript))
    }

    /// Everything received so far, in delivery order.
    ///
    /// # Panics
    ///
    /// Panics if the internal `Mutex` is poisoned.
    #[must_use]
    pub fn transcript(&self) -> Vec<u8> {
        self.state.lock().expect("Mutex poisoned").transcript.clone()
    }

    /// Whether the finish event has been delivered.
    ///
    /// # Panics
    ///
    /// Panics if the internal `Mutex` is poisoned.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state.lock().expect("Mutex poisoned").finished
    }

    /// Time from creation until finish, or until now if still running.
    ///
    /// # Panics
    ///
    /// Panics if the internal `Mutex` is poisoned.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        let state = self.state.lock().expect("Mutex poisoned");
        state
            .stopped
            .unwrap_or_else(Instant::now)
            .duration_since(state.started)
    }
}

impl Default for ProcessListener {
    fn default() -> Self {
        Self::new()
    }
}
