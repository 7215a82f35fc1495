use crate::error::SequenceError;
use crate::sequence::Sequence;
use serde_json::Value;
use std::fmt;

/// Continuation invoked with the sequence and the terminal arguments.
pub type CallbackFn =
    Box<dyn FnOnce(&mut Sequence, &[Value]) -> Result<(), SequenceError> + Send>;

/// Which registry a callback belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    /// Runs on `finished`.
    Normal,
    /// Runs on `failed`.
    Error,
    /// Runs after either.
    Finally,
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackKind::Normal => write!(f, "callback"),
            CallbackKind::Error => write!(f, "error_callback"),
            CallbackKind::Finally => write!(f, "finally_callback"),
        }
    }
}

/// The three FIFO callback registries of a sequence.
///
/// Invocation drains a registry, so every callback runs at most once.
#[derive(Default)]
pub(crate) struct Callbacks {
    normal: Vec<CallbackFn>,
    error: Vec<CallbackFn>,
    finally: Vec<CallbackFn>,
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("normal", &self.normal.len())
            .field("error", &self.error.len())
            .field("finally", &self.finally.len())
            .finish()
    }
}

impl Callbacks {
    fn registry(&mut self, kind: CallbackKind) -> &mut Vec<CallbackFn> {
        match kind {
            CallbackKind::Normal => &mut self.normal,
            CallbackKind::Error => &mut self.error,
            CallbackKind::Finally => &mut self.finally,
        }
    }

    pub(crate) fn push(&mut self, kind: CallbackKind, callback: CallbackFn) {
        self.registry(kind).push(callback);
    }

    /// Removes and returns the registry contents in registration order.
    pub(crate) fn take(&mut self, kind: CallbackKind) -> Vec<CallbackFn> {
        std::mem::take(self.registry(kind))
    }

    pub(crate) fn len(&self, kind: CallbackKind) -> usize {
        match kind {
            CallbackKind::Normal => self.normal.len(),
            CallbackKind::Error => self.error.len(),
            CallbackKind::Finally => self.finally.len(),
        }
    }
}
