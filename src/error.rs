use crate::sequence::SequenceState;
use crate::timer::TimerName;
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur while driving a sequence.
///
/// Anything raised by an action, a handler or a normal callback is caught
/// by the engine and routed to [`Sequence::failed`](crate::Sequence::failed).
/// Errors raised by error or finally callbacks are returned to whoever
/// triggered the failure.
///
/// # Non-Exhaustive
///
/// Always include a wildcard arm when matching:
///
/// ```
/// use tsunagi::SequenceError;
///
/// fn describe(error: &SequenceError) -> String {
///     match error {
///         SequenceError::UnhandledAction { action } => format!("nobody handled {action}"),
///         SequenceError::ImbalancedResume => "too many resumes".to_string(),
///         SequenceError::Message(msg) => msg.clone(),
///         _ => error.to_string(),
///     }
/// }
///
/// assert_eq!(describe(&SequenceError::msg("boom")), "boom");
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SequenceError {
    /// No handler in the chain claimed the action.
    #[error("no handler claimed action: {action}")]
    UnhandledAction {
        /// Short description of the rejected action
        action: String,
    },

    /// A timer operation referenced a name that is not armed.
    #[error("unknown timer: {0}")]
    UnknownTimer(TimerName),

    /// `resume` was called more times than `pause`.
    #[error("resume called more times than pause")]
    ImbalancedResume,

    /// `run` was called on a sequence that already left `Pending`.
    #[error("sequence already started (state: {state})")]
    AlreadyStarted {
        /// State at the time of the call
        state: SequenceState,
    },

    /// `finished`/`failed` was called on a terminal sequence.
    #[error("sequence already terminated (state: {state})")]
    AlreadyTerminated {
        /// The terminal state
        state: SequenceState,
    },

    /// The sequence has no open command queue: it was never spawned, or
    /// every handle to it is gone.
    #[error("sequence is not reachable; call Sequence::spawn first")]
    Detached,

    /// Options could not be parsed.
    #[error("invalid sequence options: {0}")]
    InvalidOptions(String),

    /// An arbitrary failure raised by user code.
    #[error("{0}")]
    Message(String),
}

impl SequenceError {
    /// Creates a [`SequenceError::Message`].
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// The argument list handed to error callbacks when the engine routes
    /// this error to `failed()`.
    pub(crate) fn into_args(self) -> Vec<Value> {
        vec![Value::String(self.to_string())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_displays_verbatim() {
        assert_eq!(SequenceError::msg("boom").to_string(), "boom");
        assert_eq!(
            SequenceError::msg("boom").into_args(),
            vec![Value::String("boom".to_string())]
        );
    }

    #[test]
    fn test_error_display() {
        let error = SequenceError::UnhandledAction {
            action: "payload \"x\"".to_string(),
        };
        assert_eq!(error.to_string(), "no handler claimed action: payload \"x\"");

        let error = SequenceError::UnknownTimer(TimerName::new("watchdog"));
        assert_eq!(error.to_string(), "unknown timer: watchdog");

        let error = SequenceError::AlreadyTerminated {
            state: SequenceState::Finished,
        };
        assert_eq!(
            error.to_string(),
            "sequence already terminated (state: finished)"
        );
    }
}
