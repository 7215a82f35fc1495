//! Actions queued on a sequence and the per-dispatch request/outcome types.

use crate::config::SequenceOptions;
use crate::error::SequenceError;
use crate::sequence::Sequence;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Directly invocable action body.
pub type CodeFn = Box<dyn FnMut(&mut Sequence) -> Result<Value, SequenceError> + Send>;

/// One unit of work in a sequence's queue.
///
/// The engine never looks inside an action; it only hands it to the
/// handler chain. [`Action::Code`] is resolved by the built-in
/// [`CodeHandler`](crate::CodeHandler); the other variants exist for
/// custom handlers.
///
/// # Examples
///
/// ```
/// use tsunagi::{Action, Value};
/// use serde_json::json;
///
/// let code = Action::code(|seq| {
///     seq.heap_mut().insert("a", 5i64);
///     Ok(Value::Null)
/// });
/// assert!(code.is_code());
///
/// let post = Action::payload(json!(["post", "session-1", "login"]));
/// assert_eq!(post.describe(), r#"payload ["post","session-1","login"]"#);
/// ```
pub enum Action {
    /// Code invoked with the sequence as sole argument.
    Code(CodeFn),
    /// Structured value meaningful only to a custom handler.
    Payload(Value),
    /// Typed opaque value, recovered with [`Request::downcast_ref`].
    Custom(Box<dyn Any + Send>),
}

impl Action {
    /// Wraps a closure as a code action.
    pub fn code<F>(f: F) -> Self
    where
        F: FnMut(&mut Sequence) -> Result<Value, SequenceError> + Send + 'static,
    {
        Self::Code(Box::new(f))
    }

    pub fn payload(value: impl Into<Value>) -> Self {
        Self::Payload(value.into())
    }

    pub fn custom<T: Any + Send>(value: T) -> Self {
        Self::Custom(Box::new(value))
    }

    pub fn is_code(&self) -> bool {
        matches!(self, Self::Code(_))
    }

    /// Short label used in logs and in [`SequenceError::UnhandledAction`].
    pub fn describe(&self) -> String {
        match self {
            Self::Code(_) => "code".to_string(),
            Self::Payload(value) => format!("payload {value}"),
            Self::Custom(_) => "custom".to_string(),
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Action({})", self.describe())
    }
}

impl From<Value> for Action {
    fn from(value: Value) -> Self {
        Self::Payload(value)
    }
}

/// Built once per dispatch and handed to each handler until one claims it.
#[derive(Debug)]
pub struct Request {
    action: Action,
    options: Arc<SequenceOptions>,
}

impl Request {
    pub(crate) fn new(action: Action, options: Arc<SequenceOptions>) -> Self {
        Self { action, options }
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn action_mut(&mut self) -> &mut Action {
        &mut self.action
    }

    /// Options of the sequence the action belongs to.
    pub fn options(&self) -> &SequenceOptions {
        &self.options
    }

    /// The structured value of a [`Action::Payload`].
    pub fn payload(&self) -> Option<&Value> {
        match &self.action {
            Action::Payload(value) => Some(value),
            _ => None,
        }
    }

    /// The typed value of a [`Action::Custom`], if it is a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match &self.action {
            Action::Custom(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }
}

/// What a handler did with a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Not mine; try the next handler.
    Deferred,
    /// Drop the action without touching the sequence result.
    Skip,
    /// Resolved; the value becomes the sequence result.
    Value(Value),
}

impl Outcome {
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq)]
    struct Login {
        user: String,
    }

    #[test]
    fn test_describe() {
        assert_eq!(Action::code(|_| Ok(Value::Null)).describe(), "code");
        assert_eq!(Action::payload(json!("x")).describe(), "payload \"x\"");
        assert_eq!(Action::custom(7u8).describe(), "custom");
    }

    #[test]
    fn test_request_accessors() {
        let options = Arc::new(SequenceOptions::default());

        let request = Request::new(Action::payload(json!({"op": "ping"})), options.clone());
        assert_eq!(request.payload(), Some(&json!({"op": "ping"})));
        assert!(request.downcast_ref::<Login>().is_none());

        let request = Request::new(
            Action::custom(Login {
                user: "alice".to_string(),
            }),
            options,
        );
        assert!(request.payload().is_none());
        assert_eq!(
            request.downcast_ref::<Login>().map(|l| l.user.as_str()),
            Some("alice")
        );
    }

    #[test]
    fn test_outcome_value() {
        assert_eq!(Outcome::value(10), Outcome::Value(json!(10)));
    }
}
