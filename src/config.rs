//! Sequence configuration: recognized options and the chainable builder.

use crate::action::Action;
use crate::callback::{CallbackFn, CallbackKind, Callbacks};
use crate::error::SequenceError;
use crate::handler::{Handler, HandlerRegistry};
use crate::sequence::Sequence;
use crate::timer::{TimerFn, TimerName, TimerOutcome};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// Keys that name builder methods and therefore cannot come from data.
const CHAINABLE_KEYS: [&str; 6] = [
    "add_callback",
    "add_error_callback",
    "add_finally_callback",
    "add_action",
    "add_handler",
    "add_delay",
];

/// Options carried by a sequence.
///
/// `auto_pause` and `auto_resume` are interpreted by the engine; every
/// other key lands in `extra` untouched for custom handlers to read.
///
/// # Examples
///
/// ```
/// use tsunagi::SequenceOptions;
/// use serde_json::json;
///
/// let options = SequenceOptions::from_value(json!({
///     "auto_pause": true,
///     "session": "s-42",
/// }))?;
///
/// assert!(options.auto_pause);
/// assert!(!options.auto_resume);
/// assert_eq!(options.get("session"), Some(&json!("s-42")));
/// # Ok::<(), tsunagi::SequenceError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SequenceOptions {
    /// Pause before every action dispatch.
    #[serde(default)]
    pub auto_pause: bool,
    /// Release one outstanding pause after every action dispatch. No
    /// effect when nothing is paused.
    #[serde(default)]
    pub auto_resume: bool,
    /// Unrecognized keys, stored verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SequenceOptions {
    /// Parses options from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::InvalidOptions`] if `value` is not an object,
    /// if `auto_pause`/`auto_resume` are not booleans, or if a key names a
    /// builder method (those take closures and must go through
    /// [`SequenceBuilder`]).
    pub fn from_value(value: Value) -> Result<Self, SequenceError> {
        if let Some(key) = value
            .as_object()
            .and_then(|map| CHAINABLE_KEYS.iter().find(|k| map.contains_key(**k)))
        {
            return Err(SequenceError::InvalidOptions(format!(
                "`{key}` must be configured through SequenceBuilder"
            )));
        }
        serde_json::from_value(value).map_err(|e| SequenceError::InvalidOptions(e.to_string()))
    }

    /// Looks up a free-form option.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

/// Builder for [`Sequence`].
///
/// Every `add_*` call is forwarded exactly once, in call order within
/// each kind, to the method of the same name on the built sequence.
///
/// # Examples
///
/// ```
/// use tsunagi::prelude::*;
///
/// let seq = Sequence::builder()
///     .add_action(Action::code(|_| Ok(Value::from(1))))
///     .add_callback(|_seq, _args| Ok(()))
///     .auto_pause(false)
///     .option("retries", 3)
///     .build();
///
/// assert_eq!(seq.state(), SequenceState::Pending);
/// assert_eq!(seq.options().get("retries"), Some(&Value::from(3)));
/// ```
#[derive(Default)]
pub struct SequenceBuilder {
    actions: Vec<Action>,
    handlers: Vec<Arc<dyn Handler>>,
    callbacks: Callbacks,
    delays: Vec<(Option<TimerName>, Duration, TimerFn)>,
    options: SequenceOptions,
    registry: Option<Arc<HandlerRegistry>>,
}

impl SequenceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn add_actions(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.actions.extend(actions);
        self
    }

    pub fn add_handler<H: Handler + 'static>(mut self, handler: H) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn add_callback<F>(self, callback: F) -> Self
    where
        F: FnOnce(&mut Sequence, &[Value]) -> Result<(), SequenceError> + Send + 'static,
    {
        self.push_callback(CallbackKind::Normal, Box::new(callback))
    }

    pub fn add_error_callback<F>(self, callback: F) -> Self
    where
        F: FnOnce(&mut Sequence, &[Value]) -> Result<(), SequenceError> + Send + 'static,
    {
        self.push_callback(CallbackKind::Error, Box::new(callback))
    }

    pub fn add_finally_callback<F>(self, callback: F) -> Self
    where
        F: FnOnce(&mut Sequence, &[Value]) -> Result<(), SequenceError> + Send + 'static,
    {
        self.push_callback(CallbackKind::Finally, Box::new(callback))
    }

    /// Adds a timer. Its clock starts when the sequence is spawned.
    pub fn add_delay<F>(mut self, delay: Duration, action: F, name: Option<TimerName>) -> Self
    where
        F: FnMut(&mut Sequence) -> Result<TimerOutcome, SequenceError> + Send + 'static,
    {
        self.delays.push((name, delay, Box::new(action)));
        self
    }

    pub fn auto_pause(mut self, enabled: bool) -> Self {
        self.options.auto_pause = enabled;
        self
    }

    pub fn auto_resume(mut self, enabled: bool) -> Self {
        self.options.auto_resume = enabled;
        self
    }

    /// Stores a free-form option for custom handlers.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.extra.insert(key.into(), value.into());
        self
    }

    /// Replaces all options.
    pub fn options(mut self, options: SequenceOptions) -> Self {
        self.options = options;
        self
    }

    /// Opts into a shared handler registry.
    pub fn registry(mut self, registry: Arc<HandlerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> Sequence {
        let registry = self.registry.unwrap_or_else(HandlerRegistry::empty);
        let mut seq = Sequence::with_options(self.options, registry);

        for action in self.actions {
            seq.add_action(action);
        }
        for handler in self.handlers {
            seq.add_shared_handler(handler);
        }
        let mut callbacks = self.callbacks;
        for kind in [
            CallbackKind::Normal,
            CallbackKind::Error,
            CallbackKind::Finally,
        ] {
            for callback in callbacks.take(kind) {
                seq.push_callback(kind, callback);
            }
        }
        for (name, delay, action) in self.delays {
            seq.add_boxed_delay(delay, action, name);
        }
        seq
    }

    fn push_callback(mut self, kind: CallbackKind, callback: CallbackFn) -> Self {
        self.callbacks.push(kind, callback);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let options = SequenceOptions::default();
        assert!(!options.auto_pause);
        assert!(!options.auto_resume);
        assert!(options.extra.is_empty());
    }

    #[test]
    fn test_from_value_keeps_unknown_keys() {
        let options = SequenceOptions::from_value(json!({
            "auto_resume": true,
            "peer": {"host": "10.0.0.7", "port": 22},
        }))
        .expect("valid options");

        assert!(options.auto_resume);
        assert_eq!(
            options.get("peer"),
            Some(&json!({"host": "10.0.0.7", "port": 22}))
        );
        assert!(options.get("auto_resume").is_none());
    }

    #[test]
    fn test_from_value_rejects_bad_flag() {
        let result = SequenceOptions::from_value(json!({"auto_pause": "yes"}));
        assert!(matches!(result, Err(SequenceError::InvalidOptions(_))));
    }

    #[test]
    fn test_from_value_rejects_chainable_key() {
        let result = SequenceOptions::from_value(json!({"add_callback": 1}));
        assert_eq!(
            result,
            Err(SequenceError::InvalidOptions(
                "`add_callback` must be configured through SequenceBuilder".to_string()
            ))
        );
    }

    #[test]
    fn test_from_value_rejects_non_object() {
        let result = SequenceOptions::from_value(json!([1, 2]));
        assert!(matches!(result, Err(SequenceError::InvalidOptions(_))));
    }

    #[test]
    fn test_builder_forwards_everything() {
        let seq = SequenceBuilder::new()
            .add_action(Action::code(|_| Ok(Value::Null)))
            .add_actions(vec![Action::payload(json!(1)), Action::payload(json!(2))])
            .add_callback(|_, _| Ok(()))
            .add_error_callback(|_, _| Ok(()))
            .add_finally_callback(|_, _| Ok(()))
            .add_finally_callback(|_, _| Ok(()))
            .add_delay(
                Duration::from_secs(1),
                |_| Ok(TimerOutcome::Done),
                Some("watchdog".into()),
            )
            .auto_pause(true)
            .option("k", "v")
            .build();

        assert_eq!(seq.pending_actions(), 3);
        assert_eq!(seq.callback_count(CallbackKind::Normal), 1);
        assert_eq!(seq.callback_count(CallbackKind::Error), 1);
        assert_eq!(seq.callback_count(CallbackKind::Finally), 2);
        assert!(seq.has_delay("watchdog"));
        assert!(seq.options().auto_pause);
        assert_eq!(seq.options().get("k"), Some(&json!("v")));
    }
}
