//! Pluggable dispatchers that resolve actions.

use crate::action::{Action, Outcome, Request};
use crate::error::SequenceError;
use crate::sequence::Sequence;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt::{self, Debug};
use std::sync::Arc;
use tracing::debug;

/// Resolves, skips or defers an action.
///
/// Handlers are tried most-recently-registered first. Returning
/// [`Outcome::Deferred`] passes the request to the next handler; an `Err`
/// fails the sequence.
///
/// A handler that waits on something external should pause the sequence,
/// give a [`SequenceHandle`](crate::SequenceHandle) to the external task
/// and return. The sequence is not advanced while `handle` is running, so
/// awaiting the sequence's own handle from inside `handle` never completes.
///
/// # Examples
///
/// ```
/// use tsunagi::prelude::*;
/// use async_trait::async_trait;
///
/// #[derive(Debug)]
/// struct Echo;
///
/// #[async_trait]
/// impl Handler for Echo {
///     async fn handle(
///         &self,
///         _seq: &mut Sequence,
///         request: &mut Request,
///     ) -> Result<Outcome, SequenceError> {
///         match request.payload() {
///             Some(value) => Ok(Outcome::Value(value.clone())),
///             None => Ok(Outcome::Deferred),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Handler: Send + Sync + Debug {
    /// Services `request` or defers it.
    async fn handle(
        &self,
        seq: &mut Sequence,
        request: &mut Request,
    ) -> Result<Outcome, SequenceError>;

    /// Handler name used in logs. Defaults to the type name.
    fn name(&self) -> String {
        let full_name = std::any::type_name::<Self>();
        full_name
            .split("::")
            .last()
            .unwrap_or("Handler")
            .to_string()
    }
}

/// Built-in handler for [`Action::Code`]: calls the code with the sequence
/// and uses its return value as the result.
#[derive(Debug, Default, Clone, Copy)]
pub struct CodeHandler;

#[async_trait]
impl Handler for CodeHandler {
    async fn handle(
        &self,
        seq: &mut Sequence,
        request: &mut Request,
    ) -> Result<Outcome, SequenceError> {
        match request.action_mut() {
            Action::Code(code) => code(seq).map(Outcome::Value),
            _ => Ok(Outcome::Deferred),
        }
    }
}

/// Handlers shared by every sequence that opts in.
///
/// Populate it once at start-up through [`HandlerRegistry::builder`] and
/// share the resulting `Arc`. It cannot be modified after `build`.
///
/// # Examples
///
/// ```
/// use tsunagi::{CodeHandler, HandlerRegistry, Sequence};
///
/// let registry = HandlerRegistry::builder().register(CodeHandler).build();
///
/// let seq = Sequence::builder().registry(registry.clone()).build();
/// assert_eq!(registry.len(), 1);
/// # drop(seq);
/// ```
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn Handler>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field(
                "handlers",
                &self.handlers.iter().map(|h| h.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    /// A registry with no handlers.
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Handlers in the order they are tried (newest first).
    pub(crate) fn lifo(&self) -> impl Iterator<Item = &Arc<dyn Handler>> {
        self.handlers.iter().rev()
    }
}

/// Builder for [`HandlerRegistry`].
#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: Vec<Arc<dyn Handler>>,
}

impl HandlerRegistryBuilder {
    pub fn register<H: Handler + 'static>(mut self, handler: H) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn register_shared(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn build(self) -> Arc<HandlerRegistry> {
        Arc::new(HandlerRegistry {
            handlers: self.handlers,
        })
    }
}

/// Runs `request` through the sequence's handler chain.
///
/// Returns `Some(value)` when resolved and `None` when skipped.
pub(crate) async fn dispatch(
    seq: &mut Sequence,
    request: &mut Request,
) -> Result<Option<Value>, SequenceError> {
    for handler in seq.handler_chain() {
        match handler.handle(seq, request).await? {
            Outcome::Deferred => {
                debug!(handler = %handler.name(), "handler deferred");
            }
            Outcome::Skip => {
                debug!(handler = %handler.name(), "action skipped");
                return Ok(None);
            }
            Outcome::Value(value) => {
                debug!(handler = %handler.name(), "action resolved");
                return Ok(Some(value));
            }
        }
    }

    Err(SequenceError::UnhandledAction {
        action: request.action().describe(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SequenceOptions;
    use serde_json::json;

    #[derive(Debug)]
    struct Named;

    #[async_trait]
    impl Handler for Named {
        async fn handle(
            &self,
            _seq: &mut Sequence,
            _request: &mut Request,
        ) -> Result<Outcome, SequenceError> {
            Ok(Outcome::Deferred)
        }
    }

    #[test]
    fn test_default_name() {
        assert_eq!(Named.name(), "Named");
        assert_eq!(CodeHandler.name(), "CodeHandler");
    }

    #[tokio::test]
    async fn test_code_handler_resolves_code_only() {
        let mut seq = Sequence::new(Vec::new());
        let options = Arc::new(SequenceOptions::default());

        let mut request = Request::new(Action::code(|_| Ok(json!(3))), options.clone());
        let outcome = CodeHandler.handle(&mut seq, &mut request).await;
        assert_eq!(outcome, Ok(Outcome::Value(json!(3))));

        let mut request = Request::new(Action::payload(json!("x")), options);
        let outcome = CodeHandler.handle(&mut seq, &mut request).await;
        assert_eq!(outcome, Ok(Outcome::Deferred));
    }

    #[tokio::test]
    async fn test_dispatch_unhandled() {
        let mut seq = Sequence::new(Vec::new());
        let mut request = Request::new(
            Action::payload(json!("x")),
            Arc::new(SequenceOptions::default()),
        );

        let result = dispatch(&mut seq, &mut request).await;
        assert_eq!(
            result,
            Err(SequenceError::UnhandledAction {
                action: "payload \"x\"".to_string()
            })
        );
    }

    #[test]
    fn test_registry_lifo() {
        let registry = HandlerRegistry::builder()
            .register(Named)
            .register(CodeHandler)
            .build();

        let names: Vec<_> = registry.lifo().map(|h| h.name()).collect();
        assert_eq!(names, vec!["CodeHandler", "Named"]);
    }
}
