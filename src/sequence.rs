use crate::action::{Action, Request};
use crate::callback::{CallbackFn, CallbackKind, Callbacks};
use crate::config::{SequenceBuilder, SequenceOptions};
use crate::error::SequenceError;
use crate::handle::{self, Mailbox, SequenceHandle};
use crate::handler::{self, CodeHandler, Handler, HandlerRegistry};
use crate::heap::Heap;
use crate::timer::{TimerFn, TimerName, TimerOutcome, Timers};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Lifecycle state of a [`Sequence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceState {
    /// Built but not yet run.
    Pending,
    /// Dispatching actions.
    Running,
    /// Running, but held by at least one outstanding `pause`.
    Paused,
    /// Terminal: `finished` was called or the queue drained.
    Finished,
    /// Terminal: `failed` was called or something raised.
    Failed,
}

impl SequenceState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Finished => "finished",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SequenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered list of actions run one at a time.
///
/// Actions, handlers and callbacks all receive `&mut Sequence`: they can
/// pause it, queue more actions, read and write the [`Heap`], arm timers
/// or end the sequence with [`finished`](Sequence::finished) /
/// [`failed`](Sequence::failed).
///
/// A sequence that only runs code actions can be driven directly with
/// [`run`](Sequence::run). Anything that needs timers or must be resumed
/// from outside should be [`spawn`](Sequence::spawn)ed, which moves it into
/// its own task and returns a [`SequenceHandle`].
///
/// # Examples
///
/// ```
/// use tsunagi::prelude::*;
/// use std::sync::{Arc, Mutex};
///
/// # #[tokio::main]
/// # async fn main() {
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = seen.clone();
///
/// let mut seq = Sequence::builder()
///     .add_action(Action::code(|seq| {
///         seq.heap_mut().insert("a", 5i64);
///         Ok(Value::Null)
///     }))
///     .add_action(Action::code(|seq| {
///         let a = seq.heap().get::<i64>("a").copied().unwrap_or_default();
///         seq.finished(vec![Value::from(a * 2)])?;
///         Ok(Value::Null)
///     }))
///     .add_callback(move |_seq, args| {
///         sink.lock().map_err(|e| SequenceError::msg(e.to_string()))?.extend_from_slice(args);
///         Ok(())
///     })
///     .build();
///
/// seq.run().await.expect("sequence failed");
///
/// assert_eq!(seq.state(), SequenceState::Finished);
/// assert_eq!(*seen.lock().unwrap(), vec![Value::from(10)]);
/// # }
/// ```
pub struct Sequence {
    // Never `Paused`; see `state()`.
    state: SequenceState,
    actions: VecDeque<Action>,
    handlers: Vec<Arc<dyn Handler>>,
    registry: Arc<HandlerRegistry>,
    callbacks: Callbacks,
    heap: Heap,
    pause_count: usize,
    options: Arc<SequenceOptions>,
    result: Option<Value>,
    timers: Timers,
    mailbox: Option<Mailbox>,
    in_normal_callbacks: bool,
    started_at: Instant,
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequence")
            .field("state", &self.state())
            .field("actions", &self.actions)
            .field(
                "handlers",
                &self.handlers.iter().map(|h| h.name()).collect::<Vec<_>>(),
            )
            .field("callbacks", &self.callbacks)
            .field("heap", &self.heap)
            .field("pause_count", &self.pause_count)
            .field("result", &self.result)
            .field("timers", &self.timers)
            .finish()
    }
}

impl Sequence {
    /// Creates a sequence with default options and no shared registry.
    pub fn new(actions: impl IntoIterator<Item = Action>) -> Self {
        let mut seq = Self::with_options(SequenceOptions::default(), HandlerRegistry::empty());
        seq.actions.extend(actions);
        seq
    }

    pub fn builder() -> SequenceBuilder {
        SequenceBuilder::new()
    }

    pub(crate) fn with_options(options: SequenceOptions, registry: Arc<HandlerRegistry>) -> Self {
        Self {
            state: SequenceState::Pending,
            actions: VecDeque::new(),
            handlers: vec![Arc::new(CodeHandler)],
            registry,
            callbacks: Callbacks::default(),
            heap: Heap::new(),
            pause_count: 0,
            options: Arc::new(options),
            result: None,
            timers: Timers::default(),
            mailbox: None,
            in_normal_callbacks: false,
            started_at: Instant::now(),
        }
    }

    pub fn state(&self) -> SequenceState {
        if self.state == SequenceState::Running && self.pause_count > 0 {
            SequenceState::Paused
        } else {
            self.state
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn pause_count(&self) -> usize {
        self.pause_count
    }

    /// Value of the most recently resolved action.
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn options(&self) -> &SequenceOptions {
        &self.options
    }

    /// Number of actions still queued.
    pub fn pending_actions(&self) -> usize {
        self.actions.len()
    }

    pub fn callback_count(&self, kind: CallbackKind) -> usize {
        self.callbacks.len(kind)
    }

    /// Time since the sequence was built.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Appends an action. Ignored once the sequence is terminal.
    pub fn add_action(&mut self, action: Action) -> &mut Self {
        if self.is_terminal() {
            warn!(action = %action.describe(), state = %self.state, "action added to a terminal sequence; ignored");
            return self;
        }
        self.actions.push_back(action);
        self
    }

    /// Registers a handler. Later handlers are tried first.
    pub fn add_handler<H: Handler + 'static>(&mut self, handler: H) -> &mut Self {
        self.add_shared_handler(Arc::new(handler))
    }

    pub fn add_shared_handler(&mut self, handler: Arc<dyn Handler>) -> &mut Self {
        debug!(handler = %handler.name(), "handler added");
        self.handlers.push(handler);
        self
    }

    pub fn add_callback<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnOnce(&mut Sequence, &[Value]) -> Result<(), SequenceError> + Send + 'static,
    {
        self.push_callback(CallbackKind::Normal, Box::new(callback))
    }

    pub fn add_error_callback<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnOnce(&mut Sequence, &[Value]) -> Result<(), SequenceError> + Send + 'static,
    {
        self.push_callback(CallbackKind::Error, Box::new(callback))
    }

    pub fn add_finally_callback<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnOnce(&mut Sequence, &[Value]) -> Result<(), SequenceError> + Send + 'static,
    {
        self.push_callback(CallbackKind::Finally, Box::new(callback))
    }

    pub(crate) fn push_callback(&mut self, kind: CallbackKind, callback: CallbackFn) -> &mut Self {
        self.callbacks.push(kind, callback);
        self
    }

    /// Arms a timer that runs `action` after `delay`.
    ///
    /// An existing timer with the same name is cancelled and replaced.
    /// Without a name an internal unique one is generated. Returns the
    /// name the timer was registered under. Timers added before
    /// [`spawn`](Sequence::spawn) start counting at spawn time.
    pub fn add_delay<F>(&mut self, delay: Duration, action: F, name: Option<TimerName>) -> TimerName
    where
        F: FnMut(&mut Sequence) -> Result<TimerOutcome, SequenceError> + Send + 'static,
    {
        self.add_boxed_delay(delay, Box::new(action), name)
    }

    pub(crate) fn add_boxed_delay(
        &mut self,
        delay: Duration,
        action: TimerFn,
        name: Option<TimerName>,
    ) -> TimerName {
        if self.is_terminal() {
            warn!(state = %self.state, "timer added to a terminal sequence; ignored");
            return name.unwrap_or_else(|| TimerName::new("__discarded"));
        }
        self.timers.add(name, delay, action)
    }

    /// Reschedules `name` to fire `delay` from now.
    ///
    /// # Errors
    ///
    /// [`SequenceError::UnknownTimer`] if no such timer is armed.
    pub fn adjust_delay(&mut self, name: &str, delay: Duration) -> Result<(), SequenceError> {
        self.timers.adjust(name, delay)
    }

    /// Cancels `name`. Unknown names are ignored; returns whether a timer
    /// was removed.
    pub fn remove_delay(&mut self, name: &str) -> bool {
        self.timers.remove(name)
    }

    pub fn has_delay(&self, name: &str) -> bool {
        self.timers.contains(name)
    }

    pub fn delay_names(&self) -> impl Iterator<Item = &TimerName> {
        self.timers.names()
    }

    /// Starts dispatching. Only valid from `Pending`.
    ///
    /// Returns once the sequence is paused or terminal. An `Err` carries a
    /// failure that could not be routed to `failed()`, such as an error
    /// callback that raised.
    ///
    /// # Errors
    ///
    /// [`SequenceError::AlreadyStarted`] on a second call.
    pub async fn run(&mut self) -> Result<(), SequenceError> {
        if self.state != SequenceState::Pending {
            return Err(SequenceError::AlreadyStarted {
                state: self.state(),
            });
        }
        self.state = SequenceState::Running;
        info!(actions = self.actions.len(), "sequence started");
        self.publish();
        self.next().await
    }

    /// Holds dispatch until a matching [`resume`](Sequence::resume).
    /// Pauses nest. No effect on a terminal sequence.
    pub fn pause(&mut self) {
        if self.is_terminal() {
            return;
        }
        self.pause_count += 1;
        debug!(pause_count = self.pause_count, "paused");
        self.publish();
    }

    /// Releases one [`pause`](Sequence::pause). No effect on a terminal
    /// sequence.
    ///
    /// Inside an action the loop picks up again once the action returns.
    /// A spawned sequence resumed through its handle is re-driven by its
    /// task; a sequence driven by hand needs another [`next`](Sequence::next).
    ///
    /// # Errors
    ///
    /// [`SequenceError::ImbalancedResume`] if nothing is paused.
    pub fn resume(&mut self) -> Result<(), SequenceError> {
        if self.is_terminal() {
            return Ok(());
        }
        self.pause_count = self
            .pause_count
            .checked_sub(1)
            .ok_or(SequenceError::ImbalancedResume)?;
        debug!(pause_count = self.pause_count, "resumed");
        self.publish();
        Ok(())
    }

    /// Dispatches queued actions while running and not paused.
    ///
    /// A raised action or handler error fails the sequence; an empty
    /// queue finishes it.
    pub async fn next(&mut self) -> Result<(), SequenceError> {
        while self.state == SequenceState::Running && self.pause_count == 0 {
            let Some(action) = self.actions.pop_front() else {
                debug!("action queue drained");
                return self.finished(Vec::new());
            };

            let label = action.describe();
            debug!(action = %label, "dispatching action");
            if let Err(error) = self.dispatch(action).await {
                if self.is_terminal() {
                    return Err(error);
                }
                warn!(action = %label, %error, "action failed");
                return self.failed(error.into_args());
            }
        }
        Ok(())
    }

    async fn dispatch(&mut self, action: Action) -> Result<(), SequenceError> {
        if self.options.auto_pause {
            self.pause();
        }

        let mut request = Request::new(action, Arc::clone(&self.options));
        if let Some(value) = handler::dispatch(self, &mut request).await? {
            self.result = Some(value);
        }

        // only releases a pause that is still outstanding
        if self.options.auto_resume && self.pause_count > 0 && !self.is_terminal() {
            self.resume()?;
        }
        Ok(())
    }

    /// Per-sequence handlers newest first, then the shared registry.
    pub(crate) fn handler_chain(&self) -> Vec<Arc<dyn Handler>> {
        self.handlers
            .iter()
            .rev()
            .chain(self.registry.lifo())
            .cloned()
            .collect()
    }

    /// Ends the sequence successfully.
    ///
    /// Runs the normal callbacks in registration order with `args`. If one
    /// raises, the remaining normal callbacks are skipped and the sequence
    /// fails with that error instead. Finally callbacks run afterwards.
    ///
    /// # Errors
    ///
    /// [`SequenceError::AlreadyTerminated`] on a terminal sequence, or
    /// whatever an error/finally callback raised.
    pub fn finished(&mut self, args: Vec<Value>) -> Result<(), SequenceError> {
        if self.is_terminal() {
            return Err(SequenceError::AlreadyTerminated { state: self.state });
        }
        self.terminate(SequenceState::Finished);
        info!(elapsed_ms = self.elapsed().as_millis() as u64, "sequence finished");

        let result = self.run_normal_callbacks(args);
        self.publish();
        result
    }

    /// Alias of [`finished`](Sequence::finished).
    pub fn finish(&mut self, args: Vec<Value>) -> Result<(), SequenceError> {
        self.finished(args)
    }

    fn run_normal_callbacks(&mut self, args: Vec<Value>) -> Result<(), SequenceError> {
        self.in_normal_callbacks = true;
        for callback in self.callbacks.take(CallbackKind::Normal) {
            let result = callback(self, &args);
            if self.state != SequenceState::Finished {
                // the callback failed the sequence itself
                return result;
            }
            if let Err(error) = result {
                warn!(%error, "callback raised; failing sequence");
                return self.failed(error.into_args());
            }
        }
        self.in_normal_callbacks = false;
        self.finally(args)
    }

    /// Ends the sequence with an error.
    ///
    /// Valid from any non-terminal state, and from inside a normal
    /// callback. Runs the error callbacks in registration order with
    /// `args`, then the finally callbacks. A raising error callback aborts
    /// the rest of both chains and its error is returned.
    ///
    /// # Errors
    ///
    /// [`SequenceError::AlreadyTerminated`] on a terminal sequence, or
    /// whatever an error/finally callback raised.
    pub fn failed(&mut self, args: Vec<Value>) -> Result<(), SequenceError> {
        let from_callback = self.in_normal_callbacks && self.state == SequenceState::Finished;
        if self.is_terminal() && !from_callback {
            return Err(SequenceError::AlreadyTerminated { state: self.state });
        }
        self.in_normal_callbacks = false;
        self.terminate(SequenceState::Failed);
        warn!(
            elapsed_ms = self.elapsed().as_millis() as u64,
            args = ?args,
            "sequence failed"
        );

        let result = self.run_error_callbacks(args);
        self.publish();
        result
    }

    /// Alias of [`failed`](Sequence::failed).
    pub fn fail(&mut self, args: Vec<Value>) -> Result<(), SequenceError> {
        self.failed(args)
    }

    fn run_error_callbacks(&mut self, args: Vec<Value>) -> Result<(), SequenceError> {
        for callback in self.callbacks.take(CallbackKind::Error) {
            callback(self, &args)?;
        }
        self.finally(args)
    }

    /// Runs the finally callbacks in registration order.
    ///
    /// The registry is drained, so each finally callback runs at most once
    /// even if this is called explicitly before the sequence ends.
    ///
    /// # Errors
    ///
    /// Whatever a finally callback raised; the rest are skipped.
    pub fn finally(&mut self, args: Vec<Value>) -> Result<(), SequenceError> {
        for callback in self.callbacks.take(CallbackKind::Finally) {
            callback(self, &args)?;
        }
        Ok(())
    }

    fn terminate(&mut self, state: SequenceState) {
        self.state = state;
        let dropped = self.actions.len();
        self.actions.clear();
        let cancelled = self.timers.cancel_all();
        if dropped > 0 || cancelled > 0 {
            debug!(
                dropped_actions = dropped,
                cancelled_timers = cancelled,
                "cleared outstanding work"
            );
        }
    }

    pub(crate) async fn fire_timer(
        &mut self,
        name: TimerName,
        generation: u64,
    ) -> Result<(), SequenceError> {
        let Some(mut action) = self.timers.begin_fire(name.as_str(), generation) else {
            debug!(timer = %name, "stale timer fire ignored");
            return Ok(());
        };

        debug!(timer = %name, "timer fired");
        match action(self) {
            Ok(outcome) => self.timers.settle(&name, generation, action, outcome),
            Err(error) => {
                self.timers
                    .settle(&name, generation, action, TimerOutcome::Done);
                if self.is_terminal() {
                    return Err(error);
                }
                warn!(timer = %name, %error, "timer action failed");
                return self.failed(error.into_args());
            }
        }
        self.next().await
    }

    /// A handle for code outside the sequence's own task.
    ///
    /// # Errors
    ///
    /// [`SequenceError::Detached`] if the sequence was not spawned, or if
    /// its queue already closed because nothing could reach it.
    pub fn handle(&self) -> Result<SequenceHandle, SequenceError> {
        self.mailbox
            .as_ref()
            .and_then(Mailbox::handle)
            .ok_or(SequenceError::Detached)
    }

    /// Moves the sequence into its own task and arms its timers.
    ///
    /// The task applies commands from every [`SequenceHandle`] one at a
    /// time. It stops after the sequence reaches a terminal state, or once
    /// every handle is dropped and no timer is armed. The sequence stays
    /// `Pending` until [`SequenceHandle::run`].
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(mut self) -> SequenceHandle {
        let (commands, inbox) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(self.state());

        self.timers.attach(commands.downgrade());
        let (mailbox, handle) = Mailbox::open(commands, status);
        self.mailbox = Some(mailbox);

        tokio::spawn(handle::serve(self, inbox));
        handle
    }

    fn publish(&self) {
        if let Some(mailbox) = &self.mailbox {
            mailbox.publish(self.state());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn record(log: &Log, entry: impl Into<String>) {
        if let Ok(mut log) = log.lock() {
            log.push(entry.into());
        }
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SequenceState::Pending.to_string(), "pending");
        assert_eq!(SequenceState::Failed.to_string(), "failed");
        assert!(SequenceState::Finished.is_terminal());
        assert!(!SequenceState::Paused.is_terminal());
    }

    #[tokio::test]
    async fn test_empty_sequence_finishes() {
        let log = Log::default();
        let sink = log.clone();
        let mut seq = Sequence::new(Vec::new());
        seq.add_callback(move |_, args| {
            record(&sink, format!("done {}", args.len()));
            Ok(())
        });

        seq.run().await.expect("run");
        assert_eq!(seq.state(), SequenceState::Finished);
        assert_eq!(entries(&log), vec!["done 0"]);
    }

    #[tokio::test]
    async fn test_result_tracks_last_value() {
        let mut seq = Sequence::new(vec![
            Action::code(|_| Ok(json!(1))),
            Action::code(|_| Ok(json!(2))),
        ]);

        seq.run().await.expect("run");
        assert_eq!(seq.result(), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_run_twice_is_an_error() {
        let mut seq = Sequence::new(Vec::new());
        seq.run().await.expect("first run");

        let second = seq.run().await;
        assert_eq!(
            second,
            Err(SequenceError::AlreadyStarted {
                state: SequenceState::Finished
            })
        );
    }

    #[test]
    fn test_pause_resume_balance() {
        let mut seq = Sequence::new(Vec::new());
        seq.pause();
        seq.pause();
        seq.pause();
        assert_eq!(seq.pause_count(), 3);

        for _ in 0..3 {
            assert!(seq.resume().is_ok());
        }
        assert_eq!(seq.pause_count(), 0);
        assert_eq!(seq.resume(), Err(SequenceError::ImbalancedResume));
    }

    #[tokio::test]
    async fn test_paused_sequence_does_not_dispatch() {
        let log = Log::default();
        let (first, second) = (log.clone(), log.clone());
        let mut seq = Sequence::new(vec![
            Action::code(move |seq| {
                record(&first, "first");
                seq.pause();
                Ok(Value::Null)
            }),
            Action::code(move |_| {
                record(&second, "second");
                Ok(Value::Null)
            }),
        ]);

        seq.run().await.expect("run");
        assert_eq!(seq.state(), SequenceState::Paused);
        assert_eq!(entries(&log), vec!["first"]);

        seq.next().await.expect("next while paused");
        assert_eq!(entries(&log), vec!["first"]);

        seq.resume().expect("resume");
        seq.next().await.expect("next");
        assert_eq!(entries(&log), vec!["first", "second"]);
        assert_eq!(seq.state(), SequenceState::Finished);
    }

    #[tokio::test]
    async fn test_action_error_routes_to_failed() {
        let log = Log::default();
        let (normal, error, finally) = (log.clone(), log.clone(), log.clone());
        let mut seq = Sequence::new(vec![Action::code(|_| Err(SequenceError::msg("boom")))]);
        seq.add_callback(move |_, _| {
            record(&normal, "normal");
            Ok(())
        })
        .add_error_callback(move |_, args| {
            record(&error, format!("error {}", args[0]));
            Ok(())
        })
        .add_finally_callback(move |_, _| {
            record(&finally, "finally");
            Ok(())
        });

        seq.run().await.expect("errors are routed, not returned");
        assert_eq!(seq.state(), SequenceState::Failed);
        assert_eq!(entries(&log), vec!["error \"boom\"", "finally"]);
    }

    #[tokio::test]
    async fn test_finished_drops_remaining_actions() {
        let log = Log::default();
        let sink = log.clone();
        let mut seq = Sequence::new(vec![
            Action::code(|seq| {
                seq.finished(vec![json!("early")])?;
                Ok(Value::Null)
            }),
            Action::code(move |_| {
                record(&sink, "unreachable");
                Ok(Value::Null)
            }),
        ]);

        seq.run().await.expect("run");
        assert_eq!(seq.state(), SequenceState::Finished);
        assert_eq!(seq.pending_actions(), 0);
        assert!(entries(&log).is_empty());
    }

    #[tokio::test]
    async fn test_terminal_calls_are_rejected() {
        let mut seq = Sequence::new(Vec::new());
        seq.failed(vec![json!("stop")]).expect("fail");

        assert_eq!(
            seq.finished(Vec::new()),
            Err(SequenceError::AlreadyTerminated {
                state: SequenceState::Failed
            })
        );
        assert_eq!(
            seq.failed(Vec::new()),
            Err(SequenceError::AlreadyTerminated {
                state: SequenceState::Failed
            })
        );

        seq.pause();
        assert_eq!(seq.pause_count(), 0);
        assert!(seq.resume().is_ok());
    }

    #[tokio::test]
    async fn test_skip_leaves_result_untouched() {
        #[derive(Debug)]
        struct SkipAll;

        #[async_trait::async_trait]
        impl Handler for SkipAll {
            async fn handle(
                &self,
                _seq: &mut Sequence,
                request: &mut Request,
            ) -> Result<crate::Outcome, SequenceError> {
                if request.payload().is_some() {
                    Ok(crate::Outcome::Skip)
                } else {
                    Ok(crate::Outcome::Deferred)
                }
            }
        }

        let mut seq = Sequence::new(vec![
            Action::code(|_| Ok(json!("kept"))),
            Action::payload(json!("ignored")),
        ]);
        seq.add_handler(SkipAll);

        seq.run().await.expect("run");
        assert_eq!(seq.result(), Some(&json!("kept")));
    }

    #[test]
    fn test_handle_requires_spawn() {
        let seq = Sequence::new(Vec::new());
        assert!(matches!(seq.handle(), Err(SequenceError::Detached)));
    }

    #[test]
    fn test_handler_chain_order() {
        #[derive(Debug)]
        struct First;
        #[derive(Debug)]
        struct Second;
        #[derive(Debug)]
        struct Shared;

        macro_rules! defer_handler {
            ($name:ident) => {
                #[async_trait::async_trait]
                impl Handler for $name {
                    async fn handle(
                        &self,
                        _seq: &mut Sequence,
                        _request: &mut Request,
                    ) -> Result<crate::Outcome, SequenceError> {
                        Ok(crate::Outcome::Deferred)
                    }
                }
            };
        }
        defer_handler!(First);
        defer_handler!(Second);
        defer_handler!(Shared);

        let registry = HandlerRegistry::builder().register(Shared).build();
        let mut seq = Sequence::builder().registry(registry).build();
        seq.add_handler(First).add_handler(Second);

        let names: Vec<_> = seq.handler_chain().iter().map(|h| h.name()).collect();
        assert_eq!(names, vec!["Second", "First", "CodeHandler", "Shared"]);
    }
}
