//! Serialized access to a spawned sequence.
//!
//! A spawned [`Sequence`] lives in its own task and is only touched by
//! that task. Everything else talks to it through a [`SequenceHandle`],
//! which queues commands that the task applies one at a time. Timer fires
//! travel through the same queue.

use crate::action::Action;
use crate::error::SequenceError;
use crate::sequence::{Sequence, SequenceState};
use crate::timer::TimerName;
use serde_json::Value;
use std::fmt;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::sync::{oneshot, watch};
use tracing::{debug, error};

pub(crate) type Reply = oneshot::Sender<Result<(), SequenceError>>;
pub(crate) type InvokeFn = Box<dyn FnOnce(&mut Sequence) -> Result<(), SequenceError> + Send>;

pub(crate) enum Command {
    Run(Reply),
    Pause(Reply),
    Resume(Reply),
    Finish(Vec<Value>, Reply),
    Fail(Vec<Value>, Reply),
    Finally(Vec<Value>, Reply),
    AddAction(Action, Reply),
    Invoke(InvokeFn, Reply),
    Fire {
        name: TimerName,
        generation: u64,
        // holds the queue open until the fire is applied
        keepalive: UnboundedSender<Command>,
    },
}

/// The sending half kept by a spawned sequence.
///
/// Only a weak sender is kept: the queue stays open while a handle or an
/// armed timer can still reach the sequence, and no longer.
pub(crate) struct Mailbox {
    commands: WeakUnboundedSender<Command>,
    status: watch::Sender<SequenceState>,
}

impl Mailbox {
    /// Returns the mailbox together with the first handle, which takes
    /// over `commands`.
    pub(crate) fn open(
        commands: UnboundedSender<Command>,
        status: watch::Sender<SequenceState>,
    ) -> (Self, SequenceHandle) {
        let mailbox = Self {
            commands: commands.downgrade(),
            status,
        };
        let handle = SequenceHandle {
            commands,
            status: mailbox.status.subscribe(),
        };
        (mailbox, handle)
    }

    /// `None` once nothing outside the sequence can reach it.
    pub(crate) fn handle(&self) -> Option<SequenceHandle> {
        Some(SequenceHandle {
            commands: self.commands.upgrade()?,
            status: self.status.subscribe(),
        })
    }

    pub(crate) fn publish(&self, state: SequenceState) {
        self.status.send_replace(state);
    }
}

/// Cloneable reference to a spawned [`Sequence`].
///
/// Every method queues a command and waits for the sequence's task to
/// apply it. Once the sequence is terminal its task is gone: `pause`,
/// `resume` and `finally` then do nothing, `run` reports
/// [`SequenceError::AlreadyStarted`] and the rest report
/// [`SequenceError::AlreadyTerminated`].
///
/// When every handle is dropped and no timer is armed, nothing can resume
/// the sequence any more: its task stops and the sequence is dropped.
///
/// Do not await a handle from inside the sequence's own actions, handlers
/// or callbacks; they already hold `&mut Sequence`.
///
/// # Examples
///
/// ```
/// use tsunagi::prelude::*;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), SequenceError> {
/// let seq = Sequence::new(vec![Action::code(|seq| {
///     // wait for someone outside to resume us
///     seq.pause();
///     Ok(Value::Null)
/// })]);
///
/// let handle = seq.spawn();
/// handle.run().await?;
/// assert_eq!(handle.state(), SequenceState::Paused);
///
/// handle.resume().await?;
/// assert_eq!(handle.wait().await, SequenceState::Finished);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SequenceHandle {
    commands: UnboundedSender<Command>,
    status: watch::Receiver<SequenceState>,
}

impl fmt::Debug for SequenceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceHandle")
            .field("state", &self.state())
            .finish()
    }
}

impl SequenceHandle {
    /// Last published state of the sequence.
    pub fn state(&self) -> SequenceState {
        *self.status.borrow()
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// See [`Sequence::run`]. Returns once the sequence is paused or terminal.
    pub async fn run(&self) -> Result<(), SequenceError> {
        self.request(Command::Run, |state| {
            Err(SequenceError::AlreadyStarted { state })
        })
        .await
    }

    pub async fn pause(&self) -> Result<(), SequenceError> {
        self.request(Command::Pause, |_| Ok(())).await
    }

    /// See [`Sequence::resume`]. Dispatch continues before this returns.
    pub async fn resume(&self) -> Result<(), SequenceError> {
        self.request(Command::Resume, |_| Ok(())).await
    }

    pub async fn finished(&self, args: Vec<Value>) -> Result<(), SequenceError> {
        self.request(|reply| Command::Finish(args, reply), terminated)
            .await
    }

    pub async fn finish(&self, args: Vec<Value>) -> Result<(), SequenceError> {
        self.finished(args).await
    }

    pub async fn failed(&self, args: Vec<Value>) -> Result<(), SequenceError> {
        self.request(|reply| Command::Fail(args, reply), terminated)
            .await
    }

    pub async fn fail(&self, args: Vec<Value>) -> Result<(), SequenceError> {
        self.failed(args).await
    }

    pub async fn finally(&self, args: Vec<Value>) -> Result<(), SequenceError> {
        self.request(|reply| Command::Finally(args, reply), |_| Ok(()))
            .await
    }

    pub async fn add_action(&self, action: Action) -> Result<(), SequenceError> {
        self.request(|reply| Command::AddAction(action, reply), terminated)
            .await
    }

    /// Runs `f` inside the sequence's task, then lets it continue
    /// dispatching. Errors from `f` are returned here, not routed to
    /// `failed()`.
    pub async fn invoke<F>(&self, f: F) -> Result<(), SequenceError>
    where
        F: FnOnce(&mut Sequence) -> Result<(), SequenceError> + Send + 'static,
    {
        self.request(|reply| Command::Invoke(Box::new(f), reply), terminated)
            .await
    }

    /// Waits until the sequence is terminal and returns that state.
    ///
    /// Never resolves for a sequence that stays paused.
    pub async fn wait(&self) -> SequenceState {
        let mut status = self.status.clone();
        loop {
            let state = *status.borrow_and_update();
            if state.is_terminal() {
                return state;
            }
            if status.changed().await.is_err() {
                return *status.borrow();
            }
        }
    }

    async fn request(
        &self,
        command: impl FnOnce(Reply) -> Command,
        on_closed: impl FnOnce(SequenceState) -> Result<(), SequenceError>,
    ) -> Result<(), SequenceError> {
        let (reply, response) = oneshot::channel();
        if self.commands.send(command(reply)).is_err() {
            return on_closed(self.state());
        }
        match response.await {
            Ok(result) => result,
            Err(_) => on_closed(self.state()),
        }
    }
}

fn terminated(state: SequenceState) -> Result<(), SequenceError> {
    Err(SequenceError::AlreadyTerminated { state })
}

/// Body of a spawned sequence's task.
pub(crate) async fn serve(mut seq: Sequence, mut inbox: UnboundedReceiver<Command>) {
    debug!("sequence task started");
    while let Some(command) = inbox.recv().await {
        apply(&mut seq, command).await;
        if seq.is_terminal() {
            break;
        }
    }
    debug!(state = %seq.state(), "sequence task stopped");
}

async fn apply(seq: &mut Sequence, command: Command) {
    match command {
        Command::Run(reply) => {
            let result = seq.run().await;
            respond(reply, result);
        }
        Command::Pause(reply) => {
            seq.pause();
            respond(reply, Ok(()));
        }
        Command::Resume(reply) => {
            let result = match seq.resume() {
                Ok(()) => seq.next().await,
                Err(e) => Err(e),
            };
            respond(reply, result);
        }
        Command::Finish(args, reply) => respond(reply, seq.finished(args)),
        Command::Fail(args, reply) => respond(reply, seq.failed(args)),
        Command::Finally(args, reply) => respond(reply, seq.finally(args)),
        Command::AddAction(action, reply) => {
            seq.add_action(action);
            respond(reply, Ok(()));
        }
        Command::Invoke(f, reply) => {
            let result = f(seq);
            let driven = seq.next().await;
            respond(reply, result.and(driven));
        }
        Command::Fire {
            name,
            generation,
            keepalive,
        } => {
            if let Err(e) = seq.fire_timer(name, generation).await {
                error!(error = %e, "timer fire raised with no caller to report to");
            }
            drop(keepalive);
        }
    }
}

fn respond(reply: Reply, result: Result<(), SequenceError>) {
    if reply.send(result).is_err() {
        debug!("caller went away before the reply");
    }
}
