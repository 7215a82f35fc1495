//! Named delayed actions owned by a sequence.
//!
//! Each armed timer is a spawned `tokio::time::sleep` that posts a fire
//! command into the owning sequence's queue, so the timer action always
//! runs inside the sequence's own context. Every (re)scheduling bumps a
//! generation number; a fire whose generation no longer matches the entry
//! was replaced, adjusted or removed in the meantime and is dropped.

use crate::error::SequenceError;
use crate::handle::Command;
use crate::key::string_key;
use crate::sequence::Sequence;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc::WeakUnboundedSender;
use tokio::task::JoinHandle;
use tracing::debug;

string_key!(
    /// Timer identifier.
    TimerName
);

/// What a timer action asks for after it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOutcome {
    /// Discard the timer.
    Done,
    /// Fire again under the same name after the given delay.
    Rearm(Duration),
}

/// Timer action body.
pub type TimerFn = Box<dyn FnMut(&mut Sequence) -> Result<TimerOutcome, SequenceError> + Send>;

struct TimerEntry {
    delay: Duration,
    generation: u64,
    // `None` while the action is being fired.
    action: Option<TimerFn>,
    task: Option<JoinHandle<()>>,
}

impl TimerEntry {
    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[derive(Default)]
pub(crate) struct Timers {
    entries: HashMap<TimerName, TimerEntry>,
    anonymous: u64,
    generation: u64,
    sender: Option<WeakUnboundedSender<Command>>,
}

impl fmt::Debug for Timers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timers")
            .field("names", &self.entries.keys().collect::<Vec<_>>())
            .field("armed", &self.sender.is_some())
            .finish()
    }
}

impl Timers {
    /// Registers a timer, replacing any timer of the same name.
    pub(crate) fn add(
        &mut self,
        name: Option<TimerName>,
        delay: Duration,
        action: TimerFn,
    ) -> TimerName {
        let name = name.unwrap_or_else(|| {
            self.anonymous += 1;
            TimerName::new(format!("__timer_{}", self.anonymous))
        });

        if let Some(mut previous) = self.entries.remove(&name) {
            previous.cancel();
            debug!(timer = %name, "replacing timer");
        }

        let generation = self.next_generation();
        let task = self.schedule(&name, generation, delay);
        self.entries.insert(
            name.clone(),
            TimerEntry {
                delay,
                generation,
                action: Some(action),
                task,
            },
        );
        debug!(timer = %name, delay_ms = delay.as_millis() as u64, "timer added");
        name
    }

    /// Reschedules `name` to fire `delay` from now.
    pub(crate) fn adjust(&mut self, name: &str, delay: Duration) -> Result<(), SequenceError> {
        if !self.entries.contains_key(name) {
            return Err(SequenceError::UnknownTimer(TimerName::new(name)));
        }

        let generation = self.next_generation();
        let task = self.schedule(&TimerName::new(name), generation, delay);
        if let Some(entry) = self.entries.get_mut(name) {
            entry.cancel();
            entry.delay = delay;
            entry.generation = generation;
            entry.task = task;
        }
        debug!(timer = %name, delay_ms = delay.as_millis() as u64, "timer adjusted");
        Ok(())
    }

    /// Cancels and discards `name`. Returns whether it existed.
    pub(crate) fn remove(&mut self, name: &str) -> bool {
        match self.entries.remove(name) {
            Some(mut entry) => {
                entry.cancel();
                debug!(timer = %name, "timer removed");
                true
            }
            None => false,
        }
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = &TimerName> {
        self.entries.keys()
    }

    /// Starts delivering fires to `sender`; timers added earlier start
    /// their clock now.
    ///
    /// Only armed timer tasks hold a strong sender, so an idle registry
    /// never keeps its sequence's queue open.
    pub(crate) fn attach(&mut self, sender: WeakUnboundedSender<Command>) {
        self.sender = Some(sender);

        let pending: Vec<(TimerName, u64, Duration)> = self
            .entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.generation, entry.delay))
            .collect();
        for (name, generation, delay) in pending {
            let task = self.schedule(&name, generation, delay);
            if let Some(entry) = self.entries.get_mut(&name) {
                entry.task = task;
            }
        }
    }

    /// Cancels every outstanding timer. Returns how many were dropped.
    pub(crate) fn cancel_all(&mut self) -> usize {
        let count = self.entries.len();
        for (_, mut entry) in self.entries.drain() {
            entry.cancel();
        }
        count
    }

    /// Hands out the action for a fire, or `None` if the fire is stale.
    pub(crate) fn begin_fire(&mut self, name: &str, generation: u64) -> Option<TimerFn> {
        let entry = self.entries.get_mut(name)?;
        if entry.generation != generation {
            return None;
        }
        entry.task = None;
        entry.action.take()
    }

    /// Puts a fired action back according to its outcome and to whatever
    /// the action itself did to the timer while it ran.
    pub(crate) fn settle(
        &mut self,
        name: &TimerName,
        generation: u64,
        action: TimerFn,
        outcome: TimerOutcome,
    ) {
        let Some(entry) = self.entries.get_mut(name.as_str()) else {
            // removed during the fire
            return;
        };
        if entry.action.is_some() {
            // replaced by a new timer of the same name during the fire
            return;
        }

        if entry.generation != generation {
            // adjusted during the fire; the adjustment already rescheduled it
            entry.action = Some(action);
            return;
        }

        match outcome {
            TimerOutcome::Done => {
                self.entries.remove(name.as_str());
            }
            TimerOutcome::Rearm(delay) => {
                let generation = self.next_generation();
                let task = self.schedule(name, generation, delay);
                if let Some(entry) = self.entries.get_mut(name.as_str()) {
                    entry.delay = delay;
                    entry.generation = generation;
                    entry.action = Some(action);
                    entry.task = task;
                }
                debug!(timer = %name, delay_ms = delay.as_millis() as u64, "timer rearmed");
            }
        }
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    fn schedule(
        &self,
        name: &TimerName,
        generation: u64,
        delay: Duration,
    ) -> Option<JoinHandle<()>> {
        let Some(sender) = self.sender.as_ref()?.upgrade() else {
            debug!(timer = %name, "sequence queue closed; timer not armed");
            return None;
        };
        let name = name.clone();
        Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let keepalive = sender.clone();
            let fire = Command::Fire {
                name,
                generation,
                keepalive,
            };
            if sender.send(fire).is_err() {
                debug!("timer fired after its sequence stopped");
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> TimerFn {
        Box::new(|_| Ok(TimerOutcome::Done))
    }

    #[test]
    fn test_timer_name() {
        let name: TimerName = "watchdog".into();
        assert_eq!(name, TimerName::new("watchdog"));
        assert_eq!(name.to_string(), "watchdog");
    }

    #[test]
    fn test_anonymous_names_are_unique() {
        let mut timers = Timers::default();
        let first = timers.add(None, Duration::from_millis(10), noop());
        let second = timers.add(None, Duration::from_millis(10), noop());

        assert_ne!(first, second);
        assert!(timers.contains(first.as_str()));
        assert!(timers.contains(second.as_str()));
    }

    #[test]
    fn test_replace_invalidates_previous_generation() {
        let mut timers = Timers::default();
        timers.add(Some("t".into()), Duration::from_millis(100), noop());
        let stale = timers.generation;
        timers.add(Some("t".into()), Duration::from_millis(200), noop());

        assert!(timers.begin_fire("t", stale).is_none());
        assert!(timers.begin_fire("t", timers.generation).is_some());
        assert_eq!(timers.names().count(), 1);
    }

    #[test]
    fn test_adjust_unknown() {
        let mut timers = Timers::default();
        let result = timers.adjust("missing", Duration::from_millis(5));
        assert_eq!(
            result,
            Err(SequenceError::UnknownTimer(TimerName::new("missing")))
        );
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut timers = Timers::default();
        timers.add(Some("t".into()), Duration::from_millis(100), noop());

        assert!(timers.remove("t"));
        assert!(!timers.remove("t"));
    }

    #[test]
    fn test_settle_done_discards() {
        let mut timers = Timers::default();
        let name = timers.add(Some("t".into()), Duration::from_millis(100), noop());
        let generation = timers.generation;

        let action = timers.begin_fire("t", generation);
        assert!(action.is_some());
        if let Some(action) = action {
            timers.settle(&name, generation, action, TimerOutcome::Done);
        }
        assert!(!timers.contains("t"));
    }

    #[test]
    fn test_settle_rearm_keeps_name() {
        let mut timers = Timers::default();
        let name = timers.add(Some("t".into()), Duration::from_millis(100), noop());
        let generation = timers.generation;

        if let Some(action) = timers.begin_fire("t", generation) {
            timers.settle(
                &name,
                generation,
                action,
                TimerOutcome::Rearm(Duration::from_millis(50)),
            );
        }
        assert!(timers.contains("t"));
        assert!(timers.begin_fire("t", generation).is_none());
        assert!(timers.begin_fire("t", timers.generation).is_some());
    }

    #[test]
    fn test_settle_after_removal_drops_action() {
        let mut timers = Timers::default();
        let name = timers.add(Some("t".into()), Duration::from_millis(100), noop());
        let generation = timers.generation;

        if let Some(action) = timers.begin_fire("t", generation) {
            timers.remove("t");
            timers.settle(
                &name,
                generation,
                action,
                TimerOutcome::Rearm(Duration::from_millis(50)),
            );
        }
        assert!(!timers.contains("t"));
    }
}
