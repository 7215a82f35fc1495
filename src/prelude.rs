//! Commonly used types and traits

pub use crate::action::{Action, Outcome, Request};
pub use crate::callback::CallbackKind;
pub use crate::config::{SequenceBuilder, SequenceOptions};
pub use crate::error::SequenceError;
pub use crate::handle::SequenceHandle;
pub use crate::handler::{Handler, HandlerRegistry};
pub use crate::heap::Heap;
pub use crate::sequence::{Sequence, SequenceState};
pub use crate::timer::{TimerName, TimerOutcome};
pub use serde_json::Value;
