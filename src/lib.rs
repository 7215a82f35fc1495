//! # Tsunagi (繋ぎ)
//!
//! An asynchronous step sequencer for Rust.
//!
//! The name "Tsunagi" (繋ぎ) means "a link" or "a joint" in Japanese: a
//! sequence links a list of actions into one unit of work that can wait on
//! the outside world between steps.
//!
//! ## Features
//!
//! - **Ordered actions**: each action runs only after the previous one resolved
//! - **Pause/resume**: nestable, so any action can hold the sequence while it
//!   waits for an external event
//! - **Pluggable handlers**: per-sequence and shared handlers decide how an
//!   action is executed; plain closures work out of the box
//! - **Callbacks**: normal, error and finally chains run at most once
//! - **Named timers**: add, replace, adjust, re-arm and remove delayed actions
//! - **Error routing**: anything raised by an action ends up in `failed()`
//!
//! ## Quick Start
//!
//! ```rust
//! use tsunagi::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut seq = Sequence::builder()
//!     .add_action(Action::code(|seq| {
//!         seq.heap_mut().insert("greeting", "Hello, Tsunagi!".to_string());
//!         Ok(Value::Null)
//!     }))
//!     .add_action(Action::code(|seq| {
//!         let len = seq.heap().get::<String>("greeting").map(String::len);
//!         Ok(Value::from(len))
//!     }))
//!     .build();
//!
//! seq.run().await.expect("sequence failed");
//!
//! assert_eq!(seq.state(), SequenceState::Finished);
//! assert_eq!(seq.result(), Some(&Value::from(15)));
//! # }
//! ```
//!
//! ## Waiting on the Outside World
//!
//! A custom [`Handler`] claims the actions it understands. To wait for
//! something it pauses the sequence, hands a [`SequenceHandle`] to the
//! task doing the work and returns; that task resumes the sequence when it
//! is done.
//!
//! ```rust
//! use tsunagi::prelude::*;
//! use async_trait::async_trait;
//! use serde_json::json;
//!
//! #[derive(Debug)]
//! struct Lookup;
//!
//! #[async_trait]
//! impl Handler for Lookup {
//!     async fn handle(
//!         &self,
//!         seq: &mut Sequence,
//!         request: &mut Request,
//!     ) -> Result<Outcome, SequenceError> {
//!         let Some(key) = request.payload().and_then(|p| p.get("lookup")).cloned() else {
//!             return Ok(Outcome::Deferred);
//!         };
//!
//!         seq.pause();
//!         let handle = seq.handle()?;
//!         tokio::spawn(async move {
//!             let answer = format!("value of {key}");
//!             let delivered = handle
//!                 .invoke(move |seq| {
//!                     seq.heap_mut().insert("answer", answer);
//!                     seq.resume()
//!                 })
//!                 .await;
//!             if let Err(e) = delivered {
//!                 eprintln!("answer could not be delivered: {e}");
//!             }
//!         });
//!         Ok(Outcome::Value(Value::Null))
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), SequenceError> {
//! let handle = Sequence::builder()
//!     .add_handler(Lookup)
//!     .add_action(Action::payload(json!({"lookup": "a"})))
//!     .add_action(Action::code(|seq| {
//!         let answer = seq.heap().get::<String>("answer").cloned();
//!         seq.finished(vec![Value::from(answer)])?;
//!         Ok(Value::Null)
//!     }))
//!     .build()
//!     .spawn();
//!
//! handle.run().await?;
//! assert_eq!(handle.wait().await, SequenceState::Finished);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! ```rust
//! use tsunagi::prelude::*;
//! use std::sync::{Arc, Mutex};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let reason = Arc::new(Mutex::new(None));
//! let sink = reason.clone();
//!
//! let mut seq = Sequence::builder()
//!     .add_action(Action::code(|_| Err(SequenceError::msg("boom"))))
//!     .add_error_callback(move |_seq, args| {
//!         if let Ok(mut reason) = sink.lock() {
//!             *reason = args.first().cloned();
//!         }
//!         Ok(())
//!     })
//!     .build();
//!
//! // the error is routed to the error callbacks, not returned
//! seq.run().await.expect("error callbacks succeeded");
//!
//! assert_eq!(seq.state(), SequenceState::Failed);
//! assert_eq!(*reason.lock().unwrap(), Some(Value::from("boom")));
//! # }
//! ```

mod action;
mod callback;
mod config;
mod error;
mod handle;
mod handler;
mod heap;
mod key;
mod sequence;
mod timer;

pub mod prelude;

pub use action::{Action, CodeFn, Outcome, Request};
pub use callback::{CallbackFn, CallbackKind};
pub use config::{SequenceBuilder, SequenceOptions};
pub use error::SequenceError;
pub use handle::SequenceHandle;
pub use handler::{CodeHandler, Handler, HandlerRegistry, HandlerRegistryBuilder};
pub use heap::{Heap, HeapKey};
pub use sequence::{Sequence, SequenceState};
pub use serde_json::Value;
pub use timer::{TimerFn, TimerName, TimerOutcome};
