//! Per-sequence key/value context shared between actions and callbacks.

use crate::key::string_key;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;

string_key!(
    /// Key into a [`Heap`].
    HeapKey
);

/// Heterogeneous storage owned by a single [`Sequence`](crate::Sequence).
///
/// Values of any `Send + Sync` type are stored under string keys and read
/// back by downcasting. A later write to the same key replaces the earlier
/// value; nothing is ever removed unless [`Heap::remove`] is called.
///
/// # Examples
///
/// ```
/// use tsunagi::Heap;
///
/// let mut heap = Heap::new();
/// heap.insert("a", 5i64);
/// heap.insert("peer", "10.0.0.7".to_string());
///
/// assert_eq!(heap.get::<i64>("a"), Some(&5));
/// assert_eq!(heap.get::<String>("peer").map(String::as_str), Some("10.0.0.7"));
///
/// // Wrong type reads as absent
/// assert_eq!(heap.get::<String>("a"), None);
/// ```
#[derive(Default)]
pub struct Heap {
    data: HashMap<HeapKey, Box<dyn Any + Send + Sync>>,
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("keys", &self.data.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Heap {
    /// Creates an empty heap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<HeapKey>, value: T) {
        self.data.insert(key.into(), Box::new(value));
    }

    /// Returns the value for `key` if present and of type `T`.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.data.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    /// Mutable variant of [`Heap::get`].
    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.data.get_mut(key).and_then(|v| v.downcast_mut::<T>())
    }

    /// Removes and returns the value for `key`.
    ///
    /// The entry is only removed when the stored type matches `T`.
    pub fn remove<T: Any>(&mut self, key: &str) -> Option<T> {
        if self.get::<T>(key).is_none() {
            return None;
        }
        self.data
            .remove(key)
            .and_then(|v| v.downcast::<T>().ok())
            .map(|b| *b)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &HeapKey> {
        self.data.keys()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
