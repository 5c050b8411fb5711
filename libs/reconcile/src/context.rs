//! Per-pass working context.
//!
//! Facts discovered by earlier resources (client handles, account IDs,
//! resource IDs) are published here and read by later resources in the same
//! pass. A context lives for exactly one pass and is never shared across
//! cluster objects.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use crate::error::{ReconcileError, Result};

/// Typed key into a [`WorkingContext`].
pub struct ContextKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ContextKey<T> {
    /// Declare a key. Names must be unique across all resources.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for ContextKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ContextKey<T> {}

impl<T> fmt::Debug for ContextKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContextKey").field(&self.name).finish()
    }
}

struct Slot {
    producer: String,
    value: Box<dyn Any + Send + Sync>,
}

/// Keyed scratch space for one reconciliation pass.
///
/// Keys are single-writer: the resource that first sets a key owns it, and
/// any other resource attempting to overwrite it is rejected.
#[derive(Default)]
pub struct WorkingContext {
    slots: HashMap<&'static str, Slot>,
}

impl WorkingContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a value.
    pub fn get<T: Any + Send + Sync>(&self, key: &ContextKey<T>) -> Option<&T> {
        self.slots.get(key.name)?.value.downcast_ref::<T>()
    }

    /// Look up a value that an earlier resource must have set.
    ///
    /// A missing key means resources are ordered incorrectly, so this is an
    /// execution error rather than a precondition miss.
    pub fn require<T: Any + Send + Sync>(&self, key: &ContextKey<T>) -> Result<&T> {
        self.get(key).ok_or_else(|| {
            ReconcileError::execution(format!(
                "working context key {:?} not set by an earlier resource",
                key.name
            ))
        })
    }

    /// Publish a value under `key` on behalf of `producer`.
    pub fn set<T: Any + Send + Sync>(
        &mut self,
        producer: &str,
        key: &ContextKey<T>,
        value: T,
    ) -> Result<()> {
        if let Some(existing) = self.slots.get(key.name) {
            if existing.producer != producer {
                return Err(ReconcileError::already_exists(format!(
                    "working context key {:?} is owned by {:?}, not {:?}",
                    key.name, existing.producer, producer
                )));
            }
        }

        self.slots.insert(
            key.name,
            Slot {
                producer: producer.to_string(),
                value: Box::new(value),
            },
        );
        Ok(())
    }

    /// Returns true if the key has been set.
    pub fn contains<T>(&self, key: &ContextKey<T>) -> bool {
        self.slots.contains_key(key.name)
    }

    /// Name of the resource that set the key, if any.
    pub fn producer<T>(&self, key: &ContextKey<T>) -> Option<&str> {
        self.slots.get(key.name).map(|s| s.producer.as_str())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Debug for WorkingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self
            .slots
            .iter()
            .map(|(k, s)| (*k, s.producer.as_str()))
            .collect();
        keys.sort();
        f.debug_struct("WorkingContext").field("keys", &keys).finish()
    }
}
