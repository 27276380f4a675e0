//! Constant interning.
//!
//! Each compile context owns one [`ValuePool`]; compiled constants are
//! routed through it so that repeated literals share a single allocation
//! (and therefore a single set of cached conversions). The pool lives and
//! dies with its context; nothing is process-global.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{Decimal, Kind, Value};

/// Concurrency-safe insert-if-absent table of constant values.
#[derive(Default)]
pub struct ValuePool {
    texts: Mutex<HashMap<String, Value>>,
    numbers: Mutex<HashMap<Decimal, Value>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic while holding the lock cannot leave a half-inserted entry.
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ValuePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the pooled value equal to `value`, inserting it if absent.
    /// Logic and Date values are returned unchanged.
    pub fn intern(&self, value: Value) -> Value {
        match value.kind() {
            Kind::Text => lock(&self.texts)
                .entry(value.as_text().to_owned())
                .or_insert(value)
                .clone(),
            Kind::Number => match value.as_number() {
                Ok(n) => lock(&self.numbers)
                    .entry(n.clone())
                    .or_insert_with(|| value.clone())
                    .clone(),
                Err(_) => value,
            },
            Kind::Logic | Kind::Date => value,
        }
    }

    /// Number of pooled values.
    pub fn len(&self) -> usize {
        lock(&self.texts).len() + lock(&self.numbers).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ValuePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValuePool").field("len", &self.len()).finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
