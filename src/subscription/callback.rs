// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Single-subscriber callback slot.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::{ReentrantMutex, RwLock};

use crate::error::Result;

/// Type alias for slot handlers.
type Handler<T> = Arc<dyn Fn(&T) -> Result<()> + Send + Sync>;

/// Holds at most one handler and invokes it safely.
///
/// Registering a handler replaces the previous one. Invocations of the same
/// slot are serialized. A handler that returns an error or panics is logged
/// and never propagates into the caller.
pub struct CallbackSlot<T> {
    name: &'static str,
    handler: RwLock<Option<Handler<T>>>,
    invoke_lock: ReentrantMutex<()>,
}

impl<T> CallbackSlot<T> {
    /// Creates an empty slot. The name only appears in logs.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handler: RwLock::new(None),
            invoke_lock: ReentrantMutex::new(()),
        }
    }

    /// Registers the handler, replacing any previous one.
    pub fn set<F>(&self, handler: F)
    where
        F: Fn(&T) -> Result<()> + Send + Sync + 'static,
    {
        if self.handler.write().replace(Arc::new(handler)).is_some() {
            tracing::debug!(callback = self.name, "Replacing registered callback");
        }
    }

    /// Removes the handler.
    pub fn clear(&self) {
        self.handler.write().take();
    }

    /// Returns `true` if a handler is registered.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.handler.read().is_some()
    }

    /// Invokes the handler with `value`.
    ///
    /// Returns `true` only if a handler ran and succeeded.
    pub fn invoke(&self, value: &T) -> bool {
        let _serial = self.invoke_lock.lock();

        // Release the slot lock before running user code so the handler may
        // re-register itself.
        let Some(handler) = self.handler.read().clone() else {
            tracing::trace!(callback = self.name, "No callback registered");
            return false;
        };

        match catch_unwind(AssertUnwindSafe(|| handler(value))) {
            Ok(Ok(())) => true,
            Ok(Err(error)) => {
                tracing::error!(callback = self.name, error = %error, "Callback failed");
                false
            }
            Err(payload) => {
                tracing::error!(
                    callback = self.name,
                    panic = %panic_message(payload.as_ref()),
                    "Callback panicked"
                );
                false
            }
        }
    }
}

impl<T> std::fmt::Debug for CallbackSlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSlot")
            .field("name", &self.name)
            .field("is_set", &self.is_set())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn empty_slot_does_nothing() {
        let slot = CallbackSlot::<u32>::new("test");
        assert!(!slot.is_set());
        assert!(!slot.invoke(&1));
    }

    #[test]
    fn handler_receives_value() {
        let slot = CallbackSlot::<u32>::new("test");
        let seen = Arc::new(AtomicU32::new(0));
        let seen_clone = seen.clone();

        slot.set(move |value| {
            seen_clone.store(*value, Ordering::SeqCst);
            Ok(())
        });

        assert!(slot.invoke(&7));
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn set_replaces_previous_handler() {
        let slot = CallbackSlot::<u32>::new("test");
        let first = Arc::new(AtomicU32::new(0));
        let second = Arc::new(AtomicU32::new(0));
        let f = first.clone();
        let s = second.clone();

        slot.set(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        slot.set(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        slot.invoke(&0);

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_handler_is_contained() {
        let slot = CallbackSlot::<u32>::new("test");
        slot.set(|_| Err(Error::Callback("broker gone".to_string())));
        assert!(!slot.invoke(&1));
    }

    #[test]
    fn panicking_handler_is_contained() {
        let slot = CallbackSlot::<u32>::new("test");
        slot.set(|_| panic!("handler bug"));

        assert!(!slot.invoke(&1));
        // The slot stays usable afterwards.
        assert!(!slot.invoke(&2));
        assert!(slot.is_set());
    }

    #[test]
    fn clear_removes_handler() {
        let slot = CallbackSlot::<u32>::new("test");
        slot.set(|_| Ok(()));
        slot.clear();
        assert!(!slot.is_set());
    }

    #[test]
    fn debug_shows_name() {
        let slot = CallbackSlot::<u32>::new("state_changed");
        let debug = format!("{slot:?}");
        assert!(debug.contains("state_changed"));
    }
}
