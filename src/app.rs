// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Application context.

use std::panic::{AssertUnwindSafe, catch_unwind};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::config::Profile;

type ExitAction = Box<dyn FnOnce() + Send>;

/// Process-wide settings and shutdown hooks, passed explicitly.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use moes_bridge::app::AppContext;
/// use moes_bridge::config::Profile;
///
/// let context = AppContext::new("moes-bridge", Profile::Dev);
/// let closed = Arc::new(AtomicBool::new(false));
/// let flag = closed.clone();
/// context.register_on_exit("close", move || flag.store(true, Ordering::SeqCst));
///
/// assert_eq!(context.run_exit_actions(), 1);
/// assert!(closed.load(Ordering::SeqCst));
/// ```
pub struct AppContext {
    app_name: String,
    profile: Profile,
    started_at: DateTime<Utc>,
    exit_actions: Mutex<Vec<(&'static str, ExitAction)>>,
}

impl AppContext {
    /// Creates a context; the start time is now.
    #[must_use]
    pub fn new(app_name: impl Into<String>, profile: Profile) -> Self {
        Self {
            app_name: app_name.into(),
            profile,
            started_at: Utc::now(),
            exit_actions: Mutex::new(Vec::new()),
        }
    }

    /// Application name.
    #[must_use]
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Active profile.
    #[must_use]
    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// When the context was created.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Time elapsed since start.
    #[must_use]
    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }

    /// Registers an action to run at shutdown.
    pub fn register_on_exit<F>(&self, name: &'static str, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        tracing::debug!(action = name, "Registered exit action");
        self.exit_actions.lock().push((name, Box::new(action)));
    }

    /// Runs every registered action once, most recent first.
    ///
    /// A panicking action is logged and the rest still run. Returns how many
    /// actions completed.
    pub fn run_exit_actions(&self) -> usize {
        let actions = std::mem::take(&mut *self.exit_actions.lock());
        let mut completed = 0;

        for (name, action) in actions.into_iter().rev() {
            tracing::debug!(action = name, "Running exit action");
            if catch_unwind(AssertUnwindSafe(action)).is_ok() {
                completed += 1;
            } else {
                tracing::error!(action = name, "Exit action panicked");
            }
        }

        completed
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("app_name", &self.app_name)
            .field("profile", &self.profile)
            .field("started_at", &self.started_at)
            .field("exit_actions", &self.exit_actions.lock().len())
            .finish()
    }
}

/// Renders a duration as `H:MM:SS.mmm`.
#[must_use]
pub fn format_duration(duration: chrono::Duration) -> String {
    let millis = duration.num_milliseconds().max(0);
    let (secs, millis) = (millis / 1000, millis % 1000);
    format!(
        "{}:{:02}:{:02}.{millis:03}",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60
    )
}
