// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Polling and publishing intervals.

use std::time::Duration;

/// Default keep-alive interval.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(9);

/// Default interval between forced full-status requests.
pub const DEFAULT_FULL_STATUS_INTERVAL: Duration = Duration::from_secs(300);

/// Default interval after which an unchanged state is published again.
pub const DEFAULT_PUBLISH_INTERVAL: Duration = Duration::from_secs(60);

/// Longest accepted interval. Longer values are capped.
pub const MAX_INTERVAL: Duration = Duration::from_secs(86_400);

/// Intervals driving the engine timers.
///
/// Every interval is capped at [`MAX_INTERVAL`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use moes_bridge::engine::SyncTiming;
///
/// let timing = SyncTiming::default().with_publish_interval(Duration::from_secs(30));
/// assert_eq!(timing.ping_interval(), Duration::from_secs(9));
/// assert_eq!(timing.publish_interval(), Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTiming {
    ping_interval: Duration,
    full_status_interval: Duration,
    publish_interval: Duration,
}

impl SyncTiming {
    /// Sets the keep-alive interval.
    #[must_use]
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval.min(MAX_INTERVAL);
        self
    }

    /// Sets the full-status interval.
    #[must_use]
    pub fn with_full_status_interval(mut self, interval: Duration) -> Self {
        self.full_status_interval = interval.min(MAX_INTERVAL);
        self
    }

    /// Sets the republish interval.
    #[must_use]
    pub fn with_publish_interval(mut self, interval: Duration) -> Self {
        self.publish_interval = interval.min(MAX_INTERVAL);
        self
    }

    /// Keep-alive interval.
    #[must_use]
    pub fn ping_interval(&self) -> Duration {
        self.ping_interval
    }

    /// Full-status interval.
    #[must_use]
    pub fn full_status_interval(&self) -> Duration {
        self.full_status_interval
    }

    /// Republish interval.
    #[must_use]
    pub fn publish_interval(&self) -> Duration {
        self.publish_interval
    }
}

impl Default for SyncTiming {
    fn default() -> Self {
        Self {
            ping_interval: DEFAULT_PING_INTERVAL,
            full_status_interval: DEFAULT_FULL_STATUS_INTERVAL,
            publish_interval: DEFAULT_PUBLISH_INTERVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intervals_are_capped() {
        let timing = SyncTiming::default()
            .with_ping_interval(Duration::MAX)
            .with_full_status_interval(Duration::from_secs(u64::MAX))
            .with_publish_interval(MAX_INTERVAL + Duration::from_secs(1));

        assert_eq!(timing.ping_interval(), MAX_INTERVAL);
        assert_eq!(timing.full_status_interval(), MAX_INTERVAL);
        assert_eq!(timing.publish_interval(), MAX_INTERVAL);
    }

    #[test]
    fn short_intervals_are_kept() {
        let timing = SyncTiming::default().with_ping_interval(Duration::from_millis(500));
        assert_eq!(timing.ping_interval(), Duration::from_millis(500));
    }
}
