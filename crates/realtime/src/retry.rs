//! Connection state and the reconnect policy.

use std::time::Duration;
use tokio::time::Instant;

/// Lifecycle of the single socket owned by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

/// Delays applied after a close.
///
/// The schedule is flat, not exponential: one fast retry after a connection
/// that had been up for a while, then `slow_delay` for every further attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub fast_delay: Duration,
    pub slow_delay: Duration,
    /// A close this soon after the last successful open counts as a failing connection.
    pub fresh_window: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            fast_delay: Duration::from_millis(100),
            slow_delay: Duration::from_millis(5000),
            fresh_window: Duration::from_millis(5000),
        }
    }
}

/// Bookkeeping for consecutive failed connections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    last_connect_time: Option<Instant>,
    retry_count: u32,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn last_connect_time(&self) -> Option<Instant> {
        self.last_connect_time
    }

    /// A socket opened; the failure streak is over.
    pub fn on_open(&mut self, now: Instant) {
        self.last_connect_time = Some(now);
        self.retry_count = 0;
    }

    /// A socket closed or failed to open. Returns how long to wait before the next attempt.
    pub fn on_close(&mut self, now: Instant, policy: &ReconnectPolicy) -> Duration {
        let closed_soon_after_open = self
            .last_connect_time
            .is_some_and(|opened| now.saturating_duration_since(opened) < policy.fresh_window);
        let needs_delay = closed_soon_after_open || self.retry_count > 0;
        self.retry_count = self.retry_count.saturating_add(1);
        if needs_delay {
            policy.slow_delay
        } else {
            policy.fast_delay
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_long_after_open_retries_fast() {
        let policy = ReconnectPolicy::default();
        let opened = Instant::now();
        let mut retry = RetryState::new();
        retry.on_open(opened);

        let delay = retry.on_close(opened + Duration::from_secs(10), &policy);
        assert_eq!(delay, Duration::from_millis(100));
        assert_eq!(retry.retry_count(), 1);
    }

    #[test]
    fn test_close_soon_after_open_waits() {
        let policy = ReconnectPolicy::default();
        let opened = Instant::now();
        let mut retry = RetryState::new();
        retry.on_open(opened);

        let delay = retry.on_close(opened + Duration::from_millis(4999), &policy);
        assert_eq!(delay, Duration::from_millis(5000));
    }

    #[test]
    fn test_subsequent_failures_use_flat_delay() {
        let policy = ReconnectPolicy::default();
        let opened = Instant::now();
        let mut retry = RetryState::new();
        retry.on_open(opened);

        let mut now = opened + Duration::from_secs(60);
        assert_eq!(retry.on_close(now, &policy), policy.fast_delay);
        for expected_count in 2..6 {
            now += Duration::from_secs(60);
            assert_eq!(retry.on_close(now, &policy), policy.slow_delay);
            assert_eq!(retry.retry_count(), expected_count);
        }
    }

    #[test]
    fn test_never_connected_first_failure_is_fast() {
        let policy = ReconnectPolicy::default();
        let mut retry = RetryState::new();
        assert_eq!(retry.on_close(Instant::now(), &policy), policy.fast_delay);
        assert_eq!(retry.on_close(Instant::now(), &policy), policy.slow_delay);
    }

    #[test]
    fn test_open_resets_the_streak() {
        let policy = ReconnectPolicy::default();
        let start = Instant::now();
        let mut retry = RetryState::new();
        retry.on_close(start, &policy);
        retry.on_close(start, &policy);
        assert_eq!(retry.retry_count(), 2);

        let reopened = start + Duration::from_secs(30);
        retry.on_open(reopened);
        assert_eq!(retry.retry_count(), 0);
        assert_eq!(retry.last_connect_time(), Some(reopened));
    }
}
