// ABOUTME: Wake-up registry and wait loop for the link-status and link-auth-code long polls
// ABOUTME: Completes on a store hit, a broadcast signal or the configured timeout, whichever comes first
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Long polling
//!
//! A waiter subscribes to a per-key broadcast channel, then alternates between
//! re-reading the store and sleeping until a signal, the poll interval or the
//! deadline. The store is the source of truth; signals only shorten the wait, so a
//! completion written by another process is still observed on the next interval.
//! Dropping the waiter releases its receiver and, when it was the last one, the channel.

use crate::errors::{AppError, AppResult, ErrorCode};
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{sleep, sleep_until, Instant};

const CHANNEL_CAPACITY: usize = 4;

type Channels = Arc<DashMap<String, broadcast::Sender<()>>>;

/// Per-key wake-up channels shared by all long polls of this process
#[derive(Clone, Default)]
pub struct PollRegistry {
    channels: Channels,
}

/// Subscription that removes its channel once no waiter is left
struct Subscription {
    key: String,
    channels: Channels,
    receiver: broadcast::Receiver<()>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Our receiver is still alive while this runs
        self.channels
            .remove_if(&self.key, |_, sender| sender.receiver_count() <= 1);
    }
}

impl PollRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribe(&self, key: &str) -> Subscription {
        let receiver = self
            .channels
            .entry(key.to_owned())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();
        Subscription {
            key: key.to_owned(),
            channels: self.channels.clone(),
            receiver,
        }
    }

    /// Wake every waiter on `key`; a no-op when nobody waits
    pub fn notify(&self, key: &str) {
        if let Some(sender) = self.channels.get(key) {
            let woken = sender.send(()).unwrap_or(0);
            tracing::debug!(poll.key = %key, woken, "Long poll signalled");
        }
    }

    /// Number of keys with at least one waiter
    #[must_use]
    pub fn waiting_keys(&self) -> usize {
        self.channels.len()
    }

    /// Wait until `check` yields a value or `timeout` elapses
    ///
    /// `check` runs once immediately, on every signal for `key` and every `interval`.
    ///
    /// # Errors
    ///
    /// Returns `response_timeout` when the deadline passes first, or the first error
    /// returned by `check`
    pub async fn wait_for<T, F, Fut>(
        &self,
        key: &str,
        timeout: Duration,
        interval: Duration,
        mut check: F,
    ) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<Option<T>>>,
    {
        let deadline = Instant::now() + timeout;
        // Subscribe before the first check so a completion in between is not missed
        let mut subscription = self.subscribe(key);

        loop {
            if let Some(value) = check().await? {
                return Ok(value);
            }
            if Instant::now() >= deadline {
                break;
            }
            tokio::select! {
                received = subscription.receiver.recv() => {
                    if let Err(broadcast::error::RecvError::Closed) = received {
                        sleep(interval).await;
                    }
                }
                () = sleep(interval) => {}
                () = sleep_until(deadline) => break,
            }
        }

        tracing::debug!(poll.key = %key, timeout_ms = timeout.as_millis(), "Long poll timed out");
        Err(AppError::from_code(ErrorCode::ResponseTimeout))
    }
}
