//! Run-polling protocol.
//!
//! After a run is submitted, its status is checked on an exponential
//! backoff schedule until it completes, fails, or the attempt budget is
//! spent. The poll loop also races the session's idle deadline so a
//! silent user cannot keep a session alive through a slow run.

use crate::dispatch::Dispatcher;
use quill_common::config::PollConfig;
use quill_providers::provider::CompletionProvider;
use quill_providers::types::RunStatus;
use std::time::Duration;
use tokio::time::{self, Instant};

/// How a poll loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The run completed; results are ready to fetch
    Completed,
    /// The run reached a terminal failure state
    Failed(RunStatus),
    /// The attempt budget ran out before the run finished
    Exhausted,
    /// The session's idle deadline passed mid-poll
    IdleExpired,
}

/// Compute the delay before each status check.
///
/// Base delay doubling per attempt, capped at `max_delay_ms`, one entry
/// per attempt. With defaults this is
/// 3s, 6s, 12s, 24s, 48s, 96s, then 120s for the remaining attempts.
pub fn backoff_schedule(config: &PollConfig) -> Vec<Duration> {
    let mut delays = Vec::with_capacity(config.max_attempts as usize);
    let mut delay_ms = config.base_delay_ms;
    for _ in 0..config.max_attempts {
        delays.push(Duration::from_millis(delay_ms.min(config.max_delay_ms)));
        delay_ms = delay_ms.saturating_mul(2);
    }
    delays
}

/// Poll a run to a terminal state.
///
/// Emits a progress notice after each non-terminal check, naming the
/// next check interval; the first notice is a fresh message and later
/// ones edit it in place. A status-check transport error consumes the
/// attempt and polling continues.
pub async fn poll_run(
    provider: &dyn CompletionProvider,
    thread_id: &str,
    run_id: &str,
    config: &PollConfig,
    idle_deadline: Instant,
    dispatcher: &Dispatcher,
) -> anyhow::Result<PollOutcome> {
    let schedule = backoff_schedule(config);
    let mut progress_posted = false;

    for (attempt, delay) in schedule.iter().enumerate() {
        tokio::select! {
            _ = time::sleep(*delay) => {}
            _ = time::sleep_until(idle_deadline) => {
                tracing::info!(run_id = %run_id, "Idle deadline passed during run poll");
                return Ok(PollOutcome::IdleExpired);
            }
        }

        let status = match provider.run_status(thread_id, run_id).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(run_id = %run_id, attempt = attempt + 1, error = %e, "Run status check failed");
                if let Some(next) = schedule.get(attempt + 1) {
                    notify_progress(dispatcher, attempt + 1, *next, progress_posted).await;
                    progress_posted = true;
                }
                continue;
            }
        };

        tracing::debug!(run_id = %run_id, attempt = attempt + 1, ?status, "Run status");

        if status == RunStatus::Completed {
            return Ok(PollOutcome::Completed);
        }
        if status.is_terminal() {
            return Ok(PollOutcome::Failed(status));
        }

        if let Some(next) = schedule.get(attempt + 1) {
            notify_progress(dispatcher, attempt + 1, *next, progress_posted).await;
            progress_posted = true;
        }
    }

    Ok(PollOutcome::Exhausted)
}

/// Post a progress notice, or update the existing one in place once a
/// first notice is out.
async fn notify_progress(dispatcher: &Dispatcher, attempt: usize, next: Duration, update: bool) {
    let notice = format!(
        "Still working on it (check {attempt}). I'll look again in {}s.",
        next.as_secs()
    );
    let result = if update {
        dispatcher.edit(&notice).await
    } else {
        dispatcher.dispatch(&notice, &[]).await
    };
    if let Err(e) = result {
        tracing::warn!(error = %e, "Failed to send poll progress notice");
    }
}
