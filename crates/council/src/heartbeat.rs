//! Heartbeat supervisor: wraps a single provider invocation with timed
//! progress signals without altering its result.
//!
//! Two independent cadences run while the wrapped call is outstanding:
//!
//! - a local-log cadence emitting "still running" lines, purely
//!   observational;
//! - a transcript cadence driving a caller-supplied async callback
//!   (typically "post a heartbeat comment"), capped at `transcript_max`
//!   occurrences with at most one callback in flight — ticks that would
//!   overlap an in-flight callback are dropped, never queued, and the
//!   occurrence counter advances only after the callback settles.
//!
//! Both cadences die with the wrapped future: when it settles (success or
//! failure) the select loop returns and every timer is dropped.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    /// Local-log cadence; `None` disables.
    pub log_interval: Option<Duration>,
    /// Transcript-callback cadence; `None` disables.
    pub transcript_interval: Option<Duration>,
    /// Cap on settled transcript callbacks per supervised call.
    pub transcript_max: u32,
}

impl HeartbeatConfig {
    /// Seconds-based constructor matching the configuration surface;
    /// zero seconds disables the corresponding cadence.
    pub fn from_seconds(log_secs: u64, transcript_secs: u64, transcript_max: u32) -> Self {
        Self {
            log_interval: (log_secs > 0).then(|| Duration::from_secs(log_secs)),
            transcript_interval: (transcript_secs > 0).then(|| Duration::from_secs(transcript_secs)),
            transcript_max,
        }
    }
}

pub type HeartbeatCallback =
    Box<dyn FnMut(Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// Drive `task` to completion while emitting heartbeats, passing its
/// output through untouched.
pub async fn supervise<T>(
    label: &str,
    config: HeartbeatConfig,
    mut on_transcript_heartbeat: HeartbeatCallback,
    task: impl Future<Output = T>,
) -> T {
    let start = Instant::now();
    let mut log_tick = config.log_interval.map(new_interval);
    let mut transcript_tick = config.transcript_interval.map(new_interval);

    let mut settled: u32 = 0;
    let mut inflight: Option<Pin<Box<dyn Future<Output = ()> + Send>>> = None;

    tokio::pin!(task);
    loop {
        tokio::select! {
            result = &mut task => {
                // Dropping the intervals and any in-flight callback here is
                // the deterministic cancellation the contract requires.
                return result;
            }
            _ = maybe_tick(&mut log_tick) => {
                tracing::info!(
                    target: "council",
                    "{label} still running ({})",
                    format_elapsed(start.elapsed())
                );
            }
            _ = maybe_tick(&mut transcript_tick) => {
                if inflight.is_none() && settled < config.transcript_max {
                    inflight = Some(on_transcript_heartbeat(start.elapsed()));
                }
                // else: overlapping or over-cap tick, dropped.
            }
            _ = settle_inflight(&mut inflight) => {
                settled += 1;
                inflight = None;
            }
        }
    }
}

fn new_interval(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

async fn maybe_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(i) => {
            i.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn settle_inflight(inflight: &mut Option<Pin<Box<dyn Future<Output = ()> + Send>>>) {
    match inflight {
        Some(f) => f.as_mut().await,
        None => std::future::pending().await,
    }
}

/// Compact elapsed-time rendering: `42s`, `3m17s`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else {
        format!("{}m{}s", secs / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use crate::errors::ProviderFailure;

    fn counting_callback(
        started: Arc<AtomicU32>,
        completed: Arc<AtomicU32>,
        busy_for: Duration,
    ) -> HeartbeatCallback {
        Box::new(move |_elapsed| {
            started.fetch_add(1, Ordering::SeqCst);
            let completed = completed.clone();
            Box::pin(async move {
                tokio::time::sleep(busy_for).await;
                completed.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test(start_paused = true)]
    async fn passes_result_through_unchanged() {
        let config = HeartbeatConfig::from_seconds(0, 0, 5);
        let ok: Result<u32, ProviderFailure> = supervise(
            "codex",
            config,
            Box::new(|_| Box::pin(async {})),
            async { Ok(7) },
        )
        .await;
        assert_eq!(ok.unwrap(), 7);

        let err: Result<u32, ProviderFailure> = supervise(
            "codex",
            config,
            Box::new(|_| Box::pin(async {})),
            async { Err(ProviderFailure::message("boom")) },
        )
        .await;
        assert_eq!(err.unwrap_err().render(), "boom");
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_ticks_are_dropped_not_queued() {
        let started = Arc::new(AtomicU32::new(0));
        let completed = Arc::new(AtomicU32::new(0));
        let config = HeartbeatConfig::from_seconds(0, 1, 100);

        // Callback takes 1.5s against a 1s cadence: every other tick lands
        // while a callback is in flight and must be dropped.
        supervise(
            "claude",
            config,
            counting_callback(started.clone(), completed.clone(), Duration::from_millis(1500)),
            tokio::time::sleep(Duration::from_secs(10)),
        )
        .await;

        // Starts at 1s, 3s, 5s, 7s, 9s; the 9s callback is still in flight
        // when the task settles at 10s and is cancelled.
        assert_eq!(started.load(Ordering::SeqCst), 5);
        assert_eq!(completed.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn transcript_cap_stops_further_callbacks() {
        let started = Arc::new(AtomicU32::new(0));
        let completed = Arc::new(AtomicU32::new(0));
        let config = HeartbeatConfig::from_seconds(0, 1, 2);

        supervise(
            "gemini",
            config,
            counting_callback(started.clone(), completed.clone(), Duration::from_millis(10)),
            tokio::time::sleep(Duration::from_secs(10)),
        )
        .await;

        assert_eq!(started.load(Ordering::SeqCst), 2);
        assert_eq!(completed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_disables_cadence() {
        let started = Arc::new(AtomicU32::new(0));
        let completed = Arc::new(AtomicU32::new(0));
        let config = HeartbeatConfig::from_seconds(0, 0, 100);

        supervise(
            "codex",
            config,
            counting_callback(started.clone(), completed.clone(), Duration::from_millis(10)),
            tokio::time::sleep(Duration::from_secs(30)),
        )
        .await;

        assert_eq!(started.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn elapsed_formatting() {
        assert_eq!(format_elapsed(Duration::from_secs(42)), "42s");
        assert_eq!(format_elapsed(Duration::from_secs(60)), "1m0s");
        assert_eq!(format_elapsed(Duration::from_secs(197)), "3m17s");
    }
}
