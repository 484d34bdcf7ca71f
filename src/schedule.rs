//! Recurring trigger for synchronization runs.
//!
//! Runs are awaited one after another on a single task, so two runs against
//! the same source/destination pair never overlap. A tick that comes due
//! while a run is still in progress is skipped.
//!
//! Runs are triggered either on a fixed interval or by a cron expression
//! with a leading seconds field (`0 0 * * * *` is every hour on the hour).

use anyhow::Context;
use chrono::{DateTime, Utc};
use cron::Schedule;
use log_sync_core::SyncReport;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

pub fn parse_cron(expression: &str) -> anyhow::Result<Schedule> {
    Schedule::from_str(expression.trim())
        .with_context(|| format!("Invalid cron expression: {expression}"))
}

/// Time from `now` until the schedule next fires, `None` if it never does.
pub fn delay_until_next(schedule: &Schedule, now: DateTime<Utc>) -> Option<Duration> {
    let next = schedule.after(&now).next()?;
    Some((next - now).to_std().unwrap_or_default())
}

fn log_outcome(run: u64, result: anyhow::Result<SyncReport>) {
    match result {
        Ok(report) if report.is_degraded() => {
            warn!("Scheduled run {run} finished degraded ({})", report.action)
        }
        Ok(report) => info!("Scheduled run {run} finished ({})", report.action),
        Err(e) => error!("Scheduled run {run} failed: {e:#}"),
    }
}

/// Call `run` immediately and then every `period` until `shutdown` resolves.
///
/// A failed run is logged and the loop waits for the next tick. Returns the
/// number of runs started.
pub async fn run_on_interval<F, Fut, S>(period: Duration, mut run: F, shutdown: S) -> u64
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<SyncReport>>,
    S: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    let mut started = 0;
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }

        started += 1;
        info!("Scheduled run {started} starting");
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                warn!("Shutdown requested, abandoning scheduled run {started}");
                break;
            }
            result = run() => log_outcome(started, result),
        }
    }

    info!("Scheduler stopped after {started} runs");
    started
}

/// Call `run` every time `schedule` fires until `shutdown` resolves.
///
/// The next fire time is computed after each run finishes, so fire times
/// that pass during a run are skipped.
pub async fn run_on_cron<F, Fut, S>(schedule: &Schedule, mut run: F, shutdown: S) -> u64
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<SyncReport>>,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let mut started = 0;
    let mut last_fire: Option<DateTime<Utc>> = None;
    loop {
        // never fire the same time twice if the timer wakes before the clock
        let now = Utc::now();
        let from = last_fire.map_or(now, |fired| fired.max(now));
        let Some(next) = schedule.after(&from).next() else {
            warn!("Cron schedule has no upcoming fire time");
            break;
        };
        last_fire = Some(next);
        let delay = (next - now).to_std().unwrap_or_default();
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(delay) => {}
        }

        started += 1;
        info!("Scheduled run {started} starting");
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                warn!("Shutdown requested, abandoning scheduled run {started}");
                break;
            }
            result = run() => log_outcome(started, result),
        }
    }

    info!("Scheduler stopped after {started} runs");
    started
}
