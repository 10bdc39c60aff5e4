use std::sync::Arc;

use chrono::{DateTime, Days, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::{error, info, warn};
use trendpost_core::config::ScheduleConfig;

use crate::pipeline::{self, RunReport};
use crate::state::AppState;

/// Wall-clock `time` on `date` in `tz`. A time skipped by a DST jump fires
/// an hour later; an ambiguous one fires at its first occurrence.
fn local_instant(tz: Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let naive = date.and_time(time);
    let local = match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => naive
            .checked_add_signed(Duration::hours(1))
            .and_then(|shifted| tz.from_local_datetime(&shifted).earliest()),
    };
    local
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

/// First `report_time` strictly after `now` in the schedule's timezone.
/// `None` once the calendar runs out.
pub fn next_run_after(now: DateTime<Utc>, schedule: &ScheduleConfig) -> Option<DateTime<Utc>> {
    let today = now.with_timezone(&schedule.timezone).date_naive();
    let candidate = local_instant(schedule.timezone, today, schedule.report_time);
    if candidate > now {
        return Some(candidate);
    }
    let tomorrow = today.checked_add_days(Days::new(1))?;
    Some(local_instant(schedule.timezone, tomorrow, schedule.report_time))
}

/// The fire time `interval_days` calendar days after `fired_at`, at the
/// configured local time.
pub fn following_run(fired_at: DateTime<Utc>, schedule: &ScheduleConfig) -> Option<DateTime<Utc>> {
    let fired_on = fired_at.with_timezone(&schedule.timezone).date_naive();
    let next_day = fired_on.checked_add_days(Days::new(u64::from(schedule.interval_days.max(1))))?;
    Some(local_instant(schedule.timezone, next_day, schedule.report_time))
}

#[derive(Debug)]
pub enum TriggerOutcome {
    Completed(RunReport),
    Failed,
    /// Another run was still in flight.
    Skipped,
}

/// Runs the pipeline unless a run is already in flight.
pub async fn trigger(state: &AppState) -> TriggerOutcome {
    let Some(_permit) = state.try_begin_run() else {
        warn!("previous report run still in flight; skipping trigger");
        return TriggerOutcome::Skipped;
    };
    match pipeline::run_report(state, Utc::now()).await {
        Ok(report) => TriggerOutcome::Completed(report),
        Err(_) => TriggerOutcome::Failed,
    }
}

/// Fires a run at every scheduled time until the task is dropped. A failed
/// run only affects its own cycle.
pub async fn run_scheduler_loop(state: Arc<AppState>, run_immediately: bool) {
    let schedule = state.config.schedule.clone();
    info!(
        interval_days = schedule.interval_days,
        report_time = %schedule.report_time.format("%H:%M"),
        timezone = %schedule.timezone,
        "report scheduler started"
    );

    if run_immediately {
        info!("running report immediately");
        spawn_run(&state);
    }

    let mut next = next_run_after(Utc::now(), &schedule);
    while let Some(at) = next {
        info!(next_run_at = %at.with_timezone(&schedule.timezone), "next report scheduled");
        let wait = (at - Utc::now()).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;
        spawn_run(&state);
        next = following_run(at, &schedule);
    }
    error!("next report date is out of range; scheduler stopped");
}

fn spawn_run(state: &Arc<AppState>) {
    let state = Arc::clone(state);
    tokio::spawn(async move {
        trigger(&state).await;
    });
}
