#![forbid(unsafe_code)]

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::info;
use wellness_engines::engagement::rollup_day;
use wellness_kernel_contracts::dashboard::UserId;
use wellness_storage::dashboard::UpsertOutcome;
use wellness_storage::repo::{DashboardAnalyticsRepo, DashboardInteractionsRepo, ProfilesRepo};

use crate::batch::{
    run_per_user, BatchBudget, BatchReport, JobClock, JobError, SystemJobClock, UserDeadline,
};

pub const ANALYTICS_ROLLUP_JOB: &str = "aggregate_section_analytics";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UserRollupOutcome {
    pub events_read: u32,
    pub rows_inserted: u32,
    pub rows_updated: u32,
    pub rows_unchanged: u32,
}

fn saturating_count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

impl UserRollupOutcome {
    pub fn rows_upserted(&self) -> u32 {
        self.rows_inserted + self.rows_updated
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollupBatchReport {
    pub date: NaiveDate,
    pub batch: BatchReport<UserRollupOutcome>,
}

impl RollupBatchReport {
    pub fn processed(&self) -> usize {
        self.batch.completed_count()
    }

    pub fn rows_upserted(&self) -> u32 {
        self.batch
            .completed()
            .map(|(_, outcome)| outcome.rows_upserted())
            .sum()
    }
}

/// Rolls each profile's interactions for one UTC day into `dashboard_section_analytics`.
#[derive(Debug, Clone)]
pub struct AnalyticsRollupJob<C = SystemJobClock> {
    budget: BatchBudget,
    clock: C,
}

impl AnalyticsRollupJob<SystemJobClock> {
    pub fn new(budget: BatchBudget) -> Result<Self, JobError> {
        Self::with_clock(budget, SystemJobClock)
    }
}

impl<C: JobClock> AnalyticsRollupJob<C> {
    pub fn with_clock(budget: BatchBudget, clock: C) -> Result<Self, JobError> {
        budget.validate()?;
        Ok(Self { budget, clock })
    }

    /// Re-running for the same date recomputes from source events and overwrites.
    pub fn run_for_date<S>(
        &self,
        store: &mut S,
        date: NaiveDate,
    ) -> Result<RollupBatchReport, JobError>
    where
        S: ProfilesRepo + DashboardInteractionsRepo + DashboardAnalyticsRepo,
    {
        let users = store.profile_user_ids()?;
        let batch = run_per_user(
            ANALYTICS_ROLLUP_JOB,
            users,
            &self.budget,
            &self.clock,
            |user_id, deadline| rollup_user_day(store, user_id, date, deadline),
        );
        let report = RollupBatchReport { date, batch };
        info!(
            job = ANALYTICS_ROLLUP_JOB,
            %date,
            processed = report.processed(),
            rows_upserted = report.rows_upserted(),
            failed = report.batch.failed_count(),
            skipped = report.batch.skipped_count(),
            "section analytics rollup finished"
        );
        Ok(report)
    }

    /// Scheduled form: yesterday first, so late events for a closed day are folded in,
    /// then today.
    pub fn run_trailing_days<S>(
        &self,
        store: &mut S,
        now: DateTime<Utc>,
    ) -> Result<Vec<RollupBatchReport>, JobError>
    where
        S: ProfilesRepo + DashboardInteractionsRepo + DashboardAnalyticsRepo,
    {
        let today = now.date_naive();
        let yesterday = (now - Duration::days(1)).date_naive();
        Ok(vec![
            self.run_for_date(store, yesterday)?,
            self.run_for_date(store, today)?,
        ])
    }
}

fn rollup_user_day<S>(
    store: &mut S,
    user_id: &UserId,
    date: NaiveDate,
    deadline: &UserDeadline<'_>,
) -> Result<UserRollupOutcome, JobError>
where
    S: DashboardInteractionsRepo + DashboardAnalyticsRepo,
{
    let events = store.interaction_rows_for_user_day(user_id, date)?;
    let mut outcome = UserRollupOutcome {
        events_read: saturating_count(events.len()),
        ..UserRollupOutcome::default()
    };
    if events.is_empty() {
        return Ok(outcome);
    }
    let rows = rollup_day(user_id, date, &events)?;
    deadline.check()?;
    for row in rows {
        match store.upsert_section_analytics_row(row)? {
            UpsertOutcome::Inserted => outcome.rows_inserted += 1,
            UpsertOutcome::Updated => outcome.rows_updated += 1,
            UpsertOutcome::Unchanged => outcome.rows_unchanged += 1,
        }
    }
    Ok(outcome)
}
