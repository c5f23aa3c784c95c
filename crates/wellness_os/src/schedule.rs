#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};
use wellness_storage::repo::{
    DashboardAnalyticsRepo, DashboardInteractionsRepo, DashboardLayoutRepo, ProfilesRepo,
};

use crate::analytics_rollup::{AnalyticsRollupJob, ANALYTICS_ROLLUP_JOB};
use crate::batch::{JobClock, JobError};
use crate::layout_learning::{LayoutLearningJob, LAYOUT_LEARNING_JOB};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScheduledRunSummary {
    pub users_completed: usize,
    pub users_failed: usize,
    pub users_skipped: usize,
    pub rows_written: usize,
}

/// A batch that an external trigger invokes on a cadence. The trigger itself
/// (cron, interval worker, HTTP POST) lives outside this crate.
pub trait ScheduledJob<S> {
    fn job_name(&self) -> &'static str;
    fn run_scheduled(
        &self,
        store: &mut S,
        now: DateTime<Utc>,
    ) -> Result<ScheduledRunSummary, JobError>;
}

impl<S, C> ScheduledJob<S> for AnalyticsRollupJob<C>
where
    S: ProfilesRepo + DashboardInteractionsRepo + DashboardAnalyticsRepo,
    C: JobClock,
{
    fn job_name(&self) -> &'static str {
        ANALYTICS_ROLLUP_JOB
    }

    fn run_scheduled(
        &self,
        store: &mut S,
        now: DateTime<Utc>,
    ) -> Result<ScheduledRunSummary, JobError> {
        let mut summary = ScheduledRunSummary::default();
        for report in self.run_trailing_days(store, now)? {
            summary.users_completed += report.processed();
            summary.users_failed += report.batch.failed_count();
            summary.users_skipped += report.batch.skipped_count();
            summary.rows_written += usize::try_from(report.rows_upserted()).unwrap_or(usize::MAX);
        }
        Ok(summary)
    }
}

impl<S, C> ScheduledJob<S> for LayoutLearningJob<C>
where
    S: DashboardLayoutRepo + DashboardAnalyticsRepo,
    C: JobClock,
{
    fn job_name(&self) -> &'static str {
        LAYOUT_LEARNING_JOB
    }

    fn run_scheduled(
        &self,
        store: &mut S,
        now: DateTime<Utc>,
    ) -> Result<ScheduledRunSummary, JobError> {
        let report = self.run(store, now)?;
        Ok(ScheduledRunSummary {
            users_completed: report.batch.completed_count(),
            users_failed: report.batch.failed_count(),
            users_skipped: report.batch.skipped_count(),
            rows_written: report.optimized(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledJobResult {
    pub job: &'static str,
    pub summary: Option<ScheduledRunSummary>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledPassReport {
    pub ran_at: DateTime<Utc>,
    pub jobs: Vec<ScheduledJobResult>,
}

impl ScheduledPassReport {
    pub fn all_ok(&self) -> bool {
        self.jobs.iter().all(|j| j.error.is_none())
    }
}

/// Ordered list of scheduled jobs. Jobs run in insertion order, so the
/// aggregator must be added before the optimizer that reads its output.
pub struct ScheduledJobs<S> {
    jobs: Vec<Box<dyn ScheduledJob<S> + Send>>,
}

impl<S> Default for ScheduledJobs<S> {
    fn default() -> Self {
        Self { jobs: Vec::new() }
    }
}

impl<S> ScheduledJobs<S> {
    pub fn then<J>(mut self, job: J) -> Self
    where
        J: ScheduledJob<S> + Send + 'static,
    {
        self.jobs.push(Box::new(job));
        self
    }

    pub fn job_names(&self) -> Vec<&'static str> {
        self.jobs.iter().map(|j| j.job_name()).collect()
    }

    /// A batch-level failure in one job is logged and does not stop later jobs.
    pub fn run_scheduled_pass(&self, store: &mut S, now: DateTime<Utc>) -> ScheduledPassReport {
        let mut results = Vec::with_capacity(self.jobs.len());
        for job in &self.jobs {
            let result = match job.run_scheduled(store, now) {
                Ok(summary) => ScheduledJobResult {
                    job: job.job_name(),
                    summary: Some(summary),
                    error: None,
                },
                Err(err) => {
                    error!(job = job.job_name(), error = %err, "scheduled job failed");
                    ScheduledJobResult {
                        job: job.job_name(),
                        summary: None,
                        error: Some(err.to_string()),
                    }
                }
            };
            results.push(result);
        }
        let report = ScheduledPassReport {
            ran_at: now,
            jobs: results,
        };
        info!(jobs = report.jobs.len(), all_ok = report.all_ok(), "scheduled pass finished");
        report
    }
}

/// Aggregator first, then optimizer.
pub fn dashboard_learning_schedule<S, C1, C2>(
    rollup: AnalyticsRollupJob<C1>,
    layout: LayoutLearningJob<C2>,
) -> ScheduledJobs<S>
where
    S: ProfilesRepo + DashboardInteractionsRepo + DashboardAnalyticsRepo + DashboardLayoutRepo,
    C1: JobClock + Send + 'static,
    C2: JobClock + Send + 'static,
{
    ScheduledJobs::default().then(rollup).then(layout)
}
