#![forbid(unsafe_code)]

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info};
use wellness_engines::layout::{plan_layout, LayoutGate, LayoutPlan};
use wellness_kernel_contracts::dashboard::{SectionId, UserId};
use wellness_kernel_contracts::ContractViolation;
use wellness_storage::repo::{DashboardAnalyticsRepo, DashboardLayoutRepo};

use crate::batch::{
    run_per_user, BatchBudget, BatchReport, JobClock, JobError, SystemJobClock, UserDeadline,
};

pub const LAYOUT_LEARNING_JOB: &str = "optimize_dashboard_layouts";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutLearningConfig {
    pub cooldown_days: u16,
    pub window_days: u16,
}

impl LayoutLearningConfig {
    pub fn mvp_v1() -> Self {
        Self {
            cooldown_days: 7,
            window_days: 14,
        }
    }

    pub fn validate(&self) -> Result<(), ContractViolation> {
        if self.cooldown_days > 90 {
            return Err(ContractViolation::InvalidValue {
                field: "layout_learning_config.cooldown_days",
                reason: "must be <= 90",
            });
        }
        if self.window_days == 0 || self.window_days > 90 {
            return Err(ContractViolation::InvalidValue {
                field: "layout_learning_config.window_days",
                reason: "must be within 1..=90",
            });
        }
        Ok(())
    }

    pub fn cooldown(&self) -> Duration {
        Duration::days(i64::from(self.cooldown_days))
    }

    /// Inclusive `[today - window_days, today]`.
    pub fn window(&self, now: DateTime<Utc>) -> (NaiveDate, NaiveDate) {
        let today = now.date_naive();
        let from = (now - Duration::days(i64::from(self.window_days))).date_naive();
        (from, today)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LayoutUserOutcome {
    Optimized {
        previous_order: Vec<SectionId>,
        new_order: Vec<SectionId>,
    },
    Unchanged,
    NoAnalytics,
    NoPreference,
    Skipped { gate: &'static str },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutBatchReport {
    pub batch: BatchReport<LayoutUserOutcome>,
}

impl LayoutBatchReport {
    pub fn optimized(&self) -> usize {
        self.batch
            .completed()
            .filter(|(_, outcome)| matches!(outcome, LayoutUserOutcome::Optimized { .. }))
            .count()
    }
}

/// Reorders each eligible user's dashboard sections by trailing-window engagement.
#[derive(Debug, Clone)]
pub struct LayoutLearningJob<C = SystemJobClock> {
    config: LayoutLearningConfig,
    budget: BatchBudget,
    clock: C,
}

impl LayoutLearningJob<SystemJobClock> {
    pub fn new(config: LayoutLearningConfig, budget: BatchBudget) -> Result<Self, JobError> {
        Self::with_clock(config, budget, SystemJobClock)
    }
}

impl<C: JobClock> LayoutLearningJob<C> {
    pub fn with_clock(
        config: LayoutLearningConfig,
        budget: BatchBudget,
        clock: C,
    ) -> Result<Self, JobError> {
        config.validate()?;
        budget.validate()?;
        Ok(Self {
            config,
            budget,
            clock,
        })
    }

    pub fn config(&self) -> LayoutLearningConfig {
        self.config
    }

    pub fn run<S>(&self, store: &mut S, now: DateTime<Utc>) -> Result<LayoutBatchReport, JobError>
    where
        S: DashboardLayoutRepo + DashboardAnalyticsRepo,
    {
        let users = store.layout_preference_user_ids()?;
        let config = self.config;
        let batch = run_per_user(
            LAYOUT_LEARNING_JOB,
            users,
            &self.budget,
            &self.clock,
            |user_id, deadline| optimize_user_layout(store, &config, user_id, now, deadline),
        );
        let report = LayoutBatchReport { batch };
        info!(
            job = LAYOUT_LEARNING_JOB,
            optimized = report.optimized(),
            processed = report.batch.completed_count(),
            failed = report.batch.failed_count(),
            skipped = report.batch.skipped_count(),
            "dashboard layout optimization finished"
        );
        Ok(report)
    }
}

fn optimize_user_layout<S>(
    store: &mut S,
    config: &LayoutLearningConfig,
    user_id: &UserId,
    now: DateTime<Utc>,
    deadline: &UserDeadline<'_>,
) -> Result<LayoutUserOutcome, JobError>
where
    S: DashboardLayoutRepo + DashboardAnalyticsRepo,
{
    let Some(pref) = store.layout_preference_row(user_id)? else {
        return Ok(LayoutUserOutcome::NoPreference);
    };
    // Gate before reading analytics; locked users cost one read.
    if let LayoutPlan::Skip(gate) = plan_layout(&pref, &[], now, config.cooldown()) {
        debug!(user_id = %user_id, gate = gate.as_str(), "layout learning gated");
        return Ok(skipped(gate));
    }

    let (from, to) = config.window(now);
    let rows = store.section_analytics_rows_for_user_range(user_id, from, to)?;
    match plan_layout(&pref, &rows, now, config.cooldown()) {
        LayoutPlan::Skip(gate) => Ok(skipped(gate)),
        LayoutPlan::NoAnalytics => Ok(LayoutUserOutcome::NoAnalytics),
        LayoutPlan::Unchanged => Ok(LayoutUserOutcome::Unchanged),
        LayoutPlan::Reorder { new_order } => {
            deadline.check()?;
            let previous_order = pref.section_order.clone();
            let mut next = pref;
            next.section_order = new_order.clone();
            next.last_auto_adjustment = Some(now);
            next.updated_at = now;
            store.upsert_layout_preference_row(next)?;
            debug!(user_id = %user_id, "layout reordered by engagement");
            Ok(LayoutUserOutcome::Optimized {
                previous_order,
                new_order,
            })
        }
    }
}

fn skipped(gate: LayoutGate) -> LayoutUserOutcome {
    LayoutUserOutcome::Skipped {
        gate: gate.as_str(),
    }
}
