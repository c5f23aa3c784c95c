#![forbid(unsafe_code)]

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};
use wellness_kernel_contracts::dashboard::UserId;
use wellness_kernel_contracts::ContractViolation;
use wellness_storage::dashboard::StorageError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JobError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("contract violation: {0}")]
    Contract(#[from] ContractViolation),
    #[error("user budget of {budget_ms}ms exceeded after {elapsed_ms}ms")]
    UserBudgetExceeded { budget_ms: u64, elapsed_ms: u64 },
}

impl JobError {
    fn is_timeout(&self) -> bool {
        matches!(self, JobError::UserBudgetExceeded { .. })
    }
}

pub trait JobClock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemJobClock;

impl JobClock for SystemJobClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchBudget {
    pub per_user: Duration,
    pub per_batch: Duration,
    pub max_attempts_per_user: u8,
}

impl BatchBudget {
    pub fn mvp_v1() -> Self {
        Self {
            per_user: Duration::from_millis(2_000),
            per_batch: Duration::from_millis(60_000),
            max_attempts_per_user: 2,
        }
    }

    pub fn validate(&self) -> Result<(), ContractViolation> {
        if self.per_user.is_zero() {
            return Err(ContractViolation::InvalidValue {
                field: "batch_budget.per_user",
                reason: "must be > 0",
            });
        }
        if self.per_batch < self.per_user {
            return Err(ContractViolation::InvalidValue {
                field: "batch_budget.per_batch",
                reason: "must be >= per_user",
            });
        }
        if !(1..=5).contains(&self.max_attempts_per_user) {
            return Err(ContractViolation::InvalidValue {
                field: "batch_budget.max_attempts_per_user",
                reason: "must be within 1..=5",
            });
        }
        Ok(())
    }
}

/// Time allowance for one attempt at one user's read-aggregate-write cycle.
///
/// Jobs call `check` before any write so a straggler never half-commits late.
pub struct UserDeadline<'a> {
    clock: &'a dyn JobClock,
    started: Instant,
    budget: Duration,
}

impl<'a> UserDeadline<'a> {
    fn start(clock: &'a dyn JobClock, budget: Duration) -> Self {
        Self {
            clock,
            started: clock.now(),
            budget,
        }
    }

    pub fn check(&self) -> Result<(), JobError> {
        let elapsed = self.clock.now().saturating_duration_since(self.started);
        if elapsed >= self.budget {
            return Err(JobError::UserBudgetExceeded {
                budget_ms: u64::try_from(self.budget.as_millis()).unwrap_or(u64::MAX),
                elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRunStatus<T> {
    Completed { outcome: T },
    Failed { error: String },
    TimedOut { error: String },
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRunReport<T> {
    pub user_id: UserId,
    pub attempts: u8,
    #[serde(flatten)]
    pub status: UserRunStatus<T>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport<T> {
    pub job: &'static str,
    pub users: Vec<UserRunReport<T>>,
}

impl<T> BatchReport<T> {
    pub fn completed(&self) -> impl Iterator<Item = (&UserId, &T)> {
        self.users.iter().filter_map(|r| match &r.status {
            UserRunStatus::Completed { outcome } => Some((&r.user_id, outcome)),
            _ => None,
        })
    }

    pub fn completed_count(&self) -> usize {
        self.completed().count()
    }

    pub fn failed_count(&self) -> usize {
        self.users
            .iter()
            .filter(|r| {
                matches!(
                    r.status,
                    UserRunStatus::Failed { .. } | UserRunStatus::TimedOut { .. }
                )
            })
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.users
            .iter()
            .filter(|r| matches!(r.status, UserRunStatus::Skipped))
            .count()
    }
}

/// Runs `run_user` once per user with failure isolation, retry and time caps.
///
/// An error for one user is retried up to `max_attempts_per_user` and then reported;
/// it never aborts the batch. Budget overruns are not retried. Once the batch budget
/// is spent the remaining users are reported as skipped.
pub fn run_per_user<T, F>(
    job: &'static str,
    users: Vec<UserId>,
    budget: &BatchBudget,
    clock: &dyn JobClock,
    mut run_user: F,
) -> BatchReport<T>
where
    F: FnMut(&UserId, &UserDeadline<'_>) -> Result<T, JobError>,
{
    let batch_started = clock.now();
    let mut reports = Vec::with_capacity(users.len());

    for user_id in users {
        if clock.now().saturating_duration_since(batch_started) >= budget.per_batch {
            warn!(job, user_id = %user_id, "batch budget spent; skipping user");
            reports.push(UserRunReport {
                user_id,
                attempts: 0,
                status: UserRunStatus::Skipped,
            });
            continue;
        }

        let mut attempts = 0u8;
        let status = loop {
            attempts += 1;
            let deadline = UserDeadline::start(clock, budget.per_user);
            match run_user(&user_id, &deadline) {
                Ok(outcome) => break UserRunStatus::Completed { outcome },
                Err(err) if err.is_timeout() => {
                    warn!(job, user_id = %user_id, attempts, error = %err, "user run timed out");
                    break UserRunStatus::TimedOut {
                        error: err.to_string(),
                    };
                }
                Err(err) if attempts >= budget.max_attempts_per_user => {
                    warn!(job, user_id = %user_id, attempts, error = %err, "user run failed");
                    break UserRunStatus::Failed {
                        error: err.to_string(),
                    };
                }
                Err(err) => {
                    debug!(job, user_id = %user_id, attempts, error = %err, "retrying user run");
                }
            }
        };
        reports.push(UserRunReport {
            user_id,
            attempts,
            status,
        });
    }

    BatchReport {
        job,
        users: reports,
    }
}
