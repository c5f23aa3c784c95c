#![forbid(unsafe_code)]

pub mod journal;

use std::env;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};
use wellness_engines::layout::SectionEngagement;
use wellness_engines::motivation::MotivationPicker;
use wellness_kernel_contracts::dashboard::{
    InteractionEvent, InteractionType, LayoutPreference, ProfileRecord, SectionId, UserId,
};
use wellness_os::analytics_rollup::AnalyticsRollupJob;
use wellness_os::batch::{BatchBudget, UserRunReport};
use wellness_os::dashboard_layout::{
    engagement_summary, layout_for, reset_layout, save_custom_layout, set_layout_flags,
};
use wellness_os::layout_learning::{LayoutLearningConfig, LayoutLearningJob, LayoutUserOutcome};
use wellness_os::schedule::{dashboard_learning_schedule, ScheduledPassReport};
use wellness_storage::dashboard::DashboardStore;
use wellness_storage::repo::{DashboardInteractionsRepo, ProfilesRepo};

use crate::journal::{JournalFile, JournaledStore};

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AggregateSectionAnalyticsRequest {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AggregateSectionAnalyticsResponse {
    pub success: bool,
    pub date: NaiveDate,
    pub processed: usize,
    pub rows_upserted: u32,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct OptimizeDashboardLayoutsResponse {
    pub success: bool,
    pub optimized: usize,
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub results: Vec<UserRunReport<LayoutUserOutcome>>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct JobErrorResponse {
    pub success: bool,
    pub error: String,
}

impl JobErrorResponse {
    pub fn new(error: String) -> Self {
        Self {
            success: false,
            error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InteractionAdapterRequest {
    pub user_id: String,
    pub section_id: String,
    pub interaction_type: String,
    pub duration_seconds: Option<f64>,
    pub timestamp_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProfileAdapterRequest {
    pub user_id: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AdapterMutationResponse {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
}

impl AdapterMutationResponse {
    fn accepted() -> Self {
        Self {
            status: "ok".to_string(),
            outcome: "ACCEPTED".to_string(),
            reason: None,
        }
    }

    pub fn rejected(reason: String) -> Self {
        Self {
            status: "error".to_string(),
            outcome: "REJECTED".to_string(),
            reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SaveLayoutRequest {
    pub section_order: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LayoutFlagsRequest {
    pub is_locked: Option<bool>,
    pub learning_enabled: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct LayoutViewResponse {
    pub status: String,
    /// False when the user has no stored row and the default order is shown.
    pub persisted: bool,
    pub layout: LayoutPreference,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct EngagementSummaryResponse {
    pub status: String,
    pub user_id: UserId,
    pub window_from: NaiveDate,
    pub window_to: NaiveDate,
    pub sections: Vec<SectionEngagement>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MotivationResponse {
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AdapterJobHealth {
    pub rollup_runs: u64,
    pub layout_runs: u64,
    pub scheduled_passes: u64,
    pub last_error: Option<String>,
    pub profiles: usize,
    pub interactions: usize,
    pub analytics_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AdapterHealthResponse {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
    pub jobs: AdapterJobHealth,
}

#[derive(Debug, Clone, Default)]
struct AdapterJobCounters {
    rollup_runs: u64,
    layout_runs: u64,
    scheduled_passes: u64,
    last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdapterConfig {
    pub layout: LayoutLearningConfig,
    pub budget: BatchBudget,
    pub motivation_seed: Option<u64>,
    pub store_path: Option<PathBuf>,
}

impl AdapterConfig {
    pub fn mvp_v1() -> Self {
        Self {
            layout: LayoutLearningConfig::mvp_v1(),
            budget: BatchBudget::mvp_v1(),
            motivation_seed: None,
            store_path: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdapterRuntime {
    store: Arc<Mutex<JournaledStore>>,
    rollup_job: AnalyticsRollupJob,
    layout_job: LayoutLearningJob,
    motivation: MotivationPicker,
    motivation_rng: Arc<Mutex<StdRng>>,
    job_counters: Arc<Mutex<AdapterJobCounters>>,
    journal: Option<JournalFile>,
}

impl AdapterRuntime {
    pub fn new(config: AdapterConfig) -> Result<Self, String> {
        let rollup_job = AnalyticsRollupJob::new(config.budget)
            .map_err(|err| format!("invalid analytics rollup config: {err}"))?;
        let layout_job = LayoutLearningJob::new(config.layout, config.budget)
            .map_err(|err| format!("invalid layout learning config: {err}"))?;
        let rng = match config.motivation_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let journal = config.store_path.map(JournalFile::open).transpose()?;
        let runtime = Self {
            store: Arc::new(Mutex::new(JournaledStore::new(
                DashboardStore::new_in_memory(),
            ))),
            rollup_job,
            layout_job,
            motivation: MotivationPicker::mvp_v1(),
            motivation_rng: Arc::new(Mutex::new(rng)),
            job_counters: Arc::new(Mutex::new(AdapterJobCounters::default())),
            journal,
        };
        runtime.replay_journal_into_store()?;
        Ok(runtime)
    }

    pub fn default_from_env() -> Result<Self, String> {
        let mut config = build_adapter_config_from_env_var_map(|key| env::var(key).ok())?;
        if config.store_path.is_none() {
            config.store_path = Some(default_adapter_store_path());
        }
        Self::new(config)
    }

    pub fn register_profile(
        &self,
        request: ProfileAdapterRequest,
        now: DateTime<Utc>,
    ) -> Result<AdapterMutationResponse, String> {
        let user_id = parse_user_id(&request.user_id)?;
        let display_name = request
            .display_name
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let record = ProfileRecord::v1(user_id, display_name, now)
            .map_err(|err| format!("invalid profile: {err}"))?;
        self.with_store(|store| {
            store
                .insert_profile_row(record)
                .map_err(|err| format!("profile rejected: {err}"))
        })?;
        Ok(AdapterMutationResponse::accepted())
    }

    pub fn record_interaction(
        &self,
        request: InteractionAdapterRequest,
        now: DateTime<Utc>,
    ) -> Result<AdapterMutationResponse, String> {
        let user_id = parse_user_id(&request.user_id)?;
        let section_id = parse_section_id(&request.section_id)?;
        let interaction_type = InteractionType::parse(&request.interaction_type)
            .map_err(|err| format!("invalid interaction_type: {err}"))?;
        let timestamp = match request.timestamp_ms {
            Some(ms) => Utc
                .timestamp_millis_opt(ms)
                .single()
                .ok_or_else(|| format!("invalid timestamp_ms: {ms}"))?,
            None => now,
        };
        let event = InteractionEvent::v1(
            user_id,
            section_id,
            interaction_type,
            request.duration_seconds,
            timestamp,
        )
        .map_err(|err| format!("invalid interaction: {err}"))?;
        self.with_store(|store| {
            store
                .append_interaction_row(event)
                .map_err(|err| format!("interaction rejected: {err}"))
        })?;
        Ok(AdapterMutationResponse::accepted())
    }

    /// Defaults to the UTC day of `now` when no date is given.
    pub fn run_section_analytics_job(
        &self,
        request: AggregateSectionAnalyticsRequest,
        now: DateTime<Utc>,
    ) -> Result<AggregateSectionAnalyticsResponse, String> {
        let date = request.date.unwrap_or_else(|| now.date_naive());
        let result = self.with_store(|store| {
            self.rollup_job
                .run_for_date(store, date)
                .map_err(|err| format!("section analytics aggregation failed: {err}"))
        });
        let report = self.note_job_result(result, |c| c.rollup_runs += 1)?;
        Ok(AggregateSectionAnalyticsResponse {
            success: true,
            date,
            processed: report.processed(),
            rows_upserted: report.rows_upserted(),
            failed: report.batch.failed_count(),
            skipped: report.batch.skipped_count(),
        })
    }

    pub fn run_layout_optimization_job(
        &self,
        now: DateTime<Utc>,
    ) -> Result<OptimizeDashboardLayoutsResponse, String> {
        let result = self.with_store(|store| {
            self.layout_job
                .run(store, now)
                .map_err(|err| format!("dashboard layout optimization failed: {err}"))
        });
        let report = self.note_job_result(result, |c| c.layout_runs += 1)?;
        Ok(OptimizeDashboardLayoutsResponse {
            success: true,
            optimized: report.optimized(),
            processed: report.batch.completed_count(),
            failed: report.batch.failed_count(),
            skipped: report.batch.skipped_count(),
            results: report.batch.users,
        })
    }

    /// One tick of the background scheduler: trailing-day rollup, then layout learning.
    pub fn run_scheduled_pass(&self, now: DateTime<Utc>) -> Result<ScheduledPassReport, String> {
        let schedule =
            dashboard_learning_schedule(self.rollup_job.clone(), self.layout_job.clone());
        let report = self.with_store(|store| Ok(schedule.run_scheduled_pass(store, now)))?;
        let mut counters = self.lock_counters()?;
        counters.scheduled_passes += 1;
        if let Some(err) = report.jobs.iter().find_map(|j| j.error.clone()) {
            counters.last_error = Some(err);
        }
        Ok(report)
    }

    /// `Ok(None)` when the user has no profile.
    pub fn layout_view(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<LayoutViewResponse>, String> {
        let user_id = parse_user_id(user_id)?;
        let store = self.lock_store()?;
        if store.store().profile(&user_id).is_none() {
            return Ok(None);
        }
        let persisted = store.store().layout_preference(&user_id).is_some();
        let layout = layout_for(&*store, &user_id, now).map_err(|err| err.to_string())?;
        Ok(Some(layout_view(layout, persisted)))
    }

    pub fn save_layout(
        &self,
        user_id: &str,
        request: SaveLayoutRequest,
        now: DateTime<Utc>,
    ) -> Result<LayoutViewResponse, String> {
        let user_id = parse_user_id(user_id)?;
        let order = request
            .section_order
            .iter()
            .map(|id| parse_section_id(id))
            .collect::<Result<Vec<_>, _>>()?;
        let layout = self.with_store(|store| {
            save_custom_layout(store, &user_id, order, now)
                .map_err(|err| format!("layout rejected: {err}"))
        })?;
        Ok(layout_view(layout, true))
    }

    pub fn update_layout_flags(
        &self,
        user_id: &str,
        request: LayoutFlagsRequest,
        now: DateTime<Utc>,
    ) -> Result<LayoutViewResponse, String> {
        let user_id = parse_user_id(user_id)?;
        let layout = self.with_store(|store| {
            set_layout_flags(
                store,
                &user_id,
                request.is_locked,
                request.learning_enabled,
                now,
            )
            .map_err(|err| format!("layout flags rejected: {err}"))
        })?;
        Ok(layout_view(layout, true))
    }

    pub fn reset_layout(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<LayoutViewResponse, String> {
        let user_id = parse_user_id(user_id)?;
        let layout = self.with_store(|store| {
            reset_layout(store, &user_id, now)
                .map_err(|err| format!("layout reset rejected: {err}"))
        })?;
        Ok(layout_view(layout, true))
    }

    /// `Ok(None)` when the user has no profile.
    pub fn engagement_view(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<EngagementSummaryResponse>, String> {
        let user_id = parse_user_id(user_id)?;
        let store = self.lock_store()?;
        if store.store().profile(&user_id).is_none() {
            return Ok(None);
        }
        let config = self.layout_job.config();
        let sections =
            engagement_summary(&*store, &config, &user_id, now).map_err(|err| err.to_string())?;
        let (window_from, window_to) = config.window(now);
        Ok(Some(EngagementSummaryResponse {
            status: "ok".to_string(),
            user_id,
            window_from,
            window_to,
            sections,
        }))
    }

    pub fn motivation_message(&self) -> Result<MotivationResponse, String> {
        let mut rng = self
            .motivation_rng
            .lock()
            .map_err(|_| "motivation rng lock poisoned".to_string())?;
        Ok(MotivationResponse {
            message: self.motivation.pick(&mut *rng).to_string(),
        })
    }

    pub fn health_report(&self) -> Result<AdapterHealthResponse, String> {
        let store = self.lock_store()?;
        let mut jobs = AdapterJobHealth {
            profiles: store.store().profile_ids().len(),
            interactions: store.store().interactions().len(),
            analytics_rows: store.store().section_analytics_len(),
            ..AdapterJobHealth::default()
        };
        drop(store);
        let counters = self.lock_counters()?.clone();
        jobs.rollup_runs = counters.rollup_runs;
        jobs.layout_runs = counters.layout_runs;
        jobs.scheduled_passes = counters.scheduled_passes;
        jobs.last_error = counters.last_error;
        Ok(AdapterHealthResponse {
            status: "ok".to_string(),
            outcome: "HEALTHY".to_string(),
            reason: None,
            jobs,
        })
    }

    fn lock_store(&self) -> Result<MutexGuard<'_, JournaledStore>, String> {
        self.store
            .lock()
            .map_err(|_| "adapter store lock poisoned".to_string())
    }

    fn lock_counters(&self) -> Result<MutexGuard<'_, AdapterJobCounters>, String> {
        self.job_counters
            .lock()
            .map_err(|_| "adapter job counters lock poisoned".to_string())
    }

    /// Runs `op` under the store lock, then journals whatever it changed.
    ///
    /// The in-memory write stands even when the append fails; the records stay
    /// buffered and go out ahead of the next call's records.
    fn with_store<T, F>(&self, op: F) -> Result<T, String>
    where
        F: FnOnce(&mut JournaledStore) -> Result<T, String>,
    {
        let mut store = self.lock_store()?;
        let result = op(&mut *store);
        let Some(journal) = self.journal.as_ref() else {
            store.take_pending();
            return result;
        };
        let pending = store.take_pending();
        if let Err(err) = journal.append(&pending) {
            warn!(
                error = %err,
                buffered = pending.len(),
                "adapter journal append failed; records kept for retry"
            );
            store.restore_pending(pending);
            drop(store);
            if let Ok(mut counters) = self.lock_counters() {
                counters.last_error = Some(err);
            }
        }
        result
    }

    /// Accepted writes not yet on disk.
    pub fn unjournaled_len(&self) -> Result<usize, String> {
        Ok(self.lock_store()?.pending_len())
    }

    fn note_job_result<T>(
        &self,
        result: Result<T, String>,
        bump: impl FnOnce(&mut AdapterJobCounters),
    ) -> Result<T, String> {
        let mut counters = self.lock_counters()?;
        bump(&mut counters);
        if let Err(err) = &result {
            warn!(error = %err, "adapter job failed");
            counters.last_error = Some(err.clone());
        }
        result
    }

    fn replay_journal_into_store(&self) -> Result<(), String> {
        let Some(journal) = self.journal.as_ref() else {
            return Ok(());
        };
        let mut store = self.lock_store()?;
        let applied = journal.replay_into(&mut store)?;
        info!(path = %journal.path().display(), applied, "adapter store journal replayed");
        Ok(())
    }
}

fn layout_view(layout: LayoutPreference, persisted: bool) -> LayoutViewResponse {
    LayoutViewResponse {
        status: "ok".to_string(),
        persisted,
        layout,
    }
}

fn parse_user_id(raw: &str) -> Result<UserId, String> {
    UserId::new(raw.trim()).map_err(|err| format!("invalid user_id: {err}"))
}

fn parse_section_id(raw: &str) -> Result<SectionId, String> {
    SectionId::new(raw.trim()).map_err(|err| format!("invalid section_id: {err}"))
}

pub fn build_adapter_config_from_env_var_map<F>(mut env_getter: F) -> Result<AdapterConfig, String>
where
    F: FnMut(&str) -> Option<String>,
{
    let mut config = AdapterConfig::mvp_v1();
    if let Some(v) = env_getter("WELLNESS_LAYOUT_COOLDOWN_DAYS") {
        config.layout.cooldown_days = parse_env_number("WELLNESS_LAYOUT_COOLDOWN_DAYS", &v)?;
    }
    if let Some(v) = env_getter("WELLNESS_LAYOUT_WINDOW_DAYS") {
        config.layout.window_days = parse_env_number("WELLNESS_LAYOUT_WINDOW_DAYS", &v)?;
    }
    if let Some(v) = env_getter("WELLNESS_JOB_MAX_ATTEMPTS") {
        config.budget.max_attempts_per_user = parse_env_number("WELLNESS_JOB_MAX_ATTEMPTS", &v)?;
    }
    if let Some(v) = env_getter("WELLNESS_JOB_USER_BUDGET_MS") {
        config.budget.per_user =
            Duration::from_millis(parse_env_number("WELLNESS_JOB_USER_BUDGET_MS", &v)?);
    }
    if let Some(v) = env_getter("WELLNESS_JOB_BATCH_BUDGET_MS") {
        config.budget.per_batch =
            Duration::from_millis(parse_env_number("WELLNESS_JOB_BATCH_BUDGET_MS", &v)?);
    }
    if let Some(v) = env_getter("WELLNESS_MOTIVATION_SEED") {
        config.motivation_seed = Some(parse_env_number("WELLNESS_MOTIVATION_SEED", &v)?);
    }
    config.store_path = env_getter("WELLNESS_ADAPTER_STORE_PATH")
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);

    config
        .layout
        .validate()
        .map_err(|err| format!("invalid layout learning env config: {err}"))?;
    config
        .budget
        .validate()
        .map_err(|err| format!("invalid job budget env config: {err}"))?;
    Ok(config)
}

fn parse_env_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, String> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| format!("invalid {key}='{raw}': expected an unsigned integer"))
}

fn default_adapter_store_path() -> PathBuf {
    if let Ok(home) = env::var("HOME") {
        let home = home.trim();
        if !home.is_empty() {
            return PathBuf::from(home).join(".wellness/adapter/dashboard_journal.jsonl");
        }
    }
    PathBuf::from(".wellness/adapter/dashboard_journal.jsonl")
}
