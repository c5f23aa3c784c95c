#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use chrono::NaiveDate;
use wellness_kernel_contracts::dashboard::{
    InteractionEvent, LayoutPreference, ProfileRecord, SectionAnalytics, SectionId, UserId,
};
use wellness_kernel_contracts::{ContractViolation, Validate};

pub const TABLE_PROFILES: &str = "profiles";
pub const TABLE_INTERACTIONS: &str = "dashboard_section_interactions";
pub const TABLE_ANALYTICS: &str = "dashboard_section_analytics";
pub const TABLE_LAYOUT_PREFERENCES: &str = "dashboard_layout_preferences";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StorageError {
    #[error("foreign key violation on {table}: {key}")]
    ForeignKeyViolation { table: &'static str, key: String },
    #[error("duplicate key on {table}: {key}")]
    DuplicateKey { table: &'static str, key: String },
    #[error("{table} unavailable: {reason}")]
    Unavailable { table: &'static str, reason: String },
    #[error("contract violation: {0}")]
    ContractViolation(ContractViolation),
}

impl From<ContractViolation> for StorageError {
    fn from(v: ContractViolation) -> Self {
        StorageError::ContractViolation(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

type AnalyticsKey = (UserId, SectionId, NaiveDate);

/// In-memory rendition of the four dashboard tables.
#[derive(Debug, Clone, Default)]
pub struct DashboardStore {
    profiles: BTreeMap<UserId, ProfileRecord>,
    interactions: Vec<InteractionEvent>,
    // (user, day) -> row offsets into `interactions`
    interactions_by_user_day: BTreeMap<(UserId, NaiveDate), Vec<usize>>,
    analytics: BTreeMap<AnalyticsKey, SectionAnalytics>,
    layout_preferences: BTreeMap<UserId, LayoutPreference>,
}

impl DashboardStore {
    pub fn new_in_memory() -> Self {
        Self::default()
    }

    fn ensure_profile(&self, table: &'static str, user_id: &UserId) -> Result<(), StorageError> {
        if !self.profiles.contains_key(user_id) {
            return Err(StorageError::ForeignKeyViolation {
                table,
                key: user_id.as_str().to_string(),
            });
        }
        Ok(())
    }

    pub fn insert_profile(&mut self, record: ProfileRecord) -> Result<(), StorageError> {
        record.validate()?;
        if self.profiles.contains_key(&record.user_id) {
            return Err(StorageError::DuplicateKey {
                table: TABLE_PROFILES,
                key: record.user_id.as_str().to_string(),
            });
        }
        self.profiles.insert(record.user_id.clone(), record);
        Ok(())
    }

    pub fn profile(&self, user_id: &UserId) -> Option<&ProfileRecord> {
        self.profiles.get(user_id)
    }

    pub fn profile_ids(&self) -> Vec<UserId> {
        self.profiles.keys().cloned().collect()
    }

    /// Appends one event; returns its 1-based row sequence.
    pub fn append_interaction(&mut self, event: InteractionEvent) -> Result<u64, StorageError> {
        event.validate()?;
        self.ensure_profile("dashboard_section_interactions.user_id", &event.user_id)?;
        let offset = self.interactions.len();
        self.interactions_by_user_day
            .entry((event.user_id.clone(), event.utc_day()))
            .or_default()
            .push(offset);
        self.interactions.push(event);
        Ok(offset as u64 + 1)
    }

    pub fn interactions(&self) -> &[InteractionEvent] {
        &self.interactions
    }

    pub fn interactions_for_user_day(
        &self,
        user_id: &UserId,
        date: NaiveDate,
    ) -> Vec<InteractionEvent> {
        self.interactions_by_user_day
            .get(&(user_id.clone(), date))
            .map(|offsets| {
                offsets
                    .iter()
                    .map(|&offset| self.interactions[offset].clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn upsert_section_analytics(
        &mut self,
        row: SectionAnalytics,
    ) -> Result<UpsertOutcome, StorageError> {
        row.validate()?;
        self.ensure_profile("dashboard_section_analytics.user_id", &row.user_id)?;
        let key = (row.user_id.clone(), row.section_id.clone(), row.date);
        let outcome = match self.analytics.get(&key) {
            None => UpsertOutcome::Inserted,
            Some(existing) if existing == &row => UpsertOutcome::Unchanged,
            Some(_) => UpsertOutcome::Updated,
        };
        if outcome != UpsertOutcome::Unchanged {
            self.analytics.insert(key, row);
        }
        Ok(outcome)
    }

    pub fn section_analytics(
        &self,
        user_id: &UserId,
        section_id: &SectionId,
        date: NaiveDate,
    ) -> Option<&SectionAnalytics> {
        self.analytics.get(&(user_id.clone(), section_id.clone(), date))
    }

    /// Rows for `user_id` with `from <= date <= to`, ordered by (section, date).
    pub fn section_analytics_for_user_range(
        &self,
        user_id: &UserId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Vec<SectionAnalytics> {
        self.analytics
            .values()
            .filter(|row| &row.user_id == user_id && row.date >= from && row.date <= to)
            .cloned()
            .collect()
    }

    pub fn section_analytics_len(&self) -> usize {
        self.analytics.len()
    }

    pub fn upsert_layout_preference(
        &mut self,
        pref: LayoutPreference,
    ) -> Result<UpsertOutcome, StorageError> {
        pref.validate()?;
        self.ensure_profile("dashboard_layout_preferences.user_id", &pref.user_id)?;
        let outcome = match self.layout_preferences.get(&pref.user_id) {
            None => UpsertOutcome::Inserted,
            Some(existing) if existing == &pref => UpsertOutcome::Unchanged,
            Some(_) => UpsertOutcome::Updated,
        };
        if outcome != UpsertOutcome::Unchanged {
            self.layout_preferences.insert(pref.user_id.clone(), pref);
        }
        Ok(outcome)
    }

    pub fn layout_preference(&self, user_id: &UserId) -> Option<&LayoutPreference> {
        self.layout_preferences.get(user_id)
    }

    pub fn layout_preference_ids(&self) -> Vec<UserId> {
        self.layout_preferences.keys().cloned().collect()
    }
}
