#![forbid(unsafe_code)]

use chrono::NaiveDate;
use wellness_kernel_contracts::dashboard::{
    InteractionEvent, LayoutPreference, ProfileRecord, SectionAnalytics, UserId,
};

use crate::dashboard::{DashboardStore, StorageError, UpsertOutcome};

/// Typed repository interface for the `profiles` table.
pub trait ProfilesRepo {
    fn insert_profile_row(&mut self, record: ProfileRecord) -> Result<(), StorageError>;
    fn profile_user_ids(&self) -> Result<Vec<UserId>, StorageError>;
}

/// Typed repository interface for append-only `dashboard_section_interactions`.
pub trait DashboardInteractionsRepo {
    fn append_interaction_row(&mut self, event: InteractionEvent) -> Result<u64, StorageError>;
    fn interaction_rows_for_user_day(
        &self,
        user_id: &UserId,
        date: NaiveDate,
    ) -> Result<Vec<InteractionEvent>, StorageError>;
}

/// Typed repository interface for `dashboard_section_analytics`, keyed by (user, section, date).
pub trait DashboardAnalyticsRepo {
    fn upsert_section_analytics_row(
        &mut self,
        row: SectionAnalytics,
    ) -> Result<UpsertOutcome, StorageError>;
    fn section_analytics_rows_for_user_range(
        &self,
        user_id: &UserId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<SectionAnalytics>, StorageError>;
}

/// Typed repository interface for `dashboard_layout_preferences`, one row per user.
pub trait DashboardLayoutRepo {
    fn layout_preference_row(
        &self,
        user_id: &UserId,
    ) -> Result<Option<LayoutPreference>, StorageError>;
    fn upsert_layout_preference_row(
        &mut self,
        pref: LayoutPreference,
    ) -> Result<UpsertOutcome, StorageError>;
    fn layout_preference_user_ids(&self) -> Result<Vec<UserId>, StorageError>;
}

impl ProfilesRepo for DashboardStore {
    fn insert_profile_row(&mut self, record: ProfileRecord) -> Result<(), StorageError> {
        self.insert_profile(record)
    }

    fn profile_user_ids(&self) -> Result<Vec<UserId>, StorageError> {
        Ok(self.profile_ids())
    }
}

impl DashboardInteractionsRepo for DashboardStore {
    fn append_interaction_row(&mut self, event: InteractionEvent) -> Result<u64, StorageError> {
        self.append_interaction(event)
    }

    fn interaction_rows_for_user_day(
        &self,
        user_id: &UserId,
        date: NaiveDate,
    ) -> Result<Vec<InteractionEvent>, StorageError> {
        Ok(self.interactions_for_user_day(user_id, date))
    }
}

impl DashboardAnalyticsRepo for DashboardStore {
    fn upsert_section_analytics_row(
        &mut self,
        row: SectionAnalytics,
    ) -> Result<UpsertOutcome, StorageError> {
        self.upsert_section_analytics(row)
    }

    fn section_analytics_rows_for_user_range(
        &self,
        user_id: &UserId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<SectionAnalytics>, StorageError> {
        Ok(self.section_analytics_for_user_range(user_id, from, to))
    }
}

impl DashboardLayoutRepo for DashboardStore {
    fn layout_preference_row(
        &self,
        user_id: &UserId,
    ) -> Result<Option<LayoutPreference>, StorageError> {
        Ok(self.layout_preference(user_id).cloned())
    }

    fn upsert_layout_preference_row(
        &mut self,
        pref: LayoutPreference,
    ) -> Result<UpsertOutcome, StorageError> {
        self.upsert_layout_preference(pref)
    }

    fn layout_preference_user_ids(&self) -> Result<Vec<UserId>, StorageError> {
        Ok(self.layout_preference_ids())
    }
}
