#![forbid(unsafe_code)]

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use wellness_kernel_contracts::dashboard::{
    InteractionEvent, LayoutPreference, ProfileRecord, SectionAnalytics, UserId,
};
use wellness_storage::dashboard::{DashboardStore, StorageError, UpsertOutcome};
use wellness_storage::repo::{
    DashboardAnalyticsRepo, DashboardInteractionsRepo, DashboardLayoutRepo, ProfilesRepo,
};

pub const JOURNAL_SCHEMA_VERSION: u8 = 1;

/// One accepted mutation, in the order it was applied.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", content = "row", rename_all = "snake_case")]
pub enum JournalRecord {
    Profile(ProfileRecord),
    Interaction(InteractionEvent),
    SectionAnalytics(SectionAnalytics),
    LayoutPreference(LayoutPreference),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct AdapterJournalEntry {
    schema_version: u8,
    record: JournalRecord,
}

impl AdapterJournalEntry {
    fn v1(record: JournalRecord) -> Self {
        Self {
            schema_version: JOURNAL_SCHEMA_VERSION,
            record,
        }
    }
}

/// Store wrapper that remembers every write that changed a table.
///
/// Jobs and layout operations run against this through the repository traits;
/// the runtime drains `pending` into the journal file once the call returns.
#[derive(Debug, Default)]
pub struct JournaledStore {
    store: DashboardStore,
    pending: Vec<JournalRecord>,
}

impl JournaledStore {
    pub fn new(store: DashboardStore) -> Self {
        Self {
            store,
            pending: Vec::new(),
        }
    }

    pub fn store(&self) -> &DashboardStore {
        &self.store
    }

    pub fn take_pending(&mut self) -> Vec<JournalRecord> {
        std::mem::take(&mut self.pending)
    }

    /// Puts records that failed to reach the journal back ahead of newer ones.
    pub fn restore_pending(&mut self, mut records: Vec<JournalRecord>) {
        records.append(&mut self.pending);
        self.pending = records;
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Applies a journaled record without re-recording it.
    pub fn replay(&mut self, record: JournalRecord) -> Result<(), StorageError> {
        match record {
            JournalRecord::Profile(profile) => self.store.insert_profile(profile),
            JournalRecord::Interaction(event) => self.store.append_interaction(event).map(|_| ()),
            JournalRecord::SectionAnalytics(row) => {
                self.store.upsert_section_analytics(row).map(|_| ())
            }
            JournalRecord::LayoutPreference(pref) => {
                self.store.upsert_layout_preference(pref).map(|_| ())
            }
        }
    }

    fn record_if_changed(&mut self, outcome: UpsertOutcome, record: JournalRecord) {
        if outcome != UpsertOutcome::Unchanged {
            self.pending.push(record);
        }
    }
}

impl ProfilesRepo for JournaledStore {
    fn insert_profile_row(&mut self, record: ProfileRecord) -> Result<(), StorageError> {
        self.store.insert_profile(record.clone())?;
        self.pending.push(JournalRecord::Profile(record));
        Ok(())
    }

    fn profile_user_ids(&self) -> Result<Vec<UserId>, StorageError> {
        self.store.profile_user_ids()
    }
}

impl DashboardInteractionsRepo for JournaledStore {
    fn append_interaction_row(&mut self, event: InteractionEvent) -> Result<u64, StorageError> {
        let seq = self.store.append_interaction(event.clone())?;
        self.pending.push(JournalRecord::Interaction(event));
        Ok(seq)
    }

    fn interaction_rows_for_user_day(
        &self,
        user_id: &UserId,
        date: NaiveDate,
    ) -> Result<Vec<InteractionEvent>, StorageError> {
        self.store.interaction_rows_for_user_day(user_id, date)
    }
}

impl DashboardAnalyticsRepo for JournaledStore {
    fn upsert_section_analytics_row(
        &mut self,
        row: SectionAnalytics,
    ) -> Result<UpsertOutcome, StorageError> {
        let outcome = self.store.upsert_section_analytics(row.clone())?;
        self.record_if_changed(outcome, JournalRecord::SectionAnalytics(row));
        Ok(outcome)
    }

    fn section_analytics_rows_for_user_range(
        &self,
        user_id: &UserId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<SectionAnalytics>, StorageError> {
        self.store
            .section_analytics_rows_for_user_range(user_id, from, to)
    }
}

impl DashboardLayoutRepo for JournaledStore {
    fn layout_preference_row(
        &self,
        user_id: &UserId,
    ) -> Result<Option<LayoutPreference>, StorageError> {
        self.store.layout_preference_row(user_id)
    }

    fn upsert_layout_preference_row(
        &mut self,
        pref: LayoutPreference,
    ) -> Result<UpsertOutcome, StorageError> {
        let outcome = self.store.upsert_layout_preference(pref.clone())?;
        self.record_if_changed(outcome, JournalRecord::LayoutPreference(pref));
        Ok(outcome)
    }

    fn layout_preference_user_ids(&self) -> Result<Vec<UserId>, StorageError> {
        self.store.layout_preference_user_ids()
    }
}

#[derive(Debug, Clone)]
pub struct JournalFile {
    path: PathBuf,
}

impl JournalFile {
    /// Creates the parent directory and an empty file when missing.
    pub fn open(path: PathBuf) -> Result<Self, String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                format!(
                    "failed to create adapter store directory '{}': {}",
                    parent.display(),
                    err
                )
            })?;
        }
        if !path.exists() {
            File::create(&path).map_err(|err| {
                format!(
                    "failed to create adapter store journal '{}': {}",
                    path.display(),
                    err
                )
            })?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of records applied.
    pub fn replay_into(&self, target: &mut JournaledStore) -> Result<usize, String> {
        let file = File::open(&self.path).map_err(|err| {
            format!(
                "failed to open adapter store journal '{}': {}",
                self.path.display(),
                err
            )
        })?;
        let mut applied = 0;
        for (line_no, line_result) in BufReader::new(file).lines().enumerate() {
            let line = line_result.map_err(|err| {
                format!(
                    "failed reading adapter store journal '{}' at line {}: {}",
                    self.path.display(),
                    line_no + 1,
                    err
                )
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: AdapterJournalEntry = serde_json::from_str(&line).map_err(|err| {
                format!(
                    "failed parsing adapter store journal '{}' at line {}: {}",
                    self.path.display(),
                    line_no + 1,
                    err
                )
            })?;
            if entry.schema_version != JOURNAL_SCHEMA_VERSION {
                return Err(format!(
                    "unsupported adapter store journal schema_version={} at line {}",
                    entry.schema_version,
                    line_no + 1
                ));
            }
            target
                .replay(entry.record)
                .map_err(|err| format!("journal replay failed at line {}: {}", line_no + 1, err))?;
            applied += 1;
        }
        Ok(applied)
    }

    pub fn append(&self, records: &[JournalRecord]) -> Result<(), String> {
        if records.is_empty() {
            return Ok(());
        }
        let mut buf = String::new();
        for record in records {
            let json = serde_json::to_string(&AdapterJournalEntry::v1(record.clone()))
                .map_err(|err| format!("failed to encode adapter journal entry: {err}"))?;
            buf.push_str(&json);
            buf.push('\n');
        }
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|err| {
                format!(
                    "failed opening adapter store journal '{}' for append: {}",
                    self.path.display(),
                    err
                )
            })?;
        file.write_all(buf.as_bytes())
            .and_then(|_| file.sync_data())
            .map_err(|err| {
                format!(
                    "failed writing adapter store journal '{}': {}",
                    self.path.display(),
                    err
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use wellness_kernel_contracts::dashboard::SectionId;

    fn user() -> UserId {
        UserId::new("journal_user").unwrap()
    }

    fn profile() -> ProfileRecord {
        ProfileRecord::v1(user(), None, Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap())
            .unwrap()
    }

    #[test]
    fn at_journal_01_unchanged_upserts_are_not_recorded() {
        let mut store = JournaledStore::default();
        store.insert_profile_row(profile()).unwrap();
        let row = SectionAnalytics::v1(
            user(),
            SectionId::new("journal").unwrap(),
            NaiveDate::from_ymd_opt(2026, 5, 2).unwrap(),
            1,
            30.0,
            1,
            11.0,
        )
        .unwrap();
        store.upsert_section_analytics_row(row.clone()).unwrap();
        store.upsert_section_analytics_row(row).unwrap();
        let pending = store.take_pending();
        assert_eq!(pending.len(), 2);
        assert!(matches!(pending[0], JournalRecord::Profile(_)));
        assert!(matches!(pending[1], JournalRecord::SectionAnalytics(_)));
        assert!(store.take_pending().is_empty());
    }

    #[test]
    fn at_journal_02_rejected_writes_are_not_recorded() {
        let mut store = JournaledStore::default();
        let pref = LayoutPreference::default_for(user(), Utc::now());
        assert!(store.upsert_layout_preference_row(pref).is_err());
        assert!(store.take_pending().is_empty());
    }

    #[test]
    fn at_journal_04_restored_records_stay_ahead_of_newer_writes() {
        let mut store = JournaledStore::default();
        store.insert_profile_row(profile()).unwrap();
        let unsent = store.take_pending();
        let event = InteractionEvent::v1(
            user(),
            SectionId::new("journal").unwrap(),
            wellness_kernel_contracts::dashboard::InteractionType::View,
            Some(10.0),
            Utc.with_ymd_and_hms(2026, 5, 2, 8, 0, 0).unwrap(),
        )
        .unwrap();
        store.append_interaction_row(event).unwrap();
        store.restore_pending(unsent);
        assert_eq!(store.pending_len(), 2);
        let pending = store.take_pending();
        assert!(matches!(pending[0], JournalRecord::Profile(_)));
        assert!(matches!(pending[1], JournalRecord::Interaction(_)));
    }

    #[test]
    fn at_journal_03_record_serializes_with_kind_tag() {
        let json = serde_json::to_value(JournalRecord::Profile(profile())).unwrap();
        assert_eq!(json["kind"], "profile");
        assert_eq!(json["row"]["user_id"], "journal_user");
    }
}
