#![forbid(unsafe_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use wellness_kernel_contracts::dashboard::{
    InteractionEvent, InteractionType, ProfileRecord, SectionAnalytics, SectionId, UserId,
};
use wellness_storage::dashboard::{DashboardStore, StorageError, UpsertOutcome};
use wellness_storage::repo::{DashboardAnalyticsRepo, DashboardInteractionsRepo, ProfilesRepo};

fn user(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

fn section(id: &str) -> SectionId {
    SectionId::new(id).unwrap()
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, day, hour, 0, 0).unwrap()
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 4, day).unwrap()
}

fn seed_profile(store: &mut DashboardStore, user_id: UserId) {
    store
        .insert_profile_row(ProfileRecord::v1(user_id, None, at(1, 0)).unwrap())
        .unwrap();
}

fn view(user_id: &str, section_id: &str, ts: DateTime<Utc>) -> InteractionEvent {
    InteractionEvent::v1(
        user(user_id),
        section(section_id),
        InteractionType::View,
        Some(45.0),
        ts,
    )
    .unwrap()
}

fn analytics(user_id: &str, section_id: &str, day: u32, score: f64) -> SectionAnalytics {
    SectionAnalytics::v1(user(user_id), section(section_id), date(day), 1, 45.0, 1, score).unwrap()
}

#[test]
fn at_dash_db_01_interaction_requires_profile() {
    let mut s = DashboardStore::new_in_memory();
    let err = s
        .append_interaction_row(view("ghost", "journal", at(2, 9)))
        .expect_err("missing profile must fail");
    assert!(matches!(err, StorageError::ForeignKeyViolation { .. }));
    assert!(s.interactions().is_empty());
}

#[test]
fn at_dash_db_02_duplicate_profile_is_rejected() {
    let mut s = DashboardStore::new_in_memory();
    seed_profile(&mut s, user("u1"));
    let dup = s.insert_profile_row(ProfileRecord::v1(user("u1"), None, at(2, 0)).unwrap());
    assert!(matches!(dup, Err(StorageError::DuplicateKey { .. })));
    assert_eq!(s.profile_user_ids().unwrap(), vec![user("u1")]);
}

#[test]
fn at_dash_db_03_interactions_are_indexed_by_user_and_utc_day() {
    let mut s = DashboardStore::new_in_memory();
    seed_profile(&mut s, user("u1"));
    seed_profile(&mut s, user("u2"));

    assert_eq!(s.append_interaction_row(view("u1", "journal", at(2, 9))).unwrap(), 1);
    assert_eq!(s.append_interaction_row(view("u1", "journal", at(2, 23))).unwrap(), 2);
    s.append_interaction_row(view("u1", "journal", at(3, 0))).unwrap();
    s.append_interaction_row(view("u2", "journal", at(2, 10))).unwrap();

    let day_two = s.interaction_rows_for_user_day(&user("u1"), date(2)).unwrap();
    assert_eq!(day_two.len(), 2);
    assert!(day_two.iter().all(|e| e.user_id == user("u1")));
    assert!(s
        .interaction_rows_for_user_day(&user("u1"), date(5))
        .unwrap()
        .is_empty());
    assert_eq!(s.interactions().len(), 4);
}

#[test]
fn at_dash_db_04_analytics_upsert_is_keyed_by_user_section_date() {
    let mut s = DashboardStore::new_in_memory();
    seed_profile(&mut s, user("u1"));

    assert_eq!(
        s.upsert_section_analytics_row(analytics("u1", "journal", 2, 20.0))
            .unwrap(),
        UpsertOutcome::Inserted
    );
    assert_eq!(
        s.upsert_section_analytics_row(analytics("u1", "journal", 2, 20.0))
            .unwrap(),
        UpsertOutcome::Unchanged
    );
    assert_eq!(
        s.upsert_section_analytics_row(analytics("u1", "journal", 2, 35.0))
            .unwrap(),
        UpsertOutcome::Updated
    );
    s.upsert_section_analytics_row(analytics("u1", "journal", 3, 10.0))
        .unwrap();

    assert_eq!(s.section_analytics_len(), 2);
    assert_eq!(
        s.section_analytics(&user("u1"), &section("journal"), date(2))
            .unwrap()
            .engagement_score,
        35.0
    );
}

#[test]
fn at_dash_db_05_analytics_range_read_is_inclusive() {
    let mut s = DashboardStore::new_in_memory();
    seed_profile(&mut s, user("u1"));
    seed_profile(&mut s, user("u2"));
    for day in 1..=5 {
        s.upsert_section_analytics_row(analytics("u1", "journal", day, f64::from(day)))
            .unwrap();
    }
    s.upsert_section_analytics_row(analytics("u2", "journal", 3, 99.0))
        .unwrap();

    let rows = s
        .section_analytics_rows_for_user_range(&user("u1"), date(2), date(4))
        .unwrap();
    let days: Vec<NaiveDate> = rows.iter().map(|r| r.date).collect();
    assert_eq!(days, vec![date(2), date(3), date(4)]);
}

#[test]
fn at_dash_db_06_analytics_requires_profile() {
    let mut s = DashboardStore::new_in_memory();
    let err = s
        .upsert_section_analytics_row(analytics("ghost", "journal", 2, 10.0))
        .expect_err("missing profile must fail");
    assert!(matches!(err, StorageError::ForeignKeyViolation { .. }));
}
