#![forbid(unsafe_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use wellness_kernel_contracts::dashboard::{LayoutPreference, ProfileRecord, SectionId, UserId};
use wellness_storage::dashboard::{DashboardStore, StorageError, UpsertOutcome};
use wellness_storage::repo::{DashboardLayoutRepo, ProfilesRepo};

fn user(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

fn order(ids: &[&str]) -> Vec<SectionId> {
    ids.iter().map(|id| SectionId::new(*id).unwrap()).collect()
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 10, 12, 0, 0).unwrap()
}

fn seed_profile(store: &mut DashboardStore, user_id: UserId) {
    store
        .insert_profile_row(ProfileRecord::v1(user_id, Some("Sam".to_string()), now()).unwrap())
        .unwrap();
}

#[test]
fn at_layout_db_01_one_row_per_user() {
    let mut s = DashboardStore::new_in_memory();
    seed_profile(&mut s, user("u1"));

    let first =
        LayoutPreference::v1(user("u1"), order(&["a", "b"]), true, false, true, None, now())
            .unwrap();
    assert_eq!(
        s.upsert_layout_preference_row(first.clone()).unwrap(),
        UpsertOutcome::Inserted
    );
    assert_eq!(
        s.upsert_layout_preference_row(first).unwrap(),
        UpsertOutcome::Unchanged
    );

    let second = LayoutPreference::v1(
        user("u1"),
        order(&["b", "a"]),
        false,
        false,
        true,
        Some(now() + Duration::hours(1)),
        now() + Duration::hours(1),
    )
    .unwrap();
    assert_eq!(
        s.upsert_layout_preference_row(second).unwrap(),
        UpsertOutcome::Updated
    );

    let stored = s.layout_preference_row(&user("u1")).unwrap().unwrap();
    assert_eq!(stored.section_order, order(&["b", "a"]));
    assert_eq!(s.layout_preference_user_ids().unwrap(), vec![user("u1")]);
}

#[test]
fn at_layout_db_02_missing_profile_is_foreign_key_violation() {
    let mut s = DashboardStore::new_in_memory();
    let pref = LayoutPreference::default_for(user("ghost"), now());
    assert!(matches!(
        s.upsert_layout_preference_row(pref),
        Err(StorageError::ForeignKeyViolation { .. })
    ));
    assert!(s.layout_preference_row(&user("ghost")).unwrap().is_none());
}

#[test]
fn at_layout_db_03_invalid_row_is_contract_violation() {
    let mut s = DashboardStore::new_in_memory();
    seed_profile(&mut s, user("u1"));
    let mut pref = LayoutPreference::default_for(user("u1"), now());
    pref.section_order = order(&["a", "a"]);
    assert!(matches!(
        s.upsert_layout_preference_row(pref),
        Err(StorageError::ContractViolation(_))
    ));
}
