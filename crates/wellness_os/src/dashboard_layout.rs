#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use tracing::info;
use wellness_engines::layout::{summarize_engagement, SectionEngagement};
use wellness_kernel_contracts::dashboard::{
    default_section_order, validate_section_order, LayoutPreference, SectionId, UserId,
};
use wellness_kernel_contracts::{ContractViolation, Validate};
use wellness_storage::repo::{DashboardAnalyticsRepo, DashboardLayoutRepo};

use crate::batch::JobError;
use crate::layout_learning::LayoutLearningConfig;

/// Stored preference, or the catalog default when the user never customized.
pub fn layout_for<S>(
    store: &S,
    user_id: &UserId,
    now: DateTime<Utc>,
) -> Result<LayoutPreference, JobError>
where
    S: DashboardLayoutRepo,
{
    Ok(store
        .layout_preference_row(user_id)?
        .unwrap_or_else(|| LayoutPreference::default_for(user_id.clone(), now)))
}

/// Drag-and-drop save. Marks the layout custom, which starts the optimizer cooldown.
pub fn save_custom_layout<S>(
    store: &mut S,
    user_id: &UserId,
    section_order: Vec<SectionId>,
    now: DateTime<Utc>,
) -> Result<LayoutPreference, JobError>
where
    S: DashboardLayoutRepo,
{
    if section_order.is_empty() {
        return Err(ContractViolation::InvalidValue {
            field: "layout_preference.section_order",
            reason: "must not be empty",
        }
        .into());
    }
    validate_section_order(&section_order)?;
    let mut pref = layout_for(store, user_id, now)?;
    pref.section_order = section_order;
    pref.is_custom = true;
    pref.customized_at = Some(now);
    pref.updated_at = now;
    pref.validate()?;
    store.upsert_layout_preference_row(pref.clone())?;
    info!(user_id = %user_id, sections = pref.section_order.len(), "custom dashboard layout saved");
    Ok(pref)
}

/// Flag toggles leave `customized_at` alone, so they never restart the cooldown.
pub fn set_layout_flags<S>(
    store: &mut S,
    user_id: &UserId,
    is_locked: Option<bool>,
    learning_enabled: Option<bool>,
    now: DateTime<Utc>,
) -> Result<LayoutPreference, JobError>
where
    S: DashboardLayoutRepo,
{
    let mut pref = layout_for(store, user_id, now)?;
    if let Some(locked) = is_locked {
        pref.is_locked = locked;
    }
    if let Some(enabled) = learning_enabled {
        pref.learning_enabled = enabled;
    }
    pref.updated_at = now;
    store.upsert_layout_preference_row(pref.clone())?;
    info!(
        user_id = %user_id,
        is_locked = pref.is_locked,
        learning_enabled = pref.learning_enabled,
        "dashboard layout flags updated"
    );
    Ok(pref)
}

/// Back to the catalog order; flags are kept, the custom marker is cleared.
pub fn reset_layout<S>(
    store: &mut S,
    user_id: &UserId,
    now: DateTime<Utc>,
) -> Result<LayoutPreference, JobError>
where
    S: DashboardLayoutRepo,
{
    let mut pref = layout_for(store, user_id, now)?;
    pref.section_order = default_section_order();
    pref.is_custom = false;
    pref.customized_at = None;
    pref.updated_at = now;
    store.upsert_layout_preference_row(pref.clone())?;
    info!(user_id = %user_id, "dashboard layout reset to default");
    Ok(pref)
}

pub fn engagement_summary<S>(
    store: &S,
    config: &LayoutLearningConfig,
    user_id: &UserId,
    now: DateTime<Utc>,
) -> Result<Vec<SectionEngagement>, JobError>
where
    S: DashboardLayoutRepo + DashboardAnalyticsRepo,
{
    let pref = layout_for(store, user_id, now)?;
    let (from, to) = config.window(now);
    let rows = store.section_analytics_rows_for_user_range(user_id, from, to)?;
    Ok(summarize_engagement(&pref.section_order, &rows))
}
