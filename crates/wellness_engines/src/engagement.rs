#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use chrono::NaiveDate;
use wellness_kernel_contracts::dashboard::{
    InteractionEvent, SectionAnalytics, SectionId, UserId, ENGAGEMENT_SCORE_MAX,
    ENGAGEMENT_SCORE_MIN,
};
use wellness_kernel_contracts::ContractViolation;

pub const VIEW_POINTS: f64 = 10.0;
pub const VIEW_CAP: f64 = 30.0;
pub const SECONDS_PER_TIME_POINT: f64 = 60.0;
pub const TIME_CAP: f64 = 40.0;
pub const INTERACTION_POINTS: f64 = 2.0;
pub const INTERACTION_CAP: f64 = 30.0;

/// Capped weighted sum; each dimension is bounded so the total stays in `[0, 100]`.
pub fn engagement_score(total_views: u32, total_time_seconds: f64, interaction_count: u32) -> f64 {
    let views = (f64::from(total_views) * VIEW_POINTS).min(VIEW_CAP);
    // NaN collapses to 0 through max(), +inf saturates at the cap.
    let time = (total_time_seconds.max(0.0) / SECONDS_PER_TIME_POINT).min(TIME_CAP);
    let interactions = (f64::from(interaction_count) * INTERACTION_POINTS).min(INTERACTION_CAP);
    (views + time + interactions).clamp(ENGAGEMENT_SCORE_MIN, ENGAGEMENT_SCORE_MAX)
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct SectionDayTotals {
    total_views: u32,
    total_time_seconds: f64,
    interaction_count: u32,
}

/// Rolls one user's events for one UTC day into per-section analytics rows.
///
/// Events belonging to other users or other days are ignored, so callers may pass
/// a wider slice than strictly needed. Output is ordered by section id.
pub fn rollup_day(
    user_id: &UserId,
    date: NaiveDate,
    events: &[InteractionEvent],
) -> Result<Vec<SectionAnalytics>, ContractViolation> {
    let mut totals: BTreeMap<&SectionId, SectionDayTotals> = BTreeMap::new();
    for event in events
        .iter()
        .filter(|e| &e.user_id == user_id && e.utc_day() == date)
    {
        let entry = totals.entry(&event.section_id).or_default();
        if event.interaction_type.is_view() {
            entry.total_views = entry.total_views.saturating_add(1);
        }
        entry.total_time_seconds += event.duration_or_zero();
        entry.interaction_count = entry.interaction_count.saturating_add(1);
    }

    totals
        .into_iter()
        .map(|(section_id, t)| {
            SectionAnalytics::v1(
                user_id.clone(),
                section_id.clone(),
                date,
                t.total_views,
                t.total_time_seconds,
                t.interaction_count,
                engagement_score(t.total_views, t.total_time_seconds, t.interaction_count),
            )
        })
        .collect()
}
