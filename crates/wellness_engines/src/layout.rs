#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use wellness_kernel_contracts::dashboard::{
    LayoutPreference, SectionAnalytics, SectionId, MAX_SECTIONS_PER_LAYOUT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayoutGate {
    Eligible,
    SkipLocked,
    SkipLearningDisabled,
    SkipRecentCustom,
}

impl LayoutGate {
    pub fn as_str(self) -> &'static str {
        match self {
            LayoutGate::Eligible => "ELIGIBLE",
            LayoutGate::SkipLocked => "SKIPPED_LOCKED",
            LayoutGate::SkipLearningDisabled => "SKIPPED_LEARNING_DISABLED",
            LayoutGate::SkipRecentCustom => "SKIPPED_RECENT_CUSTOM",
        }
    }
}

/// Decides whether the optimizer may touch this preference at `now`.
///
/// A custom layout is protected while `now - customized_at < cooldown`. Optimizer
/// writes and flag toggles move `updated_at` but not `customized_at`.
pub fn layout_gate(pref: &LayoutPreference, now: DateTime<Utc>, cooldown: Duration) -> LayoutGate {
    if pref.is_locked {
        return LayoutGate::SkipLocked;
    }
    if !pref.learning_enabled {
        return LayoutGate::SkipLearningDisabled;
    }
    let recently_customized = pref
        .customized_at
        .is_some_and(|at| now.signed_duration_since(at) < cooldown);
    if pref.is_custom && recently_customized {
        return LayoutGate::SkipRecentCustom;
    }
    LayoutGate::Eligible
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionAverage {
    pub average_score: f64,
    pub days_observed: u32,
}

/// Mean engagement score per section across all supplied days.
pub fn average_scores(rows: &[SectionAnalytics]) -> BTreeMap<SectionId, SectionAverage> {
    let mut sums: BTreeMap<SectionId, (f64, u32)> = BTreeMap::new();
    for row in rows {
        let entry = sums.entry(row.section_id.clone()).or_insert((0.0, 0));
        entry.0 += row.engagement_score;
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(section_id, (sum, days))| {
            (
                section_id,
                SectionAverage {
                    average_score: sum / f64::from(days),
                    days_observed: days,
                },
            )
        })
        .collect()
}

/// Orders sections by descending average score.
///
/// The sort is stable, so equal averages keep their relative position from
/// `current_order` and repeated runs on unchanged data never flap. Sections in
/// `current_order` with no analytics rank as 0; analytics for sections outside
/// `current_order` are ignored unless `current_order` is empty, in which case the
/// scored sections are ranked starting from section-id order and only the top
/// `MAX_SECTIONS_PER_LAYOUT` are kept.
pub fn rank_sections(
    current_order: &[SectionId],
    averages: &BTreeMap<SectionId, SectionAverage>,
) -> Vec<SectionId> {
    let seeded = current_order.is_empty();
    let mut ranked: Vec<SectionId> = if seeded {
        averages.keys().cloned().collect()
    } else {
        current_order.to_vec()
    };
    let score_of = |section: &SectionId| {
        averages
            .get(section)
            .map(|avg| avg.average_score)
            .unwrap_or(0.0)
    };
    ranked.sort_by(|a, b| score_of(b).total_cmp(&score_of(a)));
    if seeded {
        ranked.truncate(MAX_SECTIONS_PER_LAYOUT);
    }
    ranked
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutPlan {
    Skip(LayoutGate),
    NoAnalytics,
    Unchanged,
    Reorder { new_order: Vec<SectionId> },
}

/// Full optimizer decision for one user, minus the write.
pub fn plan_layout(
    pref: &LayoutPreference,
    window_rows: &[SectionAnalytics],
    now: DateTime<Utc>,
    cooldown: Duration,
) -> LayoutPlan {
    let gate = layout_gate(pref, now, cooldown);
    if gate != LayoutGate::Eligible {
        return LayoutPlan::Skip(gate);
    }
    if window_rows.is_empty() {
        return LayoutPlan::NoAnalytics;
    }
    let averages = average_scores(window_rows);
    let new_order = rank_sections(&pref.section_order, &averages);
    if new_order == pref.section_order {
        LayoutPlan::Unchanged
    } else {
        LayoutPlan::Reorder { new_order }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionEngagement {
    pub section_id: SectionId,
    pub average_score: f64,
    pub days_observed: u32,
}

/// Per-section averages listed in the order the optimizer would choose.
pub fn summarize_engagement(
    current_order: &[SectionId],
    window_rows: &[SectionAnalytics],
) -> Vec<SectionEngagement> {
    let averages = average_scores(window_rows);
    rank_sections(current_order, &averages)
        .into_iter()
        .map(|section_id| {
            let (average_score, days_observed) = averages
                .get(&section_id)
                .map(|avg| (avg.average_score, avg.days_observed))
                .unwrap_or((0.0, 0));
            SectionEngagement {
                section_id,
                average_score,
                days_observed,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use wellness_kernel_contracts::dashboard::{validate_section_order, UserId};

    fn user() -> UserId {
        UserId::new("user_layout").unwrap()
    }

    fn s(id: &str) -> SectionId {
        SectionId::new(id).unwrap()
    }

    fn order(ids: &[&str]) -> Vec<SectionId> {
        ids.iter().map(|id| s(id)).collect()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 20, 12, 0, 0).unwrap()
    }

    fn pref(section_order: Vec<SectionId>, updated_days_ago: i64) -> LayoutPreference {
        LayoutPreference::v1(
            user(),
            section_order,
            false,
            false,
            true,
            None,
            now() - Duration::days(updated_days_ago),
        )
        .unwrap()
    }

    fn row(section: &str, day: u32, score: f64) -> SectionAnalytics {
        SectionAnalytics::v1(
            user(),
            s(section),
            NaiveDate::from_ymd_opt(2026, 6, day).unwrap(),
            1,
            0.0,
            1,
            score,
        )
        .unwrap()
    }

    #[test]
    fn at_layout_01_gate_respects_lock_learning_and_cooldown() {
        let cooldown = Duration::days(7);
        let mut p = pref(order(&["a"]), 1);
        assert_eq!(layout_gate(&p, now(), cooldown), LayoutGate::Eligible);

        p.is_custom = true;
        p.customized_at = Some(p.updated_at);
        assert_eq!(layout_gate(&p, now(), cooldown), LayoutGate::SkipRecentCustom);

        p.customized_at = Some(now() - Duration::days(7));
        assert_eq!(layout_gate(&p, now(), cooldown), LayoutGate::Eligible);

        p.learning_enabled = false;
        assert_eq!(
            layout_gate(&p, now(), cooldown),
            LayoutGate::SkipLearningDisabled
        );

        p.is_locked = true;
        assert_eq!(layout_gate(&p, now(), cooldown), LayoutGate::SkipLocked);
    }

    #[test]
    fn at_layout_02_averages_across_days() {
        let rows = vec![row("a", 1, 90.0), row("a", 2, 70.0), row("b", 1, 50.0)];
        let averages = average_scores(&rows);
        assert_eq!(averages[&s("a")].average_score, 80.0);
        assert_eq!(averages[&s("a")].days_observed, 2);
        assert_eq!(averages[&s("b")].average_score, 50.0);
    }

    #[test]
    fn at_layout_03_reorders_descending_by_average() {
        let rows = vec![row("a", 1, 80.0), row("b", 1, 50.0), row("c", 1, 20.0)];
        let plan = plan_layout(
            &pref(order(&["c", "b", "a"]), 30),
            &rows,
            now(),
            Duration::days(7),
        );
        assert_eq!(
            plan,
            LayoutPlan::Reorder {
                new_order: order(&["a", "b", "c"])
            }
        );
    }

    #[test]
    fn at_layout_04_identical_order_is_unchanged() {
        let rows = vec![row("a", 1, 80.0), row("b", 1, 50.0), row("c", 1, 20.0)];
        let plan = plan_layout(
            &pref(order(&["a", "b", "c"]), 30),
            &rows,
            now(),
            Duration::days(7),
        );
        assert_eq!(plan, LayoutPlan::Unchanged);
    }

    #[test]
    fn at_layout_05_ties_keep_prior_relative_order() {
        let rows = vec![row("a", 1, 40.0), row("b", 1, 40.0), row("c", 1, 60.0)];
        let averages = average_scores(&rows);
        assert_eq!(
            rank_sections(&order(&["b", "a", "c"]), &averages),
            order(&["c", "b", "a"])
        );
        assert_eq!(
            rank_sections(&order(&["a", "b", "c"]), &averages),
            order(&["c", "a", "b"])
        );
    }

    #[test]
    fn at_layout_06_unscored_sections_sink_and_unknown_sections_are_ignored() {
        let rows = vec![row("b", 1, 10.0), row("zzz_unknown", 1, 99.0)];
        let averages = average_scores(&rows);
        assert_eq!(
            rank_sections(&order(&["a", "b", "c"]), &averages),
            order(&["b", "a", "c"])
        );
    }

    #[test]
    fn at_layout_07_empty_order_ranks_scored_sections() {
        let rows = vec![row("x", 1, 10.0), row("y", 1, 30.0)];
        let averages = average_scores(&rows);
        assert_eq!(rank_sections(&[], &averages), order(&["y", "x"]));
    }

    #[test]
    fn at_layout_10_seeded_ranking_is_capped_to_layout_limit() {
        let rows: Vec<SectionAnalytics> = (0..MAX_SECTIONS_PER_LAYOUT + 6)
            .map(|i| row(&format!("section_{i:03}"), 1, (i % 100) as f64))
            .collect();
        let ranked = rank_sections(&[], &average_scores(&rows));
        assert_eq!(ranked.len(), MAX_SECTIONS_PER_LAYOUT);
        assert!(validate_section_order(&ranked).is_ok());
        assert_eq!(ranked[0].as_str(), "section_069");
    }

    #[test]
    fn at_layout_11_cooldown_ignores_updates_after_the_manual_save() {
        let cooldown = Duration::days(7);
        let mut p = pref(order(&["a", "b"]), 1);
        p.is_custom = true;
        p.customized_at = Some(now() - Duration::days(10));
        p.last_auto_adjustment = Some(now() - Duration::days(1));
        assert_eq!(layout_gate(&p, now(), cooldown), LayoutGate::Eligible);
    }

    #[test]
    fn at_layout_08_skip_and_no_analytics_plans() {
        let mut locked = pref(order(&["c", "b", "a"]), 30);
        locked.is_locked = true;
        let rows = vec![row("a", 1, 80.0)];
        assert_eq!(
            plan_layout(&locked, &rows, now(), Duration::days(7)),
            LayoutPlan::Skip(LayoutGate::SkipLocked)
        );
        assert_eq!(
            plan_layout(&pref(order(&["a"]), 30), &[], now(), Duration::days(7)),
            LayoutPlan::NoAnalytics
        );
    }

    #[test]
    fn at_layout_09_summary_follows_ranked_order() {
        let rows = vec![row("a", 1, 20.0), row("b", 1, 60.0), row("b", 2, 40.0)];
        let summary = summarize_engagement(&order(&["a", "b", "c"]), &rows);
        let ids: Vec<&str> = summary.iter().map(|e| e.section_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(summary[0].average_score, 50.0);
        assert_eq!(summary[0].days_observed, 2);
        assert_eq!(summary[2].days_observed, 0);
    }
}
