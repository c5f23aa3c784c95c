#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{ContractViolation, SchemaVersion, Validate};

pub const DASHBOARD_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

pub const ENGAGEMENT_SCORE_MIN: f64 = 0.0;
pub const ENGAGEMENT_SCORE_MAX: f64 = 100.0;
pub const MAX_SECTIONS_PER_LAYOUT: usize = 64;
pub const MAX_INTERACTION_DURATION_SECONDS: f64 = 86_400.0;

/// Canonical dashboard catalog, used for users without a stored layout and on reset.
pub const DEFAULT_SECTION_ORDER: &[&str] = &[
    "mood_check_in",
    "daily_insights",
    "journal",
    "henry_chat",
    "wellness_goals",
    "upcoming_sessions",
    "community_groups",
    "mirror_ai",
];

pub fn default_section_order() -> Vec<SectionId> {
    DEFAULT_SECTION_ORDER
        .iter()
        .map(|id| SectionId((*id).to_string()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "user_id",
                reason: "must not be empty",
            });
        }
        if id.len() > 128 {
            return Err(ContractViolation::InvalidValue {
                field: "user_id",
                reason: "must be <= 128 chars",
            });
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for UserId {
    type Error = ContractViolation;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UserId> for String {
    fn from(value: UserId) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SectionId(String);

impl SectionId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "section_id",
                reason: "must not be empty",
            });
        }
        if id.len() > 64 {
            return Err(ContractViolation::InvalidValue {
                field: "section_id",
                reason: "must be <= 64 chars",
            });
        }
        if id.chars().any(char::is_whitespace) {
            return Err(ContractViolation::InvalidValue {
                field: "section_id",
                reason: "must not contain whitespace",
            });
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SectionId {
    type Error = ContractViolation;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SectionId> for String {
    fn from(value: SectionId) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum InteractionType {
    View,
    Click,
    Expand,
    Scroll,
    Other(String),
}

impl InteractionType {
    pub fn parse(raw: &str) -> Result<Self, ContractViolation> {
        let normalized = raw.trim().to_ascii_lowercase();
        let parsed = match normalized.as_str() {
            "view" => InteractionType::View,
            "click" => InteractionType::Click,
            "expand" => InteractionType::Expand,
            "scroll" => InteractionType::Scroll,
            _ => InteractionType::Other(normalized),
        };
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn as_str(&self) -> &str {
        match self {
            InteractionType::View => "view",
            InteractionType::Click => "click",
            InteractionType::Expand => "expand",
            InteractionType::Scroll => "scroll",
            InteractionType::Other(kind) => kind.as_str(),
        }
    }

    pub fn is_view(&self) -> bool {
        matches!(self, InteractionType::View)
    }
}

impl Validate for InteractionType {
    fn validate(&self) -> Result<(), ContractViolation> {
        if let InteractionType::Other(kind) = self {
            if kind.is_empty() {
                return Err(ContractViolation::InvalidValue {
                    field: "interaction_type",
                    reason: "must not be empty",
                });
            }
            if kind.len() > 32 {
                return Err(ContractViolation::InvalidValue {
                    field: "interaction_type",
                    reason: "must be <= 32 chars",
                });
            }
            if !kind
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
            {
                return Err(ContractViolation::InvalidValue {
                    field: "interaction_type",
                    reason: "must be lowercase ascii, digits or '_'",
                });
            }
        }
        Ok(())
    }
}

impl TryFrom<String> for InteractionType {
    type Error = ContractViolation;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<InteractionType> for String {
    fn from(value: InteractionType) -> Self {
        value.as_str().to_string()
    }
}

/// One client instrumentation event. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub schema_version: SchemaVersion,
    pub user_id: UserId,
    pub section_id: SectionId,
    pub interaction_type: InteractionType,
    pub duration_seconds: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl InteractionEvent {
    pub fn v1(
        user_id: UserId,
        section_id: SectionId,
        interaction_type: InteractionType,
        duration_seconds: Option<f64>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, ContractViolation> {
        let event = Self {
            schema_version: DASHBOARD_CONTRACT_VERSION,
            user_id,
            section_id,
            interaction_type,
            duration_seconds,
            timestamp,
        };
        event.validate()?;
        Ok(event)
    }

    pub fn utc_day(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    pub fn duration_or_zero(&self) -> f64 {
        self.duration_seconds.unwrap_or(0.0)
    }
}

impl Validate for InteractionEvent {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != DASHBOARD_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "interaction_event.schema_version",
                reason: "must match DASHBOARD_CONTRACT_VERSION",
            });
        }
        self.interaction_type.validate()?;
        if let Some(duration) = self.duration_seconds {
            if !duration.is_finite() {
                return Err(ContractViolation::NotFinite {
                    field: "interaction_event.duration_seconds",
                });
            }
            if !(0.0..=MAX_INTERACTION_DURATION_SECONDS).contains(&duration) {
                return Err(ContractViolation::InvalidRange {
                    field: "interaction_event.duration_seconds",
                    min: 0.0,
                    max: MAX_INTERACTION_DURATION_SECONDS,
                    got: duration,
                });
            }
        }
        Ok(())
    }
}

/// Daily per-section rollup. Keyed by `(user_id, section_id, date)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionAnalytics {
    pub schema_version: SchemaVersion,
    pub user_id: UserId,
    pub section_id: SectionId,
    pub date: NaiveDate,
    pub total_views: u32,
    pub total_time_seconds: f64,
    pub interaction_count: u32,
    pub engagement_score: f64,
}

impl SectionAnalytics {
    #[allow(clippy::too_many_arguments)]
    pub fn v1(
        user_id: UserId,
        section_id: SectionId,
        date: NaiveDate,
        total_views: u32,
        total_time_seconds: f64,
        interaction_count: u32,
        engagement_score: f64,
    ) -> Result<Self, ContractViolation> {
        let row = Self {
            schema_version: DASHBOARD_CONTRACT_VERSION,
            user_id,
            section_id,
            date,
            total_views,
            total_time_seconds,
            interaction_count,
            engagement_score,
        };
        row.validate()?;
        Ok(row)
    }
}

impl Validate for SectionAnalytics {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != DASHBOARD_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "section_analytics.schema_version",
                reason: "must match DASHBOARD_CONTRACT_VERSION",
            });
        }
        if self.total_views > self.interaction_count {
            return Err(ContractViolation::InvalidValue {
                field: "section_analytics.total_views",
                reason: "must be <= interaction_count",
            });
        }
        if !self.total_time_seconds.is_finite() {
            return Err(ContractViolation::NotFinite {
                field: "section_analytics.total_time_seconds",
            });
        }
        if self.total_time_seconds < 0.0 {
            return Err(ContractViolation::InvalidRange {
                field: "section_analytics.total_time_seconds",
                min: 0.0,
                max: f64::MAX,
                got: self.total_time_seconds,
            });
        }
        if !self.engagement_score.is_finite() {
            return Err(ContractViolation::NotFinite {
                field: "section_analytics.engagement_score",
            });
        }
        if !(ENGAGEMENT_SCORE_MIN..=ENGAGEMENT_SCORE_MAX).contains(&self.engagement_score) {
            return Err(ContractViolation::InvalidRange {
                field: "section_analytics.engagement_score",
                min: ENGAGEMENT_SCORE_MIN,
                max: ENGAGEMENT_SCORE_MAX,
                got: self.engagement_score,
            });
        }
        Ok(())
    }
}

/// One row per user. Written by manual customization or by the layout optimizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutPreference {
    pub schema_version: SchemaVersion,
    pub user_id: UserId,
    pub section_order: Vec<SectionId>,
    pub is_custom: bool,
    pub is_locked: bool,
    pub learning_enabled: bool,
    pub last_auto_adjustment: Option<DateTime<Utc>>,
    /// Last manual save. Only drag-and-drop saves set it; the optimizer cooldown runs from here.
    #[serde(default)]
    pub customized_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl LayoutPreference {
    #[allow(clippy::too_many_arguments)]
    pub fn v1(
        user_id: UserId,
        section_order: Vec<SectionId>,
        is_custom: bool,
        is_locked: bool,
        learning_enabled: bool,
        last_auto_adjustment: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, ContractViolation> {
        let pref = Self {
            schema_version: DASHBOARD_CONTRACT_VERSION,
            user_id,
            section_order,
            is_custom,
            is_locked,
            learning_enabled,
            last_auto_adjustment,
            customized_at: is_custom.then_some(updated_at),
            updated_at,
        };
        pref.validate()?;
        Ok(pref)
    }

    /// Default catalog order with learning on; never custom, never locked.
    pub fn default_for(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            schema_version: DASHBOARD_CONTRACT_VERSION,
            user_id,
            section_order: default_section_order(),
            is_custom: false,
            is_locked: false,
            learning_enabled: true,
            last_auto_adjustment: None,
            customized_at: None,
            updated_at: now,
        }
    }
}

impl Validate for LayoutPreference {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != DASHBOARD_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "layout_preference.schema_version",
                reason: "must match DASHBOARD_CONTRACT_VERSION",
            });
        }
        validate_section_order(&self.section_order)?;
        if let Some(adjusted_at) = self.last_auto_adjustment {
            if adjusted_at > self.updated_at {
                return Err(ContractViolation::InvalidValue {
                    field: "layout_preference.last_auto_adjustment",
                    reason: "must be <= updated_at",
                });
            }
        }
        if let Some(customized_at) = self.customized_at {
            if !self.is_custom {
                return Err(ContractViolation::InvalidValue {
                    field: "layout_preference.customized_at",
                    reason: "must be absent unless is_custom",
                });
            }
            if customized_at > self.updated_at {
                return Err(ContractViolation::InvalidValue {
                    field: "layout_preference.customized_at",
                    reason: "must be <= updated_at",
                });
            }
        }
        Ok(())
    }
}

pub fn validate_section_order(order: &[SectionId]) -> Result<(), ContractViolation> {
    if order.len() > MAX_SECTIONS_PER_LAYOUT {
        return Err(ContractViolation::InvalidValue {
            field: "layout_preference.section_order",
            reason: "must be <= 64 sections",
        });
    }
    let mut seen = BTreeSet::new();
    if order.iter().any(|section| !seen.insert(section)) {
        return Err(ContractViolation::InvalidValue {
            field: "layout_preference.section_order",
            reason: "must not contain duplicate section ids",
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub schema_version: SchemaVersion,
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ProfileRecord {
    pub fn v1(
        user_id: UserId,
        display_name: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ContractViolation> {
        let profile = Self {
            schema_version: DASHBOARD_CONTRACT_VERSION,
            user_id,
            display_name,
            created_at,
        };
        profile.validate()?;
        Ok(profile)
    }
}

impl Validate for ProfileRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != DASHBOARD_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "profile.schema_version",
                reason: "must match DASHBOARD_CONTRACT_VERSION",
            });
        }
        if let Some(name) = &self.display_name {
            if name.trim().is_empty() {
                return Err(ContractViolation::InvalidValue {
                    field: "profile.display_name",
                    reason: "must not be blank when present",
                });
            }
            if name.len() > 128 {
                return Err(ContractViolation::InvalidValue {
                    field: "profile.display_name",
                    reason: "must be <= 128 chars",
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    fn section(id: &str) -> SectionId {
        SectionId::new(id).unwrap()
    }

    #[test]
    fn at_dashboard_01_interaction_type_parses_known_and_other_kinds() {
        assert_eq!(InteractionType::parse(" VIEW ").unwrap(), InteractionType::View);
        assert_eq!(
            InteractionType::parse("hover").unwrap(),
            InteractionType::Other("hover".to_string())
        );
        assert!(InteractionType::parse("").is_err());
        assert!(InteractionType::parse("drag drop").is_err());
    }

    #[test]
    fn at_dashboard_02_negative_or_non_finite_duration_is_rejected() {
        let user = UserId::new("user_1").unwrap();
        let negative = InteractionEvent::v1(
            user.clone(),
            section("journal"),
            InteractionType::View,
            Some(-1.0),
            ts(1, 9),
        );
        assert!(matches!(
            negative,
            Err(ContractViolation::InvalidRange { .. })
        ));
        let nan = InteractionEvent::v1(
            user,
            section("journal"),
            InteractionType::View,
            Some(f64::NAN),
            ts(1, 9),
        );
        assert!(matches!(nan, Err(ContractViolation::NotFinite { .. })));
    }

    #[test]
    fn at_dashboard_03_analytics_score_must_stay_within_bounds() {
        let row = SectionAnalytics::v1(
            UserId::new("user_1").unwrap(),
            section("journal"),
            ts(1, 0).date_naive(),
            1,
            30.0,
            1,
            100.5,
        );
        assert!(matches!(row, Err(ContractViolation::InvalidRange { .. })));
    }

    #[test]
    fn at_dashboard_04_layout_rejects_duplicate_sections() {
        let pref = LayoutPreference::v1(
            UserId::new("user_1").unwrap(),
            vec![section("journal"), section("journal")],
            true,
            false,
            true,
            None,
            ts(1, 0),
        );
        assert!(pref.is_err());
    }

    #[test]
    fn at_dashboard_05_default_layout_uses_catalog_order() {
        let pref = LayoutPreference::default_for(UserId::new("user_1").unwrap(), ts(1, 0));
        assert!(pref.validate().is_ok());
        assert_eq!(pref.section_order.len(), DEFAULT_SECTION_ORDER.len());
        assert_eq!(pref.section_order[0].as_str(), DEFAULT_SECTION_ORDER[0]);
        assert!(pref.learning_enabled);
        assert!(!pref.is_custom && !pref.is_locked);
        assert_eq!(pref.customized_at, None);
    }

    #[test]
    fn at_dashboard_07_customized_at_tracks_manual_saves_only() {
        let custom = LayoutPreference::v1(
            UserId::new("user_1").unwrap(),
            vec![section("journal")],
            true,
            false,
            true,
            None,
            ts(2, 0),
        )
        .unwrap();
        assert_eq!(custom.customized_at, Some(ts(2, 0)));

        let mut stray = LayoutPreference::default_for(UserId::new("user_1").unwrap(), ts(1, 0));
        stray.customized_at = Some(ts(1, 0));
        assert!(stray.validate().is_err());

        let legacy: LayoutPreference = serde_json::from_value(serde_json::json!({
            "schema_version": custom.schema_version,
            "user_id": "user_1",
            "section_order": ["journal"],
            "is_custom": false,
            "is_locked": false,
            "learning_enabled": true,
            "last_auto_adjustment": null,
            "updated_at": ts(1, 0),
        }))
        .unwrap();
        assert_eq!(legacy.customized_at, None);
    }

    #[test]
    fn at_dashboard_06_ids_reject_invalid_wire_values() {
        let ok: SectionId = serde_json::from_str("\"journal\"").unwrap();
        assert_eq!(ok.as_str(), "journal");
        assert!(serde_json::from_str::<SectionId>("\"\"").is_err());
        assert!(serde_json::from_str::<UserId>("\"   \"").is_err());
        let kind: InteractionType = serde_json::from_str("\"click\"").unwrap();
        assert_eq!(kind, InteractionType::Click);
        assert_eq!(serde_json::to_string(&kind).unwrap(), "\"click\"");
    }
}
