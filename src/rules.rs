//! Administrator-defined alert rules.
//!
//! A rule is stored flat ([`RuleRecord`]) so the admin API and the table
//! share one shape. Before evaluation it is parsed into an [`AlertRule`],
//! which carries two independent tagged variants: a [`RuleScope`] deciding
//! which buildings the rule covers and a [`RuleCondition`] deciding whether
//! a reading trips it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use thiserror::Error;
use tracing::warn;

use crate::model::{Building, Reading, Severity, UtilityType, Zone};
use crate::stats::{mean_and_sample_stddev, z_score};
use crate::storage;

/// Minimum history the z-score condition needs before it is evaluable.
pub const MIN_ZSCORE_SAMPLES: usize = 3;

/// Why a rule configuration was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("scope_type must be one of: global, zone, building (got '{0}')")]
    UnknownScope(String),

    #[error("condition_type must be one of: threshold, zscore, rate_of_change (got '{0}')")]
    UnknownCondition(String),

    #[error("building_id is required for building scope")]
    MissingBuilding,

    #[error("zone is required for zone scope")]
    MissingZone,

    #[error("comparison_window_days must be at least 1")]
    InvalidWindow,

    #[error("consecutive_count must be at least 1")]
    InvalidConsecutiveCount,
}

/// Which buildings a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleScope {
    Global,
    Zone(Zone),
    Building(i64),
}

impl RuleScope {
    pub fn parse(
        scope_type: &str,
        building_id: Option<i64>,
        zone: Option<Zone>,
    ) -> Result<Self, RuleValidationError> {
        match scope_type {
            "global" => Ok(RuleScope::Global),
            "zone" => zone.map(RuleScope::Zone).ok_or(RuleValidationError::MissingZone),
            "building" => building_id
                .map(RuleScope::Building)
                .ok_or(RuleValidationError::MissingBuilding),
            other => Err(RuleValidationError::UnknownScope(other.to_string())),
        }
    }

    /// A building without a zone never matches a zone-scoped rule.
    pub fn matches(&self, building: &Building) -> bool {
        match self {
            RuleScope::Global => true,
            RuleScope::Zone(zone) => building.zone == Some(*zone),
            RuleScope::Building(id) => building.id == *id,
        }
    }
}

/// The check a rule performs, with its own parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuleCondition {
    /// Value above `value`. With `consecutive_count > 1` the run of that many
    /// most recent readings must all be above it.
    Threshold { value: f64, consecutive_count: u32 },
    /// Z-score of the reading against the trailing `window_days` above `threshold`.
    ZScore { threshold: f64, window_days: u32 },
    /// Percentage increase over the previous reading above `percent`.
    RateOfChange { percent: f64 },
}

impl RuleCondition {
    pub fn parse(
        condition_type: &str,
        threshold_value: f64,
        comparison_window_days: i64,
        consecutive_count: i64,
    ) -> Result<Self, RuleValidationError> {
        match condition_type {
            "threshold" => Ok(RuleCondition::Threshold {
                value: threshold_value,
                consecutive_count: u32::try_from(consecutive_count)
                    .ok()
                    .filter(|count| *count >= 1)
                    .ok_or(RuleValidationError::InvalidConsecutiveCount)?,
            }),
            "zscore" => Ok(RuleCondition::ZScore {
                threshold: threshold_value,
                window_days: u32::try_from(comparison_window_days)
                    .ok()
                    .filter(|days| *days >= 1)
                    .ok_or(RuleValidationError::InvalidWindow)?,
            }),
            "rate_of_change" => Ok(RuleCondition::RateOfChange {
                percent: threshold_value,
            }),
            other => Err(RuleValidationError::UnknownCondition(other.to_string())),
        }
    }
}

/// A parsed, evaluable rule.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRule {
    pub id: i64,
    pub name: String,
    pub utility_type: UtilityType,
    pub scope: RuleScope,
    pub condition: RuleCondition,
    pub severity: Severity,
}

/// The configurable part of a rule, as submitted by admins and stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDraft {
    pub name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "default_scope_type")]
    pub scope_type: String,
    #[serde(default)]
    pub building_id: Option<i64>,
    #[serde(default)]
    pub zone: Option<Zone>,
    pub utility_type: UtilityType,
    pub condition_type: String,
    pub threshold_value: f64,
    #[serde(default = "default_window_days")]
    pub comparison_window_days: i64,
    #[serde(default = "default_consecutive_count")]
    pub consecutive_count: i64,
    #[serde(default)]
    pub severity: Severity,
}

fn default_true() -> bool {
    true
}

fn default_scope_type() -> String {
    "global".to_string()
}

fn default_window_days() -> i64 {
    7
}

fn default_consecutive_count() -> i64 {
    1
}

impl RuleDraft {
    /// Check the draft is internally consistent. Whether a referenced
    /// building exists is checked by the caller against storage.
    pub fn validate(&self) -> Result<(RuleScope, RuleCondition), RuleValidationError> {
        if self.name.trim().is_empty() {
            return Err(RuleValidationError::EmptyName);
        }
        if self.comparison_window_days < 1 {
            return Err(RuleValidationError::InvalidWindow);
        }
        if self.consecutive_count < 1 {
            return Err(RuleValidationError::InvalidConsecutiveCount);
        }

        let scope = RuleScope::parse(&self.scope_type, self.building_id, self.zone)?;
        let condition = RuleCondition::parse(
            &self.condition_type,
            self.threshold_value,
            self.comparison_window_days,
            self.consecutive_count,
        )?;

        Ok((scope, condition))
    }
}

/// Partial update for an existing rule; absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleUpdate {
    pub name: Option<String>,
    pub is_active: Option<bool>,
    pub scope_type: Option<String>,
    pub building_id: Option<i64>,
    pub zone: Option<Zone>,
    pub utility_type: Option<UtilityType>,
    pub condition_type: Option<String>,
    pub threshold_value: Option<f64>,
    pub comparison_window_days: Option<i64>,
    pub consecutive_count: Option<i64>,
    pub severity: Option<Severity>,
}

impl RuleUpdate {
    pub fn apply(self, mut draft: RuleDraft) -> RuleDraft {
        if let Some(name) = self.name {
            draft.name = name;
        }
        if let Some(is_active) = self.is_active {
            draft.is_active = is_active;
        }
        if let Some(scope_type) = self.scope_type {
            draft.scope_type = scope_type;
        }
        if let Some(building_id) = self.building_id {
            draft.building_id = Some(building_id);
        }
        if let Some(zone) = self.zone {
            draft.zone = Some(zone);
        }
        if let Some(utility_type) = self.utility_type {
            draft.utility_type = utility_type;
        }
        if let Some(condition_type) = self.condition_type {
            draft.condition_type = condition_type;
        }
        if let Some(threshold_value) = self.threshold_value {
            draft.threshold_value = threshold_value;
        }
        if let Some(days) = self.comparison_window_days {
            draft.comparison_window_days = days;
        }
        if let Some(count) = self.consecutive_count {
            draft.consecutive_count = count;
        }
        if let Some(severity) = self.severity {
            draft.severity = severity;
        }
        draft
    }
}

/// A stored rule.
#[derive(Debug, Clone, Serialize)]
pub struct RuleRecord {
    pub id: i64,
    #[serde(flatten)]
    pub draft: RuleDraft,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl RuleRecord {
    pub fn to_rule(&self) -> Result<AlertRule, RuleValidationError> {
        let (scope, condition) = self.draft.validate()?;
        Ok(AlertRule {
            id: self.id,
            name: self.draft.name.clone(),
            utility_type: self.draft.utility_type,
            scope,
            condition,
            severity: self.draft.severity,
        })
    }
}

/// Active rules for the reading's utility that parse cleanly.
///
/// Rows that no longer parse (e.g. an unknown condition kind written
/// straight to the table) are skipped with a warning and never trigger.
pub async fn load_active_rules(
    conn: &mut SqliteConnection,
    utility: UtilityType,
) -> anyhow::Result<Vec<AlertRule>> {
    let records = storage::active_rules(conn, utility).await?;

    Ok(records
        .iter()
        .filter_map(|record| match record.to_rule() {
            Ok(rule) => Some(rule),
            Err(e) => {
                warn!(rule_id = record.id, error = %e, "Skipping unevaluable alert rule");
                None
            }
        })
        .collect())
}

/// Evaluate `rule` against `reading`.
///
/// Returns the alert message when the condition holds, `None` when it does
/// not or cannot be evaluated for lack of history. Scope is not checked here.
pub async fn evaluate_condition(
    conn: &mut SqliteConnection,
    rule: &AlertRule,
    reading: &Reading,
) -> anyhow::Result<Option<String>> {
    let utility = reading.utility_type;
    let unit = &reading.unit;

    match rule.condition {
        RuleCondition::Threshold {
            value,
            consecutive_count,
        } if consecutive_count > 1 => {
            let recent =
                storage::latest_readings(conn, reading.building_id, utility, consecutive_count)
                    .await?;

            let run_above = recent.len() == consecutive_count as usize
                && recent.iter().all(|r| r.value > value);

            Ok(run_above.then(|| {
                format!(
                    "Rule '{}': last {} {} readings exceeded {:.2} {}",
                    rule.name, consecutive_count, utility, value, unit
                )
            }))
        }
        RuleCondition::Threshold { value, .. } => Ok((reading.value > value).then(|| {
            format!(
                "Rule '{}': {} consumption ({:.2} {}) exceeds {:.2} {}",
                rule.name,
                utility.label(),
                reading.value,
                unit,
                value,
                unit
            )
        })),
        RuleCondition::ZScore {
            threshold,
            window_days,
        } => {
            let since = reading.reading_date - Duration::days(i64::from(window_days));
            let history =
                storage::readings_since(conn, reading.building_id, utility, since, Some(reading.id))
                    .await?;

            if history.len() < MIN_ZSCORE_SAMPLES {
                return Ok(None);
            }

            let values: Vec<f64> = history.iter().map(|r| r.value).collect();
            let Some((mean, stddev)) = mean_and_sample_stddev(&values) else {
                return Ok(None);
            };

            let triggered = z_score(reading.value, mean, stddev).is_some_and(|z| z > threshold);

            Ok(triggered.then(|| {
                format!(
                    "Rule '{}': {} consumption deviates sharply from the last {} days",
                    rule.name,
                    utility.label(),
                    window_days
                )
            }))
        }
        RuleCondition::RateOfChange { percent } => {
            let previous = storage::previous_reading(
                conn,
                reading.building_id,
                utility,
                reading.reading_date,
            )
            .await?;

            let Some(previous) = previous.filter(|p| p.value > 0.0) else {
                return Ok(None);
            };

            let change = percent_change(previous.value, reading.value);

            Ok((change > percent).then(|| {
                format!(
                    "Rule '{}': {} consumption rose sharply compared to the previous reading",
                    rule.name,
                    utility.label()
                )
            }))
        }
    }
}

/// Percentage change from `previous` to `current`. `previous` must be positive.
pub fn percent_change(previous: f64, current: f64) -> f64 {
    (current - previous) / previous * 100.0
}
