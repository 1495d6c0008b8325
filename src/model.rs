//! Data models for SmartCampus.
//!
//! Buildings own the static per-utility thresholds, readings are immutable
//! observations, and alerts are the only rows the anomaly engine writes.
//! Alert rules live in [`crate::rules`] next to the matcher that reads them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when a stored or submitted label does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseKindError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseKindError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// The metered utility a reading, threshold, alert or rule refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UtilityType {
    Water,
    Electricity,
}

impl UtilityType {
    pub fn as_str(self) -> &'static str {
        match self {
            UtilityType::Water => "water",
            UtilityType::Electricity => "electricity",
        }
    }

    /// Physical unit recorded alongside every reading of this utility.
    pub fn unit(self) -> &'static str {
        match self {
            UtilityType::Water => "liters",
            UtilityType::Electricity => "kWh",
        }
    }

    /// Capitalized label used at the start of alert messages.
    pub fn label(self) -> &'static str {
        match self {
            UtilityType::Water => "Water",
            UtilityType::Electricity => "Electricity",
        }
    }
}

impl fmt::Display for UtilityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UtilityType {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "water" => Ok(UtilityType::Water),
            "electricity" => Ok(UtilityType::Electricity),
            other => Err(ParseKindError::new("utility type", other)),
        }
    }
}

/// Campus zone classification used to scope alert rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    Academic,
    /// Hostels.
    Residential,
    Research,
    Administration,
    /// Common facilities.
    Common,
}

impl Zone {
    pub fn as_str(self) -> &'static str {
        match self {
            Zone::Academic => "academic",
            Zone::Residential => "residential",
            Zone::Research => "research",
            Zone::Administration => "administration",
            Zone::Common => "common",
        }
    }
}

impl FromStr for Zone {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "academic" => Ok(Zone::Academic),
            "residential" => Ok(Zone::Residential),
            "research" => Ok(Zone::Research),
            "administration" => Ok(Zone::Administration),
            "common" => Ok(Zone::Common),
            other => Err(ParseKindError::new("zone", other)),
        }
    }
}

/// Which detector produced an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    /// Reading value above the building's static threshold.
    ThresholdBreach,
    /// Statistically significant jump against the trailing week.
    Spike,
    /// Sustained near-threshold usage over several days.
    ContinuousHigh,
    /// Raised by an administrator-defined rule.
    RuleTrigger,
}

impl AlertType {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertType::ThresholdBreach => "threshold_breach",
            AlertType::Spike => "spike",
            AlertType::ContinuousHigh => "continuous_high",
            AlertType::RuleTrigger => "rule_trigger",
        }
    }
}

impl FromStr for AlertType {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "threshold_breach" => Ok(AlertType::ThresholdBreach),
            "spike" => Ok(AlertType::Spike),
            "continuous_high" => Ok(AlertType::ContinuousHigh),
            "rule_trigger" => Ok(AlertType::RuleTrigger),
            other => Err(ParseKindError::new("alert type", other)),
        }
    }
}

/// Alert lifecycle. Alerts start `Pending`; operators move them on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Pending,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertStatus::Pending => "pending",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
        }
    }
}

impl FromStr for AlertStatus {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AlertStatus::Pending),
            "acknowledged" => Ok(AlertStatus::Acknowledged),
            "resolved" => Ok(AlertStatus::Resolved),
            other => Err(ParseKindError::new("alert status", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl FromStr for Severity {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            other => Err(ParseKindError::new("severity", other)),
        }
    }
}

/// A monitored campus building.
#[derive(Debug, Clone, Serialize)]
pub struct Building {
    pub id: i64,
    pub name: String,
    /// Unique short code, used by IoT devices and file imports.
    pub code: String,
    pub description: Option<String>,
    pub zone: Option<Zone>,
    /// Daily water threshold in liters.
    pub water_threshold: f64,
    /// Daily electricity threshold in kWh.
    pub electricity_threshold: f64,
    /// Per-building toggle for the IoT ingestion endpoint.
    pub iot_enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl Building {
    pub fn threshold_for(&self, utility: UtilityType) -> f64 {
        match utility {
            UtilityType::Water => self.water_threshold,
            UtilityType::Electricity => self.electricity_threshold,
        }
    }
}

/// Request body for POST /buildings.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildingRequest {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub zone: Option<Zone>,
    #[serde(default = "default_water_threshold")]
    pub water_threshold: f64,
    #[serde(default = "default_electricity_threshold")]
    pub electricity_threshold: f64,
    #[serde(default)]
    pub iot_enabled: bool,
}

/// Request body for PUT /buildings/{id}; absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildingUpdate {
    pub name: Option<String>,
    pub code: Option<String>,
    pub description: Option<String>,
    pub zone: Option<Zone>,
    pub water_threshold: Option<f64>,
    pub electricity_threshold: Option<f64>,
    pub iot_enabled: Option<bool>,
}

impl BuildingUpdate {
    pub fn apply(self, mut building: Building) -> Building {
        if let Some(name) = self.name {
            building.name = name;
        }
        if let Some(code) = self.code {
            building.code = code;
        }
        if let Some(description) = self.description {
            building.description = Some(description);
        }
        if let Some(zone) = self.zone {
            building.zone = Some(zone);
        }
        if let Some(threshold) = self.water_threshold {
            building.water_threshold = threshold;
        }
        if let Some(threshold) = self.electricity_threshold {
            building.electricity_threshold = threshold;
        }
        if let Some(enabled) = self.iot_enabled {
            building.iot_enabled = enabled;
        }
        building
    }
}

pub fn default_water_threshold() -> f64 {
    10_000.0
}

pub fn default_electricity_threshold() -> f64 {
    5_000.0
}

/// A single persisted utility reading. Never modified after insert.
#[derive(Debug, Clone, Serialize)]
pub struct Reading {
    pub id: i64,
    pub building_id: i64,
    pub utility_type: UtilityType,
    pub value: f64,
    pub unit: String,
    pub reading_date: DateTime<Utc>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A reading that has not been assigned an identity yet.
#[derive(Debug, Clone)]
pub struct NewReading {
    pub building_id: i64,
    pub utility_type: UtilityType,
    pub value: f64,
    pub reading_date: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Request body for POST /readings.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadingRequest {
    pub building_id: i64,
    pub utility_type: UtilityType,
    pub value: f64,
    pub reading_date: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Query parameters for GET /readings.
#[derive(Debug, Default, Deserialize)]
pub struct ReadingsQuery {
    pub building_id: Option<i64>,
    pub utility_type: Option<UtilityType>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub skip: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

/// An alert row as stored.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: i64,
    pub building_id: i64,
    pub alert_type: AlertType,
    pub utility_type: UtilityType,
    pub severity: Severity,
    pub message: String,
    /// Originating reading; cleared if that reading is later deleted.
    pub reading_id: Option<i64>,
    pub status: AlertStatus,
    pub acknowledged_by: Option<i64>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<i64>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An alert produced by a detector, not yet inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub building_id: i64,
    pub alert_type: AlertType,
    pub utility_type: UtilityType,
    pub severity: Severity,
    pub message: String,
    pub reading_id: Option<i64>,
}

impl NewAlert {
    /// Build an alert that originates from `reading`.
    pub fn for_reading(
        reading: &Reading,
        alert_type: AlertType,
        severity: Severity,
        message: String,
    ) -> Self {
        Self {
            building_id: reading.building_id,
            alert_type,
            utility_type: reading.utility_type,
            severity,
            message,
            reading_id: Some(reading.id),
        }
    }
}

/// Query parameters for GET /alerts.
#[derive(Debug, Default, Deserialize)]
pub struct AlertsQuery {
    pub status: Option<AlertStatus>,
    pub building_id: Option<i64>,
    #[serde(default)]
    pub skip: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

/// Request body for PUT /alerts/{id}/acknowledge.
#[derive(Debug, Default, Deserialize)]
pub struct AcknowledgeRequest {
    pub acknowledged_by: Option<i64>,
}

/// Request body for PUT /alerts/{id}/resolve.
#[derive(Debug, Default, Deserialize)]
pub struct ResolveRequest {
    pub resolved_by: Option<i64>,
    pub resolution_notes: Option<String>,
}

fn default_limit() -> u32 {
    100
}
