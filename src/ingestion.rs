//! Reading ingestion paths that feed the anomaly engine.
//!
//! Manual entry and IoT devices go through [`Storage::record_reading`].
//! Bulk import reads an uploaded CSV file and runs every row in its own
//! nested transaction inside one outer transaction, so a bad row is rolled
//! back and reported while the rest of the file still commits.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Connection, SqliteConnection};
use thiserror::Error;
use tracing::{info, warn};

use crate::detection;
use crate::model::{Alert, Building, BuildingRequest, NewReading, Reading, UtilityType};
use crate::model::{default_electricity_threshold, default_water_threshold};
use crate::storage::{self, Storage};

/// Longest building code generated for imported buildings.
const MAX_CODE_LEN: usize = 16;

/// Why a submitted reading or import row was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestError {
    #[error("building is empty")]
    EmptyBuilding,

    #[error("invalid timestamp: '{0}'")]
    InvalidTimestamp(String),

    #[error("invalid utility: '{0}'")]
    InvalidUtility(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("value must be >= 0")]
    NegativeValue,
}

/// Columns every import file must carry, matched case-insensitively.
pub const REQUIRED_COLUMNS: [&str; 4] = ["building", "timestamp", "utility", "value"];

/// Why an uploaded import file was rejected as a whole.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ImportFileError {
    #[error("Unsupported file type. Only .csv files are accepted.")]
    UnsupportedFileType,

    #[error("Uploaded file is empty.")]
    EmptyFile,

    #[error("Failed to read file. Ensure it is a valid CSV file. ({0})")]
    Unreadable(String),

    #[error("Missing required columns: {0}")]
    MissingColumns(String),
}

/// One data row of a bulk import file, as raw cell text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportRow {
    pub timestamp: String,
    pub building: String,
    pub utility: String,
    pub value: String,
    pub notes: Option<String>,
}

/// Parse an uploaded import file into rows.
///
/// Header names are trimmed and lowercased before matching. An optional
/// `notes` column is carried through; any other column is ignored.
pub fn parse_import_file(file_name: &str, contents: &[u8]) -> Result<Vec<ImportRow>, ImportFileError> {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if extension != "csv" {
        return Err(ImportFileError::UnsupportedFileType);
    }
    if contents.iter().all(u8::is_ascii_whitespace) {
        return Err(ImportFileError::EmptyFile);
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(contents);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ImportFileError::Unreadable(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();
    let column = |name: &str| headers.iter().position(|h| h == name);

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .into_iter()
        .filter(|&name| column(name).is_none())
        .collect();
    let (Some(timestamp), Some(building), Some(utility), Some(value)) = (
        column("timestamp"),
        column("building"),
        column("utility"),
        column("value"),
    ) else {
        return Err(ImportFileError::MissingColumns(missing.join(", ")));
    };
    let notes = column("notes");

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ImportFileError::Unreadable(e.to_string()))?;
        let cell = |idx: usize| record.get(idx).unwrap_or_default().to_string();

        rows.push(ImportRow {
            timestamp: cell(timestamp),
            building: cell(building),
            utility: cell(utility),
            value: cell(value),
            notes: notes.map(&cell).filter(|n| !n.is_empty()),
        });
    }

    Ok(rows)
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportErrorRow {
    pub row_number: usize,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub total_rows: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub failed_rows: Vec<ImportErrorRow>,
}

/// Query parameters for POST /iot/ingest.
#[derive(Debug, Clone, Deserialize)]
pub struct IotIngestRequest {
    pub device_id: String,
    pub building_code: String,
    pub utility: UtilityType,
    pub value: f64,
    /// Defaults to the time the request is received.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl IotIngestRequest {
    pub fn into_new_reading(
        self,
        building_id: i64,
        now: DateTime<Utc>,
    ) -> Result<NewReading, IngestError> {
        Ok(NewReading {
            building_id,
            utility_type: self.utility,
            value: validate_value(self.value)?,
            reading_date: self.timestamp.unwrap_or(now),
            notes: Some(format!("IoT ingestion from device {}", self.device_id)),
        })
    }
}

/// Readings are non-negative, finite quantities.
pub fn validate_value(value: f64) -> Result<f64, IngestError> {
    if !value.is_finite() {
        return Err(IngestError::InvalidValue(value.to_string()));
    }
    if value < 0.0 {
        return Err(IngestError::NegativeValue);
    }
    Ok(value)
}

/// Accepts the utility names and short aliases seen in meter exports.
pub fn parse_utility(raw: &str) -> Result<UtilityType, IngestError> {
    let label = raw.trim().to_lowercase();
    match label.as_str() {
        "water" | "w" => Ok(UtilityType::Water),
        "electricity" | "electric" | "power" | "e" => Ok(UtilityType::Electricity),
        _ => Err(IngestError::InvalidUtility(label)),
    }
}

/// RFC 3339, or a naive `YYYY-MM-DD[ HH:MM:SS]` taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, IngestError> {
    let trimmed = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Some(naive) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(naive.and_utc());
    }

    Err(IngestError::InvalidTimestamp(raw.to_string()))
}

pub fn parse_value(raw: &str) -> Result<f64, IngestError> {
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| IngestError::InvalidValue(format!("'{}'", raw.trim())))?;

    validate_value(value)
}

/// Building code derived from an import label: uppercase alphanumerics and
/// dashes, at most 16 characters.
pub fn code_from_label(label: &str) -> String {
    let code: String = label
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .take(MAX_CODE_LEN)
        .collect();

    if code.is_empty() {
        "BLDG".to_string()
    } else {
        code
    }
}

/// Find a building by code or name, creating it if neither matches.
async fn resolve_building(conn: &mut SqliteConnection, label: &str) -> anyhow::Result<Building> {
    if let Some(building) = storage::find_building_by_label(conn, label).await? {
        return Ok(building);
    }

    let base = code_from_label(label);
    let mut code = base.clone();
    let mut suffix = 1;
    while storage::building_code_exists(conn, &code).await? {
        suffix += 1;
        let prefix: String = base.chars().take(MAX_CODE_LEN - 2).collect();
        code = format!("{prefix}{suffix:02}").chars().take(MAX_CODE_LEN).collect();
    }

    let building = storage::insert_building(
        conn,
        &BuildingRequest {
            name: label.to_string(),
            code,
            description: Some("Imported from readings file".to_string()),
            zone: None,
            water_threshold: default_water_threshold(),
            electricity_threshold: default_electricity_threshold(),
            iot_enabled: false,
        },
    )
    .await?;

    info!(building_id = building.id, code = %building.code, "Created building from import");
    Ok(building)
}

async fn import_row(
    conn: &mut SqliteConnection,
    row: &ImportRow,
) -> anyhow::Result<(Reading, Vec<Alert>)> {
    let label = row.building.trim();
    if label.is_empty() {
        return Err(IngestError::EmptyBuilding.into());
    }

    let reading_date = parse_timestamp(&row.timestamp)?;
    let value = parse_value(&row.value)?;
    let utility_type = parse_utility(&row.utility)?;

    let building = resolve_building(conn, label).await?;

    let reading = storage::insert_reading(
        conn,
        &NewReading {
            building_id: building.id,
            utility_type,
            value,
            reading_date,
            notes: Some(
                row.notes
                    .clone()
                    .unwrap_or_else(|| "Imported via admin file upload".to_string()),
            ),
        },
    )
    .await?;

    let alerts = detection::evaluate(conn, &reading).await?;
    Ok((reading, alerts))
}

/// Import rows, evaluating each one like a manually entered reading.
///
/// Row numbers in the summary are 1-based with the header counted as row 1,
/// matching what the operator sees in the source spreadsheet.
pub async fn import_readings(storage: &Storage, rows: &[ImportRow]) -> anyhow::Result<ImportSummary> {
    let mut tx = storage.begin().await?;
    let mut success_count = 0;
    let mut failed_rows = Vec::new();

    for (idx, row) in rows.iter().enumerate() {
        let row_number = idx + 2;
        let mut row_tx = Connection::begin(&mut *tx).await?;

        match import_row(&mut row_tx, row).await {
            Ok(_) => {
                row_tx.commit().await?;
                success_count += 1;
            }
            Err(e) => {
                row_tx.rollback().await?;
                warn!(row_number, error = %e, "Import row rejected");
                failed_rows.push(ImportErrorRow {
                    row_number,
                    error: e.to_string(),
                });
            }
        }
    }

    tx.commit().await?;

    info!(
        total_rows = rows.len(),
        success_count,
        failed_count = failed_rows.len(),
        "Readings imported"
    );

    Ok(ImportSummary {
        total_rows: rows.len(),
        success_count,
        failed_count: failed_rows.len(),
        failed_rows,
    })
}
