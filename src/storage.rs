//! SQLite storage layer for SmartCampus.
//!
//! Two kinds of access live here:
//!
//! - [`Storage`] methods, which acquire their own connection from the pool
//!   (CRUD for buildings, readings, alerts and rules).
//! - Free functions taking `&mut SqliteConnection`, which run on whatever
//!   connection the caller hands in. The anomaly engine only uses these, so
//!   it reads and writes inside the ingestion transaction and never commits.
//!
//! Timestamps are bound as `DateTime<Utc>` and stored as RFC 3339 text at
//! full precision, so column comparisons order the same way the values do.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, Transaction};

use crate::detection;
use crate::model::{
    Alert, AlertStatus, AlertType, AlertsQuery, Building, BuildingRequest, BuildingUpdate, NewAlert,
    NewReading,
    Reading, ReadingsQuery, Severity, UtilityType, Zone,
};
use crate::rules::{RuleDraft, RuleRecord};

const BUILDING_COLUMNS: &str = "id, name, code, description, zone, water_threshold, \
     electricity_threshold, iot_enabled, created_at";

const READING_COLUMNS: &str =
    "id, building_id, utility_type, value, unit, reading_date, notes, created_at";

const ALERT_COLUMNS: &str = "id, building_id, alert_type, utility_type, severity, message, \
     reading_id, status, acknowledged_by, acknowledged_at, resolved_by, resolved_at, \
     resolution_notes, created_at";

const RULE_COLUMNS: &str = "id, name, is_active, scope_type, building_id, zone, utility_type, \
     condition_type, threshold_value, comparison_window_days, consecutive_count, severity, \
     created_at, updated_at";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:smartcampus.db" or "sqlite::memory:")
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let mut options = SqlitePoolOptions::new().max_connections(5);

        // Every in-memory connection is its own database; keep exactly one alive.
        if database_url.contains(":memory:") {
            options = options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = options.connect(database_url).await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    /// Create the database schema if it doesn't exist.
    async fn initialize_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS buildings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                code TEXT NOT NULL UNIQUE,
                description TEXT,
                zone TEXT,
                water_threshold REAL NOT NULL,
                electricity_threshold REAL NOT NULL,
                iot_enabled INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS utility_readings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                building_id INTEGER NOT NULL REFERENCES buildings(id),
                utility_type TEXT NOT NULL,
                value REAL NOT NULL,
                unit TEXT NOT NULL,
                reading_date TEXT NOT NULL,
                notes TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Detector lookups are always by building + utility over a date range
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_readings_building_utility_date
            ON utility_readings(building_id, utility_type, reading_date)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alerts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                building_id INTEGER NOT NULL REFERENCES buildings(id),
                alert_type TEXT NOT NULL,
                utility_type TEXT NOT NULL,
                severity TEXT NOT NULL,
                message TEXT NOT NULL,
                reading_id INTEGER REFERENCES utility_readings(id) ON DELETE SET NULL,
                status TEXT NOT NULL,
                acknowledged_by INTEGER,
                acknowledged_at TEXT,
                resolved_by INTEGER,
                resolved_at TEXT,
                resolution_notes TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_alerts_building_utility_status
            ON alerts(building_id, utility_type, alert_type, status)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alert_rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                scope_type TEXT NOT NULL,
                building_id INTEGER REFERENCES buildings(id),
                zone TEXT,
                utility_type TEXT NOT NULL,
                condition_type TEXT NOT NULL,
                threshold_value REAL NOT NULL,
                comparison_window_days INTEGER NOT NULL,
                consecutive_count INTEGER NOT NULL,
                severity TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Start a transaction on a pooled connection.
    pub async fn begin(&self) -> anyhow::Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    // ------------------------------------------------------------------
    // Buildings
    // ------------------------------------------------------------------

    pub async fn insert_building(&self, request: &BuildingRequest) -> anyhow::Result<Building> {
        let mut conn = self.pool.acquire().await?;
        insert_building(&mut conn, request).await
    }

    pub async fn get_building(&self, id: i64) -> anyhow::Result<Option<Building>> {
        let mut conn = self.pool.acquire().await?;
        fetch_building(&mut conn, id).await
    }

    pub async fn get_building_by_code(&self, code: &str) -> anyhow::Result<Option<Building>> {
        let row = sqlx::query(&format!(
            "SELECT {BUILDING_COLUMNS} FROM buildings WHERE code = ?"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(building_from_row).transpose()
    }

    pub async fn list_buildings(&self) -> anyhow::Result<Vec<Building>> {
        let rows = sqlx::query(&format!(
            "SELECT {BUILDING_COLUMNS} FROM buildings ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(building_from_row).collect()
    }

    /// Overwrite the editable fields of building `id`.
    pub async fn update_building(
        &self,
        id: i64,
        update: BuildingUpdate,
    ) -> anyhow::Result<Option<Building>> {
        let mut conn = self.pool.acquire().await?;
        let Some(existing) = fetch_building(&mut conn, id).await? else {
            return Ok(None);
        };
        let building = update.apply(existing);

        sqlx::query(
            r#"
            UPDATE buildings
            SET name = ?, code = ?, description = ?, zone = ?, water_threshold = ?,
                electricity_threshold = ?, iot_enabled = ?
            WHERE id = ?
            "#,
        )
        .bind(&building.name)
        .bind(&building.code)
        .bind(&building.description)
        .bind(building.zone.map(Zone::as_str))
        .bind(building.water_threshold)
        .bind(building.electricity_threshold)
        .bind(building.iot_enabled)
        .bind(id)
        .execute(&mut *conn)
        .await?;

        fetch_building(&mut conn, id).await
    }

    /// Whether any reading, alert or rule still references building `id`.
    pub async fn building_in_use(&self, id: i64) -> anyhow::Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS(SELECT 1 FROM utility_readings WHERE building_id = ?)
                OR EXISTS(SELECT 1 FROM alerts WHERE building_id = ?)
                OR EXISTS(SELECT 1 FROM alert_rules WHERE building_id = ?) AS found
            "#,
        )
        .bind(id)
        .bind(id)
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("found") != 0)
    }

    /// Delete a building. Callers check [`Storage::building_in_use`] first.
    pub async fn delete_building(&self, id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM buildings WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // ------------------------------------------------------------------
    // Readings
    // ------------------------------------------------------------------

    /// Persist a reading and run anomaly detection on it atomically.
    ///
    /// The reading is inserted, evaluated on the same connection, and only
    /// then committed. If any step fails the transaction is dropped and
    /// neither the reading nor its alerts become visible.
    pub async fn record_reading(
        &self,
        reading: &NewReading,
    ) -> anyhow::Result<(Reading, Vec<Alert>)> {
        let mut tx = self.pool.begin().await?;

        let reading = insert_reading(&mut tx, reading).await?;
        let alerts = detection::evaluate(&mut tx, &reading).await?;

        tx.commit().await?;

        Ok((reading, alerts))
    }

    pub async fn get_reading(&self, id: i64) -> anyhow::Result<Option<Reading>> {
        let row = sqlx::query(&format!(
            "SELECT {READING_COLUMNS} FROM utility_readings WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(reading_from_row).transpose()
    }

    /// List readings newest first, applying any filters present in `query`.
    pub async fn list_readings(&self, query: &ReadingsQuery) -> anyhow::Result<Vec<Reading>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {READING_COLUMNS} FROM utility_readings WHERE 1 = 1"
        ));

        if let Some(building_id) = query.building_id {
            builder.push(" AND building_id = ").push_bind(building_id);
        }
        if let Some(utility) = query.utility_type {
            builder.push(" AND utility_type = ").push_bind(utility.as_str());
        }
        if let Some(start) = query.start_date {
            builder.push(" AND reading_date >= ").push_bind(start);
        }
        if let Some(end) = query.end_date {
            builder.push(" AND reading_date <= ").push_bind(end);
        }

        builder
            .push(" ORDER BY reading_date DESC, id DESC LIMIT ")
            .push_bind(i64::from(query.limit))
            .push(" OFFSET ")
            .push_bind(i64::from(query.skip));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(reading_from_row).collect()
    }

    /// Delete a reading. Alerts that referenced it keep existing with a null
    /// `reading_id`. Returns `false` if no such reading existed.
    pub async fn delete_reading(&self, id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM utility_readings WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // ------------------------------------------------------------------
    // Alerts
    // ------------------------------------------------------------------

    pub async fn get_alert(&self, id: i64) -> anyhow::Result<Option<Alert>> {
        let mut conn = self.pool.acquire().await?;
        fetch_alert(&mut conn, id).await
    }

    /// List alerts newest first, filtered by status and building.
    pub async fn list_alerts(&self, query: &AlertsQuery) -> anyhow::Result<Vec<Alert>> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE 1 = 1"));

        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(building_id) = query.building_id {
            builder.push(" AND building_id = ").push_bind(building_id);
        }

        builder
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(query.limit))
            .push(" OFFSET ")
            .push_bind(i64::from(query.skip));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(alert_from_row).collect()
    }

    /// Mark an alert acknowledged. Callers must reject resolved alerts first.
    pub async fn acknowledge_alert(
        &self,
        id: i64,
        acknowledged_by: Option<i64>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<Alert>> {
        sqlx::query(
            r#"
            UPDATE alerts
            SET status = ?, acknowledged_by = ?, acknowledged_at = ?
            WHERE id = ?
            "#,
        )
        .bind(AlertStatus::Acknowledged.as_str())
        .bind(acknowledged_by)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.get_alert(id).await
    }

    /// Mark an alert resolved. Existing resolution notes are kept when
    /// `notes` is `None`.
    pub async fn resolve_alert(
        &self,
        id: i64,
        resolved_by: Option<i64>,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<Alert>> {
        sqlx::query(
            r#"
            UPDATE alerts
            SET status = ?, resolved_by = ?, resolved_at = ?,
                resolution_notes = COALESCE(?, resolution_notes)
            WHERE id = ?
            "#,
        )
        .bind(AlertStatus::Resolved.as_str())
        .bind(resolved_by)
        .bind(now)
        .bind(notes)
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.get_alert(id).await
    }

    // ------------------------------------------------------------------
    // Alert rules
    // ------------------------------------------------------------------

    pub async fn list_rules(&self) -> anyhow::Result<Vec<RuleRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {RULE_COLUMNS} FROM alert_rules ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(rule_from_row).collect()
    }

    pub async fn get_rule(&self, id: i64) -> anyhow::Result<Option<RuleRecord>> {
        let row = sqlx::query(&format!("SELECT {RULE_COLUMNS} FROM alert_rules WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(rule_from_row).transpose()
    }

    /// Insert a rule. The draft must already be validated.
    pub async fn insert_rule(
        &self,
        draft: &RuleDraft,
        now: DateTime<Utc>,
    ) -> anyhow::Result<RuleRecord> {
        let result = sqlx::query(
            r#"
            INSERT INTO alert_rules (
                name, is_active, scope_type, building_id, zone, utility_type,
                condition_type, threshold_value, comparison_window_days,
                consecutive_count, severity, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&draft.name)
        .bind(draft.is_active)
        .bind(&draft.scope_type)
        .bind(draft.building_id)
        .bind(draft.zone.map(Zone::as_str))
        .bind(draft.utility_type.as_str())
        .bind(&draft.condition_type)
        .bind(draft.threshold_value)
        .bind(draft.comparison_window_days)
        .bind(draft.consecutive_count)
        .bind(draft.severity.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.get_rule(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("alert rule {id} vanished after insert"))
    }

    /// Overwrite every configurable field of rule `id` with `draft`.
    pub async fn update_rule(
        &self,
        id: i64,
        draft: &RuleDraft,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<RuleRecord>> {
        sqlx::query(
            r#"
            UPDATE alert_rules
            SET name = ?, is_active = ?, scope_type = ?, building_id = ?, zone = ?,
                utility_type = ?, condition_type = ?, threshold_value = ?,
                comparison_window_days = ?, consecutive_count = ?, severity = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&draft.name)
        .bind(draft.is_active)
        .bind(&draft.scope_type)
        .bind(draft.building_id)
        .bind(draft.zone.map(Zone::as_str))
        .bind(draft.utility_type.as_str())
        .bind(&draft.condition_type)
        .bind(draft.threshold_value)
        .bind(draft.comparison_window_days)
        .bind(draft.consecutive_count)
        .bind(draft.severity.as_str())
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.get_rule(id).await
    }

    pub async fn delete_rule(&self, id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM alert_rules WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

// ----------------------------------------------------------------------
// Connection-scoped queries
// ----------------------------------------------------------------------

pub async fn insert_building(
    conn: &mut SqliteConnection,
    request: &BuildingRequest,
) -> anyhow::Result<Building> {
    let result = sqlx::query(
        r#"
        INSERT INTO buildings (
            name, code, description, zone, water_threshold,
            electricity_threshold, iot_enabled, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&request.name)
    .bind(&request.code)
    .bind(&request.description)
    .bind(request.zone.map(Zone::as_str))
    .bind(request.water_threshold)
    .bind(request.electricity_threshold)
    .bind(request.iot_enabled)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    let id = result.last_insert_rowid();
    fetch_building(conn, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("building {id} vanished after insert"))
}

pub async fn fetch_building(
    conn: &mut SqliteConnection,
    id: i64,
) -> anyhow::Result<Option<Building>> {
    let row = sqlx::query(&format!(
        "SELECT {BUILDING_COLUMNS} FROM buildings WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(building_from_row).transpose()
}

/// Find a building whose code or name equals `label`.
pub async fn find_building_by_label(
    conn: &mut SqliteConnection,
    label: &str,
) -> anyhow::Result<Option<Building>> {
    let row = sqlx::query(&format!(
        "SELECT {BUILDING_COLUMNS} FROM buildings WHERE code = ? OR name = ? ORDER BY id LIMIT 1"
    ))
    .bind(label)
    .bind(label)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(building_from_row).transpose()
}

pub async fn building_code_exists(conn: &mut SqliteConnection, code: &str) -> anyhow::Result<bool> {
    let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM buildings WHERE code = ?) AS found")
        .bind(code)
        .fetch_one(&mut *conn)
        .await?;

    Ok(row.get::<i64, _>("found") != 0)
}

/// Insert a reading and return it with its assigned identity.
pub async fn insert_reading(
    conn: &mut SqliteConnection,
    reading: &NewReading,
) -> anyhow::Result<Reading> {
    let created_at = Utc::now();
    let unit = reading.utility_type.unit();

    let result = sqlx::query(
        r#"
        INSERT INTO utility_readings (
            building_id, utility_type, value, unit, reading_date, notes, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(reading.building_id)
    .bind(reading.utility_type.as_str())
    .bind(reading.value)
    .bind(unit)
    .bind(reading.reading_date)
    .bind(&reading.notes)
    .bind(created_at)
    .execute(&mut *conn)
    .await?;

    Ok(Reading {
        id: result.last_insert_rowid(),
        building_id: reading.building_id,
        utility_type: reading.utility_type,
        value: reading.value,
        unit: unit.to_string(),
        reading_date: reading.reading_date,
        notes: reading.notes.clone(),
        created_at,
    })
}

/// Readings for a building and utility dated at or after `since`,
/// optionally leaving out one reading.
pub async fn readings_since(
    conn: &mut SqliteConnection,
    building_id: i64,
    utility: UtilityType,
    since: DateTime<Utc>,
    exclude_id: Option<i64>,
) -> anyhow::Result<Vec<Reading>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {READING_COLUMNS}
        FROM utility_readings
        WHERE building_id = ? AND utility_type = ? AND reading_date >= ?
          AND (? IS NULL OR id != ?)
        ORDER BY reading_date, id
        "#
    ))
    .bind(building_id)
    .bind(utility.as_str())
    .bind(since)
    .bind(exclude_id)
    .bind(exclude_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(reading_from_row).collect()
}

/// Count readings for a building and utility dated at or after `since`
/// whose value is strictly greater than `above`.
pub async fn count_readings_above(
    conn: &mut SqliteConnection,
    building_id: i64,
    utility: UtilityType,
    since: DateTime<Utc>,
    above: f64,
) -> anyhow::Result<i64> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS total
        FROM utility_readings
        WHERE building_id = ? AND utility_type = ? AND reading_date >= ? AND value > ?
        "#,
    )
    .bind(building_id)
    .bind(utility.as_str())
    .bind(since)
    .bind(above)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row.get("total"))
}

/// The `limit` most recent readings for a building and utility, newest first.
pub async fn latest_readings(
    conn: &mut SqliteConnection,
    building_id: i64,
    utility: UtilityType,
    limit: u32,
) -> anyhow::Result<Vec<Reading>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {READING_COLUMNS}
        FROM utility_readings
        WHERE building_id = ? AND utility_type = ?
        ORDER BY reading_date DESC, id DESC
        LIMIT ?
        "#
    ))
    .bind(building_id)
    .bind(utility.as_str())
    .bind(i64::from(limit))
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(reading_from_row).collect()
}

/// The most recent reading dated strictly before `before`.
pub async fn previous_reading(
    conn: &mut SqliteConnection,
    building_id: i64,
    utility: UtilityType,
    before: DateTime<Utc>,
) -> anyhow::Result<Option<Reading>> {
    let row = sqlx::query(&format!(
        r#"
        SELECT {READING_COLUMNS}
        FROM utility_readings
        WHERE building_id = ? AND utility_type = ? AND reading_date < ?
        ORDER BY reading_date DESC, id DESC
        LIMIT 1
        "#
    ))
    .bind(building_id)
    .bind(utility.as_str())
    .bind(before)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(reading_from_row).transpose()
}

/// Whether a pending alert of `alert_type` exists for a building and utility.
pub async fn pending_alert_exists(
    conn: &mut SqliteConnection,
    building_id: i64,
    utility: UtilityType,
    alert_type: AlertType,
) -> anyhow::Result<bool> {
    let row = sqlx::query(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM alerts
            WHERE building_id = ? AND utility_type = ? AND alert_type = ? AND status = ?
        ) AS found
        "#,
    )
    .bind(building_id)
    .bind(utility.as_str())
    .bind(alert_type.as_str())
    .bind(AlertStatus::Pending.as_str())
    .fetch_one(&mut *conn)
    .await?;

    Ok(row.get::<i64, _>("found") != 0)
}

/// Whether a pending alert of `alert_type` already references `reading_id`.
pub async fn pending_alert_for_reading(
    conn: &mut SqliteConnection,
    reading_id: i64,
    alert_type: AlertType,
) -> anyhow::Result<bool> {
    let row = sqlx::query(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM alerts
            WHERE reading_id = ? AND alert_type = ? AND status = ?
        ) AS found
        "#,
    )
    .bind(reading_id)
    .bind(alert_type.as_str())
    .bind(AlertStatus::Pending.as_str())
    .fetch_one(&mut *conn)
    .await?;

    Ok(row.get::<i64, _>("found") != 0)
}

/// Active rules configured for `utility`, oldest first.
pub async fn active_rules(
    conn: &mut SqliteConnection,
    utility: UtilityType,
) -> anyhow::Result<Vec<RuleRecord>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {RULE_COLUMNS}
        FROM alert_rules
        WHERE is_active = 1 AND utility_type = ?
        ORDER BY id
        "#
    ))
    .bind(utility.as_str())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(rule_from_row).collect()
}

/// Insert a pending alert.
pub async fn insert_alert(conn: &mut SqliteConnection, alert: &NewAlert) -> anyhow::Result<Alert> {
    let created_at = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO alerts (
            building_id, alert_type, utility_type, severity, message,
            reading_id, status, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(alert.building_id)
    .bind(alert.alert_type.as_str())
    .bind(alert.utility_type.as_str())
    .bind(alert.severity.as_str())
    .bind(&alert.message)
    .bind(alert.reading_id)
    .bind(AlertStatus::Pending.as_str())
    .bind(created_at)
    .execute(&mut *conn)
    .await?;

    let id = result.last_insert_rowid();
    fetch_alert(conn, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("alert {id} vanished after insert"))
}

pub async fn fetch_alert(conn: &mut SqliteConnection, id: i64) -> anyhow::Result<Option<Alert>> {
    let row = sqlx::query(&format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(alert_from_row).transpose()
}

// ----------------------------------------------------------------------
// Row mapping
// ----------------------------------------------------------------------

fn parse_column<T>(row: &SqliteRow, column: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.try_get(column)?;
    Ok(raw.parse()?)
}

fn parse_optional_column<T>(row: &SqliteRow, column: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.try_get(column)?;
    Ok(raw.map(|value| value.parse::<T>()).transpose()?)
}

fn building_from_row(row: &SqliteRow) -> anyhow::Result<Building> {
    Ok(Building {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        code: row.try_get("code")?,
        description: row.try_get("description")?,
        zone: parse_optional_column(row, "zone")?,
        water_threshold: row.try_get("water_threshold")?,
        electricity_threshold: row.try_get("electricity_threshold")?,
        iot_enabled: row.try_get("iot_enabled")?,
        created_at: row.try_get("created_at")?,
    })
}

fn reading_from_row(row: &SqliteRow) -> anyhow::Result<Reading> {
    Ok(Reading {
        id: row.try_get("id")?,
        building_id: row.try_get("building_id")?,
        utility_type: parse_column(row, "utility_type")?,
        value: row.try_get("value")?,
        unit: row.try_get("unit")?,
        reading_date: row.try_get("reading_date")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
    })
}

fn alert_from_row(row: &SqliteRow) -> anyhow::Result<Alert> {
    Ok(Alert {
        id: row.try_get("id")?,
        building_id: row.try_get("building_id")?,
        alert_type: parse_column(row, "alert_type")?,
        utility_type: parse_column(row, "utility_type")?,
        severity: parse_column::<Severity>(row, "severity")?,
        message: row.try_get("message")?,
        reading_id: row.try_get("reading_id")?,
        status: parse_column(row, "status")?,
        acknowledged_by: row.try_get("acknowledged_by")?,
        acknowledged_at: row.try_get("acknowledged_at")?,
        resolved_by: row.try_get("resolved_by")?,
        resolved_at: row.try_get("resolved_at")?,
        resolution_notes: row.try_get("resolution_notes")?,
        created_at: row.try_get("created_at")?,
    })
}

fn rule_from_row(row: &SqliteRow) -> anyhow::Result<RuleRecord> {
    Ok(RuleRecord {
        id: row.try_get("id")?,
        draft: RuleDraft {
            name: row.try_get("name")?,
            is_active: row.try_get("is_active")?,
            scope_type: row.try_get("scope_type")?,
            building_id: row.try_get("building_id")?,
            zone: parse_optional_column(row, "zone")?,
            utility_type: parse_column(row, "utility_type")?,
            condition_type: row.try_get("condition_type")?,
            threshold_value: row.try_get("threshold_value")?,
            comparison_window_days: row.try_get("comparison_window_days")?,
            consecutive_count: row.try_get("consecutive_count")?,
            severity: parse_column(row, "severity")?,
        },
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
