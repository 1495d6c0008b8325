//! Suppression of repeat alerts.
//!
//! Checks only look at pending alerts: once an operator acknowledges or
//! resolves one, the same condition may alert again.
//!
//! This is a read-then-write check. Two transactions evaluating the same
//! building and utility at once can both see "nothing pending" and both
//! insert; storage has no uniqueness constraint that would stop it.

use sqlx::SqliteConnection;

use crate::model::{AlertType, UtilityType};
use crate::storage;

/// What makes two alerts the "same" alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupKey {
    /// One pending alert per building, utility and kind.
    Series {
        building_id: i64,
        utility: UtilityType,
        alert_type: AlertType,
    },
    /// One pending alert of a kind per originating reading.
    Reading { reading_id: i64, alert_type: AlertType },
}

/// Whether a pending alert already covers `key`.
pub async fn is_duplicate(conn: &mut SqliteConnection, key: &DedupKey) -> anyhow::Result<bool> {
    match *key {
        DedupKey::Series {
            building_id,
            utility,
            alert_type,
        } => storage::pending_alert_exists(conn, building_id, utility, alert_type).await,
        DedupKey::Reading {
            reading_id,
            alert_type,
        } => storage::pending_alert_for_reading(conn, reading_id, alert_type).await,
    }
}
