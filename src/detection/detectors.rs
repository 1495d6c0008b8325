//! Built-in detectors that run for every new reading.
//!
//! None of these are configurable: the windows, cut-offs and severities are
//! fixed constants. Each returns the alert it would raise, leaving the insert
//! to the orchestrator.

use chrono::Duration;
use sqlx::SqliteConnection;

use super::dedup::{self, DedupKey};
use crate::model::{AlertType, Building, NewAlert, Reading, Severity};
use crate::stats::{mean_and_sample_stddev, z_score};
use crate::storage;

/// Trailing window the spike detector builds its baseline from.
pub const SPIKE_WINDOW_DAYS: i64 = 7;

/// Z-score a reading must exceed to count as a spike.
pub const SPIKE_Z_THRESHOLD: f64 = 2.5;

/// Trailing window for sustained high usage.
pub const CONTINUOUS_WINDOW_DAYS: i64 = 3;

/// Fraction of the building threshold that counts as "high".
pub const CONTINUOUS_THRESHOLD_RATIO: f64 = 0.8;

/// Fewest readings either statistical detector will work with.
pub const MIN_SAMPLES: usize = 3;

/// Value strictly above the building's threshold for this utility.
pub fn threshold_breach(building: &Building, reading: &Reading) -> Option<NewAlert> {
    let threshold = building.threshold_for(reading.utility_type);

    if reading.value <= threshold {
        return None;
    }

    Some(NewAlert::for_reading(
        reading,
        AlertType::ThresholdBreach,
        Severity::High,
        format!(
            "{} consumption ({:.2} {}) exceeds threshold ({:.2} {})",
            reading.utility_type.label(),
            reading.value,
            reading.unit,
            threshold,
            reading.unit
        ),
    ))
}

/// Reading far above the mean of the other readings from the trailing week.
pub async fn spike(
    conn: &mut SqliteConnection,
    reading: &Reading,
) -> anyhow::Result<Option<NewAlert>> {
    let since = reading.reading_date - Duration::days(SPIKE_WINDOW_DAYS);
    let history = storage::readings_since(
        conn,
        reading.building_id,
        reading.utility_type,
        since,
        Some(reading.id),
    )
    .await?;

    if history.len() < MIN_SAMPLES {
        return Ok(None);
    }

    let values: Vec<f64> = history.iter().map(|r| r.value).collect();
    let Some((mean, stddev)) = mean_and_sample_stddev(&values) else {
        return Ok(None);
    };
    let Some(z) = z_score(reading.value, mean, stddev) else {
        return Ok(None);
    };

    if z <= SPIKE_Z_THRESHOLD {
        return Ok(None);
    }

    Ok(Some(NewAlert::for_reading(
        reading,
        AlertType::Spike,
        Severity::Medium,
        format!(
            "Spike detected: {} consumption ({:.2} {}) is {:.2} standard deviations above recent average ({:.2} {})",
            reading.utility_type.label(),
            reading.value,
            reading.unit,
            z,
            mean,
            reading.unit
        ),
    )))
}

/// Several readings near the threshold within a few days.
///
/// Only one pending alert of this kind may exist per building and utility,
/// so nothing is raised while an earlier one is still pending.
pub async fn continuous_high(
    conn: &mut SqliteConnection,
    building: &Building,
    reading: &Reading,
) -> anyhow::Result<Option<NewAlert>> {
    let floor = building.threshold_for(reading.utility_type) * CONTINUOUS_THRESHOLD_RATIO;
    let since = reading.reading_date - Duration::days(CONTINUOUS_WINDOW_DAYS);

    let high_count = storage::count_readings_above(
        conn,
        reading.building_id,
        reading.utility_type,
        since,
        floor,
    )
    .await?;

    if high_count < MIN_SAMPLES as i64 {
        return Ok(None);
    }

    let key = DedupKey::Series {
        building_id: reading.building_id,
        utility: reading.utility_type,
        alert_type: AlertType::ContinuousHigh,
    };
    if dedup::is_duplicate(conn, &key).await? {
        return Ok(None);
    }

    Ok(Some(NewAlert::for_reading(
        reading,
        AlertType::ContinuousHigh,
        Severity::Medium,
        format!(
            "Continuous high {} usage detected: {} readings in the last {} days above {:.0}% of threshold",
            reading.utility_type,
            high_count,
            CONTINUOUS_WINDOW_DAYS,
            CONTINUOUS_THRESHOLD_RATIO * 100.0
        ),
    )))
}
