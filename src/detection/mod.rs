//! Anomaly detection for newly recorded readings.
//!
//! [`evaluate`] is called once per reading, inside the transaction that
//! inserted it and before that transaction commits. It runs the built-in
//! detectors, then every active admin rule, and inserts whatever alerts they
//! raise on the same connection. Commit or rollback is left to the caller,
//! so a reading and its alerts become visible together or not at all.
//!
//! Thresholds and rules are read fresh on every call; nothing is cached.

pub mod dedup;
pub mod detectors;

use sqlx::SqliteConnection;
use tracing::{debug, info, instrument};

use crate::model::{Alert, AlertType, Building, NewAlert, Reading};
use crate::rules;
use crate::storage;
use self::dedup::DedupKey;

/// Run every detector and rule against `reading` and insert the resulting alerts.
///
/// A reading whose building cannot be found is skipped without error.
/// Alerts are collected first and inserted together at the end, so the
/// duplicate checks within one call only see alerts from earlier calls.
#[instrument(
    skip_all,
    fields(reading_id = reading.id, building_id = reading.building_id, utility = %reading.utility_type)
)]
pub async fn evaluate(conn: &mut SqliteConnection, reading: &Reading) -> anyhow::Result<Vec<Alert>> {
    let Some(building) = storage::fetch_building(conn, reading.building_id).await? else {
        debug!("Building not found, skipping anomaly detection");
        return Ok(Vec::new());
    };

    let mut raised = Vec::new();
    raised.extend(detectors::threshold_breach(&building, reading));
    raised.extend(detectors::spike(conn, reading).await?);
    raised.extend(detectors::continuous_high(conn, &building, reading).await?);
    raised.extend(rule_alerts(conn, &building, reading).await?);

    let mut created = Vec::with_capacity(raised.len());
    for new_alert in &raised {
        let alert = storage::insert_alert(conn, new_alert).await?;
        info!(
            alert_id = alert.id,
            alert_type = alert.alert_type.as_str(),
            severity = alert.severity.as_str(),
            "Alert raised"
        );
        created.push(alert);
    }

    Ok(created)
}

/// Evaluate active admin rules for the reading's utility and building.
///
/// Each matching rule raises its own alert, unless a pending rule alert
/// already references this reading.
async fn rule_alerts(
    conn: &mut SqliteConnection,
    building: &Building,
    reading: &Reading,
) -> anyhow::Result<Vec<NewAlert>> {
    let key = DedupKey::Reading {
        reading_id: reading.id,
        alert_type: AlertType::RuleTrigger,
    };
    if dedup::is_duplicate(conn, &key).await? {
        debug!("Rule alert already pending for reading");
        return Ok(Vec::new());
    }

    let mut alerts = Vec::new();

    for rule in rules::load_active_rules(conn, reading.utility_type).await? {
        if !rule.scope.matches(building) {
            continue;
        }

        if let Some(message) = rules::evaluate_condition(conn, &rule, reading).await? {
            debug!(rule_id = rule.id, "Alert rule triggered");
            alerts.push(NewAlert::for_reading(
                reading,
                AlertType::RuleTrigger,
                rule.severity,
                message,
            ));
        }
    }

    Ok(alerts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AlertStatus, AlertsQuery, BuildingRequest, NewReading, Severity, UtilityType, Zone,
    };
    use crate::rules::RuleDraft;
    use crate::storage::Storage;
    use chrono::{DateTime, Duration, Utc};

    async fn setup() -> (Storage, Building) {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        let building = add_building(&storage, "SJT", Some(Zone::Academic)).await;
        (storage, building)
    }

    async fn add_building(storage: &Storage, code: &str, zone: Option<Zone>) -> Building {
        storage
            .insert_building(&BuildingRequest {
                name: format!("{code} block"),
                code: code.to_string(),
                description: None,
                zone,
                water_threshold: 1000.0,
                electricity_threshold: 500.0,
                iot_enabled: false,
            })
            .await
            .unwrap()
    }

    fn new_reading(
        building: &Building,
        utility_type: UtilityType,
        value: f64,
        at: DateTime<Utc>,
    ) -> NewReading {
        NewReading {
            building_id: building.id,
            utility_type,
            value,
            reading_date: at,
            notes: None,
        }
    }

    /// Insert history without running detection on it.
    async fn seed(storage: &Storage, building: &Building, utility: UtilityType, values: &[(f64, DateTime<Utc>)]) {
        let mut tx = storage.begin().await.unwrap();
        for (value, at) in values {
            storage::insert_reading(&mut tx, &new_reading(building, utility, *value, *at))
                .await
                .unwrap();
        }
        tx.commit().await.unwrap();
    }

    async fn record(
        storage: &Storage,
        building: &Building,
        utility: UtilityType,
        value: f64,
        at: DateTime<Utc>,
    ) -> (Reading, Vec<Alert>) {
        storage
            .record_reading(&new_reading(building, utility, value, at))
            .await
            .unwrap()
    }

    async fn reevaluate(storage: &Storage, reading: &Reading) -> Vec<Alert> {
        let mut tx = storage.begin().await.unwrap();
        let alerts = evaluate(&mut tx, reading).await.unwrap();
        tx.commit().await.unwrap();
        alerts
    }

    async fn alerts_of(storage: &Storage, alert_type: AlertType) -> Vec<Alert> {
        storage
            .list_alerts(&AlertsQuery {
                limit: 1000,
                ..AlertsQuery::default()
            })
            .await
            .unwrap()
            .into_iter()
            .filter(|a| a.alert_type == alert_type)
            .collect()
    }

    async fn add_rule(storage: &Storage, draft: RuleDraft) {
        draft.validate().unwrap();
        storage.insert_rule(&draft, Utc::now()).await.unwrap();
    }

    fn rule(utility_type: UtilityType, condition_type: &str, threshold_value: f64) -> RuleDraft {
        RuleDraft {
            name: format!("{condition_type} rule"),
            is_active: true,
            scope_type: "global".to_string(),
            building_id: None,
            zone: None,
            utility_type,
            condition_type: condition_type.to_string(),
            threshold_value,
            comparison_window_days: 7,
            consecutive_count: 1,
            severity: Severity::Medium,
        }
    }

    fn kinds(alerts: &[Alert]) -> Vec<AlertType> {
        alerts.iter().map(|a| a.alert_type).collect()
    }

    #[tokio::test]
    async fn test_threshold_breach_alert() {
        let (storage, building) = setup().await;

        let (reading, alerts) = record(&storage, &building, UtilityType::Water, 1200.0, Utc::now()).await;

        assert_eq!(kinds(&alerts), vec![AlertType::ThresholdBreach]);
        assert_eq!(alerts[0].severity, Severity::High);
        assert_eq!(alerts[0].status, AlertStatus::Pending);
        assert_eq!(alerts[0].reading_id, Some(reading.id));
    }

    #[tokio::test]
    async fn test_reading_at_threshold_raises_nothing() {
        let (storage, building) = setup().await;

        let (_, alerts) = record(&storage, &building, UtilityType::Water, 1000.0, Utc::now()).await;

        assert!(alerts.is_empty());
    }

    #[tokio::test]
    async fn test_missing_building_is_noop() {
        let (storage, _) = setup().await;
        let orphan = Reading {
            id: 99,
            building_id: 404,
            utility_type: UtilityType::Water,
            value: 1_000_000.0,
            unit: "liters".to_string(),
            reading_date: Utc::now(),
            notes: None,
            created_at: Utc::now(),
        };

        let alerts = reevaluate(&storage, &orphan).await;

        assert!(alerts.is_empty());
    }

    #[tokio::test]
    async fn test_spike_against_trailing_week() {
        let (storage, building) = setup().await;
        let now = Utc::now();
        seed(
            &storage,
            &building,
            UtilityType::Water,
            &[
                (100.0, now - Duration::days(3)),
                (102.0, now - Duration::days(2)),
                (98.0, now - Duration::days(1)),
            ],
        )
        .await;

        let (_, alerts) = record(&storage, &building, UtilityType::Water, 300.0, now).await;

        assert_eq!(kinds(&alerts), vec![AlertType::Spike]);
        assert_eq!(alerts[0].severity, Severity::Medium);
        assert!(alerts[0].message.contains("standard deviations above recent average"));
    }

    #[tokio::test]
    async fn test_spike_boundary_uses_sample_stddev() {
        let (storage, building) = setup().await;
        let now = Utc::now();
        // mean 100, sample stddev 10
        seed(
            &storage,
            &building,
            UtilityType::Water,
            &[
                (90.0, now - Duration::days(3)),
                (100.0, now - Duration::days(2)),
                (110.0, now - Duration::days(1)),
            ],
        )
        .await;

        let (_, at_limit) = record(&storage, &building, UtilityType::Water, 125.0, now).await;
        assert!(alerts_of(&storage, AlertType::Spike).await.is_empty());
        assert!(at_limit.is_empty());

        let (storage, building) = setup().await;
        seed(
            &storage,
            &building,
            UtilityType::Water,
            &[
                (90.0, now - Duration::days(3)),
                (100.0, now - Duration::days(2)),
                (110.0, now - Duration::days(1)),
            ],
        )
        .await;

        let (_, above) = record(&storage, &building, UtilityType::Water, 126.0, now).await;
        assert_eq!(kinds(&above), vec![AlertType::Spike]);
    }

    #[tokio::test]
    async fn test_spike_needs_three_recent_readings() {
        let (storage, building) = setup().await;
        let now = Utc::now();
        seed(
            &storage,
            &building,
            UtilityType::Water,
            &[
                (100.0, now - Duration::days(10)),
                (101.0, now - Duration::days(2)),
                (99.0, now - Duration::days(1)),
            ],
        )
        .await;

        let (_, alerts) = record(&storage, &building, UtilityType::Water, 900.0, now).await;

        assert!(alerts.is_empty());
    }

    #[tokio::test]
    async fn test_spike_skipped_without_dispersion() {
        let (storage, building) = setup().await;
        let now = Utc::now();
        seed(
            &storage,
            &building,
            UtilityType::Water,
            &[
                (100.0, now - Duration::days(3)),
                (100.0, now - Duration::days(2)),
                (100.0, now - Duration::days(1)),
            ],
        )
        .await;

        let (_, alerts) = record(&storage, &building, UtilityType::Water, 900.0, now).await;

        assert!(alerts.is_empty());
    }

    #[tokio::test]
    async fn test_continuous_high_single_pending_alert() {
        let (storage, building) = setup().await;
        let now = Utc::now();

        // 80% of the 1000 liter threshold is 800
        record(&storage, &building, UtilityType::Water, 850.0, now - Duration::days(2)).await;
        record(&storage, &building, UtilityType::Water, 900.0, now - Duration::days(1)).await;
        let (_, third) = record(&storage, &building, UtilityType::Water, 880.0, now - Duration::hours(12)).await;
        assert_eq!(kinds(&third), vec![AlertType::ContinuousHigh]);

        let (_, fourth) = record(&storage, &building, UtilityType::Water, 870.0, now).await;
        assert!(fourth.is_empty());
        assert_eq!(alerts_of(&storage, AlertType::ContinuousHigh).await.len(), 1);

        let pending = &alerts_of(&storage, AlertType::ContinuousHigh).await[0];
        storage
            .resolve_alert(pending.id, Some(1), Some("valve fixed"), Utc::now())
            .await
            .unwrap();

        let (_, after_resolve) = record(&storage, &building, UtilityType::Water, 890.0, now).await;
        assert_eq!(kinds(&after_resolve), vec![AlertType::ContinuousHigh]);
        assert_eq!(alerts_of(&storage, AlertType::ContinuousHigh).await.len(), 2);
    }

    #[tokio::test]
    async fn test_continuous_high_ignores_other_utility() {
        let (storage, building) = setup().await;
        let now = Utc::now();
        seed(
            &storage,
            &building,
            UtilityType::Electricity,
            &[(450.0, now - Duration::days(2)), (460.0, now - Duration::days(1))],
        )
        .await;

        let (_, alerts) = record(&storage, &building, UtilityType::Water, 900.0, now).await;

        assert!(alerts.is_empty());
    }

    #[tokio::test]
    async fn test_consecutive_threshold_rule() {
        let (storage, building) = setup().await;
        let now = Utc::now();
        add_rule(
            &storage,
            RuleDraft {
                consecutive_count: 3,
                ..rule(UtilityType::Water, "threshold", 300.0)
            },
        )
        .await;

        seed(
            &storage,
            &building,
            UtilityType::Water,
            &[(320.0, now - Duration::hours(2)), (340.0, now - Duration::hours(1))],
        )
        .await;
        let (_, alerts) = record(&storage, &building, UtilityType::Water, 360.0, now).await;

        assert_eq!(kinds(&alerts), vec![AlertType::RuleTrigger]);
        assert!(alerts[0].message.contains("last 3 water readings exceeded 300.00"));
    }

    #[tokio::test]
    async fn test_consecutive_threshold_rule_broken_run() {
        let (storage, building) = setup().await;
        let now = Utc::now();
        add_rule(
            &storage,
            RuleDraft {
                consecutive_count: 3,
                ..rule(UtilityType::Water, "threshold", 300.0)
            },
        )
        .await;

        seed(
            &storage,
            &building,
            UtilityType::Water,
            &[(320.0, now - Duration::hours(2)), (300.0, now - Duration::hours(1))],
        )
        .await;
        let (_, alerts) = record(&storage, &building, UtilityType::Water, 360.0, now).await;

        assert!(alerts.is_empty());
    }

    #[tokio::test]
    async fn test_consecutive_threshold_rule_needs_full_run() {
        let (storage, building) = setup().await;
        let now = Utc::now();
        add_rule(
            &storage,
            RuleDraft {
                consecutive_count: 3,
                ..rule(UtilityType::Water, "threshold", 300.0)
            },
        )
        .await;

        seed(&storage, &building, UtilityType::Water, &[(320.0, now - Duration::hours(1))]).await;
        let (_, alerts) = record(&storage, &building, UtilityType::Water, 360.0, now).await;

        assert!(alerts.is_empty());
    }

    #[tokio::test]
    async fn test_single_threshold_rule() {
        let (storage, building) = setup().await;
        add_rule(&storage, rule(UtilityType::Electricity, "threshold", 200.0)).await;

        let (_, quiet) = record(&storage, &building, UtilityType::Electricity, 200.0, Utc::now()).await;
        assert!(quiet.is_empty());

        let (_, alerts) = record(&storage, &building, UtilityType::Electricity, 250.0, Utc::now()).await;
        assert_eq!(kinds(&alerts), vec![AlertType::RuleTrigger]);
        assert_eq!(
            alerts[0].message,
            "Rule 'threshold rule': Electricity consumption (250.00 kWh) exceeds 200.00 kWh"
        );
    }

    #[tokio::test]
    async fn test_rate_of_change_rule() {
        for (previous, current, fires) in [(100.0, 125.0, true), (100.0, 115.0, false), (0.0, 500.0, false)] {
            let (storage, building) = setup().await;
            let now = Utc::now();
            add_rule(&storage, rule(UtilityType::Water, "rate_of_change", 20.0)).await;
            seed(&storage, &building, UtilityType::Water, &[(previous, now - Duration::hours(1))]).await;

            let (_, alerts) = record(&storage, &building, UtilityType::Water, current, now).await;

            let rule_alerts = alerts_of(&storage, AlertType::RuleTrigger).await;
            assert_eq!(!rule_alerts.is_empty(), fires, "{previous} -> {current}");
            assert_eq!(alerts.len(), rule_alerts.len());
        }
    }

    #[tokio::test]
    async fn test_rate_of_change_needs_earlier_reading() {
        let (storage, building) = setup().await;
        let now = Utc::now();
        add_rule(&storage, rule(UtilityType::Water, "rate_of_change", 20.0)).await;
        // a later reading is not a "previous" one
        seed(&storage, &building, UtilityType::Water, &[(10.0, now + Duration::hours(1))]).await;

        let (_, alerts) = record(&storage, &building, UtilityType::Water, 500.0, now).await;

        assert!(alerts.is_empty());
    }

    #[tokio::test]
    async fn test_zscore_rule_uses_its_window() {
        let (storage, building) = setup().await;
        let now = Utc::now();
        add_rule(
            &storage,
            RuleDraft {
                comparison_window_days: 2,
                ..rule(UtilityType::Water, "zscore", 1.5)
            },
        )
        .await;

        // only the three most recent fall inside the 2 day window
        seed(
            &storage,
            &building,
            UtilityType::Water,
            &[
                (500.0, now - Duration::days(5)),
                (90.0, now - Duration::hours(40)),
                (100.0, now - Duration::hours(30)),
                (110.0, now - Duration::hours(20)),
            ],
        )
        .await;

        // z = 2.0 against mean 100 / stddev 10: above 1.5, below the 2.5 spike cut-off
        let (_, alerts) = record(&storage, &building, UtilityType::Water, 120.0, now).await;

        assert_eq!(kinds(&alerts), vec![AlertType::RuleTrigger]);
        assert!(alerts[0].message.contains("deviates sharply from the last 2 days"));
    }

    #[tokio::test]
    async fn test_zscore_rule_needs_history() {
        let (storage, building) = setup().await;
        let now = Utc::now();
        add_rule(&storage, rule(UtilityType::Water, "zscore", 1.0)).await;
        seed(
            &storage,
            &building,
            UtilityType::Water,
            &[(90.0, now - Duration::days(2)), (110.0, now - Duration::days(1))],
        )
        .await;

        let (_, alerts) = record(&storage, &building, UtilityType::Water, 400.0, now).await;

        assert!(alerts.is_empty());
    }

    #[tokio::test]
    async fn test_rule_scopes() {
        let (storage, academic) = setup().await;
        let hostel = add_building(&storage, "MH", Some(Zone::Residential)).await;
        let unzoned = add_building(&storage, "GYM", None).await;

        add_rule(
            &storage,
            RuleDraft {
                scope_type: "zone".to_string(),
                zone: Some(Zone::Residential),
                ..rule(UtilityType::Water, "threshold", 100.0)
            },
        )
        .await;
        add_rule(
            &storage,
            RuleDraft {
                scope_type: "building".to_string(),
                building_id: Some(unzoned.id),
                ..rule(UtilityType::Water, "threshold", 100.0)
            },
        )
        .await;

        let (_, academic_alerts) = record(&storage, &academic, UtilityType::Water, 150.0, Utc::now()).await;
        let (_, hostel_alerts) = record(&storage, &hostel, UtilityType::Water, 150.0, Utc::now()).await;
        let (_, gym_alerts) = record(&storage, &unzoned, UtilityType::Water, 150.0, Utc::now()).await;

        assert!(academic_alerts.is_empty());
        assert_eq!(kinds(&hostel_alerts), vec![AlertType::RuleTrigger]);
        assert_eq!(kinds(&gym_alerts), vec![AlertType::RuleTrigger]);
    }

    #[tokio::test]
    async fn test_inactive_and_other_utility_rules_ignored() {
        let (storage, building) = setup().await;
        add_rule(
            &storage,
            RuleDraft {
                is_active: false,
                ..rule(UtilityType::Water, "threshold", 10.0)
            },
        )
        .await;
        add_rule(&storage, rule(UtilityType::Electricity, "threshold", 10.0)).await;

        let (_, alerts) = record(&storage, &building, UtilityType::Water, 50.0, Utc::now()).await;

        assert!(alerts.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_condition_never_triggers() {
        let (storage, building) = setup().await;
        let mut tx = storage.begin().await.unwrap();
        sqlx::query(
            r#"
            INSERT INTO alert_rules (
                name, is_active, scope_type, utility_type, condition_type,
                threshold_value, comparison_window_days, consecutive_count,
                severity, created_at
            )
            VALUES ('legacy', 1, 'global', 'water', 'median', 0.0, 7, 1, 'high', 0)
            "#,
        )
        .execute(&mut *tx)
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let (_, alerts) = record(&storage, &building, UtilityType::Water, 50.0, Utc::now()).await;

        assert!(alerts.is_empty());
    }

    #[tokio::test]
    async fn test_rule_severity_carried_over() {
        let (storage, building) = setup().await;
        add_rule(
            &storage,
            RuleDraft {
                severity: Severity::Low,
                ..rule(UtilityType::Water, "threshold", 10.0)
            },
        )
        .await;

        let (_, alerts) = record(&storage, &building, UtilityType::Water, 50.0, Utc::now()).await;

        assert_eq!(alerts[0].severity, Severity::Low);
    }

    #[tokio::test]
    async fn test_each_matching_rule_alerts_once_per_reading() {
        let (storage, building) = setup().await;
        add_rule(&storage, rule(UtilityType::Water, "threshold", 10.0)).await;
        add_rule(&storage, rule(UtilityType::Water, "threshold", 20.0)).await;

        let (reading, first) = record(&storage, &building, UtilityType::Water, 50.0, Utc::now()).await;
        assert_eq!(kinds(&first), vec![AlertType::RuleTrigger, AlertType::RuleTrigger]);

        let second = reevaluate(&storage, &reading).await;
        assert!(second.is_empty());
        assert_eq!(alerts_of(&storage, AlertType::RuleTrigger).await.len(), 2);
    }

    #[tokio::test]
    async fn test_reevaluation_only_dedups_continuous_and_rule_alerts() {
        let (storage, building) = setup().await;
        let now = Utc::now();
        add_rule(&storage, rule(UtilityType::Water, "threshold", 1200.0)).await;
        seed(
            &storage,
            &building,
            UtilityType::Water,
            &[
                (900.0, now - Duration::days(2)),
                (920.0, now - Duration::days(1)),
                (940.0, now - Duration::hours(12)),
            ],
        )
        .await;

        let (reading, first) = record(&storage, &building, UtilityType::Water, 1500.0, now).await;
        assert_eq!(
            kinds(&first),
            vec![
                AlertType::ThresholdBreach,
                AlertType::Spike,
                AlertType::ContinuousHigh,
                AlertType::RuleTrigger,
            ]
        );

        let second = reevaluate(&storage, &reading).await;
        assert_eq!(kinds(&second), vec![AlertType::ThresholdBreach, AlertType::Spike]);

        assert_eq!(alerts_of(&storage, AlertType::ThresholdBreach).await.len(), 2);
        assert_eq!(alerts_of(&storage, AlertType::Spike).await.len(), 2);
        assert_eq!(alerts_of(&storage, AlertType::ContinuousHigh).await.len(), 1);
        assert_eq!(alerts_of(&storage, AlertType::RuleTrigger).await.len(), 1);
    }

    #[tokio::test]
    async fn test_rolled_back_reading_leaves_no_alerts() {
        let (storage, building) = setup().await;

        let reading = {
            let mut tx = storage.begin().await.unwrap();
            let reading = storage::insert_reading(
                &mut tx,
                &new_reading(&building, UtilityType::Water, 5000.0, Utc::now()),
            )
            .await
            .unwrap();
            let alerts = evaluate(&mut tx, &reading).await.unwrap();
            assert_eq!(alerts.len(), 1);
            tx.rollback().await.unwrap();
            reading
        };

        assert!(storage.get_reading(reading.id).await.unwrap().is_none());
        assert!(alerts_of(&storage, AlertType::ThresholdBreach).await.is_empty());
    }

    #[tokio::test]
    async fn test_rate_of_change_sees_sub_second_predecessor() {
        let (storage, building) = setup().await;
        add_rule(&storage, rule(UtilityType::Water, "rate_of_change", 20.0)).await;
        let earlier = "2026-01-01T12:00:00.100Z".parse::<DateTime<Utc>>().unwrap();
        let later = "2026-01-01T12:00:00.700Z".parse::<DateTime<Utc>>().unwrap();

        seed(&storage, &building, UtilityType::Water, &[(100.0, earlier)]).await;
        let (reading, alerts) = record(&storage, &building, UtilityType::Water, 125.0, later).await;

        assert_eq!(reading.reading_date, later);
        assert_eq!(kinds(&alerts), vec![AlertType::RuleTrigger]);
    }

    #[tokio::test]
    async fn test_failed_alert_insert_discards_reading() {
        let (storage, building) = setup().await;

        let mut tx = storage.begin().await.unwrap();
        sqlx::query(
            "CREATE TRIGGER reject_alerts BEFORE INSERT ON alerts \
             BEGIN SELECT RAISE(ABORT, 'alert storage unavailable'); END",
        )
        .execute(&mut *tx)
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let result = storage
            .record_reading(&new_reading(&building, UtilityType::Water, 5000.0, Utc::now()))
            .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("alert storage unavailable"), "{err}");

        let readings = storage
            .list_readings(&crate::model::ReadingsQuery {
                limit: 100,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(readings.is_empty());
        assert!(alerts_of(&storage, AlertType::ThresholdBreach).await.is_empty());
    }
}
