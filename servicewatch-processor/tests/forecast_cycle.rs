//! Full invocations against in-memory channels.

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::{json, Value};
use servicewatch_devkit::{previous_ui_state, CommandsBuilder, EquipmentBuilder, TestHarness, TEST_AGENT_ID};
use servicewatch_processor::telematics::{TelematicsError, TelematicsSource};
use servicewatch_processor::validator::Rejection;
use servicewatch_processor::{
    ChannelError, ChannelMessage, ChannelStore, CycleError, EquipmentIdentity, MemoryChannelStore, Processor,
    TaskKind, TaskOutcome,
};

struct FakeTelematics {
    document: Option<Value>,
}

impl TelematicsSource for FakeTelematics {
    async fn equipment_snapshot(&self, _identity: &EquipmentIdentity) -> Result<Option<Value>, TelematicsError> {
        Ok(self.document.clone())
    }
}

/// In-memory channels that answer 503 on chosen operations.
struct FlakyStore {
    inner: MemoryChannelStore,
    fail_window_reads: bool,
    fail_publish_to: Option<&'static str>,
}

impl FlakyStore {
    fn new(inner: MemoryChannelStore) -> Self {
        Self {
            inner,
            fail_window_reads: false,
            fail_publish_to: None,
        }
    }
}

fn unavailable(channel: &str) -> ChannelError {
    ChannelError::Status {
        channel: channel.to_string(),
        status: 503,
    }
}

impl ChannelStore for FlakyStore {
    async fn publish(&self, channel: &str, document: &Value) -> Result<(), ChannelError> {
        if self.fail_publish_to == Some(channel) {
            return Err(unavailable(channel));
        }
        self.inner.publish(channel, document).await
    }

    async fn get_aggregate(&self, channel: &str) -> Result<Option<Value>, ChannelError> {
        self.inner.get_aggregate(channel).await
    }

    async fn get_messages_in_window(
        &self,
        channel: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ChannelMessage>, ChannelError> {
        if self.fail_window_reads {
            return Err(unavailable(channel));
        }
        self.inner.get_messages_in_window(channel, start, end).await
    }
}

/// 100 h at last service, 250 h interval, 200 h now, 150 h ten days ago.
fn hours_scenario() -> TestHarness {
    let harness = TestHarness::new();
    let current = EquipmentBuilder::new(&harness.identity)
        .hours(200.0)
        .running(true)
        .build();
    let past = EquipmentBuilder::new(&harness.identity).hours(150.0).build();
    harness
        .set_commands(
            CommandsBuilder::new()
                .last_service_hours(100.0)
                .interval_hours(250.0)
                .averaging_days(10.0)
                .build(),
        )
        .seed_history(TimeDelta::days(10), past)
        .set_uplink(current);
    harness
}

#[tokio::test]
async fn test_hours_forecast() {
    let harness = hours_scenario();

    let outcome = harness.invoke(TaskKind::Uplink).await.unwrap();
    let TaskOutcome::Forecast(report) = &outcome else {
        panic!("expected a forecast, got {:?}", outcome);
    };
    assert_eq!(report.usage.hours_per_day, Some(5.0));
    assert_eq!(report.candidates.hours, Some(harness.now() + TimeDelta::days(30)));
    assert_eq!(report.forecast.days_until_due, Some(30.0));

    assert_eq!(harness.ui_value("hoursTillNextService"), Some(json!(150.0)));
    assert_eq!(harness.ui_value("aveHoursPerDay"), Some(json!(5.0)));
    assert_eq!(harness.ui_value("daysTillNextService"), Some(json!(30)));
    assert_eq!(harness.ui_value("nextServiceEst"), Some(json!("01/07/2024")));
    assert_eq!(harness.ui_value("deviceRunHours"), Some(json!(200.0)));
    assert_eq!(harness.ui_value("engineOn"), Some(json!(true)));
    assert_eq!(harness.ui_value("kmsTillNextService"), Some(Value::Null));
    assert_eq!(harness.ui_value("aveKmsPerDay"), Some(Value::Null));
    harness
        .assert_field_equals(
            "ui_state",
            "state.children.maintenance_submodule.children.nextServiceHours.currentValue",
            &json!(350.0),
        )
        .unwrap();

    // 30 days out is beyond the 14 day default lead
    assert!(harness.published("significantEvent").is_empty());
}

#[tokio::test]
async fn test_earliest_candidate_wins() {
    let harness = hours_scenario();
    harness.set_commands(
        CommandsBuilder::new()
            .last_service_hours(100.0)
            .interval_hours(250.0)
            .averaging_days(10.0)
            .last_service_date("2024-05-15")
            .interval_months(0.2)
            .sms_lead_days(7.0)
            .build(),
    );

    harness.invoke(TaskKind::Uplink).await.unwrap();

    // ceil(0.2) months after 15 May beats the 30 day hours projection
    assert_eq!(harness.ui_value("nextServiceEst"), Some(json!("15/06/2024")));
    assert_eq!(harness.ui_value("daysTillNextService"), Some(json!(14)));
    harness
        .assert_field_equals(
            "ui_state",
            "state.children.maintenance_submodule.children.nextServiceDue.currentValue",
            &json!("15/06/2024"),
        )
        .unwrap();
}

#[tokio::test]
async fn test_identity_mismatch_publishes_nothing() {
    let harness = hours_scenario();
    let stranger = EquipmentIdentity::new("CAT", "D10T", "AMA00883");
    harness.set_uplink(
        EquipmentBuilder::new(&stranger)
            .hours(500.0)
            .location(-31.95, 115.86, 12.0)
            .build(),
    );

    let result = harness.invoke(TaskKind::Uplink).await;
    match result {
        Err(CycleError::IdentityMismatch(Rejection::Mismatch { field, received, .. })) => {
            assert_eq!(field, "Model");
            assert_eq!(received, "D10T");
        }
        other => panic!("expected identity mismatch, got {:?}", other),
    }

    assert!(harness.published("ui_state").is_empty());
    assert!(harness.published("location").is_empty());
    assert!(harness.published("significantEvent").is_empty());

    let log = harness.last_json("activity_logs").unwrap();
    let lines = log["lines"].as_array().unwrap();
    assert!(lines.iter().any(|l| l.as_str().unwrap_or_default().contains("uplink rejected")));
}

#[tokio::test]
async fn test_identity_is_case_sensitive() {
    let harness = TestHarness::new();
    harness.set_uplink(EquipmentBuilder::new(&EquipmentIdentity::new("cat", "D11T", "AMA00883")).build());

    let result = harness.invoke(TaskKind::Uplink).await;
    assert!(matches!(result, Err(CycleError::IdentityMismatch(_))));
    assert!(harness.published("ui_state").is_empty());
}

#[tokio::test]
async fn test_missing_uplink_is_rejected() {
    let harness = TestHarness::new();
    let result = harness.invoke(TaskKind::Uplink).await;
    assert!(matches!(result, Err(CycleError::IdentityMismatch(Rejection::NoSnapshot))));
}

#[tokio::test]
async fn test_all_nulls_keep_their_keys() {
    let harness = TestHarness::new();
    harness.set_uplink(EquipmentBuilder::new(&harness.identity).build());

    harness.invoke(TaskKind::Uplink).await.unwrap();

    for field in [
        "engineOn",
        "deviceRunHours",
        "deviceOdometer",
        "nextServiceEst",
        "daysTillNextService",
        "hoursTillNextService",
        "kmsTillNextService",
        "aveHoursPerDay",
        "aveKmsPerDay",
        "location",
    ] {
        let path = format!("state.children.{}.currentValue", field);
        harness.assert_field_exists("ui_state", &path).unwrap();
        assert_eq!(harness.ui_value(field), Some(Value::Null), "{} should be null", field);
    }
    assert!(harness.published("location").is_empty());
    assert!(harness.published("significantEvent").is_empty());
}

#[tokio::test]
async fn test_repeated_invocation_is_stable() {
    let harness = hours_scenario();

    harness.invoke(TaskKind::Uplink).await.unwrap();
    harness.invoke(TaskKind::Uplink).await.unwrap();

    let states = harness.published("ui_state");
    assert_eq!(states.len(), 2);
    assert_eq!(states[0], states[1]);
}

#[tokio::test]
async fn test_window_halving_keeps_earlier_rates() {
    let harness = TestHarness::new();
    let id = harness.identity.clone();
    harness
        .set_commands(
            CommandsBuilder::new()
                .last_service_odo(0.0)
                .interval_odo(2000.0)
                .averaging_days(10.0)
                .build(),
        )
        // hours only at the full window
        .seed_history(TimeDelta::days(10), EquipmentBuilder::new(&id).hours(150.0).build())
        // odometer only after two halvings; its hours must not replace the first rate
        .seed_history(
            TimeDelta::hours(60),
            EquipmentBuilder::new(&id).hours(190.0).odometer(900.0).build(),
        )
        .set_uplink(EquipmentBuilder::new(&id).hours(200.0).odometer(1000.0).build());

    harness.invoke(TaskKind::Uplink).await.unwrap();

    assert_eq!(harness.ui_value("aveHoursPerDay"), Some(json!(5.0)));
    assert_eq!(harness.ui_value("aveKmsPerDay"), Some(json!(40.0)));
    assert_eq!(harness.ui_value("kmsTillNextService"), Some(json!(1000.0)));
    assert_eq!(harness.ui_value("daysTillNextService"), Some(json!(25)));
}

#[tokio::test]
async fn test_rate_stays_null_past_retry_budget() {
    let harness = TestHarness::new();
    let id = harness.identity.clone();
    harness
        .set_commands(CommandsBuilder::new().averaging_days(10.0).build())
        // would need a third halving
        .seed_history(TimeDelta::hours(30), EquipmentBuilder::new(&id).odometer(900.0).build())
        .set_uplink(EquipmentBuilder::new(&id).odometer(1000.0).build());

    harness.invoke(TaskKind::Uplink).await.unwrap();
    assert_eq!(harness.ui_value("aveKmsPerDay"), Some(Value::Null));
}

#[tokio::test]
async fn test_alert_fires_once_when_entering_lead_window() {
    let harness = TestHarness::new();
    harness
        .set_commands(
            CommandsBuilder::new()
                .last_service_date("2024-05-15")
                .interval_months(1.0)
                .build(),
        )
        .set_uplink(EquipmentBuilder::new(&harness.identity).build());

    harness.invoke(TaskKind::Uplink).await.unwrap();
    harness.invoke(TaskKind::Uplink).await.unwrap();

    let alerts = harness.published("significantEvent");
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["message"], "Service due in 14 days (15/06/2024)");
}

#[tokio::test]
async fn test_no_alert_when_already_inside_lead_window() {
    let harness = TestHarness::new();
    harness
        .set_commands(
            CommandsBuilder::new()
                .last_service_date("2024-05-15")
                .interval_months(1.0)
                .build(),
        )
        .set_ui_state(previous_ui_state(Some(15)))
        .set_uplink(EquipmentBuilder::new(&harness.identity).build());

    // 15 -> 14 crosses into the default 14 day lead
    harness.invoke(TaskKind::Uplink).await.unwrap();
    assert_eq!(harness.published("significantEvent").len(), 1);

    harness.store.clear();
    harness
        .set_commands(
            CommandsBuilder::new()
                .last_service_date("2024-05-15")
                .interval_months(1.0)
                .build(),
        )
        .set_ui_state(previous_ui_state(Some(14)))
        .set_uplink(EquipmentBuilder::new(&harness.identity).build());
    harness.invoke(TaskKind::Uplink).await.unwrap();
    assert!(harness.published("significantEvent").is_empty());
}

#[tokio::test]
async fn test_overdue_service() {
    let harness = TestHarness::new();
    let id = harness.identity.clone();
    harness
        .set_commands(
            CommandsBuilder::new()
                .last_service_hours(100.0)
                .interval_hours(250.0)
                .averaging_days(10.0)
                .build(),
        )
        .seed_history(TimeDelta::days(10), EquipmentBuilder::new(&id).hours(350.0).build())
        .set_uplink(EquipmentBuilder::new(&id).hours(400.0).build());

    harness.invoke(TaskKind::Uplink).await.unwrap();

    assert_eq!(harness.ui_value("hoursTillNextService"), Some(json!(-50.0)));
    assert_eq!(harness.ui_value("daysTillNextService"), Some(json!(-10)));
    let alert = harness.last_json("significantEvent").unwrap();
    assert_eq!(alert["message"], "Service overdue by 10 days (was due 22/05/2024)");
}

#[tokio::test]
async fn test_location_published_with_state() {
    let harness = TestHarness::new();
    harness.set_uplink(
        EquipmentBuilder::new(&harness.identity)
            .hours(10.0)
            .location(-31.95, 115.86, 12.0)
            .build(),
    );

    harness.invoke(TaskKind::Uplink).await.unwrap();

    let location = harness.store.messages("location");
    let state = harness.store.messages("ui_state");
    assert_eq!(location.len(), 1);
    assert_eq!(location[0].payload, json!({"lat": -31.95, "long": 115.86, "alt": 12.0}));
    assert!(state[0].timestamp <= location[0].timestamp);
    assert_eq!(harness.ui_value("location"), Some(json!({"lat": -31.95, "long": 115.86, "alt": 12.0})));
}

#[tokio::test]
async fn test_history_read_failure_aborts_before_publishing() {
    let harness = hours_scenario();
    harness.set_uplink(
        EquipmentBuilder::new(&harness.identity)
            .hours(200.0)
            .location(-31.95, 115.86, 12.0)
            .build(),
    );
    let store = FlakyStore {
        fail_window_reads: true,
        ..FlakyStore::new(harness.store.clone())
    };

    let result = Processor::new(store, harness.settings())
        .invoke(TaskKind::Uplink, harness.now())
        .await;
    match result {
        Err(CycleError::Channel(ChannelError::Status { channel, status })) => {
            assert_eq!(channel, "uplink_recv");
            assert_eq!(status, 503);
        }
        other => panic!("expected a channel failure, got {:?}", other),
    }

    assert!(harness.published("ui_state").is_empty());
    assert!(harness.published("location").is_empty());
    assert!(harness.published("significantEvent").is_empty());

    let logs = harness.published("activity_logs");
    assert_eq!(logs.len(), 1);
    assert!(logs[0]["lines"]
        .as_array()
        .unwrap()
        .iter()
        .any(|l| l.as_str().unwrap_or_default().contains("HTTP 503")));
}

#[tokio::test]
async fn test_state_publish_failure_writes_nothing_else() {
    let harness = TestHarness::new();
    harness
        .set_commands(
            CommandsBuilder::new()
                .last_service_date("2024-05-15")
                .interval_months(1.0)
                .build(),
        )
        .set_uplink(
            EquipmentBuilder::new(&harness.identity)
                .location(-31.95, 115.86, 12.0)
                .build(),
        );
    let store = FlakyStore {
        fail_publish_to: Some("ui_state"),
        ..FlakyStore::new(harness.store.clone())
    };

    let result = Processor::new(store, harness.settings())
        .invoke(TaskKind::Uplink, harness.now())
        .await;
    assert!(matches!(
        result,
        Err(CycleError::Channel(ChannelError::Status { status: 503, .. }))
    ));

    // the same inputs would have raised an alert
    assert!(harness.published("ui_state").is_empty());
    assert!(harness.published("location").is_empty());
    assert!(harness.published("significantEvent").is_empty());
    assert_eq!(harness.published("activity_logs").len(), 1);

    harness.invoke(TaskKind::Uplink).await.unwrap();
    assert_eq!(harness.published("significantEvent").len(), 1);
    assert_eq!(harness.published("location").len(), 1);
}

#[tokio::test]
async fn test_fetch_relays_provider_snapshot() {
    let harness = TestHarness::new();
    let document = EquipmentBuilder::new(&harness.identity).hours(1234.5).build();

    let outcome = harness
        .invoke_with(
            TaskKind::Fetch,
            FakeTelematics {
                document: Some(document.clone()),
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome, TaskOutcome::Fetched { published: true });
    assert_eq!(harness.published("uplink_recv"), vec![document]);
    assert!(harness.published("ui_state").is_empty());
}

#[tokio::test]
async fn test_fetch_without_equipment() {
    let harness = TestHarness::new();
    let outcome = harness
        .invoke_with(TaskKind::Fetch, FakeTelematics { document: None })
        .await
        .unwrap();

    assert_eq!(outcome, TaskOutcome::Fetched { published: false });
    assert!(harness.published("uplink_recv").is_empty());
}

#[tokio::test]
async fn test_deploy_publishes_schema() {
    let mut harness = TestHarness::new();
    harness.expect_messages("ui_state", 1);

    assert_eq!(harness.invoke(TaskKind::Deploy).await.unwrap(), TaskOutcome::Deployed);

    harness.verify_expectations().unwrap();
    harness
        .assert_field_equals(
            "ui_state",
            "state.children.smsServiceAlert.displayString",
            &json!("Text me 14 days before next service"),
        )
        .unwrap();
    harness
        .assert_field_exists("ui_state", "state.children.maintenance_submodule.children.lastServiceDate")
        .unwrap();
}

#[tokio::test]
async fn test_activity_log_published_per_invocation() {
    let harness = hours_scenario();

    harness.invoke(TaskKind::Uplink).await.unwrap();
    harness.invoke(TaskKind::Downlink).await.unwrap();

    let logs = harness.published("activity_logs");
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0]["task"], "UPLINK");
    assert_eq!(logs[0]["agent_id"], TEST_AGENT_ID);
    assert!(logs[0]["lines"]
        .as_array()
        .unwrap()
        .iter()
        .any(|l| l == "machine details match uplink"));
    assert_eq!(logs[1]["task"], "DOWNLINK");
    assert_ne!(logs[0]["invocation_id"], logs[1]["invocation_id"]);

    harness.get_stats().print();
}
