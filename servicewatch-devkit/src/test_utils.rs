/*!
Test harness for processor invocations

Runs the processor against in-memory channels:
- channel seeding at fixed times relative to a frozen "now"
- expectations on the number of documents published per channel
- dot-path assertions on the latest document of a channel
*/

use anyhow::Result;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde_json::Value;
use servicewatch_processor::config::{ChannelNames, ForecastConf};
use servicewatch_processor::telematics::TelematicsSource;
use servicewatch_processor::{
    CycleError, EquipmentIdentity, MemoryChannelStore, Processor, ProcessorSettings, TaskKind, TaskOutcome,
};
use std::collections::HashMap;

pub const TEST_AGENT_ID: &str = "9843b273";

pub struct TestHarness {
    pub store: MemoryChannelStore,
    pub identity: EquipmentIdentity,
    pub channels: ChannelNames,
    pub forecast: ForecastConf,
    now: DateTime<Utc>,
    expectations: Vec<Expectation>,
}

#[derive(Debug)]
struct Expectation {
    channel: String,
    expected_count: usize,
}

impl TestHarness {
    pub fn new() -> Self {
        env_logger::try_init().ok();

        Self {
            store: MemoryChannelStore::new(),
            identity: EquipmentIdentity::new("CAT", "D11T", "AMA00883"),
            channels: ChannelNames::default(),
            forecast: ForecastConf::default(),
            now: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).single().unwrap_or_default(),
            expectations: Vec::new(),
        }
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn settings(&self) -> ProcessorSettings {
        ProcessorSettings {
            agent_id: TEST_AGENT_ID.to_string(),
            identity: Some(self.identity.clone()),
            channels: self.channels.clone(),
            forecast: self.forecast.clone(),
        }
    }

    pub fn processor(&self) -> Processor<MemoryChannelStore> {
        Processor::new(self.store.clone(), self.settings())
    }

    /// Latest uplink, received at "now".
    pub fn set_uplink(&self, doc: Value) -> &Self {
        self.store.insert(&self.channels.uplink, self.now, doc);
        self
    }

    /// Past uplink, received `age` before "now".
    pub fn seed_history(&self, age: TimeDelta, doc: Value) -> &Self {
        self.store.insert(&self.channels.uplink, self.now - age, doc);
        log::debug!("Seeded uplink history {} before now", age);
        self
    }

    pub fn set_commands(&self, doc: Value) -> &Self {
        self.store.insert(&self.channels.ui_cmds, self.now, doc);
        self
    }

    pub fn set_ui_state(&self, doc: Value) -> &Self {
        self.store.insert(&self.channels.ui_state, self.now, doc);
        self
    }

    pub async fn invoke(&self, task: TaskKind) -> Result<TaskOutcome, CycleError> {
        log::info!("Invoking {} at {}", task, self.now);
        self.processor().invoke(task, self.now).await
    }

    pub async fn invoke_with<T: TelematicsSource>(
        &self,
        task: TaskKind,
        telematics: T,
    ) -> Result<TaskOutcome, CycleError> {
        log::info!("Invoking {} at {} with telematics", task, self.now);
        self.processor().with_telematics(telematics).invoke(task, self.now).await
    }

    pub fn published(&self, channel: &str) -> Vec<Value> {
        self.store.messages(channel).into_iter().map(|m| m.payload).collect()
    }

    pub fn last_json(&self, channel: &str) -> Option<Value> {
        self.store.latest(channel)
    }

    pub fn expect_messages(&mut self, channel: &str, count: usize) -> &mut Self {
        self.expectations.push(Expectation {
            channel: channel.to_string(),
            expected_count: count,
        });
        self
    }

    pub fn verify_expectations(&self) -> Result<()> {
        for expectation in &self.expectations {
            let actual_count = self.store.messages(&expectation.channel).len();
            if actual_count != expectation.expected_count {
                anyhow::bail!(
                    "Expectation failed for channel '{}': expected {} messages, got {}",
                    expectation.channel,
                    expectation.expected_count,
                    actual_count
                );
            }
            log::info!("Channel '{}': {} messages as expected", expectation.channel, actual_count);
        }
        Ok(())
    }

    pub fn assert_field_exists(&self, channel: &str, field_path: &str) -> Result<()> {
        if let Some(doc) = self.last_json(channel) {
            if get_nested_field(&doc, field_path).is_some() {
                return Ok(());
            }
        }
        anyhow::bail!("Field '{}' not found in latest document on {}", field_path, channel);
    }

    pub fn assert_field_equals(&self, channel: &str, field_path: &str, expected: &Value) -> Result<()> {
        let Some(doc) = self.last_json(channel) else {
            anyhow::bail!("No document on {}", channel);
        };
        match get_nested_field(&doc, field_path) {
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => anyhow::bail!(
                "Field '{}' mismatch: expected {:?}, got {:?}",
                field_path,
                expected,
                actual
            ),
            None => anyhow::bail!("Field '{}' not found for comparison in {}", field_path, channel),
        }
    }

    /// `{"state": {"children": {<field>: {"currentValue": ...}}}}` of the latest ui_state.
    pub fn ui_value(&self, field: &str) -> Option<Value> {
        let doc = self.last_json(&self.channels.ui_state)?;
        get_nested_field(&doc, &format!("state.children.{}.currentValue", field)).cloned()
    }

    pub fn get_stats(&self) -> TestStats {
        let mut channel_counts = HashMap::new();
        for channel in [
            &self.channels.uplink,
            &self.channels.ui_state,
            &self.channels.ui_cmds,
            &self.channels.location,
            &self.channels.notifications,
            &self.channels.activity_log,
        ] {
            let count = self.store.messages(channel).len();
            if count > 0 {
                channel_counts.insert(channel.clone(), count);
            }
        }
        TestStats {
            total_messages: channel_counts.values().sum(),
            channel_counts,
        }
    }

    pub fn reset(&mut self) {
        self.store.clear();
        self.expectations.clear();
        log::info!("Test harness reset");
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn get_nested_field<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, part| match current {
        Value::Object(obj) => obj.get(part),
        _ => None,
    })
}

#[derive(Debug)]
pub struct TestStats {
    pub total_messages: usize,
    pub channel_counts: HashMap<String, usize>,
}

impl TestStats {
    pub fn print(&self) {
        println!("Test statistics:");
        println!("  Total messages: {}", self.total_messages);
        for (channel, count) in &self.channel_counts {
            println!("    {}: {} messages", channel, count);
        }
    }
}
