//! Per-invocation activity log, published to the device's log channel when
//! the invocation ends.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct ActivityLog {
    pub invocation_id: Uuid,
    pub agent_id: String,
    pub task: String,
    pub started_at: DateTime<Utc>,
    pub lines: Vec<String>,
}

impl ActivityLog {
    pub fn new(agent_id: impl Into<String>, task: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            invocation_id: Uuid::new_v4(),
            agent_id: agent_id.into(),
            task: task.into(),
            started_at,
            lines: Vec::new(),
        }
    }

    pub fn record(&mut self, line: impl Into<String>) {
        let line = line.into();
        info!(target: "servicewatch_processor::activity", agent = %self.agent_id, "{}", line);
        self.lines.push(line);
    }
}
