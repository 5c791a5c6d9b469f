//! History reader: a short slice of the uplink channel's past, taken a given
//! number of days before now.

use crate::channels::{ChannelError, ChannelMessage, ChannelStore};
use crate::days;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Width of the slice read at the start of an averaging window.
pub const DEFAULT_SPAN_DAYS: f64 = 0.3;

pub struct HistoryReader<'a, S> {
    store: &'a S,
    channel: &'a str,
    span_days: f64,
}

impl<'a, S: ChannelStore> HistoryReader<'a, S> {
    pub fn new(store: &'a S, channel: &'a str) -> Self {
        Self {
            store,
            channel,
            span_days: DEFAULT_SPAN_DAYS,
        }
    }

    pub fn with_span_days(mut self, span_days: f64) -> Self {
        self.span_days = span_days;
        self
    }

    /// `[now - window_days, now - window_days + span_days)`, or `None` when
    /// the window cannot be represented.
    pub fn window(&self, now: DateTime<Utc>, window_days: f64) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = days::offset(now, -window_days)?;
        let end = days::offset(start, self.span_days)?;
        Some((start, end))
    }

    /// Messages published at the start of a `window_days` averaging window.
    pub async fn messages_at(&self, now: DateTime<Utc>, window_days: f64) -> Result<Vec<ChannelMessage>, ChannelError> {
        let Some((start, end)) = self.window(now, window_days) else {
            debug!("averaging window of {} days is not representable", window_days);
            return Ok(Vec::new());
        };
        let messages = self.store.get_messages_in_window(self.channel, start, end).await?;
        debug!(
            "history {} [{} .. {}): {} messages",
            self.channel,
            start.to_rfc3339(),
            end.to_rfc3339(),
            messages.len()
        );
        Ok(messages)
    }
}
