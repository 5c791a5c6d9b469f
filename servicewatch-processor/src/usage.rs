//! Usage rate estimation
//!
//! Daily rates for engine hours and odometer are taken against a reading from
//! roughly `window_days` ago. Uplinks are irregular, so when the slice of
//! history at the start of the window holds no usable reading for a counter,
//! the window is halved and searched again, up to `max_retries` times. A rate
//! found in an earlier, wider window is kept.

use crate::channels::{ChannelError, ChannelMessage, ChannelStore};
use crate::history::HistoryReader;
use crate::snapshot::CounterReading;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

pub const DEFAULT_MAX_RETRIES: u32 = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct UsageRateEstimate {
    pub hours_per_day: Option<f64>,
    pub km_per_day: Option<f64>,
}

/// Partial estimate carried from one window to the next.
#[derive(Debug, Clone)]
pub struct UsageAccumulator {
    current: CounterReading,
    estimate: UsageRateEstimate,
}

impl UsageAccumulator {
    pub fn new(current: CounterReading) -> Self {
        Self {
            current,
            estimate: UsageRateEstimate::default(),
        }
    }

    /// Folds one window of history in. Within a window the first message
    /// carrying a usable value fixes that counter's baseline; counters that
    /// already have a rate are left alone.
    pub fn absorb(&mut self, messages: &[ChannelMessage], window_days: f64) {
        let mut hours_base = None;
        let mut odometer_base = None;
        for message in messages {
            let reading = CounterReading::from_payload(&message.payload);
            hours_base = hours_base.or(reading.hours);
            odometer_base = odometer_base.or(reading.odometer_km);
            if hours_base.is_some() && odometer_base.is_some() {
                break;
            }
        }

        if self.estimate.hours_per_day.is_none() {
            self.estimate.hours_per_day = daily_rate(self.current.hours, hours_base, window_days);
        }
        if self.estimate.km_per_day.is_none() {
            self.estimate.km_per_day = daily_rate(self.current.odometer_km, odometer_base, window_days);
        }
    }

    /// True once every counter that has a current value also has a rate.
    pub fn is_settled(&self) -> bool {
        (self.current.hours.is_none() || self.estimate.hours_per_day.is_some())
            && (self.current.odometer_km.is_none() || self.estimate.km_per_day.is_some())
    }

    pub fn finish(self) -> UsageRateEstimate {
        self.estimate
    }
}

fn daily_rate(current: Option<f64>, historical: Option<f64>, window_days: f64) -> Option<f64> {
    let rate = (current? - historical?) / window_days;
    rate.is_finite().then_some(rate)
}

pub struct UsageRateEstimator<'a, S> {
    history: HistoryReader<'a, S>,
    max_retries: u32,
}

impl<'a, S: ChannelStore> UsageRateEstimator<'a, S> {
    pub fn new(history: HistoryReader<'a, S>) -> Self {
        Self {
            history,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// At most `max_retries + 1` history reads. Without a positive window no
    /// history is read and both rates stay `None`.
    pub async fn estimate(
        &self,
        now: DateTime<Utc>,
        current: CounterReading,
        window_days: Option<f64>,
    ) -> Result<UsageRateEstimate, ChannelError> {
        let mut accumulator = UsageAccumulator::new(current);
        if accumulator.is_settled() {
            return Ok(accumulator.finish());
        }

        let Some(mut window) = window_days.filter(|d| d.is_finite() && *d > 0.0) else {
            debug!("no averaging window configured, usage rates unavailable");
            return Ok(accumulator.finish());
        };

        for attempt in 0..=self.max_retries {
            let messages = self.history.messages_at(now, window).await?;
            accumulator.absorb(&messages, window);
            if accumulator.is_settled() {
                break;
            }
            if attempt < self.max_retries {
                debug!("usage history incomplete over {} days, halving window", window);
                window /= 2.0;
            }
        }

        let estimate = accumulator.finish();
        info!(
            "usage estimate: {:?} h/day, {:?} km/day",
            estimate.hours_per_day, estimate.km_per_day
        );
        Ok(estimate)
    }
}
