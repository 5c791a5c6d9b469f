//! ServiceWatch processor
//!
//! Forecasts when a piece of heavy equipment next needs servicing. Each
//! invocation reads the device's channels (latest telemetry, operator
//! maintenance settings, recent history), derives daily usage rates and
//! publishes the earliest of the calendar, engine-hour and odometer due dates.
//!
//! The channel platform and the telematics provider sit behind the
//! [`channels::ChannelStore`] and [`telematics::TelematicsSource`] traits;
//! [`processor::Processor`] drives one invocation against them.

pub mod activity;
pub mod baseline;
pub mod channels;
pub mod config;
pub mod days;
pub mod forecast;
pub mod history;
pub mod json;
pub mod platform;
pub mod processor;
pub mod publisher;
pub mod service_due;
pub mod snapshot;
pub mod telematics;
pub mod ui_schema;
pub mod usage;
pub mod validator;

pub use channels::{ChannelError, ChannelMessage, ChannelStore, MemoryChannelStore};
pub use config::AppConfig;
pub use processor::{CycleError, Processor, ProcessorSettings, TaskKind, TaskOutcome};
pub use snapshot::EquipmentIdentity;
