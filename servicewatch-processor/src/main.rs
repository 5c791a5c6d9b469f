//! ServiceWatch processor binary
//!
//! - `servicewatch-processor run <agent_id> <TASK>` runs a single invocation
//! - `servicewatch-processor` listens for invocations over MQTT

mod mqtt;
mod runner;

use anyhow::{bail, Context, Result};
use runner::Runner;
use servicewatch_processor::config::load_config;
use servicewatch_processor::TaskKind;
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: servicewatch-processor [run <agent_id> <DEPLOY|UPLINK|FETCH|DOWNLINK>]";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("servicewatch_processor=info")),
        )
        .init();

    let config = load_config().await;
    let runner = Runner::new(config.clone())?;
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.as_slice() {
        [] => {
            info!("ServiceWatch processor starting in listener mode");
            mqtt::listen(&config.mqtt, runner).await.context("Listener failed")
        }
        [cmd, agent_id, task] if cmd == "run" => {
            let task: TaskKind = task.parse()?;
            let outcome = runner.invoke(agent_id, task).await?;
            info!("{} for agent {} finished: {:?}", task, agent_id, outcome);
            Ok(())
        }
        _ => bail!(USAGE),
    }
}
