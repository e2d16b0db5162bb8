//! EDGERT brake-by-wire demonstrator node
//!
//! Hosts the four-corner brake control task set on the EDGERT runtime core:
//! pedal acquisition, torque mapping and the global controller on the
//! control core, one ABS stage and one actuator per wheel pinned to that
//! wheel's core. The host drives the engine lifecycle for the configured
//! experiment runtime, then shuts down and reports statistics.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

mod runnables;
mod telemetry;
mod wiring;

use anyhow::Context;
use clap::Parser;
use edgert::{NodeConfig, TaskEntry, TaskRegistry};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::telemetry::TelemetryServer;
use crate::wiring::BrakeLabels;

#[derive(Parser)]
#[command(name = "edgert-brake")]
#[command(about = "Four-corner brake-by-wire node on the EDGERT runtime core")]
#[command(version)]
struct Cli {
    /// Node configuration TOML; the built-in four-corner table is used when
    /// omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured experiment runtime
    #[arg(long)]
    runtime_ms: Option<u64>,

    /// Run without the in-process telemetry channel
    #[arg(long)]
    no_telemetry: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => NodeConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => default_node_config(),
    };
    if let Some(runtime_ms) = cli.runtime_ms {
        config.experiment_runtime_ms = runtime_ms;
    }

    let registry = TaskRegistry::new();
    let labels = BrakeLabels::register(&registry.label_store())?;

    // The telemetry queue must exist before runnable init so the controller
    // can attach to it.
    let telemetry = if cli.no_telemetry {
        None
    } else {
        Some(TelemetryServer::spawn()?)
    };

    config.register_into(&registry, |name| runnables::resolve(&labels, name))?;

    registry.init_runnables();
    registry.create_threads().context("starting task threads")?;

    info!(
        node = %config.node_name,
        tasks = registry.task_count(),
        runtime_ms = config.experiment_runtime_ms,
        "node running"
    );
    std::thread::sleep(Duration::from_millis(config.experiment_runtime_ms));

    registry.kill_threads();
    registry.join_threads();
    registry.deinit_runnables();
    if let Some(server) = telemetry {
        server.shutdown();
    }
    registry.print_statistics();
    info!(node = %config.node_name, "node stopped");
    Ok(())
}

/// The built-in registration table of this node, mirroring the reference
/// four-corner deployment: control chain on core 1, one ABS stage and one
/// actuator per wheel on that wheel's core.
fn default_node_config() -> NodeConfig {
    let mut tasks = vec![
        entry("brake_pedal", 20, 50, 0x2, 1),
        entry("torque_map", 30, 49, 0x2, 1),
        entry("brake_ctrl", 40, 48, 0x2, 1),
    ];
    let wheel_cores: [u64; 4] = [0x1, 0x2, 0x4, 0x8];
    for (i, wheel) in wiring::WHEELS.iter().enumerate() {
        tasks.push(entry(&format!("abs_{}", wheel), 50, 47 - i as i32, wheel_cores[i], 0));
        tasks.push(entry(
            &format!("actuator_{}", wheel),
            60,
            43 - i as i32,
            wheel_cores[i],
            0,
        ));
    }
    NodeConfig {
        node_name: "bbw-node-1".to_string(),
        experiment_runtime_ms: 30_000,
        local_ip: Some("192.168.1.211".to_string()),
        tasks,
    }
}

fn entry(name: &str, period_ms: u64, priority: i32, core_mask: u64, partition_id: u32) -> TaskEntry {
    TaskEntry {
        name: name.to_string(),
        period_ms,
        deadline_ms: 10,
        offset_us: 0,
        priority,
        core_mask,
        partition_id,
        runnable: Some(name.to_string()),
    }
}
