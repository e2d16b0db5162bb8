// edgert: Configuration intake
// TOML node configuration with environment overrides, consumed exactly once
// to populate the task registry. Loading hierarchy: env > file > defaults.

use crate::error::{RtError, RtResult};
use crate::runnable::RunnableSpec;
use crate::task::{TaskParams, TaskRegistry};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

fn default_node_name() -> String {
    "edgert-node".to_string()
}

fn default_runtime_ms() -> u64 {
    30_000
}

/// Per-node configuration: identity, experiment runtime and the static task
/// registration table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node identifier, also used to tag statistics output
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// How long the host lets the engine run before shutdown
    #[serde(default = "default_runtime_ms")]
    pub experiment_runtime_ms: u64,

    /// Informational only; the core never dials it
    #[serde(default)]
    pub local_ip: Option<String>,

    /// Static registration table, one entry per task
    #[serde(default)]
    pub tasks: Vec<TaskEntry>,
}

/// One row of the registration table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEntry {
    pub name: String,
    pub period_ms: u64,
    pub deadline_ms: u64,
    #[serde(default)]
    pub offset_us: u64,
    pub priority: i32,
    pub core_mask: u64,
    #[serde(default)]
    pub partition_id: u32,
    /// Name of the runnable to bind, resolved by the application
    #[serde(default)]
    pub runnable: Option<String>,
}

impl From<&TaskEntry> for TaskParams {
    fn from(entry: &TaskEntry) -> Self {
        TaskParams {
            name: entry.name.clone(),
            period_ms: entry.period_ms,
            deadline_ms: entry.deadline_ms,
            offset_us: entry.offset_us,
            priority: entry.priority,
            core_mask: entry.core_mask,
            partition_id: entry.partition_id,
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            experiment_runtime_ms: default_runtime_ms(),
            local_ip: None,
            tasks: Vec::new(),
        }
    }
}

impl NodeConfig {
    /// Load from a TOML file, apply `EDGERT_*` environment overrides and
    /// validate.
    pub fn load(path: &Path) -> RtResult<NodeConfig> {
        let content = std::fs::read_to_string(path)?;
        let mut config: NodeConfig = toml::from_str(&content)
            .map_err(|e| RtError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a TOML string and validate, without environment overrides.
    pub fn from_toml(content: &str) -> RtResult<NodeConfig> {
        let config: NodeConfig =
            toml::from_str(content).map_err(|e| RtError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> RtResult<()> {
        if let Ok(name) = std::env::var("EDGERT_NODE_NAME") {
            self.node_name = name;
        }
        if let Ok(runtime) = std::env::var("EDGERT_EXPERIMENT_RUNTIME_MS") {
            self.experiment_runtime_ms = runtime.parse().map_err(|_| {
                RtError::InvalidConfig(format!(
                    "EDGERT_EXPERIMENT_RUNTIME_MS: not a number: {}",
                    runtime
                ))
            })?;
        }
        Ok(())
    }

    /// Structural validation of the registration table; the registry repeats
    /// the per-task checks at `add_task` time.
    pub fn validate(&self) -> RtResult<()> {
        if self.node_name.is_empty() {
            return Err(RtError::InvalidConfig("empty node_name".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for task in &self.tasks {
            if task.name.is_empty() {
                return Err(RtError::InvalidConfig("empty task name".into()));
            }
            if !seen.insert(task.name.as_str()) {
                return Err(RtError::InvalidConfig(format!(
                    "duplicate task name {}",
                    task.name
                )));
            }
            if task.period_ms == 0 {
                return Err(RtError::InvalidConfig(format!(
                    "task {}: period_ms must be > 0",
                    task.name
                )));
            }
            if task.deadline_ms == 0 {
                return Err(RtError::InvalidConfig(format!(
                    "task {}: deadline_ms must be > 0",
                    task.name
                )));
            }
            if !(1..=99).contains(&task.priority) {
                return Err(RtError::InvalidConfig(format!(
                    "task {}: priority {} outside 1..=99",
                    task.name, task.priority
                )));
            }
            if task.core_mask == 0 {
                return Err(RtError::InvalidConfig(format!(
                    "task {}: empty core mask",
                    task.name
                )));
            }
        }
        Ok(())
    }

    /// Walk the registration table once: `add_task` for every entry, then
    /// bind runnables through the application-supplied resolver.
    pub fn register_into(
        &self,
        registry: &TaskRegistry,
        mut resolver: impl FnMut(&str) -> Option<RunnableSpec>,
    ) -> RtResult<()> {
        for entry in &self.tasks {
            registry.add_task(TaskParams::from(entry))?;
        }
        for entry in &self.tasks {
            if let Some(runnable_name) = &entry.runnable {
                let spec = resolver(runnable_name).ok_or_else(|| {
                    RtError::NotFound(format!("runnable {}", runnable_name))
                })?;
                registry.register_runnable(&entry.name, spec)?;
            }
        }
        info!(
            node = %self.node_name,
            tasks = self.tasks.len(),
            "registration table consumed"
        );
        Ok(())
    }
}
