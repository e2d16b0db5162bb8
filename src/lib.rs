// edgert: Runtime core for the EDGERT distributed edge-control platform
// Periodic fixed-priority task engine, shared label store, framed message
// channels. One OS thread per task, SCHED_FIFO within a node, POSIX message
// queues between partitions.

#![warn(clippy::all)]
#![warn(rust_2018_idioms)]
// Note: unsafe code is isolated to the platform module and documented with
// safety justifications

//! # EDGERT Core
//!
//! The runtime core of a distributed edge-control platform for periodic,
//! priority-driven real-time workloads (the demonstrator is a four-corner
//! brake-by-wire node, see the `edgert-brake` crate).
//!
//! ## Key Components
//!
//! - **Time**: monotonic nanosecond clock, absolute-deadline sleep, calibrated
//!   busy-wait for synthetic load
//! - **Labels**: named fixed-size shared variables with linearisable per-label
//!   reads and writes
//! - **Channel**: named framed message transport over POSIX message queues,
//!   server creates / clients attach
//! - **Task engine**: one SCHED_FIFO thread per task, read–execute–write
//!   runnable phases, per-job statistics, cooperative termination
//! - **Config**: TOML registration table with environment overrides, consumed
//!   once at boot
//!
//! ## Lifecycle
//!
//! ```no_run
//! use edgert::prelude::*;
//!
//! let registry = TaskRegistry::new();
//! registry.add_task(TaskParams {
//!     name: "probe".into(),
//!     period_ms: 50,
//!     deadline_ms: 10,
//!     offset_us: 0,
//!     priority: 40,
//!     core_mask: 0x1,
//!     partition_id: 0,
//! })?;
//!
//! registry.init_runnables();
//! registry.create_threads()?;
//! // experiment runs...
//! registry.kill_threads();
//! registry.join_threads();
//! registry.deinit_runnables();
//! registry.print_statistics();
//! # Ok::<(), edgert::RtError>(())
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod labels;
mod platform;
pub mod runnable;
pub mod stats;
pub mod task;
pub mod time;

// Re-exports for convenience
pub use channel::{Channel, ChannelRole, ChannelState, CHANNEL_MSG_TYPE, MAX_PAYLOAD, QUEUE_DEPTH, REPLY_OK};
pub use config::{NodeConfig, TaskEntry};
pub use error::{RtError, RtResult};
pub use labels::{LabelId, LabelStore};
pub use runnable::{FnRunnable, Runnable, RunnableCtx, RunnableSpec};
pub use stats::{ExecSnapshot, ExecStats};
pub use task::{TaskHandle, TaskParams, TaskRegistry};
pub use time::{burn_cycles, now_ns, sleep_until};

/// Prelude for common imports
pub mod prelude {
    pub use crate::channel::{Channel, ChannelState};
    pub use crate::config::NodeConfig;
    pub use crate::error::{RtError, RtResult};
    pub use crate::labels::{LabelId, LabelStore};
    pub use crate::runnable::{FnRunnable, Runnable, RunnableCtx, RunnableSpec};
    pub use crate::task::{TaskHandle, TaskParams, TaskRegistry};
    pub use crate::time::{burn_cycles, now_ns, sleep_until};
}
