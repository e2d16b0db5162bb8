// edgert: Periodic task engine
// Preemptive fixed-priority scheduling atop SCHED_FIFO, one OS thread per
// registered task, read-execute-write runnable phases, cooperative
// termination. The registry owns the descriptor table; handles are stable
// small-integer indexes into it.

use crate::error::{RtError, RtResult};
use crate::labels::LabelStore;
use crate::runnable::RunnableSpec;
use crate::stats::{ExecSnapshot, ExecStats};
use crate::time;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lowest and highest usable SCHED_FIFO priority on Linux.
const MIN_RT_PRIORITY: i32 = 1;
const MAX_RT_PRIORITY: i32 = 99;

/// Registration-time attributes of a task, all immutable once the task is
/// started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskParams {
    pub name: String,
    pub period_ms: u64,
    pub deadline_ms: u64,
    pub offset_us: u64,
    /// Static priority in the SCHED_FIFO band (1..=99)
    pub priority: i32,
    /// CPU affinity bitmask, bit i = CPU i
    pub core_mask: u64,
    /// Logical partition id; informational on this target, no enforcement
    pub partition_id: u32,
}

/// Stable handle of a registered task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u32);

struct TaskDesc {
    name: String,
    period_ns: u64,
    deadline_ns: u64,
    offset_ns: u64,
    priority: i32,
    core_mask: u64,
    partition_id: u32,
    runnable: Mutex<Option<Box<RunnableSpec>>>,
    terminate: AtomicBool,
    current_job_id: AtomicU64,
    stats: ExecStats,
}

struct RegistryInner {
    tasks: Vec<Arc<TaskDesc>>,
    by_name: FxHashMap<String, TaskHandle>,
    join_handles: Vec<Option<JoinHandle<()>>>,
}

/// The node-wide task registry and engine lifecycle driver.
///
/// Constructed once by the host at process start; all registration happens
/// before [`TaskRegistry::create_threads`], and the host drives
/// `init_runnables` → `create_threads` → `kill_threads` → `join_threads` →
/// `deinit_runnables` in that order.
pub struct TaskRegistry {
    store: Arc<LabelStore>,
    inner: Mutex<RegistryInner>,
}

impl TaskRegistry {
    /// Create a registry owning a fresh label store.
    pub fn new() -> Self {
        Self::with_label_store(Arc::new(LabelStore::new()))
    }

    /// Create a registry over an existing label store.
    pub fn with_label_store(store: Arc<LabelStore>) -> Self {
        Self {
            store,
            inner: Mutex::new(RegistryInner {
                tasks: Vec::new(),
                by_name: FxHashMap::default(),
                join_handles: Vec::new(),
            }),
        }
    }

    /// The label store this engine stages runnable I/O through.
    pub fn label_store(&self) -> Arc<LabelStore> {
        Arc::clone(&self.store)
    }

    /// Insert a task descriptor. Rejects duplicate names and invalid timing
    /// or scheduling parameters.
    pub fn add_task(&self, params: TaskParams) -> RtResult<TaskHandle> {
        validate_params(&params)?;
        let mut inner = self.inner.lock();
        if inner.by_name.contains_key(&params.name) {
            return Err(RtError::AlreadyExists(format!("task {}", params.name)));
        }

        let handle = TaskHandle(inner.tasks.len() as u32);
        let desc = Arc::new(TaskDesc {
            name: params.name.clone(),
            period_ns: params.period_ms * 1_000_000,
            deadline_ns: params.deadline_ms * 1_000_000,
            offset_ns: params.offset_us * 1_000,
            priority: params.priority,
            core_mask: params.core_mask,
            partition_id: params.partition_id,
            runnable: Mutex::new(None),
            terminate: AtomicBool::new(false),
            current_job_id: AtomicU64::new(0),
            stats: ExecStats::new(),
        });
        inner.tasks.push(desc);
        inner.join_handles.push(None);
        inner.by_name.insert(params.name.clone(), handle);

        info!(
            task = %params.name,
            period_ms = params.period_ms,
            priority = params.priority,
            core_mask = %format_args!("{:#x}", params.core_mask),
            partition = params.partition_id,
            "added task"
        );
        Ok(handle)
    }

    /// Bind a runnable to an existing task. Must be called before
    /// [`TaskRegistry::create_threads`]; a task left unbound runs empty jobs.
    pub fn register_runnable(&self, name: &str, spec: RunnableSpec) -> RtResult<()> {
        let inner = self.inner.lock();
        let handle = *inner
            .by_name
            .get(name)
            .ok_or_else(|| RtError::NotFound(format!("task {}", name)))?;
        if inner.join_handles[handle.0 as usize].is_some() {
            return Err(RtError::InvalidConfig(format!(
                "task {} already started",
                name
            )));
        }
        *inner.tasks[handle.0 as usize].runnable.lock() = Some(Box::new(spec));
        info!(task = name, "registered runnable");
        Ok(())
    }

    /// Run every bound runnable's init hook. Invoked once before
    /// [`TaskRegistry::create_threads`].
    pub fn init_runnables(&self) {
        let inner = self.inner.lock();
        for desc in &inner.tasks {
            if let Some(spec) = desc.runnable.lock().as_mut() {
                spec.run_init();
                debug!(task = %desc.name, "runnable initialised");
            }
        }
    }

    /// Spawn one OS thread per registered task. Spawn failures are logged,
    /// the offending task is omitted from the run, and the first failure is
    /// reported back so the host can exit non-zero.
    pub fn create_threads(&self) -> RtResult<()> {
        let mut inner = self.inner.lock();
        let mut first_failure = None;
        for idx in 0..inner.tasks.len() {
            if inner.join_handles[idx].is_some() {
                continue;
            }
            let desc = Arc::clone(&inner.tasks[idx]);
            let store = Arc::clone(&self.store);
            let spawned = std::thread::Builder::new()
                .name(desc.name.clone())
                .spawn(move || periodic_loop(desc, store));
            match spawned {
                Ok(handle) => {
                    inner.join_handles[idx] = Some(handle);
                    info!(task = %inner.tasks[idx].name, "created thread");
                }
                Err(e) => {
                    error!(task = %inner.tasks[idx].name, error = %e, "failed to create thread");
                    if first_failure.is_none() {
                        first_failure = Some(RtError::ThreadSpawn(inner.tasks[idx].name.clone()));
                    }
                }
            }
        }
        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Set every task's termination flag. Purely cooperative; threads finish
    /// their current (or one pending) job and exit their loop.
    pub fn kill_threads(&self) {
        let inner = self.inner.lock();
        for desc in &inner.tasks {
            desc.terminate.store(true, Ordering::Release);
        }
        debug!(tasks = inner.tasks.len(), "termination requested");
    }

    /// Join every spawned thread. Waits indefinitely; callers must have
    /// issued [`TaskRegistry::kill_threads`] beforehand.
    pub fn join_threads(&self) {
        let handles: Vec<(String, JoinHandle<()>)> = {
            let mut inner = self.inner.lock();
            let names: Vec<String> = inner.tasks.iter().map(|d| d.name.clone()).collect();
            inner
                .join_handles
                .iter_mut()
                .zip(names)
                .filter_map(|(slot, name)| slot.take().map(|h| (name, h)))
                .collect()
        };
        for (name, handle) in handles {
            if handle.join().is_err() {
                error!(task = %name, "task thread panicked");
            }
        }
    }

    /// Run every bound runnable's deinit hook. Invoked once after
    /// [`TaskRegistry::join_threads`].
    pub fn deinit_runnables(&self) {
        let inner = self.inner.lock();
        for desc in &inner.tasks {
            if let Some(spec) = desc.runnable.lock().as_mut() {
                spec.run_deinit();
                debug!(task = %desc.name, "runnable deinitialised");
            }
        }
    }

    /// Handle of a task by name.
    pub fn handle(&self, name: &str) -> Option<TaskHandle> {
        self.inner.lock().by_name.get(name).copied()
    }

    /// Number of registered tasks.
    pub fn task_count(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    /// Jobs completed by the task so far.
    pub fn job_count(&self, handle: TaskHandle) -> RtResult<u64> {
        Ok(self.desc(handle)?.current_job_id.load(Ordering::Acquire))
    }

    /// Snapshot of the task's execution statistics.
    pub fn stats(&self, handle: TaskHandle) -> RtResult<ExecSnapshot> {
        Ok(self.desc(handle)?.stats.snapshot())
    }

    /// Emit per-task statistics through the log after shutdown.
    pub fn print_statistics(&self) {
        let inner = self.inner.lock();
        for desc in &inner.tasks {
            let snap = desc.stats.snapshot();
            info!(
                task = %desc.name,
                partition = desc.partition_id,
                jobs = snap.count,
                mean_us = snap.mean_ns() / 1_000,
                min_us = snap.min_ns / 1_000,
                max_us = snap.max_ns / 1_000,
                deadline_misses = snap.deadline_misses,
                "task statistics"
            );
        }
    }

    fn desc(&self, handle: TaskHandle) -> RtResult<Arc<TaskDesc>> {
        self.inner
            .lock()
            .tasks
            .get(handle.0 as usize)
            .cloned()
            .ok_or_else(|| RtError::NotFound(format!("task handle {}", handle.0)))
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_params(params: &TaskParams) -> RtResult<()> {
    if params.name.is_empty() {
        return Err(RtError::InvalidConfig("empty task name".into()));
    }
    if params.period_ms == 0 {
        return Err(RtError::InvalidConfig(format!(
            "task {}: period_ms must be > 0",
            params.name
        )));
    }
    if params.deadline_ms == 0 {
        return Err(RtError::InvalidConfig(format!(
            "task {}: deadline_ms must be > 0",
            params.name
        )));
    }
    if !(MIN_RT_PRIORITY..=MAX_RT_PRIORITY).contains(&params.priority) {
        return Err(RtError::InvalidConfig(format!(
            "task {}: priority {} outside {}..={}",
            params.name, params.priority, MIN_RT_PRIORITY, MAX_RT_PRIORITY
        )));
    }
    if params.core_mask == 0 {
        return Err(RtError::InvalidConfig(format!(
            "task {}: empty core mask",
            params.name
        )));
    }
    let online = num_cpus::get();
    if online < 64 && params.core_mask >> online != 0 {
        warn!(
            task = %params.name,
            core_mask = %format_args!("{:#x}", params.core_mask),
            online,
            "core mask references CPUs beyond this node"
        );
    }
    Ok(())
}

/// The per-thread periodic activation loop.
///
/// Applies scheduling parameters best-effort, then paces jobs off absolute
/// activation times. An overrunning job never causes the next activation to
/// be skipped; late activations run back-to-back until the schedule is
/// caught up.
fn periodic_loop(desc: Arc<TaskDesc>, store: Arc<LabelStore>) {
    debug!(task = %desc.name, "thread started");

    if let Err(e) = crate::platform::unsafe_ops::set_fifo_priority(desc.priority) {
        warn!(
            task = %desc.name,
            priority = desc.priority,
            error = %e,
            "failed to apply SCHED_FIFO priority, continuing with default scheduling"
        );
    }
    if let Err(e) = crate::platform::unsafe_ops::pin_to_cores(desc.core_mask) {
        warn!(
            task = %desc.name,
            core_mask = %format_args!("{:#x}", desc.core_mask),
            error = %e,
            "failed to apply CPU affinity"
        );
    }

    // The thread owns the spec for the duration of the run and returns it at
    // exit so deinit_runnables can reach it.
    let mut spec = desc.runnable.lock().take();

    let mut next_activation = time::now_ns() + desc.offset_ns;
    while !desc.terminate.load(Ordering::Acquire) {
        time::sleep_until(next_activation);

        let job_id = desc.current_job_id.fetch_add(1, Ordering::AcqRel) + 1;
        let start = time::now_ns();

        if let Some(spec) = spec.as_mut() {
            match spec.read_phase(&store) {
                Ok(()) => {
                    spec.execute_phase();
                    if let Err(e) = spec.write_phase(&store) {
                        error!(task = %desc.name, job = job_id, error = %e, "write phase failed");
                    }
                }
                // A size mismatch is fatal for this job only; the counter has
                // already advanced and the schedule continues.
                Err(e) => {
                    error!(task = %desc.name, job = job_id, error = %e, "read phase failed");
                }
            }
        }

        let end = time::now_ns();
        let exec_ns = end - start;
        desc.stats.record(exec_ns);
        if exec_ns > desc.deadline_ns || end > next_activation + desc.deadline_ns {
            desc.stats.record_deadline_miss();
            debug!(
                task = %desc.name,
                job = job_id,
                exec_us = exec_ns / 1_000,
                deadline_us = desc.deadline_ns / 1_000,
                "deadline miss"
            );
        }

        next_activation += desc.period_ns;
    }

    if let Some(returned) = spec.take() {
        *desc.runnable.lock() = Some(returned);
    }
    debug!(task = %desc.name, jobs = desc.current_job_id.load(Ordering::Acquire), "thread terminated");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runnable::{FnRunnable, RunnableCtx, RunnableSpec};

    fn params(name: &str) -> TaskParams {
        TaskParams {
            name: name.to_string(),
            period_ms: 10,
            deadline_ms: 10,
            offset_us: 0,
            priority: 40,
            core_mask: 0x1,
            partition_id: 0,
        }
    }

    #[test]
    fn test_zero_period_rejected() {
        let registry = TaskRegistry::new();
        let mut p = params("bad");
        p.period_ms = 0;
        assert!(matches!(
            registry.add_task(p),
            Err(RtError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_priority_band_enforced() {
        let registry = TaskRegistry::new();
        let mut p = params("low");
        p.priority = 0;
        assert!(registry.add_task(p).is_err());
        let mut p = params("high");
        p.priority = 100;
        assert!(registry.add_task(p).is_err());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let registry = TaskRegistry::new();
        registry.add_task(params("abs_fl")).unwrap();
        assert!(matches!(
            registry.add_task(params("abs_fl")),
            Err(RtError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_register_runnable_unknown_task() {
        let registry = TaskRegistry::new();
        let spec = RunnableSpec::new(FnRunnable(|_: &mut RunnableCtx<'_>| {}));
        assert!(matches!(
            registry.register_runnable("ghost", spec),
            Err(RtError::NotFound(_))
        ));
    }

    #[test]
    fn test_empty_jobs_without_runnable() {
        // An unbound task still paces; useful for probing scheduling overhead.
        let registry = TaskRegistry::new();
        let handle = registry.add_task(params("probe")).unwrap();

        registry.init_runnables();
        registry.create_threads().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(55));
        registry.kill_threads();
        registry.join_threads();
        registry.deinit_runnables();

        let jobs = registry.job_count(handle).unwrap();
        assert!(jobs >= 3, "only {} jobs", jobs);
        assert_eq!(registry.stats(handle).unwrap().count, jobs);
    }

    #[test]
    fn test_job_counter_matches_runnable_invocations() {
        use std::sync::atomic::{AtomicU64, Ordering};
        use std::sync::Arc;

        let registry = TaskRegistry::new();
        let handle = registry.add_task(params("counted")).unwrap();

        let invocations = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&invocations);
        registry
            .register_runnable(
                "counted",
                RunnableSpec::new(FnRunnable(move |_: &mut RunnableCtx<'_>| {
                    seen.fetch_add(1, Ordering::Relaxed);
                })),
            )
            .unwrap();

        registry.init_runnables();
        registry.create_threads().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(55));
        registry.kill_threads();
        registry.join_threads();
        registry.deinit_runnables();

        assert_eq!(
            registry.job_count(handle).unwrap(),
            invocations.load(Ordering::Relaxed)
        );
    }
}
