// edgert: Integration tests for the periodic task engine
// These run the real engine: OS threads, SCHED_FIFO application (expected to
// degrade to a logged warning in unprivileged environments), absolute-time
// pacing.

use edgert::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn params(name: &str, period_ms: u64, offset_us: u64, priority: i32, core_mask: u64) -> TaskParams {
    TaskParams {
        name: name.to_string(),
        period_ms,
        deadline_ms: 10,
        offset_us,
        priority,
        core_mask,
        partition_id: 0,
    }
}

#[test]
fn test_single_task_cadence() {
    // One 50ms task with no runnable, run for one second: the schedule is
    // paced off absolute activation times, so the job count lands at the
    // period boundary count regardless of per-job jitter.
    let registry = TaskRegistry::new();
    let handle = registry
        .add_task(params("cadence", 50, 0, 40, 0x1))
        .unwrap();

    registry.init_runnables();
    registry.create_threads().unwrap();
    std::thread::sleep(Duration::from_secs(1));
    registry.kill_threads();
    registry.join_threads();
    registry.deinit_runnables();

    let jobs = registry.job_count(handle).unwrap();
    assert!(
        (19..=22).contains(&jobs),
        "expected ~20 jobs over 1s at 50ms, got {}",
        jobs
    );
    assert_eq!(registry.stats(handle).unwrap().count, jobs);
}

#[test]
fn test_label_handoff_between_cores() {
    // Producer writes a monotonically increasing counter at 50ms; the
    // consumer samples it at 50ms shifted by half a period. The observed
    // sequence must be weakly increasing with no jump larger than two
    // producer jobs.
    let registry = TaskRegistry::new();
    let store = registry.label_store();
    let label = store.register("counter", 4).unwrap();

    registry
        .add_task(params("producer", 50, 0, 41, 0x1))
        .unwrap();
    registry
        .add_task(params("consumer", 50, 25_000, 40, 0x2))
        .unwrap();

    let produced = Arc::new(AtomicU32::new(0));
    let writer = Arc::clone(&produced);
    registry
        .register_runnable(
            "producer",
            RunnableSpec::new(FnRunnable(move |ctx: &mut RunnableCtx<'_>| {
                let next = writer.fetch_add(1, Ordering::Relaxed) + 1;
                ctx.set_output_u32(0, next);
            }))
            .with_output(label, 4),
        )
        .unwrap();

    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&observed);
    registry
        .register_runnable(
            "consumer",
            RunnableSpec::new(FnRunnable(move |ctx: &mut RunnableCtx<'_>| {
                sink.lock().unwrap().push(ctx.input_u32(0));
            }))
            .with_input(label, 4),
        )
        .unwrap();

    registry.init_runnables();
    registry.create_threads().unwrap();
    std::thread::sleep(Duration::from_secs(1));
    registry.kill_threads();
    registry.join_threads();
    registry.deinit_runnables();

    let values = observed.lock().unwrap();
    assert!(values.len() >= 15, "only {} samples", values.len());
    for pair in values.windows(2) {
        assert!(pair[1] >= pair[0], "sequence went backwards: {:?}", pair);
        assert!(
            pair[1] - pair[0] <= 2,
            "skipped more than one producer job: {:?}",
            pair
        );
    }
}

#[test]
fn test_graceful_shutdown_of_task_set() {
    // Eight periodic tasks; after the run, kill+join must complete within
    // one period plus the longest job, and every accumulator count must
    // match its task's job counter.
    let registry = TaskRegistry::new();
    let periods = [20u64, 30, 40, 50, 60, 20, 30, 40];
    let mut handles = Vec::new();
    for (i, period) in periods.iter().enumerate() {
        let name = format!("task_{}", i);
        let handle = registry
            .add_task(params(&name, *period, 0, 30 + i as i32, 1 << (i % 4)))
            .unwrap();
        registry
            .register_runnable(
                &name,
                RunnableSpec::new(FnRunnable(|_: &mut RunnableCtx<'_>| {
                    burn_cycles(200);
                })),
            )
            .unwrap();
        handles.push(handle);
    }

    registry.init_runnables();
    registry.create_threads().unwrap();
    std::thread::sleep(Duration::from_millis(800));

    registry.kill_threads();
    let join_started = Instant::now();
    registry.join_threads();
    let join_elapsed = join_started.elapsed();
    registry.deinit_runnables();

    // Longest period is 60ms and jobs are sub-millisecond; generous margin
    // for a loaded test host.
    assert!(
        join_elapsed < Duration::from_millis(500),
        "join took {:?}",
        join_elapsed
    );
    for handle in handles {
        let jobs = registry.job_count(handle).unwrap();
        assert!(jobs > 0);
        assert_eq!(registry.stats(handle).unwrap().count, jobs);
    }
}

#[test]
fn test_overrun_catch_up_policy() {
    // A 10ms task whose first job busy-waits 25ms: late activations are not
    // skipped, so the job counter keeps advancing immediately after the
    // overrunning job retires.
    let registry = TaskRegistry::new();
    let handle = registry
        .add_task(params("overrun", 10, 0, 40, 0x1))
        .unwrap();

    let jobs_seen = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&jobs_seen);
    registry
        .register_runnable(
            "overrun",
            RunnableSpec::new(FnRunnable(move |_: &mut RunnableCtx<'_>| {
                if counter.fetch_add(1, Ordering::Relaxed) == 0 {
                    burn_cycles(25_000);
                }
            })),
        )
        .unwrap();

    registry.init_runnables();
    registry.create_threads().unwrap();
    std::thread::sleep(Duration::from_millis(80));
    registry.kill_threads();
    registry.join_threads();
    registry.deinit_runnables();

    let jobs = registry.job_count(handle).unwrap();
    assert!(jobs >= 3, "catch-up failed: only {} jobs", jobs);
    let stats = registry.stats(handle).unwrap();
    assert!(stats.deadline_misses >= 1, "25ms job must miss a 10ms deadline");
}

#[test]
fn test_priority_denied_still_paces() {
    // Applying priority 99 fails without privileges; the thread logs the
    // failure and keeps its periodic timing under default scheduling.
    let registry = TaskRegistry::new();
    let handle = registry
        .add_task(params("unprivileged", 20, 0, 99, 0x1))
        .unwrap();

    registry.init_runnables();
    registry.create_threads().unwrap();
    std::thread::sleep(Duration::from_millis(150));
    registry.kill_threads();
    registry.join_threads();
    registry.deinit_runnables();

    let jobs = registry.job_count(handle).unwrap();
    assert!((5..=10).contains(&jobs), "expected ~7 jobs, got {}", jobs);
}
