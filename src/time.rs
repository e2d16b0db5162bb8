// edgert: Time services
// Monotonic nanosecond clock, absolute-deadline sleep, calibrated busy-wait

use crate::platform::unsafe_ops;

/// Current CLOCK_MONOTONIC time in nanoseconds.
#[inline(always)]
pub fn now_ns() -> u64 {
    unsafe_ops::monotonic_ns()
}

/// Suspend the calling thread until the monotonic clock reaches `target_ns`.
///
/// This is the sole pacing primitive of the periodic engine: sleeping against
/// an absolute target avoids jitter accumulation across jobs. Spurious early
/// wakes are retried internally. A target already in the past returns
/// immediately.
pub fn sleep_until(target_ns: u64) {
    unsafe_ops::sleep_until_ns(target_ns);
}

/// Block the caller for at least `micros` microseconds by busy-polling the
/// monotonic clock.
///
/// Used to emulate compute load in synthetic runnables. Deliberately never
/// sleeps or yields; the spin occupies the core the way real work would.
pub fn burn_cycles(micros: u64) {
    let target = now_ns() + micros * 1_000;
    while now_ns() < target {
        std::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_advances() {
        let a = now_ns();
        let b = now_ns();
        assert!(b >= a);
    }

    #[test]
    fn test_burn_cycles_blocks_at_least_requested() {
        let start = now_ns();
        burn_cycles(2_000);
        let elapsed = now_ns() - start;
        assert!(elapsed >= 2_000_000, "burned only {} ns", elapsed);
    }

    #[test]
    fn test_sleep_until_absolute_target() {
        let target = now_ns() + 5_000_000;
        sleep_until(target);
        assert!(now_ns() >= target);
    }

    #[test]
    fn test_sleep_until_past_target_returns_immediately() {
        let start = now_ns();
        sleep_until(start.saturating_sub(1_000_000));
        // Anything under a millisecond counts as immediate here
        assert!(now_ns() - start < 1_000_000);
    }
}
