// edgert: Platform-specific unsafe operations
// This module contains ONLY unavoidable unsafe code that has no safe alternative
// All unsafe code here is documented and justified

/// SAFETY JUSTIFICATION:
/// - Monotonic clock reads: raw `clock_gettime`/`clock_nanosleep` syscalls
/// - Thread priority / CPU affinity: no safe alternative exists for
///   `pthread_setschedparam` / `pthread_setaffinity_np`
/// - POSIX message queues: `mq_*` has no std wrapper
///
/// Everything else in the crate is safe Rust; callers go through the safe
/// wrappers in `time`, `channel` and `task`.
#[allow(unsafe_code)]
pub(crate) mod unsafe_ops {
    use std::ffi::CStr;
    use std::io;

    const NANOS_PER_SEC: u64 = 1_000_000_000;

    /// Read CLOCK_MONOTONIC as a nanosecond count.
    /// SAFETY: clock_gettime only writes the provided timespec
    #[inline(always)]
    pub fn monotonic_ns() -> u64 {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        unsafe {
            libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
        }
        ts.tv_sec as u64 * NANOS_PER_SEC + ts.tv_nsec as u64
    }

    /// Suspend the calling thread until CLOCK_MONOTONIC reaches `target_ns`.
    /// Early wakes (EINTR) are retried against the same absolute target.
    /// SAFETY: clock_nanosleep reads the provided timespec only
    pub fn sleep_until_ns(target_ns: u64) {
        let ts = libc::timespec {
            tv_sec: (target_ns / NANOS_PER_SEC) as libc::time_t,
            tv_nsec: (target_ns % NANOS_PER_SEC) as libc::c_long,
        };
        loop {
            let rc = unsafe {
                libc::clock_nanosleep(
                    libc::CLOCK_MONOTONIC,
                    libc::TIMER_ABSTIME,
                    &ts,
                    std::ptr::null_mut(),
                )
            };
            if rc != libc::EINTR {
                break;
            }
        }
    }

    /// Apply SCHED_FIFO with the given priority to the calling thread.
    /// SAFETY: pthread_setschedparam is a C FFI call reading `param`
    pub fn set_fifo_priority(priority: i32) -> io::Result<()> {
        let param = libc::sched_param {
            sched_priority: priority,
        };
        let rc = unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::from_raw_os_error(rc))
        }
    }

    /// Pin the calling thread to the cores set in `core_mask` (bit i = CPU i).
    /// SAFETY: CPU_SET writes only into the local cpu_set_t;
    /// pthread_setaffinity_np reads it
    pub fn pin_to_cores(core_mask: u64) -> io::Result<()> {
        unsafe {
            let mut cpu_set: libc::cpu_set_t = std::mem::zeroed();
            for cpu in 0..64usize {
                if core_mask & (1u64 << cpu) != 0 {
                    libc::CPU_SET(cpu, &mut cpu_set);
                }
            }
            let rc = libc::pthread_setaffinity_np(
                libc::pthread_self(),
                std::mem::size_of::<libc::cpu_set_t>(),
                &cpu_set,
            );
            if rc == 0 {
                Ok(())
            } else {
                Err(io::Error::from_raw_os_error(rc))
            }
        }
    }

    /// Create a fresh message queue for reading, unlinking any stale object
    /// of the same name first.
    /// SAFETY: mq_unlink/mq_open read the NUL-terminated name; the attr
    /// struct is local and outlives the call
    pub fn mq_create_read(name: &CStr, maxmsg: i64, msgsize: i64) -> io::Result<libc::mqd_t> {
        unsafe {
            libc::mq_unlink(name.as_ptr());
            let mut attr: libc::mq_attr = std::mem::zeroed();
            attr.mq_flags = 0;
            attr.mq_maxmsg = maxmsg as libc::c_long;
            attr.mq_msgsize = msgsize as libc::c_long;
            attr.mq_curmsgs = 0;
            let mqd = libc::mq_open(
                name.as_ptr(),
                libc::O_CREAT | libc::O_RDONLY,
                0o644 as libc::mode_t,
                &mut attr as *mut libc::mq_attr,
            );
            if mqd < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(mqd)
            }
        }
    }

    /// Open an existing message queue for writing.
    /// SAFETY: mq_open reads the NUL-terminated name only
    pub fn mq_open_write(name: &CStr) -> io::Result<libc::mqd_t> {
        let mqd = unsafe { libc::mq_open(name.as_ptr(), libc::O_WRONLY) };
        if mqd < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(mqd)
        }
    }

    /// Toggle O_NONBLOCK on an open queue descriptor.
    /// SAFETY: mq_setattr reads the local attr struct
    pub fn mq_set_nonblocking(mqd: libc::mqd_t, nonblocking: bool) -> io::Result<()> {
        unsafe {
            let mut attr: libc::mq_attr = std::mem::zeroed();
            attr.mq_flags = if nonblocking { libc::O_NONBLOCK as libc::c_long } else { 0 };
            let rc = libc::mq_setattr(mqd, &attr, std::ptr::null_mut());
            if rc == 0 {
                Ok(())
            } else {
                Err(io::Error::last_os_error())
            }
        }
    }

    /// Enqueue one whole message.
    /// SAFETY: mq_send reads exactly `buf.len()` bytes from `buf`
    pub fn mq_send(mqd: libc::mqd_t, buf: &[u8]) -> io::Result<()> {
        let rc = unsafe { libc::mq_send(mqd, buf.as_ptr() as *const libc::c_char, buf.len(), 0) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    /// Dequeue one whole message into `buf`, returning its length.
    /// SAFETY: mq_receive writes at most `buf.len()` bytes into `buf`
    pub fn mq_receive(mqd: libc::mqd_t, buf: &mut [u8]) -> io::Result<usize> {
        let n = unsafe {
            libc::mq_receive(
                mqd,
                buf.as_mut_ptr() as *mut libc::c_char,
                buf.len(),
                std::ptr::null_mut(),
            )
        };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    /// SAFETY: plain descriptor close
    pub fn mq_close(mqd: libc::mqd_t) {
        unsafe {
            libc::mq_close(mqd);
        }
    }

    /// SAFETY: mq_unlink reads the NUL-terminated name only
    pub fn mq_unlink(name: &CStr) {
        unsafe {
            libc::mq_unlink(name.as_ptr());
        }
    }
}
