//! In-process telemetry sink: a channel server draining torque reports from
//! the global brake controller. Stands in for the remote monitoring node of
//! a multi-node deployment.

use edgert::{Channel, RtError, RtResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

pub struct TelemetryServer {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl TelemetryServer {
    /// Create the "BrakeTelemetry" channel and spawn the draining thread.
    /// Must run before runnable init so clients find the queue.
    pub fn spawn() -> RtResult<TelemetryServer> {
        let mut channel = Channel::create("BrakeTelemetry")?;
        channel.set_nonblocking(true)?;

        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name("telemetry".to_string())
            .spawn(move || drain_loop(channel, flag))?;

        Ok(TelemetryServer { stop, handle })
    }

    /// Stop the draining thread and release the channel.
    pub fn shutdown(self) {
        self.stop.store(true, Ordering::Release);
        if self.handle.join().is_err() {
            warn!("telemetry thread panicked");
        }
    }
}

fn drain_loop(mut channel: Channel, stop: Arc<AtomicBool>) {
    let mut buf = [0u8; 16];
    let mut received = 0u64;
    while !stop.load(Ordering::Acquire) {
        match channel.receive(&mut buf) {
            Ok(n) if n >= 4 => {
                received += 1;
                let torque = f32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]);
                debug!(total_torque_nm = torque, "telemetry sample");
            }
            Ok(n) => debug!(len = n, "short telemetry sample ignored"),
            Err(RtError::WouldBlock) => std::thread::sleep(Duration::from_millis(5)),
            Err(e) => {
                warn!(error = %e, "telemetry receive failed, stopping");
                break;
            }
        }
    }
    channel.cleanup();
    debug!(samples = received, "telemetry sink stopped");
}
