//! Ages out `PendingExecArgs` entries the matched LSM hook never reclaimed.
//! Modeled on `dns::spawn_refresh`'s "tokio task + shutdown signal" shape;
//! unlike the DNS refresh this runs on a fixed interval rather than one
//! driven by TTL expiry, since there is no cache to consult.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use super::{ebpf::WardenEbpf, sync::ShutdownSignal};
use crate::error::WardenError;

const SWEEP_INTERVAL: Duration = Duration::from_secs(5);
const MAX_PENDING_AGE_NS: u64 = 10 * 1_000_000_000;

fn monotonic_now_ns() -> u64 {
    let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
    unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64
}

pub fn spawn_sweep(
    ebpf: Arc<Mutex<WardenEbpf>>,
    shutdown_signal: Arc<ShutdownSignal>,
) -> tokio::task::JoinHandle<Result<(), WardenError>> {
    tokio::spawn(async move {
        loop {
            if shutdown_signal
                .wait_timeout_or_shutdown(SWEEP_INTERVAL)
                .await
            {
                return Ok(());
            }

            let now_ns = monotonic_now_ns();
            let swept = {
                let mut guard = ebpf.lock().unwrap();
                guard.sweep_stale_pending_exec_args(now_ns, MAX_PENDING_AGE_NS)
            };
            match swept {
                Ok(0) => {}
                Ok(n) => log::debug!("correlation sweep removed {n} stale pending exec entries"),
                Err(err) => log::error!("correlation sweep failed: {err}"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_now_ns_is_nonzero_and_increasing() {
        let a = monotonic_now_ns();
        std::thread::sleep(Duration::from_millis(1));
        let b = monotonic_now_ns();
        assert!(a > 0);
        assert!(b > a);
    }
}
