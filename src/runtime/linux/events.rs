//! Drains the three domain ring buffers and logs each decoded record.
//! Polled on a blocking OS thread (no async wakeup support in the `aya`
//! ring buffer API at the time of writing), following
//! `assay-monitor::loader::listen`'s shape: lock the shared `Ebpf`, borrow
//! each map fresh every pass rather than detaching it once, drain, sleep.

use std::{
    net::Ipv4Addr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use aya::{Ebpf, maps::RingBuf};
use warden_abi::{ConnectEvent, ExecEvent, OpenEvent, cstr};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Spawns the listener thread. The caller flips `shutdown` and joins the
/// returned handle (via `tokio::task::spawn_blocking` so the async runtime
/// isn't blocked) to drain any remaining events before the programs detach.
pub fn spawn_listener(bpf: Arc<Mutex<Ebpf>>, shutdown: Arc<AtomicBool>) -> JoinHandle<()> {
    thread::spawn(move || {
        loop {
            {
                let mut guard = bpf.lock().unwrap();
                drain_map(&mut guard, "OPEN_EVENTS", |raw| {
                    if let Some(ev) = OpenEvent::decode(raw) {
                        log_open_event(&ev);
                    }
                });
                drain_map(&mut guard, "EXEC_EVENTS", |raw| {
                    if let Some(ev) = ExecEvent::decode(raw) {
                        log_exec_event(&ev);
                    }
                });
                drain_map(&mut guard, "CONNECT_EVENTS", |raw| {
                    if let Some(ev) = ConnectEvent::decode(raw) {
                        log_connect_event(&ev);
                    }
                });
            }

            if shutdown.load(Ordering::Relaxed) {
                return;
            }
            thread::sleep(POLL_INTERVAL);
        }
    })
}

fn drain_map(bpf: &mut Ebpf, name: &str, mut on_event: impl FnMut(&[u8])) {
    let Some(map) = bpf.map_mut(name) else {
        return;
    };
    let Ok(mut ring_buf) = RingBuf::try_from(map) else {
        return;
    };
    while let Some(item) = ring_buf.next() {
        on_event(&item);
    }
}

fn log_open_event(ev: &OpenEvent) {
    let path = String::from_utf8_lossy(cstr(&ev.path));
    let comm = String::from_utf8_lossy(cstr(&ev.comm));
    if ev.result == 0 {
        log::info!(
            "open allow pid={} comm={} cgroup={} path={}",
            ev.pid, comm, ev.cgroup_id, path
        );
    } else {
        log::warn!(
            "open deny pid={} comm={} cgroup={} path={} result={}",
            ev.pid, comm, ev.cgroup_id, path, ev.result
        );
    }
}

fn log_exec_event(ev: &ExecEvent) {
    let path = String::from_utf8_lossy(cstr(&ev.path));
    let comm = String::from_utf8_lossy(cstr(&ev.comm));
    if ev.result == 0 {
        log::info!(
            "exec allow pid={} comm={} cgroup={} path={} argc={}",
            ev.pid, comm, ev.cgroup_id, path, ev.argc
        );
    } else {
        log::warn!(
            "exec deny pid={} comm={} cgroup={} path={} argc={} result={}",
            ev.pid, comm, ev.cgroup_id, path, ev.argc, ev.result
        );
    }
}

fn log_connect_event(ev: &ConnectEvent) {
    let comm = String::from_utf8_lossy(cstr(&ev.comm));
    let ip = Ipv4Addr::from_bits(u32::from_be(ev.dest_ip));
    let port = u16::from_be(ev.dest_port);
    let hostname = cstr(&ev.dest_hostname);
    let hostname = if hostname.is_empty() {
        String::new()
    } else {
        format!(" ({})", String::from_utf8_lossy(hostname))
    };
    if ev.result == 0 {
        log::info!(
            "connect allow pid={} comm={} cgroup={} dest={ip}:{port}{hostname}",
            ev.pid, comm, ev.cgroup_id
        );
    } else {
        log::warn!(
            "connect deny pid={} comm={} cgroup={} dest={ip}:{port}{hostname} result={}",
            ev.pid, comm, ev.cgroup_id, ev.result
        );
    }
}
