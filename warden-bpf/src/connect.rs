//! Outbound network enforcement: `lsm/socket_connect` reads the destination
//! `sockaddr_in` from USER memory (the hook fires before the kernel has
//! copied it in); `lsm/socket_sendmsg` reads it from KERNEL memory via the
//! `msghdr`'s `msg_name` field, covering connectionless sends that never
//! go through `connect(2)`. Both funnel into [`process_network_event`],
//! mirroring the original probe's shared helper.
//!
//! Grounded on `examples/original_source/internal/lsm/bpf/lsm_connect.bpf.c`.

use aya_ebpf::{
    helpers::{
        bpf_get_current_cgroup_id, bpf_get_current_comm, bpf_get_current_pid_tgid,
        bpf_ktime_get_ns, bpf_probe_read_kernel, bpf_probe_read_user,
    },
    macros::{lsm, map},
    maps::{Array, HashMap, RingBuf},
    programs::LsmContext,
};
use aya_log_ebpf::debug;
use warden_abi::{
    matcher, ACTION_ALLOW, ACTION_DENY, AF_INET, ConnectEvent, ConnectRule, DnsCacheEntry, EACCES,
    EVENT_RINGBUF_BYTES, HOSTNAME_MAX, MAX_ALLOWED_CGROUPS, MAX_CONNECT_RULES,
    MAX_DNS_CACHE_ENTRIES,
};

use crate::common::cgroup_in_scope;
use crate::vmlinux::{sockaddr_in, socket};

#[map]
static CONNECT_TARGET_CGROUP: Array<u64> = Array::with_max_entries(1, 0);

#[map]
static CONNECT_ALLOWED_CGROUPS: HashMap<u64, u8> =
    HashMap::with_max_entries(MAX_ALLOWED_CGROUPS as u32, 0);

#[map]
static CONNECT_POLICY_RULES: Array<ConnectRule> =
    Array::with_max_entries(MAX_CONNECT_RULES as u32, 0);

#[map]
static CONNECT_NUM_RULES: Array<u32> = Array::with_max_entries(1, 0);

#[map]
static CONNECT_DEFAULT_POLICY: Array<u32> = Array::with_max_entries(1, 0);

#[map]
static CONNECT_EVENTS: RingBuf = RingBuf::with_byte_size(EVENT_RINGBUF_BYTES, 0);

/// DNS observer cache: IPv4 address (host byte order key) -> hostname.
/// Populated by an out-of-scope DNS observer; consulted only to annotate
/// `ConnectEvent::dest_hostname`, never for enforcement.
#[map]
static DNS_CACHE: HashMap<u32, DnsCacheEntry> =
    HashMap::with_max_entries(MAX_DNS_CACHE_ENTRIES as u32, 0);

#[lsm(hook = "socket_connect")]
pub fn warden_connect(ctx: LsmContext) -> i32 {
    try_connect(&ctx)
}

fn try_connect(ctx: &LsmContext) -> i32 {
    if !cgroup_in_scope(&CONNECT_TARGET_CGROUP, &CONNECT_ALLOWED_CGROUPS) {
        return 0;
    }

    let sock_ptr = unsafe { ctx.arg::<*const socket>(0) };
    let address_ptr = unsafe { ctx.arg::<*const aya_ebpf::bindings::sockaddr>(1) };
    if address_ptr.is_null() {
        return 0;
    }

    let family = match unsafe {
        bpf_probe_read_user(&(*address_ptr).sa_family as *const _ as *const u16)
    } {
        Ok(f) => f,
        Err(_) => return 0,
    };
    if family != AF_INET {
        return 0;
    }

    let uaddr = match unsafe { bpf_probe_read_user(address_ptr as *const sockaddr_in) } {
        Ok(a) => a,
        Err(_) => return 0,
    };

    process_network_event(ctx, sock_ptr, uaddr.sin_addr.s_addr, uaddr.sin_port, family as u32)
}

#[lsm(hook = "socket_sendmsg")]
pub fn warden_sendmsg(ctx: LsmContext) -> i32 {
    try_sendmsg(&ctx)
}

fn try_sendmsg(ctx: &LsmContext) -> i32 {
    if !cgroup_in_scope(&CONNECT_TARGET_CGROUP, &CONNECT_ALLOWED_CGROUPS) {
        return 0;
    }

    let sock_ptr = unsafe { ctx.arg::<*const socket>(0) };
    let msg_ptr = unsafe { ctx.arg::<*const u8>(1) };
    if msg_ptr.is_null() {
        return 0;
    }

    // `msg_name` is the first field of `struct msghdr`.
    let msg_name = match unsafe { bpf_probe_read_kernel(msg_ptr as *const u64) } {
        Ok(p) if p != 0 => p,
        _ => return 0,
    };

    let family = match unsafe {
        bpf_probe_read_kernel(msg_name as *const u16)
    } {
        Ok(f) => f,
        Err(_) => return 0,
    };
    if family != AF_INET {
        return 0;
    }

    let kaddr = match unsafe { bpf_probe_read_kernel(msg_name as *const sockaddr_in) } {
        Ok(a) => a,
        Err(_) => return 0,
    };

    process_network_event(ctx, sock_ptr, kaddr.sin_addr.s_addr, kaddr.sin_port, family as u32)
}

fn process_network_event(
    ctx: &LsmContext,
    sock_ptr: *const socket,
    dest_ip: u32,
    dest_port: u16,
    family: u32,
) -> i32 {
    let mut hostname = [0u8; HOSTNAME_MAX];
    if let Some(cached) = unsafe { DNS_CACHE.get(&dest_ip) } {
        hostname = cached.hostname;
    }

    let key = 0u32;
    let n = unsafe { CONNECT_NUM_RULES.get(key) }.copied().unwrap_or(0);
    let default_action = unsafe { CONNECT_DEFAULT_POLICY.get(key) }
        .copied()
        .unwrap_or(ACTION_DENY);

    let mut policy_result = default_action;
    if n > 0 {
        let bound = core::cmp::min(n, MAX_CONNECT_RULES as u32);
        #[allow(clippy::needless_range_loop)]
        for i in 0..MAX_CONNECT_RULES as u32 {
            if i >= bound {
                break;
            }
            let rule = match unsafe { CONNECT_POLICY_RULES.get(i) } {
                Some(r) => r,
                None => continue,
            };
            if matcher::connect_rule_matches(rule, dest_ip, dest_port) {
                policy_result = rule.action;
                break;
            }
        }
    }

    let verdict = if policy_result == ACTION_ALLOW { 0 } else { EACCES };

    if let Some(mut entry) = CONNECT_EVENTS.reserve::<ConnectEvent>(0) {
        let protocol = if sock_ptr.is_null() {
            0
        } else {
            unsafe {
                let sk = (*sock_ptr).sk;
                if sk.is_null() { 0 } else { (*sk).sk_protocol() as u32 }
            }
        };

        let ev = unsafe { &mut *entry.as_mut_ptr() };
        let pid_tgid = unsafe { bpf_get_current_pid_tgid() };
        ev.pid = (pid_tgid >> 32) as u32;
        ev.tgid = (pid_tgid & 0xFFFF_FFFF) as u32;
        ev.timestamp = unsafe { bpf_ktime_get_ns() };
        ev.cgroup_id = unsafe { bpf_get_current_cgroup_id() };
        ev.comm = unsafe { bpf_get_current_comm() }.unwrap_or([0u8; warden_abi::COMM_LEN]);
        ev.family = family;
        ev.protocol = protocol;
        ev.dest_ip = dest_ip;
        ev.dest_port = dest_port;
        ev.result = verdict;
        ev.dest_hostname = hostname;
        entry.submit(0);
    }

    debug!(ctx, "connect verdict={}", verdict);

    verdict
}
