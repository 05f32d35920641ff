//! `lsm/file_open` decision probe. Resolves the opened file's path via
//! `bpf_d_path`, skips nsfs magic-link targets, matches against
//! `OPEN_POLICY_RULES`, applies the apt/dpkg/update bypass, and emits an
//! audit record onto `OPEN_EVENTS`.
//!
//! Grounded on `examples/original_source/internal/lsm/bpf/lsm_open.bpf.c`
//! for the map layout and decision flow, and on the teacher's
//! `mori-bpf/src/main.rs` `try_path_open` for the `bpf_d_path` +
//! per-CPU scratch buffer idiom.

use aya_ebpf::{
    helpers::{bpf_d_path, bpf_get_current_comm, bpf_get_current_pid_tgid, bpf_ktime_get_ns},
    macros::{lsm, map},
    maps::{Array, HashMap, PerCpuArray, RingBuf},
    programs::LsmContext,
};
use aya_log_ebpf::debug;
use warden_abi::{
    matcher, ACTION_ALLOW, ACTION_DENY, COMM_LEN, EACCES, EVENT_RINGBUF_BYTES, MAX_ALLOWED_CGROUPS,
    MAX_OPEN_RULES, OpenEvent, OpenRule, PATH_MAX,
};

use crate::common::{cgroup_in_scope, zero_pad_after};
use crate::vmlinux::{file, path};

const FMODE_READ: u32 = 0x1;
const FMODE_WRITE: u32 = 0x2;

#[map]
static OPEN_TARGET_CGROUP: Array<u64> = Array::with_max_entries(1, 0);

#[map]
static OPEN_ALLOWED_CGROUPS: HashMap<u64, u8> = HashMap::with_max_entries(MAX_ALLOWED_CGROUPS as u32, 0);

#[map]
static OPEN_POLICY_RULES: Array<OpenRule> = Array::with_max_entries(MAX_OPEN_RULES as u32, 0);

#[map]
static OPEN_NUM_RULES: Array<u32> = Array::with_max_entries(1, 0);

#[map]
static OPEN_DEFAULT_POLICY: Array<u32> = Array::with_max_entries(1, 0);

#[map]
static OPEN_EVENTS: RingBuf = RingBuf::with_byte_size(EVENT_RINGBUF_BYTES, 0);

#[map]
static OPEN_PATH_SCRATCH: PerCpuArray<[u8; PATH_MAX]> = PerCpuArray::with_max_entries(1, 0);

#[lsm(hook = "file_open")]
pub fn warden_open(ctx: LsmContext) -> i32 {
    try_open(&ctx)
}

fn try_open(ctx: &LsmContext) -> i32 {
    if !cgroup_in_scope(&OPEN_TARGET_CGROUP, &OPEN_ALLOWED_CGROUPS) {
        return 0;
    }

    let file_ptr = unsafe { ctx.arg::<*const file>(0) };
    if file_ptr.is_null() {
        return 0;
    }

    let path_buf = match OPEN_PATH_SCRATCH.get_ptr_mut(0) {
        Some(ptr) => unsafe { &mut *ptr },
        None => return 0,
    };

    let path_ptr = unsafe {
        &(*file_ptr).f_path as *const path as *const aya_ebpf::bindings::path
            as *mut aya_ebpf::bindings::path
    };
    let ret = unsafe {
        bpf_d_path(
            path_ptr,
            path_buf.as_mut_ptr() as *mut aya_ebpf::cty::c_char,
            PATH_MAX as u32,
        )
    };
    if ret < 0 {
        // d_path failed; fall back to the dentry's short name, matching the
        // original probe's fallback path.
        let dentry = unsafe { (*file_ptr).f_path.dentry };
        if dentry.is_null() {
            return 0;
        }
        let name_ptr = unsafe { (*dentry).d_name.name };
        if name_ptr.is_null() {
            return 0;
        }
        let read = unsafe {
            aya_ebpf::helpers::bpf_probe_read_kernel_str_bytes(
                name_ptr as *const u8,
                path_buf.as_mut(),
            )
        };
        match read {
            Ok(bytes) => zero_pad_after(path_buf, bytes.len()),
            Err(_) => return 0,
        }
    } else {
        zero_pad_after(path_buf, ret as usize);
    }

    if matcher::is_nsfs_path(path_buf.as_ref()) {
        return 0;
    }

    let f_mode = unsafe { (*file_ptr).f_mode } as u32;
    let operation = matcher::resolve_open_operation(
        f_mode & FMODE_WRITE != 0,
        f_mode & FMODE_READ != 0,
    );

    let key = 0u32;
    let n = unsafe { OPEN_NUM_RULES.get(key) }.copied().unwrap_or(0);
    let default_action = unsafe { OPEN_DEFAULT_POLICY.get(key) }
        .copied()
        .unwrap_or(ACTION_DENY);

    let mut policy_result = default_action;
    if n > 0 {
        let bound = core::cmp::min(n, MAX_OPEN_RULES as u32);
        #[allow(clippy::needless_range_loop)]
        for i in 0..MAX_OPEN_RULES as u32 {
            if i >= bound {
                break;
            }
            let rule = match unsafe { OPEN_POLICY_RULES.get(i) } {
                Some(r) => r,
                None => continue,
            };
            if rule.path_len == 0 || rule.path_len > 64 {
                continue;
            }
            if !matcher::path_has_prefix(path_buf.as_ref(), &rule.path, rule.path_len) {
                continue;
            }
            if matcher::open_rule_participates(rule.operation, operation) {
                policy_result = rule.action;
                break;
            }
        }
    }

    let comm = unsafe { bpf_get_current_comm() }.unwrap_or([0u8; COMM_LEN]);
    if matcher::is_bypass_comm(&comm) {
        policy_result = ACTION_ALLOW;
    }

    let verdict = if policy_result == ACTION_ALLOW { 0 } else { EACCES };

    if let Some(mut entry) = OPEN_EVENTS.reserve::<OpenEvent>(0) {
        let pid_tgid = unsafe { bpf_get_current_pid_tgid() };
        let ev = unsafe { &mut *entry.as_mut_ptr() };
        ev.pid = (pid_tgid >> 32) as u32;
        ev.tgid = (pid_tgid & 0xFFFF_FFFF) as u32;
        ev.timestamp = unsafe { bpf_ktime_get_ns() };
        ev.cgroup_id = unsafe { aya_ebpf::helpers::bpf_get_current_cgroup_id() };
        ev.comm = comm;
        ev.path = *path_buf;
        ev.operation = operation;
        ev.result = verdict;
        entry.submit(0);
    }

    debug!(ctx, "open verdict={}", verdict);

    verdict
}
