//! Exec enforcement: a `lsm/bprm_check_security` decision probe plus a
//! `tracepoint/syscalls/sys_enter_execve` probe that captures `argv` for
//! correlation. The LSM hook fires before the kernel has committed the new
//! image, so it cannot see `argv` directly; the tracepoint fires on syscall
//! entry with the original process image still mapped, captures up to
//! [`warden_abi::MAX_CAPTURED_ARGS`] arguments, and stashes them in
//! `PENDING_EXEC_ARGS` keyed by PID for the LSM hook to read and delete.
//!
//! Grounded on `examples/original_source/internal/lsm/bpf/lsm_exec.bpf.c`.

use aya_ebpf::{
    helpers::{
        bpf_d_path, bpf_get_current_comm, bpf_get_current_pid_tgid, bpf_ktime_get_ns,
        bpf_probe_read_user, bpf_probe_read_user_str_bytes,
    },
    macros::{lsm, map, tracepoint},
    maps::{Array, HashMap, PerCpuArray, RingBuf},
    programs::{LsmContext, TracePointContext},
};
use aya_log_ebpf::debug;
use warden_abi::{
    matcher, ACTION_ALLOW, ACTION_DENY, CAPTURED_ARG_LEN, COMM_LEN, EACCES, EVENT_RINGBUF_BYTES,
    MAX_ALLOWED_CGROUPS, MAX_CAPTURED_ARGS, MAX_EXEC_RULES, MAX_PENDING_EXEC_ARGS, ExecEvent,
    ExecRule, PATH_MAX, PendingExecArgs,
};

use crate::common::{cgroup_in_scope, zero_pad_after};
use crate::vmlinux::{file, linux_binprm, path};

/// Byte offset of `argv` within the kernel's `sys_enter_execve` tracepoint
/// format: `common_type`(0)/`common_flags`(2)/`common_preempt_count`(3)/
/// `common_pid`(4)/`__syscall_nr`(8)/`filename`(16)/`argv`(24)/`envp`(32).
const TP_OFFSET_ARGV: usize = 24;

#[map]
static EXEC_TARGET_CGROUP: Array<u64> = Array::with_max_entries(1, 0);

#[map]
static EXEC_ALLOWED_CGROUPS: HashMap<u64, u8> =
    HashMap::with_max_entries(MAX_ALLOWED_CGROUPS as u32, 0);

#[map]
static EXEC_POLICY_RULES: Array<ExecRule> = Array::with_max_entries(MAX_EXEC_RULES as u32, 0);

#[map]
static EXEC_NUM_RULES: Array<u32> = Array::with_max_entries(1, 0);

#[map]
static EXEC_DEFAULT_POLICY: Array<u32> = Array::with_max_entries(1, 0);

#[map]
static EXEC_EVENTS: RingBuf = RingBuf::with_byte_size(EVENT_RINGBUF_BYTES, 0);

#[map]
static EXEC_PATH_SCRATCH: PerCpuArray<[u8; PATH_MAX]> = PerCpuArray::with_max_entries(1, 0);

#[map]
static PENDING_EXEC_ARGS: HashMap<u32, PendingExecArgs> =
    HashMap::with_max_entries(MAX_PENDING_EXEC_ARGS as u32, 0);

#[lsm(hook = "bprm_check_security")]
pub fn warden_exec(ctx: LsmContext) -> i32 {
    try_exec(&ctx)
}

fn try_exec(ctx: &LsmContext) -> i32 {
    if !cgroup_in_scope(&EXEC_TARGET_CGROUP, &EXEC_ALLOWED_CGROUPS) {
        return 0;
    }

    let bprm = unsafe { ctx.arg::<*const linux_binprm>(0) };
    if bprm.is_null() {
        return 0;
    }

    let path_buf = match EXEC_PATH_SCRATCH.get_ptr_mut(0) {
        Some(ptr) => unsafe { &mut *ptr },
        None => return 0,
    };

    let file_ptr = unsafe { (*bprm).file };
    let mut resolved_len = 0usize;
    let resolved = if !file_ptr.is_null() {
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
        if ret >= 0 {
            resolved_len = ret as usize;
        }
        ret >= 0
    } else {
        false
    };

    if !resolved {
        // Fall back to bprm->filename, then the dentry's short name.
        let filename_ptr = unsafe { (*bprm).filename };
        let from_filename = if !filename_ptr.is_null() {
            unsafe {
                aya_ebpf::helpers::bpf_probe_read_kernel_str_bytes(
                    filename_ptr as *const u8,
                    path_buf.as_mut(),
                )
            }
            .ok()
        } else {
            None
        };

        match from_filename {
            Some(bytes) => zero_pad_after(path_buf, bytes.len()),
            None => {
                if file_ptr.is_null() {
                    return 0;
                }
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
            }
        }
    } else {
        zero_pad_after(path_buf, resolved_len);
    }

    let pid_tgid = unsafe { bpf_get_current_pid_tgid() };
    let pid = (pid_tgid >> 32) as u32;
    let pending = unsafe { PENDING_EXEC_ARGS.get(&pid) }.copied();

    let key = 0u32;
    let n = unsafe { EXEC_NUM_RULES.get(key) }.copied().unwrap_or(0);
    let default_action = unsafe { EXEC_DEFAULT_POLICY.get(key) }
        .copied()
        .unwrap_or(ACTION_DENY);

    let mut policy_result = default_action;
    if n > 0 {
        let bound = core::cmp::min(n, MAX_EXEC_RULES as u32);
        #[allow(clippy::needless_range_loop)]
        for i in 0..MAX_EXEC_RULES as u32 {
            if i >= bound {
                break;
            }
            let rule = match unsafe { EXEC_POLICY_RULES.get(i) } {
                Some(r) => r,
                None => continue,
            };
            if rule.path_len == 0 || rule.path_len > 64 {
                continue;
            }
            if !matcher::path_has_prefix(path_buf.as_ref(), &rule.path, rule.path_len) {
                continue;
            }
            if rule.arg_count == 0 {
                policy_result = rule.action;
                break;
            }
            if let Some(pending) = pending.as_ref() {
                if rule.action == ACTION_DENY && matcher::exec_rule_arg_blacklist_hit(rule, pending)
                {
                    policy_result = ACTION_DENY;
                    break;
                }
            }
            // path matched but the arg predicate didn't deny: keep scanning.
        }
    }

    let verdict = if policy_result == ACTION_ALLOW { 0 } else { EACCES };

    if let Some(mut entry) = EXEC_EVENTS.reserve::<ExecEvent>(0) {
        let ev = unsafe { &mut *entry.as_mut_ptr() };
        ev.pid = pid;
        ev._padding = 0;
        ev.timestamp = unsafe { bpf_ktime_get_ns() };
        ev.cgroup_id = unsafe { aya_ebpf::helpers::bpf_get_current_cgroup_id() };
        ev.comm = unsafe { bpf_get_current_comm() }.unwrap_or([0u8; COMM_LEN]);
        ev.path = *path_buf;
        ev.result = verdict;
        match pending.as_ref() {
            Some(pending) => {
                ev.argc = pending.argc as i32;
                ev.detailed_args = pending.detailed_args;
            }
            None => {
                ev.argc = 0;
                ev.detailed_args = [[0u8; CAPTURED_ARG_LEN]; MAX_CAPTURED_ARGS];
            }
        }
        entry.submit(0);
    }

    if pending.is_some() {
        unsafe { PENDING_EXEC_ARGS.remove(&pid) }.ok();
    }

    debug!(ctx, "exec verdict={}", verdict);

    verdict
}

#[tracepoint]
pub fn warden_exec_enter(ctx: TracePointContext) -> u32 {
    match try_capture_argv(&ctx) {
        Ok(ret) => ret,
        Err(ret) => ret,
    }
}

fn try_capture_argv(ctx: &TracePointContext) -> Result<u32, u32> {
    if !cgroup_in_scope(&EXEC_TARGET_CGROUP, &EXEC_ALLOWED_CGROUPS) {
        return Ok(0);
    }

    let pid_tgid = unsafe { bpf_get_current_pid_tgid() };
    let pid = (pid_tgid >> 32) as u32;

    let mut pending = PendingExecArgs::zeroed();
    pending.timestamp = unsafe { bpf_ktime_get_ns() };

    let argv_base = unsafe { ctx.read_at::<u64>(TP_OFFSET_ARGV).unwrap_or(0) };
    if argv_base != 0 {
        #[allow(clippy::needless_range_loop)]
        for i in 0..MAX_CAPTURED_ARGS {
            let slot_addr = argv_base + (i as u64) * 8;
            let arg_ptr = match unsafe { bpf_probe_read_user(slot_addr as *const u64) } {
                Ok(p) if p != 0 => p,
                _ => break,
            };
            let written = unsafe {
                bpf_probe_read_user_str_bytes(
                    arg_ptr as *const u8,
                    &mut pending.detailed_args[i],
                )
            };
            match written {
                Ok(bytes) if !bytes.is_empty() => {}
                _ => break,
            }
            pending.argc += 1;
        }
    }

    if pending.argc == 0 {
        pending.argc = 1;
        let comm = unsafe { bpf_get_current_comm() }.unwrap_or([0u8; COMM_LEN]);
        let n = core::cmp::min(COMM_LEN, CAPTURED_ARG_LEN);
        pending.detailed_args[0][..n].copy_from_slice(&comm[..n]);
    }

    unsafe { PENDING_EXEC_ARGS.insert(&pid, &pending, 0) }.ok();

    Ok(0)
}
