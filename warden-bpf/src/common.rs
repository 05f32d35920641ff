//! Helpers shared by the three decision probes: the two-level cgroup scope
//! gate (spec.md 4.2) and the post-`bpf_d_path` zero-padding step every
//! path-producing probe needs before a `HashMap`/prefix-match lookup can
//! treat the buffer as a stable key.

use aya_ebpf::{helpers::bpf_get_current_cgroup_id, maps::Array, maps::HashMap};
use warden_abi::PATH_MAX;

/// Two-level cgroup scope gate shared by all four hooks: a non-zero root
/// sentinel AND membership of the current cgroup in the allowed set.
#[inline(always)]
pub fn cgroup_in_scope(target: &Array<u64>, allowed: &HashMap<u64, u8>) -> bool {
    let target_id = match target.get(0) {
        Some(v) => *v,
        None => return false,
    };
    if target_id == 0 {
        return false;
    }
    let current = unsafe { bpf_get_current_cgroup_id() };
    unsafe { allowed.get(&current) }.copied() == Some(1)
}

/// `bpf_d_path` writes the resolved path plus a NUL terminator and may
/// leave stale bytes after it; zero the tail so the buffer is stable for
/// exact-key map lookups and prefix matching. `resolved_len` is the
/// return value of `bpf_d_path` (or `0` to zero the whole buffer on a
/// resolution failure).
#[inline(always)]
pub fn zero_pad_after(buf: &mut [u8; PATH_MAX], resolved_len: usize) {
    #[allow(clippy::needless_range_loop)]
    for i in 0..PATH_MAX {
        if i >= resolved_len {
            buf[i] = 0;
        }
    }
}
