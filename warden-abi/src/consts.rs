//! Constants shared by the kernel probes and the userspace loader. These are
//! part of the map ABI: changing any of them is a breaking change to the
//! wire contract described in `SPEC_FULL.md` section 4.1.

/// Fixed buffer size for resolved file/exec paths, matching `bpf_d_path`'s
/// output convention (NUL-terminated, zero-padded tail).
pub const PATH_MAX: usize = 256;

/// Longest path prefix a single rule may match against (the matcher only
/// ever compares this many leading bytes of a rule's `path` field).
pub const RULE_PATH_MATCH_MAX: usize = 64;

/// `task->comm` size, as returned by `bpf_get_current_comm`.
pub const COMM_LEN: usize = 16;

/// Fixed buffer size for hostnames (DNS cache entries and connect rules).
pub const HOSTNAME_MAX: usize = 128;

/// Number of argv entries captured by the execve tracepoint.
pub const MAX_CAPTURED_ARGS: usize = 6;
/// Per-argument truncation length for captured argv entries.
pub const CAPTURED_ARG_LEN: usize = 24;

/// Number of argument patterns an `ExecRule` may carry.
pub const RULE_ARG_COUNT: usize = 4;
/// Per-pattern length for `ExecRule` argument patterns.
pub const RULE_ARG_LEN: usize = 32;

pub const MAX_OPEN_RULES: usize = 256;
pub const MAX_EXEC_RULES: usize = 64;
pub const MAX_CONNECT_RULES: usize = 256;
pub const MAX_ALLOWED_CGROUPS: usize = 1024;
pub const MAX_PENDING_EXEC_ARGS: usize = 1024;
pub const MAX_DNS_CACHE_ENTRIES: usize = 4096;

/// Ring buffer capacity, in bytes, for each of the three event channels.
pub const EVENT_RINGBUF_BYTES: u32 = 256 * 1024;

pub const ACTION_DENY: u32 = 0;
pub const ACTION_ALLOW: u32 = 1;

/// Open operation kinds. `OP_OPEN` matches any access mode; `OP_OPEN_RO`
/// and `OP_OPEN_RW` require an exact match against the resolved mode.
pub const OP_OPEN: u32 = 0;
pub const OP_OPEN_RO: u32 = 1;
pub const OP_OPEN_RW: u32 = 2;

pub const OP_EXEC: u32 = 3;
pub const OP_CONNECT: u32 = 4;

pub const ACCESS_MODE_READ: u8 = 1;
pub const ACCESS_MODE_WRITE: u8 = 2;
pub const ACCESS_MODE_READWRITE: u8 = 3;

/// Linux kernel verdict for a denied LSM hook (`-EACCES`).
pub const EACCES: i32 = -13;

pub const AF_INET: u16 = 2;

/// Bounds used only by the exec argument blacklist scan. These are smaller
/// than the buffer capacities above (`RULE_ARG_COUNT`, `MAX_CAPTURED_ARGS`,
/// `RULE_ARG_LEN`/`CAPTURED_ARG_LEN`) on purpose — they cap the nested scan
/// to keep the kernel-side loop's instruction count bounded, independent of
/// how much storage the records carry.
pub const EXEC_ARG_PATTERN_SCAN_MAX: usize = 3;
pub const EXEC_ARGV_SCAN_MAX: usize = 4;
pub const EXEC_ARG_BYTE_SCAN_MAX: usize = 16;
