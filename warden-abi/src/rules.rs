//! Policy rule and correlation records. These are the map *value* types the
//! userspace loader writes and the kernel probes read-only; see
//! `SPEC_FULL.md` section 3 and 4.1 for the ABI contract.

use crate::consts::{
    CAPTURED_ARG_LEN, HOSTNAME_MAX, MAX_CAPTURED_ARGS, PATH_MAX, RULE_ARG_COUNT, RULE_ARG_LEN,
};

/// A single `file_open` policy entry. `path` is compared as a prefix of the
/// resolved, zero-padded open path, up to `path_len` bytes (never more than
/// `RULE_PATH_MATCH_MAX`).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct OpenRule {
    pub action: u32,
    pub operation: u32,
    pub path_len: u32,
    pub path: [u8; PATH_MAX],
    pub is_directory: u32,
}

const _: () = assert!(core::mem::align_of::<OpenRule>() == 4);

impl OpenRule {
    pub fn zeroed() -> Self {
        unsafe { core::mem::zeroed() }
    }
}

/// A single exec policy entry. `arg_count == 0` means the rule matches on
/// path alone; deny rules with `arg_count > 0` are treated as an argument
/// blacklist against the correlated `argv` (see `matcher::exec_rule_arg_blacklist_hit`).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ExecRule {
    pub action: u32,
    pub operation: u32,
    pub path_len: u32,
    pub path: [u8; PATH_MAX],
    pub is_directory: u32,
    pub arg_count: u32,
    pub has_wildcard: u32,
    pub args: [[u8; RULE_ARG_LEN]; RULE_ARG_COUNT],
    pub arg_lens: [u32; RULE_ARG_COUNT],
}

const _: () = assert!(core::mem::align_of::<ExecRule>() == 4);

impl ExecRule {
    pub fn zeroed() -> Self {
        unsafe { core::mem::zeroed() }
    }
}

/// A single connect policy entry. `dest_ip == 0` and `dest_port == 0` act
/// as wildcards. `hostname`/`is_wildcard` are carried for annotation and
/// future enforcement but are not consulted by `matcher::connect_rule_matches`
/// (hostname enforcement is disabled; see `SPEC_FULL.md` section 4.3).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ConnectRule {
    pub action: u32,
    pub operation: u32,
    pub dest_ip: u32,
    pub dest_port: u16,
    pub hostname: [u8; HOSTNAME_MAX],
    pub hostname_len: u32,
    pub is_wildcard: u32,
}

const _: () = assert!(core::mem::align_of::<ConnectRule>() == 4);

impl ConnectRule {
    pub fn zeroed() -> Self {
        unsafe { core::mem::zeroed() }
    }
}

/// Correlation payload written by the execve tracepoint and consumed
/// (then deleted) by the exec LSM hook. See `SPEC_FULL.md` section 4.4.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct PendingExecArgs {
    pub timestamp: u64,
    pub argc: u32,
    pub original_path: [u8; PATH_MAX],
    pub detailed_args: [[u8; CAPTURED_ARG_LEN]; MAX_CAPTURED_ARGS],
}

const _: () = assert!(core::mem::align_of::<PendingExecArgs>() == 8);

impl PendingExecArgs {
    pub fn zeroed() -> Self {
        unsafe { core::mem::zeroed() }
    }
}

/// Value type for the `dns_cache` map (keyed externally by IPv4 address).
/// Populated by an out-of-scope DNS observer; consulted only to annotate
/// `ConnectEvent::dest_hostname`, never for enforcement.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct DnsCacheEntry {
    pub hostname: [u8; HOSTNAME_MAX],
}

impl DnsCacheEntry {
    pub fn zeroed() -> Self {
        unsafe { core::mem::zeroed() }
    }
}
