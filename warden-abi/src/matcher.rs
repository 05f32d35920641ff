//! Bounded, allocation-free matching predicates shared verbatim between the
//! kernel probes (`warden-bpf`) and the userspace loader/tests. Each
//! function here is a pure function of its arguments: no map lookups, no
//! syscalls. See `SPEC_FULL.md` section 4.3.

use crate::consts::{
    COMM_LEN, EXEC_ARGV_SCAN_MAX, EXEC_ARG_BYTE_SCAN_MAX, EXEC_ARG_PATTERN_SCAN_MAX, OP_OPEN,
    OP_OPEN_RO, OP_OPEN_RW, RULE_PATH_MATCH_MAX,
};
use crate::rules::{ConnectRule, ExecRule, PendingExecArgs};

/// True if `observed`'s first `rule_path_len` bytes (capped at
/// `RULE_PATH_MATCH_MAX`) equal `rule_path`'s.
pub fn path_has_prefix(observed: &[u8], rule_path: &[u8], rule_path_len: u32) -> bool {
    let max_len = core::cmp::min(rule_path_len as usize, RULE_PATH_MATCH_MAX);
    for i in 0..RULE_PATH_MATCH_MAX {
        if i >= max_len {
            break;
        }
        match (observed.get(i), rule_path.get(i)) {
            (Some(o), Some(r)) if o == r => {}
            _ => return false,
        }
    }
    true
}

/// Resolves an `OpenEvent`/rule `operation` value from the file's access
/// mode flags, mirroring `get_file_operation_type`: write capability wins
/// over read, and a file with neither resolves to the generic `OP_OPEN`.
pub fn resolve_open_operation(f_mode_write: bool, f_mode_read: bool) -> u32 {
    if f_mode_write {
        OP_OPEN_RW
    } else if f_mode_read {
        OP_OPEN_RO
    } else {
        OP_OPEN
    }
}

/// Whether an open rule's declared operation participates in the observed
/// access: `OP_OPEN` rules match any access mode, everything else requires
/// an exact match.
pub fn open_rule_participates(rule_operation: u32, observed_operation: u32) -> bool {
    rule_operation == OP_OPEN || rule_operation == observed_operation
}

const NSFS_PREFIXES: [&[u8]; 8] = [
    b"mnt:[",
    b"net:[",
    b"ipc:[",
    b"pid:[",
    b"uts:[",
    b"user:[",
    b"cgroup:[",
    b"time:[",
];

/// True if `path` looks like an nsfs magic-link target (`mnt:[123]`,
/// `net:[456]`, ...). These are skipped entirely by the open probe: no
/// policy check, no event, matching `is_nsfs_path` in the original probe.
pub fn is_nsfs_path(path: &[u8]) -> bool {
    for prefix in NSFS_PREFIXES {
        if path.len() < prefix.len() || &path[..prefix.len()] != prefix {
            continue;
        }
        let mut found_digit = false;
        let mut i = prefix.len();
        let scan_end = core::cmp::min(path.len(), prefix.len() + 16);
        while i < scan_end {
            match path[i] {
                b'0'..=b'9' => found_digit = true,
                b']' if found_digit => return true,
                _ => break,
            }
            i += 1;
        }
    }
    false
}

/// Hardcoded bypass for package-manager executables: `apt-get` (exact),
/// and anything whose `comm` starts with `dpkg` or `update`. These always
/// resolve to allow regardless of matched rule, mirroring the original
/// probe's literal `comm` prefix checks.
pub fn is_bypass_comm(comm: &[u8; COMM_LEN]) -> bool {
    let is_apt_get = comm.starts_with(b"apt-get") && comm.get(7) == Some(&0);
    is_apt_get || comm.starts_with(b"dpkg") || comm.starts_with(b"update")
}

/// Argument-blacklist check for a deny-with-arguments exec rule: true if
/// any of the rule's first `EXEC_ARG_PATTERN_SCAN_MAX` argument patterns
/// matches any of the correlated process's argv entries (skipping argv[0],
/// up to `EXEC_ARGV_SCAN_MAX` entries). Callers are responsible for only
/// invoking this for rules with `action == ACTION_DENY` and
/// `arg_count > 0`, and for pending records with more than one captured
/// argument — see `check_exec_policy` in the original probe.
pub fn exec_rule_arg_blacklist_hit(rule: &ExecRule, pending: &PendingExecArgs) -> bool {
    if pending.argc <= 1 || rule.arg_count == 0 {
        return false;
    }
    let pattern_count = core::cmp::min(rule.arg_count as usize, EXEC_ARG_PATTERN_SCAN_MAX);
    let argv_count = core::cmp::min(pending.argc as usize, EXEC_ARGV_SCAN_MAX);

    for p in 0..pattern_count {
        let pattern = &rule.args[p];
        let pattern_len = core::cmp::min(rule.arg_lens[p] as usize, EXEC_ARG_BYTE_SCAN_MAX);
        for a in 1..argv_count {
            let observed = &pending.detailed_args[a];
            let mut matched = true;
            for j in 0..pattern_len {
                if observed[j] != pattern[j] {
                    matched = false;
                    break;
                }
            }
            if matched {
                return true;
            }
        }
    }
    false
}

/// Whether a connect rule matches an observed destination: `dest_ip == 0`
/// and `dest_port == 0` act as wildcards on the rule side.
pub fn connect_rule_matches(rule: &ConnectRule, dest_ip: u32, dest_port: u16) -> bool {
    if rule.dest_ip != 0 && rule.dest_ip != dest_ip {
        return false;
    }
    if rule.dest_port != 0 && rule.dest_port != dest_port {
        return false;
    }
    true
}

/// Whether `hostname` matches a `*.suffix` wildcard pattern: the pattern
/// must be at least `*.x`, and the hostname must be strictly longer than
/// the suffix with a `.` immediately preceding it (so `evil-example.com`
/// does not match `*.example.com`). Not currently consulted for
/// enforcement — see `SPEC_FULL.md` section 4.3 — but implemented for
/// future use and exercised by tests.
pub fn hostname_matches_wildcard(hostname: &[u8], pattern: &[u8], pattern_len: u32) -> bool {
    let pattern_len = pattern_len as usize;
    if pattern_len < 3 || pattern_len > pattern.len() {
        return false;
    }
    if pattern[0] != b'*' || pattern[1] != b'.' {
        return false;
    }
    let suffix = &pattern[2..pattern_len];
    let suffix_len = suffix.len();

    let hostname_len = hostname.iter().position(|&b| b == 0).unwrap_or(hostname.len());
    if hostname_len < suffix_len {
        return false;
    }

    let start = hostname_len - suffix_len;
    if &hostname[start..start + suffix_len] != suffix {
        return false;
    }
    if hostname_len == suffix_len {
        return false;
    }
    if start > 0 && hostname[start - 1] != b'.' {
        return false;
    }
    true
}

/// Whether the current task is in the monitored scope: a non-zero target
/// cgroup sentinel AND membership of `current_cgroup` in the allowed set.
/// The kernel side looks `current_cgroup` up in a `HashMap`; this form
/// (slice membership) is for the reference/test path only.
pub fn cgroup_in_scope(target_cgroup: u64, allowed_cgroups: &[u64], current_cgroup: u64) -> bool {
    target_cgroup != 0 && allowed_cgroups.contains(&current_cgroup)
}

/// Host-only composition of the predicates above into whole-policy
/// decision functions. These back unit tests of the Testable Properties
/// and the reference loader's dry-run mode; the kernel probes drive the
/// same underlying predicates through their own per-index, verifier-bounded
/// map lookup loops rather than over a borrowed slice.
#[cfg(feature = "std")]
pub mod reference {
    use super::*;
    use crate::consts::{ACTION_ALLOW, ACTION_DENY, MAX_OPEN_RULES};
    use crate::rules::{ConnectRule, ExecRule, OpenRule, PendingExecArgs};

    /// `check_path_policy` / `check_open_policy`, as a pure function of
    /// `(rules, default_action, observed_path, observed_operation)`.
    pub fn match_open(
        rules: &[OpenRule],
        default_action: u32,
        observed_path: &[u8],
        observed_operation: u32,
    ) -> u32 {
        let n = core::cmp::min(rules.len(), MAX_OPEN_RULES);
        for rule in &rules[..n] {
            if rule.path_len == 0 || rule.path_len as usize > RULE_PATH_MATCH_MAX {
                continue;
            }
            if !path_has_prefix(observed_path, &rule.path, rule.path_len) {
                continue;
            }
            if open_rule_participates(rule.operation, observed_operation) {
                return rule.action;
            }
            // path matches but operation doesn't: fall through to next rule
        }
        default_action
    }

    /// `check_exec_policy`, as a pure function of
    /// `(rules, default_action, observed_path, pending)`.
    pub fn match_exec(
        rules: &[ExecRule],
        default_action: u32,
        observed_path: &[u8],
        pending: Option<&PendingExecArgs>,
    ) -> u32 {
        for rule in rules {
            if rule.path_len == 0 || rule.path_len as usize > RULE_PATH_MATCH_MAX {
                continue;
            }
            if !path_has_prefix(observed_path, &rule.path, rule.path_len) {
                continue;
            }
            if rule.arg_count == 0 {
                return rule.action;
            }
            if let Some(pending) = pending {
                if rule.action == ACTION_DENY && exec_rule_arg_blacklist_hit(rule, pending) {
                    return ACTION_DENY;
                }
            }
            // path matches, arg predicate didn't deny: fall through
        }
        default_action
    }

    /// `check_connect_policy`, as a pure function of
    /// `(rules, default_action, dest_ip, dest_port)`.
    pub fn match_connect(
        rules: &[ConnectRule],
        default_action: u32,
        dest_ip: u32,
        dest_port: u16,
    ) -> u32 {
        if rules.is_empty() {
            return default_action;
        }
        for rule in rules {
            if connect_rule_matches(rule, dest_ip, dest_port) {
                return rule.action;
            }
        }
        default_action
    }

    /// Applies the apt/dpkg/update bypass on top of an already-computed
    /// open policy result: forces allow regardless of `result`.
    pub fn apply_open_bypass(result: u32, comm: &[u8; COMM_LEN]) -> u32 {
        if is_bypass_comm(comm) {
            ACTION_ALLOW
        } else {
            result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_match_respects_declared_len() {
        assert!(path_has_prefix(b"/etc/passwd", b"/etc/pas", 8));
        assert!(!path_has_prefix(b"/etc/passwd", b"/etc/shadow", 8));
    }

    #[test]
    fn prefix_match_caps_at_rule_path_match_max() {
        let long_rule = [b'a'; 256];
        let observed = [b'a'; 300];
        assert!(path_has_prefix(&observed, &long_rule, 9999));
    }

    #[test]
    fn open_operation_prefers_write() {
        assert_eq!(resolve_open_operation(true, true), OP_OPEN_RW);
        assert_eq!(resolve_open_operation(false, true), OP_OPEN_RO);
        assert_eq!(resolve_open_operation(false, false), OP_OPEN);
    }

    #[test]
    fn open_rule_open_matches_any_operation() {
        assert!(open_rule_participates(OP_OPEN, OP_OPEN_RO));
        assert!(open_rule_participates(OP_OPEN, OP_OPEN_RW));
        assert!(!open_rule_participates(OP_OPEN_RO, OP_OPEN_RW));
    }

    #[test]
    fn nsfs_paths_are_recognized() {
        assert!(is_nsfs_path(b"mnt:[4026537166]"));
        assert!(is_nsfs_path(b"net:[4026532621]"));
        assert!(!is_nsfs_path(b"/proc/self/mnt"));
        assert!(!is_nsfs_path(b"mnt:[notdigits]"));
    }

    fn comm_of(name: &[u8]) -> [u8; COMM_LEN] {
        let mut c = [0u8; COMM_LEN];
        c[..name.len()].copy_from_slice(name);
        c
    }

    #[test]
    fn bypass_comm_matches_apt_dpkg_update() {
        assert!(is_bypass_comm(&comm_of(b"apt-get")));
        assert!(!is_bypass_comm(&comm_of(b"apt-getx")));
        assert!(is_bypass_comm(&comm_of(b"dpkg-deb")));
        assert!(is_bypass_comm(&comm_of(b"update-alternatives")));
        assert!(!is_bypass_comm(&comm_of(b"bash")));
    }

    #[test]
    fn hostname_wildcard_requires_dot_boundary() {
        assert!(hostname_matches_wildcard(
            b"api.example.com\0",
            b"*.example.com",
            13
        ));
        assert!(!hostname_matches_wildcard(
            b"evil-example.com\0",
            b"*.example.com",
            13
        ));
        assert!(!hostname_matches_wildcard(
            b"example.com\0",
            b"*.example.com",
            13
        ));
    }

    #[test]
    fn cgroup_scope_requires_nonzero_target_and_membership() {
        assert!(cgroup_in_scope(7, &[1, 2, 7], 7));
        assert!(!cgroup_in_scope(0, &[1, 2, 7], 7));
        assert!(!cgroup_in_scope(7, &[1, 2], 7));
    }
}

#[cfg(all(test, feature = "std"))]
mod reference_tests {
    use super::reference::*;
    use crate::consts::{ACTION_ALLOW, ACTION_DENY, OP_OPEN, OP_OPEN_RO, OP_OPEN_RW};
    use crate::rules::{ConnectRule, ExecRule, OpenRule, PendingExecArgs};

    fn open_rule(action: u32, operation: u32, path: &[u8]) -> OpenRule {
        let mut r = OpenRule::zeroed();
        r.action = action;
        r.operation = operation;
        r.path_len = path.len() as u32;
        r.path[..path.len()].copy_from_slice(path);
        r
    }

    #[test]
    fn e1_open_deny_blocks_matching_path() {
        let rules = [open_rule(ACTION_DENY, OP_OPEN, b"/etc/shadow")];
        let mut path = [0u8; 256];
        path[..11].copy_from_slice(b"/etc/shadow");
        let result = match_open(&rules, ACTION_ALLOW, &path, OP_OPEN_RO);
        assert_eq!(result, ACTION_DENY);
    }

    #[test]
    fn e2_open_mode_discrimination() {
        let rules = [open_rule(ACTION_DENY, OP_OPEN_RW, b"/data/config")];
        let mut path = [0u8; 256];
        path[..12].copy_from_slice(b"/data/config");
        assert_eq!(match_open(&rules, ACTION_ALLOW, &path, OP_OPEN_RO), ACTION_ALLOW);
        assert_eq!(match_open(&rules, ACTION_ALLOW, &path, OP_OPEN_RW), ACTION_DENY);
    }

    #[test]
    fn no_matching_rule_falls_back_to_default() {
        let rules = [open_rule(ACTION_DENY, OP_OPEN, b"/etc/shadow")];
        let mut path = [0u8; 256];
        path[..5].copy_from_slice(b"/tmp/");
        assert_eq!(match_open(&rules, ACTION_ALLOW, &path, OP_OPEN), ACTION_ALLOW);
        assert_eq!(match_open(&rules, ACTION_DENY, &path, OP_OPEN), ACTION_DENY);
    }

    fn exec_rule_path_only(action: u32, path: &[u8]) -> ExecRule {
        let mut r = ExecRule::zeroed();
        r.action = action;
        r.path_len = path.len() as u32;
        r.path[..path.len()].copy_from_slice(path);
        r
    }

    #[test]
    fn e3_exec_blacklist_denies_on_matching_arg() {
        let mut rule = exec_rule_path_only(ACTION_DENY, b"/usr/bin/curl");
        rule.arg_count = 1;
        rule.arg_lens[0] = 10;
        rule.args[0][..10].copy_from_slice(b"--insecure");
        let rules = [rule];

        let mut pending = PendingExecArgs::zeroed();
        pending.argc = 2;
        pending.detailed_args[0][..4].copy_from_slice(b"curl");
        pending.detailed_args[1][..10].copy_from_slice(b"--insecure");

        let mut path = [0u8; 256];
        path[..13].copy_from_slice(b"/usr/bin/curl");
        let result = match_exec(&rules, ACTION_ALLOW, &path, Some(&pending));
        assert_eq!(result, ACTION_DENY);
    }

    #[test]
    fn e4_exec_correlation_miss_falls_back_to_path_only_rule() {
        let mut rule = exec_rule_path_only(ACTION_ALLOW, b"/usr/bin/curl");
        rule.arg_count = 0;
        let rules = [rule];
        let mut path = [0u8; 256];
        path[..13].copy_from_slice(b"/usr/bin/curl");
        // arg_count == 0 means this rule matches on path alone, correlation
        // miss (None) included for completeness.
        assert_eq!(match_exec(&rules, ACTION_DENY, &path, None), ACTION_ALLOW);
    }

    #[test]
    fn allow_rule_with_arg_patterns_is_inert_per_open_question() {
        // An allow rule carrying arg_count > 0 does not get a blacklist
        // check (the original probe only scans args for deny rules); it
        // falls through to the default policy instead of ever enforcing
        // the listed arguments. Decision recorded in DESIGN.md.
        let mut rule = exec_rule_path_only(ACTION_ALLOW, b"/usr/bin/curl");
        rule.arg_count = 1;
        rule.arg_lens[0] = 10;
        rule.args[0][..10].copy_from_slice(b"--insecure");
        let rules = [rule];

        let mut pending = PendingExecArgs::zeroed();
        pending.argc = 2;
        pending.detailed_args[1][..10].copy_from_slice(b"--insecure");

        let mut path = [0u8; 256];
        path[..13].copy_from_slice(b"/usr/bin/curl");
        assert_eq!(match_exec(&rules, ACTION_DENY, &path, Some(&pending)), ACTION_DENY);
    }

    #[test]
    fn e6_connect_matches_ip_and_port() {
        let rule = ConnectRule {
            action: ACTION_DENY,
            dest_ip: u32::from_be_bytes([93, 184, 216, 34]),
            dest_port: 443u16.to_be(),
            ..ConnectRule::zeroed()
        };
        let rules = [rule];
        let ip = u32::from_be_bytes([93, 184, 216, 34]);
        assert_eq!(match_connect(&rules, ACTION_ALLOW, ip, 443u16.to_be()), ACTION_DENY);
        assert_eq!(
            match_connect(&rules, ACTION_ALLOW, ip, 8080u16.to_be()),
            ACTION_ALLOW
        );
    }

    #[test]
    fn e7_apt_bypass_forces_allow() {
        let comm = {
            let mut c = [0u8; 16];
            c[..7].copy_from_slice(b"apt-get");
            c
        };
        assert_eq!(apply_open_bypass(ACTION_DENY, &comm), ACTION_ALLOW);
        let other = {
            let mut c = [0u8; 16];
            c[..4].copy_from_slice(b"bash");
            c
        };
        assert_eq!(apply_open_bypass(ACTION_DENY, &other), ACTION_DENY);
    }
}
