use std::path::Path;

use warden_abi::{
    ACTION_ALLOW, ACTION_DENY, EXEC_ARG_PATTERN_SCAN_MAX, ExecRule, OP_EXEC, RULE_ARG_COUNT,
    RULE_ARG_LEN, RULE_PATH_MATCH_MAX,
};

use crate::error::WardenError;
use crate::policy::fixed_bytes;

/// Already-expanded exec policy. `deny_path_with_args` rules are only
/// consulted as an argument blacklist when `action == ACTION_DENY`, per
/// the correlation channel's upstream behavior (an allow rule carrying
/// argument patterns is inert — see `warden_abi::matcher::reference::
/// match_exec` and `DESIGN.md`'s Open Question 1).
#[derive(Debug, Clone)]
pub struct ExecPolicy {
    pub rules: Vec<ExecRule>,
    pub default_action: u32,
}

impl Default for ExecPolicy {
    fn default() -> Self {
        // Allow-by-default, deny-list semantics: without this the command the
        // caller asked to run would itself need an explicit allow rule.
        Self {
            rules: Vec::new(),
            default_action: ACTION_ALLOW,
        }
    }
}

impl ExecPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_action(mut self, action: u32) -> Self {
        self.default_action = action;
        self
    }

    /// Allow any exec of `path`, regardless of arguments.
    pub fn allow<P: AsRef<Path>>(&mut self, path: P) -> Result<(), WardenError> {
        self.push_rule(path.as_ref(), ACTION_ALLOW, &[])
    }

    /// Deny any exec of `path`, regardless of arguments.
    pub fn deny<P: AsRef<Path>>(&mut self, path: P) -> Result<(), WardenError> {
        self.push_rule(path.as_ref(), ACTION_DENY, &[])
    }

    /// Deny exec of `path` when any captured argument matches one of
    /// `arg_patterns` as a prefix (only the first `EXEC_ARG_PATTERN_SCAN_MAX`
    /// patterns and first `RULE_ARG_COUNT` overall are consulted).
    pub fn deny_with_args<P: AsRef<Path>>(
        &mut self,
        path: P,
        arg_patterns: &[&str],
    ) -> Result<(), WardenError> {
        self.push_rule(path.as_ref(), ACTION_DENY, arg_patterns)
    }

    fn push_rule(
        &mut self,
        path: &Path,
        action: u32,
        arg_patterns: &[&str],
    ) -> Result<(), WardenError> {
        let entry = path.to_string_lossy().into_owned();
        let path_str = path.to_string_lossy();
        let (path_bytes, path_len) =
            fixed_bytes::<{ warden_abi::PATH_MAX }>(&path_str, RULE_PATH_MATCH_MAX, &entry)?;

        let mut rule = ExecRule::zeroed();
        rule.action = action;
        rule.operation = OP_EXEC;
        rule.path_len = path_len;
        rule.path = path_bytes;

        if arg_patterns.len() > EXEC_ARG_PATTERN_SCAN_MAX {
            log::warn!(
                "exec rule for '{entry}' carries {} argument patterns; only the first {} are ever consulted",
                arg_patterns.len(),
                EXEC_ARG_PATTERN_SCAN_MAX
            );
        }

        let n = arg_patterns.len().min(RULE_ARG_COUNT);
        for (i, pattern) in arg_patterns.iter().take(n).enumerate() {
            let (bytes, len) = fixed_bytes::<RULE_ARG_LEN>(pattern, RULE_ARG_LEN, pattern)?;
            rule.args[i] = bytes;
            rule.arg_lens[i] = len;
        }
        rule.arg_count = n as u32;

        self.rules.push(rule);
        Ok(())
    }
}
