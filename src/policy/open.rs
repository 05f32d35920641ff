use std::path::Path;

use warden_abi::{
    ACTION_ALLOW, ACTION_DENY, OP_OPEN, OP_OPEN_RO, OP_OPEN_RW, OpenRule, RULE_PATH_MATCH_MAX,
};

use crate::error::WardenError;
use crate::policy::fixed_bytes;

/// Already-expanded file-open policy: a dense rule vector plus a default
/// action, ready to be copied verbatim into the `open_policy_rules` map.
/// Generalizes the teacher's `FilePolicy` deny-list, which held friendly
/// `(PathBuf, AccessMode)` pairs for a single access-mode encoding; here the
/// rules are already kernel-shaped because expansion is the out-of-scope
/// controller's job.
#[derive(Debug, Clone)]
pub struct OpenPolicy {
    pub rules: Vec<OpenRule>,
    pub default_action: u32,
}

impl Default for OpenPolicy {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            default_action: ACTION_ALLOW,
        }
    }
}

impl OpenPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_action(mut self, action: u32) -> Self {
        self.default_action = action;
        self
    }

    /// Deny read-only opens of `path`.
    pub fn deny_read<P: AsRef<Path>>(&mut self, path: P) -> Result<(), WardenError> {
        self.push_rule(path.as_ref(), OP_OPEN_RO, ACTION_DENY)
    }

    /// Deny opens that request write access to `path`.
    pub fn deny_write<P: AsRef<Path>>(&mut self, path: P) -> Result<(), WardenError> {
        self.push_rule(path.as_ref(), OP_OPEN_RW, ACTION_DENY)
    }

    /// Deny any open of `path`, regardless of access mode.
    pub fn deny_read_write<P: AsRef<Path>>(&mut self, path: P) -> Result<(), WardenError> {
        self.push_rule(path.as_ref(), OP_OPEN, ACTION_DENY)
    }

    /// Explicitly allow any open of `path`, overriding a broader deny rule
    /// matched earlier in the scan order.
    pub fn allow<P: AsRef<Path>>(&mut self, path: P) -> Result<(), WardenError> {
        self.push_rule(path.as_ref(), OP_OPEN, ACTION_ALLOW)
    }

    fn push_rule(&mut self, path: &Path, operation: u32, action: u32) -> Result<(), WardenError> {
        let entry = path.to_string_lossy().into_owned();
        let path = normalize(path);
        let path_str = path.to_string_lossy();
        let (path_bytes, path_len) =
            fixed_bytes::<{ warden_abi::PATH_MAX }>(&path_str, RULE_PATH_MATCH_MAX, &entry)?;

        let mut rule = OpenRule::zeroed();
        rule.action = action;
        rule.operation = operation;
        rule.path_len = path_len;
        rule.path = path_bytes;
        rule.is_directory = 0;
        self.rules.push(rule);
        Ok(())
    }
}

fn normalize(path: &Path) -> std::path::PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("/"))
            .join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_defaults_to_allow_all() {
        let policy = OpenPolicy::new();
        assert!(policy.rules.is_empty());
        assert_eq!(policy.default_action, ACTION_ALLOW);
    }

    #[test]
    fn deny_read_sets_read_only_operation() {
        let mut policy = OpenPolicy::new();
        policy.deny_read("/etc/shadow").unwrap();
        assert_eq!(policy.rules.len(), 1);
        assert_eq!(policy.rules[0].operation, OP_OPEN_RO);
        assert_eq!(policy.rules[0].action, ACTION_DENY);
    }

    #[test]
    fn deny_write_sets_rw_operation() {
        let mut policy = OpenPolicy::new();
        policy.deny_write("/etc/hosts").unwrap();
        assert_eq!(policy.rules[0].operation, OP_OPEN_RW);
    }

    #[test]
    fn deny_read_write_sets_generic_operation() {
        let mut policy = OpenPolicy::new();
        policy.deny_read_write("/etc/passwd").unwrap();
        assert_eq!(policy.rules[0].operation, OP_OPEN);
    }

    #[test]
    fn relative_path_is_normalized_to_absolute() {
        let mut policy = OpenPolicy::new();
        policy.deny_read("relative.txt").unwrap();
        let path_len = policy.rules[0].path_len as usize;
        assert_eq!(policy.rules[0].path[0], b'/');
        assert!(path_len > "relative.txt".len());
    }

    #[test]
    fn path_longer_than_match_bound_is_rejected() {
        let mut policy = OpenPolicy::new();
        let long = format!("/{}", "a".repeat(RULE_PATH_MATCH_MAX));
        let err = policy.deny_read(long).unwrap_err();
        assert!(matches!(err, WardenError::InvalidRule { .. }));
    }
}
