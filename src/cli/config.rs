use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    error::WardenError,
    policy::{ExecPolicy, OpenPolicy, Policy},
};

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub file: FileConfig,
    #[serde(default)]
    pub exec: ExecConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct NetworkConfig {
    /// Allowed network destinations (bool for allow-all/deny-all, or a list
    /// of specific destinations)
    #[serde(default)]
    pub allow: AllowConfig,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            allow: AllowConfig::Boolean(false),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum AllowConfig {
    Boolean(bool),
    Entries(Vec<String>),
}

impl Default for AllowConfig {
    fn default() -> Self {
        AllowConfig::Boolean(false)
    }
}

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct FileConfig {
    /// Deny file read/write access to the specified paths
    #[serde(default)]
    pub deny: Vec<PathBuf>,
    /// Deny file read access to the specified paths
    #[serde(default)]
    pub deny_read: Vec<PathBuf>,
    /// Deny file write access to the specified paths
    #[serde(default)]
    pub deny_write: Vec<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct ExecConfig {
    /// If true, exec is deny-by-default and only `allow` entries run.
    #[serde(default)]
    pub default_deny: bool,
    /// Explicit exec allow entries (only meaningful with `default_deny = true`).
    #[serde(default)]
    pub allow: Vec<PathBuf>,
    /// Deny execution of these binaries outright.
    #[serde(default)]
    pub deny: Vec<PathBuf>,
    /// Deny execution of a binary only when invoked with a matching argument.
    #[serde(default)]
    pub deny_args: Vec<ExecArgRule>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ExecArgRule {
    pub path: PathBuf,
    pub patterns: Vec<String>,
}

impl ConfigFile {
    /// Load configuration file
    pub fn load(path: &Path) -> Result<Self, WardenError> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|source| WardenError::ConfigParse {
            path: PathBuf::from(path),
            source,
        })
    }

    /// Merge this file's entries into `policy`.
    pub fn apply_to(&self, policy: &mut Policy) -> Result<(), WardenError> {
        match &self.network.allow {
            AllowConfig::Boolean(true) => {
                policy.connect.default_action = warden_abi::ACTION_ALLOW;
            }
            AllowConfig::Boolean(false) => {}
            AllowConfig::Entries(entries) => {
                let rules = crate::net::parser::parse_allow_network(entries)?;
                for ip in rules.direct_v4 {
                    policy.connect.allow_ipv4(ip);
                }
                for (network, prefix_len) in rules.cidr_v4 {
                    policy.connect.allow_cidr(network, prefix_len)?;
                }
                policy.connect_domains.extend(rules.domains);
            }
        }

        for path in &self.file.deny {
            policy.open.deny_read_write(path)?;
        }
        for path in &self.file.deny_read {
            policy.open.deny_read(path)?;
        }
        for path in &self.file.deny_write {
            policy.open.deny_write(path)?;
        }

        if self.exec.default_deny {
            policy.exec.default_action = warden_abi::ACTION_DENY;
        }
        for path in &self.exec.allow {
            policy.exec.allow(path)?;
        }
        for path in &self.exec.deny {
            policy.exec.deny(path)?;
        }
        for rule in &self.exec.deny_args {
            let patterns: Vec<&str> = rule.patterns.iter().map(String::as_str).collect();
            policy.exec.deny_with_args(&rule.path, &patterns)?;
        }

        Ok(())
    }
}

/// Build a fresh `Policy` from an `OpenPolicy`/`ExecPolicy` pair of
/// defaults plus this file's entries. Used when no CLI flags are present.
pub fn policy_with_defaults() -> Policy {
    Policy {
        open: OpenPolicy::new(),
        exec: ExecPolicy::new(),
        ..Policy::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_and_apply_network_entries() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            tmp,
            "[network]\nallow = [\n \"192.0.2.1\",\n \"example.com\"\n]\n"
        )
        .unwrap();

        let config = ConfigFile::load(tmp.path()).unwrap();
        let mut policy = policy_with_defaults();
        config.apply_to(&mut policy).unwrap();

        assert_eq!(policy.connect.rules.len(), 1);
        assert_eq!(policy.connect_domains, vec!["example.com".to_string()]);
    }

    #[test]
    fn load_boolean_allow_true_sets_allow_all() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "[network]\nallow = true\n").unwrap();

        let config = ConfigFile::load(tmp.path()).unwrap();
        let mut policy = policy_with_defaults();
        config.apply_to(&mut policy).unwrap();

        assert!(policy.connect_is_allow_all());
    }

    #[test]
    fn load_boolean_allow_false_keeps_deny_all() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "[network]\nallow = false\n").unwrap();

        let config = ConfigFile::load(tmp.path()).unwrap();
        let mut policy = policy_with_defaults();
        config.apply_to(&mut policy).unwrap();

        assert!(!policy.connect_is_allow_all());
    }

    #[test]
    fn load_file_config_deny_paths() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            tmp,
            r#"
[file]
deny = ["/tmp/secret", "/etc/passwd"]
deny_read = ["/home/user/.ssh"]
deny_write = ["/var/log"]
"#
        )
        .unwrap();

        let config = ConfigFile::load(tmp.path()).unwrap();
        let mut policy = policy_with_defaults();
        config.apply_to(&mut policy).unwrap();

        assert_eq!(policy.open.rules.len(), 4);
    }

    #[test]
    fn load_exec_config_with_arg_blacklist() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            tmp,
            r#"
[exec]
default_deny = true
allow = ["/usr/bin/curl"]

[[exec.deny_args]]
path = "/usr/bin/find"
patterns = ["-exec"]
"#
        )
        .unwrap();

        let config = ConfigFile::load(tmp.path()).unwrap();
        let mut policy = policy_with_defaults();
        config.apply_to(&mut policy).unwrap();

        assert_eq!(policy.exec.default_action, warden_abi::ACTION_DENY);
        assert_eq!(policy.exec.rules.len(), 2);
    }

    #[test]
    fn load_empty_config_keeps_empty_policy() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "[network]\nallow = true\n").unwrap();

        let config = ConfigFile::load(tmp.path()).unwrap();
        let mut policy = policy_with_defaults();
        config.apply_to(&mut policy).unwrap();

        assert_eq!(policy.open.rules.len(), 0);
        assert_eq!(policy.exec.rules.len(), 0);
    }
}
