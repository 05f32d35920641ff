use crate::error::WardenError;
use crate::policy::Policy;

use super::args::Args;
use super::config::ConfigFile;

/// Load and merge policies from a config file and command line arguments.
/// Config file entries are applied first, then CLI flags layer on top.
pub struct PolicyLoader;

impl PolicyLoader {
    pub fn load(args: &Args) -> Result<Policy, WardenError> {
        let mut policy = Policy::new();

        if let Some(config_path) = args.config.as_ref() {
            let config = ConfigFile::load(config_path)?;
            config.apply_to(&mut policy)?;
        }

        if args.allow_network_all {
            policy.connect.default_action = warden_abi::ACTION_ALLOW;
        }

        #[cfg(not(target_os = "macos"))]
        if !args.allow_network_all && !args.allow_network.is_empty() {
            let rules = crate::net::parser::parse_allow_network(&args.allow_network)?;
            for ip in rules.direct_v4 {
                policy.connect.allow_ipv4(ip);
            }
            for (network, prefix_len) in rules.cidr_v4 {
                policy.connect.allow_cidr(network, prefix_len)?;
            }
            policy.connect_domains.extend(rules.domains);
        }

        for path in &args.deny_file {
            policy.open.deny_read_write(path)?;
        }
        for path in &args.deny_file_read {
            policy.open.deny_read(path)?;
        }
        for path in &args.deny_file_write {
            policy.open.deny_write(path)?;
        }

        #[cfg(not(target_os = "macos"))]
        for path in &args.deny_exec {
            policy.exec.deny(path)?;
        }

        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args {
            config: None,
            #[cfg(not(target_os = "macos"))]
            allow_network: vec![],
            allow_network_all: false,
            deny_file: vec![],
            deny_file_read: vec![],
            deny_file_write: vec![],
            #[cfg(not(target_os = "macos"))]
            deny_exec: vec![],
            command: vec!["echo".to_string(), "test".to_string()],
        }
    }

    #[test]
    fn load_allow_network_all_relaxes_connect_default() {
        let mut args = base_args();
        args.allow_network_all = true;

        let policy = PolicyLoader::load(&args).unwrap();
        assert!(policy.connect_is_allow_all());
    }

    #[test]
    fn load_default_denies_all_network() {
        let args = base_args();

        let policy = PolicyLoader::load(&args).unwrap();
        assert!(!policy.connect_is_allow_all());
    }

    #[test]
    fn load_deny_file_populates_open_policy() {
        let mut args = base_args();
        args.deny_file = vec!["/tmp/secret".into()];

        let policy = PolicyLoader::load(&args).unwrap();
        assert_eq!(policy.open.rules.len(), 1);
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn load_deny_exec_populates_exec_policy() {
        let mut args = base_args();
        args.deny_exec = vec!["/usr/bin/nc".into()];

        let policy = PolicyLoader::load(&args).unwrap();
        assert_eq!(policy.exec.rules.len(), 1);
    }
}
