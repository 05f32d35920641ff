use std::net::Ipv4Addr;

use warden_abi::{ACTION_ALLOW, ACTION_DENY, ConnectRule, HOSTNAME_MAX, OP_CONNECT};

use crate::error::WardenError;
use crate::policy::fixed_bytes;

/// Already-expanded connect policy. CIDR ranges are expanded to individual
/// `/32` rules at build time, the way the teacher's `NetworkEbpf::allow_cidr`
/// expands a CIDR into individual map entries rather than teaching the
/// kernel side to do mask arithmetic (`ConnectRule` carries a single
/// `dest_ip`, no mask field). Only prefix lengths >= 24 are accepted, for
/// the same map-size reason the teacher enforces it.
#[derive(Debug, Clone)]
pub struct ConnectPolicy {
    pub rules: Vec<ConnectRule>,
    pub default_action: u32,
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            default_action: ACTION_DENY,
        }
    }
}

impl ConnectPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_action(mut self, action: u32) -> Self {
        self.default_action = action;
        self
    }

    /// Allow connections to a single IPv4 address, any port.
    pub fn allow_ipv4(&mut self, addr: Ipv4Addr) {
        self.push_rule(ACTION_ALLOW, addr.to_bits().to_be(), 0, "");
    }

    /// Allow connections to `addr:port`.
    pub fn allow_ipv4_port(&mut self, addr: Ipv4Addr, port: u16) {
        self.push_rule(ACTION_ALLOW, addr.to_bits().to_be(), port.to_be(), "");
    }

    /// Allow connections to every address in a CIDR range (`prefix_len` must
    /// be >= 24, i.e. at most 256 addresses) by expanding it into individual
    /// `/32` rules.
    pub fn allow_cidr(&mut self, network: Ipv4Addr, prefix_len: u8) -> Result<(), WardenError> {
        if prefix_len < 24 {
            return Err(WardenError::InvalidRule {
                entry: format!("{network}/{prefix_len}"),
                reason: "CIDR prefix length must be >= 24 (at most 256 addresses)".to_string(),
            });
        }

        let network_bits = network.to_bits();
        let mask = if prefix_len == 0 {
            0
        } else {
            !0u32 << (32 - prefix_len)
        };
        let network_addr = network_bits & mask;
        let num_addresses = 1u32 << (32 - prefix_len);

        for i in 0..num_addresses {
            let ip = network_addr.wrapping_add(i);
            self.push_rule(ACTION_ALLOW, ip.to_be(), 0, "");
        }
        Ok(())
    }

    /// Allow connections to a domain's resolved addresses, annotated with
    /// the hostname for audit purposes only (hostname enforcement is
    /// disabled; see `DESIGN.md` Open Question 3).
    pub fn allow_domain(&mut self, hostname: &str, addrs: &[Ipv4Addr]) -> Result<(), WardenError> {
        for addr in addrs {
            self.push_rule_with_hostname(ACTION_ALLOW, addr.to_bits().to_be(), 0, hostname)?;
        }
        Ok(())
    }

    fn push_rule(&mut self, action: u32, dest_ip: u32, dest_port: u16, hostname: &str) {
        self.push_rule_with_hostname(action, dest_ip, dest_port, hostname)
            .expect("empty hostname always fits HOSTNAME_MAX");
    }

    fn push_rule_with_hostname(
        &mut self,
        action: u32,
        dest_ip: u32,
        dest_port: u16,
        hostname: &str,
    ) -> Result<(), WardenError> {
        let (hostname_bytes, hostname_len) =
            fixed_bytes::<HOSTNAME_MAX>(hostname, HOSTNAME_MAX, hostname)?;

        let mut rule = ConnectRule::zeroed();
        rule.action = action;
        rule.operation = OP_CONNECT;
        rule.dest_ip = dest_ip;
        rule.dest_port = dest_port;
        rule.hostname = hostname_bytes;
        rule.hostname_len = hostname_len;
        rule.is_wildcard = 0;
        self.rules.push(rule);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_defaults_to_deny_all() {
        let policy = ConnectPolicy::new();
        assert!(policy.rules.is_empty());
        assert_eq!(policy.default_action, ACTION_DENY);
    }

    #[test]
    fn allow_ipv4_stores_network_byte_order() {
        let mut policy = ConnectPolicy::new();
        let addr: Ipv4Addr = "192.0.2.1".parse().unwrap();
        policy.allow_ipv4(addr);
        assert_eq!(policy.rules[0].dest_ip, addr.to_bits().to_be());
        assert_eq!(policy.rules[0].dest_port, 0);
    }

    #[test]
    fn allow_ipv4_port_stores_network_byte_order_port() {
        let mut policy = ConnectPolicy::new();
        policy.allow_ipv4_port("192.0.2.1".parse().unwrap(), 443);
        assert_eq!(policy.rules[0].dest_port, 443u16.to_be());
    }

    #[test]
    fn allow_cidr_rejects_prefix_below_24() {
        let mut policy = ConnectPolicy::new();
        let err = policy
            .allow_cidr("10.0.0.0".parse().unwrap(), 16)
            .unwrap_err();
        assert!(matches!(err, WardenError::InvalidRule { .. }));
    }

    #[test]
    fn allow_cidr_slash_24_expands_to_256_rules() {
        let mut policy = ConnectPolicy::new();
        policy
            .allow_cidr("203.0.113.0".parse().unwrap(), 24)
            .unwrap();
        assert_eq!(policy.rules.len(), 256);
    }

    #[test]
    fn allow_domain_annotates_hostname() {
        let mut policy = ConnectPolicy::new();
        policy
            .allow_domain("example.com", &["93.184.216.34".parse().unwrap()])
            .unwrap();
        assert_eq!(policy.rules.len(), 1);
        assert_eq!(
            &policy.rules[0].hostname[..b"example.com".len()],
            b"example.com"
        );
    }
}
