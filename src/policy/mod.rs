pub mod connect;
pub mod exec;
pub mod open;

pub use connect::ConnectPolicy;
pub use exec::ExecPolicy;
pub use open::OpenPolicy;

use crate::error::WardenError;

/// Combined policy for all three enforcement domains, assembled by
/// `cli::PolicyLoader` from CLI flags and config file entries.
#[derive(Debug, Clone, Default)]
pub struct Policy {
    pub open: OpenPolicy,
    pub exec: ExecPolicy,
    pub connect: ConnectPolicy,
    /// Domain names awaiting DNS resolution. Kept separate from
    /// `connect.rules` because they can only be turned into `ConnectRule`s
    /// once the runtime resolves them, unlike direct IPs/CIDRs which are
    /// already expanded by the time a `Policy` is built.
    pub connect_domains: Vec<String>,
}

impl Policy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the connect domain is entirely unrestricted: no rules, no
    /// pending domains, and a permissive default. Callers can skip loading
    /// the connect hooks' policy maps in this case.
    pub fn connect_is_allow_all(&self) -> bool {
        self.connect.rules.is_empty()
            && self.connect_domains.is_empty()
            && self.connect.default_action == warden_abi::ACTION_ALLOW
    }
}

/// Encodes `s` into a fixed-size, zero-padded byte array, rejecting input
/// longer than `max_len` rather than silently truncating it (Testable
/// Property #9).
pub(crate) fn fixed_bytes<const N: usize>(
    s: &str,
    max_len: usize,
    entry: &str,
) -> Result<([u8; N], u32), WardenError> {
    let bytes = s.as_bytes();
    if bytes.len() > max_len || bytes.len() > N {
        return Err(WardenError::InvalidRule {
            entry: entry.to_string(),
            reason: format!("exceeds maximum length of {max_len} bytes"),
        });
    }
    let mut buf = [0u8; N];
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok((buf, bytes.len() as u32))
}
