//! Loads the compiled `warden-bpf` object once, attaches its four hooks,
//! and exposes typed setters for each of the per-domain maps. Generalizes
//! the teacher's `NetworkEbpf`/`FileEbpf` (one eBPF object per domain, one
//! program each) into a single object attaching three `Lsm` programs and
//! one `TracePoint` across the open/exec/connect domains.

use std::{
    convert::TryInto,
    net::Ipv4Addr,
    sync::{Arc, Mutex},
};

use aya::{
    Btf, Ebpf, include_bytes_aligned,
    maps::{Array, HashMap},
    programs::{
        lsm::{Lsm, LsmLinkId},
        trace_point::{TracePoint, TracePointLinkId},
    },
};

use warden_abi::{ConnectRule, ExecRule, OpenRule};

use crate::error::WardenError;

pub const EBPF_ELF: &[u8] = include_bytes_aligned!(env!("WARDEN_BPF_ELF"));

const OPEN_RULE_SIZE: usize = core::mem::size_of::<OpenRule>();
const EXEC_RULE_SIZE: usize = core::mem::size_of::<ExecRule>();
const CONNECT_RULE_SIZE: usize = core::mem::size_of::<ConnectRule>();
const DNS_CACHE_ENTRY_SIZE: usize = core::mem::size_of::<warden_abi::DnsCacheEntry>();

/// The rule/correlation records have no pointer-sized fields, so their
/// layout is identical on the host and the BPF target; they are shipped to
/// the per-domain `Array` maps as raw byte arrays to avoid implementing a
/// foreign `aya::Pod` for a foreign `warden_abi` type.
fn to_bytes<T, const N: usize>(value: &T) -> [u8; N] {
    debug_assert_eq!(core::mem::size_of::<T>(), N);
    let mut buf = [0u8; N];
    unsafe {
        core::ptr::copy_nonoverlapping(value as *const T as *const u8, buf.as_mut_ptr(), N);
    }
    buf
}

fn from_bytes<T, const N: usize>(bytes: &[u8; N]) -> T {
    debug_assert_eq!(core::mem::size_of::<T>(), N);
    unsafe { core::ptr::read_unaligned(bytes.as_ptr() as *const T) }
}

const PENDING_EXEC_ARGS_SIZE: usize = core::mem::size_of::<warden_abi::PendingExecArgs>();

/// Holds the loaded eBPF object behind a shared lock so the event listener
/// thread and the correlation sweep task can each borrow a map without
/// taking ownership of it. Dropping this struct's last clone detaches every
/// program automatically.
pub struct WardenEbpf {
    bpf: Arc<Mutex<Ebpf>>,
    _lsm_links: Vec<LsmLinkId>,
    _tp_links: Vec<TracePointLinkId>,
}

impl WardenEbpf {
    /// Load the compiled object and initialize `aya-log`. Hooks are
    /// attached separately via [`Self::attach_all`] once the maps have been
    /// populated, matching the teacher's load-then-attach ordering.
    pub fn load() -> Result<Self, WardenError> {
        let mut bpf = Ebpf::load(EBPF_ELF)?;
        if let Err(e) = aya_log::EbpfLogger::init(&mut bpf) {
            log::warn!("failed to initialize eBPF logger: {e}");
        }
        Ok(Self {
            bpf: Arc::new(Mutex::new(bpf)),
            _lsm_links: Vec::new(),
            _tp_links: Vec::new(),
        })
    }

    /// Clone of the shared handle, for the event listener thread.
    pub(super) fn shared(&self) -> Arc<Mutex<Ebpf>> {
        Arc::clone(&self.bpf)
    }

    /// Attach the three LSM hooks and the execve tracepoint.
    pub fn attach_all(&mut self) -> Result<(), WardenError> {
        let btf = Btf::from_sys_fs()?;
        for (name, hook) in [
            ("warden_open", "file_open"),
            ("warden_exec", "bprm_check_security"),
            ("warden_connect", "socket_connect"),
            ("warden_sendmsg", "socket_sendmsg"),
        ] {
            let link = self.attach_lsm(name, hook, &btf)?;
            self._lsm_links.push(link);
        }

        let link = self.attach_tracepoint("warden_exec_enter", "syscalls", "sys_enter_execve")?;
        self._tp_links.push(link);

        Ok(())
    }

    fn attach_lsm(&mut self, name: &str, hook: &str, btf: &Btf) -> Result<LsmLinkId, WardenError> {
        let mut guard = self.bpf.lock().unwrap();
        let program = guard
            .program_mut(name)
            .ok_or_else(|| WardenError::ProgramNotFound {
                name: name.to_string(),
            })?;
        let program: &mut Lsm = program
            .try_into()
            .map_err(|source| WardenError::ProgramPrepare {
                name: name.to_string(),
                source,
            })?;
        program
            .load(hook, btf)
            .map_err(|source| WardenError::ProgramPrepare {
                name: name.to_string(),
                source,
            })?;
        program.attach().map_err(|source| WardenError::ProgramAttach {
            name: name.to_string(),
            source,
        })
    }

    fn attach_tracepoint(
        &mut self,
        name: &str,
        category: &str,
        syscall: &str,
    ) -> Result<TracePointLinkId, WardenError> {
        let mut guard = self.bpf.lock().unwrap();
        let program = guard
            .program_mut(name)
            .ok_or_else(|| WardenError::ProgramNotFound {
                name: name.to_string(),
            })?;
        let program: &mut TracePoint =
            program
                .try_into()
                .map_err(|source| WardenError::ProgramPrepare {
                    name: name.to_string(),
                    source,
                })?;
        program.load().map_err(|source| WardenError::ProgramPrepare {
            name: name.to_string(),
            source,
        })?;
        program
            .attach(category, syscall)
            .map_err(|source| WardenError::ProgramAttach {
                name: name.to_string(),
                source,
            })
    }

    pub fn set_open_target_cgroup(&mut self, cgroup_id: u64) -> Result<(), WardenError> {
        self.set_target_cgroup("OPEN_TARGET_CGROUP", cgroup_id)
    }

    pub fn set_exec_target_cgroup(&mut self, cgroup_id: u64) -> Result<(), WardenError> {
        self.set_target_cgroup("EXEC_TARGET_CGROUP", cgroup_id)
    }

    pub fn set_connect_target_cgroup(&mut self, cgroup_id: u64) -> Result<(), WardenError> {
        self.set_target_cgroup("CONNECT_TARGET_CGROUP", cgroup_id)
    }

    fn set_target_cgroup(&mut self, map_name: &str, cgroup_id: u64) -> Result<(), WardenError> {
        let mut guard = self.bpf.lock().unwrap();
        let mut map: Array<_, u64> = Array::try_from(guard.map_mut(map_name).unwrap())?;
        map.set(0, cgroup_id, 0).map_err(WardenError::Map)
    }

    pub fn set_open_allowed_cgroups(&mut self, ids: &[u64]) -> Result<(), WardenError> {
        self.set_allowed_cgroups("OPEN_ALLOWED_CGROUPS", ids)
    }

    pub fn set_exec_allowed_cgroups(&mut self, ids: &[u64]) -> Result<(), WardenError> {
        self.set_allowed_cgroups("EXEC_ALLOWED_CGROUPS", ids)
    }

    pub fn set_connect_allowed_cgroups(&mut self, ids: &[u64]) -> Result<(), WardenError> {
        self.set_allowed_cgroups("CONNECT_ALLOWED_CGROUPS", ids)
    }

    fn set_allowed_cgroups(&mut self, map_name: &str, ids: &[u64]) -> Result<(), WardenError> {
        let mut guard = self.bpf.lock().unwrap();
        let mut map: HashMap<_, u64, u8> = HashMap::try_from(guard.map_mut(map_name).unwrap())?;
        for id in ids {
            map.insert(id, 1, 0).map_err(WardenError::Map)?;
        }
        Ok(())
    }

    pub fn set_open_rules(&mut self, rules: &[OpenRule], default_action: u32) -> Result<(), WardenError> {
        {
            let mut guard = self.bpf.lock().unwrap();
            let mut array: Array<_, [u8; OPEN_RULE_SIZE]> =
                Array::try_from(guard.map_mut("OPEN_POLICY_RULES").unwrap())?;
            for (i, rule) in rules.iter().enumerate() {
                array
                    .set(i as u32, to_bytes(rule), 0)
                    .map_err(WardenError::Map)?;
            }
        }
        self.set_u32_slot("OPEN_NUM_RULES", rules.len() as u32)?;
        self.set_u32_slot("OPEN_DEFAULT_POLICY", default_action)
    }

    pub fn set_exec_rules(&mut self, rules: &[ExecRule], default_action: u32) -> Result<(), WardenError> {
        {
            let mut guard = self.bpf.lock().unwrap();
            let mut array: Array<_, [u8; EXEC_RULE_SIZE]> =
                Array::try_from(guard.map_mut("EXEC_POLICY_RULES").unwrap())?;
            for (i, rule) in rules.iter().enumerate() {
                array
                    .set(i as u32, to_bytes(rule), 0)
                    .map_err(WardenError::Map)?;
            }
        }
        self.set_u32_slot("EXEC_NUM_RULES", rules.len() as u32)?;
        self.set_u32_slot("EXEC_DEFAULT_POLICY", default_action)
    }

    pub fn set_connect_rules(
        &mut self,
        rules: &[ConnectRule],
        default_action: u32,
    ) -> Result<(), WardenError> {
        {
            let mut guard = self.bpf.lock().unwrap();
            let mut array: Array<_, [u8; CONNECT_RULE_SIZE]> =
                Array::try_from(guard.map_mut("CONNECT_POLICY_RULES").unwrap())?;
            for (i, rule) in rules.iter().enumerate() {
                array
                    .set(i as u32, to_bytes(rule), 0)
                    .map_err(WardenError::Map)?;
            }
        }
        self.set_u32_slot("CONNECT_NUM_RULES", rules.len() as u32)?;
        self.set_u32_slot("CONNECT_DEFAULT_POLICY", default_action)
    }

    fn set_u32_slot(&mut self, map_name: &str, value: u32) -> Result<(), WardenError> {
        let mut guard = self.bpf.lock().unwrap();
        let mut map: Array<_, u32> = Array::try_from(guard.map_mut(map_name).unwrap())?;
        map.set(0, value, 0).map_err(WardenError::Map)
    }

    /// Seed the DNS annotation cache. In production this table is populated
    /// by an out-of-scope DNS observer; the reference loader exposes this
    /// setter only so the demonstration policy can pre-seed hostnames for
    /// the domains it resolved at startup.
    pub fn set_dns_entry(&mut self, addr: Ipv4Addr, hostname: &str) -> Result<(), WardenError> {
        if hostname.len() >= warden_abi::HOSTNAME_MAX {
            return Err(WardenError::InvalidRule {
                entry: hostname.to_string(),
                reason: format!(
                    "exceeds maximum length of {} bytes",
                    warden_abi::HOSTNAME_MAX
                ),
            });
        }
        let mut entry = warden_abi::DnsCacheEntry::zeroed();
        entry.hostname[..hostname.len()].copy_from_slice(hostname.as_bytes());

        let mut guard = self.bpf.lock().unwrap();
        let mut map: HashMap<_, u32, [u8; DNS_CACHE_ENTRY_SIZE]> =
            HashMap::try_from(guard.map_mut("DNS_CACHE").unwrap())?;
        let key = addr.to_bits().to_be();
        map.insert(key, to_bytes(&entry), 0).map_err(WardenError::Map)
    }

    /// Deletes `PENDING_EXEC_ARGS` entries the matched LSM hook never
    /// reclaimed (the tracepoint fired but `bprm_check_security` for that
    /// pid never ran, or ran before the userspace listener could decode the
    /// resulting event). `now_ns` and entry timestamps are both
    /// `bpf_ktime_get_ns()`-scale (nanoseconds since boot, `CLOCK_MONOTONIC`).
    pub fn sweep_stale_pending_exec_args(
        &mut self,
        now_ns: u64,
        max_age_ns: u64,
    ) -> Result<usize, WardenError> {
        let mut guard = self.bpf.lock().unwrap();
        let mut map: HashMap<_, u32, [u8; PENDING_EXEC_ARGS_SIZE]> =
            HashMap::try_from(guard.map_mut("PENDING_EXEC_ARGS").unwrap())?;

        let stale: Vec<u32> = map
            .iter()
            .filter_map(|entry| entry.ok())
            .filter_map(|(pid, raw)| {
                let pending: warden_abi::PendingExecArgs = from_bytes(&raw);
                (now_ns.saturating_sub(pending.timestamp) > max_age_ns).then_some(pid)
            })
            .collect();

        for pid in &stale {
            map.remove(pid).map_err(WardenError::Map)?;
        }
        Ok(stale.len())
    }
}
