mod cgroup;
mod correlation;
mod ebpf;
mod events;
mod sync;

use std::{
    net::Ipv4Addr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use warden_abi::ACTION_ALLOW;

use crate::{
    error::WardenError,
    net::resolver::{DnsResolver, SystemDnsResolver},
    policy::Policy,
};

use cgroup::CgroupManager;
use ebpf::WardenEbpf;
use sync::ShutdownSignal;

/// Spawn a command and add it to a cgroup before execution.
///
/// Uses fork() to get the PID before exec, allowing the process to be
/// added to the cgroup before it starts executing the command.
fn spawn_command(
    command: &str,
    args: &[&str],
    cgroup_path: &std::path::Path,
) -> Result<ChildProcess, WardenError> {
    use nix::unistd::{ForkResult, fork};

    let mut pipe_fds = [0i32; 2];
    if unsafe { libc::pipe(pipe_fds.as_mut_ptr()) } != 0 {
        return Err(WardenError::Io(std::io::Error::last_os_error()));
    }
    let read_fd = pipe_fds[0];
    let write_fd = pipe_fds[1];

    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => {
            unsafe { libc::close(read_fd) };

            let pid = child.as_raw() as u32;
            let procs_path = cgroup_path.join("cgroup.procs");
            std::fs::write(&procs_path, pid.to_string())?;
            log::info!("Added process {} to cgroup", pid);

            unsafe { libc::close(write_fd) };

            Ok(ChildProcess { pid: child })
        }
        Ok(ForkResult::Child) => {
            use std::os::unix::process::CommandExt;
            use std::process::Command;

            unsafe { libc::close(write_fd) };

            let mut buf = [0u8; 1];
            unsafe { libc::read(read_fd, buf.as_mut_ptr() as *mut libc::c_void, 1) };
            unsafe { libc::close(read_fd) };

            let mut cmd = Command::new(command);
            cmd.args(args);

            if let (Ok(uid_str), Ok(gid_str)) =
                (std::env::var("SUDO_UID"), std::env::var("SUDO_GID"))
                && let (Ok(uid), Ok(gid)) = (uid_str.parse::<u32>(), gid_str.parse::<u32>())
            {
                cmd.uid(uid).gid(gid);
            }

            let err = cmd.exec();
            panic!("exec failed: {}", err);
        }
        Err(e) => Err(WardenError::Io(std::io::Error::from(e))),
    }
}

struct ChildProcess {
    pid: nix::unistd::Pid,
}

impl ChildProcess {
    fn id(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    fn wait(&mut self) -> Result<std::process::ExitStatus, WardenError> {
        use nix::sys::wait::{WaitStatus, waitpid};
        use std::os::unix::process::ExitStatusExt;

        match waitpid(self.pid, None) {
            Ok(WaitStatus::Exited(_, code)) => Ok(std::process::ExitStatus::from_raw(code << 8)),
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                Ok(std::process::ExitStatus::from_raw(signal as i32))
            }
            Ok(_) => Ok(std::process::ExitStatus::from_raw(0)),
            Err(e) => Err(WardenError::Io(std::io::Error::from(e))),
        }
    }
}

/// Run `command` under the three-domain policy: create a throwaway cgroup,
/// load and attach `warden-bpf`'s hooks scoped to it, populate the policy
/// maps, spawn the command into the cgroup, then wait for it to finish.
pub async fn execute_with_policy(
    command: &str,
    args: &[&str],
    policy: &Policy,
) -> Result<i32, WardenError> {
    let cgroup = CgroupManager::create()?;

    let fully_permissive = policy.open.rules.is_empty()
        && policy.open.default_action == ACTION_ALLOW
        && policy.exec.rules.is_empty()
        && policy.exec.default_action == ACTION_ALLOW
        && policy.connect_is_allow_all();

    if fully_permissive {
        let mut child = spawn_command(command, args, cgroup.path())?;
        let status = child.wait()?;
        return Ok(status.code().unwrap_or(-1));
    }

    let resolver = SystemDnsResolver;
    let resolved = resolver.resolve_domains(&policy.connect_domains).await?;

    let mut ebpf = WardenEbpf::load()?;
    ebpf.attach_all()?;

    let cgroup_id = cgroup.cgroup_id()?;
    ebpf.set_open_target_cgroup(cgroup_id)?;
    ebpf.set_exec_target_cgroup(cgroup_id)?;
    ebpf.set_connect_target_cgroup(cgroup_id)?;
    ebpf.set_open_allowed_cgroups(&[cgroup_id])?;
    ebpf.set_exec_allowed_cgroups(&[cgroup_id])?;
    ebpf.set_connect_allowed_cgroups(&[cgroup_id])?;

    ebpf.set_open_rules(&policy.open.rules, policy.open.default_action)?;
    ebpf.set_exec_rules(&policy.exec.rules, policy.exec.default_action)?;

    let mut connect_rules = policy.connect.rules.clone();
    let localhost: Ipv4Addr = "127.0.0.1".parse().unwrap();
    let mut localhost_policy = crate::policy::ConnectPolicy::new();
    localhost_policy.allow_ipv4(localhost);
    connect_rules.extend(localhost_policy.rules);

    for domain in &resolved.domains {
        let addrs: Vec<Ipv4Addr> = domain.records.iter().map(|entry| entry.ip).collect();
        let mut domain_policy = crate::policy::ConnectPolicy::new();
        domain_policy.allow_domain(&domain.domain, &addrs)?;
        connect_rules.extend(domain_policy.rules);
        for addr in &addrs {
            ebpf.set_dns_entry(*addr, &domain.domain)?;
        }
    }
    for ip in &resolved.dns_v4 {
        let mut dns_policy = crate::policy::ConnectPolicy::new();
        dns_policy.allow_ipv4(*ip);
        connect_rules.extend(dns_policy.rules);
    }

    ebpf.set_connect_rules(&connect_rules, policy.connect.default_action)?;

    let events_shutdown = Arc::new(AtomicBool::new(false));
    let events_handle = events::spawn_listener(ebpf.shared(), Arc::clone(&events_shutdown));

    let ebpf = Arc::new(Mutex::new(ebpf));
    let correlation_shutdown = ShutdownSignal::new();
    let correlation_handle =
        correlation::spawn_sweep(Arc::clone(&ebpf), Arc::clone(&correlation_shutdown));

    let mut child = spawn_command(command, args, cgroup.path())?;
    log::info!(
        "Spawned child process {} (added to cgroup via pre-exec)",
        child.id()
    );

    let status = child.wait()?;

    correlation_shutdown.shutdown();
    match correlation_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => log::error!("correlation sweep failed: {err}"),
        Err(err) => log::error!("correlation sweep task panicked: {err}"),
    }

    events_shutdown.store(true, Ordering::Relaxed);
    match tokio::task::spawn_blocking(move || events_handle.join()).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => log::error!("event listener thread panicked"),
        Err(err) => log::error!("event listener join task panicked: {err}"),
    }

    Ok(status.code().unwrap_or(-1))
}
