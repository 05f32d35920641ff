use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Kernel-resident eBPF/LSM policy enforcement for file, exec, and network operations"
)]
pub struct Args {
    /// Path to configuration file (TOML)
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Allow outbound connections to the specified host[:port] (FQDN/IP/CIDR)
    #[cfg(not(target_os = "macos"))]
    #[arg(long = "allow-network", value_delimiter = ',')]
    pub allow_network: Vec<String>,

    /// Allow all outbound network connections
    #[arg(long = "allow-network-all")]
    pub allow_network_all: bool,

    /// Deny file read/write access to the specified paths (all other paths are allowed)
    #[arg(long = "deny-file", value_delimiter = ',')]
    pub deny_file: Vec<PathBuf>,

    /// Deny file read access to the specified paths (all other paths are allowed)
    #[arg(long = "deny-file-read", value_delimiter = ',')]
    pub deny_file_read: Vec<PathBuf>,

    /// Deny file write access to the specified paths (all other paths are allowed)
    #[arg(long = "deny-file-write", value_delimiter = ',')]
    pub deny_file_write: Vec<PathBuf>,

    /// Deny execution of the specified binaries (all other binaries are allowed)
    #[cfg(not(target_os = "macos"))]
    #[arg(long = "deny-exec", value_delimiter = ',')]
    pub deny_exec: Vec<PathBuf>,

    /// Command to execute
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}
