use thiserror::Error;

#[cfg(target_os = "linux")]
use aya::{EbpfError, maps::MapError, programs::ProgramError};
use hickory_resolver::error::ResolveError;

#[derive(Debug, Error)]
pub enum WardenError {
    #[cfg(target_os = "linux")]
    #[error("failed to load eBPF object: {0}")]
    BpfLoad(#[from] EbpfError),

    #[cfg(target_os = "linux")]
    #[error("program {name} not found in eBPF object")]
    ProgramNotFound { name: String },

    #[cfg(target_os = "linux")]
    #[error("failed to prepare program {name}: {source}")]
    ProgramPrepare {
        name: String,
        #[source]
        source: ProgramError,
    },

    #[cfg(target_os = "linux")]
    #[error("failed to attach program {name}: {source}")]
    ProgramAttach {
        name: String,
        #[source]
        source: ProgramError,
    },

    #[error("failed to initialize DNS resolver: {source}")]
    DnsResolverInit {
        #[source]
        source: ResolveError,
    },

    #[error("failed to resolve domain {domain}: {source}")]
    DnsLookup {
        domain: String,
        #[source]
        source: ResolveError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(target_os = "linux")]
    #[error("eBPF map error: {0}")]
    Map(#[from] MapError),

    #[error("failed to parse config file {path}: {source}")]
    ConfigParse {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid rule '{entry}': {reason}")]
    InvalidRule { entry: String, reason: String },

    #[cfg(not(target_os = "linux"))]
    #[error("operation not supported on this platform")]
    Unsupported,
}
