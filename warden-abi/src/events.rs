//! Audit records emitted by the decision probes onto their ring buffers.
//! Field order and types are part of the wire contract with the userspace
//! loader — see `SPEC_FULL.md` section 3 and 4.1.

use crate::consts::{COMM_LEN, HOSTNAME_MAX, MAX_CAPTURED_ARGS, CAPTURED_ARG_LEN, PATH_MAX};

/// Audit record for a matched `file_open` LSM decision.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct OpenEvent {
    pub pid: u32,
    pub tgid: u32,
    pub timestamp: u64,
    pub cgroup_id: u64,
    pub comm: [u8; COMM_LEN],
    pub path: [u8; PATH_MAX],
    pub operation: u32,
    pub result: i32,
}

const _: () = assert!(core::mem::align_of::<OpenEvent>() == 8);
const _: () = assert!(core::mem::size_of::<OpenEvent>() % 8 == 0);

/// Audit record for a matched `bprm_check_security` (exec) LSM decision.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ExecEvent {
    pub pid: u32,
    pub _padding: u32,
    pub timestamp: u64,
    pub cgroup_id: u64,
    pub comm: [u8; COMM_LEN],
    pub path: [u8; PATH_MAX],
    pub result: i32,
    pub argc: i32,
    pub detailed_args: [[u8; CAPTURED_ARG_LEN]; MAX_CAPTURED_ARGS],
}

const _: () = assert!(core::mem::align_of::<ExecEvent>() == 8);
const _: () = assert!(core::mem::size_of::<ExecEvent>() % 8 == 0);

/// Audit record for a matched `socket_connect`/`socket_sendmsg` decision.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ConnectEvent {
    pub pid: u32,
    pub tgid: u32,
    pub timestamp: u64,
    pub cgroup_id: u64,
    pub comm: [u8; COMM_LEN],
    pub family: u32,
    pub protocol: u32,
    /// Network byte order.
    pub dest_ip: u32,
    /// Network byte order.
    pub dest_port: u16,
    pub result: i32,
    pub dest_hostname: [u8; HOSTNAME_MAX],
}

const _: () = assert!(core::mem::align_of::<ConnectEvent>() == 8);
const _: () = assert!(core::mem::size_of::<ConnectEvent>() % 8 == 0);

#[cfg(feature = "std")]
mod decode {
    use super::*;

    /// Copies a raw ring buffer record into a typed event. The caller is
    /// responsible for ensuring `bytes.len() >= size_of::<T>()`; a short
    /// buffer is treated as a malformed record and rejected.
    fn copy_pod<T: Copy>(bytes: &[u8]) -> Option<T> {
        if bytes.len() < core::mem::size_of::<T>() {
            return None;
        }
        let mut out = core::mem::MaybeUninit::<T>::uninit();
        unsafe {
            core::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                out.as_mut_ptr() as *mut u8,
                core::mem::size_of::<T>(),
            );
            Some(out.assume_init())
        }
    }

    impl OpenEvent {
        pub fn decode(bytes: &[u8]) -> Option<Self> {
            copy_pod(bytes)
        }
    }

    impl ExecEvent {
        pub fn decode(bytes: &[u8]) -> Option<Self> {
            copy_pod(bytes)
        }
    }

    impl ConnectEvent {
        pub fn decode(bytes: &[u8]) -> Option<Self> {
            copy_pod(bytes)
        }
    }

    /// Trims a NUL-terminated byte buffer to the bytes preceding the first
    /// NUL, the convention used by every fixed-size string field in this
    /// crate.
    pub fn cstr(bytes: &[u8]) -> &[u8] {
        match bytes.iter().position(|&b| b == 0) {
            Some(idx) => &bytes[..idx],
            None => bytes,
        }
    }
}

#[cfg(feature = "std")]
pub use decode::cstr;

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn decode_roundtrips_open_event() {
        let ev = OpenEvent {
            pid: 42,
            tgid: 42,
            timestamp: 1234,
            cgroup_id: 7,
            comm: *b"bash\0\0\0\0\0\0\0\0\0\0\0\0",
            path: [0u8; PATH_MAX],
            operation: crate::consts::OP_OPEN_RW,
            result: 0,
        };
        let bytes = unsafe {
            core::slice::from_raw_parts(
                &ev as *const OpenEvent as *const u8,
                core::mem::size_of::<OpenEvent>(),
            )
        };
        let decoded = OpenEvent::decode(bytes).expect("decode");
        assert_eq!(decoded.pid, 42);
        assert_eq!(decoded.operation, crate::consts::OP_OPEN_RW);
        assert_eq!(cstr(&decoded.comm), b"bash");
    }

    #[test]
    fn decode_rejects_short_buffer() {
        assert!(OpenEvent::decode(&[0u8; 4]).is_none());
    }
}
