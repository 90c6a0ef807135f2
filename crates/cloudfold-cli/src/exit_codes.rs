//! Exit codes of the `cloudfold` binary.
//! Client errors map through `ClientError::exit_code`; everything else is a usage error.

use cloudfold_client::ClientError;

pub const SUCCESS: i32 = 0;
pub const FAILED: i32 = 1; // Request rejected or mutation rolled back
pub const USAGE_ERROR: i32 = 2; // Bad arguments, unreadable local file
pub const CANCELLED: i32 = 3; // User declined a confirmation

/// Exit code for an error that reached `main`.
pub fn code_for(error: &anyhow::Error) -> i32 {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<ClientError>())
        .map_or(USAGE_ERROR, ClientError::exit_code)
}
