/*!
 * Error Types
 * Status-code taxonomy for the async operation runtime with thiserror, miette, and serde support
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for every runtime operation. `Ok` is the success status.
pub type AsyncResult<T> = Result<T, AsyncError>;

/// Failure status codes surfaced by objects, operations and work items
///
/// Every variant maps to a stable numeric code (see [`AsyncError::code`]) so
/// statuses can be logged and compared across process boundaries.
#[derive(
    Error, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Diagnostic,
)]
#[serde(tag = "error_type", rename_all = "snake_case")]
pub enum AsyncError {
    #[error("Work function failed")]
    #[diagnostic(
        code(async_op::generic_error),
        help("Inspect the operation's stored error code and the worker logs.")
    )]
    Generic,

    #[error("File not found")]
    #[diagnostic(code(async_op::file_not_found))]
    FileNotFound,

    #[error("Invalid argument")]
    #[diagnostic(code(async_op::invalid_argument))]
    InvalidArgument,

    #[error("Access denied")]
    #[diagnostic(code(async_op::access_denied))]
    AccessDenied,

    #[error("Out of memory")]
    #[diagnostic(
        code(async_op::out_of_memory),
        help("Allocation or worker thread creation failed. Free resources and retry.")
    )]
    OutOfMemory,

    #[error("Capability not implemented")]
    #[diagnostic(
        code(object::not_implemented),
        help("The object does not expose the requested capability id.")
    )]
    NotImplemented,

    #[error("Capability not initialized")]
    #[diagnostic(
        code(object::not_initialized),
        help("The sub-object backing this capability has not been attached yet.")
    )]
    NotInitialized,

    #[error("Illegal method call on a closed operation")]
    #[diagnostic(
        code(async_op::illegal_method_call),
        help("The operation was closed or cancelled. Create a new operation.")
    )]
    IllegalMethodCall,

    #[error("Completion handler already assigned")]
    #[diagnostic(
        code(async_op::illegal_delegate_assignment),
        help("The completion handler slot is one-shot and cannot be reassigned.")
    )]
    IllegalDelegateAssignment,

    #[error("Illegal state change")]
    #[diagnostic(
        code(async_op::illegal_state_change),
        help("Close is only valid once the operation reached a terminal status.")
    )]
    IllegalStateChange,
}

impl AsyncError {
    /// Stable numeric status code
    pub const fn code(self) -> u32 {
        match self {
            Self::Generic => 1,
            Self::FileNotFound => 2,
            Self::InvalidArgument => 3,
            Self::AccessDenied => 13,
            Self::OutOfMemory => 14,
            Self::NotImplemented => 0x8000_0001,
            Self::NotInitialized => 0x8000_0002,
            Self::IllegalMethodCall => 0x8000_000B,
            Self::IllegalDelegateAssignment => 0x8000_0018,
            Self::IllegalStateChange => 0x8000_000D,
        }
    }

    /// Inverse of [`AsyncError::code`]. Returns `None` for 0 (success) and unknown codes.
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Generic),
            2 => Some(Self::FileNotFound),
            3 => Some(Self::InvalidArgument),
            13 => Some(Self::AccessDenied),
            14 => Some(Self::OutOfMemory),
            0x8000_0001 => Some(Self::NotImplemented),
            0x8000_0002 => Some(Self::NotInitialized),
            0x8000_000B => Some(Self::IllegalMethodCall),
            0x8000_0018 => Some(Self::IllegalDelegateAssignment),
            0x8000_000D => Some(Self::IllegalStateChange),
            _ => None,
        }
    }

    /// True for errors raised by the object model rather than by work items
    pub const fn is_object_error(self) -> bool {
        matches!(self, Self::NotImplemented | Self::NotInitialized)
    }
}

/// Numeric code for a status, 0 meaning success
pub fn status_code<T>(result: &AsyncResult<T>) -> u32 {
    match result {
        Ok(_) => 0,
        Err(e) => AsyncError::code(*e),
    }
}
