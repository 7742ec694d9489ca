/*!
 * TraceRayer Async Runtime
 * Capability-queryable async operations backed by a worker thread pool
 */

pub mod core;
pub mod monitoring;
pub mod object;
pub mod runtime;

// Re-exports
pub use crate::core::{AsyncError, AsyncResult, AsyncStatus, ResultValue, ValueType};
pub use monitoring::{init_tracing, OperationSpan};
pub use object::{iid, CapabilityId, Interface, InterfaceObject, InterfaceObjectExt, ObjectHandle};
pub use runtime::{
    AsyncInfo, AsyncOperation, AsyncOperationBuilder, CompletedHandler, Completion,
    DefaultCompletedHandler, ExecutionState, HandlerRef, OperationSnapshot, PoolConfig,
    PoolStats, WorkerPool,
};
