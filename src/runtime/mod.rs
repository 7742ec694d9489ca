/*!
 * Async Operation Runtime
 *
 * Submit a unit of work, observe its status, retrieve its result, cancel or
 * close it, and attach a one-shot completion handler, safely across a
 * background thread pool.
 *
 * ## Components
 *
 * - **WorkerPool**: lazily-grown thread pool executing work items
 * - **ExecutionState**: status state machine, stored result, handler slot
 * - **AsyncInfo**: status/error/cancel/close view, independent of the result
 * - **AsyncOperation**: the handle consumers hold
 * - **DefaultCompletedHandler**: closure-backed completion handler
 * - **Completion**: future bridging an operation into async code
 *
 * ## Flow
 *
 * ```text
 * AsyncOperation::spawn(work)
 *        │
 *        ▼
 *  ExecutionState::start ──► WorkerPool ──► worker thread
 *                                              │ run work
 *                                              │ store result, set status
 *                                              ▼
 *                                      completion handler ──► Completion wakes
 * ```
 */

mod completion;
mod handler;
mod info;
mod operation;
mod pool;
mod state;

pub use completion::Completion;
pub use handler::{CompletedHandler, DefaultCompletedHandler, HandlerRef};
pub use info::AsyncInfo;
pub use operation::{AsyncOperation, AsyncOperationBuilder};
pub use pool::{hardware_concurrency, PoolConfig, PoolStats, WorkerPool};
pub use state::{ExecutionState, OperationSnapshot, WorkFn};
