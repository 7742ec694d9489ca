/*!
 * Execution State
 *
 * Owns the pool submission, the status state machine, the stored result and
 * the completion handler slot of one async operation.
 *
 * ## State Machine
 *
 * ```text
 *            work ok           close
 *   Started ─────────► Completed ──────┐
 *      │    work err                   ▼
 *      ├─────────────► Error ─────► Closed
 *      │    cancel                     ▲
 *      └───────────────────────────────┘
 * ```
 *
 * Terminal statuses never revert; the worker never overwrites `Closed`.
 *
 * ## Locking
 *
 * One mutex guards status, result, error code, handler slot and pool handle.
 * It is never held while a completion handler runs or while a job is
 * submitted, so a handler may query the same operation synchronously.
 */

use super::handler::HandlerRef;
use super::operation::AsyncOperation;
use super::pool::WorkerPool;
use crate::core::errors::{AsyncError, AsyncResult};
use crate::core::types::{AsyncStatus, ResultValue, ValueType};
use crate::monitoring::OperationSpan;
use crate::object::{iid, not_implemented, query_self, CapabilityId, Interface, InterfaceObject, ObjectHandle};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

/// Work function run once on a pool thread with the optional invoker object
pub type WorkFn = Box<dyn FnOnce(Option<&ObjectHandle>) -> AsyncResult<ResultValue> + Send + 'static>;

/// One-shot completion handler slot
enum HandlerSlot {
    /// Never assigned; the only state that accepts a handler
    Unset,
    /// Assigned and waiting for the worker
    Set(HandlerRef),
    /// Assigned once and already fired, or about to fire
    Consumed,
}

impl HandlerSlot {
    fn take_for_invoke(&mut self) -> Option<HandlerRef> {
        match std::mem::replace(self, HandlerSlot::Consumed) {
            HandlerSlot::Set(handler) => Some(handler),
            HandlerSlot::Unset => {
                *self = HandlerSlot::Unset;
                None
            }
            HandlerSlot::Consumed => None,
        }
    }
}

struct StateInner {
    status: AsyncStatus,
    error_code: Option<AsyncError>,
    result: ResultValue,
    completed: HandlerSlot,
    work: Option<WorkFn>,
    pool: Option<WorkerPool>,
}

/// Serializable view of an operation for logs and diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSnapshot {
    pub id: Uuid,
    pub status: AsyncStatus,
    pub error_code: Option<AsyncError>,
    pub value_type: ValueType,
    pub handler_attached: bool,
}

pub struct ExecutionState {
    inner: Mutex<StateInner>,
    outer: Weak<AsyncOperation>,
    invoker: Option<ObjectHandle>,
    span: OperationSpan,
}

impl ExecutionState {
    pub(crate) fn new(
        outer: Weak<AsyncOperation>,
        invoker: Option<ObjectHandle>,
        work: WorkFn,
        pool: WorkerPool,
    ) -> Arc<Self> {
        let state = Arc::new(Self {
            inner: Mutex::new(StateInner {
                status: AsyncStatus::Started,
                error_code: None,
                result: ResultValue::Empty,
                completed: HandlerSlot::Unset,
                work: Some(work),
                pool: Some(pool),
            }),
            outer,
            invoker,
            span: OperationSpan::new(),
        });
        trace!(operation_id = %state.id(), "created execution state");
        state
    }

    pub fn id(&self) -> Uuid {
        self.span.id()
    }

    /// Queue the work item. The operation is kept alive until it has run.
    ///
    /// # Errors
    ///
    /// - `IllegalStateChange` if already started
    /// - `NotInitialized` if the owning operation is gone
    /// - `OutOfMemory` if the pool cannot run anything
    pub fn start(self: &Arc<Self>) -> AsyncResult<()> {
        let outer = self.outer.upgrade().ok_or(AsyncError::NotInitialized)?;

        let (work, pool) = {
            let mut inner = self.inner.lock();
            let work = inner.work.take().ok_or(AsyncError::IllegalStateChange)?;
            let pool = inner.pool.clone().ok_or(AsyncError::IllegalMethodCall)?;
            (work, pool)
        };

        let state = Arc::clone(self);
        pool.submit(move || state.execute(outer, work))?;
        debug!(operation_id = %self.id(), "work item queued");
        Ok(())
    }

    fn execute(self: Arc<Self>, outer: Arc<AsyncOperation>, work: WorkFn) {
        let outcome = {
            let _entered = self.span.enter();
            catch_unwind(AssertUnwindSafe(|| work(self.invoker.as_ref()))).unwrap_or_else(|_| {
                error!(operation_id = %self.id(), "work item panicked");
                Err(AsyncError::Generic)
            })
        };

        let (handler, status) = {
            let mut inner = self.inner.lock();
            if inner.status != AsyncStatus::Closed {
                inner.status = if outcome.is_ok() {
                    AsyncStatus::Completed
                } else {
                    AsyncStatus::Error
                };
            }
            match outcome {
                Ok(value) => {
                    inner.result = value;
                    inner.error_code = None;
                }
                Err(e) => {
                    inner.result = ResultValue::Empty;
                    inner.error_code = Some(e);
                }
            }
            (inner.completed.take_for_invoke(), inner.status)
        };

        self.span.record_status(status);

        if let Some(handler) = handler {
            if let Err(e) = handler.invoke(Arc::clone(&outer), status) {
                warn!(operation_id = %self.id(), error = %e, "completion handler failed");
            }
        }

        // Releases the reference taken in `start`
        drop(outer);
    }

    /// # Errors
    ///
    /// `IllegalMethodCall` once closed
    pub fn status(&self) -> AsyncResult<AsyncStatus> {
        let inner = self.inner.lock();
        match inner.status {
            AsyncStatus::Closed => Err(AsyncError::IllegalMethodCall),
            status => Ok(status),
        }
    }

    /// Stored error code, `None` meaning success
    ///
    /// # Errors
    ///
    /// `IllegalMethodCall` once closed
    pub fn error_code(&self) -> AsyncResult<Option<AsyncError>> {
        let inner = self.inner.lock();
        if inner.status == AsyncStatus::Closed {
            return Err(AsyncError::IllegalMethodCall);
        }
        Ok(inner.error_code)
    }

    /// Stored value on `Completed`, stored error on `Error`
    ///
    /// Any other status yields `Ok(Empty)`; check the status first.
    pub fn result(&self) -> AsyncResult<ResultValue> {
        let inner = self.inner.lock();
        if !inner.status.has_result() {
            return Ok(ResultValue::Empty);
        }
        match inner.error_code {
            None => Ok(inner.result.clone()),
            Some(e) => Err(e),
        }
    }

    /// Currently attached handler, if it has not fired yet
    ///
    /// # Errors
    ///
    /// `IllegalMethodCall` once closed
    pub fn completed(&self) -> AsyncResult<Option<HandlerRef>> {
        let inner = self.inner.lock();
        if inner.status == AsyncStatus::Closed {
            return Err(AsyncError::IllegalMethodCall);
        }
        match &inner.completed {
            HandlerSlot::Set(handler) => Ok(Some(Arc::clone(handler))),
            HandlerSlot::Unset | HandlerSlot::Consumed => Ok(None),
        }
    }

    /// Attach the one-shot completion handler
    ///
    /// If the work item already finished, the handler runs on the calling
    /// thread before this returns.
    ///
    /// # Errors
    ///
    /// - `IllegalMethodCall` once closed
    /// - `IllegalDelegateAssignment` if a handler was ever assigned before
    pub fn set_completed(&self, handler: HandlerRef) -> AsyncResult<()> {
        let mut inner = self.inner.lock();
        if inner.status == AsyncStatus::Closed {
            return Err(AsyncError::IllegalMethodCall);
        }
        if !matches!(inner.completed, HandlerSlot::Unset) {
            return Err(AsyncError::IllegalDelegateAssignment);
        }

        if inner.status.is_pending() {
            inner.completed = HandlerSlot::Set(handler);
            return Ok(());
        }

        inner.completed = HandlerSlot::Consumed;
        let status = inner.status;
        drop(inner);

        match self.outer.upgrade() {
            Some(outer) => {
                if let Err(e) = handler.invoke(outer, status) {
                    warn!(operation_id = %self.id(), error = %e, "completion handler failed");
                }
            }
            None => warn!(operation_id = %self.id(), "operation gone, handler dropped"),
        }
        Ok(())
    }

    /// Force `Closed` if the work item has not finished
    ///
    /// Does not interrupt a work item that is already running; its result is
    /// stored but the status stays `Closed`.
    ///
    /// # Errors
    ///
    /// `IllegalMethodCall` if already closed
    pub fn cancel(&self) -> AsyncResult<()> {
        let mut inner = self.inner.lock();
        match inner.status {
            AsyncStatus::Closed => Err(AsyncError::IllegalMethodCall),
            AsyncStatus::Started => {
                inner.status = AsyncStatus::Closed;
                debug!(operation_id = %self.id(), "operation cancelled");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Release the pool handle and mark `Closed`
    ///
    /// Queued jobs are neither awaited nor cancelled. Idempotent once closed.
    ///
    /// # Errors
    ///
    /// `IllegalStateChange` while still `Started`
    pub fn close(&self) -> AsyncResult<()> {
        let pool = {
            let mut inner = self.inner.lock();
            match inner.status {
                AsyncStatus::Started => return Err(AsyncError::IllegalStateChange),
                AsyncStatus::Closed => return Ok(()),
                _ => {
                    inner.status = AsyncStatus::Closed;
                    inner.pool.take()
                }
            }
        };
        // Dropped outside the lock; may be the last handle to the pool
        drop(pool);
        debug!(operation_id = %self.id(), "operation closed");
        Ok(())
    }

    /// Snapshot readable in any status, including `Closed`
    pub fn snapshot(&self) -> OperationSnapshot {
        let inner = self.inner.lock();
        OperationSnapshot {
            id: self.id(),
            status: inner.status,
            error_code: inner.error_code,
            value_type: inner.result.value_type(),
            handler_attached: matches!(inner.completed, HandlerSlot::Set(_)),
        }
    }
}

impl InterfaceObject for ExecutionState {
    fn iid(&self) -> CapabilityId {
        iid::EXECUTION_STATE
    }

    fn query_interface(self: Arc<Self>, requested: CapabilityId) -> AsyncResult<ObjectHandle> {
        query_self(&self, requested, iid::EXECUTION_STATE)
            .ok_or_else(|| not_implemented(iid::EXECUTION_STATE, requested))
    }
}

impl Interface for ExecutionState {
    const IID: CapabilityId = iid::EXECUTION_STATE;
}

impl Drop for ExecutionState {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if inner.status != AsyncStatus::Closed {
            inner.status = AsyncStatus::Closed;
            inner.pool = None;
        }
        trace!(operation_id = %self.span.id(), "execution state destroyed");
    }
}

impl fmt::Debug for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionState")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}
