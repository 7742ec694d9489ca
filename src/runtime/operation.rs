/*!
 * Async Operation
 *
 * The object consumers hold: submit a work item, observe its status, fetch
 * its result, attach a one-shot completion handler, cancel or close it.
 *
 * # Example
 *
 * ```ignore
 * let op = AsyncOperation::spawn(|_| Ok(ResultValue::I32(42)))?;
 * let value = op.wait()?;
 * ```
 */

use super::handler::HandlerRef;
use super::info::AsyncInfo;
use super::pool::{PoolConfig, WorkerPool};
use super::state::{ExecutionState, OperationSnapshot, WorkFn};
use crate::core::errors::{AsyncError, AsyncResult};
use crate::core::types::{AsyncStatus, ResultValue};
use crate::object::{iid, not_implemented, query_self, CapabilityId, Interface, InterfaceObject, InterfaceObjectExt, ObjectHandle};
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{trace, warn};
use uuid::Uuid;

pub struct AsyncOperation {
    info: OnceLock<Arc<AsyncInfo>>,
}

impl AsyncOperation {
    /// Run `work` on a pool of its own, with no invoker object
    pub fn spawn<F>(work: F) -> AsyncResult<Arc<Self>>
    where
        F: FnOnce(Option<&ObjectHandle>) -> AsyncResult<ResultValue> + Send + 'static,
    {
        Self::builder().spawn(work)
    }

    pub fn builder() -> AsyncOperationBuilder {
        AsyncOperationBuilder::default()
    }

    fn info(self: &Arc<Self>) -> AsyncResult<Arc<AsyncInfo>> {
        self.query::<AsyncInfo>()
    }

    fn state(self: &Arc<Self>) -> AsyncResult<Arc<ExecutionState>> {
        self.query::<ExecutionState>()
    }

    /// Operation id used in trace output
    pub fn id(self: &Arc<Self>) -> Uuid {
        self.state().map(|state| state.id()).unwrap_or_else(|_| Uuid::nil())
    }

    pub fn status(self: &Arc<Self>) -> AsyncResult<AsyncStatus> {
        self.info()?.status()
    }

    pub fn error_code(self: &Arc<Self>) -> AsyncResult<Option<AsyncError>> {
        self.info()?.error_code()
    }

    pub fn cancel(self: &Arc<Self>) -> AsyncResult<()> {
        self.info()?.cancel()
    }

    pub fn close(self: &Arc<Self>) -> AsyncResult<()> {
        self.info()?.close()
    }

    pub fn completed(self: &Arc<Self>) -> AsyncResult<Option<HandlerRef>> {
        self.state()?.completed()
    }

    pub fn set_completed(self: &Arc<Self>, handler: HandlerRef) -> AsyncResult<()> {
        self.state()?.set_completed(handler)
    }

    /// Stored value, with the stored error surfaced as the return status
    ///
    /// Returns `Ok(Empty)` while the work item is still pending.
    pub fn get_results(self: &Arc<Self>) -> AsyncResult<ResultValue> {
        self.state()?.result()
    }

    /// [`AsyncOperation::get_results`] converted to a concrete type
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the stored value has a different type
    pub fn get_results_as<T>(self: &Arc<Self>) -> AsyncResult<T>
    where
        T: TryFrom<ResultValue, Error = AsyncError>,
    {
        T::try_from(self.get_results()?)
    }

    pub fn snapshot(self: &Arc<Self>) -> AsyncResult<OperationSnapshot> {
        Ok(self.state()?.snapshot())
    }
}

impl InterfaceObject for AsyncOperation {
    fn iid(&self) -> CapabilityId {
        iid::ASYNC_OPERATION
    }

    fn query_interface(self: Arc<Self>, requested: CapabilityId) -> AsyncResult<ObjectHandle> {
        if let Some(this) = query_self(&self, requested, iid::ASYNC_OPERATION) {
            return Ok(this);
        }
        if requested == iid::ASYNC_INFO || requested == iid::EXECUTION_STATE {
            let Some(info) = self.info.get() else {
                warn!(requested = %requested, "async info of operation is not initialized yet");
                return Err(AsyncError::NotInitialized);
            };
            // The state is a sub-object of the info
            return Arc::clone(info).query_interface(requested);
        }
        Err(not_implemented(iid::ASYNC_OPERATION, requested))
    }
}

impl Interface for AsyncOperation {
    const IID: CapabilityId = iid::ASYNC_OPERATION;
}

impl fmt::Debug for AsyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncOperation")
            .field("info", &self.info.get())
            .finish()
    }
}

/// Builder for operations that need an invoker object or a shared pool
#[derive(Default)]
pub struct AsyncOperationBuilder {
    invoker: Option<ObjectHandle>,
    pool: Option<WorkerPool>,
    pool_config: Option<PoolConfig>,
}

impl AsyncOperationBuilder {
    /// Object handed to the work function; held until the operation is destroyed
    pub fn with_invoker(mut self, invoker: ObjectHandle) -> Self {
        self.invoker = Some(invoker);
        self
    }

    /// Run on an existing pool instead of a private one
    pub fn with_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Configuration for the private pool (ignored with `with_pool`)
    pub fn with_pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = Some(config);
        self
    }

    /// Create the operation and queue its work item
    ///
    /// # Errors
    ///
    /// `OutOfMemory` if the pool cannot start a worker
    pub fn spawn<F>(self, work: F) -> AsyncResult<Arc<AsyncOperation>>
    where
        F: FnOnce(Option<&ObjectHandle>) -> AsyncResult<ResultValue> + Send + 'static,
    {
        let pool = self
            .pool
            .unwrap_or_else(|| WorkerPool::new(self.pool_config.unwrap_or_default()));

        let operation = Arc::new(AsyncOperation {
            info: OnceLock::new(),
        });

        let info = AsyncInfo::staged();
        let work: WorkFn = Box::new(work);
        let state = ExecutionState::new(Arc::downgrade(&operation), self.invoker, work, pool);
        info.attach(state)?;
        operation
            .info
            .set(info)
            .map_err(|_| AsyncError::IllegalStateChange)?;

        operation.state()?.start()?;
        trace!(operation_id = %operation.id(), "created async operation");
        Ok(operation)
    }
}
