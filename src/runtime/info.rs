/*!
 * Async Info
 *
 * Result-type-independent view of an operation: status, error code,
 * cancel and close, each forwarded to the execution state.
 */

use super::state::ExecutionState;
use crate::core::errors::{AsyncError, AsyncResult};
use crate::core::types::AsyncStatus;
use crate::object::{iid, not_implemented, query_self, CapabilityId, Interface, InterfaceObject, InterfaceObjectExt, ObjectHandle};
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{trace, warn};

pub struct AsyncInfo {
    state: OnceLock<Arc<ExecutionState>>,
}

impl AsyncInfo {
    /// Info object with no state attached yet
    pub(crate) fn staged() -> Arc<Self> {
        let info = Arc::new(Self {
            state: OnceLock::new(),
        });
        trace!("created async info");
        info
    }

    /// Attach the backing state. Only the first attachment wins.
    pub(crate) fn attach(&self, state: Arc<ExecutionState>) -> AsyncResult<()> {
        self.state
            .set(state)
            .map_err(|_| AsyncError::IllegalStateChange)
    }

    fn state(self: &Arc<Self>) -> AsyncResult<Arc<ExecutionState>> {
        self.query::<ExecutionState>()
    }

    pub fn status(self: &Arc<Self>) -> AsyncResult<AsyncStatus> {
        self.state()?.status()
    }

    pub fn error_code(self: &Arc<Self>) -> AsyncResult<Option<AsyncError>> {
        self.state()?.error_code()
    }

    pub fn cancel(self: &Arc<Self>) -> AsyncResult<()> {
        self.state()?.cancel()
    }

    pub fn close(self: &Arc<Self>) -> AsyncResult<()> {
        self.state()?.close()
    }
}

impl InterfaceObject for AsyncInfo {
    fn iid(&self) -> CapabilityId {
        iid::ASYNC_INFO
    }

    fn query_interface(self: Arc<Self>, requested: CapabilityId) -> AsyncResult<ObjectHandle> {
        if let Some(this) = query_self(&self, requested, iid::ASYNC_INFO) {
            return Ok(this);
        }
        if requested == iid::EXECUTION_STATE {
            return match self.state.get() {
                Some(state) => Ok(Arc::clone(state) as ObjectHandle),
                None => {
                    warn!("execution state of async info is not initialized yet");
                    Err(AsyncError::NotInitialized)
                }
            };
        }
        Err(not_implemented(iid::ASYNC_INFO, requested))
    }
}

impl Interface for AsyncInfo {
    const IID: CapabilityId = iid::ASYNC_INFO;
}

impl fmt::Debug for AsyncInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncInfo")
            .field("state", &self.state.get())
            .finish()
    }
}
