/*!
 * Completion Handlers
 *
 * One-shot callbacks attached to an operation and invoked once it leaves
 * `Started`.
 */

use super::operation::AsyncOperation;
use crate::core::errors::AsyncResult;
use crate::core::types::AsyncStatus;
use crate::object::{iid, not_implemented, query_self, CapabilityId, Interface, InterfaceObject, ObjectHandle};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Completion handler capability
///
/// `invoke` receives its own reference to the operation. It is called at most
/// once per attachment and never while the operation's state lock is held,
/// so it may freely query the operation it is handed.
pub trait CompletedHandler: InterfaceObject {
    fn invoke(&self, operation: Arc<AsyncOperation>, status: AsyncStatus) -> AsyncResult<()>;
}

/// Shared handle to a completion handler
pub type HandlerRef = Arc<dyn CompletedHandler>;

type Callback<C> =
    Box<dyn Fn(Arc<AsyncOperation>, &mut C, AsyncStatus) -> AsyncResult<()> + Send + Sync>;

/// Adapts a plain callback plus a context value into a [`CompletedHandler`]
///
/// The context is released as soon as the handler has been invoked with a
/// status past `Started`, or earlier through [`DefaultCompletedHandler::detach`].
/// An invocation after release is a no-op.
pub struct DefaultCompletedHandler<C: Send + 'static> {
    callback: Callback<C>,
    context: Mutex<Option<C>>,
}

impl<C: Send + 'static> DefaultCompletedHandler<C> {
    pub fn new<F>(callback: F, context: C) -> Arc<Self>
    where
        F: Fn(Arc<AsyncOperation>, &mut C, AsyncStatus) -> AsyncResult<()> + Send + Sync + 'static,
    {
        let handler = Arc::new(Self {
            callback: Box::new(callback),
            context: Mutex::new(Some(context)),
        });
        trace!("created completion handler");
        handler
    }

    /// Take the context back, turning future invocations into no-ops
    pub fn detach(&self) -> Option<C> {
        self.context.lock().take()
    }

    /// Whether the context has been released
    pub fn is_released(&self) -> bool {
        self.context.lock().is_none()
    }
}

impl DefaultCompletedHandler<()> {
    /// Handler without a context value
    pub fn from_fn<F>(callback: F) -> Arc<Self>
    where
        F: Fn(Arc<AsyncOperation>, AsyncStatus) -> AsyncResult<()> + Send + Sync + 'static,
    {
        Self::new(move |operation, _: &mut (), status| callback(operation, status), ())
    }
}

impl<C: Send + 'static> InterfaceObject for DefaultCompletedHandler<C> {
    fn iid(&self) -> CapabilityId {
        iid::COMPLETED_HANDLER
    }

    fn query_interface(self: Arc<Self>, requested: CapabilityId) -> AsyncResult<ObjectHandle> {
        query_self(&self, requested, iid::COMPLETED_HANDLER)
            .ok_or_else(|| not_implemented(iid::COMPLETED_HANDLER, requested))
    }
}

impl<C: Send + 'static> Interface for DefaultCompletedHandler<C> {
    const IID: CapabilityId = iid::COMPLETED_HANDLER;
}

impl<C: Send + 'static> CompletedHandler for DefaultCompletedHandler<C> {
    fn invoke(&self, operation: Arc<AsyncOperation>, status: AsyncStatus) -> AsyncResult<()> {
        trace!(status = %status, operation = %operation.id(), "invoking completion handler");

        if status > AsyncStatus::Started {
            // Released before the callback runs so a re-entrant invoke sees no context
            let context = self.context.lock().take();
            return match context {
                Some(mut context) => (self.callback)(operation, &mut context, status),
                None => {
                    debug!("completion handler context already released");
                    Ok(())
                }
            };
        }

        // Lent out for the call; a re-entrant invoke meanwhile sees no context
        let Some(mut context) = self.context.lock().take() else {
            return Ok(());
        };
        let result = (self.callback)(operation, &mut context, status);
        let mut slot = self.context.lock();
        if slot.is_none() {
            *slot = Some(context);
        }
        result
    }
}

impl<C: Send + 'static> fmt::Debug for DefaultCompletedHandler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultCompletedHandler")
            .field("released", &self.is_released())
            .finish()
    }
}
