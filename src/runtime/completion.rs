/*!
 * Operation Completion
 *
 * Lets callers suspend on an [`AsyncOperation`] without polling its status.
 *
 * A [`Completion`] registers a [`DefaultCompletedHandler`] whose context is
 * the sending half of a oneshot channel. The worker (or `set_completed`, if
 * the operation already finished) fires the handler exactly once, which sends
 * the outcome and wakes the waiting task. The oneshot sender is consumed on
 * send, so the waiter can only ever be resumed once.
 *
 * Dropping a pending `Completion` detaches its own registration and nothing
 * else: the operation keeps running and its status is untouched.
 */

use super::handler::DefaultCompletedHandler;
use super::operation::AsyncOperation;
use crate::core::errors::{AsyncError, AsyncResult};
use crate::core::types::{AsyncStatus, ResultValue};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::trace;

type Outcome = AsyncResult<ResultValue>;
type ResumeHandler = DefaultCompletedHandler<Option<oneshot::Sender<Outcome>>>;

enum Registration {
    Ready(Outcome),
    Pending {
        receiver: oneshot::Receiver<Outcome>,
        handler: Arc<ResumeHandler>,
    },
    Done,
}

fn resume(operation: Arc<AsyncOperation>, sender: &mut Option<oneshot::Sender<Outcome>>, status: AsyncStatus) -> AsyncResult<()> {
    let outcome = if status.has_result() {
        operation.get_results()
    } else {
        // Closed before the work item settled
        Err(AsyncError::IllegalMethodCall)
    };
    if let Some(sender) = sender.take() {
        // The waiter may have gone away; nothing to resume then
        let _ = sender.send(outcome);
    }
    Ok(())
}

fn register(operation: &Arc<AsyncOperation>) -> Registration {
    match operation.status() {
        Ok(status) if status.has_result() => {
            trace!(operation_id = %operation.id(), "operation already settled, no suspension");
            return Registration::Ready(operation.get_results());
        }
        Ok(_) => {}
        Err(e) => return Registration::Ready(Err(e)),
    }

    let (sender, receiver) = oneshot::channel();
    let handler = DefaultCompletedHandler::new(resume, Some(sender));
    match operation.set_completed(handler.clone()) {
        Ok(()) => Registration::Pending { receiver, handler },
        Err(e) => Registration::Ready(Err(e)),
    }
}

/// Future resolving to the operation's result
///
/// Resolves to the stored error if the work item failed,
/// `IllegalDelegateAssignment` if the operation already had a handler, and
/// `IllegalMethodCall` if the operation was closed before it settled.
pub struct Completion {
    operation: Arc<AsyncOperation>,
    registration: Registration,
}

impl Completion {
    pub(crate) fn new(operation: Arc<AsyncOperation>) -> Self {
        let registration = register(&operation);
        Self {
            operation,
            registration,
        }
    }

    pub fn operation(&self) -> &Arc<AsyncOperation> {
        &self.operation
    }

    /// True until the outcome has been delivered or detached
    pub fn is_pending(&self) -> bool {
        matches!(self.registration, Registration::Pending { .. })
    }
}

impl Future for Completion {
    type Output = Outcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Registration::Pending { receiver, .. } = &mut this.registration {
            let outcome = match Pin::new(receiver).poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Ok(outcome)) => outcome,
                // Handler dropped without firing
                Poll::Ready(Err(_)) => Err(AsyncError::IllegalMethodCall),
            };
            this.registration = Registration::Done;
            return Poll::Ready(outcome);
        }

        match std::mem::replace(&mut this.registration, Registration::Done) {
            Registration::Ready(outcome) => Poll::Ready(outcome),
            // Polled after completion
            _ => Poll::Ready(Err(AsyncError::IllegalMethodCall)),
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if let Registration::Pending { handler, .. } = &self.registration {
            handler.detach();
            trace!("completion dropped before the operation settled, handler detached");
        }
    }
}

impl AsyncOperation {
    /// Future resolving once the operation settles
    ///
    /// Registers the operation's completion handler, unless the operation has
    /// already settled.
    pub fn completion(self: &Arc<Self>) -> Completion {
        Completion::new(Arc::clone(self))
    }

    /// Block the calling thread until the operation settles
    ///
    /// # Panics
    ///
    /// Panics when called from within an asynchronous execution context; use
    /// [`AsyncOperation::completion`] there.
    pub fn wait(self: &Arc<Self>) -> Outcome {
        match register(self) {
            Registration::Ready(outcome) => outcome,
            Registration::Pending { receiver, handler: _handler } => receiver
                .blocking_recv()
                .unwrap_or(Err(AsyncError::IllegalMethodCall)),
            Registration::Done => Err(AsyncError::IllegalMethodCall),
        }
    }
}
