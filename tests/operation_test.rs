/*!
 * Async Operation Tests
 * Lifecycle, status transitions, results and capability routing
 */

use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracerayer::{
    iid, AsyncError, AsyncInfo, AsyncOperation, AsyncResult, AsyncStatus, CapabilityId,
    DefaultCompletedHandler, ExecutionState, Interface, InterfaceObject, InterfaceObjectExt, ObjectHandle, ResultValue,
    ValueType,
};

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    false
}

/// Work item that blocks until the returned sender fires (or is dropped)
fn gated(
    value: ResultValue,
) -> (
    flume::Sender<()>,
    impl FnOnce(Option<&ObjectHandle>) -> AsyncResult<ResultValue> + Send + 'static,
) {
    let (tx, rx) = flume::bounded::<()>(1);
    let work = move |_: Option<&ObjectHandle>| -> AsyncResult<ResultValue> {
        let _ = rx.recv_timeout(Duration::from_secs(5));
        Ok(value)
    };
    (tx, work)
}

const IID_INVOKER: CapabilityId = CapabilityId::from_u128(0x5eed_0000_0000_0000_0000_0000_0000_0001);

struct Invoker {
    name: &'static str,
}

impl InterfaceObject for Invoker {
    fn iid(&self) -> CapabilityId {
        IID_INVOKER
    }

    fn query_interface(self: Arc<Self>, requested: CapabilityId) -> AsyncResult<ObjectHandle> {
        if requested == iid::UNKNOWN || requested == IID_INVOKER {
            Ok(self)
        } else {
            Err(AsyncError::NotImplemented)
        }
    }
}

impl Interface for Invoker {
    const IID: CapabilityId = IID_INVOKER;
}

#[test]
fn test_status_is_started_until_work_returns() {
    let (release, work) = gated(ResultValue::I32(42));
    let op = AsyncOperation::spawn(work).unwrap();

    assert_eq!(op.status(), Ok(AsyncStatus::Started));
    assert_eq!(op.error_code(), Ok(None));
    // Result fields are meaningless while pending
    assert_eq!(op.get_results(), Ok(ResultValue::Empty));

    release.send(()).unwrap();
    assert_eq!(op.wait(), Ok(ResultValue::I32(42)));
    assert_eq!(op.status(), Ok(AsyncStatus::Completed));
}

#[test]
fn test_successful_work_stores_value() {
    let op = AsyncOperation::spawn(|_| Ok(ResultValue::I32(42))).unwrap();
    assert_eq!(op.wait(), Ok(ResultValue::I32(42)));

    assert_eq!(op.status(), Ok(AsyncStatus::Completed));
    assert_eq!(op.error_code(), Ok(None));
    assert_eq!(op.get_results_as::<i32>(), Ok(42));
    assert_eq!(
        op.get_results_as::<String>(),
        Err(AsyncError::InvalidArgument)
    );
}

#[test]
fn test_failing_work_stores_error() {
    let op = AsyncOperation::spawn(|_| Err(AsyncError::Generic)).unwrap();
    assert_eq!(op.wait(), Err(AsyncError::Generic));

    assert_eq!(op.status(), Ok(AsyncStatus::Error));
    assert_eq!(op.error_code(), Ok(Some(AsyncError::Generic)));
    assert_eq!(op.get_results(), Err(AsyncError::Generic));

    let snapshot = op.snapshot().unwrap();
    assert_eq!(snapshot.value_type, ValueType::Empty);
}

#[test]
fn test_panicking_work_becomes_generic_error() {
    let op = AsyncOperation::spawn(|_| panic!("work item exploded")).unwrap();
    assert_eq!(op.wait(), Err(AsyncError::Generic));
    assert_eq!(op.error_code(), Ok(Some(AsyncError::Generic)));
}

#[test]
fn test_close_while_started_is_rejected() {
    let (release, work) = gated(ResultValue::Empty);
    let op = AsyncOperation::spawn(work).unwrap();

    assert_eq!(op.close(), Err(AsyncError::IllegalStateChange));
    assert_eq!(op.status(), Ok(AsyncStatus::Started));

    release.send(()).unwrap();
    op.wait().unwrap();
    assert_eq!(op.close(), Ok(()));
}

#[test]
fn test_close_is_idempotent() {
    let op = AsyncOperation::spawn(|_| Ok(ResultValue::Bool(true))).unwrap();
    op.wait().unwrap();

    assert_eq!(op.close(), Ok(()));
    assert_eq!(op.close(), Ok(()));

    assert_eq!(op.status(), Err(AsyncError::IllegalMethodCall));
    assert_eq!(op.error_code(), Err(AsyncError::IllegalMethodCall));
    assert_eq!(op.completed().err(), Some(AsyncError::IllegalMethodCall));
    assert_eq!(op.cancel(), Err(AsyncError::IllegalMethodCall));
    // Still observable for diagnostics
    assert_eq!(op.snapshot().unwrap().status, AsyncStatus::Closed);
}

#[test]
fn test_cancel_started_operation_closes_it() {
    let (release, work) = gated(ResultValue::I32(7));
    let op = AsyncOperation::spawn(work).unwrap();

    assert_eq!(op.cancel(), Ok(()));
    assert_eq!(op.status(), Err(AsyncError::IllegalMethodCall));

    // The running work item is not interrupted, and does not revive the operation
    release.send(()).unwrap();
    assert!(wait_until(|| op.snapshot().unwrap().value_type == ValueType::I32));
    assert_eq!(op.snapshot().unwrap().status, AsyncStatus::Closed);
    assert_eq!(op.status(), Err(AsyncError::IllegalMethodCall));
    assert_eq!(op.close(), Ok(()));
}

#[test]
fn test_cancel_after_completion_is_noop() {
    let op = AsyncOperation::spawn(|_| Ok(ResultValue::U8(1))).unwrap();
    op.wait().unwrap();

    assert_eq!(op.cancel(), Ok(()));
    assert_eq!(op.status(), Ok(AsyncStatus::Completed));
    assert_eq!(op.get_results(), Ok(ResultValue::U8(1)));
}

#[test]
fn test_invoker_is_passed_to_work_and_released_with_operation() {
    let invoker = Arc::new(Invoker { name: "renderer" });
    let handle: ObjectHandle = invoker.clone();

    let op = AsyncOperation::builder()
        .with_invoker(handle)
        .spawn(|invoker| {
            let invoker = invoker.ok_or(AsyncError::InvalidArgument)?;
            let typed = invoker.query::<Invoker>()?;
            Ok(ResultValue::from(typed.name))
        })
        .unwrap();

    assert_eq!(op.wait(), Ok(ResultValue::String("renderer".into())));
    assert!(invoker.ref_count() >= 2);

    drop(op);
    assert!(wait_until(|| invoker.ref_count() == 1));
}

#[test]
fn test_work_without_invoker_sees_none() {
    let op = AsyncOperation::spawn(|invoker| Ok(ResultValue::Bool(invoker.is_none()))).unwrap();
    assert_eq!(op.wait(), Ok(ResultValue::Bool(true)));
}

#[test]
fn test_dropping_operation_does_not_abort_work() {
    let ran = Arc::new(AtomicUsize::new(0));
    let counter = ran.clone();
    let op = AsyncOperation::spawn(move |_| {
        std::thread::sleep(Duration::from_millis(20));
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(ResultValue::Empty)
    })
    .unwrap();

    drop(op);
    assert!(wait_until(|| ran.load(Ordering::SeqCst) == 1));
}

#[test]
fn test_in_flight_work_keeps_released_operation_alive() {
    let (release, work) = gated(ResultValue::I32(42));
    let op = AsyncOperation::spawn(work).unwrap();
    let (tx, rx) = flume::unbounded();

    op.set_completed(DefaultCompletedHandler::from_fn(move |op, status| {
        let observed = (status, op.status(), op.get_results());
        tx.send(observed).map_err(|_| AsyncError::Generic)
    }))
    .unwrap();

    // Last external reference goes away while the work item is still gated
    let state = Arc::downgrade(&op.query::<ExecutionState>().unwrap());
    drop(op);
    assert!(state.upgrade().is_some());

    release.send(()).unwrap();
    let (status, current, value) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(status, AsyncStatus::Completed);
    assert_eq!(current, Ok(AsyncStatus::Completed));
    assert_eq!(value, Ok(ResultValue::I32(42)));

    // Released together with the job's reference
    assert!(wait_until(|| state.upgrade().is_none()));
}

#[test]
fn test_capability_routing() {
    let op = AsyncOperation::spawn(|_| Ok(ResultValue::Empty)).unwrap();
    op.wait().unwrap();

    let info = op.query::<AsyncInfo>().unwrap();
    let state = op.query::<ExecutionState>().unwrap();
    assert_eq!(info.iid(), iid::ASYNC_INFO);
    assert_eq!(state.iid(), iid::EXECUTION_STATE);

    // The info view and the operation share one state
    assert!(Arc::ptr_eq(&state, &info.query::<ExecutionState>().unwrap()));
    assert_eq!(info.status(), Ok(AsyncStatus::Completed));

    let base = op.clone().query_interface(iid::UNKNOWN).unwrap();
    assert_eq!(base.iid(), iid::ASYNC_OPERATION);

    let before = op.ref_count();
    assert_eq!(
        op.clone().query_interface(iid::COMPLETED_HANDLER).err(),
        Some(AsyncError::NotImplemented)
    );
    assert_eq!(op.ref_count(), before);
}

#[test]
fn test_snapshot_serializes() {
    let op = AsyncOperation::spawn(|_| Ok(ResultValue::U64(9))).unwrap();
    op.wait().unwrap();

    let snapshot = op.snapshot().unwrap();
    assert_eq!(snapshot.id, op.id());

    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["status"], "completed");
    assert_eq!(json["value_type"], "u64");
    assert_eq!(json["error_code"], serde_json::Value::Null);
}
