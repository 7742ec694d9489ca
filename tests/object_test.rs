/*!
 * Object Model Tests
 * Reference counting and capability queries
 */

use proptest::prelude::*;
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracerayer::{
    iid, init_tracing, AsyncError, AsyncResult, CapabilityId, Interface, InterfaceObject,
    InterfaceObjectExt, ObjectHandle,
};

const IID_COUNTED: CapabilityId = CapabilityId::from_u128(0xc0de_0000_0000_0000_0000_0000_0000_0001);

struct Counted {
    drops: Arc<AtomicUsize>,
}

impl Drop for Counted {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

impl InterfaceObject for Counted {
    fn iid(&self) -> CapabilityId {
        IID_COUNTED
    }

    fn query_interface(self: Arc<Self>, requested: CapabilityId) -> AsyncResult<ObjectHandle> {
        if requested == iid::UNKNOWN || requested == IID_COUNTED {
            Ok(self)
        } else {
            Err(AsyncError::NotImplemented)
        }
    }
}

impl Interface for Counted {
    const IID: CapabilityId = IID_COUNTED;
}

#[derive(Debug, Clone, Copy)]
enum RefOp {
    AddRef,
    Release,
    Query,
    QueryMissing,
}

fn ref_op() -> impl Strategy<Value = RefOp> {
    prop_oneof![
        Just(RefOp::AddRef),
        Just(RefOp::Release),
        Just(RefOp::Query),
        Just(RefOp::QueryMissing),
    ]
}

proptest! {
    #[test]
    fn prop_refcount_tracks_live_handles(ops in prop::collection::vec(ref_op(), 0..64)) {
        let drops = Arc::new(AtomicUsize::new(0));
        let root = Arc::new(Counted { drops: drops.clone() });
        let mut handles: Vec<ObjectHandle> = Vec::new();

        for op in ops {
            match op {
                RefOp::AddRef => handles.push(root.add_ref()),
                RefOp::Release => {
                    handles.pop();
                }
                RefOp::Query => handles.push(root.clone().query_interface(iid::UNKNOWN).unwrap()),
                RefOp::QueryMissing => {
                    let before = root.ref_count();
                    prop_assert_eq!(
                        root.clone().query_interface(iid::ASYNC_INFO).err(),
                        Some(AsyncError::NotImplemented)
                    );
                    prop_assert_eq!(root.ref_count(), before);
                }
            }
            prop_assert_eq!(root.ref_count(), handles.len() + 1);
            prop_assert_eq!(drops.load(Ordering::SeqCst), 0);
        }

        drop(handles);
        drop(root);
        prop_assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}

#[test]
fn test_typed_query_returns_same_object() {
    let drops = Arc::new(AtomicUsize::new(0));
    let object = Arc::new(Counted { drops: drops.clone() });
    let handle: ObjectHandle = object.clone();

    let typed = handle.query::<Counted>().unwrap();
    assert!(Arc::ptr_eq(&object, &typed));
    assert_eq!(handle.iid(), IID_COUNTED);

    drop((object, handle, typed));
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_well_known_ids() {
    assert_eq!(
        iid::ASYNC_INFO.to_string(),
        "00000036-0000-0000-c000-000000000046"
    );
    assert_eq!(
        iid::EXECUTION_STATE.to_string(),
        "d81ab70d-82e0-481c-983d-401225d98a2c"
    );
    assert_eq!(
        iid::ASYNC_OPERATION.to_string(),
        "9fc2b0bb-e446-44e2-aa61-b09cab636af2"
    );
    assert_eq!(
        iid::COMPLETED_HANDLER.to_string(),
        "fcdcf02c-e5d8-4478-915a-4d90b74b83a5"
    );
    let json = serde_json::to_string(&iid::UNKNOWN).unwrap();
    assert_eq!(json, "\"00000000-0000-0000-c000-000000000046\"");
}

#[test]
#[serial]
fn test_init_tracing_only_installs_once() {
    let _ = init_tracing();
    assert!(!init_tracing());
}
