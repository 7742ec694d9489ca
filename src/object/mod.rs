/*!
 * Object Model
 *
 * Capability-queryable, reference-counted objects.
 *
 * ## Design
 *
 * Every runtime object is shared through an `Arc`, so AddRef is `Arc::clone`
 * and Release is `drop`; an object is destroyed exactly when the last handle
 * goes away and its owned sub-objects are released with it.
 *
 * Capabilities are identified by 128-bit [`CapabilityId`]s. An object answers
 * the base id and its own declared id with itself, and may route other ids to
 * sub-objects it owns. Typed queries go through [`InterfaceObjectExt::query`],
 * which resolves the id from [`Interface::IID`] and downcasts the answer, so
 * callers never cast an untyped pointer.
 *
 * ## Example
 *
 * ```ignore
 * let info: Arc<AsyncInfo> = operation.query::<AsyncInfo>()?;
 * ```
 */

use crate::core::errors::{AsyncError, AsyncResult};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

/// Shared handle to any runtime object
pub type ObjectHandle = Arc<dyn InterfaceObject>;

/// Opaque 128-bit capability identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct CapabilityId(Uuid);

impl CapabilityId {
    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CapabilityId({})", self.0)
    }
}

/// Well-known capability ids
pub mod iid {
    use super::CapabilityId;

    /// Base capability every object answers
    pub const UNKNOWN: CapabilityId = CapabilityId::from_u128(0x00000000_0000_0000_c000_000000000046);
    pub const ASYNC_INFO: CapabilityId =
        CapabilityId::from_u128(0x00000036_0000_0000_c000_000000000046);
    pub const EXECUTION_STATE: CapabilityId =
        CapabilityId::from_u128(0xd81ab70d_82e0_481c_983d_401225d98a2c);
    pub const ASYNC_OPERATION: CapabilityId =
        CapabilityId::from_u128(0x9fc2b0bb_e446_44e2_aa61_b09cab636af2);
    pub const COMPLETED_HANDLER: CapabilityId =
        CapabilityId::from_u128(0xfcdcf02c_e5d8_4478_915a_4d90b74b83a5);
}

/// Upcast helper so trait objects can be downcast to their concrete type
pub trait AsAny: Any + Send + Sync {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Base object capability
///
/// Implementations must be safe to query and clone from any thread without
/// external locking.
pub trait InterfaceObject: AsAny {
    /// The capability this object declares itself as
    fn iid(&self) -> CapabilityId;

    /// Obtain another view of the same underlying object
    ///
    /// On success the returned handle is a new reference. On failure the
    /// consumed `self` handle is dropped, leaving every count unchanged.
    ///
    /// # Errors
    ///
    /// - `NotImplemented` if the capability is absent
    /// - `NotInitialized` if the sub-object backing it is not attached yet
    fn query_interface(self: Arc<Self>, iid: CapabilityId) -> AsyncResult<ObjectHandle>;
}

/// Concrete types reachable through a typed query
pub trait Interface: InterfaceObject + Sized {
    const IID: CapabilityId;
}

/// Handle-level operations for any `Arc<impl InterfaceObject>`
pub trait InterfaceObjectExt {
    /// Typed capability query
    fn query<I: Interface>(&self) -> AsyncResult<Arc<I>>;

    /// Take another reference (AddRef)
    fn add_ref(&self) -> Self;

    /// Current number of strong references
    fn ref_count(&self) -> usize;
}

impl<T: InterfaceObject + ?Sized> InterfaceObjectExt for Arc<T> {
    fn query<I: Interface>(&self) -> AsyncResult<Arc<I>> {
        let handle = Arc::clone(self).query_interface(I::IID)?;
        handle
            .into_any()
            .downcast::<I>()
            .map_err(|_| AsyncError::NotImplemented)
    }

    #[inline]
    fn add_ref(&self) -> Self {
        Arc::clone(self)
    }

    #[inline]
    fn ref_count(&self) -> usize {
        Arc::strong_count(self)
    }
}

/// Answer the base id and `own` with `this`; `None` for anything else
pub fn query_self<T: InterfaceObject>(this: &Arc<T>, iid: CapabilityId, own: CapabilityId) -> Option<ObjectHandle> {
    if iid == iid::UNKNOWN || iid == own {
        let handle: ObjectHandle = this.clone();
        Some(handle)
    } else {
        None
    }
}

/// Log and build the `NotImplemented` failure for an unanswered query
pub fn not_implemented(object: CapabilityId, requested: CapabilityId) -> AsyncError {
    error!(object = %object, requested = %requested, "capability is not implemented");
    AsyncError::NotImplemented
}
