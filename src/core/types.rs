/*!
 * Core Types
 * Operation status and the tagged result value produced by work items
 */

use super::errors::AsyncError;
use crate::object::ObjectHandle;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Lifecycle of an async operation
///
/// Ordering is meaningful: every status greater than `Started` means the
/// work item is no longer pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum AsyncStatus {
    Started = 0,
    Completed = 1,
    Canceled = 2,
    Error = 3,
    Closed = 4,
}

impl AsyncStatus {
    /// Result fields are only meaningful in these statuses
    #[inline]
    pub const fn has_result(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    #[inline]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Started)
    }
}

impl fmt::Display for AsyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
            Self::Error => "error",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Type tag of a [`ResultValue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Empty,
    Char,
    String,
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    Object,
    ObjectArray,
}

/// Tagged union returned by a work item
///
/// Consumers switch on the variant (or on [`ResultValue::value_type`]) before
/// reading the payload. Object payloads are shared handles, so cloning a value
/// takes another reference on the objects it carries.
#[derive(Clone, Default)]
pub enum ResultValue {
    #[default]
    Empty,
    Char(char),
    String(String),
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    Object(ObjectHandle),
    ObjectArray(Vec<ObjectHandle>),
}

impl ResultValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Empty => ValueType::Empty,
            Self::Char(_) => ValueType::Char,
            Self::String(_) => ValueType::String,
            Self::Bool(_) => ValueType::Bool,
            Self::I8(_) => ValueType::I8,
            Self::U8(_) => ValueType::U8,
            Self::I16(_) => ValueType::I16,
            Self::U16(_) => ValueType::U16,
            Self::I32(_) => ValueType::I32,
            Self::U32(_) => ValueType::U32,
            Self::I64(_) => ValueType::I64,
            Self::U64(_) => ValueType::U64,
            Self::Object(_) => ValueType::Object,
            Self::ObjectArray(_) => ValueType::ObjectArray,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Widen any integer payload to `i128`
    pub fn as_integer(&self) -> Option<i128> {
        match *self {
            Self::I8(v) => Some(v as i128),
            Self::U8(v) => Some(v as i128),
            Self::I16(v) => Some(v as i128),
            Self::U16(v) => Some(v as i128),
            Self::I32(v) => Some(v as i128),
            Self::U32(v) => Some(v as i128),
            Self::I64(v) => Some(v as i128),
            Self::U64(v) => Some(v as i128),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectHandle> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }
}

impl fmt::Debug for ResultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Char(v) => f.debug_tuple("Char").field(v).finish(),
            Self::String(v) => f.debug_tuple("String").field(v).finish(),
            Self::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            Self::I8(v) => f.debug_tuple("I8").field(v).finish(),
            Self::U8(v) => f.debug_tuple("U8").field(v).finish(),
            Self::I16(v) => f.debug_tuple("I16").field(v).finish(),
            Self::U16(v) => f.debug_tuple("U16").field(v).finish(),
            Self::I32(v) => f.debug_tuple("I32").field(v).finish(),
            Self::U32(v) => f.debug_tuple("U32").field(v).finish(),
            Self::I64(v) => f.debug_tuple("I64").field(v).finish(),
            Self::U64(v) => f.debug_tuple("U64").field(v).finish(),
            Self::Object(obj) => f.debug_tuple("Object").field(&obj.iid()).finish(),
            Self::ObjectArray(objs) => f
                .debug_list()
                .entries(objs.iter().map(|obj| obj.iid()))
                .finish(),
        }
    }
}

impl PartialEq for ResultValue {
    /// Object payloads compare by identity
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Empty, Self::Empty) => true,
            (Self::Char(a), Self::Char(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::I8(a), Self::I8(b)) => a == b,
            (Self::U8(a), Self::U8(b)) => a == b,
            (Self::I16(a), Self::I16(b)) => a == b,
            (Self::U16(a), Self::U16(b)) => a == b,
            (Self::I32(a), Self::I32(b)) => a == b,
            (Self::U32(a), Self::U32(b)) => a == b,
            (Self::I64(a), Self::I64(b)) => a == b,
            (Self::U64(a), Self::U64(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            (Self::ObjectArray(a), Self::ObjectArray(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| Arc::ptr_eq(x, y))
            }
            _ => false,
        }
    }
}

macro_rules! scalar_conversions {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for ResultValue {
                #[inline]
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }

            impl TryFrom<ResultValue> for $ty {
                type Error = AsyncError;

                fn try_from(value: ResultValue) -> Result<Self, Self::Error> {
                    match value {
                        ResultValue::$variant(v) => Ok(v),
                        _ => Err(AsyncError::InvalidArgument),
                    }
                }
            }
        )*
    };
}

scalar_conversions! {
    char => Char,
    String => String,
    bool => Bool,
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    ObjectHandle => Object,
    Vec<ObjectHandle> => ObjectArray,
}

impl From<&str> for ResultValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<()> for ResultValue {
    fn from(_: ()) -> Self {
        Self::Empty
    }
}
