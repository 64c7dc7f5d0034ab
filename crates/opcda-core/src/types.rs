// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Core data model for OPC DA items.
//!
//! This module defines the value types exchanged between the access engine
//! and the remote server:
//!
//! - [`ItemId`]: the server-side name of a process variable
//! - [`ClientHandle`] / [`ServerHandle`]: correlation identifiers
//! - [`Variant`]: the tagged value carried by an item
//! - [`Quality`]: the OPC DA quality word
//! - [`ErrorCode`]: the per-item HRESULT
//! - [`ItemState`]: one observed (error, value, timestamp, quality) tuple

use std::borrow::Borrow;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ItemId
// =============================================================================

/// Identifier of a process variable on the remote server.
///
/// Unique within one group/connection and stable for the lifetime of a
/// subscription declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Creates a new item identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the identifier is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ItemId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for ItemId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ItemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Handles
// =============================================================================

/// Client-assigned handle used to correlate asynchronous results with items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientHandle(pub u32);

impl ClientHandle {
    /// Returns the raw handle value.
    #[inline]
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch-{}", self.0)
    }
}

/// Server-assigned opaque item handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServerHandle(pub u32);

impl ServerHandle {
    /// Returns the raw handle value.
    #[inline]
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ServerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sh-{}", self.0)
    }
}

// =============================================================================
// ErrorCode
// =============================================================================

/// Per-item result code (an HRESULT).
///
/// Negative values are failures. Positive values other than zero are
/// success codes carrying extra information (e.g. `S_FALSE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    /// Operation succeeded.
    pub const S_OK: Self = Self(0);
    /// Operation succeeded with a qualification.
    pub const S_FALSE: Self = Self(1);
    /// Unspecified failure.
    pub const E_FAIL: Self = Self(0x8000_4005_u32 as i32);
    /// Out of memory.
    pub const E_OUTOFMEMORY: Self = Self(0x8007_000E_u32 as i32);
    /// Invalid argument.
    pub const E_INVALIDARG: Self = Self(0x8007_0057_u32 as i32);
    /// The handle is not valid.
    pub const OPC_E_INVALIDHANDLE: Self = Self(0xC004_0001_u32 as i32);
    /// The server cannot convert between the requested and canonical type.
    pub const OPC_E_BADTYPE: Self = Self(0xC004_0004_u32 as i32);
    /// The item's access rights do not allow the operation.
    pub const OPC_E_BADRIGHTS: Self = Self(0xC004_0006_u32 as i32);
    /// The item id is not defined in the server address space.
    pub const OPC_E_UNKNOWNITEMID: Self = Self(0xC004_0007_u32 as i32);
    /// The item id does not conform to the server's syntax.
    pub const OPC_E_INVALIDITEMID: Self = Self(0xC004_0008_u32 as i32);
    /// The value was out of range.
    pub const OPC_E_RANGE: Self = Self(0xC004_000B_u32 as i32);

    /// Returns `true` for success codes.
    #[inline]
    pub const fn is_success(&self) -> bool {
        self.0 >= 0
    }

    /// Returns `true` for failure codes.
    #[inline]
    pub const fn is_failure(&self) -> bool {
        self.0 < 0
    }

    /// Returns the raw code as an unsigned value.
    #[inline]
    pub const fn as_u32(&self) -> u32 {
        self.0 as u32
    }

    /// Returns the symbolic name of well-known codes.
    pub fn name(&self) -> &'static str {
        match *self {
            Self::S_OK => "S_OK",
            Self::S_FALSE => "S_FALSE",
            Self::E_FAIL => "E_FAIL",
            Self::E_OUTOFMEMORY => "E_OUTOFMEMORY",
            Self::E_INVALIDARG => "E_INVALIDARG",
            Self::OPC_E_INVALIDHANDLE => "OPC_E_INVALIDHANDLE",
            Self::OPC_E_BADTYPE => "OPC_E_BADTYPE",
            Self::OPC_E_BADRIGHTS => "OPC_E_BADRIGHTS",
            Self::OPC_E_UNKNOWNITEMID => "OPC_E_UNKNOWNITEMID",
            Self::OPC_E_INVALIDITEMID => "OPC_E_INVALIDITEMID",
            Self::OPC_E_RANGE => "OPC_E_RANGE",
            _ if self.is_success() => "Success",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X} ({})", self.as_u32(), self.name())
    }
}

impl From<i32> for ErrorCode {
    fn from(code: i32) -> Self {
        Self(code)
    }
}

// =============================================================================
// Quality
// =============================================================================

/// Coarse status of a quality word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityStatus {
    /// The value is trustworthy.
    Good,
    /// The value may be usable.
    Uncertain,
    /// The value should not be used.
    Bad,
}

impl fmt::Display for QualityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Good => write!(f, "Good"),
            Self::Uncertain => write!(f, "Uncertain"),
            Self::Bad => write!(f, "Bad"),
        }
    }
}

/// OPC DA quality word.
///
/// Layout: `QQSSSSLL` in the low byte, where `QQ` is the status,
/// `SSSS` the substatus and `LL` the limit bits. The high byte is
/// vendor specific and carried through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quality(pub u16);

impl Quality {
    /// Status mask.
    pub const STATUS_MASK: u16 = 0x00C0;
    /// Limit mask.
    pub const LIMIT_MASK: u16 = 0x0003;

    /// Non-specific good quality.
    pub const GOOD: Self = Self(0x00C0);
    /// Value overridden locally.
    pub const GOOD_LOCAL_OVERRIDE: Self = Self(0x00D8);
    /// Non-specific uncertain quality.
    pub const UNCERTAIN: Self = Self(0x0040);
    /// Communication lost, last usable value returned.
    pub const UNCERTAIN_LAST_USABLE: Self = Self(0x0044);
    /// Sensor outside its limits or out of calibration.
    pub const UNCERTAIN_SENSOR_NOT_ACCURATE: Self = Self(0x0050);
    /// Non-specific bad quality.
    pub const BAD: Self = Self(0x0000);
    /// Server-side configuration problem.
    pub const BAD_CONFIG_ERROR: Self = Self(0x0004);
    /// Input not logically connected.
    pub const BAD_NOT_CONNECTED: Self = Self(0x0008);
    /// Device failure detected.
    pub const BAD_DEVICE_FAILURE: Self = Self(0x000C);
    /// Sensor failure detected.
    pub const BAD_SENSOR_FAILURE: Self = Self(0x0010);
    /// Communication failed, last known value available.
    pub const BAD_LAST_KNOWN_VALUE: Self = Self(0x0014);
    /// Communication failed, no last known value.
    pub const BAD_COMM_FAILURE: Self = Self(0x0018);
    /// Block is off scan or locked.
    pub const BAD_OUT_OF_SERVICE: Self = Self(0x001C);

    /// Returns the coarse status.
    pub fn status(&self) -> QualityStatus {
        match self.0 & Self::STATUS_MASK {
            0x00C0 => QualityStatus::Good,
            0x0040 => QualityStatus::Uncertain,
            _ => QualityStatus::Bad,
        }
    }

    /// Returns the limit bits (0 = not limited, 1 = low, 2 = high, 3 = constant).
    #[inline]
    pub fn limit(&self) -> u16 {
        self.0 & Self::LIMIT_MASK
    }

    /// Returns `true` if the quality is good.
    #[inline]
    pub fn is_good(&self) -> bool {
        self.status() == QualityStatus::Good
    }

    /// Returns `true` if the quality is uncertain.
    #[inline]
    pub fn is_uncertain(&self) -> bool {
        self.status() == QualityStatus::Uncertain
    }

    /// Returns `true` if the quality is bad.
    #[inline]
    pub fn is_bad(&self) -> bool {
        self.status() == QualityStatus::Bad
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self::BAD
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:04X})", self.status(), self.0)
    }
}

// =============================================================================
// Variant
// =============================================================================

/// Value carried by an item.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Variant {
    /// No value.
    #[default]
    Empty,

    /// Explicit null.
    Null,

    /// Boolean value.
    Boolean(bool),

    /// Signed byte.
    SByte(i8),

    /// Unsigned byte.
    Byte(u8),

    /// 16-bit signed integer.
    Int16(i16),

    /// 16-bit unsigned integer.
    UInt16(u16),

    /// 32-bit signed integer.
    Int32(i32),

    /// 32-bit unsigned integer.
    UInt32(u32),

    /// 64-bit signed integer.
    Int64(i64),

    /// 64-bit unsigned integer.
    UInt64(u64),

    /// 32-bit float.
    Float(f32),

    /// 64-bit double.
    Double(f64),

    /// Fixed-point currency scaled by 10 000.
    Currency(i64),

    /// Date/time value.
    Date(DateTime<Utc>),

    /// String value.
    String(String),

    /// Array of values.
    Array(Vec<Variant>),
}

impl Variant {
    /// Returns the name of the carried type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Empty => "Empty",
            Self::Null => "Null",
            Self::Boolean(_) => "Boolean",
            Self::SByte(_) => "SByte",
            Self::Byte(_) => "Byte",
            Self::Int16(_) => "Int16",
            Self::UInt16(_) => "UInt16",
            Self::Int32(_) => "Int32",
            Self::UInt32(_) => "UInt32",
            Self::Int64(_) => "Int64",
            Self::UInt64(_) => "UInt64",
            Self::Float(_) => "Float",
            Self::Double(_) => "Double",
            Self::Currency(_) => "Currency",
            Self::Date(_) => "Date",
            Self::String(_) => "String",
            Self::Array(_) => "Array",
        }
    }

    /// Returns `true` for `Empty` and `Null`.
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty | Self::Null)
    }

    /// Returns `true` if this is an array.
    #[inline]
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// Attempts to get the value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            other => other.as_i64().map(|v| v != 0),
        }
    }

    /// Attempts to get the value as an i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Boolean(v) => Some(i64::from(*v)),
            Self::SByte(v) => Some(i64::from(*v)),
            Self::Byte(v) => Some(i64::from(*v)),
            Self::Int16(v) => Some(i64::from(*v)),
            Self::UInt16(v) => Some(i64::from(*v)),
            Self::Int32(v) => Some(i64::from(*v)),
            Self::UInt32(v) => Some(i64::from(*v)),
            Self::Int64(v) => Some(*v),
            Self::UInt64(v) => i64::try_from(*v).ok(),
            Self::Float(v) => Some(*v as i64),
            Self::Double(v) => Some(*v as i64),
            Self::Currency(v) => Some(*v / 10_000),
            _ => None,
        }
    }

    /// Attempts to get the value as an f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(f64::from(*v)),
            Self::Double(v) => Some(*v),
            Self::Currency(v) => Some(*v as f64 / 10_000.0),
            Self::UInt64(v) => Some(*v as f64),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// Attempts to get the value as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "<empty>"),
            Self::Null => write!(f, "null"),
            Self::Boolean(v) => write!(f, "{}", v),
            Self::SByte(v) => write!(f, "{}", v),
            Self::Byte(v) => write!(f, "{}", v),
            Self::Int16(v) => write!(f, "{}", v),
            Self::UInt16(v) => write!(f, "{}", v),
            Self::Int32(v) => write!(f, "{}", v),
            Self::UInt32(v) => write!(f, "{}", v),
            Self::Int64(v) => write!(f, "{}", v),
            Self::UInt64(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::Currency(v) => {
                let sign = if *v < 0 { "-" } else { "" };
                let abs = v.unsigned_abs();
                write!(f, "{}{}.{:04}", sign, abs / 10_000, abs % 10_000)
            }
            Self::Date(v) => write!(f, "{}", v.to_rfc3339()),
            Self::String(v) => write!(f, "{}", v),
            Self::Array(v) => write!(f, "[{} items]", v.len()),
        }
    }
}

macro_rules! variant_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Variant {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

variant_from! {
    bool => Boolean,
    i8 => SByte,
    u8 => Byte,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float,
    f64 => Double,
    String => String,
    DateTime<Utc> => Date,
}

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl<T: Into<Variant>> From<Vec<T>> for Variant {
    fn from(values: Vec<T>) -> Self {
        Self::Array(values.into_iter().map(Into::into).collect())
    }
}

// =============================================================================
// DataSource
// =============================================================================

/// Where a read or refresh should be satisfied from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// The server's cache (updated at the group rate).
    #[default]
    Cache,
    /// The underlying device (bypasses the cache).
    Device,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => write!(f, "cache"),
            Self::Device => write!(f, "device"),
        }
    }
}

// =============================================================================
// ItemState
// =============================================================================

/// One observed state of an item.
///
/// Equality is structural over all four fields; the access engine relies on
/// it for change detection. States are replaced wholesale on every update.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ItemState {
    /// Per-item result code.
    pub error_code: ErrorCode,

    /// The value.
    pub value: Variant,

    /// Timestamp reported for the value.
    pub timestamp: Option<DateTime<Utc>>,

    /// Quality word.
    pub quality: Quality,
}

impl ItemState {
    /// Creates a state from all of its parts.
    pub fn new(
        error_code: ErrorCode,
        value: Variant,
        timestamp: Option<DateTime<Utc>>,
        quality: Quality,
    ) -> Self {
        Self {
            error_code,
            value,
            timestamp,
            quality,
        }
    }

    /// Creates a successful good-quality state.
    pub fn good(value: impl Into<Variant>, timestamp: DateTime<Utc>) -> Self {
        Self::new(ErrorCode::S_OK, value.into(), Some(timestamp), Quality::GOOD)
    }

    /// Creates a state describing a per-item failure.
    pub fn failed(error_code: ErrorCode) -> Self {
        Self::new(error_code, Variant::Empty, None, Quality::BAD)
    }

    /// Returns `true` if the item itself reported an error.
    #[inline]
    pub fn is_error(&self) -> bool {
        self.error_code.is_failure()
    }

    /// Returns `true` if the state carries a usable value.
    #[inline]
    pub fn is_good(&self) -> bool {
        !self.is_error() && self.quality.is_good()
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.value, self.quality)?;
        if let Some(ts) = self.timestamp {
            write!(f, " @ {}", ts.to_rfc3339())?;
        }
        if self.is_error() {
            write!(f, " error {}", self.error_code)?;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
