//! Explicit result type for operations that degrade instead of failing.
//!
//! Loading configuration, persisting a case and normalizing a polygon set
//! all have a "worked, but not the way you asked" path. `Outcome` names
//! that path so callers and tests can tell it apart from plain success.

use serde::Serialize;

/// Why a fallback value was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FallbackReason {
    /// Configuration file did not exist; defaults were used (and written).
    ConfigMissing,
    /// Configuration file existed but did not parse.
    ConfigMalformed(String),
    /// The case store could not be reached; the record is held in memory.
    StorageUnavailable(String),
    /// Polygon set declared no datum; geographic WGS84 was assumed.
    DatumAssumed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome<T> {
    Success { value: T },
    RecoverableDefault { value: T, reason: FallbackReason },
    Failure { reason: String },
}

impl<T> Outcome<T> {
    pub fn success(value: T) -> Self {
        Self::Success { value }
    }

    pub fn fallback(value: T, reason: FallbackReason) -> Self {
        Self::RecoverableDefault { value, reason }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn fallback_reason(&self) -> Option<&FallbackReason> {
        match self {
            Self::RecoverableDefault { reason, .. } => Some(reason),
            _ => None,
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Success { value } | Self::RecoverableDefault { value, .. } => Some(value),
            Self::Failure { .. } => None,
        }
    }

    /// Drop the distinction between success and fallback.
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Success { value } | Self::RecoverableDefault { value, .. } => Some(value),
            Self::Failure { .. } => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Success { value } => Outcome::Success { value: f(value) },
            Self::RecoverableDefault { value, reason } => Outcome::RecoverableDefault {
                value: f(value),
                reason,
            },
            Self::Failure { reason } => Outcome::Failure { reason },
        }
    }
}
