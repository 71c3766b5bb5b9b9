//! Errors reported by the pool.

use core::fmt;

/// A null [`Handle`](crate::Handle) was dereferenced.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NullHandle;

impl fmt::Display for NullHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dereferenced a null pool handle")
    }
}

impl std::error::Error for NullHandle {}

/// Errors returned by this library.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PoolError {
    /// A null handle was dereferenced.
    NullHandle,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::NullHandle => fmt::Display::fmt(&NullHandle, f),
        }
    }
}

impl std::error::Error for PoolError {}

impl From<NullHandle> for PoolError {
    fn from(_: NullHandle) -> Self {
        PoolError::NullHandle
    }
}
