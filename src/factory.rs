//! Construction hooks for pool payloads.
//!
//! A map-like pool builds its payload from the arguments passed to
//! [`FlatPool::acquire_with`](crate::FlatPool::acquire_with), and only when the
//! key is actually inserted. The factory is a type parameter of the pool, so
//! a pool can route construction through something other than `From`, for
//! example allocating the shared payload in one step.

use std::sync::Arc;

/// Builds a `V` from an argument bundle `Args`.
pub trait ValueFactory<V, Args> {
    fn make(args: Args) -> V;
}

/// Default factory: `V::from(args)`.
#[derive(Copy, Clone, Debug, Default)]
pub struct FromArgs;

impl<V, Args> ValueFactory<V, Args> for FromArgs
where
    V: From<Args>,
{
    #[inline]
    fn make(args: Args) -> V {
        V::from(args)
    }
}

/// Builds `Arc<T>` payloads, constructing `T` from the arguments in place.
#[derive(Copy, Clone, Debug, Default)]
pub struct Shared;

impl<T, Args> ValueFactory<Arc<T>, Args> for Shared
where
    T: From<Args>,
{
    #[inline]
    fn make(args: Args) -> Arc<T> {
        Arc::new(T::from(args))
    }
}

/// Builds `Box<T>` payloads from `T: From<Args>`.
#[derive(Copy, Clone, Debug, Default)]
pub struct Boxed;

impl<T, Args> ValueFactory<Box<T>, Args> for Boxed
where
    T: From<Args>,
{
    #[inline]
    fn make(args: Args) -> Box<T> {
        Box::new(T::from(args))
    }
}
