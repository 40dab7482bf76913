//! Memo keys.
//!
//! A memo key is the list of value snapshots taken from a computed node's
//! recorded dependencies. Two keys are equal when every snapshot compares
//! equal by value, which lets a computed node skip a recomputation whose
//! inputs did not actually change.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use super::source::Source;

trait DynEq: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn dyn_eq(&self, other: &dyn DynEq) -> bool;
}

impl<T> DynEq for T
where
    T: PartialEq + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn DynEq) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }
}

/// A type-erased copy of a dependency's value.
#[derive(Clone)]
pub struct Snapshot(Arc<dyn DynEq>);

impl Snapshot {
    /// Capture `value`.
    pub fn new<T>(value: T) -> Self
    where
        T: PartialEq + Send + Sync + 'static,
    {
        Self(Arc::new(value))
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.0.dyn_eq(other.0.as_ref())
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Snapshot(..)")
    }
}

/// Snapshots of every dependency, in recording order.
///
/// A dependency that cannot produce a snapshot (for example an upstream
/// computed node that currently fails) is recorded as `None`, which never
/// matches a previous key.
#[derive(Debug, Clone)]
pub(crate) struct MemoKey(SmallVec<[Option<Snapshot>; 4]>);

impl MemoKey {
    pub(crate) fn capture<'a, I>(sources: I) -> Self
    where
        I: IntoIterator<Item = &'a Arc<dyn Source>>,
    {
        Self(sources.into_iter().map(|source| source.snapshot()).collect())
    }
}

impl PartialEq for MemoKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(other.0.iter())
                .all(|(a, b)| matches!((a, b), (Some(a), Some(b)) if a == b))
    }
}
