use std::marker::PhantomData;
use strata_core::EventTimed;

use crate::merge::Collect;

/// Folds a burst of inbound items into one downstream write
///
/// The drain loop calls `init` once per cycle, `merge` for every item drained
/// in that cycle, then `finalize`. `None` from `finalize` means the cycle
/// produced nothing worth writing.
pub trait Conflator<TIn>: Send + 'static {
    type Agg: Send;
    type Out: Send + 'static;

    fn init(&self) -> Self::Agg;

    fn merge(&self, agg: Self::Agg, item: TIn) -> Self::Agg;

    fn finalize(&self, agg: Self::Agg) -> Option<Self::Out>;
}

/// Keep the item with the greatest event time; ties go to the later arrival
pub struct LatestByEventTime<T>(PhantomData<fn() -> T>);

impl<T> LatestByEventTime<T> {
    pub fn new() -> Self {
        LatestByEventTime(PhantomData)
    }
}

impl<T> Default for LatestByEventTime<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: EventTimed + Send + 'static> Conflator<T> for LatestByEventTime<T> {
    type Agg = Option<T>;
    type Out = T;

    fn init(&self) -> Option<T> {
        None
    }

    fn merge(&self, agg: Option<T>, item: T) -> Option<T> {
        match agg {
            Some(held) if held.event_time() > item.event_time() => Some(held),
            _ => Some(item),
        }
    }

    fn finalize(&self, agg: Option<T>) -> Option<T> {
        agg
    }
}

/// Upsert every item into a fresh keyed collection per cycle
pub struct UpsertInto<S>(PhantomData<fn() -> S>);

impl<S> UpsertInto<S> {
    pub fn new() -> Self {
        UpsertInto(PhantomData)
    }
}

impl<S> Default for UpsertInto<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Item, S> Conflator<Item> for UpsertInto<S>
where
    S: Collect<Item>,
{
    type Agg = S;
    type Out = S;

    fn init(&self) -> S {
        S::default()
    }

    fn merge(&self, mut agg: S, item: Item) -> S {
        agg.upsert(item);
        agg
    }

    fn finalize(&self, agg: S) -> Option<S> {
        if agg.is_empty() { None } else { Some(agg) }
    }
}

/// Conflator assembled from closures
pub struct FnConflator<I, M, F> {
    init: I,
    merge: M,
    finalize: F,
}

impl<I, M, F> FnConflator<I, M, F> {
    pub fn new(init: I, merge: M, finalize: F) -> Self {
        Self {
            init,
            merge,
            finalize,
        }
    }
}

impl<TIn, A, O, I, M, F> Conflator<TIn> for FnConflator<I, M, F>
where
    A: Send,
    O: Send + 'static,
    I: Fn() -> A + Send + 'static,
    M: Fn(A, TIn) -> A + Send + 'static,
    F: Fn(A) -> Option<O> + Send + 'static,
{
    type Agg = A;
    type Out = O;

    fn init(&self) -> A {
        (self.init)()
    }

    fn merge(&self, agg: A, item: TIn) -> A {
        (self.merge)(agg, item)
    }

    fn finalize(&self, agg: A) -> Option<O> {
        (self.finalize)(agg)
    }
}
