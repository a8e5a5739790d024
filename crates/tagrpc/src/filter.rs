//! # Filter Chain
//!
//! Byte-level transforms applied to whole messages (compression, encryption,
//! logging). Outgoing bytes pass through the filters in insertion order;
//! incoming bytes pass through them in reverse, so a filter's `input` undoes
//! its own `output` regardless of where it sits in the chain.

use std::sync::Arc;

/// A message transform. `C` is the context the owner passes along: the
/// per-request value on a service, [`CallContext`](crate::CallContext) on a client.
pub trait Filter<C>: Send + Sync {
    /// Transforms bytes that just arrived.
    fn input(&self, data: Vec<u8>, ctx: &C) -> Vec<u8> {
        let _ = ctx;
        data
    }

    /// Transforms bytes about to be sent.
    fn output(&self, data: Vec<u8>, ctx: &C) -> Vec<u8> {
        let _ = ctx;
        data
    }
}

/// An ordered list of filters.
pub struct FilterChain<C> {
    filters: Vec<Arc<dyn Filter<C>>>,
}

impl<C> Default for FilterChain<C> {
    fn default() -> Self {
        Self { filters: Vec::new() }
    }
}

impl<C> Clone for FilterChain<C> {
    fn clone(&self) -> Self {
        Self { filters: self.filters.clone() }
    }
}

impl<C> FilterChain<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, filter: Arc<dyn Filter<C>>) {
        self.filters.push(filter);
    }

    /// Removes the first occurrence of `filter`, compared by identity.
    pub fn remove(&mut self, filter: &Arc<dyn Filter<C>>) -> bool {
        match self.filters.iter().position(|f| Arc::ptr_eq(f, filter)) {
            Some(index) => {
                self.filters.remove(index);
                true
            }
            None => false,
        }
    }

    /// Replaces the whole chain with `filter`, or empties it.
    pub fn set(&mut self, filter: Option<Arc<dyn Filter<C>>>) {
        self.filters.clear();
        self.filters.extend(filter);
    }

    /// The first filter in the chain.
    pub fn first(&self) -> Option<Arc<dyn Filter<C>>> {
        self.filters.first().cloned()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn input(&self, data: Vec<u8>, ctx: &C) -> Vec<u8> {
        self.filters.iter().rev().fold(data, |data, f| f.input(data, ctx))
    }

    pub fn output(&self, data: Vec<u8>, ctx: &C) -> Vec<u8> {
        self.filters.iter().fold(data, |data, f| f.output(data, ctx))
    }
}
