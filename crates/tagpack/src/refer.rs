//! # Reference Tracker
//!
//! Message-scoped tables that let a value be written once and referenced by
//! index afterwards.
//!
//! Both sides register a value when its encoding *starts*, before any child is
//! visited, so a container can reference itself. Writer and reader must call
//! `set` for exactly the same values in exactly the same order.
//!
//! The untracked implementations are for envelopes, where sharing cannot occur.

use std::collections::HashMap;
use std::hash::Hash;
use std::hash::Hasher;

use uuid::Uuid;

use crate::error::Error;
use crate::error::Result;
use crate::tags::Tag;
use crate::value::Value;

/// A container recognized by address. Holds the handle so the address stays
/// unique while the table is alive.
#[derive(Clone)]
pub struct Identity {
    addr: usize,
    _anchor: Value,
}

impl Identity {
    pub fn of(value: &Value) -> Option<Self> {
        let addr = match value {
            Value::List(l) => l.addr(),
            Value::Map(m) => m.addr(),
            Value::Object(o) => o.addr(),
            _ => return None,
        };
        Some(Self { addr, _anchor: value.clone() })
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Identity) -> bool {
        self.addr == other.addr
    }
}

impl Eq for Identity {}

impl Hash for Identity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr.hash(state);
    }
}

/// How the writer recognizes a value it has already emitted.
///
/// Containers match by identity. Strings, blobs, GUIDs and dates match by content.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum RefKey {
    Identity(Identity),
    String(String),
    Bytes(Vec<u8>),
    Guid(Uuid),
    /// The encoded form of a date or time, terminator included.
    Date(Vec<u8>),
}

/// Write side of the reference table.
pub trait WriteRefs: Send {
    /// Registers the next index under `key`.
    fn set(&mut self, key: RefKey);
    /// Consumes the next index for a value that can never be referenced again.
    fn skip(&mut self);
    /// The index a previously registered value was given.
    fn index_of(&self, key: &RefKey) -> Option<usize>;
    fn reset(&mut self);
}

/// Read side of the reference table.
pub trait ReadRefs: Send {
    fn set(&mut self, value: Value);
    fn read(&self, index: usize) -> Result<Value>;
    fn reset(&mut self);
}

/// Never reports a value as seen.
pub struct UntrackedWrites;

impl WriteRefs for UntrackedWrites {
    fn set(&mut self, _key: RefKey) {}
    fn skip(&mut self) {}
    fn index_of(&self, _key: &RefKey) -> Option<usize> { None }
    fn reset(&mut self) {}
}

#[derive(Default)]
pub struct TrackedWrites {
    refs: HashMap<RefKey, usize>,
    count: usize,
}

impl WriteRefs for TrackedWrites {
    fn set(&mut self, key: RefKey) {
        self.refs.insert(key, self.count);
        self.count += 1;
    }

    fn skip(&mut self) {
        self.count += 1;
    }

    fn index_of(&self, key: &RefKey) -> Option<usize> {
        self.refs.get(key).copied()
    }

    fn reset(&mut self) {
        self.refs.clear();
        self.count = 0;
    }
}

/// Rejects every reference; an `r` tag in simple mode is malformed input.
pub struct UntrackedReads;

impl ReadRefs for UntrackedReads {
    fn set(&mut self, _value: Value) {}

    fn read(&self, _index: usize) -> Result<Value> {
        Err(Error::unexpected(Tag::Ref.byte()))
    }

    fn reset(&mut self) {}
}

#[derive(Default)]
pub struct TrackedReads {
    refs: Vec<Value>,
}

impl ReadRefs for TrackedReads {
    fn set(&mut self, value: Value) {
        self.refs.push(value);
    }

    fn read(&self, index: usize) -> Result<Value> {
        self.refs.get(index).cloned().ok_or(Error::BadReference(index))
    }

    fn reset(&mut self) {
        self.refs.clear();
    }
}

pub fn write_refs(simple: bool) -> Box<dyn WriteRefs> {
    if simple { Box::new(UntrackedWrites) } else { Box::new(TrackedWrites::default()) }
}

pub fn read_refs(simple: bool) -> Box<dyn ReadRefs> {
    if simple { Box::new(UntrackedReads) } else { Box::new(TrackedReads::default()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::List;

    #[test]
    fn tracked_writes_count_skips() {
        let mut refs = TrackedWrites::default();
        refs.set(RefKey::String("a".into()));
        refs.skip();
        refs.set(RefKey::String("b".into()));
        assert_eq!(refs.index_of(&RefKey::String("a".into())), Some(0));
        assert_eq!(refs.index_of(&RefKey::String("b".into())), Some(2));
        refs.reset();
        assert_eq!(refs.index_of(&RefKey::String("a".into())), None);
    }

    #[test]
    fn identity_distinguishes_equal_lists() {
        let a = Value::List(List::from_vec(vec![Value::Int(1)]));
        let b = Value::List(List::from_vec(vec![Value::Int(1)]));
        let mut refs = TrackedWrites::default();
        refs.set(RefKey::Identity(Identity::of(&a).unwrap()));
        assert_eq!(refs.index_of(&RefKey::Identity(Identity::of(&a.clone()).unwrap())), Some(0));
        assert_eq!(refs.index_of(&RefKey::Identity(Identity::of(&b).unwrap())), None);
    }

    #[test]
    fn untracked_reads_reject_references() {
        let refs = UntrackedReads;
        assert!(matches!(refs.read(0), Err(Error::UnexpectedTag { actual: b'r', .. })));
    }

    #[test]
    fn tracked_reads_bound_check() {
        let mut refs = TrackedReads::default();
        refs.set(Value::Int(7));
        assert_eq!(refs.read(0).unwrap(), Value::Int(7));
        assert_eq!(refs.read(1), Err(Error::BadReference(1)));
    }
}
