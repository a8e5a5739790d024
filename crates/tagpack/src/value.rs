//! # Value Model
//!
//! A closed sum type over everything the wire format can carry.
//!
//! ## Sharing
//!
//! Lists, maps and objects are shared handles (`Arc<RwLock<..>>`). Cloning a
//! `Value` that holds a container clones the handle, not the contents, so a
//! decoded graph keeps the sharing and cycles of the graph that was encoded.
//! Equality is structural and terminates on cyclic graphs.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use chrono::NaiveTime;
use chrono::Timelike;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::class::ClassType;
use crate::error::Error;
use crate::error::Result;

/// A single wire value.
#[derive(Clone)]
pub enum Value {
    Null,
    /// The empty string / empty byte blob sentinel.
    Empty,
    Bool(bool),
    /// Integers that fit in 64 bits.
    Int(i64),
    /// Integers beyond 64 bits. Constructors normalize smaller values to `Int`.
    BigInt(BigInt),
    Double(f64),
    /// A one code point string.
    Char(char),
    String(String),
    Bytes(Vec<u8>),
    Date(DateTime),
    Time(Time),
    Guid(Uuid),
    List(List),
    Map(Map),
    Object(Object),
}

impl Value {
    /// Builds a string value, picking `Empty` or `Char` for zero and one code point.
    pub fn string(s: impl Into<String>) -> Value {
        let s = s.into();
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (None, _) => Value::Empty,
            (Some(c), None) => Value::Char(c),
            _ => Value::String(s),
        }
    }

    /// Builds a byte blob, picking `Empty` for zero length.
    pub fn bytes(b: impl Into<Vec<u8>>) -> Value {
        let b = b.into();
        if b.is_empty() { Value::Empty } else { Value::Bytes(b) }
    }

    /// Builds an integer, picking `Int` whenever the value fits.
    pub fn integer(i: BigInt) -> Value {
        match i.to_i64() {
            Some(v) => Value::Int(v),
            None => Value::BigInt(i),
        }
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(List::from_vec(items))
    }

    /// A short name for the kind of value, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Empty => "empty",
            Value::Bool(_) => "bool",
            Value::Int(_) => "integer",
            Value::BigInt(_) => "long",
            Value::Double(_) => "double",
            Value::Char(_) => "char",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::Guid(_) => "guid",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Object(_) => "object",
        }
    }

    fn mismatch(&self, expected: &'static str) -> Error {
        Error::TypeMismatch { expected, found: self.kind() }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self { Value::Bool(b) => Ok(*b), _ => Err(self.mismatch("bool")) }
    }

    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Value::Int(v) => Ok(*v),
            Value::BigInt(v) => v.to_i64().ok_or_else(|| self.mismatch("integer")),
            _ => Err(self.mismatch("integer")),
        }
    }

    pub fn as_big_int(&self) -> Result<BigInt> {
        match self {
            Value::Int(v) => Ok(BigInt::from(*v)),
            Value::BigInt(v) => Ok(v.clone()),
            _ => Err(self.mismatch("integer")),
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Value::Double(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f64),
            Value::BigInt(v) => v.to_f64().ok_or_else(|| self.mismatch("double")),
            _ => Err(self.mismatch("double")),
        }
    }

    /// Returns the text of `String`, `Char` or `Empty` values.
    pub fn as_string(&self) -> Result<String> {
        match self {
            Value::Empty => Ok(String::new()),
            Value::Char(c) => Ok(c.to_string()),
            Value::String(s) => Ok(s.clone()),
            _ => Err(self.mismatch("string")),
        }
    }

    pub fn as_bytes(&self) -> Result<&[u8]> {
        match self {
            Value::Empty => Ok(&[]),
            Value::Bytes(b) => Ok(b),
            Value::String(s) => Ok(s.as_bytes()),
            _ => Err(self.mismatch("bytes")),
        }
    }

    pub fn as_list(&self) -> Result<&List> {
        match self { Value::List(l) => Ok(l), _ => Err(self.mismatch("list")) }
    }

    pub fn as_map(&self) -> Result<&Map> {
        match self { Value::Map(m) => Ok(m), _ => Err(self.mismatch("map")) }
    }

    pub fn as_object(&self) -> Result<&Object> {
        match self { Value::Object(o) => Ok(o), _ => Err(self.mismatch("object")) }
    }

    fn eq_in(&self, other: &Value, seen: &mut Vec<(usize, usize)>) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) | (Empty, Empty) => true,
            (Empty, String(s)) | (String(s), Empty) => s.is_empty(),
            (Empty, Bytes(b)) | (Bytes(b), Empty) => b.is_empty(),
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (BigInt(a), BigInt(b)) => a == b,
            (Int(a), BigInt(b)) | (BigInt(b), Int(a)) => num_bigint::BigInt::from(*a) == *b,
            (Double(a), Double(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Char(a), Char(b)) => a == b,
            (Char(a), String(s)) | (String(s), Char(a)) => {
                let mut chars = s.chars();
                chars.next() == Some(*a) && chars.next().is_none()
            }
            (String(a), String(b)) => a == b,
            (Bytes(a), Bytes(b)) => a == b,
            (Date(a), Date(b)) => a == b,
            (Time(a), Time(b)) => a == b,
            // A time on 1970-01-01 travels in time-only form.
            (Date(d), Time(t)) | (Time(t), Date(d)) => {
                d.date == NaiveDate::default() && d.time_of_day() == Some(t.time) && d.utc == t.utc
            }
            (Guid(a), Guid(b)) => a == b,
            (List(a), List(b)) => {
                if !enter(seen, a.addr(), b.addr()) {
                    return true;
                }
                let (x, y) = (a.to_vec(), b.to_vec());
                x.len() == y.len() && x.iter().zip(y.iter()).all(|(p, q)| p.eq_in(q, seen))
            }
            (Map(a), Map(b)) => {
                if !enter(seen, a.addr(), b.addr()) {
                    return true;
                }
                let (x, y) = (a.entries(), b.entries());
                x.len() == y.len()
                    && x.iter().all(|(k, v)| {
                        y.iter().any(|(k2, v2)| k.eq_in(k2, seen) && v.eq_in(v2, seen))
                    })
            }
            (Object(a), Object(b)) => {
                if !enter(seen, a.addr(), b.addr()) {
                    return true;
                }
                if a.alias() != b.alias() {
                    return false;
                }
                let (x, y) = (a.fields(), b.fields());
                x.len() == y.len()
                    && x.iter().all(|(name, v)| {
                        y.iter().any(|(name2, v2)| name == name2 && v.eq_in(v2, seen))
                    })
            }
            _ => false,
        }
    }
}

/// Records a container pair under comparison. Returns false when the pair is
/// already being compared further up, which is treated as equal.
fn enter(seen: &mut Vec<(usize, usize)>, a: usize, b: usize) -> bool {
    if a == b || seen.contains(&(a, b)) {
        return false;
    }
    seen.push((a, b));
    true
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        self.eq_in(other, &mut Vec::new())
    }
}

thread_local! {
    static DEBUG_STACK: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Formats a container, printing `<cycle>` when it is already being formatted.
fn debug_guarded(
    addr: usize,
    f: &mut fmt::Formatter<'_>,
    body: impl FnOnce(&mut fmt::Formatter<'_>) -> fmt::Result,
) -> fmt::Result {
    let cyclic = DEBUG_STACK.with(|s| s.borrow().contains(&addr));
    if cyclic {
        return f.write_str("<cycle>");
    }
    DEBUG_STACK.with(|s| s.borrow_mut().push(addr));
    let result = body(f);
    DEBUG_STACK.with(|s| s.borrow_mut().pop());
    result
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Empty => f.write_str("Empty"),
            Value::Bool(v) => write!(f, "Bool({v})"),
            Value::Int(v) => write!(f, "Int({v})"),
            Value::BigInt(v) => write!(f, "BigInt({v})"),
            Value::Double(v) => write!(f, "Double({v:?})"),
            Value::Char(v) => write!(f, "Char({v:?})"),
            Value::String(v) => write!(f, "String({v:?})"),
            Value::Bytes(v) => write!(f, "Bytes({v:?})"),
            Value::Date(v) => write!(f, "{v:?}"),
            Value::Time(v) => write!(f, "{v:?}"),
            Value::Guid(v) => write!(f, "Guid({v})"),
            Value::List(v) => write!(f, "{v:?}"),
            Value::Map(v) => write!(f, "{v:?}"),
            Value::Object(v) => write!(f, "{v:?}"),
        }
    }
}

// ============================================================================
//  CONTAINERS
// ============================================================================

/// A shared, ordered list of values.
#[derive(Clone, Default)]
pub struct List(Arc<RwLock<Vec<Value>>>);

impl List {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        Self(Arc::new(RwLock::new(items)))
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&self, value: Value) {
        self.0.write().push(value);
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.read().get(index).cloned()
    }

    /// Replaces the item at `index`. Returns false when out of range.
    pub fn set(&self, index: usize, value: Value) -> bool {
        match self.0.write().get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// A snapshot of the items. Container items stay shared.
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.read().clone()
    }

    /// True when both handles point at the same list.
    pub fn ptr_eq(&self, other: &List) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_guarded(self.addr(), f, |f| f.debug_list().entries(self.to_vec()).finish())
    }
}

/// A shared map that keeps insertion order.
#[derive(Clone, Default)]
pub struct Map(Arc<RwLock<Vec<(Value, Value)>>>);

impl Map {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<(Value, Value)>) -> Self {
        let map = Map::new();
        for (k, v) in entries {
            map.insert(k, v);
        }
        map
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts or replaces the value under `key`, keeping the original position on replace.
    pub fn insert(&self, key: Value, value: Value) {
        // Keys may contain this very map, so compare against a snapshot without holding the lock.
        let position = self.entries().iter().position(|(k, _)| *k == key);
        let mut entries = self.0.write();
        match position.and_then(|i| entries.get_mut(i)) {
            Some(entry) => entry.1 = value,
            None => entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        let entries = self.entries();
        entries.into_iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// A snapshot of the entries in insertion order.
    pub fn entries(&self) -> Vec<(Value, Value)> {
        self.0.read().clone()
    }

    pub fn ptr_eq(&self, other: &Map) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_guarded(self.addr(), f, |f| {
            let entries = self.entries();
            f.debug_map().entries(entries.iter().map(|(k, v)| (k, v))).finish()
        })
    }
}

struct ObjectData {
    class: Arc<ClassType>,
    fields: Vec<(String, Value)>,
}

/// A shared structured value: a class plus named fields in declaration order.
#[derive(Clone)]
pub struct Object(Arc<RwLock<ObjectData>>);

impl Object {
    pub fn new(class: Arc<ClassType>) -> Self {
        Self::with_fields(class, Vec::new())
    }

    pub fn with_fields(class: Arc<ClassType>, fields: Vec<(String, Value)>) -> Self {
        Self(Arc::new(RwLock::new(ObjectData { class, fields })))
    }

    pub fn class(&self) -> Arc<ClassType> {
        self.0.read().class.clone()
    }

    pub fn alias(&self) -> String {
        self.0.read().class.alias().to_string()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        let data = self.0.read();
        data.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v.clone())
    }

    /// Sets a field, appending it when the object does not have it yet.
    pub fn set(&self, name: impl Into<String>, value: Value) {
        let name = name.into();
        let mut data = self.0.write();
        match data.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(field) => field.1 = value,
            None => data.fields.push((name, value)),
        }
    }

    /// A snapshot of the fields in declaration order.
    pub fn fields(&self) -> Vec<(String, Value)> {
        self.0.read().fields.clone()
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_guarded(self.addr(), f, |f| {
            let mut s = f.debug_struct(&self.alias());
            for (name, value) in self.fields() {
                s.field(&name, &value);
            }
            s.finish()
        })
    }
}

// ============================================================================
//  DATES
// ============================================================================

/// A calendar date with an optional time of day.
///
/// A missing time and midnight are the same instant; both encode in date-only form.
#[derive(Debug, Clone, Copy, Eq)]
pub struct DateTime {
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
    pub utc: bool,
}

impl DateTime {
    pub fn new(date: NaiveDate, time: Option<NaiveTime>, utc: bool) -> Self {
        Self { date, time, utc }
    }

    /// The time of day, or `None` when it is absent or midnight.
    pub fn time_of_day(&self) -> Option<NaiveTime> {
        self.time.filter(|t| t.num_seconds_from_midnight() != 0 || t.nanosecond() != 0)
    }
}

impl PartialEq for DateTime {
    fn eq(&self, other: &DateTime) -> bool {
        self.date == other.date && self.time_of_day() == other.time_of_day() && self.utc == other.utc
    }
}

/// A time of day with no date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Time {
    pub time: NaiveTime,
    pub utc: bool,
}

impl Time {
    pub fn new(time: NaiveTime, utc: bool) -> Self {
        Self { time, utc }
    }
}

// ============================================================================
//  CONVERSIONS
// ============================================================================

impl From<bool> for Value {
    fn from(v: bool) -> Self { Value::Bool(v) }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self { Value::Int(v as i64) }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self { Value::Int(v) }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self { Value::Int(v as i64) }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self { Value::integer(BigInt::from(v)) }
}

impl From<BigInt> for Value {
    fn from(v: BigInt) -> Self { Value::integer(v) }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self { Value::Double(v) }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self { Value::Double(v as f64) }
}

impl From<char> for Value {
    fn from(v: char) -> Self { Value::Char(v) }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self { Value::string(v) }
}

impl From<String> for Value {
    fn from(v: String) -> Self { Value::string(v) }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self { Value::bytes(v) }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self { Value::bytes(v) }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self { Value::Guid(v) }
}

impl From<DateTime> for Value {
    fn from(v: DateTime) -> Self { Value::Date(v) }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self { Value::Date(DateTime::new(v, None, false)) }
}

impl From<Time> for Value {
    fn from(v: Time) -> Self { Value::Time(v) }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self { Value::list(v) }
}

impl From<List> for Value {
    fn from(v: List) -> Self { Value::List(v) }
}

impl From<Map> for Value {
    fn from(v: Map) -> Self { Value::Map(v) }
}

impl From<Object> for Value {
    fn from(v: Object) -> Self { Value::Object(v) }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}
