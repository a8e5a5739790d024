//! # Writer
//!
//! The canonical encoder. One `Writer` serializes one message (or one section
//! of a message between `reset` calls).
//!
//! ## Format
//!
//! - **Small integers**: `0`..`9` as a bare digit.
//! - **Numbers**: `[Tag][decimal];`
//! - **Strings / blobs**: `[Tag][len]"[payload]"`, length omitted when zero.
//! - **Containers**: `[Tag][count]{[items]}`, count omitted when zero.
//! - **Objects**: `c[len]"[alias]"[count]{[field names]}` once per class, then `o[index]{[values]}`.
//! - **Repeats**: `r[index];`

use std::collections::HashMap;

use chrono::Datelike;
use chrono::NaiveDate;
use chrono::NaiveTime;
use chrono::Timelike;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use uuid::Uuid;

use crate::error::Error;
use crate::error::Result;
use crate::refer::Identity;
use crate::refer::RefKey;
use crate::refer::WriteRefs;
use crate::refer::write_refs;
use crate::tags::Tag;
use crate::value::DateTime;
use crate::value::List;
use crate::value::Map;
use crate::value::Object;
use crate::value::Time;
use crate::value::Value;

/// A growable buffer that encodes values into the wire format.
pub struct Writer {
    buf: Vec<u8>,
    refer: Box<dyn WriteRefs>,
    /// alias -> class index, per message
    classref: HashMap<String, usize>,
    /// class index -> field order declared in the class block
    fieldsref: Vec<Vec<String>>,
    /// containers currently open
    depth: usize,
}

impl Writer {
    /// Creates a reference-tracking writer.
    pub fn new() -> Self {
        Self::with_buffer(Vec::new(), false)
    }

    /// Creates a writer with reference tracking disabled.
    pub fn simple() -> Self {
        Self::with_buffer(Vec::new(), true)
    }

    /// Appends to an existing buffer.
    pub fn with_buffer(buf: Vec<u8>, simple: bool) -> Self {
        Self {
            buf,
            refer: write_refs(simple),
            classref: HashMap::new(),
            fieldsref: Vec::new(),
            depth: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Forgets every reference and class written so far.
    pub fn reset(&mut self) {
        self.classref.clear();
        self.fieldsref.clear();
        self.refer.reset();
    }

    /// Writes a bare protocol or mark tag.
    #[inline(always)]
    pub fn write_tag(&mut self, tag: Tag) {
        self.buf.push(tag.byte());
    }

    /// Appends already-encoded bytes verbatim.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    #[inline(always)]
    fn write_decimal(&mut self, n: impl std::fmt::Display) {
        self.buf.extend_from_slice(n.to_string().as_bytes());
    }

    /// Count prefix of containers and blobs; zero is written as nothing.
    #[inline(always)]
    fn write_count(&mut self, n: usize) {
        if n > 0 {
            self.write_decimal(n);
        }
    }

    /// Emits `r[index];` if `key` was already written.
    fn write_ref(&mut self, key: &RefKey) -> bool {
        match self.refer.index_of(key) {
            Some(index) => {
                self.write_tag(Tag::Ref);
                self.write_decimal(index);
                self.write_tag(Tag::Semicolon);
                true
            }
            None => false,
        }
    }

    /// Encodes any value. Fails with `TooDeep` rather than recursing without
    /// bound, which is what a cyclic value does in simple mode.
    pub fn serialize(&mut self, value: &Value) -> Result<()> {
        if self.depth >= crate::MAX_DEPTH {
            return Err(Error::TooDeep(crate::MAX_DEPTH));
        }
        self.depth += 1;
        let written = self.serialize_value(value);
        self.depth -= 1;
        written
    }

    fn serialize_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Null => self.write_null(),
            Value::Empty => self.write_empty(),
            Value::Bool(b) => self.write_bool(*b),
            Value::Int(i) => self.write_integer(*i),
            Value::BigInt(i) => self.write_big_integer(i),
            Value::Double(d) => self.write_double(*d),
            Value::Char(c) => self.write_char(*c),
            Value::String(s) if s.is_empty() => self.write_empty(),
            Value::String(s) => self.write_string_with_ref(s),
            Value::Bytes(b) if b.is_empty() => self.write_empty(),
            Value::Bytes(b) => self.write_bytes_with_ref(b),
            Value::Date(d) => self.write_date_with_ref(d)?,
            Value::Time(t) => self.write_time_with_ref(t),
            Value::Guid(g) => self.write_guid_with_ref(g),
            Value::List(l) => self.write_list_with_ref(l)?,
            Value::Map(m) => self.write_map_with_ref(m)?,
            Value::Object(o) => self.write_object_with_ref(o)?,
        }
        Ok(())
    }

    pub fn write_null(&mut self) {
        self.write_tag(Tag::Null);
    }

    pub fn write_empty(&mut self) {
        self.write_tag(Tag::Empty);
    }

    pub fn write_bool(&mut self, b: bool) {
        self.write_tag(if b { Tag::True } else { Tag::False });
    }

    pub fn write_integer(&mut self, i: i64) {
        if (0..=9).contains(&i) {
            self.buf.push(b'0' + i as u8);
        } else if i32::try_from(i).is_ok() {
            self.write_tag(Tag::Integer);
            self.write_decimal(i);
            self.write_tag(Tag::Semicolon);
        } else {
            self.write_tag(Tag::Long);
            self.write_decimal(i);
            self.write_tag(Tag::Semicolon);
        }
    }

    pub fn write_big_integer(&mut self, i: &BigInt) {
        match i.to_i64() {
            Some(small) => self.write_integer(small),
            None => {
                self.write_tag(Tag::Long);
                self.write_decimal(i);
                self.write_tag(Tag::Semicolon);
            }
        }
    }

    pub fn write_double(&mut self, d: f64) {
        if d.is_nan() {
            self.write_tag(Tag::NaN);
        } else if d.is_infinite() {
            self.write_tag(Tag::Infinity);
            self.write_tag(if d > 0.0 { Tag::Pos } else { Tag::Neg });
        } else {
            self.write_tag(Tag::Double);
            // `{:?}` is the shortest text that parses back to the same bits.
            self.buf.extend_from_slice(format!("{:?}", d).as_bytes());
            self.write_tag(Tag::Semicolon);
        }
    }

    pub fn write_char(&mut self, c: char) {
        self.write_tag(Tag::Utf8Char);
        let mut tmp = [0u8; 4];
        self.buf.extend_from_slice(c.encode_utf8(&mut tmp).as_bytes());
    }

    /// Writes a length-prefixed string, always registering it.
    pub fn write_string(&mut self, s: &str) {
        self.refer.set(RefKey::String(s.to_string()));
        self.write_tag(Tag::String);
        self.write_count(utf16_len(s));
        self.write_tag(Tag::Quote);
        self.buf.extend_from_slice(s.as_bytes());
        self.write_tag(Tag::Quote);
    }

    pub fn write_string_with_ref(&mut self, s: &str) {
        if !self.write_ref(&RefKey::String(s.to_string())) {
            self.write_string(s);
        }
    }

    pub fn write_bytes(&mut self, b: &[u8]) {
        self.refer.set(RefKey::Bytes(b.to_vec()));
        self.write_tag(Tag::Bytes);
        self.write_count(b.len());
        self.write_tag(Tag::Quote);
        self.buf.extend_from_slice(b);
        self.write_tag(Tag::Quote);
    }

    pub fn write_bytes_with_ref(&mut self, b: &[u8]) {
        if !self.write_ref(&RefKey::Bytes(b.to_vec())) {
            self.write_bytes(b);
        }
    }

    pub fn write_guid(&mut self, g: &Uuid) {
        self.refer.set(RefKey::Guid(*g));
        self.write_tag(Tag::Guid);
        self.write_tag(Tag::OpenBrace);
        self.buf.extend_from_slice(g.hyphenated().to_string().as_bytes());
        self.write_tag(Tag::CloseBrace);
    }

    pub fn write_guid_with_ref(&mut self, g: &Uuid) {
        if !self.write_ref(&RefKey::Guid(*g)) {
            self.write_guid(g);
        }
    }

    /// Writes a date. Midnight collapses to date-only form and a time on
    /// 1970-01-01 collapses to time-only form.
    pub fn write_date_with_ref(&mut self, d: &DateTime) -> Result<()> {
        let mut text = Vec::with_capacity(24);
        match d.time_of_day() {
            None => push_date(&mut text, d.date)?,
            Some(time) if d.date == epoch() => push_time(&mut text, time),
            Some(time) => {
                push_date(&mut text, d.date)?;
                push_time(&mut text, time);
            }
        }
        text.push(if d.utc { Tag::Utc.byte() } else { Tag::Semicolon.byte() });
        self.write_date_text(text);
        Ok(())
    }

    pub fn write_time_with_ref(&mut self, t: &Time) {
        let mut text = Vec::with_capacity(16);
        push_time(&mut text, t.time);
        text.push(if t.utc { Tag::Utc.byte() } else { Tag::Semicolon.byte() });
        self.write_date_text(text);
    }

    fn write_date_text(&mut self, text: Vec<u8>) {
        let key = RefKey::Date(text);
        if !self.write_ref(&key) {
            if let RefKey::Date(text) = &key {
                self.buf.extend_from_slice(text);
            }
            self.refer.set(key);
        }
    }

    pub fn write_list(&mut self, list: &List) -> Result<()> {
        self.refer.set(RefKey::Identity(identity(&Value::List(list.clone()))?));
        self.write_items(&list.to_vec())
    }

    pub fn write_list_with_ref(&mut self, list: &List) -> Result<()> {
        let key = RefKey::Identity(identity(&Value::List(list.clone()))?);
        if !self.write_ref(&key) {
            self.refer.set(key);
            self.write_items(&list.to_vec())?;
        }
        Ok(())
    }

    /// Writes a slice as a list that nothing else can reference, such as an argument list.
    pub fn write_values(&mut self, values: &[Value]) -> Result<()> {
        self.refer.skip();
        self.write_items(values)
    }

    fn write_items(&mut self, items: &[Value]) -> Result<()> {
        self.write_tag(Tag::List);
        self.write_count(items.len());
        self.write_tag(Tag::OpenBrace);
        for item in items {
            self.serialize(item)?;
        }
        self.write_tag(Tag::CloseBrace);
        Ok(())
    }

    pub fn write_map_with_ref(&mut self, map: &Map) -> Result<()> {
        let key = RefKey::Identity(identity(&Value::Map(map.clone()))?);
        if self.write_ref(&key) {
            return Ok(());
        }
        self.refer.set(key);

        let entries = map.entries();
        self.write_tag(Tag::Map);
        self.write_count(entries.len());
        self.write_tag(Tag::OpenBrace);
        for (k, v) in &entries {
            self.serialize(k)?;
            self.serialize(v)?;
        }
        self.write_tag(Tag::CloseBrace);
        Ok(())
    }

    pub fn write_object_with_ref(&mut self, object: &Object) -> Result<()> {
        let key = RefKey::Identity(identity(&Value::Object(object.clone()))?);
        if self.write_ref(&key) {
            return Ok(());
        }

        let alias = object.alias();
        let fields = object.fields();
        let index = match self.classref.get(&alias) {
            Some(&index) => index,
            None => {
                let names = fields.iter().map(|(name, _)| name.clone()).collect();
                self.write_class(alias, names)
            }
        };

        self.write_tag(Tag::Object);
        self.write_decimal(index);
        self.write_tag(Tag::OpenBrace);
        self.refer.set(key);
        let names = self.fieldsref[index].clone();
        for name in &names {
            match fields.iter().find(|(n, _)| n == name) {
                Some((_, value)) => self.serialize(value)?,
                None => self.write_null(),
            }
        }
        self.write_tag(Tag::CloseBrace);
        Ok(())
    }

    fn write_class(&mut self, alias: String, fields: Vec<String>) -> usize {
        self.write_tag(Tag::Class);
        self.write_count(utf16_len(&alias));
        self.write_tag(Tag::Quote);
        self.buf.extend_from_slice(alias.as_bytes());
        self.write_tag(Tag::Quote);
        self.write_count(fields.len());
        self.write_tag(Tag::OpenBrace);
        for field in &fields {
            self.write_string(field);
        }
        self.write_tag(Tag::CloseBrace);

        let index = self.fieldsref.len();
        self.fieldsref.push(fields);
        self.classref.insert(alias, index);
        index
    }
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

fn identity(value: &Value) -> Result<Identity> {
    Identity::of(value).ok_or_else(|| Error::UnsupportedType(value.kind().to_string()))
}

/// Length in UTF-16 code units; characters outside the BMP count twice.
pub(crate) fn utf16_len(s: &str) -> usize {
    s.chars().map(char::len_utf16).sum()
}

pub(crate) fn epoch() -> NaiveDate {
    NaiveDate::default()
}

fn push_date(out: &mut Vec<u8>, date: NaiveDate) -> Result<()> {
    if !(0..=9999).contains(&date.year()) {
        return Err(Error::UnsupportedType(format!("date {} outside years 0000-9999", date)));
    }
    out.push(Tag::Date.byte());
    out.extend_from_slice(format!("{:04}{:02}{:02}", date.year(), date.month(), date.day()).as_bytes());
    Ok(())
}

/// `Thhmmss`, then `.mmm`, `.mmmuuu` or `.mmmuuunnn` when there is a fraction.
fn push_time(out: &mut Vec<u8>, time: NaiveTime) {
    out.push(Tag::Time.byte());
    out.extend_from_slice(
        format!("{:02}{:02}{:02}", time.hour(), time.minute(), time.second()).as_bytes(),
    );

    let nanos = time.nanosecond() % 1_000_000_000;
    if nanos == 0 {
        return;
    }
    out.push(Tag::Point.byte());
    out.extend_from_slice(format!("{:03}", nanos / 1_000_000).as_bytes());
    let rest = nanos % 1_000_000;
    if rest == 0 {
        return;
    }
    out.extend_from_slice(format!("{:03}", rest / 1_000).as_bytes());
    if rest % 1_000 != 0 {
        out.extend_from_slice(format!("{:03}", rest % 1_000).as_bytes());
    }
}
