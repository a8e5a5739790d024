//! # Reader
//!
//! A single-byte-lookahead decoder over a borrowed buffer. The generic entry
//! point is [`Reader::unserialize`]; the typed `read_*` methods accept only the
//! tags that can produce their kind, plus `n` and `r` where a null or a
//! back-reference is meaningful.

use std::sync::Arc;

use chrono::NaiveDate;
use chrono::NaiveTime;
use num_bigint::BigInt;
use uuid::Uuid;

use crate::class::ClassRegistry;
use crate::class::ClassType;
use crate::cursor::Cursor;
use crate::error::Error;
use crate::error::Result;
use crate::refer::ReadRefs;
use crate::refer::read_refs;
use crate::tags::Tag;
use crate::tags::is_digit;
use crate::value::DateTime;
use crate::value::List;
use crate::value::Map;
use crate::value::Object;
use crate::value::Time;
use crate::value::Value;

pub struct Reader<'a> {
    cursor: Cursor<'a>,
    registry: &'a ClassRegistry,
    refer: Box<dyn ReadRefs>,
    /// Classes defined so far in this message, by index.
    classref: Vec<(Arc<ClassType>, Vec<String>)>,
    /// Values currently being decoded inside one another.
    depth: usize,
}

impl<'a> Reader<'a> {
    /// A reference-tracking reader.
    pub fn new(data: &'a [u8], registry: &'a ClassRegistry) -> Self {
        Self::with_cursor(Cursor::new(data), registry, false)
    }

    /// A reader that rejects back-references.
    pub fn simple(data: &'a [u8], registry: &'a ClassRegistry) -> Self {
        Self::with_cursor(Cursor::new(data), registry, true)
    }

    /// Continues reading from an existing position.
    pub fn with_cursor(cursor: Cursor<'a>, registry: &'a ClassRegistry, simple: bool) -> Self {
        Self { cursor, registry, refer: read_refs(simple), classref: Vec::new(), depth: 0 }
    }

    pub fn cursor(&self) -> &Cursor<'a> {
        &self.cursor
    }

    pub fn cursor_mut(&mut self) -> &mut Cursor<'a> {
        &mut self.cursor
    }

    pub fn into_cursor(self) -> Cursor<'a> {
        self.cursor
    }

    pub fn registry(&self) -> &'a ClassRegistry {
        self.registry
    }

    /// Forgets every reference and class read so far.
    pub fn reset(&mut self) {
        self.classref.clear();
        self.refer.reset();
    }

    /// Consumes one byte and fails unless it is `expected`.
    pub fn check_tag(&mut self, expected: Tag) -> Result<()> {
        let tag = self.cursor.read_byte()?;
        if tag != expected.byte() {
            return Err(Error::expected(tag, &[expected.byte()]));
        }
        Ok(())
    }

    /// Consumes one byte and returns it when it is one of `expected`.
    pub fn check_tags(&mut self, expected: &[Tag]) -> Result<Tag> {
        let tag = self.cursor.read_byte()?;
        match expected.iter().find(|t| t.byte() == tag) {
            Some(found) => Ok(*found),
            None => {
                let bytes: Vec<u8> = expected.iter().map(|t| t.byte()).collect();
                Err(Error::expected(tag, &bytes))
            }
        }
    }

    /// Decodes the next value of any kind. Class blocks before an object are
    /// consumed on the way.
    pub fn unserialize(&mut self) -> Result<Value> {
        if self.depth >= crate::MAX_DEPTH {
            return Err(Error::TooDeep(crate::MAX_DEPTH));
        }
        let mut tag = self.cursor.read_byte()?;
        while tag == Tag::Class.byte() {
            self.read_class()?;
            tag = self.cursor.read_byte()?;
        }
        self.depth += 1;
        let value = self.unserialize_tagged(tag);
        self.depth -= 1;
        value
    }

    fn unserialize_tagged(&mut self, tag: u8) -> Result<Value> {
        if is_digit(tag) {
            return Ok(Value::Int((tag - b'0') as i64));
        }
        match Tag::from_u8(tag) {
            Some(Tag::Integer) => Ok(Value::Int(self.read_i64_literal()?)),
            Some(Tag::Long) => self.read_long_literal().map(Value::integer),
            Some(Tag::Double) => Ok(Value::Double(self.read_f64_literal()?)),
            Some(Tag::NaN) => Ok(Value::Double(f64::NAN)),
            Some(Tag::Infinity) => Ok(Value::Double(self.read_infinity()?)),
            Some(Tag::Null) => Ok(Value::Null),
            Some(Tag::Empty) => Ok(Value::Empty),
            Some(Tag::True) => Ok(Value::Bool(true)),
            Some(Tag::False) => Ok(Value::Bool(false)),
            Some(Tag::Date) => self.read_date_without_tag(),
            Some(Tag::Time) => self.read_time_without_tag().map(Value::Time),
            Some(Tag::Bytes) => self.read_bytes_without_tag().map(Value::bytes),
            Some(Tag::Utf8Char) => Ok(Value::Char(self.read_char_without_tag()?)),
            Some(Tag::String) => self.read_string_without_tag().map(Value::string),
            Some(Tag::Guid) => self.read_guid_without_tag().map(Value::Guid),
            Some(Tag::List) => self.read_list_without_tag().map(Value::List),
            Some(Tag::Map) => self.read_map_without_tag().map(Value::Map),
            Some(Tag::Object) => self.read_object_without_tag().map(Value::Object),
            Some(Tag::Ref) => self.read_ref(),
            _ => Err(Error::unexpected(tag)),
        }
    }

    // ------------------------------------------------------------------------
    //  Typed reads
    // ------------------------------------------------------------------------

    pub fn read_integer(&mut self) -> Result<i64> {
        let tag = self.cursor.read_byte()?;
        if is_digit(tag) {
            return Ok((tag - b'0') as i64);
        }
        match Tag::from_u8(tag) {
            Some(Tag::Integer) | Some(Tag::Long) => self.read_i64_literal(),
            _ => Err(Error::unexpected(tag)),
        }
    }

    pub fn read_long(&mut self) -> Result<BigInt> {
        let tag = self.cursor.read_byte()?;
        if is_digit(tag) {
            return Ok(BigInt::from(tag - b'0'));
        }
        match Tag::from_u8(tag) {
            Some(Tag::Integer) | Some(Tag::Long) => self.read_long_literal(),
            _ => Err(Error::unexpected(tag)),
        }
    }

    pub fn read_double(&mut self) -> Result<f64> {
        let tag = self.cursor.read_byte()?;
        if is_digit(tag) {
            return Ok((tag - b'0') as f64);
        }
        match Tag::from_u8(tag) {
            Some(Tag::Integer) | Some(Tag::Long) | Some(Tag::Double) => self.read_f64_literal(),
            Some(Tag::NaN) => Ok(f64::NAN),
            Some(Tag::Infinity) => self.read_infinity(),
            _ => Err(Error::unexpected(tag)),
        }
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.check_tags(&[Tag::True, Tag::False])? == Tag::True)
    }

    pub fn read_string(&mut self) -> Result<Option<String>> {
        let tag = self.cursor.read_byte()?;
        match Tag::from_u8(tag) {
            Some(Tag::Null) => Ok(None),
            Some(Tag::Empty) => Ok(Some(String::new())),
            Some(Tag::Utf8Char) => Ok(Some(self.read_char_without_tag()?.to_string())),
            Some(Tag::String) => self.read_string_without_tag().map(Some),
            Some(Tag::Ref) => self.read_ref().and_then(|v| v.as_string()).map(Some),
            _ => Err(Error::unexpected(tag)),
        }
    }

    pub fn read_bytes(&mut self) -> Result<Option<Vec<u8>>> {
        let tag = self.cursor.read_byte()?;
        match Tag::from_u8(tag) {
            Some(Tag::Null) => Ok(None),
            Some(Tag::Empty) => Ok(Some(Vec::new())),
            Some(Tag::Bytes) => self.read_bytes_without_tag().map(Some),
            Some(Tag::Ref) => Ok(Some(self.read_ref()?.as_bytes()?.to_vec())),
            _ => Err(Error::unexpected(tag)),
        }
    }

    /// Reads a date. A time-only value comes back anchored at 1970-01-01.
    pub fn read_date(&mut self) -> Result<Option<DateTime>> {
        let tag = self.cursor.read_byte()?;
        let value = match Tag::from_u8(tag) {
            Some(Tag::Null) => return Ok(None),
            Some(Tag::Date) => self.read_date_without_tag()?,
            Some(Tag::Ref) => self.read_ref()?,
            _ => return Err(Error::unexpected(tag)),
        };
        match value {
            Value::Date(d) => Ok(Some(d)),
            Value::Time(t) => Ok(Some(DateTime::new(NaiveDate::default(), Some(t.time), t.utc))),
            other => Err(Error::TypeMismatch { expected: "date", found: other.kind() }),
        }
    }

    pub fn read_time(&mut self) -> Result<Option<Time>> {
        let tag = self.cursor.read_byte()?;
        match Tag::from_u8(tag) {
            Some(Tag::Null) => Ok(None),
            Some(Tag::Time) => self.read_time_without_tag().map(Some),
            Some(Tag::Ref) => match self.read_ref()? {
                Value::Time(t) => Ok(Some(t)),
                other => Err(Error::TypeMismatch { expected: "time", found: other.kind() }),
            },
            _ => Err(Error::unexpected(tag)),
        }
    }

    pub fn read_guid(&mut self) -> Result<Option<Uuid>> {
        let tag = self.cursor.read_byte()?;
        match Tag::from_u8(tag) {
            Some(Tag::Null) => Ok(None),
            Some(Tag::Guid) => self.read_guid_without_tag().map(Some),
            Some(Tag::Ref) => match self.read_ref()? {
                Value::Guid(g) => Ok(Some(g)),
                other => Err(Error::TypeMismatch { expected: "guid", found: other.kind() }),
            },
            _ => Err(Error::unexpected(tag)),
        }
    }

    pub fn read_list(&mut self) -> Result<Option<List>> {
        let tag = self.cursor.read_byte()?;
        match Tag::from_u8(tag) {
            Some(Tag::Null) => Ok(None),
            Some(Tag::List) => self.read_list_without_tag().map(Some),
            Some(Tag::Ref) => Ok(Some(self.read_ref()?.as_list()?.clone())),
            _ => Err(Error::unexpected(tag)),
        }
    }

    pub fn read_map(&mut self) -> Result<Option<Map>> {
        let tag = self.cursor.read_byte()?;
        match Tag::from_u8(tag) {
            Some(Tag::Null) => Ok(None),
            Some(Tag::Map) => self.read_map_without_tag().map(Some),
            Some(Tag::Ref) => Ok(Some(self.read_ref()?.as_map()?.clone())),
            _ => Err(Error::unexpected(tag)),
        }
    }

    pub fn read_object(&mut self) -> Result<Option<Object>> {
        let mut tag = self.cursor.read_byte()?;
        while tag == Tag::Class.byte() {
            self.read_class()?;
            tag = self.cursor.read_byte()?;
        }
        match Tag::from_u8(tag) {
            Some(Tag::Null) => Ok(None),
            Some(Tag::Object) => self.read_object_without_tag().map(Some),
            Some(Tag::Ref) => Ok(Some(self.read_ref()?.as_object()?.clone())),
            _ => Err(Error::unexpected(tag)),
        }
    }

    // ------------------------------------------------------------------------
    //  Bodies (tag already consumed)
    // ------------------------------------------------------------------------

    fn read_literal(&mut self, delim: u8) -> Result<&'a str> {
        let bytes = self.cursor.read_until(delim)?;
        std::str::from_utf8(bytes).map_err(|_| Error::InvalidNumber(String::from_utf8_lossy(bytes).into()))
    }

    /// A length or count before `delim`; absent digits mean zero.
    fn read_count(&mut self, delim: u8) -> Result<usize> {
        let text = self.read_literal(delim)?;
        if text.is_empty() {
            return Ok(0);
        }
        text.parse().map_err(|_| Error::InvalidNumber(text.to_string()))
    }

    fn read_i64_literal(&mut self) -> Result<i64> {
        let text = self.read_literal(Tag::Semicolon.byte())?;
        text.parse().map_err(|_| Error::InvalidNumber(text.to_string()))
    }

    fn read_long_literal(&mut self) -> Result<BigInt> {
        let text = self.read_literal(Tag::Semicolon.byte())?;
        text.parse().map_err(|_| Error::InvalidNumber(text.to_string()))
    }

    fn read_f64_literal(&mut self) -> Result<f64> {
        let text = self.read_literal(Tag::Semicolon.byte())?;
        text.parse().map_err(|_| Error::InvalidNumber(text.to_string()))
    }

    fn read_infinity(&mut self) -> Result<f64> {
        match self.check_tags(&[Tag::Pos, Tag::Neg])? {
            Tag::Neg => Ok(f64::NEG_INFINITY),
            _ => Ok(f64::INFINITY),
        }
    }

    /// Fixed-width decimal field of a date or time.
    fn read_digits(&mut self, width: usize) -> Result<u32> {
        let bytes = self.cursor.take(width)?;
        if !bytes.iter().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidDate(String::from_utf8_lossy(bytes).into()));
        }
        Ok(bytes.iter().fold(0, |n, b| n * 10 + (b - b'0') as u32))
    }

    /// Reads `hhmmss[.fff[fff[fff]]]` and the terminator. Digits past microseconds are dropped.
    fn read_clock(&mut self) -> Result<(NaiveTime, bool)> {
        let (hour, minute, second) = (self.read_digits(2)?, self.read_digits(2)?, self.read_digits(2)?);
        let mut micros = 0;
        let mut tag = self.cursor.read_byte()?;
        if tag == Tag::Point.byte() {
            micros = self.read_digits(3)? * 1000;
            tag = self.cursor.read_byte()?;
            if is_digit(tag) {
                micros += (tag - b'0') as u32 * 100 + self.read_digits(2)?;
                tag = self.cursor.read_byte()?;
                if is_digit(tag) {
                    self.read_digits(2)?;
                    tag = self.cursor.read_byte()?;
                }
            }
        }
        let utc = self.terminator(tag)?;
        let time = NaiveTime::from_hms_micro_opt(hour, minute, second, micros).ok_or_else(|| {
            Error::InvalidDate(format!("{:02}{:02}{:02}.{:06}", hour, minute, second, micros))
        })?;
        Ok((time, utc))
    }

    fn terminator(&self, tag: u8) -> Result<bool> {
        match tag {
            b'Z' => Ok(true),
            b';' => Ok(false),
            _ => Err(Error::expected(tag, b"Z;")),
        }
    }

    fn read_date_without_tag(&mut self) -> Result<Value> {
        let (year, month, day) = (self.read_digits(4)?, self.read_digits(2)?, self.read_digits(2)?);
        let date = NaiveDate::from_ymd_opt(year as i32, month, day)
            .ok_or_else(|| Error::InvalidDate(format!("{:04}{:02}{:02}", year, month, day)))?;
        let tag = self.cursor.read_byte()?;
        let value = if tag == Tag::Time.byte() {
            let (time, utc) = self.read_clock()?;
            DateTime::new(date, Some(time), utc)
        } else {
            DateTime::new(date, None, self.terminator(tag)?)
        };
        let value = Value::Date(value);
        self.refer.set(value.clone());
        Ok(value)
    }

    fn read_time_without_tag(&mut self) -> Result<Time> {
        let (time, utc) = self.read_clock()?;
        let time = Time::new(time, utc);
        self.refer.set(Value::Time(time));
        Ok(time)
    }

    fn read_bytes_without_tag(&mut self) -> Result<Vec<u8>> {
        let len = self.read_count(Tag::Quote.byte())?;
        let bytes = self.cursor.take(len)?.to_vec();
        self.check_tag(Tag::Quote)?;
        self.refer.set(Value::bytes(bytes.clone()));
        Ok(bytes)
    }

    fn read_char_without_tag(&mut self) -> Result<char> {
        let width = utf8_width(self.cursor.peek_byte()?)?;
        let bytes = self.cursor.take(width)?;
        let s = std::str::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)?;
        s.chars().next().ok_or(Error::InvalidUtf8)
    }

    /// `len"text"` where `len` counts UTF-16 code units.
    fn read_utf16_text(&mut self) -> Result<String> {
        let len = self.read_count(Tag::Quote.byte())?;
        let start = self.cursor.pos();
        let mut units = 0;
        while units < len {
            let width = utf8_width(self.cursor.peek_byte()?)?;
            self.cursor.advance(width)?;
            units += if width == 4 { 2 } else { 1 };
        }
        let bytes = self.cursor.since(start);
        let text = std::str::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)?.to_string();
        self.check_tag(Tag::Quote)?;
        Ok(text)
    }

    fn read_string_without_tag(&mut self) -> Result<String> {
        let text = self.read_utf16_text()?;
        self.refer.set(Value::string(text.clone()));
        Ok(text)
    }

    fn read_guid_without_tag(&mut self) -> Result<Uuid> {
        self.check_tag(Tag::OpenBrace)?;
        let bytes = self.cursor.take(36)?;
        let text = String::from_utf8_lossy(bytes);
        let guid = Uuid::parse_str(&text).map_err(|_| Error::InvalidGuid(text.to_string()))?;
        self.check_tag(Tag::CloseBrace)?;
        self.refer.set(Value::Guid(guid));
        Ok(guid)
    }

    /// Reads a list body. The `a` tag must already be consumed.
    pub fn read_list_without_tag(&mut self) -> Result<List> {
        let count = self.read_count(Tag::OpenBrace.byte())?;
        let list = List::new();
        self.refer.set(Value::List(list.clone()));
        for _ in 0..count {
            let item = self.unserialize()?;
            list.push(item);
        }
        self.check_tag(Tag::CloseBrace)?;
        Ok(list)
    }

    fn read_map_without_tag(&mut self) -> Result<Map> {
        let count = self.read_count(Tag::OpenBrace.byte())?;
        let map = Map::new();
        self.refer.set(Value::Map(map.clone()));
        for _ in 0..count {
            let key = self.unserialize()?;
            let value = self.unserialize()?;
            map.insert(key, value);
        }
        self.check_tag(Tag::CloseBrace)?;
        Ok(map)
    }

    fn read_class(&mut self) -> Result<()> {
        let alias = self.read_utf16_text()?;
        let count = self.read_count(Tag::OpenBrace.byte())?;
        let mut fields = Vec::with_capacity(count.min(self.cursor.remaining()));
        for _ in 0..count {
            let name = self.read_string()?.ok_or(Error::TypeMismatch { expected: "string", found: "null" })?;
            fields.push(name);
        }
        self.check_tag(Tag::CloseBrace)?;
        let class = self.registry.class_for(&alias);
        self.classref.push((class, fields));
        Ok(())
    }

    fn read_object_without_tag(&mut self) -> Result<Object> {
        let index = self.read_count(Tag::OpenBrace.byte())?;
        let (class, fields) = self.classref.get(index).cloned().ok_or(Error::BadReference(index))?;
        let object = Object::with_fields(class, fields.iter().map(|f| (f.clone(), Value::Null)).collect());
        self.refer.set(Value::Object(object.clone()));
        for name in fields {
            let value = self.unserialize()?;
            object.set(name, value);
        }
        self.check_tag(Tag::CloseBrace)?;
        Ok(object)
    }

    fn read_ref(&mut self) -> Result<Value> {
        let index = self.read_count(Tag::Semicolon.byte())?;
        self.refer.read(index)
    }

    // ------------------------------------------------------------------------
    //  Raw
    // ------------------------------------------------------------------------

    /// Returns the exact encoding of the next value without decoding it. A class
    /// block is returned together with the object that follows it.
    pub fn read_raw(&mut self) -> Result<&'a [u8]> {
        let start = self.cursor.pos();
        let tag = self.cursor.read_byte()?;
        self.skip_raw(tag, 0)?;
        Ok(self.cursor.since(start))
    }

    fn skip_raw(&mut self, tag: u8, depth: usize) -> Result<()> {
        if depth >= crate::MAX_DEPTH {
            return Err(Error::TooDeep(crate::MAX_DEPTH));
        }
        if is_digit(tag) {
            return Ok(());
        }
        match Tag::from_u8(tag) {
            Some(Tag::Null | Tag::Empty | Tag::True | Tag::False | Tag::NaN) => {}
            Some(Tag::Infinity) => {
                self.cursor.read_byte()?;
            }
            Some(Tag::Integer | Tag::Long | Tag::Double | Tag::Ref) => {
                self.cursor.read_until(Tag::Semicolon.byte())?;
            }
            Some(Tag::Date | Tag::Time) => loop {
                let b = self.cursor.read_byte()?;
                if b == Tag::Semicolon.byte() || b == Tag::Utc.byte() {
                    break;
                }
            },
            Some(Tag::Utf8Char) => {
                let width = utf8_width(self.cursor.peek_byte()?)?;
                self.cursor.advance(width)?;
            }
            Some(Tag::Bytes) => {
                let len = self.read_count(Tag::Quote.byte())?;
                self.cursor.advance(len)?;
                self.check_tag(Tag::Quote)?;
            }
            Some(Tag::String) => {
                self.read_utf16_text()?;
            }
            Some(Tag::Guid) => self.cursor.advance(38)?,
            Some(Tag::List | Tag::Map | Tag::Object) => self.skip_complex(depth)?,
            Some(Tag::Class) => {
                let mut next = tag;
                while next == Tag::Class.byte() {
                    self.read_utf16_text()?;
                    self.skip_complex(depth)?;
                    next = self.cursor.read_byte()?;
                }
                self.skip_raw(next, depth)?;
            }
            Some(Tag::Error) => {
                let next = self.cursor.read_byte()?;
                self.skip_raw(next, depth + 1)?;
            }
            _ => return Err(Error::unexpected(tag)),
        }
        Ok(())
    }

    fn skip_complex(&mut self, depth: usize) -> Result<()> {
        self.cursor.read_until(Tag::OpenBrace.byte())?;
        loop {
            let tag = self.cursor.read_byte()?;
            if tag == Tag::CloseBrace.byte() {
                return Ok(());
            }
            self.skip_raw(tag, depth + 1)?;
        }
    }
}

/// Byte length of the UTF-8 sequence opened by `lead`.
fn utf8_width(lead: u8) -> Result<usize> {
    match lead {
        0x00..=0x7F => Ok(1),
        b if b & 0xE0 == 0xC0 => Ok(2),
        b if b & 0xF0 == 0xE0 => Ok(3),
        b if b & 0xF8 == 0xF0 => Ok(4),
        _ => Err(Error::InvalidUtf8),
    }
}
