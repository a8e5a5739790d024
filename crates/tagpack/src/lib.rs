pub mod tags;
pub mod error;
pub mod value;
pub mod class;
pub mod refer;
pub mod cursor;
pub mod writer;
pub mod reader;

pub use error::Result;
pub use error::Error;
pub use tags::Tag;

pub use value::Value;
pub use value::List;
pub use value::Map;
pub use value::Object;
pub use value::DateTime;
pub use value::Time;

pub use class::Class;
pub use class::ClassType;
pub use class::ClassRegistry;

pub use cursor::Cursor;
pub use writer::Writer;
pub use reader::Reader;

/// How many containers may enclose one another in a single value.
pub const MAX_DEPTH: usize = 256;

/// Encodes one value into a fresh buffer.
pub fn serialize(value: &Value, simple: bool) -> Result<Vec<u8>> {
    let mut writer = Writer::with_buffer(Vec::new(), simple);
    writer.serialize(value)?;
    Ok(writer.into_bytes())
}

/// Decodes the first value in `data`. Trailing bytes are ignored.
pub fn unserialize(data: &[u8], registry: &ClassRegistry, simple: bool) -> Result<Value> {
    let mut reader = Reader::with_cursor(Cursor::new(data), registry, simple);
    reader.unserialize()
}

#[cfg(test)]
mod tests;
