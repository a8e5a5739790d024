use crate::error::Error;
use crate::error::Result;

/// Read position over a borrowed message. Every length taken from the wire
/// is checked against what is left before it is used.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// End of the next `len` bytes, if the message has them.
    #[inline]
    fn end_of(&self, len: usize) -> Result<usize> {
        match self.pos.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(end),
            _ => Err(Error::StreamExhausted),
        }
    }

    pub fn peek_byte(&self) -> Result<u8> {
        self.data.get(self.pos).copied().ok_or(Error::StreamExhausted)
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        let byte = self.peek_byte()?;
        self.pos += 1;
        Ok(byte)
    }

    /// Consumes and returns the next `len` bytes.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.end_of(len)?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub fn advance(&mut self, len: usize) -> Result<()> {
        self.pos = self.end_of(len)?;
        Ok(())
    }

    /// Reads up to `delim`, consuming the delimiter but not returning it.
    /// On failure the position is left where it was.
    pub fn read_until(&mut self, delim: u8) -> Result<&'a [u8]> {
        let rest = self.rest();
        let len = rest.iter().position(|&b| b == delim).ok_or(Error::StreamExhausted)?;
        self.pos += len + 1;
        Ok(&rest[..len])
    }

    /// Everything not yet consumed.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// The bytes consumed since position `start`.
    pub(crate) fn since(&self, start: usize) -> &'a [u8] {
        &self.data[start.min(self.pos)..self.pos]
    }
}
