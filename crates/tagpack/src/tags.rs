//! # Tag Table
//!
//! Every value and protocol element on the wire opens with one ASCII byte.
//! Small integers `0`..`9` are the only values written without a tag.

/// Identifies the wire element that follows.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    // Values
    Integer = b'i',
    Long = b'l',
    Double = b'd',
    Null = b'n',
    Empty = b'e',
    True = b't',
    False = b'f',
    NaN = b'N',
    Infinity = b'I',
    Date = b'D',
    Time = b'T',
    Utc = b'Z',
    Bytes = b'b',
    Utf8Char = b'u',
    String = b's',
    Guid = b'g',
    List = b'a',
    Map = b'm',
    Class = b'c',
    Object = b'o',
    Ref = b'r',

    // Marks
    Pos = b'+',
    Neg = b'-',
    Semicolon = b';',
    OpenBrace = b'{',
    CloseBrace = b'}',
    Quote = b'"',
    Point = b'.',

    // Protocol
    Functions = b'F',
    Call = b'C',
    Result = b'R',
    Argument = b'A',
    Error = b'E',
    End = b'z',
}

impl Tag {
    /// Returns the Tag for a given byte, or `None` if the byte opens no known element.
    pub const fn from_u8(b: u8) -> Option<Self> {
        match b {
            b'i' => Some(Tag::Integer),
            b'l' => Some(Tag::Long),
            b'd' => Some(Tag::Double),
            b'n' => Some(Tag::Null),
            b'e' => Some(Tag::Empty),
            b't' => Some(Tag::True),
            b'f' => Some(Tag::False),
            b'N' => Some(Tag::NaN),
            b'I' => Some(Tag::Infinity),
            b'D' => Some(Tag::Date),
            b'T' => Some(Tag::Time),
            b'Z' => Some(Tag::Utc),
            b'b' => Some(Tag::Bytes),
            b'u' => Some(Tag::Utf8Char),
            b's' => Some(Tag::String),
            b'g' => Some(Tag::Guid),
            b'a' => Some(Tag::List),
            b'm' => Some(Tag::Map),
            b'c' => Some(Tag::Class),
            b'o' => Some(Tag::Object),
            b'r' => Some(Tag::Ref),
            b'+' => Some(Tag::Pos),
            b'-' => Some(Tag::Neg),
            b';' => Some(Tag::Semicolon),
            b'{' => Some(Tag::OpenBrace),
            b'}' => Some(Tag::CloseBrace),
            b'"' => Some(Tag::Quote),
            b'.' => Some(Tag::Point),
            b'F' => Some(Tag::Functions),
            b'C' => Some(Tag::Call),
            b'R' => Some(Tag::Result),
            b'A' => Some(Tag::Argument),
            b'E' => Some(Tag::Error),
            b'z' => Some(Tag::End),
            _ => None,
        }
    }

    #[inline(always)]
    pub const fn byte(self) -> u8 {
        self as u8
    }
}

impl From<Tag> for u8 {
    fn from(tag: Tag) -> u8 {
        tag as u8
    }
}

/// Returns true for the bytes that encode an inline small integer.
#[inline(always)]
pub const fn is_digit(b: u8) -> bool {
    b.is_ascii_digit()
}
