/// How a call's result travels between handler and caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResultMode {
    /// The result is a value, encoded by the service and decoded by the client.
    #[default]
    Normal,
    /// The result is already encoded. The service writes it verbatim after the
    /// `Result` tag, and the client hands back the encoded bytes.
    Serialized,
    /// The handler produces the whole response body except the end marker.
    Raw,
    /// The handler produces the whole response body, end marker included.
    RawWithEndTag,
}

impl ResultMode {
    /// True for modes in which the handler must return `Value::Bytes`.
    pub fn produces_bytes(self) -> bool {
        !matches!(self, ResultMode::Normal)
    }
}
