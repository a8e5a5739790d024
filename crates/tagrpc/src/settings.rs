//! # Settings
//!
//! Plain option structs for services, registered functions, clients and single
//! calls. An `Option<bool>` for `simple` means "use the enclosing default".

use crate::mode::ResultMode;

/// Service-wide behavior.
#[derive(Debug, Clone, Default)]
pub struct ServiceSettings {
    /// Render handler failures with their full cause chain.
    pub debug: bool,
    /// Encode results without reference tracking unless a function says otherwise.
    pub simple: bool,
}

impl ServiceSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn simple(mut self, simple: bool) -> Self {
        self.simple = simple;
        self
    }
}

/// Per-function registration options.
#[derive(Debug, Clone, Default)]
pub struct MethodOptions {
    pub mode: ResultMode,
    pub simple: Option<bool>,
}

impl MethodOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(mut self, mode: ResultMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn simple(mut self, simple: bool) -> Self {
        self.simple = Some(simple);
        self
    }
}

/// Client-wide behavior.
#[derive(Debug, Clone, Default)]
pub struct ClientSettings {
    /// Encode argument lists without reference tracking.
    pub simple: bool,
}

/// Options for a single invocation.
///
/// ```
/// use tagrpc::InvokeSettings;
/// use tagrpc::ResultMode;
///
/// let settings = InvokeSettings::new().by_ref(true).mode(ResultMode::Raw);
/// assert!(settings.by_ref);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InvokeSettings {
    /// Ask the service to send the (possibly mutated) arguments back.
    pub by_ref: bool,
    pub mode: ResultMode,
    pub simple: Option<bool>,
}

impl InvokeSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_ref(mut self, by_ref: bool) -> Self {
        self.by_ref = by_ref;
        self
    }

    pub fn mode(mut self, mode: ResultMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn simple(mut self, simple: bool) -> Self {
        self.simple = Some(simple);
        self
    }
}
