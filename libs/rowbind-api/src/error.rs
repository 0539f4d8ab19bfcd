use std::fmt;

/// Boxed error returned by constructors and factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error kind for coercion failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The raw value variant cannot become the requested type.
    TypeMismatch,
    /// Text could not be parsed into the requested type.
    Parse,
    /// Numeric value out of range for the requested type.
    Overflow,
    /// A user-defined deserializer rejected the value.
    Deserializer,
}

/// Coercion error, returned by built-in coercions and column deserializers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoercionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CoercionError {
    pub fn type_mismatch(expected: &str, found: &str) -> Self {
        Self {
            kind: ErrorKind::TypeMismatch,
            message: format!("expected {expected}, found {found}"),
        }
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Parse, message: msg.into() }
    }

    pub fn overflow(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Overflow, message: msg.into() }
    }

    pub fn deserializer(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Deserializer, message: msg.into() }
    }

    /// Add context to the error, preserving the original ErrorKind.
    ///
    /// Produces: `"context: original message"`.
    pub fn with_context(self, ctx: impl fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{ctx}: {}", self.message),
        }
    }
}

impl fmt::Display for CoercionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for CoercionError {}

impl From<std::str::Utf8Error> for CoercionError {
    fn from(e: std::str::Utf8Error) -> Self {
        Self::parse(e.to_string())
    }
}

impl From<std::num::ParseIntError> for CoercionError {
    fn from(e: std::num::ParseIntError) -> Self {
        Self::parse(e.to_string())
    }
}

impl From<std::num::ParseFloatError> for CoercionError {
    fn from(e: std::num::ParseFloatError) -> Self {
        Self::parse(e.to_string())
    }
}
