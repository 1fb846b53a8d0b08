use std::borrow::Cow;
use std::fmt;

/// A short, string-equal classification tag carried by a [`StructuredError`](super::StructuredError).
///
/// Equality and hashing are defined purely on the underlying string, matching the
/// original `failure.Code` interface (`ErrorCode() string`) this type generalizes:
/// any caller can introduce a domain-specific code by constructing one from a
/// string, without registering it anywhere.
#[derive(Clone, Debug, Eq)]
pub struct ErrorCode(Cow<'static, str>);

impl ErrorCode {
    pub const UNKNOWN: ErrorCode = ErrorCode::from_static("unknown");
    pub const CANCELED: ErrorCode = ErrorCode::from_static("canceled");
    pub const TIMEOUT: ErrorCode = ErrorCode::from_static("timeout");
    pub const TEMPORARY: ErrorCode = ErrorCode::from_static("temporary");
    pub const PREPARE: ErrorCode = ErrorCode::from_static("prepare");
    pub const LOAD: ErrorCode = ErrorCode::from_static("load");
    pub const VALIDATION: ErrorCode = ErrorCode::from_static("validation");
    pub const PANIC: ErrorCode = ErrorCode::from_static("panic");

    pub const fn from_static(code: &'static str) -> Self {
        ErrorCode(Cow::Borrowed(code))
    }

    pub fn new(code: impl Into<String>) -> Self {
        ErrorCode(Cow::Owned(code.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for ErrorCode {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl std::hash::Hash for ErrorCode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for ErrorCode {
    fn from(value: &'static str) -> Self {
        ErrorCode::from_static(value)
    }
}

impl From<String> for ErrorCode {
    fn from(value: String) -> Self {
        ErrorCode::new(value)
    }
}
