use std::borrow::Cow;
use std::fmt;

pub mod messages {
    pub const UNKNOWN_TYPE: &str = "type id is not registered";
    pub const ALLOCATION_FAILED: &str = "allocator returned no memory";
    pub const PAYLOAD_ALIGNMENT: &str = "payload alignment exceeds the allocator alignment";
    pub const SIZE_OVERFLOW: &str = "instance size overflows";
    pub const COPY_UNSUPPORTED: &str = "type does not support copying";
    pub const INVALID_ENCODING: &str = "bytes are not valid in the requested encoding";
    pub const RANGE_OUT_OF_BOUNDS: &str = "range extends past the end of the string";
    pub const INVALID_URL: &str = "string is not a valid URL";
    pub const BASE_TOO_DEEP: &str = "base URL chain exceeds the configured depth";
    pub const NO_PATH_COMPONENT: &str = "URL path has no last component";
    pub const TRANSFORM_UNKNOWN: &str = "unknown transform identifier";
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A constructor could not produce a value.
    Construction,
    /// An index or range fell outside its container.
    OutOfRange,
    /// A text service (case mapping, normalization, transforms) failed.
    Service,
    /// The operation is intentionally unavailable.
    NotImplemented,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Construction => "construction failed",
            ErrorKind::OutOfRange => "out of range",
            ErrorKind::Service => "service failed",
            ErrorKind::NotImplemented => "not implemented",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: Cow<'static, str>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn construction(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Construction, message)
    }

    pub fn out_of_range(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::OutOfRange, message)
    }

    pub fn service(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Service, message)
    }

    pub fn not_implemented(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::NotImplemented, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Log an operation that was skipped because its arguments were out of range.
///
/// Mutators that are lenient by contract call this instead of failing.
pub fn report_ignored(operation: &str, detail: fmt::Arguments<'_>) {
    if crate::config::config().warn_on_lenient_noop {
        log::warn!("{operation}: ignored, {detail}");
    }
}
