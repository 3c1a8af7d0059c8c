use std::fmt;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the binding layer.
#[derive(Debug, Error)]
pub enum Error {
    /// Raised by QuickJS itself. `rquickjs::Error::Exception` means a
    /// script exception is pending on the context.
    #[error(transparent)]
    Engine(#[from] rquickjs::Error),

    /// A script exception, already converted to its string form.
    #[error("{0}")]
    Exception(String),

    #[error(transparent)]
    Marshal(#[from] MarshalError),

    #[error("class '{0}' is already registered")]
    DuplicateClass(String),

    #[error("class {0} is not registered")]
    UnknownClass(String),

    #[error("value is detached from its context")]
    Detached,

    #[error("runtime has been destroyed")]
    RuntimeGone,
}

/// Where in a composite value a conversion failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Positional argument or tuple element.
    Index(usize),
    ArrayIndex(usize),
    TupleOfSize(usize),
    Key(String),
    /// Free-form context such as "point".
    Within(String),
    This(String),
    Arguments(String),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "at index {index}"),
            Self::ArrayIndex(index) => write!(f, "in array at index {index}"),
            Self::TupleOfSize(size) => write!(f, "in tuple of size {size}"),
            Self::Key(key) => write!(f, "in object key \"{key}\""),
            Self::Within(what) => write!(f, "in {what}"),
            Self::This(function) => write!(f, "'this' in {function}"),
            Self::Arguments(function) => write!(f, "arguments in {function}"),
        }
    }
}

/// A failed host <-> script conversion.
///
/// The message names what was expected; the path records each container
/// the failure bubbled out of, innermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarshalError {
    message: String,
    path: Vec<PathSegment>,
}

impl MarshalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: Vec::new(),
        }
    }

    /// `Expected <expected>, got <actual type>`.
    pub fn mismatch(expected: &str, actual: &str) -> Self {
        Self::new(format!("Expected {expected}, got {actual}"))
    }

    pub fn arity(expected: usize, actual: usize) -> Self {
        Self::new(format!("Expected {expected} arguments, got {actual}"))
    }

    pub fn length(expected: usize, actual: usize) -> Self {
        Self::new(format!("Expected array of length {expected}, got {actual}"))
    }

    /// Record that the failure happened inside `segment`.
    pub fn at(mut self, segment: PathSegment) -> Self {
        self.path.push(segment);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn path(&self) -> &[PathSegment] {
        &self.path
    }
}

impl fmt::Display for MarshalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        for segment in &self.path {
            write!(f, " ({segment})")?;
        }
        Ok(())
    }
}

impl std::error::Error for MarshalError {}
