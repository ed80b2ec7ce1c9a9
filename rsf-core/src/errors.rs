use std::{
    fmt::{Display, Formatter},
    io, result,
};

use arrow_schema::ArrowError;
use snafu::Location;

/// Derived from parquet-rs
#[derive(Debug)]
pub enum Error {
    /// General error.
    /// Returned when code violates normal workflow of working with batches.
    General(String),
    /// "Not yet implemented" error.
    /// Returned when functionality is not yet available.
    NYI(String),
    /// The projection list supplied with the query is invalid.
    UserProjection(String),
    /// A reader opened without building a schema, or negotiated a schema
    /// inconsistent with its later behaviour.
    UserSchema(String),
    /// Structural error raised by a format reader. Carries the byte offset of
    /// the offending token and the field path built from the parser stack.
    Syntax {
        message: String,
        path: String,
        offset: u64,
    },
    /// A typed writer refused a value that does not fit the target type.
    ConversionOverflow {
        column: String,
        value: String,
        target: String,
    },
    /// A typed writer cannot convert the given value at all.
    InvalidConversion { column: String, message: String },
    /// A buffer or batch budget was exceeded and cannot be recovered from.
    ResourceExhaustion(String),
    /// Invariant violation. Fatal.
    Internal(String),
    IO(String, Location),
    /// An external error variant
    External(Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T, E = Error> = result::Result<T, E>;

impl Error {
    /// True for errors caused by user input rather than by this library or
    /// the environment.
    pub fn is_user(&self) -> bool {
        matches!(
            self,
            Error::UserProjection(_) | Error::UserSchema(_) | Error::Syntax { .. }
        )
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::External(Box::new(e))
    }
}

impl From<ArrowError> for Error {
    fn from(e: ArrowError) -> Error {
        Error::External(Box::new(e))
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Error {
        Error::General(e.to_string())
    }
}

/// Create a "Not Yet Implemented" error with a message
pub fn nyi_err<T>(msg: impl Into<String>) -> Error {
    Error::NYI(msg.into())
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::General(source) => write!(f, "General error: {}", source),
            Error::NYI(source) => write!(f, "Not yet implemented: {}", source),
            Error::UserProjection(source) => write!(f, "Projection error: {}", source),
            Error::UserSchema(source) => write!(f, "Schema error: {}", source),
            Error::Syntax {
                message,
                path,
                offset,
            } => {
                if path.is_empty() {
                    write!(f, "Syntax error at offset {}: {}", offset, message)
                } else {
                    write!(
                        f,
                        "Syntax error at offset {} in field {}: {}",
                        offset, path, message
                    )
                }
            }
            Error::ConversionOverflow {
                column,
                value,
                target,
            } => write!(
                f,
                "Value {} does not fit type {} of column `{}`",
                value, target, column
            ),
            Error::InvalidConversion { column, message } => {
                write!(f, "Cannot convert value for column `{}`: {}", column, message)
            }
            Error::ResourceExhaustion(source) => write!(f, "Resources exhausted: {}", source),
            Error::Internal(source) => write!(f, "Internal error: {}", source),
            Error::IO(source, location) => write!(f, "IO error: {} at {}", source, location),
            Error::External(source) => write!(f, "External error: {}", source),
        }
    }
}
