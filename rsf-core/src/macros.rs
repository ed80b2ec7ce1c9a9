/// A macro to simplify common error handling patterns
#[macro_export]
macro_rules! general_error {
    ($msg:expr) => {
        $crate::errors::Error::General($msg.into())
    };
    ($msg:expr, $err:expr) => {
        $crate::errors::Error::General(format!("{}: {}", $msg, $err))
    };
}

/// A macro to simplify "Not Yet Implemented" error handling patterns
#[macro_export]
macro_rules! nyi_err {
    ($msg:expr) => {
        Err($crate::errors::Error::NYI($msg.into()))
    };
}

/// Early-return an invalid-projection user error with a formatted message.
#[macro_export]
macro_rules! user_projection_err {
    ($($arg:tt)*) => {
        Err($crate::errors::Error::UserProjection(format!($($arg)*)))
    };
}

/// Early-return an inconsistent-schema user error with a formatted message.
#[macro_export]
macro_rules! user_schema_err {
    ($($arg:tt)*) => {
        Err($crate::errors::Error::UserSchema(format!($($arg)*)))
    };
}

/// Early-return an invariant violation.
#[macro_export]
macro_rules! internal_err {
    ($($arg:tt)*) => {
        Err($crate::errors::Error::Internal(format!($($arg)*)))
    };
}

#[macro_export]
/// Scalar minor types a column writer can be built for.
macro_rules! writer_scalar_types {
    () => {
            DataType::Boolean
            | DataType::Int32
            | DataType::Int64
            | DataType::Float64
            | DataType::Utf8
            | DataType::Binary
            | DataType::Date64
            | DataType::Timestamp(_, _)
            | DataType::Decimal128(_, _)
    };
}
