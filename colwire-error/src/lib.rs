#![deny(missing_docs)]
#![feature(error_generic_member_access)]

//! Error handling for the colwire native protocol codec.
//!
//! Every fallible operation in the workspace returns a [`ColwireResult`]. Errors are grouped by
//! where they originate (transport, protocol, type system, caller contract) and each one carries
//! a machine-readable [`ErrorCode`] alongside its human readable text.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::fmt::{Debug, Display, Formatter};
use std::ops::Deref;
use std::{fmt, io};

pub use ext::*;
pub use server::*;

mod ext;
mod server;

/// A string that can be used as an error message.
#[derive(Debug)]
pub struct ErrString(Cow<'static, str>);

impl<T> From<T> for ErrString
where
    T: Into<Cow<'static, str>>,
{
    fn from(msg: T) -> Self {
        Self(msg.into())
    }
}

impl AsRef<str> for ErrString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for ErrString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for ErrString {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Machine-readable classification of a [`ColwireError`].
///
/// Client-side failures use small negative codes so that they can never collide with the
/// positive codes reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Short read/write or a broken connection.
    Io,
    /// Unexpected bytes or message ordering on the wire.
    Protocol,
    /// An exception raised by the server, carrying the server's own code.
    Server(i32),
    /// Unknown type name, unsupported type argument or a value the type cannot hold.
    DataType,
    /// Malformed type name or literal text.
    Syntax,
    /// The caller violated the API contract.
    InvalidArgument,
    /// An index was outside the valid range.
    OutOfBounds,
    /// A compressed frame could not be decoded.
    Compression,
}

impl ErrorCode {
    /// The numeric representation of this code.
    pub fn as_i32(&self) -> i32 {
        match self {
            Self::Server(code) => *code,
            Self::Io => -1,
            Self::Protocol => -2,
            Self::DataType => -3,
            Self::Syntax => -4,
            Self::InvalidArgument => -5,
            Self::OutOfBounds => -6,
            Self::Compression => -7,
        }
    }
}

/// The top-level error type for the codec.
#[derive(thiserror::Error)]
#[non_exhaustive]
pub enum ColwireError {
    /// An index is out of bounds.
    #[error("index {0} out of bounds from {1} to {2}\nBacktrace:\n{3}")]
    OutOfBounds(usize, usize, usize, Backtrace),
    /// The caller violated the contract of an API.
    #[error("{0}\nBacktrace:\n{1}")]
    InvalidArgument(ErrString, Backtrace),
    /// The byte stream did not follow the native protocol.
    #[error("{0}\nBacktrace:\n{1}")]
    Protocol(ErrString, Backtrace),
    /// A type name could not be resolved, or a value does not fit its type.
    #[error("{0}\nBacktrace:\n{1}")]
    DataType(ErrString, Backtrace),
    /// Type name or literal text that does not follow the grammar.
    #[error("{0}\nBacktrace:\n{1}")]
    Syntax(ErrString, Backtrace),
    /// A compressed frame is corrupt or uses an unknown method.
    #[error("{0}\nBacktrace:\n{1}")]
    Compression(ErrString, Backtrace),
    /// An exception reported by the server.
    #[error(transparent)]
    Server(#[from] ServerException),
    /// A wrapper for other errors, carrying additional context.
    #[error("{0}: {1}")]
    Context(ErrString, Box<ColwireError>),
    /// A wrapper for IO errors.
    #[error("{0}\nBacktrace:\n{1}")]
    IOError(#[from] io::Error, Backtrace),
}

impl ColwireError {
    /// Adds additional context to an error.
    pub fn with_context<T: Into<ErrString>>(self, msg: T) -> Self {
        ColwireError::Context(msg.into(), Box::new(self))
    }

    /// The machine-readable code of this error, looking through any context wrappers.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::OutOfBounds(..) => ErrorCode::OutOfBounds,
            Self::InvalidArgument(..) => ErrorCode::InvalidArgument,
            Self::Protocol(..) => ErrorCode::Protocol,
            Self::DataType(..) => ErrorCode::DataType,
            Self::Syntax(..) => ErrorCode::Syntax,
            Self::Compression(..) => ErrorCode::Compression,
            Self::Server(e) => ErrorCode::Server(e.code),
            Self::Context(_, inner) => inner.code(),
            Self::IOError(..) => ErrorCode::Io,
        }
    }

    /// The server exception behind this error, if it was raised by the server.
    pub fn as_server_exception(&self) -> Option<&ServerException> {
        match self {
            Self::Server(e) => Some(e),
            Self::Context(_, inner) => inner.as_server_exception(),
            _ => None,
        }
    }
}

impl Debug for ColwireError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// A type alias for Results that return ColwireErrors as their error type.
pub type ColwireResult<T> = Result<T, ColwireError>;

/// A convenient macro for creating a ColwireError.
#[macro_export]
macro_rules! colwire_err {
    (OutOfBounds: $idx:expr, $start:expr, $stop:expr) => {{
        use std::backtrace::Backtrace;
        $crate::ColwireError::OutOfBounds($idx, $start, $stop, Backtrace::capture())
    }};
    ($variant:ident: $fmt:literal $(, $arg:expr)* $(,)?) => {{
        use std::backtrace::Backtrace;
        $crate::ColwireError::$variant(format!($fmt, $($arg),*).into(), Backtrace::capture())
    }};
    ($variant:ident: $err:expr $(,)?) => {{
        use std::backtrace::Backtrace;
        $crate::ColwireError::$variant($err.into(), Backtrace::capture())
    }};
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::colwire_err!(InvalidArgument: $fmt, $($arg),*)
    };
}

/// A convenient macro for returning a ColwireError.
#[macro_export]
macro_rules! colwire_bail {
    ($($tt:tt)+) => {
        return Err($crate::colwire_err!($($tt)+))
    };
}

#[cfg(test)]
mod tests {
    use std::io;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(colwire_err!(Protocol: "unknown packet {}", 42), ErrorCode::Protocol, -2)]
    #[case(colwire_err!(DataType: "unknown data type {}", "Foo"), ErrorCode::DataType, -3)]
    #[case(colwire_err!(OutOfBounds: 5, 0, 3), ErrorCode::OutOfBounds, -6)]
    #[case(colwire_err!("column {} is missing", "a"), ErrorCode::InvalidArgument, -5)]
    fn codes(#[case] err: ColwireError, #[case] code: ErrorCode, #[case] numeric: i32) {
        assert_eq!(err.code(), code);
        assert_eq!(err.code().as_i32(), numeric);
    }

    #[test]
    fn context_keeps_inner_code() {
        let err = colwire_err!(Syntax: "expected ')' at 7").with_context("parsing Array(Int8");
        assert_eq!(err.code(), ErrorCode::Syntax);
        let text = err.to_string();
        assert!(text.starts_with("parsing Array(Int8: expected ')' at 7"));
    }

    #[test]
    fn io_errors_convert() {
        let err: ColwireError = io::Error::new(io::ErrorKind::UnexpectedEof, "eof").into();
        assert_eq!(err.code(), ErrorCode::Io);
    }

    #[test]
    fn server_code_is_verbatim() {
        let err: ColwireError = ServerException::new(60, "DB::Exception", "Table doesn't exist").into();
        assert_eq!(err.code(), ErrorCode::Server(60));
        assert_eq!(err.code().as_i32(), 60);
        assert!(err.as_server_exception().is_some());
    }
}
