use std::fmt::{Display, Formatter};
use std::{error, fmt};

/// An exception record sent by the server, possibly chained to the exception that caused it.
///
/// The code, name, message and stack trace are preserved exactly as the server sent them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerException {
    /// The server's numeric error code.
    pub code: i32,
    /// The exception class name, e.g. `DB::Exception`.
    pub name: String,
    /// The exception message.
    pub message: String,
    /// The server-side stack trace, often empty.
    pub stack_trace: String,
    /// The nested exception that caused this one.
    pub cause: Option<Box<ServerException>>,
}

impl ServerException {
    /// Create an exception record without a stack trace or cause.
    pub fn new(code: i32, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            name: name.into(),
            message: message.into(),
            stack_trace: String::new(),
            cause: None,
        }
    }

    /// Attach the exception that caused this one.
    pub fn with_cause(mut self, cause: ServerException) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Iterate the chain, starting with this exception and ending at the root cause.
    pub fn chain(&self) -> impl Iterator<Item = &ServerException> {
        std::iter::successors(Some(self), |e| e.cause.as_deref())
    }
}

impl Display for ServerException {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (depth, e) in self.chain().enumerate() {
            if depth > 0 {
                write!(f, "\nCaused by: ")?;
            }
            write!(f, "Code: {}. {}: {}", e.code, e.name, e.message)?;
            if !e.stack_trace.is_empty() {
                write!(f, "\n{}", e.stack_trace)?;
            }
        }
        Ok(())
    }
}

impl error::Error for ServerException {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.cause.as_deref().map(|e| e as &(dyn error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn display_walks_the_chain() {
        let inner = ServerException::new(1002, "std::exception", "inner failure");
        let mut outer = ServerException::new(60, "DB::Exception", "outer failure").with_cause(inner);
        outer.stack_trace = "0. frame".to_string();

        let text = outer.to_string();
        let outer_pos = text.find("outer failure").unwrap();
        let inner_pos = text.find("inner failure").unwrap();
        assert!(outer_pos < inner_pos);
        assert!(text.contains("0. frame"));
        assert!(text.contains("Caused by: Code: 1002. std::exception"));

        assert_eq!(outer.chain().count(), 2);
        assert!(outer.source().is_some());
    }
}
