//! Compiler Errors
//!
//! Every failure aborts the current run: passes mutate the tree in place, so
//! there is no partial result worth keeping.

use crate::parser::ParseError;
use thiserror::Error;

/// Errors raised while compiling a script
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Parse(#[from] ParseError),

    /// A bash construct with no safe POSIX translation
    #[error("cannot debashify: {message}")]
    Rewrite { message: String },

    #[error("command '{command}' failed with exit code {code}")]
    CommandFailed { command: String, code: i32 },

    /// Failure while expanding `%include` or `%resolve`
    #[error("{directive}: {source}")]
    Directive {
        directive: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{0}")]
    Option(String),

    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn rewrite(message: impl Into<String>) -> Self {
        Error::Rewrite {
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Attach the text of the directive being expanded
    pub fn in_directive(self, directive: impl Into<String>) -> Self {
        Error::Directive {
            directive: directive.into(),
            source: Box::new(self),
        }
    }

    /// Innermost parse error, for caret diagnostics
    pub fn parse_error(&self) -> Option<&ParseError> {
        match self {
            Error::Parse(e) => Some(e),
            Error::Directive { source, .. } => source.parse_error(),
            _ => None,
        }
    }
}
