//! Error extension utilities
//!
//! Turns foreign errors (io, figment, toml, thread spawning) into engine
//! errors while keeping the original as the `source`.

use std::fmt;

use cle_domain::error::{Error, Result};

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Engine error variant a foreign error is folded into
#[derive(Clone, Copy)]
enum Wrap {
    Infrastructure,
    Io,
    Configuration,
}

impl Wrap {
    fn into_error(self, message: String, source: BoxedSource) -> Error {
        let source = Some(source);
        match self {
            Self::Infrastructure => Error::Infrastructure { message, source },
            Self::Io => Error::Io { message, source },
            Self::Configuration => Error::Configuration { message, source },
        }
    }
}

/// Attach a message to a foreign error and convert it to [`Error`]
///
/// # Example
///
/// ```
/// use cle_domain::error::{Error, Result};
/// use cle_infrastructure::error_ext::ErrorContext;
///
/// let read: Result<String> = std::fs::read_to_string("/nonexistent/cle.toml")
///     .io_context("reading configuration");
/// assert!(matches!(read, Err(Error::Io { .. })));
/// ```
pub trait ErrorContext<T> {
    /// Fold into [`Error::Infrastructure`] as `"{context}: {err}"`
    fn context(self, context: impl fmt::Display) -> Result<T>;

    /// Like [`context`](Self::context); the message is only built on error
    fn with_context<C: fmt::Display>(self, context: impl FnOnce() -> C) -> Result<T>;

    /// Fold into [`Error::Io`]
    fn io_context(self, context: impl fmt::Display) -> Result<T>;

    /// Fold into [`Error::Configuration`]
    fn config_context(self, context: impl fmt::Display) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, context: impl fmt::Display) -> Result<T> {
        wrap(self, Wrap::Infrastructure, || context.to_string())
    }

    fn with_context<C: fmt::Display>(self, context: impl FnOnce() -> C) -> Result<T> {
        wrap(self, Wrap::Infrastructure, || context().to_string())
    }

    fn io_context(self, context: impl fmt::Display) -> Result<T> {
        wrap(self, Wrap::Io, || context.to_string())
    }

    fn config_context(self, context: impl fmt::Display) -> Result<T> {
        wrap(self, Wrap::Configuration, || context.to_string())
    }
}

fn wrap<T, E>(
    result: std::result::Result<T, E>,
    kind: Wrap,
    context: impl FnOnce() -> String,
) -> Result<T>
where
    E: std::error::Error + Send + Sync + 'static,
{
    result.map_err(|err| kind.into_error(format!("{}: {err}", context()), Box::new(err)))
}
