//! Error utilities for predial.
//!
//! Library surfaces return typed errors such as [`DialError`](crate::dial::DialError).
//! The [`BoxError`] alias together with the [`ErrorContext`] extension trait
//! is used at the edges (server setup, cli) where it matters less
//! which error occurred than where it occurred.

use std::{error::Error as StdError, fmt};

/// Alias for a type-erased error type.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Extends the `Result` and `Option` types with methods for adding context to errors.
///
/// # Examples
///
/// ```
/// use predial::error::ErrorContext;
///
/// let result = "hello".parse::<i32>().context("parse integer");
/// assert_eq!("parse integer: invalid digit found in string", result.unwrap_err().to_string());
/// ```
pub trait ErrorContext: private::SealedErrorContext {
    /// The resulting context type after adding context to the contained error.
    type Context;

    /// Add a static context to the contained error.
    fn context<M>(self, context: M) -> Self::Context
    where
        M: fmt::Display + Send + Sync + 'static;

    /// Lazily add a context to the contained error, if it exists.
    fn with_context<C, F>(self, context: F) -> Self::Context
    where
        C: fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E> ErrorContext for Result<T, E>
where
    E: Into<BoxError>,
{
    type Context = Result<T, BoxError>;

    fn context<M>(self, context: M) -> Self::Context
    where
        M: fmt::Display + Send + Sync + 'static,
    {
        self.map_err(|error| ContextError::boxed(context, error.into()))
    }

    fn with_context<C, F>(self, context: F) -> Self::Context
    where
        C: fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|error| ContextError::boxed(context(), error.into()))
    }
}

impl<T> ErrorContext for Option<T> {
    type Context = Result<T, BoxError>;

    fn context<M>(self, context: M) -> Self::Context
    where
        M: fmt::Display + Send + Sync + 'static,
    {
        self.ok_or_else(|| ContextError::boxed(context, BoxError::from("Option is None")))
    }

    fn with_context<C, F>(self, context: F) -> Self::Context
    where
        C: fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| ContextError::boxed(context(), BoxError::from("Option is None")))
    }
}

struct ContextError<C> {
    context: C,
    error: BoxError,
}

impl<C> ContextError<C>
where
    C: fmt::Display + Send + Sync + 'static,
{
    fn boxed(context: C, error: BoxError) -> BoxError {
        Box::new(Self { context, error })
    }
}

impl<C: fmt::Display> fmt::Debug for ContextError<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextError")
            .field("context", &format_args!("{}", self.context))
            .field("error", &self.error)
            .finish()
    }
}

impl<C: fmt::Display> fmt::Display for ContextError<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.context, self.error)
    }
}

impl<C: fmt::Display> StdError for ContextError<C> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.error.as_ref())
    }
}

mod private {
    pub trait SealedErrorContext {}

    impl<T, E> SealedErrorContext for Result<T, E> where E: Into<super::BoxError> {}
    impl<T> SealedErrorContext for Option<T> {}
}
