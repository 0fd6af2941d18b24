// Copyright (C) 2020-2026  The Blockhouse Technology Limited (TBTL).
//
// This program is free software: you can redistribute it and/or modify it
// under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or (at your
// option) any later version.
//
// This program is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public
// License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! This crate provides the error handling system used across all of the TBTL's Rust code.
//!
//! Every constructed error is logged as a warning at its construction site, and carries the chain
//! of source errors together with any attached context.
//!
//! # Details
//!
//! Functions which may fail return `bherror::Result<T, E>`, where `E` is a crate-local error enum
//! implementing the [`BhError`] trait.
//!
//! A fresh error is created with [`Error::root`].  Errors from outside our system ("foreign"
//! errors, i.e. anything implementing [`std::error::Error`]) are converted and tracked as sources
//! via the [`ForeignError`][traits::ForeignError] and [`ForeignBoxed`][traits::ForeignBoxed]
//! traits.  Errors already in our system are propagated with
//! [`PropagateError::with_err`][traits::PropagateError::with_err] so that the source chain is
//! preserved.  Human readable context is attached with [`Error::ctx`] or the
//! [`ErrorContext`][traits::ErrorContext] extension over [`Result`].
//!
//! # Examples
//!
//! ```
//! use bherror::traits::{ErrorContext, ForeignError};
//!
//! #[derive(Debug)]
//! enum ParseError {
//!     NotANumber,
//! }
//!
//! impl std::fmt::Display for ParseError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "input is not a number")
//!     }
//! }
//!
//! impl bherror::BhError for ParseError {}
//!
//! fn parse(input: &str) -> bherror::Result<i32, ParseError> {
//!     input
//!         .parse()
//!         .foreign_err(|| ParseError::NotANumber)
//!         .ctx(|| format!("parsing {input:?}"))
//! }
//!
//! assert!(parse("42").is_ok());
//! assert!(parse("forty-two").is_err());
//! ```

pub mod traits;

/// The trait required of concrete error types used with [`Error`].
///
/// Implementors should *not* implement [`std::error::Error`] themselves; the [`Error`] wrapper
/// takes care of that.
pub trait BhError: std::fmt::Display + Send + Sync + 'static {}

/// The [`std::result::Result`] alias wrapping the error type into [`Error`].
pub type Result<T, E> = std::result::Result<T, Error<E>>;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// The error wrapper used for all errors in our projects.
///
/// It wraps a concrete [`BhError`] variant together with optional context strings and the source
/// error which caused it, forming a chain that can be rendered in full via the [`Debug`]
/// implementation.  The [`Display`] implementation only prints the top-level error.
///
/// [`Debug`]: std::fmt::Debug
/// [`Display`]: std::fmt::Display
pub struct Error<E>
where
    E: BhError,
{
    /// The concrete error variant.
    pub error: E,
    pub(crate) context: Vec<String>,
    pub(crate) source: Option<BoxedSource>,
}

impl<E> Error<E>
where
    E: BhError,
{
    /// Create a root error, i.e. one without a source, and log a warning.
    ///
    /// Use this where an error condition is first detected.  Do *not* use it to propagate another
    /// error, as the source chain would be lost; use the [`traits`] for propagation instead.
    #[track_caller]
    pub fn root(error: E) -> Self {
        Self {
            error,
            context: Vec::new(),
            source: None,
        }
        .warn(std::panic::Location::caller())
    }

    pub(crate) fn with_source(error: E, source: BoxedSource) -> Self {
        Self {
            error,
            context: Vec::new(),
            source: Some(source),
        }
    }

    /// Attach additional context to the error and return it.
    ///
    /// May be called repeatedly; every context string is kept.
    pub fn ctx<C>(mut self, context: C) -> Self
    where
        C: std::fmt::Display,
    {
        self.context.push(context.to_string());
        self
    }

    pub(crate) fn warn(self, location: &std::panic::Location<'_>) -> Self {
        log::warn!(target: &location.to_string(), "{:?}", self);
        self
    }
}

impl<E> std::error::Error for Error<E>
where
    E: BhError,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn std::error::Error + 'static))
    }
}

// Only the top-level error variant.
impl<E> std::fmt::Display for Error<E>
where
    E: BhError,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

// The whole chain, innermost error last.
impl<E> std::fmt::Debug for Error<E>
where
    E: BhError,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)?;

        if !self.context.is_empty() {
            write!(f, " ({})", self.context.join("; "))?;
        }

        let mut source = std::error::Error::source(self);
        while let Some(error) = source {
            write!(f, ": {}", error)?;
            source = error.source();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use crate::traits::{ErrorContext as _, ForeignError as _, PropagateError as _};

    #[derive(Debug, PartialEq)]
    enum DummyError {
        Outer,
        Inner,
    }

    impl std::fmt::Display for DummyError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::Outer => write!(f, "outer error"),
                Self::Inner => write!(f, "inner error"),
            }
        }
    }

    impl crate::BhError for DummyError {}

    #[test]
    fn root_has_no_source() {
        let error = crate::Error::root(DummyError::Outer);

        assert_eq!(error.error, DummyError::Outer);
        assert!(error.source().is_none());
    }

    #[test]
    fn display_prints_top_error_only() {
        let error: crate::Error<DummyError> = Err::<(), _>(crate::Error::root(DummyError::Inner))
            .with_err(|| DummyError::Outer)
            .unwrap_err();

        assert_eq!(error.to_string(), "outer error");
    }

    #[test]
    fn debug_prints_whole_chain() {
        let error: crate::Error<DummyError> =
            Err::<(), _>("oops".parse::<i32>().unwrap_err())
                .foreign_err(|| DummyError::Inner)
                .with_err(|| DummyError::Outer)
                .ctx(|| "while parsing")
                .unwrap_err();

        let rendered = format!("{error:?}");

        assert!(rendered.starts_with("outer error"), "{rendered}");
        assert!(rendered.contains("inner error"), "{rendered}");
        assert!(rendered.contains("while parsing"), "{rendered}");
        assert!(rendered.contains("invalid digit"), "{rendered}");
    }

    #[test]
    fn context_accumulates() {
        let error = crate::Error::root(DummyError::Outer)
            .ctx("first")
            .ctx("second");

        assert_eq!(error.context, vec!["first".to_owned(), "second".to_owned()]);
    }
}
