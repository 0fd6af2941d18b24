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

//! Extension traits over [`Result`](std::result::Result) for converting and propagating errors
//! within our error handling system.

use crate::{BhError, Error};

/// Converts foreign errors, i.e. anything implementing [`std::error::Error`] that is not already
/// an [`Error`], into our error system while keeping the original as the source.
///
/// For errors which are already [`Error`]s use [`PropagateError`] instead.
pub trait ForeignError<T, E>
where
    E: BhError,
{
    /// Maps a `Result<T, S>` to `Result<T, Error<E>>`, attaching the original error as the
    /// source of the new one.
    fn foreign_err<F>(self, f: F) -> crate::Result<T, E>
    where
        F: FnOnce() -> E;
}

impl<T, S, E> ForeignError<T, E> for std::result::Result<T, S>
where
    S: std::error::Error + Send + Sync + 'static,
    E: BhError,
{
    #[track_caller]
    fn foreign_err<F>(self, f: F) -> crate::Result<T, E>
    where
        F: FnOnce() -> E,
    {
        let location = std::panic::Location::caller();
        self.map_err(|source| Error::with_source(f(), Box::new(source)).warn(location))
    }
}

/// The [`ForeignError`] counterpart for already-boxed foreign errors.
pub trait ForeignBoxed<T, E>
where
    E: BhError,
{
    /// Maps a `Result<T, Box<dyn Error + Send + Sync>>` to `Result<T, Error<E>>`, attaching the
    /// boxed error as the source of the new one.
    fn foreign_boxed_err<F>(self, f: F) -> crate::Result<T, E>
    where
        F: FnOnce() -> E;
}

impl<T, E> ForeignBoxed<T, E>
    for std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>
where
    E: BhError,
{
    #[track_caller]
    fn foreign_boxed_err<F>(self, f: F) -> crate::Result<T, E>
    where
        F: FnOnce() -> E,
    {
        let location = std::panic::Location::caller();
        self.map_err(|source| Error::with_source(f(), source).warn(location))
    }
}

/// Propagates errors which are already part of our error system, keeping the full source chain.
pub trait PropagateError<T, E>
where
    E: BhError,
{
    /// Maps a `Result<T, Error<S>>` to `Result<T, Error<E>>`, attaching the original error as
    /// the source of the new one.
    fn with_err<F>(self, f: F) -> crate::Result<T, E>
    where
        F: FnOnce() -> E;
}

impl<T, S, E> PropagateError<T, E> for crate::Result<T, S>
where
    S: BhError,
    E: BhError,
{
    fn with_err<F>(self, f: F) -> crate::Result<T, E>
    where
        F: FnOnce() -> E,
    {
        self.map_err(|source| Error::with_source(f(), Box::new(source)))
    }
}

/// Attaches additional context to the error variant of a [`crate::Result`].
pub trait ErrorContext<T, E>
where
    E: BhError,
{
    /// Adds context to the [`Err`] variant, leaving [`Ok`] untouched.
    ///
    /// The context is lazily evaluated.
    fn ctx<C, F>(self, f: F) -> crate::Result<T, E>
    where
        C: std::fmt::Display,
        F: FnOnce() -> C;
}

impl<T, E> ErrorContext<T, E> for crate::Result<T, E>
where
    E: BhError,
{
    fn ctx<C, F>(self, f: F) -> crate::Result<T, E>
    where
        C: std::fmt::Display,
        F: FnOnce() -> C,
    {
        self.map_err(|error| error.ctx(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum First {
        Fail,
    }

    impl std::fmt::Display for First {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "first")
        }
    }

    impl BhError for First {}

    #[derive(Debug, PartialEq)]
    enum Second {
        Fail,
    }

    impl std::fmt::Display for Second {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "second")
        }
    }

    impl BhError for Second {}

    fn foreign_failure() -> std::result::Result<(), std::num::ParseIntError> {
        "NaN".parse::<i32>().map(|_| ())
    }

    #[test]
    fn foreign_err_attaches_source() {
        let error = foreign_failure().foreign_err(|| First::Fail).unwrap_err();

        assert_eq!(error.error, First::Fail);
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn foreign_boxed_err_attaches_source() {
        let boxed: std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> =
            foreign_failure().map_err(|e| Box::new(e) as _);

        let error = boxed.foreign_boxed_err(|| First::Fail).unwrap_err();

        assert_eq!(error.error, First::Fail);
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn with_err_attaches_source() {
        let inner: crate::Result<(), First> = Err(crate::Error::root(First::Fail));

        let error = inner.with_err(|| Second::Fail).unwrap_err();

        assert_eq!(error.error, Second::Fail);
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn ctx_leaves_ok_untouched() {
        let ok: crate::Result<i32, First> = Ok(5);

        assert_eq!(ok.ctx(|| "unused").unwrap(), 5);
    }
}
